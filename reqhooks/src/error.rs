//! Error types shared across the pipeline

use thiserror::Error;

/// Failure while resolving the current request from a request provider
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("request stack lock poisoned")]
    Poisoned,

    #[error("request lookup failed: {0}")]
    Provider(String),
}

/// Failure while reading the current identity
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Outcome of a failed authentication attempt
#[derive(Error, Debug)]
pub enum AuthError {
    /// The credential was checked and rejected
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The authenticator could not check the credential at all
    #[error("authentication backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read request body: {0}")]
    Body(Box<dyn std::error::Error + Send + Sync>),
}
