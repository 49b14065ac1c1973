//! Execution phases and request context for the HTTP pipeline

use crate::hyper::http::Extensions;
use crate::request::Request;
use crate::security::TokenStorage;
use std::sync::Arc;
use std::time::Instant;

/// Logical execution phases a module can attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Authentication and access control, before the handler runs
    Access,
    /// After the response is ready
    Log,
}

/// Mutable request-scoped context passed between phases
#[derive(Debug)]
pub struct RequestContext {
    pub start_time: Instant,
    pub request: Arc<Request>,
    pub token_storage: Arc<TokenStorage>, // identity installed by Access modules
    pub response_status: Option<u16>,
    pub extensions: Extensions, // typed storage for modules (log records, etc.)
}

impl RequestContext {
    pub fn new(request: Request) -> Self {
        Self::with_token_storage(request, Arc::new(TokenStorage::new()))
    }

    /// Build a context sharing an existing token storage
    pub fn with_token_storage(request: Request, token_storage: Arc<TokenStorage>) -> Self {
        Self {
            start_time: Instant::now(),
            request: Arc::new(request),
            token_storage,
            response_status: None,
            extensions: Extensions::default(),
        }
    }
}
