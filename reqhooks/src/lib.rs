//! Request pipeline hooks: API key authentication and request-aware log annotation.

pub mod config;
pub mod error;
pub mod handler;
pub mod modules;
pub mod observability;
pub mod phases;
pub mod request;
pub mod security;

pub use http_body_util;
pub use hyper;
