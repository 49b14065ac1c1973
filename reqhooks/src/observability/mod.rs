//! Observability: structured logging setup

pub mod tracing;
