//! Module system root: traits, registry, shared types
//!
//! Modules attach logic to pipeline phases. They can read and mutate the
//! `RequestContext`, store typed data in its `extensions`, and return a
//! control decision (continue, short-circuit with a response, or error).

use crate::http_body_util::Full;
use crate::hyper::body::Bytes;
use crate::hyper::header::{self, HeaderValue};
use crate::hyper::{Response, StatusCode};
use crate::phases::{Phase, RequestContext};
use std::error::Error;
use std::sync::Arc;

pub mod api_key_auth;
pub mod request_annotator;
pub mod request_log;

/// Result of executing a module hook
pub enum ModuleOutcome {
    /// Continue to next module / phase
    Continue,
    /// Short-circuit the pipeline and immediately send this response
    Respond(Response<Full<Bytes>>),
    /// Abort with an error, handled by the host
    Error(Box<dyn Error + Send + Sync>),
}

pub trait Module: Send + Sync {
    /// Human-readable name for diagnostics
    fn name(&self) -> &str;
    fn phases(&self) -> &'static [Phase];
    fn run(&self, phase: Phase, ctx: &mut RequestContext) -> ModuleOutcome;
}

/// Ordered chain of modules
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, module: Arc<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn has_phase(&self, phase: Phase) -> bool {
        self.modules.iter().any(|m| m.phases().contains(&phase))
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Run modules for a phase in order; the first non-Continue outcome stops the chain.
    pub fn run_phase(&self, phase: Phase, ctx: &mut RequestContext) -> Option<ModuleOutcome> {
        for m in &self.modules {
            if m.phases().contains(&phase) {
                match m.run(phase, ctx) {
                    ModuleOutcome::Continue => {}
                    other => {
                        tracing::debug!(module = m.name(), ?phase, "module short-circuited phase");
                        return Some(other);
                    }
                }
            }
        }
        None
    }
}

/// Helper for building error response bodies
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({"error": message, "status": status.as_u16()}).to_string();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
