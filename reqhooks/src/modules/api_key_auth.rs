//! API key authentication listener (Access phase)
//! Reads the `apikey` request parameter and delegates verification to an
//! authentication manager. Requests without the parameter pass through untouched.

use super::{Module, ModuleOutcome};
use crate::error::AuthError;
use crate::http_body_util::Full;
use crate::hyper::body::Bytes;
use crate::hyper::header::{self, HeaderValue};
use crate::hyper::{Response, StatusCode};
use crate::phases::{Phase, RequestContext};
use crate::request::Request;
use crate::security::{ApiKeyToken, AuthenticationManager};
use std::sync::Arc;

/// Request parameter carrying the API key
pub const API_KEY_PARAM: &str = "apikey";

/// Builds the response sent when authentication fails
pub trait FailureResponder: Send + Sync {
    fn respond(&self, request: &Request) -> Response<Full<Bytes>>;
}

impl<F> FailureResponder for F
where
    F: Fn(&Request) -> Response<Full<Bytes>> + Send + Sync,
{
    fn respond(&self, request: &Request) -> Response<Full<Bytes>> {
        self(request)
    }
}

/// Default failure response: `403 Forbidden` as plain text, or as
/// `{"message":"Forbidden"}` when the client accepts JSON.
pub fn forbidden_response(request: &Request) -> Response<Full<Bytes>> {
    let wants_json = request
        .acceptable_content_types()
        .iter()
        .any(|t| t == "application/json");

    let content = if wants_json {
        serde_json::json!({"message": "Forbidden"}).to_string()
    } else {
        "Forbidden".to_string()
    };

    let mut response = Response::new(Full::new(Bytes::from(content)));
    *response.status_mut() = StatusCode::FORBIDDEN;
    if wants_json {
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
    response
}

pub struct ApiKeyAuthListener {
    authentication_manager: Arc<dyn AuthenticationManager>,
    failure_responder: Arc<dyn FailureResponder>,
}

impl ApiKeyAuthListener {
    pub fn new(authentication_manager: Arc<dyn AuthenticationManager>) -> Self {
        Self {
            authentication_manager,
            failure_responder: Arc::new(forbidden_response),
        }
    }

    /// Replace the response built on authentication failure
    pub fn with_failure_responder(mut self, responder: impl FailureResponder + 'static) -> Self {
        self.failure_responder = Arc::new(responder);
        self
    }

    /// Attempt API key authentication for one request.
    ///
    /// On success the identity is installed in the request's token storage.
    /// A rejected key clears the storage and yields the failure response.
    /// Other authenticator errors are returned to the host unchanged.
    pub fn handle(&self, ctx: &RequestContext) -> ModuleOutcome {
        let Some(api_key) = ctx.request.get(API_KEY_PARAM) else {
            return ModuleOutcome::Continue;
        };

        match self
            .authentication_manager
            .authenticate(ApiKeyToken::new(api_key))
        {
            Ok(token) => {
                tracing::info!(user = token.username(), "api key authenticated");
                ctx.token_storage.set_token(Some(token));
                ModuleOutcome::Continue
            }
            Err(AuthError::AuthenticationFailed(reason)) => {
                tracing::warn!(
                    path = ctx.request.path(),
                    reason = %reason,
                    "api key authentication failed"
                );
                ctx.token_storage.set_token(None);
                ModuleOutcome::Respond(self.failure_responder.respond(&ctx.request))
            }
            Err(other) => ModuleOutcome::Error(Box::new(other)),
        }
    }
}

impl Module for ApiKeyAuthListener {
    fn name(&self) -> &str {
        "api_key_auth"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Access]
    }

    fn run(&self, phase: Phase, ctx: &mut RequestContext) -> ModuleOutcome {
        debug_assert_eq!(phase, Phase::Access);
        self.handle(ctx)
    }
}
