//! HTTP request handling through the module phases

use crate::error::PipelineError;
use crate::http_body_util::{BodyExt, Full};
use crate::hyper::body::{Body, Bytes};
use crate::hyper::{Response, StatusCode};
use crate::modules::{ModuleOutcome, ModuleRegistry, error_response};
use crate::phases::{Phase, RequestContext};
use crate::request::Request;
use crate::security::TokenStorage;
use std::error::Error;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Handle an HTTP request: Access modules, then `inner`, then Log modules.
///
/// The client IP is taken from a `SocketAddr` in the request extensions.
/// `inner` receives the parsed request and the token storage filled in
/// by the Access phase.
#[tracing::instrument(skip_all, fields(http.method = %req.method(), http.uri = %req.uri()))]
pub async fn handle_request<B, F, Fut>(
    req: crate::hyper::Request<B>,
    modules: &ModuleRegistry,
    inner: F,
) -> Result<Response<Full<Bytes>>, PipelineError>
where
    B: Body,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
    F: FnOnce(Arc<Request>, Arc<TokenStorage>) -> Fut,
    Fut: Future<Output = Response<Full<Bytes>>>,
{
    let (parts, body) = req.into_parts();
    let client_ip = parts
        .extensions
        .get::<SocketAddr>()
        .map(|addr| addr.ip());
    let body_bytes = body
        .collect()
        .await
        .map_err(|e| PipelineError::Body(e.into()))?
        .to_bytes();

    let request =
        Request::new(parts.method, parts.uri, parts.headers, client_ip).with_body(&body_bytes);
    let mut ctx = RequestContext::new(request);
    Ok(run_pipeline(&mut ctx, modules, inner).await)
}

/// Run the phases for an already built context
pub async fn run_pipeline<F, Fut>(
    ctx: &mut RequestContext,
    modules: &ModuleRegistry,
    inner: F,
) -> Response<Full<Bytes>>
where
    F: FnOnce(Arc<Request>, Arc<TokenStorage>) -> Fut,
    Fut: Future<Output = Response<Full<Bytes>>>,
{
    // Phase: Access
    let response = match modules.run_phase(Phase::Access, ctx) {
        Some(ModuleOutcome::Respond(resp)) => resp,
        Some(ModuleOutcome::Error(e)) => {
            tracing::error!(error = %e, "Access module error");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Module error")
        }
        Some(ModuleOutcome::Continue) | None => {
            inner(Arc::clone(&ctx.request), Arc::clone(&ctx.token_storage)).await
        }
    };

    // Phase: Log (after response is ready)
    ctx.response_status = Some(response.status().as_u16());
    let _ = modules.run_phase(Phase::Log, ctx);

    response
}
