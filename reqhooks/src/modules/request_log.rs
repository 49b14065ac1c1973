//! Request log module (Log phase)
//! Emits one annotated record per handled request

use super::request_annotator::{LogRecord, RequestAnnotator};
use super::{Module, ModuleOutcome};
use crate::config::RequestLogConfig;
use crate::phases::{Phase, RequestContext};
use crate::request::RequestStack;
use crate::security::IdentityProvider;
use std::sync::Arc;

pub const DEFAULT_CHANNEL: &str = "request";

pub struct RequestLog {
    config: RequestLogConfig,
}

impl RequestLog {
    pub fn new(config: RequestLogConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(RequestLogConfig::default())
    }

    fn annotator_for(&self, ctx: &RequestContext) -> RequestAnnotator {
        let requests = Arc::new(RequestStack::for_request(Arc::clone(&ctx.request)));
        let identity = if self.config.include_user.unwrap_or(true) {
            Some(Arc::clone(&ctx.token_storage) as Arc<dyn IdentityProvider>)
        } else {
            None
        };
        RequestAnnotator::new(requests, identity, self.config.token.clone())
    }
}

impl Module for RequestLog {
    fn name(&self) -> &str {
        "request_log"
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Log]
    }

    fn run(&self, phase: Phase, ctx: &mut RequestContext) -> ModuleOutcome {
        debug_assert_eq!(phase, Phase::Log);

        // One annotator per request keeps cached values from leaking between requests
        let mut annotator = self.annotator_for(ctx);

        let method = ctx.request.method.as_str();
        let path = ctx.request.path();
        let status = ctx.response_status.unwrap_or_default();
        let channel = self.config.channel.as_deref().unwrap_or(DEFAULT_CHANNEL);

        let mut record = LogRecord::new(channel, format!("{} {} {}", method, path, status));
        record
            .context
            .insert("method".to_string(), serde_json::json!(method));
        record
            .context
            .insert("path".to_string(), serde_json::json!(path));
        record
            .context
            .insert("status".to_string(), serde_json::json!(status));
        record.context.insert(
            "duration_ms".to_string(),
            serde_json::json!(
                u64::try_from(ctx.start_time.elapsed().as_millis()).unwrap_or(u64::MAX)
            ),
        );

        let record = annotator.annotate(record);
        match serde_json::to_string(&record) {
            Ok(json) => tracing::info!(target: "reqhooks::request", record = %json, "{}", record.message),
            Err(e) => tracing::warn!(error = %e, "failed to serialize request log record"),
        }

        ctx.extensions.insert(record);
        ModuleOutcome::Continue
    }
}
