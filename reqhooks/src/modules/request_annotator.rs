//! Log record annotation with request metadata
//!
//! `RequestAnnotator` adds `clientIp`, `token`, `user` and
//! `remoteRequestToken` to a record's `extra` map. Client IP and remote
//! token are cached on first successful lookup for the lifetime of the
//! instance, so one annotator should serve one request.

use crate::request::{Request, RequestProvider};
use crate::security::IdentityProvider;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

/// Inbound header propagated into log records
pub const REMOTE_REQUEST_TOKEN_HEADER: &str = "X-Remote-Request-Token";

/// A structured log entry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogRecord {
    pub channel: String,
    pub message: String,
    pub context: Map<String, Value>,
    pub extra: BTreeMap<String, String>,
}

impl LogRecord {
    pub fn new(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Result of resolving one ambient value
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    /// No request is being handled
    NoRequest,
    /// The request or identity carries no such value
    Absent,
    Failed(Box<dyn Error + Send + Sync>),
}

impl Lookup<String> {
    fn found(self, field: &str) -> Option<String> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Failed(err) => {
                tracing::debug!(field, error = %err, "log annotation lookup failed");
                None
            }
            Lookup::NoRequest | Lookup::Absent => None,
        }
    }
}

pub struct RequestAnnotator {
    requests: Arc<dyn RequestProvider>,
    identity: Option<Arc<dyn IdentityProvider>>,
    token: String,
    client_ip: Option<String>,
    remote_request_token: Option<String>,
}

impl RequestAnnotator {
    /// Create an annotator. Without an explicit `token` a UUID is generated once.
    pub fn new(
        requests: Arc<dyn RequestProvider>,
        identity: Option<Arc<dyn IdentityProvider>>,
        token: Option<String>,
    ) -> Self {
        Self {
            requests,
            identity,
            token: token.unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            client_ip: None,
            remote_request_token: None,
        }
    }

    /// The fixed correlation token written to every record
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn annotate(&mut self, mut record: LogRecord) -> LogRecord {
        let client_ip = self.client_ip().found("clientIp").unwrap_or_default();
        record.extra.insert("clientIp".to_string(), client_ip);

        if let Some(identity) = &self.identity {
            let user = username(identity.as_ref()).found("user").unwrap_or_default();
            record.extra.insert("user".to_string(), user);
        }

        record.extra.insert("token".to_string(), self.token.clone());

        if let Some(remote) = self.remote_request_token().found("remoteRequestToken") {
            record
                .extra
                .insert("remoteRequestToken".to_string(), remote);
        }

        record
    }

    fn current_request(&self) -> Lookup<Arc<Request>> {
        match self.requests.current_request() {
            Ok(Some(request)) => Lookup::Found(request),
            Ok(None) => Lookup::NoRequest,
            Err(err) => Lookup::Failed(Box::new(err)),
        }
    }

    fn client_ip(&mut self) -> Lookup<String> {
        if let Some(ip) = &self.client_ip {
            return Lookup::Found(ip.clone());
        }
        match self.current_request() {
            Lookup::Found(request) => match request.client_ip() {
                Some(ip) => {
                    let ip = ip.to_string();
                    self.client_ip = Some(ip.clone());
                    Lookup::Found(ip)
                }
                None => Lookup::Absent,
            },
            Lookup::NoRequest => Lookup::NoRequest,
            Lookup::Absent => Lookup::Absent,
            Lookup::Failed(err) => Lookup::Failed(err),
        }
    }

    fn remote_request_token(&mut self) -> Lookup<String> {
        if self.remote_request_token.is_none() {
            match self.current_request() {
                Lookup::Found(request) => {
                    if let Some(value) = request
                        .header(REMOTE_REQUEST_TOKEN_HEADER)
                        .filter(|v| !v.is_empty())
                    {
                        self.remote_request_token = Some(value.to_string());
                    }
                }
                Lookup::Failed(err) => return Lookup::Failed(err),
                Lookup::NoRequest | Lookup::Absent => {}
            }
        }

        match &self.remote_request_token {
            Some(token) => Lookup::Found(token.clone()),
            None => Lookup::Absent,
        }
    }
}

fn username(identity: &dyn IdentityProvider) -> Lookup<String> {
    match identity.token() {
        Ok(Some(token)) => Lookup::Found(token.username().to_string()),
        Ok(None) => Lookup::Absent,
        Err(err) => Lookup::Failed(Box::new(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IdentityError, LookupError};
    use crate::hyper::header::HeaderValue;
    use crate::hyper::{HeaderMap, Method};
    use crate::request::RequestStack;
    use crate::security::{Token, TokenStorage};

    fn request(ip: &str, remote_token: Option<&'static str>) -> Arc<Request> {
        let mut headers = HeaderMap::new();
        if let Some(value) = remote_token {
            headers.insert("x-remote-request-token", HeaderValue::from_static(value));
        }
        Arc::new(Request::new(
            Method::GET,
            "/".parse().unwrap(),
            headers,
            Some(ip.parse().unwrap()),
        ))
    }

    struct BrokenRequests;
    impl RequestProvider for BrokenRequests {
        fn current_request(&self) -> Result<Option<Arc<Request>>, LookupError> {
            Err(LookupError::Provider("request stack unavailable".to_string()))
        }
    }

    struct BrokenIdentity;
    impl IdentityProvider for BrokenIdentity {
        fn token(&self) -> Result<Option<Token>, IdentityError> {
            Err(IdentityError::InvalidArgument("no firewall".to_string()))
        }
    }

    fn record() -> LogRecord {
        LogRecord::new("app", "hello")
    }

    #[test]
    fn test_annotates_current_request() {
        let stack = Arc::new(RequestStack::for_request(request("10.0.0.1", Some("remote-1"))));
        let storage = Arc::new(TokenStorage::with_token(Token::new("alice", vec![])));
        let mut annotator =
            RequestAnnotator::new(stack, Some(storage), Some("fixed-token".to_string()));

        let out = annotator.annotate(record());
        assert_eq!(out.extra["clientIp"], "10.0.0.1");
        assert_eq!(out.extra["user"], "alice");
        assert_eq!(out.extra["token"], "fixed-token");
        assert_eq!(out.extra["remoteRequestToken"], "remote-1");
        assert_eq!(out.message, "hello");
    }

    #[test]
    fn test_no_request_yields_empty_ip_and_token() {
        let mut annotator =
            RequestAnnotator::new(Arc::new(RequestStack::new()), None, Some("t".to_string()));

        let out = annotator.annotate(record());
        assert_eq!(out.extra["clientIp"], "");
        assert_eq!(out.extra["token"], "t");
        assert!(!out.extra.contains_key("user"));
        assert!(!out.extra.contains_key("remoteRequestToken"));
    }

    #[test]
    fn test_provider_failure_is_swallowed() {
        let mut annotator = RequestAnnotator::new(Arc::new(BrokenRequests), None, None);

        let out = annotator.annotate(record());
        assert_eq!(out.extra["clientIp"], "");
        assert_eq!(out.extra["token"], annotator.token());
        assert!(!out.extra.contains_key("remoteRequestToken"));
    }

    #[test]
    fn test_user_omitted_without_identity_provider() {
        let stack = Arc::new(RequestStack::for_request(request("10.0.0.1", None)));
        let mut annotator = RequestAnnotator::new(stack, None, None);

        for _ in 0..3 {
            let out = annotator.annotate(record());
            assert!(!out.extra.contains_key("user"));
        }
    }

    #[test]
    fn test_user_empty_without_token() {
        let stack = Arc::new(RequestStack::for_request(request("10.0.0.1", None)));
        let mut annotator =
            RequestAnnotator::new(stack, Some(Arc::new(TokenStorage::new())), None);

        assert_eq!(annotator.annotate(record()).extra["user"], "");
    }

    #[test]
    fn test_user_empty_on_identity_failure() {
        let stack = Arc::new(RequestStack::for_request(request("10.0.0.1", None)));
        let mut annotator = RequestAnnotator::new(stack, Some(Arc::new(BrokenIdentity)), None);

        assert_eq!(annotator.annotate(record()).extra["user"], "");
    }

    #[test]
    fn test_user_tracks_storage_changes() {
        let stack = Arc::new(RequestStack::for_request(request("10.0.0.1", None)));
        let storage = Arc::new(TokenStorage::new());
        let mut annotator = RequestAnnotator::new(stack, Some(storage.clone()), None);

        assert_eq!(annotator.annotate(record()).extra["user"], "");
        storage.set_token(Some(Token::new("bob", vec![])));
        assert_eq!(annotator.annotate(record()).extra["user"], "bob");
    }

    #[test]
    fn test_cached_values_stick_across_requests() {
        let stack = Arc::new(RequestStack::new());
        let mut annotator = RequestAnnotator::new(stack.clone(), None, None);

        stack.push(request("10.0.0.1", Some("remote-1")));
        let first = annotator.annotate(record());
        stack.pop();

        stack.push(request("10.0.0.2", Some("remote-2")));
        let second = annotator.annotate(record());

        assert_eq!(second.extra["clientIp"], "10.0.0.1");
        assert_eq!(second.extra["remoteRequestToken"], "remote-1");
        assert_eq!(first.extra, second.extra);
    }

    #[test]
    fn test_unresolved_values_are_retried() {
        let stack = Arc::new(RequestStack::new());
        let mut annotator = RequestAnnotator::new(stack.clone(), None, None);

        let first = annotator.annotate(record());
        assert_eq!(first.extra["clientIp"], "");

        stack.push(request("10.0.0.3", Some("")));
        let second = annotator.annotate(record());
        assert_eq!(second.extra["clientIp"], "10.0.0.3");
        assert!(!second.extra.contains_key("remoteRequestToken"));

        stack.push(request("10.0.0.4", Some("remote-4")));
        let third = annotator.annotate(record());
        assert_eq!(third.extra["clientIp"], "10.0.0.3");
        assert_eq!(third.extra["remoteRequestToken"], "remote-4");
    }

    #[test]
    fn test_generated_token_is_fixed_per_instance() {
        let stack: Arc<dyn RequestProvider> = Arc::new(RequestStack::new());
        let mut a = RequestAnnotator::new(stack.clone(), None, None);
        let b = RequestAnnotator::new(stack, None, None);

        assert!(!a.token().is_empty());
        assert_ne!(a.token(), b.token());

        let token = a.token().to_string();
        assert_eq!(a.annotate(record()).extra["token"], token);
        assert_eq!(a.annotate(record()).extra["token"], token);
    }

    #[test]
    fn test_existing_extra_entries_are_kept() {
        let mut annotator =
            RequestAnnotator::new(Arc::new(RequestStack::new()), None, Some("t".to_string()));
        let mut rec = record();
        rec.extra.insert("worker".to_string(), "3".to_string());

        let out = annotator.annotate(rec);
        assert_eq!(out.extra["worker"], "3");
        assert_eq!(out.extra["token"], "t");
    }
}
