//! Inbound request view and request-context providers

use crate::error::LookupError;
use crate::hyper::{HeaderMap, Method, Uri, header};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

/// Immutable view of one inbound HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub client_ip: Option<IpAddr>,
    pub query_params: HashMap<String, String>,
    pub body_params: HashMap<String, String>,
}

impl Request {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, client_ip: Option<IpAddr>) -> Self {
        let query_params = extract_query_params(uri.query());
        Self {
            method,
            uri,
            headers,
            client_ip,
            query_params,
            body_params: HashMap::new(),
        }
    }

    /// Attach body parameters parsed from a form-encoded or JSON object body.
    /// Other content types leave the body parameters empty.
    pub fn with_body(mut self, body: &[u8]) -> Self {
        let content_type = self
            .header(header::CONTENT_TYPE.as_str())
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            self.body_params = extract_query_params(std::str::from_utf8(body).ok());
        } else if content_type.starts_with("application/json") {
            self.body_params = extract_json_params(body);
        }
        self
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    /// Header lookup; names are case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Request parameter lookup, query string first, then body
    pub fn get(&self, name: &str) -> Option<&str> {
        self.query_params
            .get(name)
            .or_else(|| self.body_params.get(name))
            .map(String::as_str)
    }

    /// Media types from the Accept header(s), best quality first.
    /// Equal qualities keep their header order.
    pub fn acceptable_content_types(&self) -> Vec<String> {
        let accept = self
            .headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");
        parse_accept(&accept)
    }
}

/// Source of the request currently being handled
pub trait RequestProvider: Send + Sync {
    fn current_request(&self) -> Result<Option<Arc<Request>>, LookupError>;
}

/// Stack of in-flight requests; the top entry is the current one
#[derive(Debug, Default)]
pub struct RequestStack {
    requests: Mutex<Vec<Arc<Request>>>,
}

impl RequestStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack holding a single request, for request-scoped consumers
    pub fn for_request(request: Arc<Request>) -> Self {
        Self {
            requests: Mutex::new(vec![request]),
        }
    }

    pub fn push(&self, request: Arc<Request>) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }

    pub fn pop(&self) -> Option<Arc<Request>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }
}

impl RequestProvider for RequestStack {
    fn current_request(&self) -> Result<Option<Arc<Request>>, LookupError> {
        let requests = self.requests.lock().map_err(|_| LookupError::Poisoned)?;
        Ok(requests.last().cloned())
    }
}

/// Extract parameters from a query string (or form body).
/// Keys and values are percent-decoded with `+` read as a space.
/// A key without `=` is kept with an empty value.
pub fn extract_query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query_str) = query {
        for pair in query_str.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(decode_component(key), decode_component(value));
        }
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

fn extract_json_params(body: &[u8]) -> HashMap<String, String> {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        return HashMap::new();
    };
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            Value::Number(n) => Some((key, n.to_string())),
            Value::Bool(b) => Some((key, b.to_string())),
            _ => None,
        })
        .collect()
}

fn parse_accept(accept: &str) -> Vec<String> {
    let mut items: Vec<(usize, f32, String)> = Vec::new();
    for (idx, item) in accept.split(',').enumerate() {
        let mut parts = item.split(';');
        let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        if media.is_empty() || items.iter().any(|(_, _, m)| *m == media) {
            continue;
        }
        let quality = parts
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("q"))
            .and_then(|(_, v)| v.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        items.push((idx, quality, media));
    }

    items.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    items.into_iter().map(|(_, _, media)| media).collect()
}
