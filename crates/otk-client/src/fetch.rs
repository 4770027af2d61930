//! Pull endpoint: full-state fetch of one order.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use otk_schemas::{Credential, OrderUpdate};
use serde_json::Value;

use crate::order_url;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors an [`OrderFetcher`] may return. None of them are fatal to a
/// session; the caller logs and waits for the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network failure, timeout, or an unusable base URL.
    Transport(String),
    /// The endpoint answered with a non-success HTTP status.
    Status { code: u16, message: String },
    /// The body was not a decodable order representation.
    Decode(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
            FetchError::Status { code, message } => {
                write!(f, "pull endpoint status={code}: {message}")
            }
            FetchError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

// ---------------------------------------------------------------------------
// Fetcher trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OrderFetcher: Send + Sync {
    /// Fetch the complete current representation of `order_id`.
    async fn fetch_order(
        &self,
        order_id: &str,
        credential: &Credential,
    ) -> Result<OrderUpdate, FetchError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// `GET {base_url}/orders/{id}` with bearer auth.
///
/// The body may be the bare order or wrapped as `{"data": {...}}`.
#[derive(Debug, Clone)]
pub struct HttpOrderFetcher {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpOrderFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, timeout)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl OrderFetcher for HttpOrderFetcher {
    async fn fetch_order(
        &self,
        order_id: &str,
        credential: &Credential,
    ) -> Result<OrderUpdate, FetchError> {
        let url = order_url(&self.base_url, order_id).map_err(FetchError::Transport)?;

        let resp = self
            .http
            .get(url)
            .bearer_auth(credential.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                message: excerpt(&text),
            });
        }

        decode_order(&text)
    }
}

/// Decode a pull response body, unwrapping a `data` envelope if present.
pub fn decode_order(text: &str) -> Result<OrderUpdate, FetchError> {
    let body: Value = serde_json::from_str(text).map_err(|e| FetchError::Decode(e.to_string()))?;

    let body = match body {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    };
    if !body.is_object() {
        return Err(FetchError::Decode(format!(
            "expected an order object, got {}",
            kind_of(&body)
        )));
    }

    serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 200;
    let t = text.trim();
    match t.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &t[..cut]),
        None => t.to_string(),
    }
}
