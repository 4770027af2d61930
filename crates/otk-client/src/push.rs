//! Push channel: inbound event stream for one order.
//!
//! A [`PushTransport`] opens a connection and hands back a [`PushStream`] of
//! raw text frames. Envelope decoding and reconnect policy live in the
//! runtime; this module only moves bytes.

use std::fmt;

use async_trait::async_trait;
use futures_util::StreamExt;
use otk_schemas::Credential;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::order_url;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The connection could not be opened (DNS, TCP, TLS, handshake, auth).
    Connect(String),
    /// Opening the connection did not complete within the configured bound.
    ConnectTimeout { after_ms: u64 },
    /// An established connection failed while reading.
    Read(String),
    /// The server closed the stream.
    Closed,
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Connect(msg) => write!(f, "push connect failed: {msg}"),
            PushError::ConnectTimeout { after_ms } => {
                write!(f, "push connect timed out after {after_ms}ms")
            }
            PushError::Read(msg) => write!(f, "push read failed: {msg}"),
            PushError::Closed => write!(f, "push stream closed by server"),
        }
    }
}

impl std::error::Error for PushError {}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One open push connection.
#[async_trait]
pub trait PushStream: Send {
    /// Next text frame. `None` once the server has closed the stream.
    async fn next_message(&mut self) -> Option<Result<String, PushError>>;

    /// Best-effort close. Dropping the stream also releases the connection.
    async fn close(&mut self) {}
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(
        &self,
        order_id: &str,
        credential: &Credential,
    ) -> Result<Box<dyn PushStream>, PushError>;
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

/// WebSocket transport at `{base_url}/orders/{id}` with bearer auth.
#[derive(Debug, Clone)]
pub struct WsPushTransport {
    base_url: String,
}

impl WsPushTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PushTransport for WsPushTransport {
    async fn connect(
        &self,
        order_id: &str,
        credential: &Credential,
    ) -> Result<Box<dyn PushStream>, PushError> {
        let url = order_url(&self.base_url, order_id).map_err(PushError::Connect)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| PushError::Connect(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|_| PushError::Connect("credential is not a valid header value".to_string()))?;
        request.headers_mut().insert(header::AUTHORIZATION, auth);

        let (ws, resp) = connect_async(request)
            .await
            .map_err(|e| PushError::Connect(e.to_string()))?;
        tracing::debug!(order_id, status = resp.status().as_u16(), "push connected");

        Ok(Box::new(WsPushStream { ws }))
    }
}

struct WsPushStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushStream for WsPushStream {
    async fn next_message(&mut self) -> Option<Result<String, PushError>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::debug!("push: non-utf8 binary frame skipped"),
                },
                // tungstenite answers pings on the next read.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "push: close frame");
                    return None;
                }
                Err(e) => return Some(Err(PushError::Read(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "push: close handshake failed");
        }
    }
}
