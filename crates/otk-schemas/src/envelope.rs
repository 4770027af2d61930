//! Push channel envelope.
//!
//! Every frame on the order event stream is a JSON object
//! `{ "type": <string>, "body": <object> }`. Only `info` envelopes carry an
//! [`OrderUpdate`]; anything else is ignored by the listener.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OrderUpdate;

/// Envelope type that carries order update fragments.
pub const INFO_ENVELOPE: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The frame is not a JSON envelope at all.
    Json(String),
    /// An `info` envelope whose body is not a valid order fragment.
    Body { message: String },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::Json(msg) => write!(f, "malformed envelope: {msg}"),
            EnvelopeError::Body { message } => write!(f, "malformed info body: {message}"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

/// What a single push frame amounts to once decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    Update(OrderUpdate),
    /// Well-formed envelope of a type the tracker does not consume.
    Ignored { kind: String },
    Malformed(EnvelopeError),
}

impl Envelope {
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(raw).map_err(|e| EnvelopeError::Json(e.to_string()))
    }

    pub fn is_info(&self) -> bool {
        self.kind == INFO_ENVELOPE
    }

    /// Decode the body of an `info` envelope.
    ///
    /// Returns `None` for any other envelope type.
    pub fn into_update(self) -> Option<Result<OrderUpdate, EnvelopeError>> {
        if !self.is_info() {
            return None;
        }
        if !self.body.is_object() {
            return Some(Err(EnvelopeError::Body {
                message: "body is not a JSON object".to_string(),
            }));
        }
        Some(
            serde_json::from_value(self.body).map_err(|e| EnvelopeError::Body {
                message: e.to_string(),
            }),
        )
    }
}

impl PushFrame {
    /// Classify a raw text frame.
    pub fn decode(raw: &str) -> Self {
        let env = match Envelope::parse(raw) {
            Ok(env) => env,
            Err(e) => return PushFrame::Malformed(e),
        };
        let kind = env.kind.clone();
        match env.into_update() {
            Some(Ok(update)) => PushFrame::Update(update),
            Some(Err(e)) => PushFrame::Malformed(e),
            None => PushFrame::Ignored { kind },
        }
    }
}
