use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ERROR_METHOD_NOT_FOUND: i64 = -32601;
pub const ERROR_INVALID_PARAMS: i64 = -32602;
pub const ERROR_HANDLER: i64 = -32603;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One frame on the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Request {
        id: CorrelationId,
        method: String,
        #[serde(default)]
        payload: Value,
    },
    Response {
        id: CorrelationId,
        outcome: Outcome,
    },
    Notification {
        method: String,
        #[serde(default)]
        payload: Value,
    },
}

impl Message {
    pub fn request(id: CorrelationId, method: impl Into<String>, payload: Value) -> Self {
        Message::Request {
            id,
            method: method.into(),
            payload,
        }
    }

    pub fn notification(method: impl Into<String>, payload: Value) -> Self {
        Message::Notification {
            method: method.into(),
            payload,
        }
    }

    pub fn success(id: CorrelationId, result: Value) -> Self {
        Message::Response {
            id,
            outcome: Outcome::Ok(result),
        }
    }

    pub fn failure(id: CorrelationId, error: ErrorPayload) -> Self {
        Message::Response {
            id,
            outcome: Outcome::Err(error),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } | Message::Notification { method, .. } => {
                Some(method.as_str())
            }
            Message::Response { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok(Value),
    Err(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i64,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ERROR_METHOD_NOT_FOUND, format!("method '{method}' not found"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ERROR_INVALID_PARAMS, message)
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ERROR_HANDLER, message)
    }
}

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

pub fn encode_message(message: &Message) -> Result<Bytes, ProtoError> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(ProtoError::Encode)
}

pub fn decode_message(bytes: &[u8]) -> Result<Message, ProtoError> {
    serde_json::from_slice(bytes).map_err(ProtoError::Decode)
}
