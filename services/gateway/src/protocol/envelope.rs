//! Outbound result envelopes.
//!
//! Every tool call, successful or not, leaves the gateway as a [`ToolResult`]
//! whose first text item is a JSON payload carrying `success` and the call's
//! `request_id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// Rendered in place of a payload that failed to serialize.
const FALLBACK_ERROR_PAYLOAD: &str =
    r#"{"success":false,"error_code":"INTERNAL_ERROR","error_message":"Internal error"}"#;

/// One item of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(alias = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
}

impl ContentItem {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Body of a successful call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessPayload {
    pub success: bool,
    pub message: String,
    pub data: Value,
    pub request_id: String,
}

/// Body of a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub success: bool,
    pub error_code: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default)]
    pub request_id: String,
}

/// Either payload, as read back from a result.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Success(SuccessPayload),
    Error(ErrorPayload),
}

/// The envelope returned for every tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    /// Wrap backend data in a success envelope.
    #[must_use]
    pub fn success(message: impl Into<String>, data: Value, request_id: &str) -> Self {
        let payload = SuccessPayload {
            success: true,
            message: message.into(),
            data,
            request_id: request_id.to_string(),
        };
        match serde_json::to_string(&payload) {
            Ok(text) => Self {
                content: vec![ContentItem::text(text)],
                is_error: false,
            },
            Err(_) => Self::fallback_error(),
        }
    }

    /// Render `error` with its code and caller-safe message.
    #[must_use]
    pub fn error(error: &GatewayError, request_id: &str) -> Self {
        let payload = ErrorPayload {
            success: false,
            error_code: error.code().as_str().to_string(),
            error_message: error.public_message(),
            details: error.details(),
            request_id: request_id.to_string(),
        };
        match serde_json::to_string(&payload) {
            Ok(text) => Self {
                content: vec![ContentItem::text(text)],
                is_error: true,
            },
            Err(_) => Self::fallback_error(),
        }
    }

    fn fallback_error() -> Self {
        Self {
            content: vec![ContentItem::text(FALLBACK_ERROR_PAYLOAD)],
            is_error: true,
        }
    }

    /// The envelope as a JSON value, for compliance checks and the wire.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Read the payload back out of the first text item.
    #[must_use]
    pub fn parse_payload(&self) -> Option<Payload> {
        let text = self.content.iter().find_map(ContentItem::as_text)?;
        if self.is_error {
            serde_json::from_str(text).ok().map(Payload::Error)
        } else {
            serde_json::from_str(text).ok().map(Payload::Success)
        }
    }

    /// Error code of an error envelope.
    #[must_use]
    pub fn error_code(&self) -> Option<String> {
        match self.parse_payload()? {
            Payload::Error(payload) => Some(payload.error_code),
            Payload::Success(_) => None,
        }
    }
}
