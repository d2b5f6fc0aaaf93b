use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VoyageError;

/// Uniform response body: `{success, message, data?}` or `{success, message, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ApiResponse {
    pub fn ok(data: Option<Value>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>, error: Option<Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error,
        }
    }

    /// Failure envelope for a core error; `error` carries its kind and detail.
    pub fn from_error(message: impl Into<String>, err: &VoyageError) -> Self {
        Self::err(
            message,
            Some(serde_json::json!({
                "kind": err.kind(),
                "detail": err.to_string(),
            })),
        )
    }
}
