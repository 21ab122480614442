//! reqwest adapters for the hosted backend (object storage plus edge functions).

mod backend;

pub use backend::{HttpBackend, HttpBackendConfig};

use crate::transfer::TransportError;

const MAX_ERROR_BODY: usize = 200;

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if let Some(status) = err.status() {
        TransportError::status(status.as_u16(), err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Pull a human-readable message out of an error body.
///
/// Backends answer with `{"error": ...}`, `{"message": ...}` or
/// `{"errorMessage": ...}`; anything else is truncated raw text.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["errorMessage", "message", "error"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }
    body.trim().chars().take(MAX_ERROR_BODY).collect()
}
