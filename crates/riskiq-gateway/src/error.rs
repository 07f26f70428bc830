//! Gateway error taxonomy.

use reqwest::StatusCode;
use thiserror::Error;

/// Fixed user-facing message for the 401 path. The response body is
/// deliberately ignored for expired sessions.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Any 401 response. Terminal for the call: the credential store has
    /// been cleared and the UI sent to the login surface by the time the
    /// caller sees this.
    #[error("Session expired. Please login again.")]
    SessionExpired,

    /// Any other non-2xx response, with the server's error detail when the
    /// body carried one. Recoverable; the message is shown verbatim.
    #[error("{message}")]
    Api { status: StatusCode, message: String },

    #[error("request failed: {message}")]
    Request { message: String },

    #[error("failed to read response body: {message}")]
    Read { message: String },

    #[error("failed to decode response body: {message}")]
    Decode { message: String },

    #[error("invalid request path")]
    InvalidPath,

    #[error(transparent)]
    Input(#[from] riskiq_client_core::AuthInputError),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Extract a human-readable message from a non-2xx body: the API's
/// `{"detail": ...}` envelope when present, a generic status line
/// otherwise.
pub fn error_message_from_body(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body)
        && let Some(detail) = value.get("detail").and_then(|detail| detail.as_str())
        && !detail.trim().is_empty()
    {
        return detail.to_string();
    }
    format!("API Error: {}", status.as_u16())
}
