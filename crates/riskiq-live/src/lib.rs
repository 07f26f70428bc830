//! Live-update channel for the RiskIQ dashboard client.
//!
//! Maintains a single logical streaming connection that survives transient
//! network loss: inbound frames are decoded into [`LiveMessage`]s and
//! routed to interest-specific handler slots; any closure schedules a
//! fixed-delay reattempt until the channel is torn down.

pub mod channel;
pub mod message;

use thiserror::Error;
use url::Url;

pub use channel::{DEFAULT_RECONNECT_DELAY, LiveChannel, LiveChannelConfig, LiveHandlers};
pub use message::{LiveMessage, parse_live_message};

/// Fixed path suffix of the streaming endpoint.
pub const LIVE_PATH: &str = "/ws/live";

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("base url must use http:// or https://: {0}")]
    InvalidBaseUrl(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Derive the streaming endpoint from the gateway's base address: the
/// transport scheme is substituted (`http`→`ws`, `https`→`wss`) and the
/// fixed path appended. Pure string work, no I/O.
pub fn live_endpoint(base_url: &str) -> Result<Url, LiveError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let rewritten = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}{LIVE_PATH}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}{LIVE_PATH}")
    } else {
        return Err(LiveError::InvalidBaseUrl(trimmed.to_string()));
    };
    Ok(Url::parse(&rewritten)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_http_maps_to_plain_streaming() {
        let url = live_endpoint("http://127.0.0.1:8000").expect("derived");
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/ws/live");
    }

    #[test]
    fn secure_http_maps_to_secure_streaming() {
        let url = live_endpoint("https://riskiq.example.com/").expect("derived");
        assert_eq!(url.as_str(), "wss://riskiq.example.com/ws/live");
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let error = live_endpoint("ftp://riskiq.example.com").expect_err("rejected");
        assert!(matches!(error, LiveError::InvalidBaseUrl(_)));
    }
}
