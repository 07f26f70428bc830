//! Typed inbound frames.

use serde::Deserialize;
use tracing::warn;

/// Inbound live frame, tagged by `type`.
///
/// `Unknown` absorbs unrecognized tags so newer servers can add message
/// kinds without breaking older clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    Alert {
        #[serde(default)]
        data: Option<serde_json::Value>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    RiskUpdate {
        #[serde(default)]
        patient_id: Option<String>,
        #[serde(default)]
        data: Option<serde_json::Value>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    DashboardRefresh {
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// Keepalive answer to an outbound `ping`.
    Pong,
    #[serde(other)]
    Unknown,
}

/// Parse one frame body. A malformed frame is logged and dropped — it
/// never crashes the channel or blocks later frames.
pub fn parse_live_message(text: &str) -> Option<LiveMessage> {
    match serde_json::from_str(text) {
        Ok(message) => Some(message),
        Err(error) => {
            warn!("dropping malformed live frame: {}", error);
            None
        }
    }
}
