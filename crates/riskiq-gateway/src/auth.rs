//! Auth endpoint wrappers and their wire shapes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ApiClient, Result};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub access_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub hospital_id: String,
    pub hospital_name: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(default)]
    pub hospital_id: Option<String>,
    #[serde(default)]
    pub hospital_name: Option<String>,
}

/// Response of the one multipart endpoint, the patient CSV import.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportSummary {
    pub imported: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub total_errors: u64,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiClient {
    pub async fn login(&self, access_code: &str) -> Result<LoginResponse> {
        let request = LoginRequest {
            access_code: access_code.to_string(),
        };
        self.post_json("/api/auth/login", &request).await
    }

    /// Invalidate the server-side session. The response body carries only
    /// an acknowledgement message and is discarded.
    pub async fn logout(&self) -> Result<()> {
        let ack: serde_json::Value = self.post_empty("/api/auth/logout").await?;
        debug!("logout acknowledged: {}", ack);
        Ok(())
    }

    pub async fn verify(&self) -> Result<VerifyResponse> {
        self.get_json("/api/auth/verify").await
    }

    pub async fn import_patients(&self, file_name: &str, csv_bytes: Vec<u8>) -> Result<ImportSummary> {
        self.upload("/api/patients/import", file_name, csv_bytes).await
    }
}
