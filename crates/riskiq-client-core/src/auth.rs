use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const ENV_API_BASE_URL: &str = "RISKIQ_API_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthInputError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url must use http:// or https:// and include a host")]
    InvalidBaseUrl,
    #[error("access code must not be empty")]
    EmptyAccessCode,
}

/// Tenant identity for the authenticated hospital.
///
/// Invariant: present in the credential store if and only if a session
/// token is present. Persisted as JSON in its own slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgIdentity {
    pub id: String,
    pub name: String,
}

impl OrgIdentity {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The single value object every UI surface consumes to learn about auth
/// changes. `loading` is true only for the startup verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub authenticated: bool,
    pub loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
}

impl SessionState {
    /// Initial state, before the startup verification has resolved.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            authenticated: false,
            loading: true,
            org_id: None,
            org_name: None,
        }
    }

    #[must_use]
    pub fn authenticated(identity: &OrgIdentity) -> Self {
        Self {
            authenticated: true,
            loading: false,
            org_id: Some(identity.id.clone()),
            org_name: Some(identity.name.clone()),
        }
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            loading: false,
            org_id: None,
            org_name: None,
        }
    }
}

/// Resolve the API/streaming origin: env override first, local default
/// otherwise. Returns the resolved base url and its source label.
pub fn resolve_api_base_url() -> Result<(String, &'static str), AuthInputError> {
    if let Some(base_url) = env_non_empty(ENV_API_BASE_URL) {
        return normalize_base_url(&base_url).map(|normalized| (normalized, ENV_API_BASE_URL));
    }
    normalize_base_url(DEFAULT_API_BASE_URL).map(|normalized| (normalized, "default_local"))
}

pub fn normalize_base_url(raw: &str) -> Result<String, AuthInputError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthInputError::EmptyBaseUrl);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthInputError::InvalidBaseUrl);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(AuthInputError::InvalidBaseUrl);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(AuthInputError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}

/// Normalize a hospital access code before it is sent to the login
/// endpoint: interior whitespace is collapsed, case and punctuation are
/// preserved (codes look like `HOSP-42`).
pub fn normalize_access_code(raw: &str) -> Result<String, AuthInputError> {
    let collapsed = raw.split_whitespace().collect::<String>();
    if collapsed.is_empty() {
        return Err(AuthInputError::EmptyAccessCode);
    }
    Ok(collapsed)
}
