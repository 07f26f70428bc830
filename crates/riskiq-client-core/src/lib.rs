//! Shared client core for the RiskIQ dashboard: session value types,
//! input/configuration normalization, and credential persistence.

pub mod auth;
pub mod store;

pub use auth::{
    AuthInputError, DEFAULT_API_BASE_URL, ENV_API_BASE_URL, OrgIdentity, SessionState,
    normalize_access_code, normalize_base_url, resolve_api_base_url,
};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
