//! Authenticated request gateway for the RiskIQ dashboard API.
//!
//! Every outbound call goes through [`ApiClient`]: bearer-token injection
//! from the credential store, response-status interpretation, and the 401
//! logout cascade. The gateway never retries — sequencing and retries are
//! a caller concern.

pub mod auth;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use reqwest::RequestBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use riskiq_client_core::{CredentialStore, normalize_base_url};

pub use error::{GatewayError, Result, SESSION_EXPIRED_MESSAGE, error_message_from_body};
pub use reqwest::StatusCode;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Capability interface over the login-surface redirect.
///
/// Contract: `to_login` is idempotent. Concurrent in-flight requests can
/// all hit 401 at once; sending an already-redirected UI to login again
/// must be a no-op, never an error.
pub trait Navigator: Send + Sync {
    fn to_login(&self);
}

/// Navigator for headless contexts (tests, probes, background jobs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn to_login(&self) {}
}

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl ApiClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(
        config: ApiClientConfig,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            http: reqwest::Client::new(),
            store,
            navigator,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(GatewayError::InvalidPath)?;
        self.dispatch(self.prepared(self.http.get(url))).await
    }

    pub async fn post_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(GatewayError::InvalidPath)?;
        self.dispatch(self.prepared(self.http.post(url)).json(payload))
            .await
    }

    /// POST with no request body (the logout endpoint takes none).
    pub async fn post_empty<Res>(&self, path: &str) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(GatewayError::InvalidPath)?;
        self.dispatch(self.prepared(self.http.post(url))).await
    }

    pub async fn put_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(GatewayError::InvalidPath)?;
        self.dispatch(self.prepared(self.http.put(url)).json(payload))
            .await
    }

    pub async fn delete_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(GatewayError::InvalidPath)?;
        self.dispatch(self.prepared(self.http.delete(url))).await
    }

    /// Multipart upload of a single file part. The transport sets its own
    /// multipart `Content-Type` boundary header.
    pub async fn upload<T>(&self, path: &str, file_name: &str, bytes: Vec<u8>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(GatewayError::InvalidPath)?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.dispatch(self.prepared(self.http.post(url)).multipart(form))
            .await
    }

    fn prepared(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout);
        match self.store.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn dispatch<T>(&self, request: RequestBuilder) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await.map_err(|error| GatewayError::Request {
            message: error.to_string(),
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| GatewayError::Read {
                message: error.to_string(),
            })?;

        let result = interpret_parts(status, &bytes);
        if matches!(result, Err(GatewayError::SessionExpired)) {
            self.expire_session();
        }
        result
    }

    /// The gateway's only autonomous action: on 401, drop the local
    /// session and send the UI to login. Both steps are idempotent, so
    /// racing 401s from parallel requests are benign.
    fn expire_session(&self) {
        debug!("received 401, clearing session and redirecting to login");
        self.store.clear();
        self.navigator.to_login();
    }
}

/// Response interpretation, in priority order: 401, other non-2xx, typed
/// decode of a 2xx body.
pub(crate) fn interpret_parts<T>(status: StatusCode, bytes: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    if status == StatusCode::UNAUTHORIZED {
        return Err(GatewayError::SessionExpired);
    }
    if !status.is_success() {
        return Err(GatewayError::Api {
            status,
            message: error_message_from_body(status, bytes),
        });
    }
    serde_json::from_slice::<T>(bytes).map_err(|error| GatewayError::Decode {
        message: error.to_string(),
    })
}
