//! Session controller: owns the authenticated/unauthenticated state
//! machine, performs login/logout/verify through the gateway, and
//! publishes every transition over a watch channel.
//!
//! Exactly one [`SessionState`] value is live per controller; the watch
//! channel is the single source of truth for every UI surface, including
//! the decision of whether the live channel should be running. The
//! channel lives in [`SessionExpiry`], a cloneable handle the gateway's
//! 401 cascade fires through, so a mid-session expiry lands in the
//! published state just like an explicit logout.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use riskiq_client_core::{CredentialStore, OrgIdentity, SessionState, normalize_access_code};
use riskiq_gateway::auth::{LoginResponse, VerifyResponse};
use riskiq_gateway::{ApiClient, GatewayError, Navigator};

/// Transport seam between the controller and the gateway, so the state
/// machine is constructible with a fake transport in tests.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, access_code: &str) -> Result<LoginResponse, GatewayError>;
    async fn logout(&self) -> Result<(), GatewayError>;
    async fn verify(&self) -> Result<VerifyResponse, GatewayError>;
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, access_code: &str) -> Result<LoginResponse, GatewayError> {
        ApiClient::login(self, access_code).await
    }

    async fn logout(&self) -> Result<(), GatewayError> {
        ApiClient::logout(self).await
    }

    async fn verify(&self) -> Result<VerifyResponse, GatewayError> {
        ApiClient::verify(self).await
    }
}

/// Cloneable end-of-session handle.
///
/// The gateway is constructed before the controller, so the watch channel
/// lives here: create the handle first, hand a clone to [`ApiClient`] as
/// its `Navigator`, then build the controller from the same handle with
/// [`SessionController::with_expiry`]. A 401 on any request then publishes
/// `Unauthenticated` through the same channel the controller uses.
#[derive(Clone)]
pub struct SessionExpiry {
    store: Arc<dyn CredentialStore>,
    tx: watch::Sender<SessionState>,
}

impl SessionExpiry {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (tx, _rx) = watch::channel(SessionState::unknown());
        Self { store, tx }
    }

    /// Synchronous session teardown: store cleared, `Unauthenticated`
    /// published. Idempotent, so racing 401s from parallel requests are
    /// benign.
    pub fn expire(&self) {
        self.store.clear();
        self.tx.send_replace(SessionState::unauthenticated());
    }
}

impl Navigator for SessionExpiry {
    /// Routes the gateway's login redirect into the published state. UI
    /// hosts that also change routes wrap this handle in their own
    /// navigator and call [`expire`](Self::expire) before navigating.
    fn to_login(&self) {
        self.expire();
    }
}

pub struct SessionController {
    api: Arc<dyn AuthApi>,
    expiry: SessionExpiry,
}

impl SessionController {
    /// Construct in the `Unknown` state (`loading=true`). Callers run
    /// [`initialize`](Self::initialize) once to resolve it; `Unknown` is
    /// never re-entered afterwards.
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_expiry(api, SessionExpiry::new(store))
    }

    /// Construct over an existing expiry handle, sharing its watch
    /// channel. This is the wiring used with a real gateway: the handle
    /// doubles as the gateway's `Navigator`.
    #[must_use]
    pub fn with_expiry(api: Arc<dyn AuthApi>, expiry: SessionExpiry) -> Self {
        Self { api, expiry }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.expiry.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> SessionState {
        self.expiry.tx.borrow().clone()
    }

    /// Startup verification pass.
    ///
    /// No stored token short-circuits to `Unauthenticated` without any
    /// network traffic. With a token, the server's verdict is final: a
    /// `valid=false` answer, a transport failure, and a decode failure all
    /// end the same way — store cleared, `Unauthenticated`.
    pub async fn initialize(&self) {
        if self.expiry.store.token().is_none() {
            self.publish(SessionState::unauthenticated());
            return;
        }

        match self.api.verify().await {
            Ok(response) if response.valid => {
                // The server's identity is authoritative for display. The
                // store keeps its cached copy; it is only rewritten when a
                // token is re-issued at login.
                let identity = match (response.hospital_id, response.hospital_name) {
                    (Some(id), Some(name)) => Some(OrgIdentity::new(id, name)),
                    _ => self.expiry.store.identity(),
                };
                match identity {
                    Some(identity) => self.publish(SessionState::authenticated(&identity)),
                    None => {
                        debug!("verify succeeded without identity and none cached, dropping session");
                        self.expiry.expire();
                    }
                }
            }
            Ok(_) => self.expiry.expire(),
            Err(error) => {
                debug!("startup verification failed: {}", error);
                self.expiry.expire();
            }
        }
    }

    /// Login with a hospital access code. On failure the error propagates
    /// unchanged and the published state does not move.
    pub async fn login(&self, access_code: &str) -> Result<LoginResponse, GatewayError> {
        let code = normalize_access_code(access_code)?;
        let response = self.api.login(&code).await?;

        let identity = OrgIdentity::new(&response.hospital_id, &response.hospital_name);
        self.expiry.store.set(&response.token, &identity);
        self.publish(SessionState::authenticated(&identity));
        Ok(response)
    }

    /// Logout. The remote call is best-effort: a network failure must not
    /// keep a dead session alive locally.
    pub async fn logout(&self) {
        if let Err(error) = self.api.logout().await {
            debug!("remote logout failed, clearing local session anyway: {}", error);
        }
        self.expiry.expire();
    }

    fn publish(&self, state: SessionState) {
        // send_replace so the current value advances even with no
        // subscribers mounted yet.
        self.expiry.tx.send_replace(state);
    }
}
