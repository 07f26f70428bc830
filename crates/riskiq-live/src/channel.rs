//! Connection lifecycle and dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::time::sleep;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::message::{LiveMessage, parse_live_message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Flat reconnect delay, preserved from the dashboard's original behavior:
/// no backoff growth, no jitter, no attempt cap.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

type AlertHandler = Box<dyn Fn(serde_json::Value) + Send + Sync>;
type RiskUpdateHandler = Box<dyn Fn(&str, serde_json::Value) + Send + Sync>;
type RefreshHandler = Box<dyn Fn() + Send + Sync>;

/// Interest-specific callback slots. Unset slots drop their messages.
#[derive(Default)]
pub struct LiveHandlers {
    on_alert: Option<AlertHandler>,
    on_risk_update: Option<RiskUpdateHandler>,
    on_dashboard_refresh: Option<RefreshHandler>,
}

impl LiveHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_alert(mut self, handler: impl Fn(serde_json::Value) + Send + Sync + 'static) -> Self {
        self.on_alert = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_risk_update(
        mut self,
        handler: impl Fn(&str, serde_json::Value) + Send + Sync + 'static,
    ) -> Self {
        self.on_risk_update = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_dashboard_refresh(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_dashboard_refresh = Some(Box::new(handler));
        self
    }

    /// Route one decoded message to its slot. `risk_update` requires a
    /// subject identifier; absence is a tolerated no-op dispatch.
    pub fn dispatch(&self, message: LiveMessage) {
        match message {
            LiveMessage::Alert { data, .. } => {
                if let Some(handler) = &self.on_alert {
                    handler(data.unwrap_or(serde_json::Value::Null));
                }
            }
            LiveMessage::RiskUpdate {
                patient_id, data, ..
            } => {
                if let (Some(handler), Some(patient_id)) = (&self.on_risk_update, patient_id) {
                    handler(&patient_id, data.unwrap_or(serde_json::Value::Null));
                }
            }
            LiveMessage::DashboardRefresh { .. } => {
                if let Some(handler) = &self.on_dashboard_refresh {
                    handler();
                }
            }
            LiveMessage::Pong => debug!("live keepalive pong"),
            LiveMessage::Unknown => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveChannelConfig {
    pub url: Url,
    pub reconnect_delay: Duration,
    /// Cap on connection attempts, `None` in production (the channel
    /// retries for the lifetime of its owner). Tests use it to bound the
    /// loop.
    pub max_attempts: Option<usize>,
}

impl LiveChannelConfig {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

/// One logical streaming connection.
///
/// Per-attempt lifecycle is `Connecting → Open → Closed`; every closure —
/// graceful, erroneous, or a failed connection construction — schedules
/// exactly one reattempt after the fixed delay. [`shutdown`](Self::shutdown)
/// is the only terminal state.
pub struct LiveChannel {
    config: LiveChannelConfig,
    handlers: Arc<LiveHandlers>,
    connected: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl LiveChannel {
    #[must_use]
    pub fn new(config: LiveChannelConfig, handlers: LiveHandlers) -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            config,
            handlers: Arc::new(handlers),
            connected: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicUsize::new(0)),
            writer: Arc::new(Mutex::new(None)),
            shutdown_tx,
            started: AtomicBool::new(false),
        }
    }

    /// Externally observable connectivity flag, for the UI indicator.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of connection attempts made so far.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Start the connection loop. Fire-and-forget: callers do not await
    /// connection establishment; progress is visible via
    /// [`is_connected`](Self::is_connected).
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("live channel already started");
            return;
        }

        let config = self.config.clone();
        let handlers = Arc::clone(&self.handlers);
        let connected = Arc::clone(&self.connected);
        let attempts = Arc::clone(&self.attempts);
        let writer = Arc::clone(&self.writer);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                if let Some(max) = config.max_attempts
                    && attempts.load(Ordering::SeqCst) >= max
                {
                    break;
                }
                attempts.fetch_add(1, Ordering::SeqCst);

                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    result = connect_async(config.url.as_str()) => match result {
                        Ok((stream, _response)) => {
                            debug!("live channel open: {}", config.url);
                            let (write_half, read_half) = stream.split();
                            *writer.lock().await = Some(write_half);
                            connected.store(true, Ordering::SeqCst);

                            read_until_closed(read_half, &handlers, &mut shutdown_rx).await;

                            connected.store(false, Ordering::SeqCst);
                            // An error leaves the transport ambiguous;
                            // force an explicit close either way.
                            if let Some(mut write_half) = writer.lock().await.take() {
                                let _ = write_half.send(Message::Close(None)).await;
                            }
                            debug!("live channel closed: {}", config.url);
                        }
                        Err(error) => {
                            warn!("live channel connect failed: {}", error);
                        }
                    },
                }

                if *shutdown_rx.borrow() {
                    break;
                }
                // Closed → schedule exactly one reattempt after the fixed
                // delay, unless torn down first.
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    () = sleep(config.reconnect_delay) => {}
                }
            }

            connected.store(false, Ordering::SeqCst);
        });
    }

    /// Outbound send, permitted only while the transport is open; a send
    /// while not open is a silent no-op — never an error, never queued.
    pub async fn send_text(&self, text: &str) {
        if !self.is_connected() {
            return;
        }
        let mut guard = self.writer.lock().await;
        if let Some(write_half) = guard.as_mut()
            && let Err(error) = write_half.send(Message::Text(text.into())).await
        {
            warn!("live channel send failed: {}", error);
        }
    }

    pub async fn send_json(&self, value: &serde_json::Value) {
        match serde_json::to_string(value) {
            Ok(text) => self.send_text(&text).await,
            Err(error) => warn!("unserializable outbound frame: {}", error),
        }
    }

    /// Keepalive probe; the server answers with a `pong` frame.
    pub async fn send_ping(&self) {
        self.send_text("ping").await;
    }

    /// Teardown: cancels the pending reconnection timer, closes the live
    /// transport, and stops the loop permanently. No reconnection attempt
    /// fires afterwards.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        if let Some(mut write_half) = self.writer.lock().await.take() {
            let _ = write_half.send(Message::Close(None)).await;
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Process inbound frames in arrival order until the transport closes,
/// errors, or the channel is torn down.
async fn read_until_closed(
    mut reader: WsReader,
    handlers: &LiveHandlers,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(message) = parse_live_message(&text) {
                        handlers.dispatch(message);
                    }
                }
                // tungstenite answers pings at the protocol level.
                Some(Ok(Message::Ping(_)) | Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!("live transport error: {}", error);
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use serde_json::json;

    fn counting_handlers() -> (LiveHandlers, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let alerts = Arc::new(AtomicUsize::new(0));
        let risks = Arc::new(AtomicUsize::new(0));
        let refreshes = Arc::new(AtomicUsize::new(0));

        let handlers = LiveHandlers::new()
            .on_alert({
                let alerts = Arc::clone(&alerts);
                move |_data| {
                    alerts.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_risk_update({
                let risks = Arc::clone(&risks);
                move |patient_id, _data| {
                    assert!(!patient_id.is_empty());
                    risks.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_dashboard_refresh({
                let refreshes = Arc::clone(&refreshes);
                move || {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                }
            });

        (handlers, alerts, risks, refreshes)
    }

    #[test]
    fn dispatch_routes_by_type() {
        let (handlers, alerts, risks, refreshes) = counting_handlers();

        handlers.dispatch(LiveMessage::Alert {
            data: Some(json!({"severity": "critical"})),
            timestamp: None,
        });
        handlers.dispatch(LiveMessage::RiskUpdate {
            patient_id: Some("p7".to_string()),
            data: Some(json!({"risk_score": 0.91})),
            timestamp: None,
        });
        handlers.dispatch(LiveMessage::DashboardRefresh { timestamp: None });

        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        assert_eq!(risks.load(Ordering::SeqCst), 1);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn risk_update_without_subject_is_a_no_op() {
        let (handlers, _alerts, risks, _refreshes) = counting_handlers();

        handlers.dispatch(LiveMessage::RiskUpdate {
            patient_id: None,
            data: Some(json!({})),
            timestamp: None,
        });

        assert_eq!(risks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_and_pong_messages_are_consumed_silently() {
        let (handlers, alerts, risks, refreshes) = counting_handlers();

        handlers.dispatch(LiveMessage::Unknown);
        handlers.dispatch(LiveMessage::Pong);

        assert_eq!(alerts.load(Ordering::SeqCst), 0);
        assert_eq!(risks.load(Ordering::SeqCst), 0);
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn malformed_frame_then_well_formed_frame_still_dispatches() {
        let (handlers, _alerts, _risks, refreshes) = counting_handlers();

        // The malformed frame is dropped at parse time; dispatch never
        // sees it and later frames flow through untouched.
        assert!(parse_live_message("{broken").is_none());
        if let Some(message) = parse_live_message(r#"{"type":"dashboard_refresh"}"#) {
            handlers.dispatch(message);
        }

        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    fn unreachable_config(delay_ms: u64, max_attempts: Option<usize>) -> LiveChannelConfig {
        // Nothing listens on the discard port; construction fails fast.
        let url = Url::parse("ws://127.0.0.1:9/ws/live").expect("url");
        LiveChannelConfig {
            url,
            reconnect_delay: Duration::from_millis(delay_ms),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn failed_connection_is_rescheduled_after_the_fixed_delay() {
        let channel = LiveChannel::new(unreachable_config(20, None), LiveHandlers::new());
        channel.start();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!channel.is_connected());
        assert!(
            channel.connect_attempts() >= 2,
            "expected repeated attempts, saw {}",
            channel.connect_attempts()
        );

        channel.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_the_pending_reconnect() {
        let channel = LiveChannel::new(unreachable_config(50, None), LiveHandlers::new());
        channel.start();

        // Let the first attempt fail, then tear down inside the delay
        // window.
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.shutdown().await;
        let attempts_at_shutdown = channel.connect_attempts();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(channel.connect_attempts(), attempts_at_shutdown);
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn attempt_cap_bounds_the_loop() {
        let channel = LiveChannel::new(unreachable_config(10, Some(3)), LiveHandlers::new());
        channel.start();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(channel.connect_attempts(), 3);
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn send_while_not_open_is_a_silent_no_op() {
        let channel = LiveChannel::new(unreachable_config(1000, Some(1)), LiveHandlers::new());

        // Never started, never connected: sends must neither error nor
        // panic.
        channel.send_ping().await;
        channel.send_text("ping").await;
        channel.send_json(&json!({"type": "ping"})).await;

        assert!(!channel.is_connected());
    }
}
