// ── Bridge abstraction ──
//
// Full lifecycle for one bridged device: builds the session, link, sink
// and door, pumps link events into the door, and exposes observable
// connection state for consumers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use garagelink_api::{
    Credentials, DeviceSession, Error as LinkError, Lifecycle, LinkOptions, ProtocolEvent,
    ReconnectConfig, TcpLink,
};

use crate::accessory::GarageDoor;
use crate::config::DeviceConfig;
use crate::error::CoreError;
use crate::sink::WatchSink;
use crate::stream::DoorStateStream;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
    /// The device refused our credentials on the current connection.
    Failed { reason: String },
}

// ── Bridge ───────────────────────────────────────────────────────

/// Entry point for bridging one device.
///
/// Cheaply cloneable via `Arc<BridgeInner>`. Each bridge owns its own
/// session, link and reconciled state; bridges never share anything.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: DeviceConfig,
    link: Arc<TcpLink>,
    sink: Arc<WatchSink>,
    door: GarageDoor,
    connection_state: watch::Sender<ConnectionState>,
    last_event: watch::Sender<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<CoreError>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Create a bridge from configuration. Does NOT connect --
    /// call [`start()`](Self::start) to open the link.
    pub fn new(config: DeviceConfig) -> Self {
        let cancel = CancellationToken::new();
        let session = Arc::new(DeviceSession::new(
            config.name.clone(),
            config.address.clone(),
            Credentials {
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
            },
        ));
        let link = Arc::new(TcpLink::new(
            session,
            build_link_options(&config),
            cancel.child_token(),
        ));
        let sink = Arc::new(WatchSink::new());
        let door = GarageDoor::new(config.name.clone(), link.clone(), sink.clone());
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (last_event, _) = watch::channel(None);

        Self {
            inner: Arc::new(BridgeInner {
                config,
                link,
                sink,
                door,
                connection_state,
                last_event,
                last_error: Mutex::new(None),
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The hub-facing door handle.
    pub fn door(&self) -> &GarageDoor {
        &self.inner.door
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Open the device link and spawn the event pump.
    ///
    /// Returns once the tasks are spawned; the connection itself comes up
    /// asynchronously. Watch [`connection_state()`](Self::connection_state)
    /// or call [`wait_until_ready()`](Self::wait_until_ready).
    pub fn start(&self) -> Result<(), CoreError> {
        let events = self.inner.link.connect()?;
        self.inner
            .connection_state
            .send_replace(ConnectionState::Connecting);

        let bridge = self.clone();
        let cancel = self.inner.cancel.clone();
        self.inner
            .task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tokio::spawn(event_pump_task(bridge, events, cancel)));

        info!(device = self.name(), address = %self.inner.config.address, "bridge started");
        Ok(())
    }

    /// Wait until the link is connected and authenticated.
    ///
    /// Fails early when the device rejects the credentials, or when the
    /// link stops for good (not started, or gave up without reconnecting).
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut rx = self.inner.connection_state.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| {
                matches!(
                    s,
                    ConnectionState::Authenticated
                        | ConnectionState::Failed { .. }
                        | ConnectionState::Disconnected
                )
            }),
        )
        .await;

        let state = match waited {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => return Err(CoreError::NotConnected),
            Err(_) => {
                return Err(CoreError::Timeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        match state {
            ConnectionState::Failed { reason } => {
                Err(CoreError::AuthenticationFailed { message: reason })
            }
            ConnectionState::Disconnected => Err(self
                .inner
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .unwrap_or(CoreError::NotConnected)),
            _ => Ok(()),
        }
    }

    /// Stop the link and the event pump, and wait for both.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.link.shutdown().await;

        let handles: Vec<_> = self
            .inner
            .task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!(device = self.name(), "bridge stopped");
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: start, wait until ready, run closure, shut down.
    ///
    /// Disables auto-reconnect since only a single session is needed.
    pub async fn oneshot<F, Fut, T>(config: DeviceConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Bridge) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.auto_reconnect = false;
        let timeout = cfg.connect_timeout;

        let bridge = Bridge::new(cfg);
        bridge.start()?;
        if let Err(e) = bridge.wait_until_ready(timeout).await {
            bridge.shutdown().await;
            return Err(e);
        }

        let result = f(bridge.clone()).await;
        bridge.shutdown().await;
        result
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// When the last device event arrived, if any.
    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_event.borrow()
    }

    /// Subscribe to device-event arrival times. Changes on every state
    /// change, relay trigger and query response, even when the door
    /// state itself did not move.
    pub fn subscribe_events(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.inner.last_event.subscribe()
    }

    pub fn current_state_stream(&self) -> DoorStateStream {
        self.inner.sink.subscribe_current()
    }

    pub fn target_state_stream(&self) -> DoorStateStream {
        self.inner.sink.subscribe_target()
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Drain the link's event stream in order, one event at a time. Observers
/// are notified only after the door has applied the event.
async fn event_pump_task(
    bridge: Bridge,
    mut events: mpsc::Receiver<ProtocolEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    link_stopped(&bridge);
                    break;
                };
                bridge.inner.door.handle_event(&event);
                track_lifecycle(&bridge, &event);
            }
        }
    }
    debug!(device = bridge.name(), "event pump exiting");
}

/// The link loop has ended without a shutdown, e.g. after exhausting its
/// reconnect budget. A credential failure stays visible as `Failed`.
fn link_stopped(bridge: &Bridge) {
    bridge.inner.connection_state.send_if_modified(|state| {
        if matches!(state, ConnectionState::Failed { .. } | ConnectionState::Disconnected) {
            return false;
        }
        warn!(device = bridge.name(), "link stopped, giving up on device");
        *state = ConnectionState::Disconnected;
        true
    });
}

fn track_lifecycle(bridge: &Bridge, event: &ProtocolEvent) {
    let inner = &bridge.inner;
    let next = match event {
        ProtocolEvent::Lifecycle(Lifecycle::Connected) => ConnectionState::Connected,
        ProtocolEvent::Lifecycle(Lifecycle::Authenticated) => ConnectionState::Authenticated,
        ProtocolEvent::Lifecycle(Lifecycle::Disconnected(_)) => {
            if inner.config.auto_reconnect {
                ConnectionState::Connecting
            } else {
                ConnectionState::Disconnected
            }
        }
        ProtocolEvent::Lifecycle(Lifecycle::Error(err)) => match &**err {
            LinkError::AuthRejected { reason } => ConnectionState::Failed {
                reason: reason.clone(),
            },
            other => {
                *inner
                    .last_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(CoreError::from(other));
                if inner.config.auto_reconnect || inner.link.session().is_connected() {
                    return;
                }
                warn!(device = bridge.name(), error = %err, "link gave up");
                ConnectionState::Disconnected
            }
        },
        ProtocolEvent::StateChange { .. }
        | ProtocolEvent::RelayTrigger { .. }
        | ProtocolEvent::QueryResponse { .. } => {
            inner.last_event.send_replace(Some(Utc::now()));
            return;
        }
    };
    inner.connection_state.send_replace(next);
}

// ── Helpers ──────────────────────────────────────────────────────

/// Build [`LinkOptions`] from the device configuration.
fn build_link_options(config: &DeviceConfig) -> LinkOptions {
    LinkOptions {
        auto_reconnect: config.auto_reconnect,
        connect_timeout: config.connect_timeout,
        reconnect: ReconnectConfig {
            initial_delay: config.reconnect_initial_delay,
            max_delay: config.reconnect_max_delay,
            max_retries: config.reconnect_max_retries,
        },
    }
}

// ── Tests ────────────────────────────────────────────────────────────
