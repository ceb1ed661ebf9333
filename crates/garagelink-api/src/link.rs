//! Device link with auto-reconnect.
//!
//! Holds one persistent TCP connection to a device, streams decoded
//! [`ProtocolEvent`]s through an [`mpsc`] channel in arrival order, and
//! accepts fire-and-forget requests. Reconnects with exponential backoff
//! plus jitter when `auto_reconnect` is set.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use garagelink_api::{DeviceLink, DeviceSession, LinkOptions, TcpLink};
//! use tokio_util::sync::CancellationToken;
//!
//! let session = Arc::new(DeviceSession::new("Garage", "192.168.1.40:8989", credentials));
//! let link = TcpLink::new(session, LinkOptions::default(), CancellationToken::new());
//! let mut events = link.connect()?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//!
//! link.shutdown().await;
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::event::{Lifecycle, ProtocolEvent};
use crate::frame::{self, Frame, Request};
use crate::session::DeviceSession;

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;
const REQUEST_CHANNEL_CAPACITY: usize = 16;

// ── DeviceLink ───────────────────────────────────────────────────────

/// Command surface of a device connection.
///
/// Every method returns immediately. Requests are queued for the
/// connection task; there is no acknowledgement beyond whatever the
/// device later sends back as a [`ProtocolEvent`].
pub trait DeviceLink: Send + Sync {
    fn is_connected(&self) -> bool;
    fn is_authenticated(&self) -> bool;
    fn authenticate(&self);
    fn send_query(&self);
    fn send_open(&self);
    fn send_close(&self);
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Connection tuning for a [`TcpLink`].
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Reconnect after the connection drops or a connect attempt fails.
    pub auto_reconnect: bool,
    /// Bound on a single TCP connect attempt.
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ── TcpLink ──────────────────────────────────────────────────────────

/// Handle to one device connection.
///
/// Created idle; [`connect`](Self::connect) spawns the background task
/// and hands back the event receiver.
pub struct TcpLink {
    session: Arc<DeviceSession>,
    options: LinkOptions,
    request_tx: mpsc::Sender<Request>,
    request_rx: Mutex<Option<mpsc::Receiver<Request>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpLink {
    pub fn new(session: Arc<DeviceSession>, options: LinkOptions, cancel: CancellationToken) -> Self {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        Self {
            session,
            options,
            request_tx,
            request_rx: Mutex::new(Some(request_rx)),
            cancel,
            task: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }

    /// Spawn the connection loop and return the event stream.
    ///
    /// Must be called from within a tokio runtime. The first connection
    /// attempt happens asynchronously; `Connected` arrives on the
    /// returned receiver once the socket is up.
    pub fn connect(&self) -> Result<mpsc::Receiver<ProtocolEvent>, Error> {
        let request_rx = self
            .request_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::AlreadyStarted)?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let handle = tokio::spawn(link_loop(
            Arc::clone(&self.session),
            self.options.clone(),
            request_rx,
            event_tx,
            self.cancel.clone(),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(event_rx)
    }

    /// Stop the connection loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn enqueue(&self, request: Request) {
        match self.request_tx.try_send(request) {
            Ok(()) => {
                tracing::trace!(device = self.session.name(), ?request, "request queued");
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    device = self.session.name(),
                    ?request,
                    "request queue full, dropping request"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(
                    device = self.session.name(),
                    ?request,
                    "link stopped, dropping request"
                );
            }
        }
    }
}

impl DeviceLink for TcpLink {
    fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    fn authenticate(&self) {
        self.enqueue(Request::Authenticate);
    }

    fn send_query(&self) {
        self.enqueue(Request::Query);
    }

    fn send_open(&self) {
        self.enqueue(Request::Open);
    }

    fn send_close(&self) {
        self.enqueue(Request::Close);
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → serve → on drop, backoff → reconnect.
async fn link_loop(
    session: Arc<DeviceSession>,
    options: LinkOptions,
    mut request_rx: mpsc::Receiver<Request>,
    event_tx: mpsc::Sender<ProtocolEvent>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let established = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            established = run_session(&session, &options, &mut request_rx, &event_tx, &cancel) => established,
        };

        if cancel.is_cancelled() {
            break;
        }

        if !options.auto_reconnect {
            tracing::info!(device = session.name(), "auto-reconnect disabled, link stopping");
            break;
        }

        // A session that came up resets the failure count.
        if established {
            attempt = 0;
        }

        if let Some(max) = options.reconnect.max_retries {
            if attempt >= max {
                tracing::error!(
                    device = session.name(),
                    max_retries = max,
                    "reconnection limit reached, giving up"
                );
                break;
            }
        }

        let delay = calculate_backoff(attempt, &options.reconnect);
        tracing::info!(
            device = session.name(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    session.set_connected(false);
    tracing::debug!(device = session.name(), "link loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Connect once and serve the session until it drops.
///
/// Emits `Connected` / `Disconnected` around an established session, or a
/// single `Error` when the connect attempt itself fails. Returns whether
/// the connection was established.
async fn run_session(
    session: &DeviceSession,
    options: &LinkOptions,
    request_rx: &mut mpsc::Receiver<Request>,
    event_tx: &mpsc::Sender<ProtocolEvent>,
    cancel: &CancellationToken,
) -> bool {
    tracing::info!(device = session.name(), address = session.address(), "connecting to device");

    let stream = match open_stream(session.address(), options.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            if e.is_transient() {
                tracing::warn!(device = session.name(), error = %e, "connect failed");
            } else {
                tracing::error!(device = session.name(), error = %e, "connect failed");
            }
            emit(event_tx, Lifecycle::Error(Arc::new(e)).into()).await;
            return false;
        }
    };

    discard_stale_requests(session, request_rx);
    session.set_connected(true);
    tracing::info!(device = session.name(), "device connected");
    emit(event_tx, Lifecycle::Connected.into()).await;

    let result = serve(stream, session, request_rx, event_tx, cancel).await;

    session.set_connected(false);
    let reason = match result {
        Ok(()) => "connection closed".to_owned(),
        Err(e) => {
            tracing::warn!(device = session.name(), error = %e, "device session failed");
            e.to_string()
        }
    };
    tracing::info!(device = session.name(), %reason, "device disconnected");
    emit(event_tx, Lifecycle::Disconnected(reason).into()).await;

    true
}

async fn open_stream(address: &str, timeout: Duration) -> Result<TcpStream, Error> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(Error::Connect {
            address: address.to_owned(),
            reason: e.to_string(),
        }),
        Err(_) => Err(Error::ConnectTimeout {
            timeout_secs: timeout.as_secs(),
        }),
    }
}

/// Requests queued while offline belong to a session that no longer exists.
fn discard_stale_requests(session: &DeviceSession, request_rx: &mut mpsc::Receiver<Request>) {
    while let Ok(request) = request_rx.try_recv() {
        tracing::debug!(device = session.name(), ?request, "discarding stale request");
    }
}

/// Read frames and write queued requests until the socket closes.
async fn serve(
    stream: TcpStream,
    session: &DeviceSession,
    request_rx: &mut mpsc::Receiver<Request>,
    event_tx: &mpsc::Sender<ProtocolEvent>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            request = request_rx.recv() => {
                // Every link handle is gone; nobody can issue requests anymore.
                let Some(request) = request else { return Ok(()) };
                let mut line = frame::encode(request, session.credentials())?;
                line.push('\n');
                write_half.write_all(line.as_bytes()).await?;
                tracing::debug!(device = session.name(), ?request, "request sent");
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => handle_line(&line, session, event_tx).await,
                    None => return Ok(()),
                }
            }
        }
    }
}

// ── Frame dispatch ───────────────────────────────────────────────────

async fn handle_line(line: &str, session: &DeviceSession, event_tx: &mpsc::Sender<ProtocolEvent>) {
    if line.trim().is_empty() {
        return;
    }

    let frame = match frame::decode(line) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(device = session.name(), error = %e, "skipping undecodable frame");
            return;
        }
    };

    let event = match frame {
        Frame::Handshake { accepted: true, .. } => {
            session.set_authenticated(true);
            tracing::info!(device = session.name(), "device authenticated");
            Lifecycle::Authenticated.into()
        }
        Frame::Handshake {
            accepted: false,
            reason,
        } => {
            session.set_authenticated(false);
            let reason = reason.unwrap_or_else(|| "no reason given".into());
            tracing::warn!(device = session.name(), %reason, "authentication rejected");
            Lifecycle::Error(Arc::new(Error::AuthRejected { reason })).into()
        }
        Frame::Event(event) => event.into(),
        Frame::Response { state } => ProtocolEvent::QueryResponse { state },
    };

    emit(event_tx, event).await;
}

async fn emit(event_tx: &mpsc::Sender<ProtocolEvent>, event: ProtocolEvent) {
    // A closed receiver just means nobody is listening right now.
    let _ = event_tx.send(event).await;
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 + jitter)`
///
/// Jitter is +-25% so that several bridges restarting together do not
/// hammer a gateway in lockstep.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::session::Credentials;

    fn idle_link() -> TcpLink {
        let session = Arc::new(DeviceSession::new(
            "test",
            "127.0.0.1:1",
            Credentials {
                api_key: SecretString::from("k".to_string()),
                api_secret: SecretString::from("s".to_string()),
            },
        ));
        TcpLink::new(session, LinkOptions::default(), CancellationToken::new())
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        assert!(
            d10 <= Duration::from_millis(12_500),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );

        // Large attempt counts must not overflow the exponent.
        let huge = calculate_backoff(u32::MAX, &config);
        assert!(huge <= Duration::from_millis(12_500));
    }

    #[test]
    fn idle_link_reports_offline() {
        let link = idle_link();
        assert!(!link.is_connected());
        assert!(!link.is_authenticated());
    }

    #[test]
    fn requests_queue_until_capacity() {
        let link = idle_link();
        for _ in 0..REQUEST_CHANNEL_CAPACITY + 4 {
            link.send_query();
        }

        let mut rx = link.request_rx.lock().unwrap().take().unwrap();
        let mut queued = 0;
        while rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, REQUEST_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn connect_twice_is_rejected() {
        let link = idle_link();
        let _events = link.connect().unwrap();
        assert!(matches!(link.connect(), Err(Error::AlreadyStarted)));
        link.shutdown().await;
    }
}
