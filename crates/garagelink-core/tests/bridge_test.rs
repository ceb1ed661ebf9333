// Integration tests for `Bridge` against a scripted local device.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

use garagelink_core::{Bridge, ConnectionState, CoreError, DeviceConfig, DoorState};

// ── Helpers ─────────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    (listener, address)
}

fn config(address: &str) -> DeviceConfig {
    let mut cfg = DeviceConfig::new(
        "Garage",
        address,
        SecretString::from("key-1".to_string()),
        SecretString::from("secret-1".to_string()),
    );
    cfg.connect_timeout = Duration::from_secs(2);
    cfg.reconnect_initial_delay = Duration::from_millis(20);
    cfg.reconnect_max_delay = Duration::from_millis(100);
    cfg
}

struct Device {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Device {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .expect("timed out waiting for bridge to connect")
            .unwrap();
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn read_json(&mut self) -> serde_json::Value {
        let line = tokio::time::timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for request")
            .unwrap()
            .expect("bridge closed the socket");
        serde_json::from_str(&line).unwrap()
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Read the handshake and answer it.
    async fn handshake(&mut self, accept: bool) {
        let auth = self.read_json().await;
        assert_eq!(auth["type"], "auth");
        assert_eq!(auth["key"], "key-1");
        assert_eq!(auth["secret"], "secret-1");
        if accept {
            self.send(r#"{"type":"auth","ok":true}"#).await;
        } else {
            self.send(r#"{"type":"auth","ok":false,"reason":"bad secret"}"#)
                .await;
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn bridge_authenticates_and_reconciles() {
    let (listener, address) = listener().await;
    let bridge = Bridge::new(config(&address));
    let mut current = bridge.current_state_stream();

    bridge.start().unwrap();
    let mut device = Device::accept(&listener).await;
    device.handshake(true).await;
    bridge.wait_until_ready(WAIT).await.unwrap();
    assert_eq!(*bridge.connection_state().borrow(), ConnectionState::Authenticated);

    device
        .send(r#"{"type":"event","event":"state","state":"closed"}"#)
        .await;
    let observed = tokio::time::timeout(WAIT, current.changed()).await.unwrap();
    assert_eq!(observed, Some(DoorState::Closed));
    assert!(bridge.last_event().is_some());

    let door = bridge.door();
    assert_eq!(door.get_target_state().unwrap(), DoorState::Closed);
    assert_eq!(door.get_current_state().unwrap(), DoorState::Closed);
    assert_eq!(device.read_json().await["type"], "query");

    door.set_target_state(DoorState::Open).unwrap();
    let command = device.read_json().await;
    assert_eq!(command["type"], "command");
    assert_eq!(command["action"], "open");

    // Repeating the target never re-actuates the door.
    door.set_target_state(DoorState::Open).unwrap();
    device
        .send(r#"{"type":"event","event":"relay","state":"closed","keyType":"api key"}"#)
        .await;
    let observed = tokio::time::timeout(WAIT, current.changed()).await.unwrap();
    assert_eq!(observed, Some(DoorState::Opening));

    bridge.shutdown().await;
    assert_eq!(*bridge.connection_state().borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn rejected_credentials_fail_readiness() {
    let (listener, address) = listener().await;
    let bridge = Bridge::new(config(&address));

    bridge.start().unwrap();
    let mut device = Device::accept(&listener).await;
    device.handshake(false).await;

    let err = bridge.wait_until_ready(WAIT).await.unwrap_err();
    assert_eq!(
        err,
        CoreError::AuthenticationFailed {
            message: "bad secret".into()
        }
    );
    assert_eq!(
        bridge.door().set_target_state(DoorState::Open).unwrap_err(),
        CoreError::NotConnected
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn oneshot_reads_current_state() {
    let (listener, address) = listener().await;

    let device = tokio::spawn(async move {
        let mut device = Device::accept(&listener).await;
        device.handshake(true).await;
        assert_eq!(device.read_json().await["type"], "query");
        device.send(r#"{"type":"response","state":"open"}"#).await;
        // Hold the socket until the bridge hangs up.
        let _ = device.lines.next_line().await;
    });

    let state = Bridge::oneshot(config(&address), |bridge| async move {
        let mut current = bridge.current_state_stream();
        if let Ok(state) = bridge.door().get_current_state() {
            return Ok(state);
        }
        tokio::time::timeout(WAIT, current.changed())
            .await
            .map_err(|_| CoreError::Timeout { timeout_secs: 5 })?
            .ok_or(CoreError::NotConnected)
    })
    .await
    .unwrap();

    assert_eq!(state, DoorState::Open);
    tokio::time::timeout(WAIT, device).await.unwrap().unwrap();
}

#[tokio::test]
async fn oneshot_to_unreachable_device_fails_fast() {
    let (listener, address) = listener().await;
    drop(listener);

    let started = tokio::time::Instant::now();
    let err = Bridge::oneshot(config(&address), |_| async { Ok(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Link { .. }), "unexpected error: {err:?}");
    assert!(started.elapsed() < WAIT);
}
