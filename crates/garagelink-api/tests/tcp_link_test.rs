// Integration tests for `TcpLink` against a scripted local device.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use garagelink_api::{
    Credentials, DeviceLink, DeviceSession, DoorState, Error, KeyType, Lifecycle, LinkOptions,
    ProtocolEvent, ReconnectConfig, TcpLink,
};

// ── Helpers ─────────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    (listener, address)
}

fn link_to(address: &str, auto_reconnect: bool) -> TcpLink {
    let session = Arc::new(DeviceSession::new(
        "Garage",
        address,
        Credentials {
            api_key: SecretString::from("key-1".to_string()),
            api_secret: SecretString::from("secret-1".to_string()),
        },
    ));
    let options = LinkOptions {
        auto_reconnect,
        connect_timeout: Duration::from_secs(2),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            max_retries: Some(50),
        },
    };
    TcpLink::new(session, options, CancellationToken::new())
}

async fn next_event(events: &mut mpsc::Receiver<ProtocolEvent>) -> ProtocolEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

struct DeviceSide {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl DeviceSide {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .expect("timed out waiting for link to connect")
            .unwrap();
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Self {
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
            .expect("link closed the socket");
        serde_json::from_str(&line).unwrap()
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_then_events_arrive_in_order() {
    let (listener, address) = listener().await;
    let link = link_to(&address, false);
    let mut events = link.connect().unwrap();

    let mut device = DeviceSide::accept(&listener).await;
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::Lifecycle(Lifecycle::Connected)
    ));
    assert!(link.is_connected());
    assert!(!link.is_authenticated());

    link.authenticate();
    let auth = device.read_json().await;
    assert_eq!(auth["type"], "auth");
    assert_eq!(auth["key"], "key-1");
    assert_eq!(auth["secret"], "secret-1");

    device.send(r#"{"type":"auth","ok":true}"#).await;
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::Lifecycle(Lifecycle::Authenticated)
    ));
    assert!(link.is_authenticated());

    device
        .send(r#"{"type":"event","event":"relay","state":"open","keyType":"api key"}"#)
        .await;
    device.send("this is not a frame").await;
    device.send(r#"{"type":"response","state":"ajar"}"#).await;
    device.send(r#"{"type":"event","event":"state","state":"closing"}"#).await;
    device.send(r#"{"type":"response","state":"closed"}"#).await;

    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::RelayTrigger {
            state: DoorState::Open,
            key_type: KeyType::ApiKey
        }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::StateChange {
            state: DoorState::Closing
        }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::QueryResponse {
            state: DoorState::Closed
        }
    ));

    link.send_query();
    assert_eq!(device.read_json().await["type"], "query");
    link.send_open();
    let open = device.read_json().await;
    assert_eq!(open["type"], "command");
    assert_eq!(open["action"], "open");
    link.send_close();
    assert_eq!(device.read_json().await["action"], "close");

    drop(device);
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::Lifecycle(Lifecycle::Disconnected(_))
    ));
    assert!(!link.is_connected());
    assert!(!link.is_authenticated());

    // auto_reconnect is off: the loop ends and the channel closes.
    let closed = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    assert!(closed.is_none());
    link.shutdown().await;
}

#[tokio::test]
async fn rejected_handshake_surfaces_as_error() {
    let (listener, address) = listener().await;
    let link = link_to(&address, false);
    let mut events = link.connect().unwrap();

    let mut device = DeviceSide::accept(&listener).await;
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::Lifecycle(Lifecycle::Connected)
    ));

    link.authenticate();
    device.read_json().await;
    device
        .send(r#"{"type":"auth","ok":false,"reason":"bad key"}"#)
        .await;

    match next_event(&mut events).await {
        ProtocolEvent::Lifecycle(Lifecycle::Error(err)) => {
            assert!(matches!(&*err, Error::AuthRejected { reason } if reason == "bad key"));
        }
        other => panic!("expected auth error, got {other:?}"),
    }
    assert!(link.is_connected());
    assert!(!link.is_authenticated());

    link.shutdown().await;
}

#[tokio::test]
async fn requests_queued_while_offline_are_discarded() {
    let (listener, address) = listener().await;
    let link = link_to(&address, false);

    // Queued before the connection task has had a chance to run.
    link.send_open();
    let mut events = link.connect().unwrap();

    let mut device = DeviceSide::accept(&listener).await;
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::Lifecycle(Lifecycle::Connected)
    ));

    link.authenticate();
    assert_eq!(device.read_json().await["type"], "auth");

    link.shutdown().await;
}

#[tokio::test]
async fn failed_connect_emits_error() {
    // Bind then drop to get a port nobody listens on.
    let (listener, address) = listener().await;
    drop(listener);

    let link = link_to(&address, false);
    let mut events = link.connect().unwrap();

    match next_event(&mut events).await {
        ProtocolEvent::Lifecycle(Lifecycle::Error(err)) => {
            assert!(err.is_transient(), "unexpected error: {err}");
        }
        other => panic!("expected connect error, got {other:?}"),
    }
    assert!(!link.is_connected());
    link.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_drop() {
    let (listener, address) = listener().await;
    let link = link_to(&address, true);
    let mut events = link.connect().unwrap();

    let first = DeviceSide::accept(&listener).await;
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::Lifecycle(Lifecycle::Connected)
    ));
    drop(first);
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::Lifecycle(Lifecycle::Disconnected(_))
    ));

    let mut second = DeviceSide::accept(&listener).await;
    assert!(matches!(
        next_event(&mut events).await,
        ProtocolEvent::Lifecycle(Lifecycle::Connected)
    ));

    link.authenticate();
    assert_eq!(second.read_json().await["type"], "auth");

    link.shutdown().await;
}
