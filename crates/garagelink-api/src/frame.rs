//! Wire frames for the device link.
//!
//! The link speaks newline-delimited JSON at the decoded layer: one
//! object per line, discriminated by its `type` field. Inbound lines are
//! decoded exactly once into a [`Frame`], so nothing above this module
//! has to guess a message kind from which fields happen to be present.
//!
//! ```text
//! {"type":"auth","ok":true}
//! {"type":"event","event":"state","state":"closing"}
//! {"type":"event","event":"relay","state":"open","keyType":"api key"}
//! {"type":"response","state":"open"}
//! ```

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::event::ProtocolEvent;
use crate::model::{DoorState, KeyType};
use crate::session::Credentials;

// ── Inbound ──────────────────────────────────────────────────────────

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Reply to the authentication request.
    Handshake {
        accepted: bool,
        reason: Option<String>,
    },
    /// Unsolicited notification.
    Event(DeviceEvent),
    /// Reply to a query.
    Response { state: DoorState },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    StateChange { state: DoorState },
    RelayTrigger { state: DoorState, key_type: KeyType },
}

impl From<DeviceEvent> for ProtocolEvent {
    fn from(event: DeviceEvent) -> Self {
        match event {
            DeviceEvent::StateChange { state } => Self::StateChange { state },
            DeviceEvent::RelayTrigger { state, key_type } => Self::RelayTrigger { state, key_type },
        }
    }
}

/// Raw shape of an inbound line, before state strings are validated.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireFrame {
    Auth {
        ok: bool,
        #[serde(default)]
        reason: Option<String>,
    },
    Event {
        event: String,
        state: String,
        #[serde(default, rename = "keyType")]
        key_type: Option<String>,
    },
    Response {
        state: String,
    },
}

/// Decode one line from the device.
pub fn decode(line: &str) -> Result<Frame, Error> {
    let wire: WireFrame = serde_json::from_str(line).map_err(|e| Error::Decode {
        message: e.to_string(),
        line: line.to_owned(),
    })?;

    match wire {
        WireFrame::Auth { ok, reason } => Ok(Frame::Handshake {
            accepted: ok,
            reason,
        }),
        WireFrame::Response { state } => Ok(Frame::Response {
            state: parse_state(&state)?,
        }),
        WireFrame::Event {
            event,
            state,
            key_type,
        } => match event.as_str() {
            "state" => Ok(Frame::Event(DeviceEvent::StateChange {
                state: parse_state(&state)?,
            })),
            "relay" => {
                let key_type = key_type.ok_or_else(|| Error::Decode {
                    message: "relay event without keyType".into(),
                    line: line.to_owned(),
                })?;
                Ok(Frame::Event(DeviceEvent::RelayTrigger {
                    state: parse_state(&state)?,
                    key_type: KeyType::from(key_type.as_str()),
                }))
            }
            other => Err(Error::Decode {
                message: format!("unknown event kind '{other}'"),
                line: line.to_owned(),
            }),
        },
    }
}

fn parse_state(raw: &str) -> Result<DoorState, Error> {
    DoorState::from_wire(raw).ok_or_else(|| Error::UnknownState {
        value: raw.to_owned(),
    })
}

// ── Outbound ─────────────────────────────────────────────────────────

/// Requests the link can send to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Authenticate,
    Query,
    Open,
    Close,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireRequest<'a> {
    Auth { key: &'a str, secret: &'a str },
    Query,
    Command { action: &'static str },
}

/// Encode a request as a single line (without the trailing newline).
pub fn encode(request: Request, credentials: &Credentials) -> Result<String, Error> {
    let wire = match request {
        Request::Authenticate => WireRequest::Auth {
            key: credentials.api_key.expose_secret(),
            secret: credentials.api_secret.expose_secret(),
        },
        Request::Query => WireRequest::Query,
        Request::Open => WireRequest::Command { action: "open" },
        Request::Close => WireRequest::Command { action: "close" },
    };
    serde_json::to_string(&wire).map_err(|e| Error::Encode(e.to_string()))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            api_key: SecretString::from("k-123".to_string()),
            api_secret: SecretString::from("s-456".to_string()),
        }
    }

    #[test]
    fn decode_handshake() {
        assert_eq!(
            decode(r#"{"type":"auth","ok":true}"#).unwrap(),
            Frame::Handshake {
                accepted: true,
                reason: None
            }
        );
        assert_eq!(
            decode(r#"{"type":"auth","ok":false,"reason":"bad key"}"#).unwrap(),
            Frame::Handshake {
                accepted: false,
                reason: Some("bad key".into())
            }
        );
    }

    #[test]
    fn decode_state_event() {
        let frame = decode(r#"{"type":"event","event":"state","state":"closing"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Event(DeviceEvent::StateChange {
                state: DoorState::Closing
            })
        );
    }

    #[test]
    fn decode_relay_event_keeps_key_type() {
        let frame = decode(
            r#"{"type":"event","event":"relay","state":"open","keyType":"api key","seq":4}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            Frame::Event(DeviceEvent::RelayTrigger {
                state: DoorState::Open,
                key_type: KeyType::ApiKey,
            })
        );

        let frame =
            decode(r#"{"type":"event","event":"relay","state":"closed","keyType":"remote"}"#)
                .unwrap();
        assert!(matches!(
            frame,
            Frame::Event(DeviceEvent::RelayTrigger { key_type: KeyType::Other(ref k), .. }) if k == "remote"
        ));
    }

    #[test]
    fn decode_response() {
        assert_eq!(
            decode(r#"{"type":"response","state":"open"}"#).unwrap(),
            Frame::Response {
                state: DoorState::Open
            }
        );
    }

    #[test]
    fn decode_rejects_unknown_state() {
        let err = decode(r#"{"type":"response","state":"ajar"}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownState { ref value } if value == "ajar"));
    }

    #[test]
    fn decode_rejects_relay_without_key_type() {
        let err = decode(r#"{"type":"event","event":"relay","state":"open"}"#).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode("not json"), Err(Error::Decode { .. })));
        assert!(matches!(
            decode(r#"{"type":"telemetry","rssi":-60}"#),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"event","event":"battery","state":"open"}"#),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn encode_requests() {
        let creds = credentials();
        insta::assert_snapshot!(
            encode(Request::Authenticate, &creds).unwrap(),
            @r#"{"type":"auth","key":"k-123","secret":"s-456"}"#
        );
        insta::assert_snapshot!(encode(Request::Query, &creds).unwrap(), @r#"{"type":"query"}"#);
        insta::assert_snapshot!(
            encode(Request::Open, &creds).unwrap(),
            @r#"{"type":"command","action":"open"}"#
        );
        insta::assert_snapshot!(
            encode(Request::Close, &creds).unwrap(),
            @r#"{"type":"command","action":"close"}"#
        );
    }

    #[test]
    fn device_event_converts_to_protocol_event() {
        let event: ProtocolEvent = DeviceEvent::StateChange {
            state: DoorState::Open,
        }
        .into();
        assert!(matches!(
            event,
            ProtocolEvent::StateChange {
                state: DoorState::Open
            }
        ));
    }
}
