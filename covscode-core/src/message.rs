//! Control-channel messages.
//!
//! Every inbound frame is exactly one of three shapes:
//! ```text
//! { "messageType": "SiteIdMessage", "siteId": "a1b2c3" }
//! { "messageType": "ZippedDataMessage", "repoId": "...", "users": [...], "data": "PK..." }
//! { "data": <Action>, "isSuccessful": true, "errorMessage"?: "...", "errorCode"?: "..." }
//! ```
//! The `messageType` discriminant decides the shape. Envelopes carry no
//! discriminant (or the legacy `"WebSocketMessage"`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;
use crate::encoding::binary_string;
use crate::identity::Participant;

const SITE_ID_MESSAGE: &str = "SiteIdMessage";
const ZIPPED_DATA_MESSAGE: &str = "ZippedDataMessage";
const WEB_SOCKET_MESSAGE: &str = "WebSocketMessage";

/// Server-assigned session identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteIdMessage {
    pub site_id: String,
}

/// Snapshot sent to a joining participant: roster plus archived workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZippedDataMessage {
    pub repo_id: String,
    #[serde(default)]
    pub users: Vec<Participant>,
    #[serde(with = "binary_string")]
    pub data: Vec<u8>,
}

/// An action plus the server's verdict on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    pub data: Action,
    pub is_successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ActionEnvelope {
    pub fn success(action: Action) -> Self {
        Self {
            data: action,
            is_successful: true,
            error_message: None,
            error_code: None,
        }
    }

    pub fn failure(action: Action, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data: action,
            is_successful: false,
            error_message: Some(message.into()),
            error_code: Some(code.into()),
        }
    }
}

/// A decoded control-channel frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SiteIdentity(SiteIdMessage),
    ZippedSnapshot(ZippedDataMessage),
    Envelope(ActionEnvelope),
}

impl Message {
    /// Classify and decode a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let discriminant = match value.get("messageType") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => return Err(ProtocolError::InvalidMessageType(other.to_string())),
        };

        let decoded = match discriminant.as_deref() {
            Some(SITE_ID_MESSAGE) => serde_json::from_value(value).map(Self::SiteIdentity),
            Some(ZIPPED_DATA_MESSAGE) => serde_json::from_value(value).map(Self::ZippedSnapshot),
            None | Some(WEB_SOCKET_MESSAGE) => serde_json::from_value(value).map(Self::Envelope),
            Some(other) => return Err(ProtocolError::InvalidMessageType(other.to_string())),
        };
        decoded.map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }

    /// Encode as a JSON text frame, discriminant included.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let (tag, body) = match self {
            Self::SiteIdentity(m) => (Some(SITE_ID_MESSAGE), serde_json::to_value(m)),
            Self::ZippedSnapshot(m) => (Some(ZIPPED_DATA_MESSAGE), serde_json::to_value(m)),
            Self::Envelope(m) => (None, serde_json::to_value(m)),
        };
        let mut body = body.map_err(|e| ProtocolError::SerializationError(e.to_string()))?;
        if let (Some(tag), Value::Object(map)) = (tag, &mut body) {
            map.insert("messageType".to_string(), Value::String(tag.to_string()));
        }
        serde_json::to_string(&body).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Discriminant name, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::SiteIdentity(_) => SITE_ID_MESSAGE,
            Self::ZippedSnapshot(_) => ZIPPED_DATA_MESSAGE,
            Self::Envelope(_) => WEB_SOCKET_MESSAGE,
        }
    }
}

impl From<ActionEnvelope> for Message {
    fn from(envelope: ActionEnvelope) -> Self {
        Self::Envelope(envelope)
    }
}

/// Anything the control connection can send.
///
/// Bare actions are wrapped in a successful envelope on the way out;
/// messages go out as they are.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Action(Action),
    Message(Message),
}

impl Payload {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            Self::Action(action) => Message::Envelope(ActionEnvelope::success(action.clone())).encode(),
            Self::Message(message) => message.encode(),
        }
    }
}

impl From<Action> for Payload {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

impl From<Message> for Payload {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType(String),
    InvalidEncoding(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType(t) => write!(f, "Invalid message type: {t}"),
            Self::InvalidEncoding(e) => write!(f, "Invalid byte string: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use serde_json::json;

    #[test]
    fn test_decode_site_id() {
        let msg = Message::decode(r#"{"messageType":"SiteIdMessage","siteId":"abc123"}"#).unwrap();
        assert_eq!(msg, Message::SiteIdentity(SiteIdMessage { site_id: "abc123".into() }));
    }

    #[test]
    fn test_decode_zipped_snapshot() {
        let text = json!({
            "messageType": "ZippedDataMessage",
            "repoId": "r1",
            "users": [
                { "userId": "alice", "siteId": "s1", "repoId": "r1" },
                { "userId": "bob", "siteId": "s2", "repoId": "r1" }
            ],
            "data": "PK\u{3}\u{4}"
        })
        .to_string();

        match Message::decode(&text).unwrap() {
            Message::ZippedSnapshot(snapshot) => {
                assert_eq!(snapshot.repo_id, "r1");
                assert_eq!(snapshot.users.len(), 2);
                assert_eq!(snapshot.data, vec![0x50, 0x4b, 0x03, 0x04]);
            }
            other => panic!("Expected ZippedSnapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_envelope_without_discriminant() {
        let text = json!({
            "data": {
                "actionType": "SessionLeaveAction",
                "clientUser": { "userId": "bob", "siteId": "s2", "repoId": "r1" },
                "time": "2024-05-01T12:00:00Z"
            },
            "isSuccessful": true
        })
        .to_string();

        match Message::decode(&text).unwrap() {
            Message::Envelope(envelope) => {
                assert!(envelope.is_successful);
                assert_eq!(envelope.data.kind, ActionKind::SessionLeave);
                assert_eq!(envelope.data.site_id(), Some("s2"));
            }
            other => panic!("Expected Envelope, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_failed_envelope() {
        let text = json!({
            "messageType": "WebSocketMessage",
            "data": { "actionType": "SessionJoinAction", "time": "2024-05-01T12:00:00Z" },
            "isSuccessful": false,
            "errorMessage": "repository not found",
            "errorCode": "REPO_NOT_FOUND"
        })
        .to_string();

        match Message::decode(&text).unwrap() {
            Message::Envelope(envelope) => {
                assert!(!envelope.is_successful);
                assert_eq!(envelope.error_code.as_deref(), Some("REPO_NOT_FOUND"));
            }
            other => panic!("Expected Envelope, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_discriminant() {
        let err = Message::decode(r#"{"messageType":"Gossip"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidMessageType("Gossip".into()));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            Message::decode("not json"),
            Err(ProtocolError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_encode_inserts_discriminant() {
        let text = Message::SiteIdentity(SiteIdMessage { site_id: "x".into() }).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["messageType"], "SiteIdMessage");
        assert_eq!(value["siteId"], "x");
    }

    #[test]
    fn test_action_payload_is_wrapped() {
        let user = crate::identity::Participant::with_site("alice", "s1", "r1");
        let payload = Payload::from(Action::file_open(user, "a.txt", "a.txt"));
        let value: Value = serde_json::from_str(&payload.encode().unwrap()).unwrap();

        assert_eq!(value["isSuccessful"], true);
        assert_eq!(value["data"]["actionType"], "FileOpenAction");
        assert!(value.get("messageType").is_none());
        assert!(value.get("errorCode").is_none());
    }
}
