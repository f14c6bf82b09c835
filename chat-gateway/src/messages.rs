use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Rejection;
use crate::input::{DeleteMessageInput, EditMessageInput, SendMessageInput};
use crate::models::{Message, MessageId, UserId};

/// Events a client may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Join,
    SendMessage,
    EditMessage,
    DeleteMessage,
}

impl EventKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "join" => Some(EventKind::Join),
            "sendMessage" => Some(EventKind::SendMessage),
            "editMessage" => Some(EventKind::EditMessage),
            "deleteMessage" => Some(EventKind::DeleteMessage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Join => "join",
            EventKind::SendMessage => "sendMessage",
            EventKind::EditMessage => "editMessage",
            EventKind::DeleteMessage => "deleteMessage",
        }
    }
}

/// Raw client frame: `{"event": "...", "data": ..., "ack": 3}`.
///
/// The payload is kept untyped until the event name is known so a bad
/// payload never hides the `ack` the client is waiting on.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub ack: Option<u64>,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A client event with its payload decoded
#[derive(Debug)]
pub enum ClientEvent {
    Join(UserId),
    SendMessage(SendMessageInput),
    EditMessage(EditMessageInput),
    DeleteMessage(DeleteMessageInput),
}

impl ClientEvent {
    pub fn decode(kind: EventKind, data: Value) -> Result<Self, Rejection> {
        let event = match kind {
            EventKind::Join => serde_json::from_value(data).map(ClientEvent::Join),
            EventKind::SendMessage => serde_json::from_value(data).map(ClientEvent::SendMessage),
            EventKind::EditMessage => serde_json::from_value(data).map(ClientEvent::EditMessage),
            EventKind::DeleteMessage => {
                serde_json::from_value(data).map(ClientEvent::DeleteMessage)
            }
        };
        event.map_err(|e| {
            tracing::debug!("malformed {} payload: {}", kind.as_str(), e);
            Rejection::InvalidPayload
        })
    }
}

/// Body of `messageUpdated`: only the changed fields, not the whole row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdate {
    pub id: MessageId,
    pub text: String,
    pub is_edited: bool,
}

/// Outcome of a client event, sent only when the client asked for one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ack: u64,
    pub event: EventKind,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl Ack {
    pub fn new(ack: u64, event: EventKind, outcome: &Result<Option<MessageId>, Rejection>) -> Self {
        match outcome {
            Ok(id) => Self {
                ack,
                event,
                ok: true,
                id: *id,
                reason: None,
            },
            Err(reason) => Self {
                ack,
                event,
                ok: false,
                id: None,
                reason: Some(*reason),
            },
        }
    }
}

/// Events pushed by the server, framed as `{"event": "...", "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "receiveMessage")]
    ReceiveMessage(Message),
    #[serde(rename = "messageUpdated")]
    MessageUpdated(MessageUpdate),
    /// Carries the bare id, not an object
    #[serde(rename = "messageDeleted")]
    MessageDeleted(MessageId),
    #[serde(rename = "ack")]
    Ack(Ack),
}
