//! Domain types shared by the store, the wire protocol and the gateway.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Marketplace user id. Clients send it as a number or a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Name of the room that fans out to every connection of this user
    pub fn room(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        positive_id(deserializer).map(UserId)
    }
}

/// Store-generated message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        positive_id(deserializer).map(MessageId)
    }
}

/// Accepts `42` or `"42"`. Zero, negatives, empty and non-numeric strings are rejected,
/// which makes falsy ids behave like missing ones.
fn positive_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    let id = match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n,
        Raw::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("invalid id {:?}", s)))?,
    };

    if id <= 0 {
        return Err(de::Error::custom(format!("id must be positive, got {}", id)));
    }
    Ok(id)
}

/// A persisted chat message, serialized exactly as clients expect it in `receiveMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields of a message that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_accepts_number_and_numeric_string() {
        let a: UserId = serde_json::from_str("42").unwrap();
        let b: UserId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.room(), "42");
    }

    #[test]
    fn test_falsy_ids_are_rejected() {
        for raw in ["0", "\"\"", "\"0\"", "false", "-3", "\"abc\"", "1.5"] {
            assert!(
                serde_json::from_str::<UserId>(raw).is_err(),
                "{} should not parse as a user id",
                raw
            );
        }
    }

    #[test]
    fn test_message_serialization_shape() {
        let created_at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let msg = Message {
            id: MessageId(7),
            sender_id: UserId(1),
            receiver_id: UserId(2),
            text: "hi".to_string(),
            is_edited: false,
            created_at,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["sender_id"], 1);
        assert_eq!(value["receiver_id"], 2);
        assert_eq!(value["text"], "hi");
        assert_eq!(value["is_edited"], false);
        assert_eq!(value["created_at"], "2023-11-14T22:13:20.123Z");

        let parsed: Message = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, msg);
    }
}
