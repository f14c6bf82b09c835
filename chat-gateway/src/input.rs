//! Client payload DTOs with garde validation.
//!
//! Every field is optional at the serde level so that a payload with a
//! missing field still parses; validation then turns it into a rejection
//! and the event is dropped.

use garde::Validate;
use serde::Deserialize;
use tracing::debug;

use crate::error::Rejection;
use crate::models::{MessageId, NewMessage, UserId};

pub const MAX_MESSAGE_LENGTH: usize = 10000;

/// Payload of `sendMessage`
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SendMessageInput {
    #[garde(required)]
    pub sender_id: Option<UserId>,
    #[garde(required)]
    pub receiver_id: Option<UserId>,
    #[garde(required, length(chars, min = 1, max = MAX_MESSAGE_LENGTH))]
    pub text: Option<String>,
}

/// Payload of `editMessage`
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct EditMessageInput {
    #[garde(required)]
    pub id: Option<MessageId>,
    #[garde(required, length(chars, min = 1, max = MAX_MESSAGE_LENGTH))]
    pub text: Option<String>,
    #[garde(required)]
    pub receiver_id: Option<UserId>,
}

/// Payload of `deleteMessage`
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct DeleteMessageInput {
    #[garde(required)]
    pub id: Option<MessageId>,
    #[garde(required)]
    pub receiver_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditMessage {
    pub id: MessageId,
    pub text: String,
    pub receiver_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteMessage {
    pub id: MessageId,
    pub receiver_id: UserId,
}

/// Helper trait to turn garde reports into a rejection
pub trait ValidateExt {
    fn validate_input(&self) -> Result<(), Rejection>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> Result<(), Rejection> {
        self.validate().map_err(|report| {
            debug!("payload rejected: {}", report);
            Rejection::InvalidPayload
        })
    }
}

impl SendMessageInput {
    pub fn into_new_message(self) -> Result<NewMessage, Rejection> {
        self.validate_input()?;
        match (self.sender_id, self.receiver_id, self.text) {
            (Some(sender_id), Some(receiver_id), Some(text)) => Ok(NewMessage {
                sender_id,
                receiver_id,
                text,
            }),
            _ => Err(Rejection::InvalidPayload),
        }
    }
}

impl EditMessageInput {
    pub fn into_edit(self) -> Result<EditMessage, Rejection> {
        self.validate_input()?;
        match (self.id, self.text, self.receiver_id) {
            (Some(id), Some(text), Some(receiver_id)) => Ok(EditMessage {
                id,
                text,
                receiver_id,
            }),
            _ => Err(Rejection::InvalidPayload),
        }
    }
}

impl DeleteMessageInput {
    pub fn into_delete(self) -> Result<DeleteMessage, Rejection> {
        self.validate_input()?;
        match (self.id, self.receiver_id) {
            (Some(id), Some(receiver_id)) => Ok(DeleteMessage { id, receiver_id }),
            _ => Err(Rejection::InvalidPayload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn send(value: serde_json::Value) -> Result<NewMessage, Rejection> {
        serde_json::from_value::<SendMessageInput>(value)
            .map_err(|_| Rejection::InvalidPayload)?
            .into_new_message()
    }

    #[test]
    fn test_valid_send() {
        let msg = send(json!({"sender_id": 1, "receiver_id": "2", "text": "hi"})).unwrap();
        assert_eq!(msg.sender_id, UserId(1));
        assert_eq!(msg.receiver_id, UserId(2));
        assert_eq!(msg.text, "hi");
    }

    #[test]
    fn test_send_missing_or_falsy_fields() {
        let cases = [
            json!({"receiver_id": 2, "text": "hi"}),
            json!({"sender_id": 1, "text": "hi"}),
            json!({"sender_id": 1, "receiver_id": 2}),
            json!({"sender_id": null, "receiver_id": 2, "text": "hi"}),
            json!({"sender_id": 0, "receiver_id": 2, "text": "hi"}),
            json!({"sender_id": 1, "receiver_id": "", "text": "hi"}),
            json!({"sender_id": 1, "receiver_id": 2, "text": ""}),
        ];
        for case in cases {
            assert_eq!(send(case.clone()), Err(Rejection::InvalidPayload), "{}", case);
        }
    }

    #[test]
    fn test_send_text_too_long() {
        let text = "a".repeat(MAX_MESSAGE_LENGTH + 1);
        assert_eq!(
            send(json!({"sender_id": 1, "receiver_id": 2, "text": text})),
            Err(Rejection::InvalidPayload)
        );

        let text = "é".repeat(MAX_MESSAGE_LENGTH);
        assert!(send(json!({"sender_id": 1, "receiver_id": 2, "text": text})).is_ok());
    }

    #[test]
    fn test_edit_requires_all_fields() {
        let edit: EditMessageInput =
            serde_json::from_value(json!({"id": 5, "text": "new", "receiver_id": 2})).unwrap();
        assert_eq!(
            edit.into_edit().unwrap(),
            EditMessage {
                id: MessageId(5),
                text: "new".to_string(),
                receiver_id: UserId(2),
            }
        );

        let edit: EditMessageInput =
            serde_json::from_value(json!({"id": 5, "text": "new"})).unwrap();
        assert_eq!(edit.into_edit(), Err(Rejection::InvalidPayload));
    }

    #[test]
    fn test_delete_requires_all_fields() {
        let delete: DeleteMessageInput =
            serde_json::from_value(json!({"id": "5", "receiver_id": 2})).unwrap();
        assert_eq!(
            delete.into_delete().unwrap(),
            DeleteMessage {
                id: MessageId(5),
                receiver_id: UserId(2),
            }
        );

        let delete: DeleteMessageInput = serde_json::from_value(json!({"id": 5})).unwrap();
        assert_eq!(delete.into_delete(), Err(Rejection::InvalidPayload));
    }
}
