//! Chat event handlers. Each runs to completion, store call included, before
//! the connection reads its next frame.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::connection::Session;
use crate::error::Rejection;
use crate::input::{DeleteMessage, DeleteMessageInput, EditMessage, EditMessageInput, SendMessageInput};
use crate::messages::{MessageUpdate, ServerEvent};
use crate::models::{Message, MessageId, UserId};
use crate::state::ServerState;

/// Result of a handled event: the affected message id, if any
pub type Outcome = Result<Option<MessageId>, Rejection>;

/// Bind the connection to `user`'s room, leaving any room it was in before
pub fn join(state: &ServerState, session: &mut Session, user: UserId) -> Outcome {
    if let Some(identity) = session.identity() {
        if identity != user {
            warn!(
                "Connection {} authenticated as {} tried to join room {}",
                session.id, identity, user
            );
            return Err(Rejection::Forbidden);
        }
    }

    match session.room() {
        Some(current) if current == user => return Ok(None),
        Some(previous) => state.rooms.leave(&previous.room(), session.id),
        None => {}
    }

    state.rooms.join(&user.room(), session.id, session.outbound());
    session.set_room(Some(user));
    info!("Connection {} joined room {}", session.id, user);
    Ok(None)
}

/// Persist a message, then deliver it to the receiver's and sender's rooms
pub fn send_message(state: &ServerState, session: &Session, input: SendMessageInput) -> Outcome {
    let mut new = input.into_new_message()?;

    if let Some(identity) = session.identity() {
        if new.sender_id != identity {
            warn!(
                "Connection {} claimed sender {}, using authenticated {}",
                session.id, new.sender_id, identity
            );
            new.sender_id = identity;
        }
    }

    let message = state.store().create_message(new).map_err(|e| {
        error!("Failed to store message from connection {}: {}", session.id, e);
        Rejection::Storage
    })?;

    let id = message.id;
    let rooms = [message.receiver_id, message.sender_id];
    let delivered = state.broadcast(&rooms, &ServerEvent::ReceiveMessage(message));
    debug!("Message {} delivered to {} connections", id, delivered);

    Ok(Some(id))
}

/// Replace a message's text and tell the receiver
pub fn edit_message(state: &ServerState, session: &Session, input: EditMessageInput) -> Outcome {
    let EditMessage {
        id,
        text,
        receiver_id,
    } = input.into_edit()?;

    let existing = load_owned(state, session, id)?;
    warn_on_receiver_mismatch(&existing, receiver_id);

    if let Some(window) = state.edit_window() {
        let age = Utc::now().signed_duration_since(existing.created_at);
        if age.to_std().map(|age| age > window).unwrap_or(false) {
            debug!("Message {} is {}s old, past the edit window", id, age.num_seconds());
            return Err(Rejection::EditWindowExpired);
        }
    }

    let updated = state.store().update_message(id, &text).map_err(|e| {
        error!("Failed to update message {}: {}", id, e);
        Rejection::Storage
    })?;
    if !updated {
        return Err(Rejection::NotFound);
    }

    let update = ServerEvent::MessageUpdated(MessageUpdate {
        id,
        text,
        is_edited: true,
    });
    state.broadcast(&[existing.receiver_id], &update);

    Ok(Some(id))
}

/// Remove a message and tell the receiver
pub fn delete_message(state: &ServerState, session: &Session, input: DeleteMessageInput) -> Outcome {
    let DeleteMessage { id, receiver_id } = input.into_delete()?;

    let existing = load_owned(state, session, id)?;
    warn_on_receiver_mismatch(&existing, receiver_id);

    let deleted = state.store().delete_message(id).map_err(|e| {
        error!("Failed to delete message {}: {}", id, e);
        Rejection::Storage
    })?;
    if !deleted {
        return Err(Rejection::NotFound);
    }

    state.broadcast(&[existing.receiver_id], &ServerEvent::MessageDeleted(id));
    Ok(Some(id))
}

/// Fetch the target of an edit or delete. Authenticated connections may only
/// touch messages they sent.
fn load_owned(state: &ServerState, session: &Session, id: MessageId) -> Result<Message, Rejection> {
    let message = state
        .store()
        .find_message(id)
        .map_err(|e| {
            error!("Failed to load message {}: {}", id, e);
            Rejection::Storage
        })?
        .ok_or(Rejection::NotFound)?;

    if let Some(identity) = session.identity() {
        if message.sender_id != identity {
            warn!(
                "User {} tried to modify message {} sent by {}",
                identity, id, message.sender_id
            );
            return Err(Rejection::Forbidden);
        }
    }
    Ok(message)
}

/// Notifications go to the stored receiver; a differing client value is only logged
fn warn_on_receiver_mismatch(message: &Message, claimed: UserId) {
    if message.receiver_id != claimed {
        warn!(
            "Message {} has receiver {}, client named {}",
            message.id, message.receiver_id, claimed
        );
    }
}
