use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::handlers;
use crate::messages::{Ack, ClientEvent, ClientFrame, EventKind, ServerEvent};
use crate::models::UserId;
use crate::rooms::{ConnectionId, Outbound};
use crate::state::ServerState;

/// Per-connection state owned by the connection task
pub struct Session {
    pub id: ConnectionId,
    /// User proven by the handshake token; `None` when the gateway runs open
    identity: Option<UserId>,
    room: Option<UserId>,
    tx: Outbound,
}

impl Session {
    pub fn new(id: ConnectionId, identity: Option<UserId>, tx: Outbound) -> Self {
        Self {
            id,
            identity,
            room: None,
            tx,
        }
    }

    pub fn identity(&self) -> Option<UserId> {
        self.identity
    }

    pub fn room(&self) -> Option<UserId> {
        self.room
    }

    pub(crate) fn set_room(&mut self, room: Option<UserId>) {
        self.room = room;
    }

    pub fn outbound(&self) -> Outbound {
        self.tx.clone()
    }

    /// Send an event to this connection only
    pub fn reply(&self, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(e) => error!("Failed to serialize reply for connection {}: {}", self.id, e),
        }
    }

    /// Drop out of the current room, if any
    pub fn leave(&mut self, state: &ServerState) {
        if let Some(room) = self.room.take() {
            state.rooms.leave(&room.room(), self.id);
        }
    }
}

/// Run the WebSocket handshake on a fresh TCP connection, authenticating it
/// when the gateway holds a token secret, then serve it until it closes.
pub async fn accept_connection(stream: TcpStream, state: Arc<ServerState>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut identity: Option<UserId> = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let Some(auth) = state.auth() else {
            return Ok(response);
        };
        match auth.authenticate(request) {
            Ok(user) => {
                identity = Some(user);
                Ok(response)
            }
            Err(e) => {
                warn!("Rejecting handshake from {}: {}", peer, e);
                let mut rejection = ErrorResponse::new(Some("unauthorized".to_string()));
                *rejection.status_mut() = StatusCode::UNAUTHORIZED;
                Err(rejection)
            }
        }
    };

    let handshake = accept_hdr_async(stream, callback).await;
    match handshake {
        Ok(ws_stream) => handle_connection(ws_stream, identity, state).await,
        Err(e) => error!("WebSocket handshake failed for {}: {}", peer, e),
    }
}

/// Handle a single WebSocket connection
pub async fn handle_connection(
    ws_stream: WebSocketStream<TcpStream>,
    identity: Option<UserId>,
    state: Arc<ServerState>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Channel for everything that should reach this client, in order
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut session = Session::new(state.next_connection_id(), identity, tx);

    match identity {
        Some(user) => info!("Connection {} opened for user {}", session.id, user),
        None => info!("Connection {} opened (unauthenticated)", session.id),
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            res = ws_receiver.next() => {
                match res {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&text, &mut session, &state);
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Connection {} sent close frame", session.id);
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring binary frame on connection {}", session.id);
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error on connection {}: {}", session.id, e);
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended for connection {}", session.id);
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut send_task => {
                info!("Send task finished for connection {} (likely connection lost)", session.id);
                break;
            }
        }
    }

    // Cleanup
    send_task.abort();
    session.leave(&state);

    info!("Connection {} closed", session.id);
}

/// Handle one text frame from a connected client.
///
/// Malformed frames and unknown events are logged and ignored. An `ack` is
/// answered only when the frame asked for one.
pub fn handle_message(text: &str, session: &mut Session, state: &ServerState) {
    let frame = match ClientFrame::parse(text) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to parse frame from connection {}: {}", session.id, e);
            return;
        }
    };

    let Some(kind) = EventKind::from_name(&frame.event) else {
        warn!("Unknown event {:?} from connection {}", frame.event, session.id);
        return;
    };

    let outcome = ClientEvent::decode(kind, frame.data).and_then(|event| match event {
        ClientEvent::Join(user) => handlers::join(state, session, user),
        ClientEvent::SendMessage(input) => handlers::send_message(state, session, input),
        ClientEvent::EditMessage(input) => handlers::edit_message(state, session, input),
        ClientEvent::DeleteMessage(input) => handlers::delete_message(state, session, input),
    });

    if let Err(reason) = &outcome {
        debug!(
            "{} from connection {} had no effect: {}",
            kind.as_str(),
            session.id,
            reason
        );
    }

    if let Some(ack) = frame.ack {
        session.reply(&ServerEvent::Ack(Ack::new(ack, kind, &outcome)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use serde_json::json;

    fn setup() -> (ServerState, Session, mpsc::UnboundedReceiver<String>) {
        let state = ServerState::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(state.next_connection_id(), None, tx);
        (state, session, rx)
    }

    fn frame(value: serde_json::Value) -> String {
        value.to_string()
    }

    #[test]
    fn test_join_frame_registers_room() {
        let (state, mut session, _rx) = setup();

        handle_message(&frame(json!({"event": "join", "data": 42})), &mut session, &state);

        assert_eq!(session.room(), Some(UserId(42)));
        assert_eq!(state.rooms.members("42"), 1);
    }

    #[test]
    fn test_garbage_and_unknown_events_are_ignored() {
        let (state, mut session, mut rx) = setup();

        handle_message("not json", &mut session, &state);
        handle_message(&frame(json!({"event": "typing", "data": {}, "ack": 1})), &mut session, &state);

        assert!(rx.try_recv().is_err());
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn test_ack_only_when_requested() {
        let (state, mut session, mut rx) = setup();

        handle_message(
            &frame(json!({"event": "sendMessage", "data": {"sender_id": 1, "receiver_id": 2}})),
            &mut session,
            &state,
        );
        assert!(rx.try_recv().is_err());

        handle_message(
            &frame(json!({"event": "sendMessage", "data": {"sender_id": 1, "receiver_id": 2}, "ack": 9})),
            &mut session,
            &state,
        );
        let reply: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            reply,
            json!({"event": "ack", "data": {"ack": 9, "event": "sendMessage", "ok": false, "reason": "invalid_payload"}})
        );
    }

    #[test]
    fn test_sender_gets_message_then_ack() {
        let (state, mut session, mut rx) = setup();
        handle_message(&frame(json!({"event": "join", "data": "1"})), &mut session, &state);

        handle_message(
            &frame(json!({
                "event": "sendMessage",
                "data": {"sender_id": 1, "receiver_id": 2, "text": "hi"},
                "ack": 1
            })),
            &mut session,
            &state,
        );

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["event"], "receiveMessage");
        let id = first["data"]["id"].clone();

        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(second["event"], "ack");
        assert_eq!(second["data"]["ok"], true);
        assert_eq!(second["data"]["id"], id);
    }

    #[test]
    fn test_leave_on_close() {
        let (state, mut session, _rx) = setup();
        handle_message(&frame(json!({"event": "join", "data": 5})), &mut session, &state);
        assert_eq!(state.rooms.members("5"), 1);

        session.leave(&state);
        assert_eq!(state.rooms.members("5"), 0);
        assert!(session.room().is_none());
    }
}
