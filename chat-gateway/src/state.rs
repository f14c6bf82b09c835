use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::auth::TokenAuth;
use crate::config::ServerConfig;
use crate::messages::ServerEvent;
use crate::models::UserId;
use crate::rooms::{ConnectionId, RoomRegistry};
use crate::store::MessageStore;

const DEFAULT_EDIT_WINDOW: Duration = Duration::from_secs(120);

/// Everything the connection tasks share
pub struct ServerState {
    pub rooms: RoomRegistry,
    store: Arc<dyn MessageStore>,
    auth: Option<TokenAuth>,
    edit_window: Option<Duration>,
    next_connection: AtomicU64,
}

impl ServerState {
    /// Unauthenticated gateway over `store` with the default edit window
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            store,
            auth: None,
            edit_window: Some(DEFAULT_EDIT_WINDOW),
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &ServerConfig, store: Arc<dyn MessageStore>) -> Self {
        let state = Self::new(store).with_edit_window(config.edit_window);
        match &config.jwt_secret {
            Some(secret) => state.with_auth(TokenAuth::new(secret.as_bytes())),
            None => state,
        }
    }

    /// Require a bearer token on every connection
    pub fn with_auth(mut self, auth: TokenAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_edit_window(mut self, window: Option<Duration>) -> Self {
        self.edit_window = window;
        self
    }

    pub fn store(&self) -> &dyn MessageStore {
        self.store.as_ref()
    }

    pub fn auth(&self) -> Option<&TokenAuth> {
        self.auth.as_ref()
    }

    pub fn edit_window(&self) -> Option<Duration> {
        self.edit_window
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Serialize once and fan out to each distinct user's room.
    /// Returns the number of connections reached.
    pub fn broadcast(&self, users: &[UserId], event: &ServerEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize event: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for (i, user) in users.iter().enumerate() {
            if users[..i].contains(user) {
                continue;
            }
            delivered += self.rooms.emit(&user.room(), &payload);
        }
        delivered
    }
}
