//! Marketplace realtime messaging gateway
//!
//! This module exposes the server components for use in the binary and in
//! integration tests.

pub mod auth;
pub mod config;
mod connection;
pub mod error;
mod handlers;
pub mod input;
mod messages;
pub mod models;
mod rooms;
mod state;
pub mod store;

pub use connection::{accept_connection, handle_connection, handle_message, Session};
pub use handlers::Outcome;
pub use messages::{Ack, ClientEvent, ClientFrame, EventKind, MessageUpdate, ServerEvent};
pub use rooms::{ConnectionId, Outbound, RoomRegistry};
pub use state::ServerState;
