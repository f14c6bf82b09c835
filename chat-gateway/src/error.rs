use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("message store lock poisoned")]
    Poisoned,
}

/// Reasons a bearer credential is refused during the handshake.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no bearer token in upgrade request")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token subject {0:?} is not a user id")]
    InvalidSubject(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Why a chat event had no effect. Reported to the client only through `ack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("payload is missing a required field or is malformed")]
    InvalidPayload,

    #[error("acting user does not own the target")]
    Forbidden,

    #[error("message does not exist")]
    NotFound,

    #[error("message can no longer be edited")]
    EditWindowExpired,

    #[error("message store failed")]
    Storage,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::InvalidPayload => "invalid_payload",
            Rejection::Forbidden => "forbidden",
            Rejection::NotFound => "not_found",
            Rejection::EditWindowExpired => "edit_window_expired",
            Rejection::Storage => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_wire_names_match_as_str() {
        for reason in [
            Rejection::InvalidPayload,
            Rejection::Forbidden,
            Rejection::NotFound,
            Rejection::EditWindowExpired,
            Rejection::Storage,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
    }
}
