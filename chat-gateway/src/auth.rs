//! Bearer token verification for the WebSocket handshake.
//!
//! The REST API signs HS256 tokens whose `sub` is the user id. The gateway
//! shares the secret and derives the acting identity from the token rather
//! than from anything the client sends over the socket.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::handshake::server::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use crate::error::AuthError;
use crate::models::UserId;

/// JWT claims issued by the REST login endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

impl Claims {
    pub fn new(user: UserId, expires_in: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
        }
    }
}

pub struct TokenAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenAuth {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Sign a token for `user`. The gateway never hands these out itself; this is
    /// here for tooling and tests that stand in for the REST login.
    pub fn issue(&self, user: UserId, expires_in: Duration) -> Result<String, AuthError> {
        let claims = Claims::new(user, expires_in);
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Check signature and expiry, then read the user id out of `sub`
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        let sub = data.claims.sub;
        match sub.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(UserId(id)),
            _ => Err(AuthError::InvalidSubject(sub)),
        }
    }

    /// Verify the credential carried by a WebSocket upgrade request
    pub fn authenticate(&self, request: &Request) -> Result<UserId, AuthError> {
        let token = bearer_token(request).ok_or(AuthError::MissingToken)?;
        self.verify(&token)
    }
}

/// Token from `Authorization: Bearer <token>`, falling back to a `token` query
/// parameter for browser clients that cannot set headers on a WebSocket.
pub fn bearer_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    request
        .uri()
        .query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == "token" && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
