//! Signed tokens handed out by the server.
//!
//! Two kinds share one HS256 key: the session token returned from
//! `POST /credentials`, and the OAuth `state` that round-trips through
//! Google's consent screen. The `purpose` claim keeps one from standing in
//! for the other.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
};
use tracing::debug;

pub const SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const OAUTH_STATE_TTL_SECONDS: i64 = 10 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TokenPurpose {
    Session,
    OauthState,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    purpose: TokenPurpose,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn from_secret(secret: &Secret<String>) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }

    pub fn issue_session(&self, user_id: UserId) -> Result<String, ApiError> {
        self.issue(user_id, TokenPurpose::Session, SESSION_TTL_SECONDS)
    }

    pub fn verify_session(&self, token: &str) -> Result<UserId, ApiError> {
        self.verify(token, TokenPurpose::Session)
            .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "invalid or expired session"))
    }

    pub fn issue_oauth_state(&self, user_id: UserId) -> Result<String, ApiError> {
        self.issue(user_id, TokenPurpose::OauthState, OAUTH_STATE_TTL_SECONDS)
    }

    pub fn verify_oauth_state(&self, state: &str) -> Result<UserId, ApiError> {
        self.verify(state, TokenPurpose::OauthState)
            .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "invalid oauth state"))
    }

    fn issue(&self, user_id: UserId, purpose: TokenPurpose, ttl: i64) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: format!("user:{}", user_id.0),
            purpose,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::new(ErrorCode::Internal, format!("failed to sign token: {e}")))
    }

    fn verify(&self, token: &str, purpose: TokenPurpose) -> Option<UserId> {
        let data = match decode::<Claims>(token, &self.decoding, &Validation::default()) {
            Ok(data) => data,
            Err(error) => {
                debug!(%error, ?purpose, "token rejected");
                return None;
            }
        };
        if data.claims.purpose != purpose {
            debug!(?purpose, got = ?data.claims.purpose, "token used for the wrong purpose");
            return None;
        }
        data.claims
            .sub
            .strip_prefix("user:")
            .and_then(|id| id.parse().ok())
            .map(UserId)
    }
}

/// Checks that `token` is a live session for `user_id`.
pub fn authorize(keys: &AuthKeys, token: Option<&str>, user_id: UserId) -> Result<(), ApiError> {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Err(ApiError::new(ErrorCode::Unauthorized, "missing session token"));
    };
    let subject = keys.verify_session(token)?;
    if subject != user_id {
        return Err(ApiError::new(
            ErrorCode::Unauthorized,
            "session does not belong to this user",
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
