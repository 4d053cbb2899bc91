/// JWT claims carried by access and refresh tokens.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::UserId;

/// Which secret and lifetime a token is issued under.
///
/// Access and refresh tokens share an envelope but are signed with
/// different secrets, so one kind never validates as the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Token payload
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenClaims {
    /// Owning user
    pub uid: UserId,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token id; keeps tokens minted in the same second distinct
    pub jti: String,
}

impl TokenClaims {
    /// Create claims issued at `now` that expire `ttl_seconds` later
    pub fn new(user_id: UserId, issuer: &str, now: i64, ttl_seconds: i64) -> Self {
        Self {
            uid: user_id,
            iss: issuer.to_string(),
            iat: now,
            exp: now + ttl_seconds,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// A token is expired from the instant `now` reaches `exp`
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}
