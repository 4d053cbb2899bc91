/// Refresh Token Ledger
///
/// Every issued refresh token gets a ledger record keyed by the SHA-256 of
/// the signed token string, never the plaintext. A token is usable only while
/// its record is active; rotation and logout flip records to inactive, and
/// inactive is terminal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::store::StoreError;
use crate::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenStatus {
    Active,
    Inactive,
}

impl RefreshTokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTokenStatus::Active => "active",
            RefreshTokenStatus::Inactive => "inactive",
        }
    }

    pub fn parse(status: &str) -> Result<Self, StoreError> {
        match status {
            "active" => Ok(RefreshTokenStatus::Active),
            "inactive" => Ok(RefreshTokenStatus::Inactive),
            other => Err(StoreError::Corrupt(format!(
                "unknown refresh token status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub content_hash: String,
    pub user_id: UserId,
    pub status: RefreshTokenStatus,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(content_hash: &str, user_id: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_hash: content_hash.to_string(),
            user_id,
            status: RefreshTokenStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RefreshTokenStatus::Active
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("refresh token record not found")]
    NotFound,

    #[error("refresh token record is no longer active")]
    NotActive,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Hash a token string for storage and lookup.
///
/// Used for refresh tokens and e-mail verification tokens alike, so a
/// leaked table never yields a usable bearer secret.
pub fn content_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persistent record of issued refresh tokens
#[async_trait]
pub trait RefreshTokenLedger: Send + Sync {
    /// Insert a new active record.
    async fn record(&self, content_hash: &str, user_id: UserId) -> Result<(), LedgerError>;

    /// Fetch a record by content-hash; `NotFound` when absent.
    async fn lookup(&self, content_hash: &str) -> Result<RefreshTokenRecord, LedgerError>;

    /// Mark a record inactive. Invalidating an inactive record is a no-op.
    async fn invalidate(&self, content_hash: &str) -> Result<(), LedgerError>;

    /// Mark every active record owned by `user_id` inactive, returning how many flipped.
    async fn invalidate_all_for_user(&self, user_id: UserId) -> Result<u64, LedgerError>;

    /// Atomically invalidate `old_hash` (only if still active) and record
    /// `new_hash` as active for `user_id`.
    ///
    /// Fails with `NotActive` and writes nothing when the old record is
    /// missing or already inactive; of two concurrent rotations of the same
    /// token exactly one succeeds.
    async fn rotate(&self, old_hash: &str, new_hash: &str, user_id: UserId) -> Result<(), LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hashing() {
        let token = "header.payload.signature";
        let hash1 = content_hash(token);
        let hash2 = content_hash(token);

        // Same token should produce same hash
        assert_eq!(hash1, hash2);
        // Hash should not equal plaintext
        assert_ne!(token, hash1);
        // Hash should be 64 chars (SHA-256 hex)
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_tokens_different_hashes() {
        assert_ne!(content_hash("token-a"), content_hash("token-b"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_new_record_is_active() {
        let record = RefreshTokenRecord::new(&content_hash("t"), UserId(3));

        assert!(record.is_active());
        assert_eq!(record.user_id, UserId(3));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(RefreshTokenStatus::parse("active").unwrap(), RefreshTokenStatus::Active);
        assert_eq!(RefreshTokenStatus::parse("inactive").unwrap(), RefreshTokenStatus::Inactive);
        assert!(RefreshTokenStatus::parse("revoked").is_err());
    }
}
