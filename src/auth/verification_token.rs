/// One-time e-mail verification tokens.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use uuid::Uuid;

use crate::auth::refresh_token::content_hash;
use crate::store::StoreError;
use crate::user::UserId;

/// 32 alphanumeric characters is roughly 190 bits of entropy
const TOKEN_LENGTH: usize = 32;

#[derive(Clone, Debug)]
pub struct VerificationToken {
    pub id: Uuid,
    pub content_hash: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl VerificationToken {
    pub fn new(token: &str, user_id: UserId, now: DateTime<Utc>, expiry: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_hash: content_hash(token),
            user_id,
            created_at: now,
            expires_at: now + expiry,
            used: false,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("verification token not found or already used")]
    NotFound,

    #[error("verification token has expired")]
    Expired,

    #[error("verification token belongs to another user")]
    UserMismatch,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait VerificationTokenStore: Send + Sync {
    async fn insert(&self, token: &VerificationToken) -> Result<(), StoreError>;

    /// Find a token that has not been used yet.
    async fn find_unused(&self, content_hash: &str) -> Result<Option<VerificationToken>, StoreError>;

    /// Flip `used` to true if it is still false. Returns whether this call did the flip.
    async fn mark_used(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Mints and consumes verification tokens
#[derive(Clone)]
pub struct VerificationTokenManager {
    store: Arc<dyn VerificationTokenStore>,
    expiry: Duration,
}

impl VerificationTokenManager {
    pub fn new(store: Arc<dyn VerificationTokenStore>, expiry_seconds: i64) -> Self {
        Self {
            store,
            expiry: Duration::seconds(expiry_seconds),
        }
    }

    /// Create a token for `user_id` and return its plaintext.
    ///
    /// Only the hash is stored; the plaintext must reach the user out of band.
    pub async fn issue(&self, user_id: UserId) -> Result<String, VerificationError> {
        self.issue_at(user_id, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<String, VerificationError> {
        let token = generate_token();
        let record = VerificationToken::new(&token, user_id, now, self.expiry);

        self.store.insert(&record).await?;

        tracing::info!(
            user_id = %user_id,
            expires_at = %record.expires_at.to_rfc3339(),
            "Verification token issued"
        );
        Ok(token)
    }

    /// Consume `token` on behalf of `expected_user_id`. Succeeds at most once.
    pub async fn consume(&self, token: &str, expected_user_id: UserId) -> Result<(), VerificationError> {
        self.consume_at(token, expected_user_id, Utc::now()).await
    }

    pub async fn consume_at(
        &self,
        token: &str,
        expected_user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        let record = self
            .store
            .find_unused(&content_hash(token))
            .await?
            .ok_or(VerificationError::NotFound)?;

        if record.user_id != expected_user_id {
            tracing::warn!(
                token_owner = %record.user_id,
                user_id = %expected_user_id,
                "Verification token presented for another user"
            );
            return Err(VerificationError::UserMismatch);
        }

        if record.is_expired_at(now) {
            return Err(VerificationError::Expired);
        }

        // Lost a race with a concurrent consume
        if !self.store.mark_used(record.id).await? {
            return Err(VerificationError::NotFound);
        }

        Ok(())
    }
}

fn generate_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
