/// Postgres implementations backed by `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{
    LedgerError, RefreshTokenLedger, RefreshTokenRecord, RefreshTokenStatus, VerificationToken,
    VerificationTokenStore,
};
use crate::store::StoreError;
use crate::user::{User, UserId, UserRepository, UserStatus};

type UserRow = (i64, String, String, String, DateTime<Utc>);

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    let (id, email, password_hash, status, created_at) = row;
    Ok(User {
        id: UserId(id),
        email,
        password_hash,
        status: UserStatus::parse(&status)?,
        created_at,
    })
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, status, created_at FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(user_from_row)
        .transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, status, created_at FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .map(user_from_row)
        .transpose()
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, password_hash, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, email, password_hash, status, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(UserStatus::Pending.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        user_from_row(row)
    }

    async fn set_status(&self, id: UserId, status: UserStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenLedger {
    pool: PgPool,
}

impl PgRefreshTokenLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_REFRESH_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (id, token_hash, user_id, status, created_at)
    VALUES ($1, $2, $3, $4, $5)
"#;

#[async_trait]
impl RefreshTokenLedger for PgRefreshTokenLedger {
    async fn record(&self, content_hash: &str, user_id: UserId) -> Result<(), LedgerError> {
        let record = RefreshTokenRecord::new(content_hash, user_id);
        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(record.id)
            .bind(&record.content_hash)
            .bind(record.user_id.0)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn lookup(&self, content_hash: &str) -> Result<RefreshTokenRecord, LedgerError> {
        let row = sqlx::query_as::<_, (Uuid, String, i64, String, DateTime<Utc>)>(
            "SELECT id, token_hash, user_id, status, created_at FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?
        .ok_or(LedgerError::NotFound)?;

        let (id, content_hash, user_id, status, created_at) = row;
        Ok(RefreshTokenRecord {
            id,
            content_hash,
            user_id: UserId(user_id),
            status: RefreshTokenStatus::parse(&status)?,
            created_at,
        })
    }

    async fn invalidate(&self, content_hash: &str) -> Result<(), LedgerError> {
        // COALESCE keeps the first invalidation time on repeated calls
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET status = 'inactive', invalidated_at = COALESCE(invalidated_at, $2)
            WHERE token_hash = $1
            "#,
        )
        .bind(content_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }

    async fn invalidate_all_for_user(&self, user_id: UserId) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET status = 'inactive', invalidated_at = $2
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected())
    }

    async fn rotate(&self, old_hash: &str, new_hash: &str, user_id: UserId) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let flipped = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET status = 'inactive', invalidated_at = $2
            WHERE token_hash = $1 AND status = 'active'
            "#,
        )
        .bind(old_hash)
        .bind(Utc::now())
        .execute(&mut tx)
        .await
        .map_err(StoreError::from)?;

        if flipped.rows_affected() == 0 {
            tx.rollback().await.map_err(StoreError::from)?;
            return Err(LedgerError::NotActive);
        }

        let record = RefreshTokenRecord::new(new_hash, user_id);
        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(record.id)
            .bind(&record.content_hash)
            .bind(record.user_id.0)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .execute(&mut tx)
            .await
            .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgVerificationTokenStore {
    pool: PgPool,
}

impl PgVerificationTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationTokenStore for PgVerificationTokenStore {
    async fn insert(&self, token: &VerificationToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO email_verification_tokens (id, token_hash, user_id, created_at, expires_at, is_used)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(&token.content_hash)
        .bind(token.user_id.0)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.used)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_unused(&self, content_hash: &str) -> Result<Option<VerificationToken>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, i64, DateTime<Utc>, DateTime<Utc>, bool)>(
            r#"
            SELECT id, token_hash, user_id, created_at, expires_at, is_used
            FROM email_verification_tokens
            WHERE token_hash = $1 AND is_used = FALSE
            "#,
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, content_hash, user_id, created_at, expires_at, used)| VerificationToken {
                id,
                content_hash,
                user_id: UserId(user_id),
                created_at,
                expires_at,
                used,
            },
        ))
    }

    async fn mark_used(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE email_verification_tokens SET is_used = TRUE WHERE id = $1 AND is_used = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
