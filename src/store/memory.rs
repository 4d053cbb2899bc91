/// In-process implementations of the storage seams.
///
/// Each store guards its map with a single mutex, so every operation,
/// including the two-step rotation, is atomic with respect to the others.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{
    LedgerError, RefreshTokenLedger, RefreshTokenRecord, RefreshTokenStatus, VerificationToken,
    VerificationTokenStore,
};
use crate::store::StoreError;
use crate::user::{User, UserId, UserRepository, UserStatus};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    rows: HashMap<UserId, User>,
}

#[derive(Default)]
pub struct MemoryUserRepository {
    table: Mutex<UserTable>,
}

impl MemoryUserRepository {
    /// Insert a fully-formed user, bypassing registration. Used to seed fixtures.
    pub fn insert(&self, email: &str, password_hash: &str, status: UserStatus) -> Result<User, StoreError> {
        let mut table = lock(&self.table)?;
        if table.rows.values().any(|user| user.email.eq_ignore_ascii_case(email)) {
            return Err(StoreError::Duplicate(format!("email {} already registered", email)));
        }

        table.next_id += 1;
        let user = User {
            id: UserId(table.next_id),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            status,
            created_at: Utc::now(),
        };
        table.rows.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let table = lock(&self.table)?;
        Ok(table
            .rows
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let table = lock(&self.table)?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        self.insert(email, password_hash, UserStatus::Pending)
    }

    async fn set_status(&self, id: UserId, status: UserStatus) -> Result<bool, StoreError> {
        let mut table = lock(&self.table)?;
        match table.rows.get_mut(&id) {
            Some(user) => {
                user.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryRefreshTokenLedger {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
}

fn insert_active(
    records: &mut HashMap<String, RefreshTokenRecord>,
    content_hash: &str,
    user_id: UserId,
) -> Result<(), LedgerError> {
    if records.contains_key(content_hash) {
        return Err(StoreError::Duplicate("refresh token already recorded".to_string()).into());
    }
    records.insert(
        content_hash.to_string(),
        RefreshTokenRecord::new(content_hash, user_id),
    );
    Ok(())
}

#[async_trait]
impl RefreshTokenLedger for MemoryRefreshTokenLedger {
    async fn record(&self, content_hash: &str, user_id: UserId) -> Result<(), LedgerError> {
        let mut records = lock(&self.records)?;
        insert_active(&mut records, content_hash, user_id)
    }

    async fn lookup(&self, content_hash: &str) -> Result<RefreshTokenRecord, LedgerError> {
        let records = lock(&self.records)?;
        records.get(content_hash).cloned().ok_or(LedgerError::NotFound)
    }

    async fn invalidate(&self, content_hash: &str) -> Result<(), LedgerError> {
        let mut records = lock(&self.records)?;
        let record = records.get_mut(content_hash).ok_or(LedgerError::NotFound)?;
        record.status = RefreshTokenStatus::Inactive;
        Ok(())
    }

    async fn invalidate_all_for_user(&self, user_id: UserId) -> Result<u64, LedgerError> {
        let mut records = lock(&self.records)?;
        let mut flipped = 0;
        for record in records.values_mut() {
            if record.user_id == user_id && record.is_active() {
                record.status = RefreshTokenStatus::Inactive;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn rotate(&self, old_hash: &str, new_hash: &str, user_id: UserId) -> Result<(), LedgerError> {
        let mut records = lock(&self.records)?;

        match records.get(old_hash) {
            Some(record) if record.is_active() => {}
            _ => return Err(LedgerError::NotActive),
        }
        insert_active(&mut records, new_hash, user_id)?;
        if let Some(old) = records.get_mut(old_hash) {
            old.status = RefreshTokenStatus::Inactive;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryVerificationTokenStore {
    tokens: Mutex<HashMap<Uuid, VerificationToken>>,
}

#[async_trait]
impl VerificationTokenStore for MemoryVerificationTokenStore {
    async fn insert(&self, token: &VerificationToken) -> Result<(), StoreError> {
        let mut tokens = lock(&self.tokens)?;
        if tokens.values().any(|t| t.content_hash == token.content_hash) {
            return Err(StoreError::Duplicate("verification token already stored".to_string()));
        }
        tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_unused(&self, content_hash: &str) -> Result<Option<VerificationToken>, StoreError> {
        let tokens = lock(&self.tokens)?;
        Ok(tokens
            .values()
            .find(|t| t.content_hash == content_hash && !t.used)
            .cloned())
    }

    async fn mark_used(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tokens = lock(&self.tokens)?;
        match tokens.get_mut(&id) {
            Some(token) if !token.used => {
                token.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
