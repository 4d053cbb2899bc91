/// Authentication orchestrator
///
/// Composes the hasher, token codec, refresh-token ledger, verification
/// manager and user store into the login, refresh, logout, registration and
/// verification flows. Holds no state of its own beyond shared handles.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::audit::{AuditAction, AuditLog};
use crate::auth::claims::{TokenClaims, TokenKind};
use crate::auth::jwt::TokenCodec;
use crate::auth::password::{CredentialHasher, PasswordError};
use crate::auth::refresh_token::{content_hash, RefreshTokenLedger};
use crate::auth::verification_token::VerificationTokenManager;
use crate::email_client::VerificationMailer;
use crate::error::{AppError, AuthError};
use crate::store::StoreError;
use crate::user::{User, UserId, UserRepository, UserStatus};
use crate::validators::{is_valid_email, is_valid_password};

/// Access and refresh token pair handed to a client
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn CredentialHasher>,
    codec: Arc<dyn TokenCodec>,
    ledger: Arc<dyn RefreshTokenLedger>,
    verification: VerificationTokenManager,
    mailer: Arc<dyn VerificationMailer>,
    // Hash compared against when the e-mail is unknown
    dummy_hash: Arc<OnceCell<String>>,
}

const DUMMY_SECRET: &str = "authgate-unknown-account";

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn CredentialHasher>,
        codec: Arc<dyn TokenCodec>,
        ledger: Arc<dyn RefreshTokenLedger>,
        verification: VerificationTokenManager,
        mailer: Arc<dyn VerificationMailer>,
    ) -> Self {
        Self {
            users,
            hasher,
            codec,
            ledger,
            verification,
            mailer,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn codec(&self) -> Arc<dyn TokenCodec> {
        Arc::clone(&self.codec)
    }

    /// Exchange e-mail and password for a fresh token pair.
    ///
    /// Unknown e-mail and wrong password both yield `InvalidCredentials`.
    #[tracing::instrument(name = "login", skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        self.try_login(email, password)
            .await
            .map_err(|e| audit_failure(AuditAction::Login, e))
    }

    async fn try_login(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        let email = is_valid_email(email)?;

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                // Same Argon2 cost as a wrong password
                let dummy = self
                    .dummy_hash
                    .get_or_try_init(|| self.hash(DUMMY_SECRET))
                    .await?;
                let _ = self.compare(password, dummy).await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        match user.status {
            UserStatus::Active => {}
            UserStatus::Pending => return Err(AuthError::UserPending.into()),
            UserStatus::Inactive => return Err(AuthError::UserInactive.into()),
        }

        self.compare(password, &user.password_hash).await?;

        let pair = self.issue_pair(user.id)?;
        self.ledger
            .record(&content_hash(&pair.refresh_token), user.id)
            .await?;

        AuditLog::success(AuditAction::Login).with_user_id(user.id).emit();
        Ok(pair)
    }

    /// Rotate a refresh token: the presented token is retired and a new pair
    /// is issued. Each refresh token succeeds at most once.
    #[tracing::instrument(name = "refresh", skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        self.try_refresh(refresh_token)
            .await
            .map_err(|e| audit_failure(AuditAction::Refresh, e))
    }

    async fn try_refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.codec.parse(refresh_token, TokenKind::Refresh)?;
        let old_hash = content_hash(refresh_token);

        let record = self.ledger.lookup(&old_hash).await?;
        if !record.is_active() || record.user_id != claims.uid {
            return Err(AuthError::TokenRevoked.into());
        }

        let owner = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::TokenRevoked)?;
        if owner.status != UserStatus::Active {
            return Err(AuthError::UserInactive.into());
        }

        let pair = self.issue_pair(owner.id)?;
        self.ledger
            .rotate(&old_hash, &content_hash(&pair.refresh_token), owner.id)
            .await?;

        AuditLog::success(AuditAction::Refresh).with_user_id(owner.id).emit();
        Ok(pair)
    }

    /// Revoke every refresh token of the access token's owner.
    #[tracing::instrument(name = "logout", skip_all)]
    pub async fn logout(&self, access_token: &str) -> Result<(), AppError> {
        self.try_logout(access_token)
            .await
            .map_err(|e| audit_failure(AuditAction::Logout, e))
    }

    async fn try_logout(&self, access_token: &str) -> Result<(), AppError> {
        let claims = self.codec.parse(access_token, TokenKind::Access)?;
        let revoked = self.ledger.invalidate_all_for_user(claims.uid).await?;

        tracing::info!(user_id = %claims.uid, revoked, "Refresh tokens revoked");
        AuditLog::success(AuditAction::Logout).with_user_id(claims.uid).emit();
        Ok(())
    }

    /// Create a pending account and mail it a verification link.
    #[tracing::instrument(name = "register", skip_all)]
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AppError> {
        self.try_register(email, password)
            .await
            .map_err(|e| audit_failure(AuditAction::Register, e))
    }

    async fn try_register(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = is_valid_email(email)?;
        is_valid_password(password)?;

        let password_hash = self.hash(password).await?;
        let user = self
            .users
            .create(&email, &password_hash)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => AppError::from(AuthError::EmailTaken),
                other => other.into(),
            })?;

        let token = self.issue_verification_token(user.id).await?;
        self.mailer
            .send_verification(&user.email, user.id, &token)
            .await
            .map_err(AppError::internal)?;

        AuditLog::success(AuditAction::Register).with_user_id(user.id).emit();
        Ok(user)
    }

    /// Consume a verification token and activate its owner.
    ///
    /// The token is claimed before the status change, so concurrent
    /// verifications activate at most once.
    #[tracing::instrument(name = "verify_user", skip(self, token))]
    pub async fn verify_user(&self, token: &str, user_id: UserId) -> Result<(), AppError> {
        self.try_verify_user(token, user_id)
            .await
            .map_err(|e| audit_failure(AuditAction::VerifyEmail, e))
    }

    async fn try_verify_user(&self, token: &str, user_id: UserId) -> Result<(), AppError> {
        self.consume_verification_token(token, user_id).await?;

        if !self.users.set_status(user_id, UserStatus::Active).await? {
            return Err(AppError::Internal(format!(
                "verified user {} does not exist",
                user_id
            )));
        }

        AuditLog::success(AuditAction::VerifyEmail).with_user_id(user_id).emit();
        Ok(())
    }

    /// Look up the owner of an already validated access token
    pub async fn current_user(&self, claims: &TokenClaims) -> Result<User, AppError> {
        let user = self
            .users
            .find_by_id(claims.uid)
            .await?
            .ok_or(AuthError::TokenRevoked)?;

        match user.status {
            UserStatus::Inactive => Err(AuthError::UserInactive.into()),
            _ => Ok(user),
        }
    }

    pub async fn issue_verification_token(&self, user_id: UserId) -> Result<String, AppError> {
        Ok(self.verification.issue(user_id).await?)
    }

    pub async fn consume_verification_token(&self, token: &str, user_id: UserId) -> Result<(), AppError> {
        Ok(self.verification.consume(token, user_id).await?)
    }

    /// Hash a secret on the blocking pool
    pub async fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        let hasher = Arc::clone(&self.hasher);
        let secret = secret.to_string();

        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| PasswordError::Internal(e.to_string()))?
    }

    /// Compare a secret against a stored hash on the blocking pool
    pub async fn compare(&self, secret: &str, hash: &str) -> Result<(), PasswordError> {
        let hasher = Arc::clone(&self.hasher);
        let secret = secret.to_string();
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || hasher.compare(&secret, &hash))
            .await
            .map_err(|e| PasswordError::Internal(e.to_string()))?
    }

    fn issue_pair(&self, user_id: UserId) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.codec.issue_access_token(user_id)?,
            refresh_token: self.codec.issue_refresh_token(user_id)?,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.ttl(TokenKind::Access),
        })
    }
}

fn audit_failure(action: AuditAction, error: AppError) -> AppError {
    AuditLog::failure(action, error.code()).emit();
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::auth::jwt::JwtCodec;
    use crate::auth::password::Argon2Hasher;
    use crate::configuration::{JwtSettings, PasswordSettings};
    use crate::email_client::EmailError;
    use crate::store::{MemoryRefreshTokenLedger, MemoryUserRepository, MemoryVerificationTokenStore};

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, UserId, String)>>,
    }

    impl RecordingMailer {
        fn last_token(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().2.clone()
        }
    }

    #[async_trait]
    impl VerificationMailer for RecordingMailer {
        async fn send_verification(
            &self,
            recipient: &str,
            user_id: UserId,
            token: &str,
        ) -> Result<(), EmailError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), user_id, token.to_string()));
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl VerificationMailer for FailingMailer {
        async fn send_verification(&self, _: &str, _: UserId, _: &str) -> Result<(), EmailError> {
            Err(EmailError::SendFailed("smtp down".to_string()))
        }
    }

    /// Argon2 hasher that counts how often it was asked to compare
    struct CountingHasher {
        inner: Argon2Hasher,
        compares: AtomicUsize,
    }

    impl CredentialHasher for CountingHasher {
        fn hash(&self, secret: &str) -> Result<String, PasswordError> {
            self.inner.hash(secret)
        }

        fn compare(&self, secret: &str, hash: &str) -> Result<(), PasswordError> {
            self.compares.fetch_add(1, Ordering::SeqCst);
            self.inner.compare(secret, hash)
        }
    }

    struct Harness {
        service: AuthService,
        users: Arc<MemoryUserRepository>,
        mailer: Arc<RecordingMailer>,
        hasher: Arc<CountingHasher>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_mailer(None)
        }

        fn with_mailer(mailer: Option<Arc<dyn VerificationMailer>>) -> Self {
            let users = Arc::new(MemoryUserRepository::default());
            let recording = Arc::new(RecordingMailer::default());
            let hasher = Arc::new(CountingHasher {
                inner: Argon2Hasher::new(&PasswordSettings {
                    memory_kib: 1024,
                    iterations: 1,
                    parallelism: 1,
                })
                .unwrap(),
                compares: AtomicUsize::new(0),
            });
            let codec = Arc::new(JwtCodec::new(&JwtSettings {
                access_secret: "access-secret-key-at-least-32-characters".to_string(),
                refresh_secret: "refresh-secret-key-at-least-32-characters".to_string(),
                access_token_expiry: 600,
                refresh_token_expiry: 604800,
                issuer: "authgate-test".to_string(),
            }));
            let verification = VerificationTokenManager::new(
                Arc::new(MemoryVerificationTokenStore::default()),
                1800,
            );
            let mailer = mailer.unwrap_or_else(|| recording.clone() as Arc<dyn VerificationMailer>);

            let service = AuthService::new(
                users.clone(),
                hasher.clone(),
                codec,
                Arc::new(MemoryRefreshTokenLedger::default()),
                verification,
                mailer,
            );

            Self {
                service,
                users,
                mailer: recording,
                hasher,
            }
        }

        fn seed(&self, email: &str, password: &str, status: UserStatus) -> User {
            let hash = self.hasher.hash(password).unwrap();
            self.users.insert(email, &hash, status).unwrap()
        }
    }

    fn auth_error(err: AppError) -> AuthError {
        match err {
            AppError::Auth(e) => e,
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_active_user() {
        let h = Harness::new();
        let user = h.seed("ana@example.com", "correct-horse", UserStatus::Active);

        let pair = h.service.login("ana@example.com", "correct-horse").await.unwrap();
        let claims = h
            .service
            .codec()
            .parse(&pair.access_token, TokenKind::Access)
            .unwrap();

        assert_eq!(claims.uid, user.id);
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 600);
    }

    #[tokio::test]
    async fn test_login_rejections() {
        let h = Harness::new();
        h.seed("ana@example.com", "correct-horse", UserStatus::Active);
        h.seed("pending@example.com", "correct-horse", UserStatus::Pending);
        h.seed("gone@example.com", "correct-horse", UserStatus::Inactive);

        let wrong_password = h.service.login("ana@example.com", "wrong-horse").await;
        let unknown = h.service.login("nobody@example.com", "correct-horse").await;
        let pending = h.service.login("pending@example.com", "correct-horse").await;
        let inactive = h.service.login("gone@example.com", "correct-horse").await;

        assert_eq!(auth_error(wrong_password.unwrap_err()), AuthError::InvalidCredentials);
        assert_eq!(auth_error(unknown.unwrap_err()), AuthError::InvalidCredentials);
        assert_eq!(auth_error(pending.unwrap_err()), AuthError::UserPending);
        assert_eq!(auth_error(inactive.unwrap_err()), AuthError::UserInactive);
    }

    #[tokio::test]
    async fn test_unknown_email_still_runs_a_compare() {
        let h = Harness::new();
        h.seed("ana@example.com", "correct-horse", UserStatus::Active);

        let unknown = h.service.login("nobody@example.com", "correct-horse").await;
        assert_eq!(auth_error(unknown.unwrap_err()), AuthError::InvalidCredentials);
        assert_eq!(h.hasher.compares.load(Ordering::SeqCst), 1);

        let wrong_password = h.service.login("ana@example.com", "wrong-horse").await;
        assert_eq!(auth_error(wrong_password.unwrap_err()), AuthError::InvalidCredentials);
        assert_eq!(h.hasher.compares.load(Ordering::SeqCst), 2);

        // The throwaway hash never matches a real login
        let again = h.service.login("nobody@example.com", DUMMY_SECRET).await;
        assert_eq!(auth_error(again.unwrap_err()), AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_email_is_case_insensitive() {
        let h = Harness::new();
        h.service.register("ana@example.com", "long-enough-pw").await.unwrap();

        let second = h.service.register("ANA@Example.com", "another-password").await;
        assert_eq!(auth_error(second.unwrap_err()), AuthError::EmailTaken);

        let user = h.users.find_by_email("ana@example.com").await.unwrap().unwrap();
        h.users.set_status(user.id, UserStatus::Active).await.unwrap();
        assert!(h.service.login(" Ana@EXAMPLE.com", "long-enough-pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_login_rejects_malformed_email() {
        let h = Harness::new();

        assert!(matches!(
            h.service.login("not-an-email", "whatever1").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_succeeds_once() {
        let h = Harness::new();
        h.seed("ana@example.com", "correct-horse", UserStatus::Active);
        let pair = h.service.login("ana@example.com", "correct-horse").await.unwrap();

        let rotated = h.service.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        let reuse = h.service.refresh(&pair.refresh_token).await;
        assert_eq!(auth_error(reuse.unwrap_err()), AuthError::TokenRevoked);

        // The rotated token is live
        assert!(h.service.refresh(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let h = Harness::new();
        h.seed("ana@example.com", "correct-horse", UserStatus::Active);
        let pair = h.service.login("ana@example.com", "correct-horse").await.unwrap();

        let result = h.service.refresh(&pair.access_token).await;
        assert_eq!(auth_error(result.unwrap_err()), AuthError::TokenSignatureInvalid);
    }

    #[tokio::test]
    async fn test_refresh_unknown_token_is_revoked() {
        let h = Harness::new();
        let user = h.seed("ana@example.com", "correct-horse", UserStatus::Active);

        // Validly signed but never recorded
        let token = h.service.codec().issue_refresh_token(user.id).unwrap();
        let result = h.service.refresh(&token).await;

        assert_eq!(auth_error(result.unwrap_err()), AuthError::TokenRevoked);
    }

    #[tokio::test]
    async fn test_refresh_for_deactivated_user() {
        let h = Harness::new();
        let user = h.seed("ana@example.com", "correct-horse", UserStatus::Active);
        let pair = h.service.login("ana@example.com", "correct-horse").await.unwrap();

        h.users.set_status(user.id, UserStatus::Inactive).await.unwrap();

        let result = h.service.refresh(&pair.refresh_token).await;
        assert_eq!(auth_error(result.unwrap_err()), AuthError::UserInactive);
    }

    #[tokio::test]
    async fn test_logout_revokes_every_refresh_token() {
        let h = Harness::new();
        h.seed("ana@example.com", "correct-horse", UserStatus::Active);
        let first = h.service.login("ana@example.com", "correct-horse").await.unwrap();
        let second = h.service.login("ana@example.com", "correct-horse").await.unwrap();

        h.service.logout(&first.access_token).await.unwrap();

        for pair in [first, second] {
            let result = h.service.refresh(&pair.refresh_token).await;
            assert_eq!(auth_error(result.unwrap_err()), AuthError::TokenRevoked);
        }
    }

    #[tokio::test]
    async fn test_logout_requires_access_token() {
        let h = Harness::new();
        h.seed("ana@example.com", "correct-horse", UserStatus::Active);
        let pair = h.service.login("ana@example.com", "correct-horse").await.unwrap();

        let result = h.service.logout(&pair.refresh_token).await;
        assert_eq!(auth_error(result.unwrap_err()), AuthError::TokenSignatureInvalid);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_single_winner() {
        let h = Harness::new();
        h.seed("ana@example.com", "correct-horse", UserStatus::Active);
        let pair = h.service.login("ana@example.com", "correct-horse").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = h.service.clone();
            let token = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move { service.refresh(&token).await }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert_eq!(auth_error(e), AuthError::TokenRevoked),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_register_then_verify_then_login() {
        let h = Harness::new();

        let user = h.service.register("new@example.com", "long-enough").await.unwrap();
        assert_eq!(user.status, UserStatus::Pending);
        assert_ne!(user.password_hash, "long-enough");

        let pending = h.service.login("new@example.com", "long-enough").await;
        assert_eq!(auth_error(pending.unwrap_err()), AuthError::UserPending);

        let token = h.mailer.last_token();
        h.service.verify_user(&token, user.id).await.unwrap();

        assert!(h.service.login("new@example.com", "long-enough").await.is_ok());

        let again = h.service.verify_user(&token, user.id).await;
        assert_eq!(auth_error(again.unwrap_err()), AuthError::VerificationTokenNotFound);
    }

    #[tokio::test]
    async fn test_verify_with_other_users_token() {
        let h = Harness::new();
        let first = h.service.register("one@example.com", "long-enough").await.unwrap();
        let token = h.mailer.last_token();
        let second = h.service.register("two@example.com", "long-enough").await.unwrap();

        let result = h.service.verify_user(&token, second.id).await;
        assert_eq!(
            auth_error(result.unwrap_err()),
            AuthError::VerificationTokenUserMismatch
        );

        let current = h.users.find_by_id(second.id).await.unwrap().unwrap();
        assert_eq!(current.status, UserStatus::Pending);
        assert!(h.service.verify_user(&token, first.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let h = Harness::new();
        h.service.register("new@example.com", "long-enough").await.unwrap();

        let result = h.service.register("new@example.com", "other-password").await;
        assert_eq!(auth_error(result.unwrap_err()), AuthError::EmailTaken);
    }

    #[tokio::test]
    async fn test_register_short_password() {
        let h = Harness::new();

        assert!(matches!(
            h.service.register("new@example.com", "short").await,
            Err(AppError::Validation(_))
        ));
        assert!(h.users.find_by_email("new@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_mail_failure_is_internal() {
        let h = Harness::with_mailer(Some(Arc::new(FailingMailer)));

        assert!(matches!(
            h.service.register("new@example.com", "long-enough").await,
            Err(AppError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_hash_and_compare_pass_through() {
        let h = Harness::new();
        let hash = h.service.hash("s3cret-value").await.unwrap();

        assert!(h.service.compare("s3cret-value", &hash).await.is_ok());
        assert_eq!(
            h.service.compare("other-value", &hash).await,
            Err(PasswordError::Mismatch)
        );
    }

    #[tokio::test]
    async fn test_current_user() {
        let h = Harness::new();
        let user = h.seed("ana@example.com", "correct-horse", UserStatus::Active);
        let claims = TokenClaims::new(user.id, "authgate-test", chrono::Utc::now().timestamp(), 600);

        assert_eq!(h.service.current_user(&claims).await.unwrap().email, "ana@example.com");

        let ghost = TokenClaims::new(UserId(999), "authgate-test", chrono::Utc::now().timestamp(), 600);
        assert_eq!(
            auth_error(h.service.current_user(&ghost).await.unwrap_err()),
            AuthError::TokenRevoked
        );
    }
}
