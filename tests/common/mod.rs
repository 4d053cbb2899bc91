#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use authgate::auth::{Argon2Hasher, AuthService, CredentialHasher, JwtCodec, VerificationTokenManager};
use authgate::configuration::{get_configuration, JwtSettings, PasswordSettings};
use authgate::email_client::{EmailError, VerificationMailer};
use authgate::startup::run;
use authgate::store::{MemoryRefreshTokenLedger, MemoryUserRepository, MemoryVerificationTokenStore};
use authgate::telemetry::{get_subscriber, init_subscriber};
use authgate::user::{User, UserId, UserStatus};
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool};

pub const PASSWORD: &str = "correct-horse-battery";

/// Mailer that keeps every verification link it was asked to send
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, UserId, String)>>,
}

impl RecordingMailer {
    pub fn token_for(&self, email: &str) -> Option<(UserId, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(recipient, _, _)| recipient == email)
            .map(|(_, user_id, token)| (*user_id, token.clone()))
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
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

/// Argon2 parameters cheap enough for test suites
pub fn cheap_hasher() -> Argon2Hasher {
    Argon2Hasher::new(&PasswordSettings {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("Invalid argon2 parameters")
}

pub fn test_codec() -> JwtCodec {
    JwtCodec::new(&JwtSettings {
        access_secret: "integration-access-secret-0123456789abcdef".to_string(),
        refresh_secret: "integration-refresh-secret-0123456789abcdef".to_string(),
        access_token_expiry: 600,
        refresh_token_expiry: 604800,
        issuer: "authgate-test".to_string(),
    })
}

/// Create a fresh, migrated database named after a random uuid.
/// Needs the Postgres server from `configuration.yaml` (or `APP_DATABASE__*`).
pub async fn configure_database() -> PgPool {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let config = &configuration.database;

    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

/// Running server backed by in-memory stores
pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub users: Arc<MemoryUserRepository>,
    pub mailer: Arc<RecordingMailer>,
    hasher: Arc<Argon2Hasher>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_verification_expiry(1800).await
    }

    pub async fn spawn_with_verification_expiry(expiry_seconds: i64) -> Self {
        if std::env::var("TEST_LOG").is_ok() {
            init_subscriber(get_subscriber("debug", std::io::stdout));
        }

        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();
        let address = format!("http://127.0.0.1:{}", port);

        let users = Arc::new(MemoryUserRepository::default());
        let mailer = Arc::new(RecordingMailer::default());
        let hasher = Arc::new(cheap_hasher());
        let codec = Arc::new(test_codec());
        let verification = VerificationTokenManager::new(
            Arc::new(MemoryVerificationTokenStore::default()),
            expiry_seconds,
        );

        let service = AuthService::new(
            users.clone(),
            hasher.clone(),
            codec,
            Arc::new(MemoryRefreshTokenLedger::default()),
            verification,
            mailer.clone(),
        );

        let server = run(listener, service).expect("Failed to bind address");
        let _ = tokio::spawn(server);

        Self {
            address,
            api_client: reqwest::Client::new(),
            users,
            mailer,
            hasher,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Insert a user directly into the store, skipping registration
    pub fn seed_user(&self, email: &str, status: UserStatus) -> User {
        let hash = self.hasher.hash(PASSWORD).expect("Failed to hash password");
        self.users
            .insert(email, &hash, status)
            .expect("Failed to seed user")
    }

    pub async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.api_client
            .post(self.url("/v1/users"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn verify(&self, user_id: UserId, token: &str) -> reqwest::Response {
        self.api_client
            .get(self.url(&format!("/v1/users/{}/verify", user_id)))
            .query(&[("token", token)])
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.api_client
            .post(self.url("/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Log in and return the token pair body; panics unless the login succeeds
    pub async fn login_ok(&self, email: &str) -> Value {
        let response = self.login(email, PASSWORD).await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    pub async fn refresh(&self, refresh_token: &str) -> reqwest::Response {
        self.api_client
            .post(self.url("/v1/auth/refresh"))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn logout(&self, access_token: Option<&str>) -> reqwest::Response {
        let mut request = self.api_client.post(self.url("/v1/auth/logout"));
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub async fn me(&self, access_token: Option<&str>) -> reqwest::Response {
        let mut request = self.api_client.get(self.url("/v1/users/me"));
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request.")
    }
}

/// Assert on status and error code, returning the parsed error body
pub async fn assert_error(response: reqwest::Response, status: u16, code: &str) -> Value {
    assert_eq!(status, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse error body");
    assert_eq!(body["code"], code, "unexpected error body: {}", body);
    assert_eq!(body["status"], status);
    assert!(body["error_id"].is_string());
    assert!(body["timestamp"].is_string());
    body
}
