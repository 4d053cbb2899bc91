use sqlx::postgres::PgPoolOptions;
use std::io::{Error, ErrorKind};
use std::net::TcpListener;
use std::sync::Arc;

use authgate::auth::{Argon2Hasher, AuthService, JwtCodec, VerificationTokenManager};
use authgate::configuration::get_configuration;
use authgate::email_client::EmailClient;
use authgate::startup::run;
use authgate::store::{PgRefreshTokenLedger, PgUserRepository, PgVerificationTokenStore};
use authgate::telemetry::init_telemetry;

fn startup_error(kind: ErrorKind, what: &str, err: impl std::fmt::Display) -> Error {
    tracing::error!(error = %err, "{}", what);
    Error::new(kind, what.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();
    tracing::info!("Starting application");

    let configuration = get_configuration()
        .map_err(|e| startup_error(ErrorKind::InvalidInput, "Failed to read configuration", e))?;
    tracing::info!("Configuration loaded successfully");

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            startup_error(
                ErrorKind::ConnectionRefused,
                "Failed to create connection pool",
                e,
            )
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| startup_error(ErrorKind::Other, "Failed to run migrations", e))?;
    tracing::info!("Database ready");

    let hasher = Argon2Hasher::new(&configuration.password)
        .map_err(|e| startup_error(ErrorKind::InvalidInput, "Invalid password settings", e))?;
    let email_client = EmailClient::from_settings(
        &configuration.email_client,
        &configuration.application.base_url,
    )
    .map_err(|e| startup_error(ErrorKind::InvalidInput, "Invalid e-mail client settings", e))?;

    let verification = VerificationTokenManager::new(
        Arc::new(PgVerificationTokenStore::new(pool.clone())),
        configuration.verification.token_expiry,
    );
    let service = AuthService::new(
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(hasher),
        Arc::new(JwtCodec::new(&configuration.jwt)),
        Arc::new(PgRefreshTokenLedger::new(pool)),
        verification,
        Arc::new(email_client),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(address = %address, "Server listening");

    run(listener, service)?.await
}
