/// Error Handling Module
///
/// Component errors (password, token, ledger, verification, store) are
/// folded into one `AppError` that knows how to render itself as an HTTP
/// response. Only internal errors are logged with their full detail; the
/// client sees a generic message for those.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

use crate::auth::{LedgerError, PasswordError, TokenError, VerificationError};
use crate::store::StoreError;
pub use crate::validators::ValidationError;

// ============================================================================
// DOMAIN ERROR TYPES
// ============================================================================

/// Authentication and authorization failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is pending e-mail verification")]
    UserPending,

    #[error("Account is inactive")]
    UserInactive,

    #[error("Token is malformed")]
    TokenMalformed,

    #[error("Token signature is invalid")]
    TokenSignatureInvalid,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Missing authentication token")]
    MissingToken,

    #[error("Verification token not found")]
    VerificationTokenNotFound,

    #[error("Verification token has expired")]
    VerificationTokenExpired,

    #[error("Verification token does not belong to this user")]
    VerificationTokenUserMismatch,

    #[error("Email already registered")]
    EmailTaken,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::UserPending => "USER_PENDING",
            AuthError::UserInactive => "USER_INACTIVE",
            AuthError::TokenMalformed => "TOKEN_MALFORMED",
            AuthError::TokenSignatureInvalid => "TOKEN_SIGNATURE_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenRevoked => "TOKEN_REVOKED",
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::VerificationTokenNotFound => "VERIFICATION_TOKEN_NOT_FOUND",
            AuthError::VerificationTokenExpired => "VERIFICATION_TOKEN_EXPIRED",
            AuthError::VerificationTokenUserMismatch => "VERIFICATION_TOKEN_USER_MISMATCH",
            AuthError::EmailTaken => "EMAIL_TAKEN",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::TokenMalformed
            | AuthError::TokenSignatureInvalid
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::UserPending
            | AuthError::UserInactive
            | AuthError::VerificationTokenUserMismatch => StatusCode::FORBIDDEN,
            AuthError::VerificationTokenNotFound | AuthError::VerificationTokenExpired => {
                StatusCode::BAD_REQUEST
            }
            AuthError::EmailTaken => StatusCode::CONFLICT,
        }
    }
}

// ============================================================================
// UNIFIED APPLICATION ERROR TYPE
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        AppError::Internal(err.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Auth(e) => e.code(),
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to hand to a client
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn log(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(e) => {
                tracing::warn!(
                    request_id = request_id,
                    code = e.code(),
                    error = %e,
                    "Authentication error"
                );
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthError::TokenMalformed.into(),
            TokenError::SignatureInvalid => AuthError::TokenSignatureInvalid.into(),
            TokenError::Expired => AuthError::TokenExpired.into(),
            TokenError::Encoding(msg) => AppError::Internal(msg),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => AuthError::InvalidCredentials.into(),
            PasswordError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound | LedgerError::NotActive => AuthError::TokenRevoked.into(),
            LedgerError::Store(e) => e.into(),
        }
    }
}

impl From<VerificationError> for AppError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::NotFound => AuthError::VerificationTokenNotFound.into(),
            VerificationError::Expired => AuthError::VerificationTokenExpired.into(),
            VerificationError::UserMismatch => AuthError::VerificationTokenUserMismatch.into(),
            VerificationError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

// ============================================================================
// HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log(&error_id);

        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse::new(
            error_id,
            self.public_message(),
            self.code().to_string(),
            status.as_u16(),
        ))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(e) => e.status_code(),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Per-operation context used to correlate log lines
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Log `error` with this context attached, then hand it back
    pub fn record(&self, error: AppError) -> AppError {
        match &error {
            AppError::Internal(_) => tracing::error!(
                request_id = %self.request_id,
                operation = %self.operation,
                user_id = ?self.user_id,
                error = %error,
                "Operation failed"
            ),
            _ => tracing::info!(
                request_id = %self.request_id,
                operation = %self.operation,
                user_id = ?self.user_id,
                code = error.code(),
                "Operation rejected"
            ),
        }
        error
    }
}
