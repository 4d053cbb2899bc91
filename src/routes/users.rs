/// User Routes
///
/// Registration, e-mail verification and the current-user endpoint.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, TokenClaims};
use crate::error::{AppError, ErrorContext, ValidationError};
use crate::logger::request_id;
use crate::user::{User, UserId, UserStatus};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

/// Public view of a user; never carries the password hash
#[derive(Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub status: UserStatus,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            status: user.status,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// POST /v1/users
///
/// Create a pending account and send the verification e-mail.
///
/// # Errors
/// - 400: Invalid e-mail, or password outside 8..=128 characters
/// - 409: E-mail already registered
/// - 500: Verification e-mail could not be sent
pub async fn register(
    req: HttpRequest,
    form: web::Json<RegisterRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration").with_request_id(request_id(&req));

    let user = service
        .register(&form.email, &form.password)
        .await
        .map_err(|e| context.record(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "user created, check e-mail for activation instructions",
        "user": UserResponse::from(user),
    })))
}

/// GET /v1/users/{id}/verify?token=...
///
/// # Errors
/// - 400: Missing, unknown, used or expired token
/// - 403: Token issued to another user
pub async fn verify(
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<VerifyQuery>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = UserId(path.into_inner());
    let context = ErrorContext::new("email_verification")
        .with_request_id(request_id(&req))
        .with_user_id(user_id.to_string());

    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| context.record(ValidationError::EmptyField("token").into()))?;

    service
        .verify_user(token, user_id)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "user verified",
    })))
}

/// GET /v1/users/me
///
/// **Requires a valid access token**; claims are injected by `JwtMiddleware`.
pub async fn me(
    claims: web::ReqData<TokenClaims>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = service.current_user(&claims).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}
