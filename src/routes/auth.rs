/// Authentication Routes
///
/// Login, token refresh and logout.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::AuthService;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::logger::request_id;
use crate::middleware::bearer_token;

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /v1/auth/login
///
/// Exchange e-mail and password for an access/refresh token pair.
///
/// # Errors
/// - 400: Malformed e-mail
/// - 401: Unknown e-mail or wrong password (indistinguishable)
/// - 403: Account pending verification or inactive
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login").with_request_id(request_id(&req));

    let pair = service
        .login(&form.email, &form.password)
        .await
        .map_err(|e| context.record(e))?;

    tracing::info!(request_id = %context.request_id, "User logged in successfully");
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /v1/auth/refresh
///
/// Rotate a refresh token. The presented token is retired; presenting it
/// again fails with `TOKEN_REVOKED`.
///
/// # Errors
/// - 401: Malformed, forged, expired or revoked refresh token
/// - 403: Owning account is no longer active
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh").with_request_id(request_id(&req));

    let pair = service
        .refresh(&form.refresh_token)
        .await
        .map_err(|e| context.record(e))?;

    tracing::info!(request_id = %context.request_id, "Token refreshed successfully");
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /v1/auth/logout
///
/// Revoke every refresh token of the caller. Takes the access token as
/// `Authorization: Bearer <token>`.
pub async fn logout(
    req: HttpRequest,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_logout").with_request_id(request_id(&req));

    let token = bearer_token(req.headers())
        .ok_or_else(|| context.record(AuthError::MissingToken.into()))?;
    service
        .logout(token)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::NoContent().finish())
}
