/// JWT Token Generation and Validation
///
/// Signs and parses the compact `header.payload.signature` tokens used for
/// both access and refresh credentials. Only HS256 is accepted on the way in.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{TokenClaims, TokenKind};
use crate::configuration::JwtSettings;
use crate::user::UserId;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Error type for token issuance and validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    #[error("failed to sign token: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidIssuer => {
                TokenError::SignatureInvalid
            }
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

/// Stateless token signing capability
pub trait TokenCodec: Send + Sync {
    /// Sign a fresh token of `kind` for `user_id`
    fn issue(&self, kind: TokenKind, user_id: UserId) -> Result<String, TokenError>;

    /// Verify algorithm, signature, issuer and expiry, returning the claims
    fn parse(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, TokenError>;

    /// Lifetime in seconds of tokens of `kind`
    fn ttl(&self, kind: TokenKind) -> i64;

    fn issue_access_token(&self, user_id: UserId) -> Result<String, TokenError> {
        self.issue(TokenKind::Access, user_id)
    }

    fn issue_refresh_token(&self, user_id: UserId) -> Result<String, TokenError> {
        self.issue(TokenKind::Refresh, user_id)
    }
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: i64,
}

impl SigningKeys {
    fn new(secret: &str, ttl: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// HS256 implementation of [`TokenCodec`] with one secret per token kind
pub struct JwtCodec {
    issuer: String,
    access: SigningKeys,
    refresh: SigningKeys,
    validation: Validation,
}

impl JwtCodec {
    pub fn new(config: &JwtSettings) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        // Expiry is checked by `parse_at` so the boundary is `now >= exp`
        // with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            issuer: config.issuer.clone(),
            access: SigningKeys::new(&config.access_secret, config.access_token_expiry),
            refresh: SigningKeys::new(&config.refresh_secret, config.refresh_token_expiry),
            validation,
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Issue a token as if the current time were `now` (Unix seconds)
    pub fn issue_at(&self, kind: TokenKind, user_id: UserId, now: i64) -> Result<String, TokenError> {
        let keys = self.keys(kind);
        let claims = TokenClaims::new(user_id, &self.issuer, now, keys.ttl);

        encode(&Header::new(ALGORITHM), &claims, &keys.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Parse a token as if the current time were `now` (Unix seconds)
    pub fn parse_at(&self, token: &str, kind: TokenKind, now: i64) -> Result<TokenClaims, TokenError> {
        let claims = decode::<TokenClaims>(token, &self.keys(kind).decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(kind = %kind, error = %e, "Token rejected");
                TokenError::from(e)
            })?;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

impl TokenCodec for JwtCodec {
    fn issue(&self, kind: TokenKind, user_id: UserId) -> Result<String, TokenError> {
        self.issue_at(kind, user_id, chrono::Utc::now().timestamp())
    }

    fn parse(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, TokenError> {
        self.parse_at(token, kind, chrono::Utc::now().timestamp())
    }

    fn ttl(&self, kind: TokenKind) -> i64 {
        self.keys(kind).ttl
    }
}
