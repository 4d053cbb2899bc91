/// Authentication module
///
/// Password hashing, token signing and validation, the refresh-token
/// ledger, e-mail verification tokens, and the service that ties them
/// together.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;
mod verification_token;

pub use claims::{TokenClaims, TokenKind};
pub use jwt::{JwtCodec, TokenCodec, TokenError};
pub use password::{Argon2Hasher, CredentialHasher, PasswordError};
pub use refresh_token::{
    content_hash, LedgerError, RefreshTokenLedger, RefreshTokenRecord, RefreshTokenStatus,
};
pub use service::{AuthService, TokenPair};
pub use verification_token::{
    VerificationError, VerificationToken, VerificationTokenManager, VerificationTokenStore,
};
