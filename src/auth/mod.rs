/// Authentication module
///
/// Handles password hashing, JWT issuance/verification, and the login and
/// refresh-token rotation flows built on top of them.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::{AccessClaims, Principal, RefreshClaims, SignedClaims};
pub use jwt::{AccessTokenCodec, RefreshTokenCodec, TokenCodec, TokenError};
pub use password::{validate_password_strength, PasswordError, PasswordHasher};
pub use service::{AuthService, ExternalIdentity, TokenPair, UserUpdate};
