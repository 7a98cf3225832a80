/// JWT Claims structures
///
/// Access and refresh tokens carry different payloads; both are wrapped in
/// `SignedClaims`, which adds the registered claims (RFC 7519) stamped at
/// issuance.

use serde::{Deserialize, Serialize};

use crate::store::Role;

/// Payload of an access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject (user identity)
    pub sub: String,
    pub role: Role,
}

/// Payload of a refresh token. Carries no role: the role is re-read from the
/// store on every rotation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    /// Subject (user identity)
    pub sub: String,
}

/// Claims as they appear inside a signed token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SignedClaims<C> {
    #[serde(flatten)]
    pub claims: C,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Token id, unique per issuance
    pub jti: String,
}

/// The authenticated caller, attached to a request by the access gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub identity: String,
    pub role: Role,
}

impl From<AccessClaims> for Principal {
    fn from(claims: AccessClaims) -> Self {
        Self {
            identity: claims.sub,
            role: claims.role,
        }
    }
}
