/// JWT Token Issuance and Verification
///
/// One codec per token class, each bound to its own secret and default
/// lifetime. Tokens are HS256-signed JWTs.

use std::marker::PhantomData;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims, SignedClaims};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Tampered, malformed, signed with another key, or from another issuer
    #[error("invalid token signature")]
    InvalidSignature,
    /// Signature is valid but the token is past its expiry
    #[error("token has expired")]
    Expired,
    #[error("token signing failed: {0}")]
    Signing(String),
}

pub struct TokenCodec<C> {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    lifetime: Duration,
    _claims: PhantomData<fn() -> C>,
}

pub type AccessTokenCodec = TokenCodec<AccessClaims>;
pub type RefreshTokenCodec = TokenCodec<RefreshClaims>;

impl<C> TokenCodec<C>
where
    C: Serialize + DeserializeOwned,
{
    pub fn new(secret: &str, lifetime: Duration, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
            lifetime,
            _claims: PhantomData,
        }
    }

    /// Default lifetime of tokens issued by this codec
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Sign `claims` with the codec's default lifetime
    pub fn issue(&self, claims: C) -> Result<String, TokenError> {
        self.issue_for(claims, self.lifetime)
    }

    /// Sign `claims`, stamping issued-at, expiry, issuer and a fresh token id
    pub fn issue_for(&self, claims: C, lifetime: Duration) -> Result<String, TokenError> {
        let issued_at = Utc::now();
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(|| TokenError::Signing("token lifetime out of range".to_string()))?;
        let signed = SignedClaims {
            claims,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &signed, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Check the signature, then the expiry, and return the decoded claims
    pub fn verify(&self, token: &str) -> Result<SignedClaims<C>, TokenError> {
        decode::<SignedClaims<C>>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    tracing::debug!(error = %e, "JWT verification failed");
                    TokenError::InvalidSignature
                }
            })
    }
}
