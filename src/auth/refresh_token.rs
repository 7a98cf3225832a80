/// Refresh Token Rotation
///
/// A refresh token is accepted only if:
/// 1. Its signature verifies against the refresh secret
/// 2. It has not expired
/// 3. It is byte-equal to the token currently stored for its subject
///
/// Every successful refresh replaces the stored token in a single
/// compare-and-swap, so a superseded token can never be used again and two
/// concurrent refreshes with the same token cannot both succeed.

use crate::auth::service::{collapse, AuthService, TokenPair};
use crate::error::AuthError;

impl AuthService {
    /// Exchange a refresh token for a fresh pair
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AuthError> {
        let signed = self.refresh_tokens.verify(presented).map_err(|e| {
            tracing::warn!(reason = %e, "Refresh token rejected");
            AuthError::Unauthorized
        })?;
        let identity = signed.claims.sub;

        let record = self
            .within_deadline(self.store.find_by_identity(&identity))
            .await
            .map_err(collapse)?;

        if record.refresh_token.as_deref() != Some(presented) {
            tracing::warn!(identity = %identity, "Refresh token reuse detected");
            return Err(AuthError::Unauthorized);
        }

        let pair = self.issue_pair(&record.identity, record.role)?;

        let rotated = self
            .within_deadline(
                self.store
                    .swap_refresh_token(&identity, presented, &pair.refresh_token),
            )
            .await
            .map_err(collapse)?;

        if !rotated {
            tracing::warn!(identity = %identity, "Refresh token rotated concurrently");
            return Err(AuthError::Unauthorized);
        }

        tracing::info!(identity = %identity, "Refresh token rotated");
        Ok(pair)
    }

    /// Forget the stored refresh token; outstanding access tokens expire on
    /// their own
    pub async fn logout(&self, identity: &str) -> Result<(), AuthError> {
        self.within_deadline(self.store.set_refresh_token(identity, None))
            .await
            .map_err(collapse)?;

        tracing::info!(identity = %identity, "User logged out");
        Ok(())
    }
}
