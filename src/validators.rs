/// Input validators for identities submitted at registration and external login.
///
/// Identities are otherwise opaque to the service.

use regex::Regex;
use lazy_static::lazy_static;

use crate::error::ValidationError;

const MAX_IDENTITY_LENGTH: usize = 254; // fits an RFC 5321 address

lazy_static! {
    static ref IDENTITY_REGEX: Regex = Regex::new(r"^[A-Za-z0-9._@+-]+$").unwrap();
}

/// Validates an identity and returns it trimmed.
pub fn is_valid_identity(identity: &str) -> Result<String, ValidationError> {
    let trimmed = identity.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("identity"));
    }

    if trimmed.len() > MAX_IDENTITY_LENGTH {
        return Err(ValidationError::TooLong("identity", MAX_IDENTITY_LENGTH));
    }

    if !IDENTITY_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat(
            "identity may only contain letters, digits and . _ @ + -".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}
