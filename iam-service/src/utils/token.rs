//! Bearer credential parsing and hashing.

use sha2::{Digest, Sha256};
use thiserror::Error;

pub const BEARER_SCHEME: &str = "Bearer ";
pub const LEGACY_TOKEN_SCHEME: &str = "Token ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("authorization header is required")]
    Missing,
    #[error("invalid authorization header format")]
    InvalidFormat,
}

/// Extract the raw token from an `Authorization` header value.
///
/// Accepts `Bearer <token>`, plus `Token <token>` when `accept_legacy` is set.
/// The token is trimmed; an empty token is a format error.
pub fn extract_token(header: Option<&str>, accept_legacy: bool) -> Result<&str, TokenError> {
    let header = header.ok_or(TokenError::Missing)?;

    let token = header
        .strip_prefix(BEARER_SCHEME)
        .or_else(|| {
            if accept_legacy {
                header.strip_prefix(LEGACY_TOKEN_SCHEME)
            } else {
                None
            }
        })
        .ok_or(TokenError::InvalidFormat)?
        .trim();

    if token.is_empty() {
        return Err(TokenError::InvalidFormat);
    }

    Ok(token)
}

/// Hex-encoded SHA-256 of the raw token. Raw tokens are never stored or logged.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
