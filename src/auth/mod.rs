//! Authentication
//!
//! Two independent schemes:
//!
//! - dashboard/admin users carry a short-lived HS256 JWT ([`JwtManager`]),
//!   sent as `Authorization: Bearer` or, for the WebSocket, as `?token=`;
//! - crawler integrations carry a long-lived opaque bearer token that must
//!   be active in the `crawler_tokens` table.

pub mod jwt;
pub mod middleware;

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use jwt::{Claims, JwtManager};
pub use middleware::{require_admin, require_crawler_token, CrawlerToken};

/// Authentication failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed token")]
    Malformed,

    #[error("token expired")]
    Expired,

    #[error("token not valid yet")]
    NotValidYet,

    #[error("invalid token")]
    Invalid,

    /// Crawler token unknown or deactivated
    #[error("crawler token is not active")]
    InactiveToken,

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::Malformed)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::Malformed)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Malformed);
    }
    Ok(token)
}

/// Short, non-reversible token identifier safe to log
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{digest:x}").chars().take(12).collect()
}
