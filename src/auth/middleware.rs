//! Axum middleware for the two authentication schemes

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::{bearer_token, token_fingerprint, AuthError};
use crate::server::{ApiError, AppState};

/// Authenticated crawler bearer token, available to handlers as an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerToken(pub String);

/// Admit requests carrying an active crawler token
pub async fn require_crawler_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?.to_string();

    match state.crawler_tokens.is_active_crawler_token(&token).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(token = %token_fingerprint(&token), "Rejected inactive crawler token");
            return Err(AuthError::InactiveToken.into());
        }
        Err(e) => {
            tracing::error!(error = %e, "Crawler token lookup failed");
            return Err(ApiError::internal("failed to verify crawler token"));
        }
    }

    request.extensions_mut().insert(CrawlerToken(token));
    Ok(next.run(request).await)
}

/// Admit requests carrying a valid admin JWT; claims are attached as an extension
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = state.jwt.verify(bearer_token(request.headers())?)?;

    tracing::debug!(user_id = claims.user_id, "Admin request authenticated");
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
