//! WebSocket gateway for live task updates

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;

use super::api::ApiError;
use super::app::AppState;
use crate::auth::AuthError;
use crate::hub::run_subscriber;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws/crawler/tasks?token=<jwt>`
///
/// The token is checked before the upgrade, so a rejected client gets a plain
/// 401 instead of a socket.
pub async fn task_updates(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = match query.token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => token,
        _ => return ApiError::from(AuthError::MissingToken).into_response(),
    };
    let claims = match state.jwt.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected WebSocket token");
            return ApiError::from(e).into_response();
        }
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let pump_config = state.pump_config;
    upgrade
        .max_message_size(pump_config.max_message_size)
        .on_upgrade(move |socket: WebSocket| async move {
            if state.hub.is_closed() {
                tracing::debug!(user_id = claims.user_id, "Server shutting down, closing new socket");
                return;
            }
            // Refused by the hub if close_all lands after the check above
            let subscription = state.hub.register();
            tracing::info!(
                subscriber = subscription.id,
                user_id = claims.user_id,
                "Dashboard subscriber connected"
            );

            let (sink, stream) = socket.split();
            run_subscriber(state.hub.clone(), subscription, sink, stream, pump_config).await;
        })
}
