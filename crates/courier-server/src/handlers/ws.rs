//! `GET /v1/ws/{id}`: live channel upgrade.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use courier_core::ConnectionId;
use serde::Deserialize;
use tracing::debug;

use super::authorize;
use crate::server::AppState;
use crate::websocket::session::{SessionContext, run_ws_session};

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Credential for clients that cannot set an `Authorization` header.
    pub token: Option<String>,
}

/// Authenticate, then upgrade and hand the socket to the session loop.
///
/// Credential failures are answered before the upgrade so no hub is touched.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let claims = match authorize(&state, &headers, query.token.as_deref(), &id) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!(session_id = %id, "not a websocket upgrade");
            return rejection.into_response();
        }
    };

    let ctx = SessionContext {
        registry: state.registry.clone(),
        config: state.config.session.clone(),
        shutdown: state.shutdown.token(),
    };
    upgrade
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let conn_id = ConnectionId::new();
            let _ = run_ws_session(socket, conn_id, claims.session_id, claims.role, ctx).await;
        })
}
