//! REST fallback for clients that cannot hold a live connection.
//!
//! Posting an update does exactly what a live frame does: validate, cache,
//! broadcast to the opposite role. Reading returns the cached value or
//! `204 No Content`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use courier_core::{LocationMessage, LocationUpdate, UpdateKind};
use metrics::counter;
use tracing::debug;

use super::{authorize, bad_json};
use crate::errors::ApiError;
use crate::metrics::LOCATION_UPDATES_TOTAL;
use crate::server::AppState;

/// `POST /v1/deliveries/{id}/driver/location`
pub async fn post_driver_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<LocationUpdate>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    post_location(&state, &id, &headers, body, UpdateKind::DriverLoc)
}

/// `POST /v1/deliveries/{id}/customer/location`
pub async fn post_customer_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<LocationUpdate>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    post_location(&state, &id, &headers, body, UpdateKind::CustomerLoc)
}

/// `GET /v1/deliveries/{id}/driver/location`
pub async fn get_driver_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    get_location(&state, &id, &headers, UpdateKind::DriverLoc)
}

/// `GET /v1/deliveries/{id}/customer/location`
pub async fn get_customer_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    get_location(&state, &id, &headers, UpdateKind::CustomerLoc)
}

fn post_location(
    state: &AppState,
    id: &str,
    headers: &HeaderMap,
    body: Result<Json<LocationUpdate>, JsonRejection>,
    kind: UpdateKind,
) -> Result<StatusCode, ApiError> {
    let claims = authorize(state, headers, None, id)?;
    if claims.role != kind.owner() {
        return Err(ApiError::Forbidden("role mismatch"));
    }
    let Json(update) = body.map_err(bad_json)?;
    let location = update.into_location();
    if !location.validate() {
        return Err(ApiError::BadRequest("bad coords".into()));
    }

    let recipients = state.registry.publish(&claims.session_id, kind, location);
    counter!(LOCATION_UPDATES_TOTAL, "kind" => kind.as_str(), "source" => "rest").increment(1);
    debug!(session_id = %id, kind = kind.as_str(), recipients, "update relayed");
    Ok(StatusCode::NO_CONTENT)
}

fn get_location(
    state: &AppState,
    id: &str,
    headers: &HeaderMap,
    kind: UpdateKind,
) -> Result<Response, ApiError> {
    let _ = authorize(state, headers, None, id)?;
    Ok(match state.registry.location(id, kind) {
        Some(location) => Json(LocationMessage::new(kind, location)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}
