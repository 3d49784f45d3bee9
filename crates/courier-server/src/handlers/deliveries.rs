//! Delivery session creation, detail and status.

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use chrono::Utc;
use courier_core::{Delivery, DeliveryStatus, Location, Role, SessionId};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{authorize, bad_json};
use crate::errors::ApiError;
use crate::server::AppState;

/// Longest credential lifetime a caller may request (7 days).
pub const MAX_TTL_MINUTES: u64 = 7 * 24 * 60;

/// `POST /v1/deliveries` body.
#[derive(Debug, Deserialize)]
pub struct CreateDeliveryRequest {
    /// Caller's order reference. Required.
    #[serde(default)]
    pub order_id: String,
    /// Customer latitude.
    pub customer_lat: f64,
    /// Customer longitude.
    pub customer_lng: f64,
    /// Free-form address.
    #[serde(default)]
    pub customer_address: Option<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Credential lifetime; zero or absent uses the server default. At most
    /// [`MAX_TTL_MINUTES`].
    #[serde(default)]
    pub ttl_minutes: Option<u64>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `POST /v1/deliveries` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDeliveryResponse {
    /// New session ID.
    pub delivery_id: SessionId,
    /// Credential for the driver.
    pub driver_token: String,
    /// Credential for the customer.
    pub customer_token: String,
    /// Live channel URL for this session.
    pub ws_url: String,
}

/// `POST /v1/deliveries/{id}/status` body.
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    /// Target status.
    pub status: DeliveryStatus,
}

/// `POST /v1/deliveries`: create a session, its hub and both credentials.
pub async fn create_delivery(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateDeliveryRequest>, JsonRejection>,
) -> Result<Json<CreateDeliveryResponse>, ApiError> {
    let Json(req) = body.map_err(bad_json)?;
    let order_id = req.order_id.trim();
    if order_id.is_empty() {
        return Err(ApiError::BadRequest("order_id required".into()));
    }
    let customer = Location::new(req.customer_lat, req.customer_lng, Utc::now());
    if !customer.validate() {
        return Err(ApiError::BadRequest("bad coords".into()));
    }

    let ttl = match req.ttl_minutes {
        Some(minutes) if minutes > MAX_TTL_MINUTES => {
            return Err(ApiError::BadRequest(format!(
                "ttl_minutes must be at most {MAX_TTL_MINUTES}"
            )));
        }
        Some(minutes) if minutes > 0 => Duration::from_secs(minutes * 60),
        _ => state.config.default_ttl,
    };

    let id = SessionId::new();
    let issue = |role| {
        state
            .auth
            .issue(&id, role, ttl)
            .map_err(|e| ApiError::Internal(e.to_string()))
    };
    let driver_token = issue(Role::Driver)?;
    let customer_token = issue(Role::Customer)?;

    state.registry.get_or_create(&id).set_customer_location(customer);

    let mut record = Delivery::new(id.clone(), order_id, customer);
    record.customer_address = req.customer_address;
    record.notes = req.notes;
    record.tags = req.tags;
    state.store.create(record);

    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let ws_url = format!("{}/v1/ws/{id}", state.config.ws_base(host));
    info!(session_id = %id, order_id, ttl_secs = ttl.as_secs(), "delivery created");

    Ok(Json(CreateDeliveryResponse {
        delivery_id: id,
        driver_token,
        customer_token,
        ws_url,
    }))
}

/// `GET /v1/deliveries/{id}`: the stored record, for either party.
pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Delivery>, ApiError> {
    let _ = authorize(&state, &headers, None, &id)?;
    state.store.get(&id).map(Json).ok_or(ApiError::NotFound)
}

/// `POST /v1/deliveries/{id}/status`: driver advances the delivery.
///
/// Only forward transitions are accepted. Reaching `delivered` marks the
/// session's hub completed so the reaper can drop it once everyone leaves.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<Delivery>, ApiError> {
    let claims = authorize(&state, &headers, None, &id)?;
    if claims.role != Role::Driver {
        return Err(ApiError::Forbidden("driver only"));
    }
    let Json(req) = body.map_err(bad_json)?;

    let record = state.store.transition(&id, req.status)?;

    if record.status.is_terminal() {
        if let Some(hub) = state.registry.get(&id) {
            hub.mark_completed();
        }
    }
    info!(session_id = %id, status = ?record.status, "delivery status updated");
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use courier_core::UpdateKind;
    use tower::ServiceExt;

    use crate::server::tests::{body_json, test_server, token_for};

    fn create_request(body: &str) -> Request<Body> {
        Request::post("/v1/deliveries")
            .header(header::HOST, "track.local:8081")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn create(server: &crate::server::CourierServer) -> CreateDeliveryResponse {
        let resp = server
            .router()
            .oneshot(create_request(
                r#"{"order_id":"ORD-1","customer_lat":37.0,"customer_lng":-122.0}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        serde_json::from_value(body_json(resp).await).unwrap()
    }

    fn authed(method: &str, uri: &str, token: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn create_returns_session_and_credentials() {
        let server = test_server();
        let created = create(&server).await;

        assert_eq!(created.delivery_id.len(), 24);
        assert!(created.delivery_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(created.driver_token, created.customer_token);
        assert_eq!(
            created.ws_url,
            format!("ws://track.local:8081/v1/ws/{}", created.delivery_id)
        );

        let hub = server.registry().get(&created.delivery_id).unwrap();
        assert_eq!(hub.customer_location().map(|l| l.lat()), Some(37.0));
        assert_eq!(hub.location(UpdateKind::DriverLoc), None);
    }

    #[tokio::test]
    async fn create_rejects_missing_order_id() {
        let server = test_server();
        for body in [
            r#"{"customer_lat":37.0,"customer_lng":-122.0}"#,
            r#"{"order_id":"  ","customer_lat":37.0,"customer_lng":-122.0}"#,
        ] {
            let resp = server.router().oneshot(create_request(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        }
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_bad_coordinates_and_json() {
        let server = test_server();
        for body in [
            r#"{"order_id":"ORD-1","customer_lat":200.0,"customer_lng":0.0}"#,
            r#"{"order_id":"ORD-1"}"#,
            "{not json",
        ] {
            let resp = server.router().oneshot(create_request(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        }
    }

    #[tokio::test]
    async fn create_rejects_ttl_beyond_maximum() {
        let server = test_server();
        for ttl in [MAX_TTL_MINUTES + 1, 1_000_000_000_000] {
            let body = format!(
                r#"{{"order_id":"ORD-1","customer_lat":37.0,"customer_lng":-122.0,"ttl_minutes":{ttl}}}"#
            );
            let resp = server.router().oneshot(create_request(&body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{ttl}");
        }
        assert!(server.registry().is_empty());

        let body = format!(
            r#"{{"order_id":"ORD-1","customer_lat":37.0,"customer_lng":-122.0,"ttl_minutes":{MAX_TTL_MINUTES}}}"#
        );
        let resp = server.router().oneshot(create_request(&body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_delivery_for_either_role() {
        let server = test_server();
        let created = create(&server).await;
        let uri = format!("/v1/deliveries/{}", created.delivery_id);

        for token in [&created.driver_token, &created.customer_token] {
            let resp = server.router().oneshot(authed("GET", &uri, token, None)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let json = body_json(resp).await;
            assert_eq!(json["order_id"], "ORD-1");
            assert_eq!(json["status"], "created");
        }
    }

    #[tokio::test]
    async fn get_delivery_requires_matching_credential() {
        let server = test_server();
        let a = create(&server).await;
        let b = create(&server).await;
        let uri = format!("/v1/deliveries/{}", a.delivery_id);

        let resp = server.router().oneshot(authed("GET", &uri, &b.driver_token, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = server
            .router()
            .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn get_unknown_delivery_is_not_found() {
        let server = test_server();
        let id = SessionId::from("feedfacefeedfacefeedface");
        let token = token_for(&server, &id, Role::Customer);
        let resp = server
            .router()
            .oneshot(authed("GET", "/v1/deliveries/feedfacefeedfacefeedface", &token, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn driver_advances_status_forward_only() {
        let server = test_server();
        let created = create(&server).await;
        let uri = format!("/v1/deliveries/{}/status", created.delivery_id);
        let send = |status: &str| {
            authed(
                "POST",
                &uri,
                &created.driver_token,
                Some(&format!(r#"{{"status":"{status}"}}"#)),
            )
        };

        let resp = server.router().oneshot(send("picked_up")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "picked_up");

        let resp = server.router().oneshot(send("picked_up")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = server.router().oneshot(send("delivered")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(server.registry().get(&created.delivery_id).unwrap().is_completed());

        let resp = server.router().oneshot(send("created")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_status_updates_apply_once() {
        let server = test_server();
        let created = create(&server).await;
        let uri = format!("/v1/deliveries/{}/status", created.delivery_id);
        let send = |status: &str| {
            authed(
                "POST",
                &uri,
                &created.driver_token,
                Some(&format!(r#"{{"status":"{status}"}}"#)),
            )
        };
        let resp = server.router().oneshot(send("picked_up")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let first = tokio::spawn(server.router().oneshot(send("delivered")));
        let second = tokio::spawn(server.router().oneshot(send("delivered")));
        let mut codes = vec![
            first.await.unwrap().unwrap().status(),
            second.await.unwrap().unwrap().status(),
        ];
        codes.sort();
        assert_eq!(codes, vec![StatusCode::OK, StatusCode::CONFLICT]);
    }

    #[tokio::test]
    async fn customer_cannot_change_status() {
        let server = test_server();
        let created = create(&server).await;
        let uri = format!("/v1/deliveries/{}/status", created.delivery_id);
        let resp = server
            .router()
            .oneshot(authed(
                "POST",
                &uri,
                &created.customer_token,
                Some(r#"{"status":"delivered"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
