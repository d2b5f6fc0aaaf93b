//! Voyage HTTP gateway
//!
//! Axum-based REST API in front of the trip store, the agent session relay
//! and the location enrichment subsystem.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, ApiResponse)`. The inner functions
//! are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET    /                                    service index
//! - GET    /health                              health check with storage status
//! - POST   /api/chat/send                       send a message, wait for the reply
//! - POST   /api/chat/stream                     send a message, stream the reply (SSE)
//! - DELETE /api/chat/session/:session_id        clear client session state
//! - GET    /api/trips/:user_id                  recent itineraries
//! - GET    /api/trips/:user_id/search           search itineraries
//! - GET    /api/trips/:user_id/parameters       recent trip parameters
//! - GET    /api/trips/:user_id/all              every record of a user
//! - GET    /api/trips/:user_id/:conversation_id  one trip
//! - DELETE /api/trips/:user_id/:conversation_id  delete a trip
//! - POST   /api/locations/enrich                geocode place names
//! - POST   /api/locations/enrich-batch          geocode names with context
//! - POST   /api/locations/enrich-itinerary      geocode every activity of an itinerary

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use voyage_core::geocode::GeocodingProvider;
use voyage_core::relay::StreamFrame;
use voyage_core::{store, AgentSessionRelay, ApiResponse, TripStore, VoyageConfig, VoyageError};

use crate::subsystems::enrich::{self, LocationQuery};

pub const SERVICE_NAME: &str = "travel-planner-api";

/// Shared state for all HTTP handlers
pub struct AppState {
    pub trips: TripStore,
    pub relay: AgentSessionRelay,
    pub geocoder: Arc<dyn GeocodingProvider>,
    pub config: VoyageConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.http.cors_origins);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/chat/send", post(chat_send_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/chat/session/:session_id", delete(clear_session_handler))
        .route("/api/trips/:user_id", get(list_trips_handler))
        .route("/api/trips/:user_id/search", get(search_trips_handler))
        .route("/api/trips/:user_id/parameters", get(list_parameters_handler))
        .route("/api/trips/:user_id/all", get(list_all_data_handler))
        .route(
            "/api/trips/:user_id/:conversation_id",
            get(get_trip_handler).delete(delete_trip_handler),
        )
        .route("/api/locations/enrich", post(enrich_locations_handler))
        .route("/api/locations/enrich-batch", post(enrich_batch_handler))
        .route("/api/locations/enrich-itinerary", post(enrich_itinerary_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS restricted to the configured origins. Unparseable origins are skipped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Voyage HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request parsing
// ============================================================================

type Reply = (StatusCode, ApiResponse);

/// Parsed body of the two chat endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub trace: bool,
}

fn bad_request(message: impl Into<String>) -> Reply {
    (StatusCode::BAD_REQUEST, ApiResponse::err(message, None))
}

/// Unwrap an extracted JSON body, turning a rejection into a 400 envelope.
fn json_body(body: std::result::Result<Json<Value>, JsonRejection>) -> std::result::Result<Value, Reply> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(bad_request(format!(
            "Invalid JSON body: {}",
            rejection.body_text()
        ))),
    }
}

pub fn parse_chat_request(body: &Value) -> std::result::Result<ChatRequest, Reply> {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| bad_request("Missing 'message' in request body"))?;

    Ok(ChatRequest {
        message: message.to_string(),
        session_id: body
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string),
        trace: body.get("trace").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// `limit` must parse as an integer; positivity is checked by the store.
pub fn parse_limit(raw: Option<&str>) -> std::result::Result<Option<i64>, VoyageError> {
    raw.map(|s| {
        s.trim().parse::<i64>().map_err(|_| {
            VoyageError::InvalidArgument(format!("limit must be a positive integer, got '{s}'"))
        })
    })
    .transpose()
}

/// Transport status for a core error.
pub fn status_for(err: &VoyageError) -> StatusCode {
    match err {
        VoyageError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        VoyageError::NotFound(_) | VoyageError::InvalidItinerary(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Failure envelope: client errors carry the error text, server faults are
/// prefixed with what was being attempted.
pub fn error_reply(context: &str, err: &VoyageError) -> Reply {
    let status = status_for(err);
    let message = if status.is_server_error() {
        tracing::error!(error = %err, kind = err.kind(), "{}", context);
        format!("{context}: {err}")
    } else {
        tracing::debug!(error = %err, kind = err.kind(), "{}", context);
        err.to_string()
    };
    (status, ApiResponse::from_error(message, err))
}

fn locations_array(body: &Value) -> std::result::Result<&Vec<Value>, Reply> {
    let Some(locations) = body.get("locations") else {
        return Err(bad_request("Missing 'locations' in request body"));
    };
    match locations.as_array() {
        Some(list) if !list.is_empty() => Ok(list),
        _ => Err(bad_request("'locations' must be a non-empty array")),
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner index: service name, version and endpoint map (pure, no IO).
pub fn index_inner() -> Value {
    json!({
        "service": "Travel Planner API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "chat": "/api/chat/send",
            "chat_stream": "/api/chat/stream",
            "trips": "/api/trips/<user_id>",
            "trip_detail": "/api/trips/<user_id>/<conversation_id>",
            "search": "/api/trips/<user_id>/search",
            "enrich": "/api/locations/enrich",
            "enrich_itinerary": "/api/locations/enrich-itinerary",
        }
    })
}

/// Inner health check: probes the storage backend.
pub async fn health_inner(trips: &TripStore) -> (StatusCode, Value) {
    match voyage_core::aws::storage_health(trips.provider()).await {
        Ok(storage) => (
            StatusCode::OK,
            json!({
                "status": "healthy",
                "service": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "storage": storage,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Storage health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "status": "unhealthy",
                    "service": SERVICE_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                    "error": e.to_string(),
                }),
            )
        }
    }
}

pub async fn chat_send_inner(relay: &AgentSessionRelay, body: &Value) -> Reply {
    let request = match parse_chat_request(body) {
        Ok(r) => r,
        Err(reply) => return reply,
    };

    match relay
        .invoke(&request.message, request.session_id, request.trace)
        .await
    {
        Ok(reply) => (
            StatusCode::OK,
            ApiResponse::ok(Some(json!(reply)), "Message sent successfully"),
        ),
        Err(e) => error_reply("Error processing message", &e),
    }
}

/// The agent provider owns conversation memory; this only acknowledges.
pub fn clear_session_inner(session_id: &str) -> Reply {
    tracing::debug!(session_id = %session_id, "Session cleared by client");
    (StatusCode::OK, ApiResponse::ok(None, "Session cleared"))
}

pub async fn list_trips_inner(trips: &TripStore, user_id: &str, limit: Option<&str>) -> Reply {
    let result = match parse_limit(limit) {
        Ok(limit) => trips.list_trips(user_id, limit).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(records) => (
            StatusCode::OK,
            ApiResponse::ok(
                Some(json!(records)),
                format!("Found {} trips", records.len()),
            ),
        ),
        Err(e) => error_reply("Error fetching trips", &e),
    }
}

pub async fn search_trips_inner(
    trips: &TripStore,
    user_id: &str,
    destination: Option<&str>,
    budget_tier: Option<&str>,
) -> Reply {
    match trips.search_trips(user_id, destination, budget_tier).await {
        Ok(records) => (
            StatusCode::OK,
            ApiResponse::ok(
                Some(json!(records)),
                format!("Found {} matching trips", records.len()),
            ),
        ),
        Err(e) => error_reply("Error searching trips", &e),
    }
}

pub async fn list_parameters_inner(trips: &TripStore, user_id: &str, limit: Option<&str>) -> Reply {
    let result = match parse_limit(limit) {
        Ok(limit) => trips.list_parameters(user_id, limit).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(records) => (
            StatusCode::OK,
            ApiResponse::ok(
                Some(json!(records)),
                format!("Found {} parameter records", records.len()),
            ),
        ),
        Err(e) => error_reply("Error fetching parameters", &e),
    }
}

pub async fn list_all_data_inner(trips: &TripStore, user_id: &str, limit: Option<&str>) -> Reply {
    let result = match parse_limit(limit) {
        Ok(limit) => trips.list_all_data(user_id, limit).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(records) => (
            StatusCode::OK,
            ApiResponse::ok(
                Some(json!(records)),
                format!("Found {} records", records.len()),
            ),
        ),
        Err(e) => error_reply("Error fetching data", &e),
    }
}

pub async fn get_trip_inner(trips: &TripStore, user_id: &str, conversation_id: &str) -> Reply {
    match trips.get_trip(user_id, conversation_id).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            ApiResponse::ok(Some(json!(record)), "Trip found"),
        ),
        Ok(None) => (StatusCode::NOT_FOUND, ApiResponse::err("Trip not found", None)),
        Err(e) => error_reply("Error fetching trip", &e),
    }
}

pub async fn delete_trip_inner(trips: &TripStore, user_id: &str, conversation_id: &str) -> Reply {
    match trips.delete_trip(user_id, conversation_id).await {
        Ok(()) => (
            StatusCode::OK,
            ApiResponse::ok(None, "Trip deleted successfully"),
        ),
        Err(e) => error_reply("Error deleting trip", &e),
    }
}

pub async fn enrich_locations_inner(geocoder: &dyn GeocodingProvider, body: &Value) -> Reply {
    let locations = match locations_array(body) {
        Ok(list) => list,
        Err(reply) => return reply,
    };
    let Some(names) = locations
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<String>>>()
    else {
        return bad_request("'locations' must contain only place names");
    };

    let report = enrich::enrich_locations(geocoder, &names).await;
    let message = format!(
        "Processed {} locations, {} failed",
        names.len(),
        report.failed_count
    );
    (StatusCode::OK, ApiResponse::ok(Some(json!(report)), message))
}

pub async fn enrich_batch_inner(geocoder: &dyn GeocodingProvider, body: &Value) -> Reply {
    let locations = match locations_array(body) {
        Ok(list) => list,
        Err(reply) => return reply,
    };
    let Some(queries) = locations
        .iter()
        .map(LocationQuery::from_value)
        .collect::<Option<Vec<LocationQuery>>>()
    else {
        return bad_request("Each location must be a name or an object with a 'name'");
    };

    let report = enrich::enrich_batch(geocoder, &queries).await;
    (
        StatusCode::OK,
        ApiResponse::ok(Some(json!(report)), "Batch enrichment completed"),
    )
}

pub async fn enrich_itinerary_inner(
    trips: &TripStore,
    geocoder: &dyn GeocodingProvider,
    body: &Value,
) -> Reply {
    let supplied = body.get("itinerary").filter(|v| !is_blank(v)).cloned();

    let days = match supplied {
        Some(itinerary) => store::parse_day_plans(itinerary),
        None => {
            let user_id = body.get("userId").and_then(Value::as_str).filter(|s| !s.is_empty());
            let conversation_id = body
                .get("conversationId")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty());
            let (Some(user_id), Some(conversation_id)) = (user_id, conversation_id) else {
                return bad_request("Missing 'itinerary' or ('userId' and 'conversationId')");
            };
            trips
                .resolve_full_itinerary(user_id, conversation_id, None)
                .await
        }
    };

    let days = match days {
        Ok(days) => days,
        Err(e) => return error_reply("Error enriching itinerary", &e),
    };

    let report = enrich::enrich_itinerary(geocoder, days).await;
    let message = format!(
        "Enriched {}/{} locations",
        report.summary.enriched, report.summary.total_locations
    );
    (StatusCode::OK, ApiResponse::ok(Some(json!(report)), message))
}

/// Null, empty arrays and empty objects count as "not supplied".
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

// ============================================================================
// Axum handlers (thin wrappers)
// ============================================================================

fn into_response((status, body): Reply) -> Response {
    (status, Json(body)).into_response()
}

pub async fn index_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(index_inner()))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.trips).await;
    (status, Json(body))
}

pub async fn chat_send_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    match json_body(body) {
        Ok(body) => into_response(chat_send_inner(&state.relay, &body).await),
        Err(reply) => into_response(reply),
    }
}

/// Server-Sent Events: one JSON frame per event.
pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let request = match json_body(body).and_then(|b| parse_chat_request(&b)) {
        Ok(r) => r,
        Err(reply) => return into_response(reply),
    };

    let events = state
        .relay
        .session_frames(request.message, request.session_id)
        .map(|frame| Ok::<_, Infallible>(sse_event(&frame)));

    let headers = [
        (CACHE_CONTROL, "no-cache"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];
    (headers, Sse::new(events)).into_response()
}

fn sse_event(frame: &StreamFrame) -> Event {
    Event::default().json_data(frame).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode stream frame");
        Event::default().data(r#"{"type":"error","message":"frame encoding failed"}"#)
    })
}

pub async fn clear_session_handler(Path(session_id): Path<String>) -> Response {
    into_response(clear_session_inner(&session_id))
}

pub async fn list_trips_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    into_response(list_trips_inner(&state.trips, &user_id, params.get("limit").map(String::as_str)).await)
}

pub async fn search_trips_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    into_response(
        search_trips_inner(
            &state.trips,
            &user_id,
            params.get("destination").map(String::as_str),
            params.get("budget_tier").map(String::as_str),
        )
        .await,
    )
}

pub async fn list_parameters_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    into_response(
        list_parameters_inner(&state.trips, &user_id, params.get("limit").map(String::as_str)).await,
    )
}

pub async fn list_all_data_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    into_response(
        list_all_data_inner(&state.trips, &user_id, params.get("limit").map(String::as_str)).await,
    )
}

pub async fn get_trip_handler(
    State(state): State<Arc<AppState>>,
    Path((user_id, conversation_id)): Path<(String, String)>,
) -> Response {
    into_response(get_trip_inner(&state.trips, &user_id, &conversation_id).await)
}

pub async fn delete_trip_handler(
    State(state): State<Arc<AppState>>,
    Path((user_id, conversation_id)): Path<(String, String)>,
) -> Response {
    into_response(delete_trip_inner(&state.trips, &user_id, &conversation_id).await)
}

pub async fn enrich_locations_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    match json_body(body) {
        Ok(body) => into_response(enrich_locations_inner(state.geocoder.as_ref(), &body).await),
        Err(reply) => into_response(reply),
    }
}

pub async fn enrich_batch_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    match json_body(body) {
        Ok(body) => into_response(enrich_batch_inner(state.geocoder.as_ref(), &body).await),
        Err(reply) => into_response(reply),
    }
}

pub async fn enrich_itinerary_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    match json_body(body) {
        Ok(body) => into_response(
            enrich_itinerary_inner(&state.trips, state.geocoder.as_ref(), &body).await,
        ),
        Err(reply) => into_response(reply),
    }
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
