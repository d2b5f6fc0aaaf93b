//! HTTP integration tests for the Voyage gateway
//!
//! The router is driven with `oneshot` against in-memory trip storage, a
//! scripted agent and a wiremock-backed geocoder, so no AWS or network
//! access is needed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tower::ServiceExt;
use voyage_core::config::MapsConfig;
use voyage_core::models::{DataType, NewTrip, TripKey};
use voyage_core::relay::{AgentEvent, AgentEventStream, AgentInvocation, AgentProvider};
use voyage_core::{
    AgentSessionRelay, GoogleMapsGeocoder, MemoryStorage, Result, TripStore, VoyageConfig,
    VoyageError,
};
use voyage_server::http::{build_router, AppState};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Replies with a fixed sequence of text chunks, optionally failing at the end.
struct ScriptedAgent {
    chunks: Vec<&'static str>,
    fail_after: bool,
}

#[async_trait]
impl AgentProvider for ScriptedAgent {
    async fn invoke_agent(&self, invocation: AgentInvocation) -> Result<AgentEventStream> {
        let mut events: Vec<Result<AgentEvent>> = self
            .chunks
            .iter()
            .map(|c| Ok(AgentEvent::Chunk(Bytes::from_static(c.as_bytes()))))
            .collect();
        if invocation.enable_trace {
            events.insert(0, Ok(AgentEvent::Trace(json!({"orchestration": "plan"}))));
        }
        if self.fail_after {
            events.push(Err(VoyageError::AgentInvocation("model timeout".into())));
        }
        Ok(stream::iter(events).boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct TestApp {
    router: Router,
    trips: TripStore,
    _maps: MockServer,
}

async fn maps_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/maps/api/geocode/json"))
        .and(query_param("address", "Senso-ji, Asakusa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [{
                "formatted_address": "2 Chome-3-1 Asakusa, Taito City, Tokyo",
                "place_id": "sensoji",
                "geometry": { "location": { "lat": 35.7148, "lng": 139.7967 } }
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/maps/api/geocode/json"))
        .and(query_param("address", "Tokyo Tower"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [{
                "formatted_address": "4 Chome-2-8 Shibakoen, Minato City, Tokyo",
                "geometry": { "location": { "lat": 35.6586, "lng": 139.7454 } }
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/maps/api/geocode/json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "ZERO_RESULTS", "results": []})),
        )
        .mount(&server)
        .await;

    server
}

async fn make_app_with_agent(agent: ScriptedAgent) -> TestApp {
    let maps = maps_server().await;
    let maps_config = MapsConfig {
        api_key: "test-key".to_string(),
        retry_delay_ms: 10,
        ..MapsConfig::default()
    };
    let geocoder = GoogleMapsGeocoder::with_base_url(&maps_config, maps.uri())
        .expect("Failed to create geocoder");

    let trips = TripStore::new(Arc::new(MemoryStorage::new()));
    let state = Arc::new(AppState {
        trips: trips.clone(),
        relay: AgentSessionRelay::new(Arc::new(agent)),
        geocoder: Arc::new(geocoder),
        config: VoyageConfig::default(),
    });

    TestApp {
        router: build_router(state),
        trips,
        _maps: maps,
    }
}

async fn make_app() -> TestApp {
    make_app_with_agent(ScriptedAgent {
        chunks: vec!["Day 1: ", "Senso-ji"],
        fail_after: false,
    })
    .await
}

async fn seed(trips: &TripStore) {
    trips
        .save_trip(
            NewTrip::new(TripKey::new("u1", "conv-params"), DataType::Parameters)
                .with_trip_data(json!({"destination": "Tokyo", "days": 2})),
        )
        .await
        .unwrap();
    trips
        .save_trip(
            NewTrip::new(TripKey::new("u1", "conv-kyoto"), DataType::Itinerary)
                .with_attribute("destination", "Kyoto")
                .with_attribute("budget_tier", "mid")
                .with_itinerary(json!([{"day": 1, "activities": [{"name": "Fushimi Inari"}]}])),
        )
        .await
        .unwrap();
    trips
        .save_trip(
            NewTrip::new(TripKey::new("u1", "conv-tokyo"), DataType::Itinerary)
                .with_attribute("destination", "Tokyo, Japan")
                .with_attribute("budget_tier", "luxury")
                .with_itinerary(json!([
                    {"day": 1, "date": "2024-06-15", "theme": "Old Tokyo", "activities": [
                        {"name": "Senso-ji", "address": "Asakusa", "time": "09:00"},
                        {"name": "Tokyo Tower"}
                    ]},
                    {"day": 2, "activities": [{"name": "Secret Garden"}]}
                ])),
        )
        .await
        .unwrap();
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn conversation_ids(data: &Value) -> Vec<&str> {
    data.as_array()
        .unwrap()
        .iter()
        .map(|t| t["conversationId"].as_str().unwrap())
        .collect()
}

// ===========================================================================
// TEST 1: GET /health and GET / respond with service info
// ===========================================================================
#[tokio::test]
async fn test_health_and_index() {
    let app = make_app().await;
    seed(&app.trips).await;

    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "travel-planner-api");
    assert_eq!(body["storage"], "memory: in-memory (3 items)");

    let (status, body) = send(&app.router, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["chat_stream"], "/api/chat/stream");
}

// ===========================================================================
// TEST 2: POST /api/chat/send returns the full reply and session id
// ===========================================================================
#[tokio::test]
async fn test_chat_send() {
    let app = make_app().await;

    let (status, body) = send(
        &app.router,
        post_json("/api/chat/send", json!({"message": "Plan Tokyo", "sessionId": "s-1"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Message sent successfully");
    assert_eq!(body["data"]["response"], "Day 1: Senso-ji");
    assert_eq!(body["data"]["sessionId"], "s-1");
    assert!(body["data"].get("trace").is_none());
}

#[tokio::test]
async fn test_chat_send_with_trace_and_generated_session() {
    let app = make_app().await;

    let (status, body) = send(
        &app.router,
        post_json("/api/chat/send", json!({"message": "Plan Tokyo", "trace": true})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sessionId"].as_str().unwrap().len(), 36);
    assert_eq!(body["data"]["trace"], json!([{"orchestration": "plan"}]));
}

// ===========================================================================
// TEST 3: chat input validation
// ===========================================================================
#[tokio::test]
async fn test_chat_send_requires_message() {
    let app = make_app().await;

    let (status, body) = send(&app.router, post_json("/api/chat/send", json!({"sessionId": "s"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Missing 'message' in request body");

    let req = Request::builder()
        .method("POST")
        .uri("/api/chat/send")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_chat_send_agent_fault_is_500_envelope() {
    let app = make_app_with_agent(ScriptedAgent {
        chunks: vec!["partial"],
        fail_after: true,
    })
    .await;

    let (status, body) = send(&app.router, post_json("/api/chat/send", json!({"message": "hi"}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["kind"], "agent_invocation_error");
    assert!(body.get("data").is_none());
}

// ===========================================================================
// TEST 4: POST /api/chat/stream emits session, content, done frames
// ===========================================================================

fn sse_frames(raw: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(raw)
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

#[tokio::test]
async fn test_chat_stream_frames() {
    let app = make_app().await;

    let resp = app
        .router
        .clone()
        .oneshot(post_json("/api/chat/stream", json!({"message": "Plan Tokyo", "sessionId": "s-7"})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(resp.headers()["cache-control"], "no-cache");
    assert_eq!(resp.headers()["x-accel-buffering"], "no");

    let raw = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(
        sse_frames(&raw),
        vec![
            json!({"type": "session", "sessionId": "s-7"}),
            json!({"type": "content", "text": "Day 1: "}),
            json!({"type": "content", "text": "Senso-ji"}),
            json!({"type": "done"}),
        ]
    );
}

#[tokio::test]
async fn test_chat_stream_fault_ends_with_error_frame() {
    let app = make_app_with_agent(ScriptedAgent {
        chunks: vec!["partial"],
        fail_after: true,
    })
    .await;

    let resp = app
        .router
        .clone()
        .oneshot(post_json("/api/chat/stream", json!({"message": "hi"})))
        .await
        .unwrap();
    let raw = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let frames = sse_frames(&raw);

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0]["type"], "session");
    assert_eq!(frames[1], json!({"type": "content", "text": "partial"}));
    assert_eq!(frames[2]["type"], "error");
    assert!(frames[2]["message"].as_str().unwrap().contains("model timeout"));
}

#[tokio::test]
async fn test_chat_stream_missing_message_is_plain_400() {
    let app = make_app().await;
    let (status, body) = send(&app.router, post_json("/api/chat/stream", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing 'message' in request body");
}

#[tokio::test]
async fn test_clear_session() {
    let app = make_app().await;
    let (status, body) = send(&app.router, delete("/api/chat/session/s-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "message": "Session cleared"}));
}

// ===========================================================================
// TEST 5: trip listing, search, parameters and all-data endpoints
// ===========================================================================
#[tokio::test]
async fn test_list_trips_newest_first() {
    let app = make_app().await;
    seed(&app.trips).await;

    let (status, body) = send(&app.router, get("/api/trips/u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Found 2 trips");
    assert_eq!(conversation_ids(&body["data"]), vec!["conv-tokyo", "conv-kyoto"]);
    assert!(body["data"][0]["itinerary"].is_array());
    assert!(body["data"][0].get("fullItinerary").is_none());

    let (status, body) = send(&app.router, get("/api/trips/u1?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conversation_ids(&body["data"]), vec!["conv-tokyo"]);
}

#[tokio::test]
async fn test_list_trips_rejects_bad_limit() {
    let app = make_app().await;
    for uri in ["/api/trips/u1?limit=0", "/api/trips/u1?limit=-2", "/api/trips/u1?limit=lots"] {
        let (status, body) = send(&app.router, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["kind"], "invalid_argument");
    }
}

#[tokio::test]
async fn test_search_trips() {
    let app = make_app().await;
    seed(&app.trips).await;

    let (status, body) = send(&app.router, get("/api/trips/u1/search?destination=Tokyo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Found 1 matching trips");
    assert_eq!(conversation_ids(&body["data"]), vec!["conv-tokyo"]);

    let (_, body) = send(&app.router, get("/api/trips/u1/search?budget_tier=mid")).await;
    assert_eq!(conversation_ids(&body["data"]), vec!["conv-kyoto"]);

    let (_, body) = send(&app.router, get("/api/trips/u1/search?destination=&budget_tier=")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_parameters_and_all_data() {
    let app = make_app().await;
    seed(&app.trips).await;

    let (status, body) = send(&app.router, get("/api/trips/u1/parameters")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Found 1 parameter records");
    assert_eq!(body["data"][0]["tripData"]["days"], 2);

    let (status, body) = send(&app.router, get("/api/trips/u1/all?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Found 2 records");
    assert_eq!(conversation_ids(&body["data"]), vec!["conv-tokyo", "conv-kyoto"]);
}

// ===========================================================================
// TEST 6: single trip get and delete
// ===========================================================================
#[tokio::test]
async fn test_get_then_delete_trip() {
    let app = make_app().await;
    seed(&app.trips).await;

    let (status, body) = send(&app.router, get("/api/trips/u1/conv-tokyo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Trip found");
    assert_eq!(body["data"]["itinerary"][0]["theme"], "Old Tokyo");

    let (status, body) = send(&app.router, delete("/api/trips/u1/conv-tokyo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Trip deleted successfully");

    let (status, body) = send(&app.router, get("/api/trips/u1/conv-tokyo")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Trip not found");

    let (status, _) = send(&app.router, delete("/api/trips/u1/conv-tokyo")).await;
    assert_eq!(status, StatusCode::OK);
}

// ===========================================================================
// TEST 7: location enrichment endpoints
// ===========================================================================
#[tokio::test]
async fn test_enrich_locations() {
    let app = make_app().await;

    let (status, body) = send(
        &app.router,
        post_json("/api/locations/enrich", json!({"locations": ["Tokyo Tower", "Atlantis"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Processed 2 locations, 1 failed");
    assert_eq!(body["data"]["locations"]["Tokyo Tower"]["lat"], 35.6586);
    assert_eq!(body["data"]["locations"]["Atlantis"], Value::Null);
    assert_eq!(body["data"]["failed_count"], 1);
    assert_eq!(body["data"]["failed_locations"], json!(["Atlantis"]));
}

#[tokio::test]
async fn test_enrich_locations_validation() {
    let app = make_app().await;

    let (status, body) = send(&app.router, post_json("/api/locations/enrich", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing 'locations' in request body");

    let (status, body) =
        send(&app.router, post_json("/api/locations/enrich", json!({"locations": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "'locations' must be a non-empty array");
}

#[tokio::test]
async fn test_enrich_batch_uses_context() {
    let app = make_app().await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/locations/enrich-batch",
            json!({"locations": [{"name": "Senso-ji", "context": "Asakusa"}, "Tokyo Tower"]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Batch enrichment completed");
    assert_eq!(body["data"]["locations"]["Senso-ji"]["place_id"], "sensoji");
    assert_eq!(body["data"]["failed_count"], 0);
    assert!(body["data"].get("failed_locations").is_none());
}

#[tokio::test]
async fn test_enrich_itinerary_from_stored_trip() {
    let app = make_app().await;
    seed(&app.trips).await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/locations/enrich-itinerary",
            json!({"userId": "u1", "conversationId": "conv-tokyo"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Enriched 2/3 locations");
    assert_eq!(
        body["data"]["summary"],
        json!({"total_locations": 3, "enriched": 2, "failed": 1})
    );
    assert_eq!(body["data"]["failed_locations"], json!(["Secret Garden"]));
    let first = &body["data"]["itinerary_with_coords"][0];
    assert_eq!(first["activities"][0]["time"], "09:00");
    assert_eq!(first["activities"][0]["coordinates"]["lat"], 35.7148);
}

#[tokio::test]
async fn test_enrich_itinerary_parameters_record_uses_latest_itinerary() {
    let app = make_app().await;
    seed(&app.trips).await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/locations/enrich-itinerary",
            json!({"userId": "u1", "conversationId": "conv-params"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["itinerary_with_coords"][0]["theme"], "Old Tokyo");
}

#[tokio::test]
async fn test_enrich_itinerary_supplied_inline() {
    let app = make_app().await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/locations/enrich-itinerary",
            json!({"itinerary": [{"day": 1, "activities": [{"name": "Tokyo Tower"}]}]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Enriched 1/1 locations");
}

#[tokio::test]
async fn test_enrich_itinerary_errors() {
    let app = make_app().await;
    app.trips
        .save_trip(NewTrip::new(TripKey::new("u2", "only-params"), DataType::Parameters))
        .await
        .unwrap();

    let (status, body) =
        send(&app.router, post_json("/api/locations/enrich-itinerary", json!({"userId": "u2"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Missing 'itinerary' or ('userId' and 'conversationId')"
    );

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/locations/enrich-itinerary",
            json!({"userId": "u2", "conversationId": "only-params"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "not_found");

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/locations/enrich-itinerary",
            json!({"userId": "u2", "conversationId": "missing"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// TEST 8: CORS only answers configured origins
// ===========================================================================
#[tokio::test]
async fn test_cors_preflight() {
    let app = make_app().await;

    let preflight = |origin: &str| {
        Request::builder()
            .method("OPTIONS")
            .uri("/api/chat/send")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap()
    };

    let resp = app.router.clone().oneshot(preflight("http://localhost:3000")).await.unwrap();
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );

    let resp = app.router.clone().oneshot(preflight("http://evil.example")).await.unwrap();
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}
