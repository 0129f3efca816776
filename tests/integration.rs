mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use ride_orchestrator::api::rest::router;
use ride_orchestrator::config::Config;
use ride_orchestrator::models::ride::Actor;
use ride_orchestrator::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use support::{FakeGeo, patan};

fn setup() -> (Router, Arc<AppState>) {
    let geo = FakeGeo::new().with_place("Patan Durbar Square", patan());
    let state = Arc::new(AppState::new(&Config::default(), Arc::new(geo)).unwrap());
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    empty_request("GET", uri)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn register_driver(app: &Router, name: &str, vehicle_class: &str, lat: f64, lng: f64) -> Value {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/drivers",
            json!({
                "display_name": name,
                "phone": "9800000000",
                "vehicle_class": vehicle_class,
                "location": { "lat": lat, "lng": lng }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

fn ride_draft(rider_id: &str) -> Value {
    json!({
        "rider_id": rider_id,
        "pickup": { "lat": 27.7172, "lng": 85.3240 },
        "destination_text": "Patan Durbar Square",
        "destination": { "lat": 27.7000, "lng": 85.3000 },
        "route": {
            "polyline": [
                { "lat": 27.7172, "lng": 85.3240 },
                { "lat": 27.7000, "lng": 85.3000 }
            ],
            "distance_meters": 2000.0
        },
        "fare": { "amount": "60.00", "vehicle_class": "Bike", "distance_km": 2.0 },
        "vehicle_class": "Bike"
    })
}

/// Posts a ride, searches drivers and lets `driver_id` accept it.
async fn accepted_ride(app: &Router, rider_id: &str, driver_id: &str) -> String {
    let (_, posted) = send(app, json_request("POST", "/rides", ride_draft(rider_id))).await;
    let ride_id = posted["id"].as_str().unwrap().to_string();

    let (status, _) = send(app, empty_request("POST", &format!("/rides/{ride_id}/candidates"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app,
        json_request(
            "PUT",
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "Accepted", "driver_id": driver_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "accepted");
    ride_id
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["rides"], 0);
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("rides_posted_total"));
}

#[tokio::test]
async fn register_driver_returns_available_driver() {
    let (app, _state) = setup();
    let body = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;

    assert_eq!(body["display_name"], "Hari");
    assert_eq!(body["vehicle_class"], "Bike");
    assert_eq!(body["status"], "Available");
    assert!(!body["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn register_driver_blank_name_returns_400() {
    let (app, _state) = setup();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/drivers",
            json!({
                "display_name": "  ",
                "phone": "9800000000",
                "vehicle_class": "Bike",
                "location": { "lat": 27.7, "lng": 85.3 }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidInput");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn register_driver_out_of_range_location_is_rejected() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "display_name": "Hari",
                "phone": "9800000000",
                "vehicle_class": "Bike",
                "location": { "lat": 95.0, "lng": 85.3 }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn nearby_drivers_sorted_by_distance_and_filtered_by_class() {
    let (app, _state) = setup();
    let far = register_driver(&app, "Far", "Bike", 27.7300, 85.3300).await;
    let near = register_driver(&app, "Near", "Bike", 27.7175, 85.3242).await;
    register_driver(&app, "Car", "Car", 27.7173, 85.3241).await;
    register_driver(&app, "Pokhara", "Bike", 28.2096, 83.9856).await;

    let (status, body) = send(
        &app,
        get_request("/drivers/nearby?lat=27.7172&lng=85.3240&radius=5000&vehicle_class=Bike"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|driver| driver["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![near["id"].as_str().unwrap(), far["id"].as_str().unwrap()]);
}

#[tokio::test]
async fn nearby_drivers_unknown_class_returns_400() {
    let (app, _state) = setup();
    let (status, body) = send(
        &app,
        get_request("/drivers/nearby?lat=27.7172&lng=85.3240&vehicle_class=Rickshaw"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "UnknownVehicleClass");
}

#[tokio::test]
async fn offline_driver_is_not_offered() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Hari", "Bike", 27.7175, 85.3242).await;
    let id = driver["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        json_request("PATCH", &format!("/drivers/{id}/availability"), json!({ "online": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Offline");

    let (_, nearby) = send(&app, get_request("/drivers/nearby?lat=27.7172&lng=85.3240")).await;
    assert!(nearby.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn post_ride_and_duplicate_for_same_rider() {
    let (app, _state) = setup();

    let (status, body) = send(&app, json_request("POST", "/rides", ride_draft("rider-1"))).await;
    assert_eq!(status, StatusCode::OK);
    let ride_id = body["id"].as_str().unwrap().to_string();

    let (status, ride) = send(&app, get_request(&format!("/rides/{ride_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ride["state"]["state"], "Dispatching");
    assert_eq!(ride["fare"]["amount"], "60.00");

    let (status, body) = send(&app, json_request("POST", "/rides", ride_draft("rider-1"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "DuplicateActiveRide");

    let (_, rides) = send(&app, get_request("/rides?rider_id=rider-1")).await;
    assert_eq!(rides.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn post_ride_with_route_but_no_fare_returns_400() {
    let (app, _state) = setup();
    let mut draft = ride_draft("rider-1");
    draft["fare"] = Value::Null;

    let (status, _) = send(&app, json_request("POST", "/rides", draft)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_unknown_ride_returns_404() {
    let (app, _state) = setup();
    let (status, body) = send(
        &app,
        get_request("/rides/00000000-0000-0000-0000-000000000000"),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn ride_lifecycle_through_status_updates() {
    let (app, state) = setup();
    let driver = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;
    let driver_id = driver["id"].as_str().unwrap();
    let ride_id = accepted_ride(&app, "rider-1", driver_id).await;

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "EnRoute", "driver_id": driver_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["state"], "EnRoute");

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "Completed", "driver_id": driver_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["state"], "Completed");
    assert_eq!(state.pool.available_count(), 1);

    let (status, _) = send(&app, json_request("POST", "/rides", ride_draft("rider-1"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn second_driver_accepting_gets_already_taken() {
    let (app, state) = setup();
    let first = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;
    let second = register_driver(&app, "Sita", "Bike", 27.7178, 85.3243).await;
    let ride_id = accepted_ride(&app, "rider-1", first["id"].as_str().unwrap()).await;

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "Accepted", "driver_id": second["id"] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_taken");
    assert_eq!(state.pool.available_count(), 1);
}

#[tokio::test]
async fn cancel_accepted_ride_releases_driver() {
    let (app, state) = setup();
    let driver = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;
    let ride_id = accepted_ride(&app, "rider-1", driver["id"].as_str().unwrap()).await;
    assert_eq!(state.pool.available_count(), 0);

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "Cancelled", "actor": "Rider" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["state"], "Cancelled");
    assert_eq!(state.pool.available_count(), 1);
}

#[tokio::test]
async fn completing_before_departure_returns_409() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;
    let driver_id = driver["id"].as_str().unwrap();
    let ride_id = accepted_ride(&app, "rider-1", driver_id).await;

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "Completed", "driver_id": driver_id }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "InvalidTransition");
}

#[tokio::test]
async fn open_rides_visible_to_matching_driver() {
    let (app, _state) = setup();
    let bike = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;
    let car = register_driver(&app, "Ram", "Car", 27.7180, 85.3245).await;
    let (_, posted) = send(&app, json_request("POST", "/rides", ride_draft("rider-1"))).await;
    send(
        &app,
        empty_request("POST", &format!("/rides/{}/candidates", posted["id"].as_str().unwrap())),
    )
    .await;

    let (_, for_bike) = send(
        &app,
        get_request(&format!("/drivers/{}/open-rides", bike["id"].as_str().unwrap())),
    )
    .await;
    let (_, for_car) = send(
        &app,
        get_request(&format!("/drivers/{}/open-rides", car["id"].as_str().unwrap())),
    )
    .await;

    assert_eq!(for_bike.as_array().unwrap().len(), 1);
    assert_eq!(for_bike[0]["id"], posted["id"]);
    assert!(for_car.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn approach_route_runs_from_driver_to_pickup() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;
    let ride_id = accepted_ride(&app, "rider-1", driver["id"].as_str().unwrap()).await;

    let (status, body) = send(&app, get_request(&format!("/rides/{ride_id}/approach"))).await;

    assert_eq!(status, StatusCode::OK);
    let polyline = body["polyline"].as_array().unwrap();
    assert_eq!(polyline[0]["lat"], 27.7180);
    assert_eq!(polyline[polyline.len() - 1]["lat"], 27.7172);
}

#[tokio::test]
async fn messages_ordered_editable_and_removable() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;
    let ride_id = accepted_ride(&app, "rider-1", driver["id"].as_str().unwrap()).await;

    let (status, first) = send(
        &app,
        json_request(
            "POST",
            "/messages",
            json!({ "ride_id": ride_id, "sender": "Rider", "content": "I'm at the gate" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send(
        &app,
        json_request(
            "POST",
            "/messages",
            json!({ "ride_id": ride_id, "sender": "Driver", "content": "Two minutes" }),
        ),
    )
    .await;
    assert!(second["id"].as_u64().unwrap() > first["id"].as_u64().unwrap());

    let first_id = first["id"].as_u64().unwrap();
    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/messages/{first_id}"),
            json!({ "sender": "Driver", "content": "hijacked" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "Forbidden");

    let (status, edited) = send(
        &app,
        json_request(
            "PUT",
            &format!("/messages/{first_id}"),
            json!({ "sender": "Rider", "content": "I'm at the east gate" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["content"], "I'm at the east gate");
    assert!(!edited["edited_at"].is_null());

    let (_, thread) = send(&app, get_request(&format!("/messages?ride_id={ride_id}"))).await;
    let contents: Vec<&str> = thread
        .as_array()
        .unwrap()
        .iter()
        .map(|message| message["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["I'm at the east gate", "Two minutes"]);

    let (_, by_driver) = send(&app, get_request("/messages?driver=Hari")).await;
    assert_eq!(by_driver.as_array().unwrap().len(), 2);

    let (status, _) = send(&app, empty_request("DELETE", &format!("/messages/{first_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, empty_request("DELETE", &format!("/messages/{first_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, thread) = send(&app, get_request(&format!("/messages?ride_id={ride_id}"))).await;
    assert_eq!(thread.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn blank_message_returns_400() {
    let (app, _state) = setup();
    let driver = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;
    let ride_id = accepted_ride(&app, "rider-1", driver["id"].as_str().unwrap()).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/messages",
            json!({ "ride_id": ride_id, "sender": "Rider", "content": "   " }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "EmptyContent");
}

#[tokio::test]
async fn messages_without_filter_returns_400() {
    let (app, _state) = setup();
    let (status, _) = send(&app, get_request("/messages")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn quote_prices_by_vehicle_class() {
    let (app, _state) = setup();

    let (status, bike) = send(&app, get_request("/quote?distance_meters=2000&vehicle_class=Bike")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bike["amount"], "60.00");

    let (_, car) = send(&app, get_request("/quote?distance_meters=2000&vehicle_class=Car")).await;
    assert_eq!(car["amount"], "120.00");

    let (status, body) = send(&app, get_request("/quote?distance_meters=2000&vehicle_class=Tuk")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "UnknownVehicleClass");
}

#[tokio::test]
async fn session_quotes_confirms_and_gets_driver() {
    let (app, state) = setup();
    let driver = register_driver(&app, "Hari", "Comfort", 27.7180, 85.3245).await;
    register_driver(&app, "Sita", "Bike", 27.7175, 85.3242).await;

    let (status, session) = send(
        &app,
        json_request(
            "POST",
            "/sessions",
            json!({ "rider_id": "rider-1", "pickup": { "lat": 27.7172, "lng": 85.3240 } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["state"]["state"], "Idle");
    let id = session["id"].as_str().unwrap().to_string();

    let (status, quoted) = send(
        &app,
        json_request(
            "POST",
            &format!("/sessions/{id}/destination"),
            json!({ "text": "Patan Durbar Square" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quoted["state"]["state"], "Quoted");
    assert_eq!(quoted["fare"]["amount"], "60.00");

    let (_, comfort) = send(
        &app,
        json_request(
            "PUT",
            &format!("/sessions/{id}/vehicle-class"),
            json!({ "vehicle_class": "Comfort" }),
        ),
    )
    .await;
    assert_eq!(comfort["fare"]["amount"], "160.00");

    let (status, waiting) = send(&app, empty_request("POST", &format!("/sessions/{id}/confirm"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(waiting["state"]["state"], "WaitingForDriver");
    let candidates = waiting["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["id"], driver["id"]);

    let ride_id = waiting["ride_id"].as_str().unwrap();
    let (_, ride) = send(&app, get_request(&format!("/rides/{ride_id}"))).await;
    assert_eq!(ride["vehicle_class"], "Comfort");

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/sessions/{id}/accept"), json!({ "driver_id": driver["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "accepted");
    assert_eq!(state.pool.available_count(), 1);

    let (_, synced) = send(&app, get_request(&format!("/sessions/{id}"))).await;
    assert_eq!(synced["state"]["state"], "Accepted");
    assert_eq!(synced["assigned_driver_id"], driver["id"]);
}

#[tokio::test]
async fn session_unknown_destination_returns_404_and_idle() {
    let (app, _state) = setup();
    let (_, session) = send(
        &app,
        json_request(
            "POST",
            "/sessions",
            json!({ "rider_id": "rider-1", "pickup": { "lat": 27.7172, "lng": 85.3240 } }),
        ),
    )
    .await;
    let id = session["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/sessions/{id}/destination"), json!({ "text": "Atlantis" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["retryable"], false);

    let (_, snapshot) = send(&app, get_request(&format!("/sessions/{id}"))).await;
    assert_eq!(snapshot["state"]["state"], "Idle");
    assert!(snapshot["fare"].is_null());
}

#[tokio::test]
async fn unknown_session_returns_404() {
    let (app, _state) = setup();
    let (status, _) = send(
        &app,
        empty_request("POST", "/sessions/00000000-0000-0000-0000-000000000000/cancel"),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn quoted_session(app: &Router, rider_id: &str) -> String {
    let (_, session) = send(
        app,
        json_request(
            "POST",
            "/sessions",
            json!({ "rider_id": rider_id, "pickup": { "lat": 27.7172, "lng": 85.3240 } }),
        ),
    )
    .await;
    let id = session["id"].as_str().unwrap().to_string();
    let (status, _) = send(
        app,
        json_request(
            "POST",
            &format!("/sessions/{id}/destination"),
            json!({ "text": "Patan Durbar Square" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    id
}

#[tokio::test]
async fn cancelled_sessions_are_torn_down() {
    let (app, state) = setup();

    for i in 0..50 {
        let id = quoted_session(&app, &format!("rider-{i}")).await;
        let (status, body) = send(&app, empty_request("POST", &format!("/sessions/{id}/cancel"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], "Cancelled");
    }
    assert_eq!(state.sessions.len(), 0);

    let id = quoted_session(&app, "rider-last").await;
    assert_eq!(state.sessions.len(), 1);
    send(&app, empty_request("POST", &format!("/sessions/{id}/cancel"))).await;
    let (status, _) = send(&app, get_request(&format!("/sessions/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completed_session_is_retired() {
    let (app, state) = setup();
    let driver = register_driver(&app, "Hari", "Bike", 27.7180, 85.3245).await;
    let id = quoted_session(&app, "rider-1").await;

    send(&app, empty_request("POST", &format!("/sessions/{id}/confirm"))).await;
    send(
        &app,
        json_request("POST", &format!("/sessions/{id}/accept"), json!({ "driver_id": driver["id"] })),
    )
    .await;
    send(&app, empty_request("POST", &format!("/sessions/{id}/depart"))).await;
    assert_eq!(state.sessions.len(), 1);

    let (status, body) = send(&app, empty_request("POST", &format!("/sessions/{id}/complete"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["state"], "Completed");
    assert_eq!(state.sessions.len(), 0);
}

#[tokio::test]
async fn sessions_whose_ride_was_cancelled_elsewhere_are_pruned() {
    let (app, state) = setup();
    let expired = quoted_session(&app, "rider-1").await;
    let (_, waiting) = send(&app, empty_request("POST", &format!("/sessions/{expired}/confirm"))).await;
    quoted_session(&app, "rider-2").await;

    let ride_id: Uuid = waiting["ride_id"].as_str().unwrap().parse().unwrap();
    state.dispatcher.cancel(ride_id, Actor::System).unwrap();

    assert_eq!(state.prune_finished_sessions(), 1);
    assert_eq!(state.sessions.len(), 1);
    let (status, _) = send(&app, get_request(&format!("/sessions/{expired}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
