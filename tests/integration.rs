use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use parcel_flow::api::rest::router;
use parcel_flow::config::Config;
use parcel_flow::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> Router {
    router(Arc::new(AppState::new(&Config::default())))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
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

/// Sends a JSON request and returns the status with the decoded body.
async fn call(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let res = app
        .clone()
        .oneshot(json_request(method, uri, body))
        .await
        .unwrap();
    let status = res.status();
    (status, body_json(res).await)
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

struct Fixture {
    origin_hub: String,
    dest_hub: String,
    origin_staff: String,
    dest_staff: String,
    courier: String,
    vehicle: String,
}

async fn register(app: &Router) -> Fixture {
    let (_, origin) = call(
        app,
        "POST",
        "/hubs",
        json!({ "name": "Lat Phrao", "address": "1 Lat Phrao Rd", "sub_areas": ["Chom Phon"] }),
    )
    .await;
    let (_, dest) = call(
        app,
        "POST",
        "/hubs",
        json!({ "name": "Silom", "address": "8 Silom Rd", "sub_areas": ["Bang Rak"] }),
    )
    .await;
    let (_, origin_staff) = call(
        app,
        "POST",
        "/staff",
        json!({ "name": "Pim", "role": "operator", "hub_id": id_of(&origin) }),
    )
    .await;
    let (_, dest_staff) = call(
        app,
        "POST",
        "/staff",
        json!({ "name": "Nok", "role": "supervisor", "hub_id": id_of(&dest) }),
    )
    .await;
    let (_, courier) = call(
        app,
        "POST",
        "/couriers",
        json!({ "name": "Anan", "phone": "0800000000" }),
    )
    .await;
    let (status, vehicle) = call(
        app,
        "POST",
        "/vehicles",
        json!({
            "plate": "1กข-1234",
            "province": "Bangkok",
            "vehicle_type": "motorcycle",
            "capacity": 20,
            "owner": "Company"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    Fixture {
        origin_hub: id_of(&origin),
        dest_hub: id_of(&dest),
        origin_staff: id_of(&origin_staff),
        dest_staff: id_of(&dest_staff),
        courier: id_of(&courier),
        vehicle: id_of(&vehicle),
    }
}

fn pickup_location() -> Value {
    json!({
        "address": "12 Phahonyothin Rd",
        "sub_area": "Chom Phon",
        "contact_name": "Somchai",
        "contact_phone": "0811111111"
    })
}

fn item_body(requester: &str, quantity: i64) -> Value {
    json!({
        "requester_id": requester,
        "recipient": {
            "name": "Malee",
            "phone": "0822222222",
            "address": "99 Surawong Rd",
            "sub_area": "Bang Rak"
        },
        "estimated_weight": 800.0,
        "quantity": quantity,
        "size": "Medium"
    })
}

/// Creates and submits a one-item pickup request, returning its view.
async fn submitted_pickup(app: &Router, requester: &str, quantity: i64) -> Value {
    let (_, draft) = call(
        app,
        "POST",
        "/pickups/draft",
        json!({ "requester_id": requester, "pickup_location": pickup_location() }),
    )
    .await;
    let request_id = id_of(&draft);
    let (status, _) = call(
        app,
        "POST",
        &format!("/pickups/{request_id}/items"),
        item_body(requester, quantity),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, view) = call(
        app,
        "POST",
        &format!("/pickups/{request_id}/submit"),
        json!({ "requester_id": requester }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    view
}

const SENDER: &str = "7f1c0d2e-3b4a-4c5d-8e6f-9a0b1c2d3e4f";

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pickup_requests"], 0);
    assert_eq!(body["parcels"], 0);
    assert_eq!(body["routes"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let fixture = register(&app).await;
    let view = submitted_pickup(&app, SENDER, 1).await;
    let request_id = id_of(&view);
    call(
        &app,
        "POST",
        &format!("/pickups/{request_id}/accept"),
        json!({ "courier_id": fixture.courier, "vehicle_id": fixture.vehicle }),
    )
    .await;

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
    assert!(body.contains("pickup_accepts_total"));
}

#[tokio::test]
async fn unknown_pickup_returns_404() {
    let app = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/pickups/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn empty_courier_name_returns_400() {
    let app = setup();
    let (status, body) = call(
        &app,
        "POST",
        "/couriers",
        json!({ "name": "  ", "phone": "0800000000" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn duplicate_plate_returns_409() {
    let app = setup();
    register(&app).await;
    let (status, body) = call(
        &app,
        "POST",
        "/vehicles",
        json!({
            "plate": "1กข 1234",
            "province": " Bangkok ",
            "vehicle_type": "pickup truck",
            "capacity": 50,
            "owner": "Company"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
}

#[tokio::test]
async fn draft_is_returned_again_for_same_sender() {
    let app = setup();
    let body = json!({ "requester_id": SENDER });
    let (_, first) = call(&app, "POST", "/pickups/draft", body.clone()).await;
    let (_, second) = call(&app, "POST", "/pickups/draft", body).await;

    assert_eq!(first["status"], "draft");
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn submitting_empty_draft_returns_empty_request() {
    let app = setup();
    let (_, draft) = call(
        &app,
        "POST",
        "/pickups/draft",
        json!({ "requester_id": SENDER, "pickup_location": pickup_location() }),
    )
    .await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/pickups/{}/submit", id_of(&draft)),
        json!({ "requester_id": SENDER }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "empty_request");
}

#[tokio::test]
async fn item_can_be_edited_and_removed_while_draft() {
    let app = setup();
    let (_, draft) = call(&app, "POST", "/pickups/draft", json!({ "requester_id": SENDER })).await;
    let request_id = id_of(&draft);
    let (_, item) = call(
        &app,
        "POST",
        &format!("/pickups/{request_id}/items"),
        item_body(SENDER, 1),
    )
    .await;
    let item_id = id_of(&item);

    let (status, updated) = call(
        &app,
        "PATCH",
        &format!("/pickups/{request_id}/items/{item_id}"),
        item_body(SENDER, 4),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["quantity"], 4);
    assert_eq!(updated["size"], "medium");

    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/pickups/{request_id}/items/{item_id}"),
        item_body(SENDER, 0),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!(
                    "/pickups/{request_id}/items/{item_id}?requester_id={SENDER}"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view = body_json(res).await;
    assert_eq!(view["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn second_accept_returns_not_pending() {
    let app = setup();
    let fixture = register(&app).await;
    let view = submitted_pickup(&app, SENDER, 1).await;
    let request_id = id_of(&view);

    let (_, listed) = call(&app, "GET", "/pickups/available", Value::Null).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, accepted) = call(
        &app,
        "POST",
        &format!("/pickups/{request_id}/accept"),
        json!({ "courier_id": fixture.courier, "vehicle_id": fixture.vehicle }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "assigned");

    let (_, rival) = call(
        &app,
        "POST",
        "/couriers",
        json!({ "name": "Boon", "phone": "0800000001" }),
    )
    .await;
    let (status, body) = call(
        &app,
        "POST",
        &format!("/pickups/{request_id}/accept"),
        json!({ "courier_id": id_of(&rival), "vehicle_id": fixture.vehicle }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "not_pending");
}

#[tokio::test]
async fn unknown_hub_action_returns_400() {
    let app = setup();
    let fixture = register(&app).await;
    let fake_parcel = "00000000-0000-0000-0000-000000000000";

    let (status, body) = call(
        &app,
        "POST",
        &format!("/hubs/{}/parcels/{fake_parcel}/process", fixture.origin_hub),
        json!({ "staff_id": fixture.origin_staff, "action": "teleport" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn full_pickup_to_delivery_flow() {
    let app = setup();
    let fixture = register(&app).await;
    let view = submitted_pickup(&app, SENDER, 1).await;
    let request_id = id_of(&view);
    let item_id = view["items"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(view["items"][0]["status"], "confirmed");

    let (status, _) = call(
        &app,
        "POST",
        &format!("/pickups/{request_id}/accept"),
        json!({ "courier_id": fixture.courier, "vehicle_id": fixture.vehicle }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, parcels) = call(
        &app,
        "POST",
        &format!("/pickups/{request_id}/items/{item_id}/parcels"),
        json!({ "courier_id": fixture.courier, "weight_grams": 950 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let parcel = &parcels.as_array().unwrap()[0];
    let parcel_id = id_of(parcel);
    let tracking_code = parcel["tracking_code"].as_str().unwrap().to_string();
    assert_eq!(parcel["status"], "picked_up");
    assert_eq!(parcel["weight_grams"], 950);
    assert_eq!(parcel["origin_hub"], fixture.origin_hub.as_str());
    assert_eq!(parcel["dest_hub"], fixture.dest_hub.as_str());

    let (status, moved) = call(
        &app,
        "POST",
        &format!("/parcels/{parcel_id}/actions"),
        json!({
            "courier_id": fixture.courier,
            "action": "scan_to_hub",
            "hub_id": fixture.origin_hub
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["status"], "at_origin_hub");

    for (hub, staff, action, expected) in [
        (&fixture.origin_hub, &fixture.origin_staff, "send_to_linehaul", "in_linehaul"),
        (&fixture.dest_hub, &fixture.dest_staff, "confirm_arrival", "at_dest_hub"),
    ] {
        let (status, moved) = call(
            &app,
            "POST",
            &format!("/hubs/{hub}/parcels/{parcel_id}/process"),
            json!({ "staff_id": staff, "action": action }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["status"], expected);
    }

    let (_, route) = call(
        &app,
        "POST",
        "/routes/today",
        json!({ "courier_id": fixture.courier, "hub_id": fixture.dest_hub }),
    )
    .await;
    let route_id = id_of(&route);
    let (status, _) = call(
        &app,
        "POST",
        &format!("/routes/{route_id}/assignments"),
        json!({ "parcel_id": parcel_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, report) = call(&app, "POST", &format!("/routes/{route_id}/start"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["route"]["status"], "out_for_delivery");
    assert_eq!(report["parcels"][0]["outcome"], "advanced");

    let (_, hints) = call(
        &app,
        "GET",
        &format!("/parcels/{parcel_id}/next-actions"),
        Value::Null,
    )
    .await;
    assert_eq!(hints["status"], "out_for_delivery");
    assert_eq!(hints["on_route"], route_id.as_str());

    let (status, body) = call(
        &app,
        "POST",
        &format!("/parcels/{parcel_id}/deliver"),
        json!({ "courier_id": fixture.courier, "recipient_name": "Malee" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");

    let (status, receipt) = call(
        &app,
        "POST",
        &format!("/parcels/{parcel_id}/deliver"),
        json!({
            "courier_id": fixture.courier,
            "recipient_name": "Malee",
            "photo_ref": "photos/door.jpg",
            "dropoff_location": { "lat": 13.7279, "lng": 100.5241 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["parcel"]["status"], "delivered");
    assert_eq!(receipt["proof"]["recipient_name"], "Malee");

    let (status, done) = call(&app, "POST", &format!("/routes/{route_id}/complete"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/tracking/{tracking_code}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let tracking = body_json(response).await;
    assert_eq!(tracking["status"], "delivered");
    assert_eq!(tracking["dest_hub"]["name"], "Silom");
    let events: Vec<&str> = tracking["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(
        events,
        vec![
            "picked_up",
            "arrived_hub",
            "departed_hub",
            "arrived_hub",
            "out_for_delivery",
            "delivered"
        ]
    );

    let (_, pickup) = call(&app, "GET", &format!("/pickups/{request_id}"), Value::Null).await;
    assert_eq!(pickup["status"], "completed");
    assert_eq!(pickup["items"][0]["status"], "parcel_created");
}

#[tokio::test]
async fn delivering_a_returned_parcel_is_illegal() {
    let app = setup();
    let fixture = register(&app).await;
    let view = submitted_pickup(&app, SENDER, 1).await;
    let request_id = id_of(&view);
    let item_id = view["items"][0]["id"].as_str().unwrap().to_string();
    call(
        &app,
        "POST",
        &format!("/pickups/{request_id}/accept"),
        json!({ "courier_id": fixture.courier, "vehicle_id": fixture.vehicle }),
    )
    .await;
    let (_, parcels) = call(
        &app,
        "POST",
        &format!("/pickups/{request_id}/items/{item_id}/parcels"),
        json!({ "courier_id": fixture.courier }),
    )
    .await;
    let parcel_id = id_of(&parcels[0]);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/parcels/{parcel_id}/actions"),
        json!({ "courier_id": fixture.courier, "action": "return_to_sender" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "illegal_transition");

    let (status, canceled) = call(
        &app,
        "POST",
        &format!("/parcels/{parcel_id}/cancel"),
        json!({ "requester_id": SENDER, "reason": "no longer needed" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["status"], "canceled");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/parcels/{parcel_id}/deliver"),
        json!({
            "courier_id": fixture.courier,
            "recipient_name": "Malee",
            "signature_ref": "sig/1.png"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "illegal_transition");
}
