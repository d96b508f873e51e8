//! HTTP tests for the disposition routes, served from the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use animal_control_core::{
    ClaimReceipt, DispositionRequest, EntityStore, Owner, Pet, RequestStatus, StoreTransaction,
    StrayAnimal, StrayStatus,
};
use animal_control_testing::{Harness, InMemoryEntityStore, init_test_tracing};
use animal_control_web::handlers::owners::RecomputeResponse;
use animal_control_web::{AppState, CORRELATION_ID_HEADER, router};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;

fn setup() -> (Harness<InMemoryEntityStore>, TestServer) {
    init_test_tracing();
    let h = Harness::new(InMemoryEntityStore::new());
    let state = AppState::new(Arc::clone(&h.store), Arc::clone(&h.clock));
    let server = TestServer::new(router(state)).expect("test server");
    (h, server)
}

async fn register(server: &TestServer, name: &str) -> Owner {
    let response = server
        .post("/api/owners")
        .json(&json!({ "full_name": name, "phone": "555-0100" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

async fn capture(server: &TestServer, tag: Option<&str>) -> StrayAnimal {
    let response = server
        .post("/api/strays")
        .json(&json!({ "species": "dog", "hardware_tag": tag }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

fn error_code(body: &Value) -> &str {
    body["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn redemption_flow_over_http() {
    let (_h, server) = setup();
    let owner = register(&server, "Ada").await;
    let stray = capture(&server, Some("RF100")).await;

    let response = server
        .post("/api/requests/redemption")
        .json(&json!({
            "stray_id": stray.id,
            "requester_id": owner.id,
            "proof": { "kind": "path", "value": "proof/collar.jpg" },
            "contact_phone": "555-0142",
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let request: DispositionRequest = response.json();
    assert_eq!(request.status, RequestStatus::Pending);

    let response = server
        .put(&format!("/api/requests/redemption/{}", request.id))
        .json(&json!({ "status": "approved" }))
        .await;
    response.assert_status_ok();

    let response = server
        .post(&format!("/api/requests/redemption/{}/claim", request.id))
        .json(&json!({ "manual_entry": false }))
        .await;
    response.assert_status_ok();
    let receipt: ClaimReceipt = response.json();
    assert_eq!(receipt.hardware_tag.as_str(), "RF100");
    assert_eq!(receipt.owner_id, owner.id);

    let pets: Vec<Pet> = server
        .get("/api/pets")
        .add_query_param("tag", "RF100")
        .await
        .json();
    assert_eq!(pets.len(), 1);
    assert_eq!(pets[0].id, receipt.pet_id);

    let stray: StrayAnimal = server
        .get(&format!("/api/strays/{}", stray.id))
        .await
        .json();
    assert_eq!(stray.status, StrayStatus::Claimed);

    let response = server
        .post(&format!("/api/requests/redemption/{}/claim", request.id))
        .json(&json!({}))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_code(&response.json()), "CONFLICT");
}

#[tokio::test]
async fn redemption_of_adoption_stray_is_conflict() {
    let (h, server) = setup();
    let owner = register(&server, "Ada").await;
    let stray = h.stray_in(StrayStatus::Adoption, None).await.unwrap();

    let response = server
        .post("/api/requests/redemption")
        .json(&json!({ "stray_id": stray.id, "requester_id": owner.id }))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let listings: Vec<Value> = server.get("/api/requests/redemption").await.json();
    assert!(listings.is_empty());
}

#[tokio::test]
async fn adoption_approval_lists_and_settles() {
    let (h, server) = setup();
    let winner = register(&server, "Winner").await;
    let other = register(&server, "Other").await;
    let stray = h.stray_in(StrayStatus::Adoption, None).await.unwrap();

    let mut ids = Vec::new();
    for requester in [&winner, &other] {
        let response = server
            .post("/api/requests/adoption")
            .json(&json!({
                "stray_id": stray.id,
                "requester_id": requester.id,
                "applicant": { "housing": "flat" },
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        ids.push(response.json::<DispositionRequest>().id);
    }

    server
        .put(&format!("/api/requests/adoption/{}", ids[0]))
        .json(&json!({ "status": "approved" }))
        .await
        .assert_status_ok();

    let rejected: Vec<Value> = server
        .get("/api/requests/adoption")
        .add_query_param("status", "rejected")
        .await
        .json();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["requester_name"], "Other");

    let mine: Vec<Value> = server
        .get("/api/requests/adoption")
        .add_query_param("requester_id", winner.id.get())
        .await
        .json();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["status"], "approved");
}

#[tokio::test]
async fn bad_input_is_400_with_error_body() {
    let (_h, server) = setup();

    let response = server.get("/api/requests/rescue").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json()), "INVALID_ARGUMENT");

    let response = server
        .get("/api/requests/adoption")
        .add_query_param("status", "lost")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/api/pets").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/strays")
        .json(&json!({ "species": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/api/requests/adoption/seven").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json()), "INVALID_ARGUMENT");

    let response = server
        .post("/api/owners/pet-counts/recompute")
        .add_query_param("owner_id", "everyone")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json()), "INVALID_ARGUMENT");

    let response = server
        .post("/api/owners")
        .text("{\"full_name\":")
        .content_type("application/json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json()), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn unknown_entities_are_404() {
    let (_h, server) = setup();

    let response = server.get("/api/requests/adoption/41").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(error_code(&response.json()), "NOT_FOUND");

    server
        .put("/api/strays/41/status")
        .json(&json!({ "status": "observation" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    server
        .post("/api/owners/pet-counts/recompute")
        .add_query_param("owner_id", 41)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reserved_stray_status_is_conflict() {
    let (_h, server) = setup();
    let stray = capture(&server, None).await;

    server
        .put(&format!("/api/strays/{}/status", stray.id))
        .json(&json!({ "status": "claimed" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let response = server
        .put(&format!("/api/strays/{}/status", stray.id))
        .json(&json!({ "status": "observation" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<StrayAnimal>().status, StrayStatus::Observation);
}

#[tokio::test]
async fn recompute_repairs_counters() {
    let (h, server) = setup();
    let owner = register(&server, "Ada").await;
    h.seed_pet(owner.id, "RF9").await.unwrap();
    h.seed_pet(owner.id, "RF10").await.unwrap();
    let mut tx = h.store.begin().await.unwrap();
    tx.adjust_pet_count(owner.id, 3).await.unwrap();
    tx.commit().await.unwrap();

    let response = server.post("/api/owners/pet-counts/recompute").await;
    response.assert_status_ok();
    let body: RecomputeResponse = response.json();
    assert_eq!(body.corrections.len(), 1);
    assert_eq!(body.corrections[0].actual, 2);

    let owner: Owner = server
        .get(&format!("/api/owners/{}", owner.id))
        .await
        .json();
    assert_eq!(owner.pet_count, 2);
}

#[tokio::test]
async fn health_and_correlation_header() {
    let (_h, server) = setup();
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("ok");
    assert!(response.headers().get(CORRELATION_ID_HEADER).is_some());
}
