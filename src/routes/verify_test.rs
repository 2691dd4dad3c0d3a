use super::*;
use crate::config::AppConfig;
use crate::model::{EvidenceKind, EvidenceMetadata, NewEvidence, NewOrder, OrderStatus, Role};
use crate::routes::test_support::{get, post};
use crate::state::test_helpers::{seed_session, test_app_state, test_app_state_with};
use crate::store::memory::Fault;
use crate::store::{MemoryStore, Store, StoreError};
use serde_json::json;

/// Seed a shipped order with packing evidence, as the seller wizard would.
async fn shipped_order(store: &MemoryStore, tracking: &str) -> Uuid {
    let order = store
        .insert_order(NewOrder::shipped(Uuid::new_v4(), tracking))
        .await
        .expect("order insert should succeed");
    store
        .insert_evidence(NewEvidence {
            order_id: order.id,
            uploader_id: Some(order.seller_id),
            kind: EvidenceKind::Packing,
            media_url: "packing.mp4".into(),
            metadata: EvidenceMetadata::captured_now("Pixel 8", "Jakarta"),
        })
        .await
        .expect("evidence insert should succeed");
    order.id
}

async fn open_flow(state: &AppState, tracking: &str, token: Option<&str>) -> String {
    let res = post(state, &format!("/api/verify/{tracking}"), token, json!({})).await;
    assert_eq!(res.status, StatusCode::CREATED);
    res.json["flow_id"].as_str().unwrap_or_default().to_owned()
}

fn capped(max_open_flows: usize, flow_ttl: time::Duration) -> AppConfig {
    AppConfig { max_open_flows, flow_ttl, ..AppConfig::memory() }
}

// =============================================================================
// verify_error_to_status
// =============================================================================

#[test]
fn verify_errors_map_to_statuses() {
    assert_eq!(verify_error_to_status(&VerifyError::OrderNotFound("X".into())), StatusCode::NOT_FOUND);
    assert_eq!(
        verify_error_to_status(&VerifyError::WrongStep { expected: FlowStep::Recording, actual: FlowStep::Review }),
        StatusCode::CONFLICT
    );
    assert_eq!(
        verify_error_to_status(&VerifyError::EvidenceInsert(StoreError::Unavailable("down".into()))),
        StatusCode::BAD_GATEWAY
    );
}

// =============================================================================
// OPEN
// =============================================================================

#[tokio::test]
async fn unknown_tracking_is_not_found() {
    let (state, _) = test_app_state();
    let res = post(&state, "/api/verify/NOPE-1", None, json!({})).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.message(), "order not found: NOPE-1");
    assert!(state.flows.read().await.is_empty());
}

#[tokio::test]
async fn open_shows_order_and_seller_evidence() {
    let (state, store) = test_app_state();
    shipped_order(&store, "JNE-001").await;

    let res = post(&state, "/api/verify/JNE-001", None, json!({})).await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.json["step"], "review");
    assert_eq!(res.json["order"]["tracking_number"], "JNE-001");
    assert_eq!(res.json["seller_evidence"]["type"], "packing");
    assert!(res.json["unboxing_evidence"].is_null());
}

#[tokio::test]
async fn missing_flow_is_not_found() {
    let (state, _) = test_app_state();
    let res = get(&state, &format!("/api/verify/flows/{}", Uuid::new_v4()), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// RECORD / FINISH
// =============================================================================

#[tokio::test]
async fn full_flow_marks_order_delivered_and_drops_flow() {
    let (state, store) = test_app_state();
    let order_id = shipped_order(&store, "JNE-001").await;
    let flow_id = open_flow(&state, "JNE-001", None).await;

    let recording = post(&state, &format!("/api/verify/flows/{flow_id}/record"), None, json!({})).await;
    assert_eq!(recording.status, StatusCode::OK);
    assert_eq!(recording.json["step"], "recording");

    let done = post(&state, &format!("/api/verify/flows/{flow_id}/finish"), None, json!({})).await;
    assert_eq!(done.status, StatusCode::OK);
    assert_eq!(done.json["step"], "done");
    assert_eq!(done.json["order"]["status"], "delivered");
    assert_eq!(done.json["unboxing_evidence"]["type"], "unboxing");
    assert_eq!(done.json["unboxing_evidence"]["metadata"]["sensor_status"], "Locked");
    assert!(done.json["unboxing_evidence"]["uploader_id"].is_null());

    let order = store.orders_snapshot().await.into_iter().find(|o| o.id == order_id);
    assert_eq!(order.map(|o| o.status), Some(OrderStatus::Delivered));

    let gone = get(&state, &format!("/api/verify/flows/{flow_id}"), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signed_in_buyer_is_recorded_as_uploader() {
    let (state, store) = test_app_state();
    shipped_order(&store, "JNE-001").await;
    let (identity, buyer) = seed_session(&state, "buyer@example.com", Role::Buyer).await;
    let flow_id = open_flow(&state, "JNE-001", Some(&buyer)).await;

    post(&state, &format!("/api/verify/flows/{flow_id}/record"), None, json!({})).await;
    let done = post(
        &state,
        &format!("/api/verify/flows/{flow_id}/finish"),
        None,
        json!({ "device": "iPhone", "location": "Surabaya" }),
    )
    .await;
    assert_eq!(done.json["unboxing_evidence"]["uploader_id"], identity.user_id.to_string());
    assert_eq!(done.json["unboxing_evidence"]["metadata"]["device"], "iPhone");
}

#[tokio::test]
async fn finish_before_recording_conflicts() {
    let (state, store) = test_app_state();
    shipped_order(&store, "JNE-001").await;
    let flow_id = open_flow(&state, "JNE-001", None).await;

    let res = post(&state, &format!("/api/verify/flows/{flow_id}/finish"), None, json!({})).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(store.evidences_snapshot().await.len(), 1);
}

#[tokio::test]
async fn record_twice_conflicts() {
    let (state, store) = test_app_state();
    shipped_order(&store, "JNE-001").await;
    let flow_id = open_flow(&state, "JNE-001", None).await;

    post(&state, &format!("/api/verify/flows/{flow_id}/record"), None, json!({})).await;
    let again = post(&state, &format!("/api/verify/flows/{flow_id}/record"), None, json!({})).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn stale_order_status_is_surfaced_with_ids() {
    let (state, store) = test_app_state();
    let order_id = shipped_order(&store, "JNE-001").await;
    let flow_id = open_flow(&state, "JNE-001", None).await;
    post(&state, &format!("/api/verify/flows/{flow_id}/record"), None, json!({})).await;
    store.fail_next(Fault::UpdateOrderStatus, "timeout");

    let res = post(&state, &format!("/api/verify/flows/{flow_id}/finish"), None, json!({})).await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    assert_eq!(res.message(), "Failed to lock evidence: store unavailable: timeout");
    assert_eq!(res.json["order_id"], order_id.to_string());
    assert!(res.json["evidence_id"].is_string());

    let flow = get(&state, &format!("/api/verify/flows/{flow_id}"), None).await;
    assert_eq!(flow.status, StatusCode::OK);
    assert_eq!(flow.json["step"], "recording");
}

// =============================================================================
// PARKED FLOW LIMITS
// =============================================================================

#[tokio::test]
async fn repeated_anonymous_opens_stay_under_the_cap() {
    let (state, store) = test_app_state_with(capped(8, time::Duration::hours(1)));
    shipped_order(&store, "SG-200").await;

    let mut last = String::new();
    for _ in 0..200 {
        last = open_flow(&state, "SG-200", None).await;
    }

    assert_eq!(state.flows.read().await.len(), 8);
    let newest = get(&state, &format!("/api/verify/flows/{last}"), None).await;
    assert_eq!(newest.status, StatusCode::OK);
}

#[tokio::test]
async fn cap_evicts_the_oldest_flow() {
    let (state, store) = test_app_state_with(capped(2, time::Duration::hours(1)));
    shipped_order(&store, "SG-201").await;

    let first = open_flow(&state, "SG-201", None).await;
    let second = open_flow(&state, "SG-201", None).await;
    let third = open_flow(&state, "SG-201", None).await;

    let gone = get(&state, &format!("/api/verify/flows/{first}"), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    for kept in [second, third] {
        let res = get(&state, &format!("/api/verify/flows/{kept}"), None).await;
        assert_eq!(res.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn expired_flows_are_dropped_on_open() {
    let (state, store) = test_app_state_with(capped(100, time::Duration::ZERO));
    shipped_order(&store, "SG-202").await;

    let stale = open_flow(&state, "SG-202", None).await;
    let fresh = open_flow(&state, "SG-202", None).await;

    assert_eq!(state.flows.read().await.len(), 1);
    let gone = get(&state, &format!("/api/verify/flows/{stale}"), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    let kept = get(&state, &format!("/api/verify/flows/{fresh}"), None).await;
    assert_eq!(kept.status, StatusCode::OK);
}
