//! Buyer unboxing verification endpoints.
//!
//! Opening a tracking number parks an `UnboxingFlow` in `AppState` under a
//! fresh flow id. The flow is dropped from the map once it reaches `Done`,
//! or evicted by `AppState::insert_flow` once it expires or the cap is hit.
//! The routes are public; a signed-in buyer is recorded as the uploader.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use uuid::Uuid;

use super::auth::Viewer;
use super::message;
use crate::services::verification::{FlowStep, UnboxingContext, UnboxingFlow, VerifyError};
use crate::state::{AppState, SharedFlow};

pub(crate) fn verify_error_to_status(err: &VerifyError) -> StatusCode {
    match err {
        VerifyError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        VerifyError::WrongStep { .. } => StatusCode::CONFLICT,
        VerifyError::EvidenceInsert(_) | VerifyError::StatusUpdate { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn verify_failure(err: &VerifyError) -> Response {
    let status = verify_error_to_status(err);
    let mut body = serde_json::json!({ "message": err.user_message() });
    if let VerifyError::StatusUpdate { order_id, evidence_id, .. } = err {
        tracing::error!(error = %err, %order_id, %evidence_id, "order left stale after unboxing evidence");
        body["order_id"] = serde_json::json!(order_id);
        body["evidence_id"] = serde_json::json!(evidence_id);
    }
    (status, Json(body)).into_response()
}

async fn find_flow(state: &AppState, flow_id: Uuid) -> Result<SharedFlow, Response> {
    state
        .flow(flow_id)
        .await
        .ok_or_else(|| message(StatusCode::NOT_FOUND, format!("verification flow not found: {flow_id}")))
}

/// `POST /api/verify/{tracking}`: look the shipment up and start a flow.
pub async fn open(State(state): State<AppState>, viewer: Viewer, Path(tracking): Path<String>) -> Response {
    let identity = viewer.0.identity().cloned();
    match UnboxingFlow::open(state.store.clone(), identity, &tracking).await {
        Ok(flow) => {
            tracing::info!(
                flow_id = %flow.id(),
                tracking = %tracking,
                has_seller_evidence = flow.seller_evidence().is_some(),
                "verification flow opened"
            );
            let view = flow.view();
            state.insert_flow(flow).await;
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(e) => verify_failure(&e),
    }
}

/// `GET /api/verify/flows/{flow_id}`
pub async fn show(State(state): State<AppState>, Path(flow_id): Path<Uuid>) -> Response {
    match find_flow(&state, flow_id).await {
        Ok(flow) => Json(flow.lock().await.view()).into_response(),
        Err(missing) => missing,
    }
}

/// `POST /api/verify/flows/{flow_id}/record`
pub async fn record(State(state): State<AppState>, Path(flow_id): Path<Uuid>) -> Response {
    let flow = match find_flow(&state, flow_id).await {
        Ok(flow) => flow,
        Err(missing) => return missing,
    };
    let mut flow = flow.lock().await;
    match flow.start_recording() {
        Ok(()) => Json(flow.view()).into_response(),
        Err(e) => verify_failure(&e),
    }
}

/// `POST /api/verify/flows/{flow_id}/finish`: lock the unboxing evidence.
pub async fn finish(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
    Json(capture): Json<UnboxingContext>,
) -> Response {
    let shared = match find_flow(&state, flow_id).await {
        Ok(flow) => flow,
        Err(missing) => return missing,
    };
    let mut flow = shared.lock().await;
    let outcome = flow.finish_and_lock(&capture).await.map(|_| ());
    if let Err(e) = outcome {
        return verify_failure(&e);
    }

    let done = flow.step() == FlowStep::Done;
    let view = flow.view();
    drop(flow);
    if done {
        state.remove_flow(flow_id).await;
    }
    Json(view).into_response()
}

#[cfg(test)]
#[path = "verify_test.rs"]
mod tests;
