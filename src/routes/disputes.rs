//! Dispute API: buyer filing, admin/seller resolution.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::{message, moderation_failure, store_failure};
use crate::model::DisputeStatus;
use crate::services::dispute::{self as dispute_svc, DisputeForm};
use crate::services::guard;
use crate::state::AppState;

/// `GET /api/disputes`: every dispute with summary counts (admin, seller).
pub async fn list_all(State(state): State<AppState>, auth: AuthUser) -> Response {
    match dispute_svc::list_all(state.store.as_ref(), &auth.identity).await {
        Ok(disputes) => {
            let summary = dispute_svc::summary(&disputes);
            Json(serde_json::json!({ "disputes": disputes, "summary": summary })).into_response()
        }
        Err(e) => moderation_failure("Failed to load disputes", &e),
    }
}

/// `GET /api/disputes/mine`: the caller's own disputes (buyer).
pub async fn list_mine(State(state): State<AppState>, auth: AuthUser) -> Response {
    if !guard::BUYER.contains(&auth.identity.role) {
        return message(StatusCode::FORBIDDEN, "access denied");
    }
    match dispute_svc::list_mine(state.store.as_ref(), &auth.identity).await {
        Ok(disputes) => {
            let summary = dispute_svc::summary(&disputes);
            Json(serde_json::json!({ "disputes": disputes, "summary": summary })).into_response()
        }
        Err(e) => store_failure("Failed to load disputes", &e),
    }
}

/// `POST /api/disputes`: file a dispute (buyer).
pub async fn file(State(state): State<AppState>, auth: AuthUser, Json(form): Json<DisputeForm>) -> Response {
    match dispute_svc::file(state.store.as_ref(), &auth.identity, form).await {
        Ok(dispute) => (StatusCode::CREATED, Json(dispute)).into_response(),
        Err(e) => moderation_failure("Failed to submit dispute", &e),
    }
}

#[derive(Deserialize)]
pub struct StatusRequest {
    status: String,
}

/// `PATCH /api/disputes/{id}/status`
pub async fn set_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let Some(status) = DisputeStatus::parse(&req.status) else {
        return message(StatusCode::BAD_REQUEST, format!("unknown dispute status: {}", req.status));
    };
    match dispute_svc::set_status(state.store.as_ref(), &auth.identity, id, status).await {
        Ok(()) => Json(serde_json::json!({ "id": id, "status": status })).into_response(),
        Err(e) => moderation_failure("Failed to update status", &e),
    }
}

#[cfg(test)]
#[path = "disputes_test.rs"]
mod tests;
