//! Blacklist API: listing, seller reports, admin verdicts.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::views::{SearchQuery, load_blacklist};
use super::{message, moderation_failure, store_failure};
use crate::model::BlacklistStatus;
use crate::services::blacklist::{self as blacklist_svc, BlacklistReport};
use crate::services::guard;
use crate::state::AppState;

/// `GET /api/blacklist?search=`: entries visible to the caller plus summary.
pub async fn list(State(state): State<AppState>, auth: AuthUser, Query(q): Query<SearchQuery>) -> Response {
    if !guard::ADMIN_OR_SELLER.contains(&auth.identity.role) {
        return message(StatusCode::FORBIDDEN, "access denied");
    }
    match load_blacklist(&state, auth.identity.role, q.search()).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => store_failure("Failed to load blacklist", &e),
    }
}

/// `POST /api/blacklist`: file a report (seller).
pub async fn report(State(state): State<AppState>, auth: AuthUser, Json(form): Json<BlacklistReport>) -> Response {
    match blacklist_svc::report(state.store.as_ref(), &auth.identity, form).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => moderation_failure("Failed to submit report", &e),
    }
}

#[derive(Deserialize)]
pub struct StatusRequest {
    status: String,
}

/// `PATCH /api/blacklist/{id}/status`: verify or reject (admin).
pub async fn set_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let Some(status) = BlacklistStatus::parse(&req.status) else {
        return message(StatusCode::BAD_REQUEST, format!("unknown blacklist status: {}", req.status));
    };
    match blacklist_svc::set_status(state.store.as_ref(), &auth.identity, id, status).await {
        Ok(()) => Json(serde_json::json!({ "id": id, "status": status })).into_response(),
        Err(e) => moderation_failure("Failed to update status", &e),
    }
}

/// `POST /api/blacklist/{id}/landing`: flip landing-page visibility (admin).
pub async fn toggle_landing(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Response {
    match blacklist_svc::toggle_landing(state.store.as_ref(), &auth.identity, id).await {
        Ok(show) => Json(serde_json::json!({ "id": id, "show_on_landing_page": show })).into_response(),
        Err(e) => moderation_failure("Failed to update landing page", &e),
    }
}

#[cfg(test)]
#[path = "blacklist_test.rs"]
mod tests;
