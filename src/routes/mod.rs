//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router carries the JSON API, the guarded dashboard views, and the
//! live-list websocket. Views answer with a redirect when the guard denies
//! access; API routes answer 401/403 instead.
//!
//! ERROR HANDLING
//! ==============
//! Service errors map to a status code plus a `{"message": ...}` body. The
//! message is the alert text the user sees. Store failures also carry the
//! store's `code` and `retryable` flag.

pub mod auth;
pub mod blacklist;
pub mod disputes;
pub mod live;
pub mod seller;
pub mod verify;
pub mod views;

#[cfg(test)]
pub(crate) mod test_support;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, patch, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::frame::ErrorCode;
use crate::services::moderation::ModerationError;
use crate::state::AppState;
use crate::store::StoreError;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // views
        .route("/", get(views::landing))
        .route("/login", get(views::login))
        .route("/admin", get(views::admin))
        .route("/seller", get(views::seller))
        .route("/buyer", get(views::buyer))
        .route("/buyer/disputes", get(views::buyer_disputes))
        .route("/buyer/dispute/new", get(views::new_dispute))
        .route("/dispute", get(views::disputes))
        .route("/blacklist", get(views::blacklist))
        .route("/blacklist/report", get(views::report_form))
        // identity
        .route("/api/auth/sign-up", post(auth::sign_up))
        .route("/api/auth/sign-in", post(auth::sign_in))
        .route("/api/auth/sign-out", post(auth::sign_out))
        .route("/api/auth/me", get(auth::me))
        // seller evidence wizard
        .route("/api/seller/wizard", get(seller::show))
        .route("/api/seller/wizard/tracking", post(seller::set_tracking))
        .route("/api/seller/wizard/advance", post(seller::advance))
        .route("/api/seller/wizard/back", post(seller::back))
        .route("/api/seller/wizard/submit", post(seller::submit))
        .route("/api/seller/wizard/reset", post(seller::reset))
        // buyer verification
        .route("/api/verify/{tracking}", post(verify::open))
        .route("/api/verify/flows/{flow_id}", get(verify::show))
        .route("/api/verify/flows/{flow_id}/record", post(verify::record))
        .route("/api/verify/flows/{flow_id}/finish", post(verify::finish))
        // moderation
        .route("/api/blacklist", get(blacklist::list).post(blacklist::report))
        .route("/api/blacklist/{id}/status", patch(blacklist::set_status))
        .route("/api/blacklist/{id}/landing", post(blacklist::toggle_landing))
        .route("/api/disputes", get(disputes::list_all).post(disputes::file))
        .route("/api/disputes/mine", get(disputes::list_mine))
        .route("/api/disputes/{id}/status", patch(disputes::set_status))
        // realtime
        .route("/api/live", get(live::handle_live))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

pub(crate) fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "message": text.into() }))).into_response()
}

pub(crate) fn store_error_to_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::InvalidValue { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::MissingColumn { .. } | StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn moderation_error_to_status(err: &ModerationError) -> StatusCode {
    match err {
        ModerationError::Forbidden(_) => StatusCode::FORBIDDEN,
        ModerationError::MissingEmail | ModerationError::MissingField(_) => StatusCode::BAD_REQUEST,
        ModerationError::NotFound(_) => StatusCode::NOT_FOUND,
        ModerationError::Store(e) => store_error_to_status(e),
    }
}

fn store_body(prefix: &str, err: &StoreError) -> serde_json::Value {
    serde_json::json!({
        "message": format!("{prefix}: {err}"),
        "code": err.error_code(),
        "retryable": err.retryable(),
    })
}

pub(crate) fn store_failure(prefix: &str, err: &StoreError) -> Response {
    tracing::error!(error = %err, code = err.error_code(), "{prefix}");
    (store_error_to_status(err), Json(store_body(prefix, err))).into_response()
}

pub(crate) fn moderation_failure(prefix: &str, err: &ModerationError) -> Response {
    if let ModerationError::Store(e) = err {
        return store_failure(prefix, e);
    }
    message(moderation_error_to_status(err), format!("{prefix}: {err}"))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
