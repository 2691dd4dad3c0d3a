//! Seller evidence wizard endpoints.
//!
//! Each seller has one wizard parked in `AppState`. Step changes take the
//! wizard's mutex normally; `submit` uses `try_lock` so a second submit while
//! one is still writing is refused with 409 instead of queueing behind it.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use super::auth::AuthUser;
use super::{message, store_error_to_status};
use crate::services::guard;
use crate::services::wizard::{CaptureContext, WizardError, WizardView};
use crate::state::{AppState, SharedWizard};

async fn seller_wizard(state: &AppState, auth: &AuthUser) -> Result<SharedWizard, Response> {
    if !guard::SELLER.contains(&auth.identity.role) {
        return Err(message(StatusCode::FORBIDDEN, "only seller accounts may register shipments"));
    }
    Ok(state.wizard_for(&auth.identity).await)
}

pub(crate) fn wizard_error_to_status(err: &WizardError) -> StatusCode {
    match err {
        WizardError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        WizardError::EmptyTrackingId => StatusCode::BAD_REQUEST,
        WizardError::WrongStep { .. } | WizardError::InFlight => StatusCode::CONFLICT,
        WizardError::OrderInsert(e) | WizardError::EvidenceInsert { source: e, .. } => match store_error_to_status(e) {
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_GATEWAY,
        },
    }
}

#[derive(Serialize)]
struct StepResponse {
    moved: bool,
    wizard: WizardView,
}

/// `GET /api/seller/wizard`
pub async fn show(State(state): State<AppState>, auth: AuthUser) -> Response {
    let wizard = match seller_wizard(&state, &auth).await {
        Ok(w) => w,
        Err(denied) => return denied,
    };
    let view = wizard.lock().await.view();
    Json(view).into_response()
}

#[derive(Deserialize)]
pub struct TrackingRequest {
    tracking_id: String,
}

/// `POST /api/seller/wizard/tracking`
pub async fn set_tracking(State(state): State<AppState>, auth: AuthUser, Json(req): Json<TrackingRequest>) -> Response {
    let wizard = match seller_wizard(&state, &auth).await {
        Ok(w) => w,
        Err(denied) => return denied,
    };
    let mut wizard = wizard.lock().await;
    wizard.set_tracking_id(req.tracking_id);
    Json(wizard.view()).into_response()
}

/// `POST /api/seller/wizard/advance`
pub async fn advance(State(state): State<AppState>, auth: AuthUser) -> Response {
    let wizard = match seller_wizard(&state, &auth).await {
        Ok(w) => w,
        Err(denied) => return denied,
    };
    let mut wizard = wizard.lock().await;
    let moved = wizard.advance_to_capture();
    Json(StepResponse { moved, wizard: wizard.view() }).into_response()
}

/// `POST /api/seller/wizard/back`
pub async fn back(State(state): State<AppState>, auth: AuthUser) -> Response {
    let wizard = match seller_wizard(&state, &auth).await {
        Ok(w) => w,
        Err(denied) => return denied,
    };
    let mut wizard = wizard.lock().await;
    let moved = wizard.back_to_identify();
    Json(StepResponse { moved, wizard: wizard.view() }).into_response()
}

/// `POST /api/seller/wizard/submit`: register the shipment and packing evidence.
pub async fn submit(State(state): State<AppState>, auth: AuthUser, Json(capture): Json<CaptureContext>) -> Response {
    let wizard = match seller_wizard(&state, &auth).await {
        Ok(w) => w,
        Err(denied) => return denied,
    };
    let Ok(mut wizard) = wizard.try_lock() else {
        let err = WizardError::InFlight;
        return message(wizard_error_to_status(&err), err.user_message());
    };

    let outcome = wizard.submit_evidence(&capture).await.map(|_| ());
    match outcome {
        Ok(()) => (StatusCode::CREATED, Json(wizard.view())).into_response(),
        Err(e) => {
            let status = wizard_error_to_status(&e);
            if status.is_server_error() {
                tracing::error!(
                    error = %e,
                    seller_id = %auth.identity.user_id,
                    tracking = wizard.tracking_id(),
                    step = ?wizard.step(),
                    "evidence submission failed"
                );
            }
            let body = serde_json::json!({
                "message": e.user_message(),
                "orphan_order_id": e.orphan_order_id(),
            });
            (status, Json(body)).into_response()
        }
    }
}

/// `POST /api/seller/wizard/reset`
pub async fn reset(State(state): State<AppState>, auth: AuthUser) -> Response {
    let wizard = match seller_wizard(&state, &auth).await {
        Ok(w) => w,
        Err(denied) => return denied,
    };
    let mut wizard = wizard.lock().await;
    wizard.reset_wizard();
    Json(wizard.view()).into_response()
}

#[cfg(test)]
#[path = "seller_test.rs"]
mod tests;
