//! Guarded dashboard views.
//!
//! DESIGN
//! ======
//! Every protected view runs the route guard first and only then loads data,
//! so a denied caller never receives any part of the page. `Redirect` turns
//! into a 303 to the guard's target; `Loading` (identity lookup failed) is a
//! 503 the client can retry. Pages are JSON documents tagged with `view`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use serde::{Deserialize, Serialize};

use super::auth::Viewer;
use super::{message, store_failure};
use crate::model::{BlacklistEntry, Dispute, DisputePriority, Role};
use crate::services::auth::Identity;
use crate::services::blacklist::{self as blacklist_svc, BlacklistSummary};
use crate::services::dispute::{self as dispute_svc, DisputeSummary};
use crate::services::{dashboard, guard};
use crate::services::guard::GuardDecision;
use crate::state::AppState;

#[derive(Serialize)]
struct Page<T> {
    view: &'static str,
    #[serde(flatten)]
    body: T,
}

fn page<T: Serialize>(view: &'static str, body: T) -> Response {
    Json(Page { view, body }).into_response()
}

/// Apply the guard. `Ok` carries the identity for a rendered view.
fn admit(viewer: &Viewer, roles: &[Role]) -> Result<Identity, Response> {
    match guard::evaluate(&viewer.0, Some(roles)) {
        GuardDecision::Loading => Err(message(StatusCode::SERVICE_UNAVAILABLE, "Loading...")),
        GuardDecision::Redirect(route) => Err(Redirect::to(route.path()).into_response()),
        GuardDecision::Render => viewer
            .0
            .identity()
            .cloned()
            .ok_or_else(|| Redirect::to(guard::Route::Login.path()).into_response()),
    }
}

// =============================================================================
// PUBLIC
// =============================================================================

/// `GET /`: landing counters and promoted blacklist entries.
pub async fn landing(State(state): State<AppState>) -> Response {
    match dashboard::landing(state.store.as_ref()).await {
        Ok(body) => page("landing", body),
        Err(e) => store_failure("Failed to load landing page", &e),
    }
}

/// `GET /login`: where the guard sends anonymous callers.
pub async fn login() -> Response {
    page("login", serde_json::json!({ "sign_in": "/api/auth/sign-in", "sign_up": "/api/auth/sign-up" }))
}

// =============================================================================
// DASHBOARDS
// =============================================================================

/// `GET /admin`
pub async fn admin(State(state): State<AppState>, viewer: Viewer) -> Response {
    if let Err(denied) = admit(&viewer, guard::ADMIN) {
        return denied;
    }
    match dashboard::admin(state.store.as_ref()).await {
        Ok(body) => page("admin", body),
        Err(e) => store_failure("Failed to load admin dashboard", &e),
    }
}

/// `GET /seller`
pub async fn seller(State(state): State<AppState>, viewer: Viewer) -> Response {
    let identity = match admit(&viewer, guard::SELLER) {
        Ok(identity) => identity,
        Err(denied) => return denied,
    };
    match dashboard::seller(state.store.as_ref(), &identity).await {
        Ok(body) => page("seller", body),
        Err(e) => store_failure("Failed to load seller dashboard", &e),
    }
}

/// `GET /buyer`
pub async fn buyer(State(state): State<AppState>, viewer: Viewer) -> Response {
    let identity = match admit(&viewer, guard::BUYER) {
        Ok(identity) => identity,
        Err(denied) => return denied,
    };
    match dashboard::buyer(state.store.as_ref(), &identity).await {
        Ok(body) => page("buyer", body),
        Err(e) => store_failure("Failed to load buyer dashboard", &e),
    }
}

// =============================================================================
// DISPUTES
// =============================================================================

#[derive(Serialize)]
struct DisputeList {
    disputes: Vec<Dispute>,
    summary: DisputeSummary,
}

/// `GET /buyer/disputes`: the caller's own disputes.
pub async fn buyer_disputes(State(state): State<AppState>, viewer: Viewer) -> Response {
    let identity = match admit(&viewer, guard::BUYER) {
        Ok(identity) => identity,
        Err(denied) => return denied,
    };
    match dispute_svc::list_mine(state.store.as_ref(), &identity).await {
        Ok(disputes) => {
            let summary = dispute_svc::summary(&disputes);
            page("buyer_disputes", DisputeList { disputes, summary })
        }
        Err(e) => store_failure("Failed to load disputes", &e),
    }
}

/// `GET /buyer/dispute/new`: form defaults for filing a dispute.
pub async fn new_dispute(viewer: Viewer) -> Response {
    if let Err(denied) = admit(&viewer, guard::BUYER) {
        return denied;
    }
    page(
        "new_dispute",
        serde_json::json!({
            "priority": DisputePriority::default(),
            "priorities": [DisputePriority::Low, DisputePriority::Medium, DisputePriority::High],
        }),
    )
}

/// `GET /dispute`: every dispute, for mediation.
pub async fn disputes(State(state): State<AppState>, viewer: Viewer) -> Response {
    let identity = match admit(&viewer, guard::ADMIN_OR_SELLER) {
        Ok(identity) => identity,
        Err(denied) => return denied,
    };
    match dispute_svc::list_all(state.store.as_ref(), &identity).await {
        Ok(disputes) => {
            let summary = dispute_svc::summary(&disputes);
            page("disputes", DisputeList { disputes, summary })
        }
        Err(e) => super::moderation_failure("Failed to load disputes", &e),
    }
}

// =============================================================================
// BLACKLIST
// =============================================================================

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    search: Option<String>,
}

impl SearchQuery {
    pub(crate) fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }
}

#[derive(Serialize)]
pub(crate) struct BlacklistPage {
    pub entries: Vec<BlacklistEntry>,
    pub summary: BlacklistSummary,
}

pub(crate) async fn load_blacklist(
    state: &AppState,
    role: Role,
    search: Option<&str>,
) -> Result<BlacklistPage, crate::store::StoreError> {
    let entries = blacklist_svc::list(state.store.as_ref(), role, search).await?;
    let summary = blacklist_svc::summary(state.store.as_ref(), &entries).await?;
    Ok(BlacklistPage { entries, summary })
}

/// `GET /blacklist?search=`
pub async fn blacklist(State(state): State<AppState>, viewer: Viewer, Query(q): Query<SearchQuery>) -> Response {
    let identity = match admit(&viewer, guard::ADMIN_OR_SELLER) {
        Ok(identity) => identity,
        Err(denied) => return denied,
    };
    match load_blacklist(&state, identity.role, q.search()).await {
        Ok(body) => page("blacklist", body),
        Err(e) => store_failure("Failed to load blacklist", &e),
    }
}

/// `GET /blacklist/report`: form defaults for a new report.
pub async fn report_form(viewer: Viewer) -> Response {
    if let Err(denied) = admit(&viewer, guard::SELLER) {
        return denied;
    }
    page("report", serde_json::json!({ "platform": blacklist_svc::DEFAULT_PLATFORM }))
}

#[cfg(test)]
#[path = "views_test.rs"]
mod tests;
