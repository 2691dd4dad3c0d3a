//! Blacklist reporting and moderation.
//!
//! DESIGN
//! ======
//! Sellers report, admins rule. Verdicts are direct overwrites with no
//! transition guard: an entry can move between any statuses any number of
//! times. Everyone except admins only ever sees `verified` entries.
//!
//! SCHEMA FALLBACK
//! ===============
//! Deployments migrated before `blacklist.description` existed reject inserts
//! naming that column. The store reports this as
//! `StoreError::MissingColumn { column: "description" }` and `report` retries
//! once without the description. Any other error is final.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Time};
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::Identity;
use super::guard;
use super::moderation::{ModerationError, require_role, required};
use crate::model::{BlacklistEntry, BlacklistStatus, NewBlacklistEntry, Role};
use crate::store::{BlacklistFilter, Store, StoreError};

pub const DEFAULT_PLATFORM: &str = "Shopee";
pub const FEED_LIMIT: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct BlacklistReport {
    pub subject_name: String,
    #[serde(default)]
    pub platform: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlacklistSummary {
    pub total: usize,
    pub verified: usize,
    pub today: usize,
    pub avg_score: i64,
}

// =============================================================================
// REPORTING
// =============================================================================

/// File a report as a seller.
///
/// # Errors
///
/// `Forbidden` unless the reporter's stored profile is a seller.
pub async fn report(
    store: &dyn Store,
    identity: &Identity,
    form: BlacklistReport,
) -> Result<BlacklistEntry, ModerationError> {
    // Role comes from the stored profile, not the session snapshot.
    let profile = store.get_profile(identity.user_id).await?;
    if profile.map(|p| p.role) != Some(Role::Seller) {
        return Err(ModerationError::Forbidden("only seller accounts may report"));
    }

    let platform = form
        .platform
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PLATFORM)
        .to_owned();
    let entry = NewBlacklistEntry {
        reported_by: identity.user_id,
        subject_name: required(&form.subject_name, "subject_name")?,
        platform,
        reason: required(&form.reason, "reason")?,
        status: BlacklistStatus::Pending,
        description: form
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty()),
    };

    let created = match store.insert_blacklist(entry.clone()).await {
        Ok(created) => created,
        Err(StoreError::MissingColumn { column: "description", .. }) => {
            warn!(reporter = %identity.user_id, "blacklist schema lacks description; retrying without it");
            store
                .insert_blacklist(NewBlacklistEntry { description: None, ..entry })
                .await?
        }
        Err(e) => return Err(e.into()),
    };

    info!(entry_id = %created.id, reporter = %identity.user_id, "blacklist report filed");
    Ok(created)
}

// =============================================================================
// MODERATION
// =============================================================================

/// Overwrite an entry's status.
pub async fn set_status(
    store: &dyn Store,
    identity: &Identity,
    id: Uuid,
    status: BlacklistStatus,
) -> Result<(), ModerationError> {
    require_role(identity, guard::ADMIN, "only admins may rule on reports")?;
    store.update_blacklist_status(id, status).await?;
    info!(entry_id = %id, status = status.as_str(), admin = %identity.user_id, "blacklist status set");
    Ok(())
}

/// Flip `show_on_landing_page`, returning the new value.
pub async fn toggle_landing(store: &dyn Store, identity: &Identity, id: Uuid) -> Result<bool, ModerationError> {
    require_role(identity, guard::ADMIN, "only admins may curate the landing page")?;
    let Some(entry) = store.get_blacklist(id).await? else {
        return Err(ModerationError::NotFound(id));
    };
    let show = !entry.show_on_landing_page;
    store.set_blacklist_landing(id, show).await?;
    Ok(show)
}

// =============================================================================
// QUERIES
// =============================================================================

/// Entries visible to `role`, newest first, optionally narrowed by a
/// case-insensitive match on subject name or reason.
pub async fn list(store: &dyn Store, role: Role, search: Option<&str>) -> Result<Vec<BlacklistEntry>, StoreError> {
    let filter = if role == Role::Admin {
        BlacklistFilter::default()
    } else {
        BlacklistFilter::with_status(BlacklistStatus::Verified)
    };
    let entries = store.list_blacklist(&filter).await?;

    let Some(needle) = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()) else {
        return Ok(entries);
    };
    Ok(entries
        .into_iter()
        .filter(|e| e.subject_name.to_lowercase().contains(&needle) || e.reason.to_lowercase().contains(&needle))
        .collect())
}

/// Pending reports awaiting an admin verdict.
pub async fn pending_queue(store: &dyn Store) -> Result<Vec<BlacklistEntry>, StoreError> {
    store
        .list_blacklist(&BlacklistFilter::with_status(BlacklistStatus::Pending))
        .await
}

pub async fn count_with_status(store: &dyn Store, status: BlacklistStatus) -> Result<usize, StoreError> {
    Ok(store
        .list_blacklist(&BlacklistFilter::with_status(status))
        .await?
        .len())
}

/// Header counters for the blacklist page. `avg_score` is over `listed`.
pub async fn summary(store: &dyn Store, listed: &[BlacklistEntry]) -> Result<BlacklistSummary, StoreError> {
    let verified = count_with_status(store, BlacklistStatus::Verified).await?;
    let midnight = OffsetDateTime::now_utc().replace_time(Time::MIDNIGHT);
    let today = store
        .list_blacklist(&BlacklistFilter { created_since: Some(midnight), ..BlacklistFilter::default() })
        .await?
        .len();

    Ok(BlacklistSummary { total: verified, verified, today, avg_score: average_score(listed) })
}

#[must_use]
pub fn average_score(entries: &[BlacklistEntry]) -> i64 {
    if entries.is_empty() {
        return 0;
    }
    let sum: i64 = entries.iter().map(|e| i64::from(e.trust_score)).sum();
    let len = i64::try_from(entries.len()).unwrap_or(i64::MAX);
    // Scores are non-negative; this rounds half up.
    (sum * 2 + len) / (2 * len)
}

/// Three newest verified entries (dashboard sidebar).
pub async fn verified_feed(store: &dyn Store) -> Result<Vec<BlacklistEntry>, StoreError> {
    store
        .list_blacklist(&BlacklistFilter::with_status(BlacklistStatus::Verified).limit(FEED_LIMIT))
        .await
}

/// Verified entries an admin has promoted to the landing page.
pub async fn landing_feed(store: &dyn Store) -> Result<Vec<BlacklistEntry>, StoreError> {
    let filter = BlacklistFilter {
        show_on_landing_page: Some(true),
        ..BlacklistFilter::with_status(BlacklistStatus::Verified)
    }
    .limit(FEED_LIMIT);
    store.list_blacklist(&filter).await
}

#[cfg(test)]
#[path = "blacklist_test.rs"]
mod tests;
