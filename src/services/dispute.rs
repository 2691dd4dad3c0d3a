//! Dispute filing and resolution.
//!
//! Buyers file, admins and sellers resolve. Like blacklist verdicts, status
//! changes are plain overwrites.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::auth::Identity;
use super::guard;
use super::moderation::{ModerationError, require_role, required};
use crate::model::{Dispute, DisputePriority, DisputeStatus, NewDispute};
use crate::store::{DisputeFilter, Store, StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct DisputeForm {
    #[serde(default)]
    pub order_id: Option<String>,
    pub resi: String,
    pub reason: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: DisputePriority,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DisputeSummary {
    pub total: usize,
    pub won: usize,
    pub pending: usize,
    pub lost: usize,
}

/// File a dispute as the signed-in buyer.
///
/// # Errors
///
/// `MissingEmail` when the identity has no email on record.
pub async fn file(store: &dyn Store, identity: &Identity, form: DisputeForm) -> Result<Dispute, ModerationError> {
    require_role(identity, guard::BUYER, "only buyer accounts may file disputes")?;
    if identity.email.trim().is_empty() {
        return Err(ModerationError::MissingEmail);
    }

    let dispute = store
        .insert_dispute(NewDispute {
            buyer_id: identity.user_id,
            buyer_email: identity.email.clone(),
            order_id: form
                .order_id
                .map(|o| o.trim().to_owned())
                .filter(|o| !o.is_empty()),
            resi: required(&form.resi, "resi")?,
            reason: required(&form.reason, "reason")?,
            description: form.description.trim().to_owned(),
            priority: form.priority,
            status: DisputeStatus::Pending,
        })
        .await?;

    info!(dispute_id = %dispute.id, buyer_id = %identity.user_id, "dispute filed");
    Ok(dispute)
}

pub async fn list_mine(store: &dyn Store, identity: &Identity) -> Result<Vec<Dispute>, StoreError> {
    store
        .list_disputes(&DisputeFilter { buyer_id: Some(identity.user_id), ..DisputeFilter::default() })
        .await
}

/// Every dispute, newest first. Admins and sellers only.
pub async fn list_all(store: &dyn Store, identity: &Identity) -> Result<Vec<Dispute>, ModerationError> {
    require_role(identity, guard::ADMIN_OR_SELLER, "only admins and sellers may review disputes")?;
    Ok(store.list_disputes(&DisputeFilter::default()).await?)
}

pub async fn set_status(
    store: &dyn Store,
    identity: &Identity,
    id: Uuid,
    status: DisputeStatus,
) -> Result<(), ModerationError> {
    require_role(identity, guard::ADMIN_OR_SELLER, "only admins and sellers may resolve disputes")?;
    store.update_dispute_status(id, status).await?;
    info!(dispute_id = %id, status = status.as_str(), by = %identity.user_id, "dispute status set");
    Ok(())
}

/// Pending or in-review disputes, optionally for one buyer.
pub async fn count_open(store: &dyn Store, buyer_id: Option<Uuid>) -> Result<usize, StoreError> {
    let filter = DisputeFilter { buyer_id, statuses: Some(DisputeStatus::OPEN.to_vec()), limit: None };
    Ok(store.list_disputes(&filter).await?.len())
}

#[must_use]
pub fn summary(disputes: &[Dispute]) -> DisputeSummary {
    disputes.iter().fold(
        DisputeSummary { total: disputes.len(), ..DisputeSummary::default() },
        |mut acc, d| {
            match d.status {
                DisputeStatus::Resolved => acc.won += 1,
                DisputeStatus::Pending | DisputeStatus::InReview => acc.pending += 1,
                DisputeStatus::Rejected => acc.lost += 1,
            }
            acc
        },
    )
}

#[cfg(test)]
#[path = "dispute_test.rs"]
mod tests;
