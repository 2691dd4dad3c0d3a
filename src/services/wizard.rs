//! Evidence capture wizard: seller-side shipment registration.
//!
//! DESIGN
//! ======
//! `Identify → Capture → Confirmed`. The wizard is a plain struct holding its
//! store handle and the caller's identity; `AppState` keeps one per seller
//! behind a `tokio::sync::Mutex` so a submit owns the wizard for the duration
//! of its two writes.
//!
//! ERROR HANDLING
//! ==============
//! `submit_evidence` writes the shipment, then the packing evidence. The two
//! inserts are not atomic. When the second fails the shipment stays behind
//! and `WizardError::EvidenceInsert` carries its id; the step never advances
//! on failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::Identity;
use crate::model::{
    Evidence, EvidenceKind, EvidenceMetadata, NewEvidence, NewOrder, Order, PACKING_MEDIA_PLACEHOLDER,
};
use crate::store::{Store, StoreError};

const DEFAULT_DEVICE: &str = "iPhone 15 Pro";
const DEFAULT_LOCATION: &str = "Depok, Indonesia";
const DEFAULT_FPS: u32 = 60;
const DEFAULT_QUALITY: &str = "4K";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Identify,
    Capture,
    Confirmed,
}

/// Capture details reported by the recording device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureContext {
    pub device: String,
    pub location: String,
    pub fps: u32,
    pub quality: String,
}

impl Default for CaptureContext {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.into(),
            location: DEFAULT_LOCATION.into(),
            fps: DEFAULT_FPS,
            quality: DEFAULT_QUALITY.into(),
        }
    }
}

impl CaptureContext {
    fn metadata(&self) -> EvidenceMetadata {
        EvidenceMetadata::captured_now(&self.device, &self.location)
            .with_extra("fps", self.fps)
            .with_extra("quality", self.quality.clone())
    }
}

/// Rows written by a successful submit.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub order: Order,
    pub evidence: Evidence,
}

/// Wire view of the wizard.
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub step: WizardStep,
    pub tracking_id: String,
    pub can_advance: bool,
    pub submission: Option<Submission>,
}

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("please sign in and fill in the tracking number first")]
    NotAuthenticated,
    #[error("tracking number is empty")]
    EmptyTrackingId,
    #[error("wizard is at {actual:?}, expected {expected:?}")]
    WrongStep { expected: WizardStep, actual: WizardStep },
    #[error("a submission is already in progress")]
    InFlight,
    #[error("order insert failed: {0}")]
    OrderInsert(#[source] StoreError),
    #[error("evidence insert failed for order {orphan_order_id}: {source}")]
    EvidenceInsert {
        orphan_order_id: Uuid,
        #[source]
        source: StoreError,
    },
}

impl WizardError {
    /// Alert text shown to the seller.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::OrderInsert(source) | Self::EvidenceInsert { source, .. } => {
                format!("Failed to upload evidence: {source}")
            }
            other => other.to_string(),
        }
    }

    /// Shipment left behind by a half-completed submit, if any.
    #[must_use]
    pub fn orphan_order_id(&self) -> Option<Uuid> {
        match self {
            Self::EvidenceInsert { orphan_order_id, .. } => Some(*orphan_order_id),
            _ => None,
        }
    }
}

// =============================================================================
// WIZARD
// =============================================================================

pub struct EvidenceWizard {
    store: Arc<dyn Store>,
    identity: Option<Identity>,
    step: WizardStep,
    tracking_id: String,
    submission: Option<Submission>,
}

impl EvidenceWizard {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, identity: Option<Identity>) -> Self {
        Self { store, identity, step: WizardStep::Identify, tracking_id: String::new(), submission: None }
    }

    #[must_use]
    pub fn step(&self) -> WizardStep {
        self.step
    }

    #[must_use]
    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    #[must_use]
    pub fn can_advance(&self) -> bool {
        !self.tracking_id.trim().is_empty()
    }

    #[must_use]
    pub fn view(&self) -> WizardView {
        WizardView {
            step: self.step,
            tracking_id: self.tracking_id.clone(),
            can_advance: self.can_advance(),
            submission: self.submission.clone(),
        }
    }

    /// Local edit. No format validation.
    pub fn set_tracking_id(&mut self, value: impl Into<String>) {
        self.tracking_id = value.into();
    }

    /// `Identify → Capture`. Returns whether the transition happened.
    pub fn advance_to_capture(&mut self) -> bool {
        if self.step != WizardStep::Identify || !self.can_advance() {
            return false;
        }
        self.step = WizardStep::Capture;
        true
    }

    /// `Capture → Identify`, keeping the tracking id.
    pub fn back_to_identify(&mut self) -> bool {
        if self.step != WizardStep::Capture {
            return false;
        }
        self.step = WizardStep::Identify;
        true
    }

    /// Clear local fields and return to `Identify` from any step.
    pub fn reset_wizard(&mut self) {
        self.step = WizardStep::Identify;
        self.tracking_id.clear();
        self.submission = None;
    }

    /// Register the shipment and its packing evidence.
    ///
    /// # Errors
    ///
    /// Precondition failures leave everything untouched. Store failures leave
    /// the step at `Capture`; see `WizardError::orphan_order_id`.
    pub async fn submit_evidence(&mut self, capture: &CaptureContext) -> Result<&Submission, WizardError> {
        let Some(identity) = self.identity.clone() else {
            return Err(WizardError::NotAuthenticated);
        };
        if !self.can_advance() {
            return Err(WizardError::EmptyTrackingId);
        }
        if self.step != WizardStep::Capture {
            return Err(WizardError::WrongStep { expected: WizardStep::Capture, actual: self.step });
        }

        // PHASE: SHIPMENT
        let order = self
            .store
            .insert_order(NewOrder::shipped(identity.user_id, self.tracking_id.clone()))
            .await
            .map_err(|e| {
                warn!(error = %e, seller_id = %identity.user_id, tracking = %self.tracking_id, "order insert failed");
                WizardError::OrderInsert(e)
            })?;

        // PHASE: EVIDENCE
        let evidence = self
            .store
            .insert_evidence(NewEvidence {
                order_id: order.id,
                uploader_id: Some(identity.user_id),
                kind: EvidenceKind::Packing,
                media_url: PACKING_MEDIA_PLACEHOLDER.into(),
                metadata: capture.metadata(),
            })
            .await
            .map_err(|e| {
                warn!(error = %e, orphan_order_id = %order.id, "evidence insert failed; shipment left without evidence");
                WizardError::EvidenceInsert { orphan_order_id: order.id, source: e }
            })?;

        info!(order_id = %order.id, evidence_id = %evidence.id, tracking = %order.tracking_number, "packing evidence recorded");
        self.step = WizardStep::Confirmed;
        Ok(self.submission.insert(Submission { order, evidence }))
    }
}

#[cfg(test)]
#[path = "wizard_test.rs"]
mod tests;
