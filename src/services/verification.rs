//! Unboxing verification flow: buyer side of a shipment.
//!
//! DESIGN
//! ======
//! `open` looks the order up by exact tracking number and returns no flow at
//! all when it is missing, so "not found" is a terminal display state outside
//! the `Review → Recording → Done` machine. The seller's packing evidence is
//! optional context for the buyer.
//!
//! TRADE-OFFS
//! ==========
//! `finish_and_lock` inserts the unboxing evidence and then marks the order
//! delivered, as two separate writes. A failed status update leaves the
//! evidence in place with the order still `shipped`; the error names the
//! evidence row so the mismatch can be found later.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::Identity;
use crate::model::{
    Evidence, EvidenceKind, EvidenceMetadata, NewEvidence, Order, OrderStatus, UNBOXING_MEDIA_PLACEHOLDER,
};
use crate::store::{Store, StoreError};

const DEFAULT_DEVICE: &str = "Android Phone";
const DEFAULT_LOCATION: &str = "Customer Location";
const SENSOR_LOCKED: &str = "Locked";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Review,
    Recording,
    Done,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UnboxingContext {
    pub device: String,
    pub location: String,
}

impl Default for UnboxingContext {
    fn default() -> Self {
        Self { device: DEFAULT_DEVICE.into(), location: DEFAULT_LOCATION.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("flow is at {actual:?}, expected {expected:?}")]
    WrongStep { expected: FlowStep, actual: FlowStep },
    #[error("evidence insert failed: {0}")]
    EvidenceInsert(#[source] StoreError),
    #[error("order {order_id} not marked delivered after evidence {evidence_id}: {source}")]
    StatusUpdate {
        order_id: Uuid,
        evidence_id: Uuid,
        #[source]
        source: StoreError,
    },
}

impl VerifyError {
    /// Alert text shown to the buyer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EvidenceInsert(source) | Self::StatusUpdate { source, .. } => {
                format!("Failed to lock evidence: {source}")
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowView {
    pub flow_id: Uuid,
    pub step: FlowStep,
    pub order: Order,
    pub seller_evidence: Option<Evidence>,
    pub unboxing_evidence: Option<Evidence>,
}

pub struct UnboxingFlow {
    store: Arc<dyn Store>,
    identity: Option<Identity>,
    id: Uuid,
    step: FlowStep,
    order: Order,
    seller_evidence: Option<Evidence>,
    unboxing_evidence: Option<Evidence>,
}

impl UnboxingFlow {
    /// Fetch the order and its packing evidence.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` for a missing order or a failed lookup; no flow exists
    /// in that case.
    pub async fn open(
        store: Arc<dyn Store>,
        identity: Option<Identity>,
        tracking_number: &str,
    ) -> Result<Self, VerifyError> {
        let order = match store.find_order_by_tracking(tracking_number).await {
            Ok(Some(order)) => order,
            Ok(None) => return Err(VerifyError::OrderNotFound(tracking_number.to_owned())),
            Err(e) => {
                warn!(error = %e, tracking = tracking_number, "order lookup failed");
                return Err(VerifyError::OrderNotFound(tracking_number.to_owned()));
            }
        };

        let seller_evidence = match store.find_evidence(order.id, EvidenceKind::Packing).await {
            Ok(evidence) => evidence,
            Err(e) => {
                warn!(error = %e, order_id = %order.id, "packing evidence lookup failed");
                None
            }
        };

        Ok(Self {
            store,
            identity,
            id: Uuid::new_v4(),
            step: FlowStep::Review,
            order,
            seller_evidence,
            unboxing_evidence: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn step(&self) -> FlowStep {
        self.step
    }

    #[must_use]
    pub fn seller_evidence(&self) -> Option<&Evidence> {
        self.seller_evidence.as_ref()
    }

    #[must_use]
    pub fn view(&self) -> FlowView {
        FlowView {
            flow_id: self.id,
            step: self.step,
            order: self.order.clone(),
            seller_evidence: self.seller_evidence.clone(),
            unboxing_evidence: self.unboxing_evidence.clone(),
        }
    }

    /// `Review → Recording`.
    ///
    /// # Errors
    ///
    /// `WrongStep` from any other step.
    pub fn start_recording(&mut self) -> Result<(), VerifyError> {
        if self.step != FlowStep::Review {
            return Err(VerifyError::WrongStep { expected: FlowStep::Review, actual: self.step });
        }
        self.step = FlowStep::Recording;
        Ok(())
    }

    /// Lock the unboxing evidence and mark the order delivered.
    ///
    /// # Errors
    ///
    /// `WrongStep` unless recording. Store failures keep the step at
    /// `Recording`.
    pub async fn finish_and_lock(&mut self, capture: &UnboxingContext) -> Result<&Evidence, VerifyError> {
        if self.step != FlowStep::Recording {
            return Err(VerifyError::WrongStep { expected: FlowStep::Recording, actual: self.step });
        }

        let evidence = self
            .store
            .insert_evidence(NewEvidence {
                order_id: self.order.id,
                uploader_id: self.identity.as_ref().map(|i| i.user_id),
                kind: EvidenceKind::Unboxing,
                media_url: UNBOXING_MEDIA_PLACEHOLDER.into(),
                metadata: EvidenceMetadata::captured_now(&capture.device, &capture.location)
                    .with_extra("sensor_status", SENSOR_LOCKED),
            })
            .await
            .map_err(|e| {
                warn!(error = %e, order_id = %self.order.id, "unboxing evidence insert failed");
                VerifyError::EvidenceInsert(e)
            })?;

        if let Err(e) = self
            .store
            .update_order_status(self.order.id, OrderStatus::Delivered)
            .await
        {
            warn!(error = %e, order_id = %self.order.id, evidence_id = %evidence.id, "order status left stale");
            return Err(VerifyError::StatusUpdate { order_id: self.order.id, evidence_id: evidence.id, source: e });
        }

        info!(order_id = %self.order.id, evidence_id = %evidence.id, "unboxing evidence locked");
        self.order.status = OrderStatus::Delivered;
        self.step = FlowStep::Done;
        Ok(self.unboxing_evidence.insert(evidence))
    }
}

#[cfg(test)]
#[path = "verification_test.rs"]
mod tests;
