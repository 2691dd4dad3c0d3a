use super::*;
use crate::model::{OrderStatus, Role};
use crate::store::memory::Fault;
use crate::store::{ChangeFeed, MemoryStore};

fn seller() -> Identity {
    Identity { user_id: Uuid::new_v4(), email: "seller@toko.id".into(), role: Role::Seller }
}

fn wizard_with(store: &Arc<MemoryStore>, identity: Option<Identity>) -> EvidenceWizard {
    EvidenceWizard::new(store.clone(), identity)
}

fn memory() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(ChangeFeed::default()))
}

// =============================================================================
// local transitions
// =============================================================================

#[test]
fn starts_at_identify_with_empty_tracking() {
    let wizard = wizard_with(&memory(), Some(seller()));
    assert_eq!(wizard.step(), WizardStep::Identify);
    assert_eq!(wizard.tracking_id(), "");
    assert!(!wizard.can_advance());
}

#[test]
fn advance_requires_non_empty_tracking() {
    let mut wizard = wizard_with(&memory(), Some(seller()));
    assert!(!wizard.advance_to_capture());
    assert_eq!(wizard.step(), WizardStep::Identify);

    wizard.set_tracking_id("   ");
    assert!(!wizard.advance_to_capture());
    assert_eq!(wizard.step(), WizardStep::Identify);

    wizard.set_tracking_id("anything-goes");
    assert!(wizard.advance_to_capture());
    assert_eq!(wizard.step(), WizardStep::Capture);
}

#[test]
fn back_keeps_tracking_id() {
    let mut wizard = wizard_with(&memory(), Some(seller()));
    wizard.set_tracking_id("SG-1");
    wizard.advance_to_capture();
    assert!(wizard.back_to_identify());
    assert_eq!(wizard.step(), WizardStep::Identify);
    assert_eq!(wizard.tracking_id(), "SG-1");
    assert!(!wizard.back_to_identify());
}

#[tokio::test]
async fn reset_is_idempotent_from_every_step() {
    let store = memory();

    let mut identify = wizard_with(&store, Some(seller()));
    identify.set_tracking_id("SG-1");

    let mut capture = wizard_with(&store, Some(seller()));
    capture.set_tracking_id("SG-2");
    capture.advance_to_capture();

    let mut confirmed = wizard_with(&store, Some(seller()));
    confirmed.set_tracking_id("SG-3");
    confirmed.advance_to_capture();
    confirmed
        .submit_evidence(&CaptureContext::default())
        .await
        .unwrap();
    assert_eq!(confirmed.step(), WizardStep::Confirmed);

    for wizard in [&mut identify, &mut capture, &mut confirmed] {
        for _ in 0..3 {
            wizard.reset_wizard();
            assert_eq!(wizard.step(), WizardStep::Identify);
            assert_eq!(wizard.tracking_id(), "");
            assert!(wizard.view().submission.is_none());
        }
    }
}

// =============================================================================
// submit_evidence
// =============================================================================

#[tokio::test]
async fn submit_records_shipment_and_packing_evidence() {
    let store = memory();
    let identity = seller();
    let seller_id = identity.user_id;
    let mut wizard = wizard_with(&store, Some(identity));
    wizard.set_tracking_id("SG-100");
    wizard.advance_to_capture();

    let submission = wizard
        .submit_evidence(&CaptureContext::default())
        .await
        .unwrap()
        .clone();
    assert_eq!(wizard.step(), WizardStep::Confirmed);

    let orders = store.orders_snapshot().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].seller_id, seller_id);
    assert_eq!(orders[0].tracking_number, "SG-100");
    assert_eq!(orders[0].status, OrderStatus::Shipped);

    let evidences = store.evidences_snapshot().await;
    assert_eq!(evidences.len(), 1);
    assert_eq!(evidences[0].kind, EvidenceKind::Packing);
    assert_eq!(evidences[0].order_id, orders[0].id);
    assert_eq!(evidences[0].uploader_id, Some(seller_id));
    assert_eq!(evidences[0].media_url, PACKING_MEDIA_PLACEHOLDER);
    assert_eq!(evidences[0].metadata.device, "iPhone 15 Pro");
    assert_eq!(evidences[0].metadata.extra.get("fps"), Some(&serde_json::json!(60)));
    assert_eq!(submission.order.id, orders[0].id);
}

#[tokio::test]
async fn evidence_failure_leaves_detectable_orphan_and_stays_in_capture() {
    let store = memory();
    store.fail_next(Fault::InsertEvidence, "storage quota exceeded");
    let mut wizard = wizard_with(&store, Some(seller()));
    wizard.set_tracking_id("SG-200");
    wizard.advance_to_capture();

    let err = wizard
        .submit_evidence(&CaptureContext::default())
        .await
        .unwrap_err();

    assert_eq!(wizard.step(), WizardStep::Capture);
    assert_eq!(wizard.tracking_id(), "SG-200");

    let orders = store.orders_snapshot().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(err.orphan_order_id(), Some(orders[0].id));
    assert!(store.evidences_snapshot().await.is_empty());
    assert_eq!(
        err.user_message(),
        "Failed to upload evidence: store unavailable: storage quota exceeded"
    );
}

#[tokio::test]
async fn order_failure_writes_nothing() {
    let store = memory();
    store.fail_next(Fault::InsertOrder, "timeout");
    let mut wizard = wizard_with(&store, Some(seller()));
    wizard.set_tracking_id("SG-300");
    wizard.advance_to_capture();

    let err = wizard
        .submit_evidence(&CaptureContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WizardError::OrderInsert(_)));
    assert!(err.orphan_order_id().is_none());
    assert_eq!(wizard.step(), WizardStep::Capture);
    assert!(store.orders_snapshot().await.is_empty());
}

#[tokio::test]
async fn submit_without_identity_is_rejected_without_writes() {
    let store = memory();
    let mut wizard = wizard_with(&store, None);
    wizard.set_tracking_id("SG-400");
    wizard.advance_to_capture();

    let err = wizard
        .submit_evidence(&CaptureContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WizardError::NotAuthenticated));
    assert_eq!(wizard.step(), WizardStep::Capture);
    assert!(store.orders_snapshot().await.is_empty());
}

#[tokio::test]
async fn submit_outside_capture_is_wrong_step() {
    let store = memory();
    let mut wizard = wizard_with(&store, Some(seller()));
    wizard.set_tracking_id("SG-500");

    let err = wizard
        .submit_evidence(&CaptureContext::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WizardError::WrongStep { expected: WizardStep::Capture, actual: WizardStep::Identify }
    ));
    assert!(store.orders_snapshot().await.is_empty());
}

#[tokio::test]
async fn confirmed_wizard_rejects_second_submit() {
    let store = memory();
    let mut wizard = wizard_with(&store, Some(seller()));
    wizard.set_tracking_id("SG-600");
    wizard.advance_to_capture();
    wizard
        .submit_evidence(&CaptureContext::default())
        .await
        .unwrap();

    let err = wizard
        .submit_evidence(&CaptureContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WizardError::WrongStep { actual: WizardStep::Confirmed, .. }));
    assert_eq!(store.orders_snapshot().await.len(), 1);
}
