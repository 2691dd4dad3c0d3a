use super::*;
use crate::model::{
    Dispute, DisputePriority, DisputeStatus, EvidenceMetadata, NewAccount, NewEvidence, NewOrder, Role,
};
use crate::services::blacklist::BlacklistReport;
use crate::services::dispute::DisputeForm;
use crate::store::{ChangeFeed, MemoryStore};

async fn account(store: &MemoryStore, email: &str, role: Role) -> Identity {
    let profile = store
        .insert_account(NewAccount {
            email: email.into(),
            full_name: "Test".into(),
            role,
            password_hash: "x".into(),
        })
        .await
        .unwrap();
    Identity::from_profile(&profile)
}

async fn order(store: &MemoryStore, seller: &Identity, tracking: &str, price: i64, buyer: &str) -> Order {
    let order = store
        .insert_order(NewOrder::shipped(seller.user_id, tracking))
        .await
        .unwrap();
    store
        .set_order_fields(order.id, Some(price), Some(buyer))
        .await;
    order
}

async fn open_dispute(store: &MemoryStore, buyer: &Identity) -> Dispute {
    dispute::file(
        store,
        buyer,
        DisputeForm {
            order_id: None,
            resi: "SG-1".into(),
            reason: "Damaged".into(),
            description: String::new(),
            priority: DisputePriority::default(),
        },
    )
    .await
    .unwrap()
}

async fn verified_entry(store: &MemoryStore, seller: &Identity, admin: &Identity, name: &str) -> BlacklistEntry {
    let entry = blacklist::report(
        store,
        seller,
        BlacklistReport {
            subject_name: name.into(),
            platform: None,
            reason: "Fake claim".into(),
            description: None,
        },
    )
    .await
    .unwrap();
    blacklist::set_status(store, admin, entry.id, BlacklistStatus::Verified)
        .await
        .unwrap();
    entry
}

// =============================================================================
// formatting
// =============================================================================

#[test]
fn revenue_is_millions_with_one_decimal() {
    assert_eq!(format_revenue(0), "Rp 0.0M");
    assert_eq!(format_revenue(12_500_000), "Rp 12.5M");
    assert_eq!(format_revenue(1_249_999), "Rp 1.2M");
    assert_eq!(format_revenue(1_250_000), "Rp 1.3M");
}

#[test]
fn price_uses_dot_thousands() {
    assert_eq!(format_price(0), "Rp 0");
    assert_eq!(format_price(999), "Rp 999");
    assert_eq!(format_price(1_250_000), "Rp 1.250.000");
    assert_eq!(format_price(12_345), "Rp 12.345");
}

#[test]
fn trust_levels_by_threshold() {
    assert_eq!(trust_level(100), TrustLevel::Elite);
    assert_eq!(trust_level(90), TrustLevel::Elite);
    assert_eq!(trust_level(75), TrustLevel::Trusted);
    assert_eq!(trust_level(50), TrustLevel::Safe);
    assert_eq!(trust_level(10), TrustLevel::Risky);
}

// =============================================================================
// seller
// =============================================================================

#[tokio::test]
async fn seller_counts_own_orders_and_revenue() {
    let store = MemoryStore::new(ChangeFeed::default());
    let owner = account(&store, "tokobudi@x.id", Role::Seller).await;
    let other = account(&store, "other@x.id", Role::Seller).await;
    order(&store, &owner, "SG-1", 1_000_000, "b@x.id").await;
    order(&store, &owner, "SG-2", 1_500_000, "b@x.id").await;
    order(&store, &other, "SG-3", 9_000_000, "b@x.id").await;

    let dash = super::seller(&store, &owner).await.unwrap();
    assert_eq!(dash.display_name, "tokobudi");
    assert_eq!(dash.total_protected, 2);
    assert_eq!(dash.saved_revenue, "Rp 2.5M");
}

#[tokio::test]
async fn seller_display_name_prefers_shop_name() {
    let store = MemoryStore::new(ChangeFeed::default());
    let identity = account(&store, "s@x.id", Role::Seller).await;
    store
        .set_profile_shop(identity.user_id, Some("Toko Maju"), 100)
        .await;
    assert_eq!(super::seller(&store, &identity).await.unwrap().display_name, "Toko Maju");
}

#[tokio::test]
async fn seller_sees_global_open_disputes_and_verified_blacklist() {
    let store = MemoryStore::new(ChangeFeed::default());
    let identity = account(&store, "s@x.id", Role::Seller).await;
    let admin = account(&store, "a@x.id", Role::Admin).await;
    let buyer = account(&store, "b@x.id", Role::Buyer).await;
    let resolved = open_dispute(&store, &buyer).await;
    open_dispute(&store, &buyer).await;
    dispute::set_status(&store, &admin, resolved.id, DisputeStatus::Resolved)
        .await
        .unwrap();
    for name in ["A", "B", "C", "D"] {
        verified_entry(&store, &identity, &admin, name).await;
    }

    let dash = super::seller(&store, &identity).await.unwrap();
    assert_eq!(dash.ongoing_disputes, 1);
    assert_eq!(dash.fraud_attempts, 4);
    assert_eq!(dash.verified_blacklist.len(), 3);
}

// =============================================================================
// buyer
// =============================================================================

#[tokio::test]
async fn buyer_dashboard_aggregates_recent_orders() {
    let store = MemoryStore::new(ChangeFeed::default());
    let seller = account(&store, "s@x.id", Role::Seller).await;
    let buyer = account(&store, "b@x.id", Role::Buyer).await;
    let mut orders = Vec::new();
    for n in 0..6 {
        orders.push(order(&store, &seller, &format!("SG-{n}"), 10_000, "b@x.id").await);
    }
    order(&store, &seller, "SG-X", 10_000, "someone@x.id").await;
    store
        .update_order_status(orders[5].id, OrderStatus::Delivered)
        .await
        .unwrap();
    // The oldest order falls outside the recent window.
    store
        .update_order_status(orders[0].id, OrderStatus::Delivered)
        .await
        .unwrap();
    store
        .insert_evidence(NewEvidence {
            order_id: orders[5].id,
            uploader_id: Some(buyer.user_id),
            kind: EvidenceKind::Unboxing,
            media_url: "x".into(),
            metadata: EvidenceMetadata::captured_now("Android", "Home"),
        })
        .await
        .unwrap();
    open_dispute(&store, &buyer).await;

    let dash = super::buyer(&store, &buyer).await.unwrap();
    assert_eq!(dash.recent_orders.len(), 5);
    assert_eq!(dash.recent_orders[0].tracking_number, "SG-5");
    assert_eq!(dash.recent_orders[0].status_label, "Received");
    assert_eq!(dash.recent_orders[0].store, "Toko Online");
    assert_eq!(dash.recent_orders[0].amount, "Rp 10.000");
    assert_eq!(dash.total_received, 1);
    assert_eq!(dash.total_unboxing, 1);
    assert_eq!(dash.active_disputes, 1);
    assert_eq!(dash.trust_score, 100);
    assert_eq!(dash.trust_level, TrustLevel::Elite);
}

#[tokio::test]
async fn buyer_trust_score_comes_from_profile() {
    let store = MemoryStore::new(ChangeFeed::default());
    let buyer = account(&store, "b@x.id", Role::Buyer).await;
    store.set_profile_shop(buyer.user_id, None, 42).await;

    let dash = super::buyer(&store, &buyer).await.unwrap();
    assert_eq!(dash.trust_score, 42);
    assert_eq!(dash.trust_level, TrustLevel::Risky);
    assert!(dash.recent_orders.is_empty());
    assert_eq!(dash.total_unboxing, 0);
}

// =============================================================================
// admin and landing
// =============================================================================

#[tokio::test]
async fn admin_dashboard_reads_queue_and_stats() {
    let store = MemoryStore::new(ChangeFeed::default());
    let seller = account(&store, "s@x.id", Role::Seller).await;
    let admin_id = account(&store, "a@x.id", Role::Admin).await;
    verified_entry(&store, &seller, &admin_id, "A").await;
    blacklist::report(
        &store,
        &seller,
        BlacklistReport { subject_name: "B".into(), platform: None, reason: "r".into(), description: None },
    )
    .await
    .unwrap();
    store.set_stat(STAT_TOTAL_RESOLVED_DISPUTES, 17).await;

    let dash = admin(&store).await.unwrap();
    assert_eq!(dash.pending, 1);
    assert_eq!(dash.pending_reports[0].subject_name, "B");
    assert_eq!(dash.blacklisted, 1);
    assert_eq!(dash.total_resolved_disputes, 17);
    assert_eq!(dash.total_fraud_blocked, 0);
}

#[tokio::test]
async fn landing_defaults_user_count_until_populated() {
    let store = MemoryStore::new(ChangeFeed::default());
    assert_eq!(landing(&store).await.unwrap().total_umkm_users, 10_000);
    store.set_stat(STAT_TOTAL_UMKM_USERS, 12_345).await;
    assert_eq!(landing(&store).await.unwrap().total_umkm_users, 12_345);
}

#[tokio::test]
async fn landing_features_only_promoted_entries() {
    let store = MemoryStore::new(ChangeFeed::default());
    let seller = account(&store, "s@x.id", Role::Seller).await;
    let admin_id = account(&store, "a@x.id", Role::Admin).await;
    let promoted = verified_entry(&store, &seller, &admin_id, "A").await;
    verified_entry(&store, &seller, &admin_id, "B").await;
    blacklist::toggle_landing(&store, &admin_id, promoted.id)
        .await
        .unwrap();

    let page = landing(&store).await.unwrap();
    assert_eq!(page.featured_blacklist.len(), 1);
    assert_eq!(page.featured_blacklist[0].id, promoted.id);
}
