//! End-to-end webhook reconciliation scenarios: signed deliveries through the
//! HTTP boundary, duplicate and out-of-order redelivery, and unknown-entity
//! handling.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use billsync::billing::{InMemoryEventLedger, InMemorySubscriptionStore};
use billsync::http::{WebhookState, webhook_router};
use billsync::{
    ReconcileOutcome, Reconciler, SubscriptionStatus, SubscriptionStore, WebhookVerifier,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_integration_test";

fn sign(secret: &str, payload: &[u8]) -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let mut signed = timestamp.to_string().into_bytes();
    signed.push(b'.');
    signed.extend_from_slice(payload);

    let mut mac = <Hmac<Sha256>>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(&signed);
    let sig = hex::encode(mac.finalize().into_bytes());

    format!("t={timestamp},v1={sig}")
}

fn event_payload(id: &str, event_type: &str, object: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": id,
        "type": event_type,
        "data": {"object": object},
        "created": 1_735_700_000u64,
    }))
    .unwrap()
}

fn checkout_payload(event_id: &str) -> Vec<u8> {
    event_payload(
        event_id,
        "checkout.session.completed",
        serde_json::json!({
            "subscription": "sub_1",
            "customer": "cus_1",
            "metadata": {"account_id": "A1", "plan_id": "monthly"},
            // period [2025-01-01, 2025-02-01]
            "current_period_start": 1_735_689_600u64,
            "current_period_end": 1_738_368_000u64,
        }),
    )
}

struct Harness {
    store: InMemorySubscriptionStore,
    ledger: InMemoryEventLedger,
    reconciler: Reconciler<InMemorySubscriptionStore, InMemoryEventLedger>,
}

impl Harness {
    fn new() -> Self {
        let store = InMemorySubscriptionStore::new();
        let ledger = InMemoryEventLedger::new();
        Self {
            store: store.clone(),
            ledger: ledger.clone(),
            reconciler: Reconciler::new(store, ledger),
        }
    }

    fn router(&self) -> axum::Router {
        webhook_router(WebhookState::new(
            WebhookVerifier::new(WEBHOOK_SECRET),
            Reconciler::new(self.store.clone(), self.ledger.clone()),
        ))
    }

    async fn deliver(&self, payload: &[u8], signature: &str) -> StatusCode {
        let response = self
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/stripe")
                    .header("stripe-signature", signature)
                    .body(Body::from(payload.to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();
        response.status()
    }
}

#[tokio::test]
async fn checkout_activates_account_through_http() {
    let harness = Harness::new();
    let payload = checkout_payload("evt_checkout_1");
    let signature = sign(WEBHOOK_SECRET, &payload);

    let status = harness.deliver(&payload, &signature).await;
    assert_eq!(status, StatusCode::OK);

    let sub = harness
        .store
        .get_by_provider_id("sub_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.account_id, "A1");
    assert_eq!(sub.current_period_start, 1_735_689_600);
    assert_eq!(sub.current_period_end, 1_738_368_000);
    assert_eq!(
        harness.store.account_status("A1").await.unwrap(),
        SubscriptionStatus::Active
    );
    assert_eq!(
        harness.store.billing_customer("A1").await.unwrap().as_deref(),
        Some("cus_1")
    );
}

#[tokio::test]
async fn altered_signature_makes_no_writes() {
    let harness = Harness::new();
    let payload = checkout_payload("evt_checkout_1");
    let mut signature = sign(WEBHOOK_SECRET, &payload);

    // Flip the last signature character
    let flipped = if signature.ends_with('0') { '1' } else { '0' };
    signature.pop();
    signature.push(flipped);

    let status = harness.deliver(&payload, &signature).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(harness.store.all_subscriptions().is_empty());
    assert!(harness.ledger.recorded_ids().is_empty());
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let harness = Harness::new();
    let payload = checkout_payload("evt_checkout_1");
    let signature = sign("whsec_other_secret", &payload);

    let status = harness.deliver(&payload, &signature).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(harness.store.all_subscriptions().is_empty());
}

#[tokio::test]
async fn duplicate_delivery_is_accepted_and_applied_once() {
    let harness = Harness::new();
    let payload = checkout_payload("evt_checkout_1");
    let signature = sign(WEBHOOK_SECRET, &payload);

    assert_eq!(harness.deliver(&payload, &signature).await, StatusCode::OK);
    assert_eq!(harness.deliver(&payload, &signature).await, StatusCode::OK);

    assert_eq!(harness.store.all_subscriptions().len(), 1);
    assert_eq!(harness.ledger.recorded_ids().len(), 1);
}

#[tokio::test]
async fn payment_failure_then_recovery() {
    let harness = Harness::new();
    let checkout = checkout_payload("evt_1");
    harness
        .deliver(&checkout, &sign(WEBHOOK_SECRET, &checkout))
        .await;

    let failed = event_payload(
        "evt_2",
        "invoice.payment_failed",
        serde_json::json!({"subscription": "sub_1"}),
    );
    harness
        .deliver(&failed, &sign(WEBHOOK_SECRET, &failed))
        .await;

    let sub = harness
        .store
        .get_by_provider_id("sub_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::PastDue);
    assert_eq!(
        harness.store.account_status("A1").await.unwrap(),
        SubscriptionStatus::PastDue
    );

    let paid = event_payload(
        "evt_3",
        "invoice.paid",
        serde_json::json!({
            "subscription": "sub_1",
            "period_start": 1_738_368_000u64,
            "period_end": 1_740_787_200u64,
        }),
    );
    harness.deliver(&paid, &sign(WEBHOOK_SECRET, &paid)).await;

    let sub = harness
        .store
        .get_by_provider_id("sub_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.current_period_end, 1_740_787_200);
    assert_eq!(
        harness.store.account_status("A1").await.unwrap(),
        SubscriptionStatus::Active
    );
}

#[tokio::test]
async fn redelivered_failure_event_does_not_regress_recovery() {
    let harness = Harness::new();

    let checkout = checkout_payload("evt_1");
    let failed = event_payload(
        "evt_2",
        "invoice.payment_failed",
        serde_json::json!({"subscription": "sub_1"}),
    );
    let paid = event_payload(
        "evt_3",
        "invoice.paid",
        serde_json::json!({
            "subscription": "sub_1",
            "period_start": 1_738_368_000u64,
            "period_end": 1_740_787_200u64,
        }),
    );

    for payload in [&checkout, &failed, &paid] {
        harness
            .deliver(payload, &sign(WEBHOOK_SECRET, payload))
            .await;
    }

    // The provider redelivers the older failure event; its id is already in
    // the ledger, so the converged state stays active.
    assert_eq!(
        harness
            .deliver(&failed, &sign(WEBHOOK_SECRET, &failed))
            .await,
        StatusCode::OK
    );

    let sub = harness
        .store
        .get_by_provider_id("sub_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.current_period_end, 1_740_787_200);
}

#[tokio::test]
async fn unknown_subscription_event_records_without_fabricating() {
    let harness = Harness::new();

    let paid = event_payload(
        "evt_orphan",
        "invoice.paid",
        serde_json::json!({"subscription": "sub_never_seen"}),
    );
    // Accepted: the gap is recorded so the provider stops retrying
    assert_eq!(
        harness.deliver(&paid, &sign(WEBHOOK_SECRET, &paid)).await,
        StatusCode::OK
    );

    assert!(harness.store.all_subscriptions().is_empty());
    assert_eq!(harness.ledger.recorded_ids(), vec!["evt_orphan".to_string()]);
}

#[tokio::test]
async fn cancellation_with_duplicate_redelivery() {
    let harness = Harness::new();
    let checkout = checkout_payload("evt_1");
    harness
        .deliver(&checkout, &sign(WEBHOOK_SECRET, &checkout))
        .await;

    let canceled = event_payload(
        "evt_cancel",
        "customer.subscription.deleted",
        serde_json::json!({"id": "sub_1", "canceled_at": 1_739_000_000u64}),
    );
    harness
        .deliver(&canceled, &sign(WEBHOOK_SECRET, &canceled))
        .await;

    let sub = harness
        .store
        .get_by_provider_id("sub_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Inactive);
    assert_eq!(sub.canceled_at, Some(1_739_000_000));
    assert_eq!(
        harness.store.account_status("A1").await.unwrap(),
        SubscriptionStatus::Inactive
    );

    // Duplicate cancellation delivery is a no-op beyond the first application
    let outcome = harness
        .reconciler
        .apply(
            &WebhookVerifier::new(WEBHOOK_SECRET)
                .verify(&canceled, &sign(WEBHOOK_SECRET, &canceled))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Duplicate);

    let sub = harness
        .store
        .get_by_provider_id("sub_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.canceled_at, Some(1_739_000_000));
}

#[tokio::test]
async fn get_rejected_with_method_not_allowed() {
    let harness = Harness::new();
    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhooks/stripe")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
