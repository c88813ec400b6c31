//! Subscription state reconciliation.
//!
//! Maps verified webhook events to local status transitions and applies them
//! against the store and the idempotency ledger. This is the only place that
//! mutates subscription state.
//!
//! Crash-safety ordering: store mutations run first, the ledger record runs
//! last. A crash in between leaves the event unrecorded, so the provider's
//! redelivery re-applies mutations that are idempotent in effect. A ledger
//! collision on the final record means another delivery of the same event
//! completed concurrently, which is treated as success.

use super::ledger::{EventLedger, RecordOutcome};
use super::store::{NewSubscription, SubscriptionStatus, SubscriptionStore};
use super::webhook::WebhookEvent;
use crate::error::Result;

/// Outcome of reconciling one webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The event's effect was applied.
    Applied,
    /// The event was already processed (duplicate delivery).
    Duplicate,
    /// The event is not handled (unknown type, or a checkout without a
    /// subscription); nothing was recorded.
    Ignored,
    /// The event references an entity unknown locally. The event is recorded
    /// (to stop provider retries) and flagged for operator follow-up; no
    /// data is fabricated from partial event payloads.
    Gap,
}

/// The subscription state machine.
///
/// States: `inactive -> active -> past_due -> {active, inactive}`, with
/// `active -> inactive` on explicit cancellation. Cancellation is terminal
/// for a subscription row: a new checkout creates a fresh row.
pub struct Reconciler<S: SubscriptionStore, L: EventLedger> {
    store: S,
    ledger: L,
}

impl<S: SubscriptionStore, L: EventLedger> Reconciler<S, L> {
    /// Create a new reconciler.
    #[must_use]
    pub fn new(store: S, ledger: L) -> Self {
        Self { store, ledger }
    }

    /// Apply a verified event.
    ///
    /// Safe under concurrent and duplicate delivery: the ledger's uniqueness
    /// invariant on the event id is the sole synchronization primitive, and
    /// the transition table assumes nothing about arrival order across
    /// distinct event ids.
    pub async fn apply(&self, event: &WebhookEvent) -> Result<ReconcileOutcome> {
        if self.ledger.is_processed(&event.id).await? {
            tracing::debug!(
                target: "billsync::billing",
                event_id = %event.id,
                "skipping already-processed event"
            );
            return Ok(ReconcileOutcome::Duplicate);
        }

        let outcome = match event.event_type.as_str() {
            "checkout.session.completed" => self.apply_checkout_completed(event).await?,
            "invoice.paid" => self.apply_invoice_paid(event).await?,
            "invoice.payment_failed" => self.apply_payment_failed(event).await?,
            "customer.subscription.deleted" | "customer.subscription.canceled" => {
                self.apply_subscription_deleted(event).await?
            }
            "customer.subscription.updated" => self.apply_subscription_updated(event).await?,
            _ => {
                tracing::debug!(
                    target: "billsync::billing",
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "ignoring unhandled event type"
                );
                return Ok(ReconcileOutcome::Ignored);
            }
        };

        // Ignored events are never recorded, whichever handler decided so.
        if outcome == ReconcileOutcome::Ignored {
            return Ok(outcome);
        }

        // Record last. If another worker recorded the id first, its mutations
        // already landed and ours were idempotent re-applications.
        match self.ledger.record(&event.id, &event.event_type).await? {
            RecordOutcome::Recorded => Ok(outcome),
            RecordOutcome::AlreadyRecorded => Ok(ReconcileOutcome::Duplicate),
        }
    }

    /// checkout completed: create the subscription, attach the billing
    /// customer to the account, activate the account.
    async fn apply_checkout_completed(&self, event: &WebhookEvent) -> Result<ReconcileOutcome> {
        let object = &event.data.object;

        let Some(subscription_id) = object.get("subscription").and_then(|v| v.as_str()) else {
            // Not a subscription checkout (one-time payment)
            return Ok(ReconcileOutcome::Ignored);
        };

        let Some(account_id) = object
            .get("metadata")
            .and_then(|m| m.get("account_id"))
            .and_then(|v| v.as_str())
        else {
            return Ok(self.gap(event, "checkout session has no account metadata"));
        };

        let Some(customer_id) = object.get("customer").and_then(|v| v.as_str()) else {
            return Ok(self.gap(event, "checkout session has no customer reference"));
        };

        // Redelivery under a fresh event id: the row already exists, so only
        // re-assert the account columns. The account status follows the row's
        // current status; a later payment failure must not be overwritten by
        // a stale checkout redelivery.
        if let Some(existing) = self.store.get_by_provider_id(subscription_id).await? {
            self.store.set_billing_customer(account_id, customer_id).await?;
            self.store
                .set_account_status(account_id, existing.status)
                .await?;
            return Ok(ReconcileOutcome::Applied);
        }

        // Precondition: no current accessible subscription for the account.
        if let Some(existing) = self.store.get_current_for_account(account_id).await? {
            if existing.is_accessible() && !existing.is_canceled() {
                return Ok(self.gap(
                    event,
                    "account already has a current subscription; not creating another",
                ));
            }
        }

        let plan_id = object
            .get("metadata")
            .and_then(|m| m.get("plan_id"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let period_start = object
            .get("current_period_start")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let period_end = object
            .get("current_period_end")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        self.store
            .create(NewSubscription {
                provider_subscription_id: subscription_id.to_string(),
                provider_customer_id: customer_id.to_string(),
                account_id: account_id.to_string(),
                plan_id: plan_id.to_string(),
                status: SubscriptionStatus::Active,
                current_period_start: period_start,
                current_period_end: period_end,
            })
            .await?;
        self.store.set_billing_customer(account_id, customer_id).await?;
        self.store
            .set_account_status(account_id, SubscriptionStatus::Active)
            .await?;

        tracing::info!(
            target: "billsync::billing",
            account_id,
            subscription_id,
            "subscription activated"
        );
        Ok(ReconcileOutcome::Applied)
    }

    /// invoice paid: renewal. Updates period dates; recovers from past_due.
    async fn apply_invoice_paid(&self, event: &WebhookEvent) -> Result<ReconcileOutcome> {
        let object = &event.data.object;

        let Some(subscription_id) = object.get("subscription").and_then(|v| v.as_str()) else {
            return Ok(self.gap(event, "invoice has no subscription reference"));
        };

        let Some(sub) = self.store.get_by_provider_id(subscription_id).await? else {
            return Ok(self.gap(event, "invoice for unknown subscription"));
        };

        let period_start = object.get("period_start").and_then(|v| v.as_u64());
        let period_end = object.get("period_end").and_then(|v| v.as_u64());
        if let (Some(start), Some(end)) = (period_start, period_end) {
            self.store.update_period(subscription_id, start, end).await?;
        }

        if sub.status == SubscriptionStatus::PastDue {
            self.store
                .update_status(subscription_id, SubscriptionStatus::Active)
                .await?;
            self.store
                .set_account_status(&sub.account_id, SubscriptionStatus::Active)
                .await?;
            tracing::info!(
                target: "billsync::billing",
                account_id = %sub.account_id,
                subscription_id,
                "subscription recovered from past_due"
            );
        }

        Ok(ReconcileOutcome::Applied)
    }

    /// invoice payment failed: grace period. Access is retained while the
    /// provider retries payment.
    async fn apply_payment_failed(&self, event: &WebhookEvent) -> Result<ReconcileOutcome> {
        let object = &event.data.object;

        let Some(subscription_id) = object.get("subscription").and_then(|v| v.as_str()) else {
            return Ok(self.gap(event, "invoice has no subscription reference"));
        };

        let Some(sub) = self.store.get_by_provider_id(subscription_id).await? else {
            return Ok(self.gap(event, "payment failure for unknown subscription"));
        };

        self.store
            .update_status(subscription_id, SubscriptionStatus::PastDue)
            .await?;
        self.store
            .set_account_status(&sub.account_id, SubscriptionStatus::PastDue)
            .await?;

        tracing::warn!(
            target: "billsync::billing",
            account_id = %sub.account_id,
            subscription_id,
            "payment failed; subscription past_due"
        );
        Ok(ReconcileOutcome::Applied)
    }

    /// subscription deleted: terminal for this row.
    async fn apply_subscription_deleted(&self, event: &WebhookEvent) -> Result<ReconcileOutcome> {
        let object = &event.data.object;

        let Some(subscription_id) = object.get("id").and_then(|v| v.as_str()) else {
            return Ok(self.gap(event, "deletion event has no subscription id"));
        };

        let Some(sub) = self.store.get_by_provider_id(subscription_id).await? else {
            return Ok(self.gap(event, "deletion of unknown subscription"));
        };

        let canceled_at = object
            .get("canceled_at")
            .and_then(|v| v.as_u64())
            .unwrap_or(event.created);

        self.store
            .update_status(subscription_id, SubscriptionStatus::Inactive)
            .await?;
        self.store.mark_canceled(subscription_id, canceled_at).await?;
        self.store
            .set_account_status(&sub.account_id, SubscriptionStatus::Inactive)
            .await?;

        tracing::info!(
            target: "billsync::billing",
            account_id = %sub.account_id,
            subscription_id,
            "subscription canceled"
        );
        Ok(ReconcileOutcome::Applied)
    }

    /// subscription updated: plan change only, status untouched.
    async fn apply_subscription_updated(&self, event: &WebhookEvent) -> Result<ReconcileOutcome> {
        let object = &event.data.object;

        let Some(subscription_id) = object.get("id").and_then(|v| v.as_str()) else {
            return Ok(self.gap(event, "update event has no subscription id"));
        };

        if self.store.get_by_provider_id(subscription_id).await?.is_none() {
            return Ok(self.gap(event, "update for unknown subscription"));
        }

        let plan_id = object
            .get("plan_id")
            .and_then(|v| v.as_str())
            .or_else(|| {
                object
                    .get("metadata")
                    .and_then(|m| m.get("plan_id"))
                    .and_then(|v| v.as_str())
            });
        if let Some(plan_id) = plan_id {
            self.store.update_plan(subscription_id, plan_id).await?;
        }

        Ok(ReconcileOutcome::Applied)
    }

    /// Log a reconciliation gap for operator follow-up. The event is still
    /// recorded by the caller so the provider stops redelivering it.
    fn gap(&self, event: &WebhookEvent, reason: &str) -> ReconcileOutcome {
        tracing::warn!(
            target: "billsync::billing",
            event_id = %event.id,
            event_type = %event.event_type,
            reason,
            "reconciliation gap"
        );
        ReconcileOutcome::Gap
    }
}
