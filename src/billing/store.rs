//! Storage traits for subscription state.
//!
//! Implement [`SubscriptionStore`] to persist subscriptions and the account
//! subscription-status column to your database. No business rules live here:
//! the reconciler decides what to write, the store only persists it. All
//! mutations are idempotent in effect (writing the same status or period
//! twice is a no-op), which the reconciler's crash-safety ordering relies on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Subscription status, also used for the account's status column.
///
/// `PastDue` is a grace period: payment failed but the account retains
/// access pending the provider's payment retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// No paid subscription (initial state, and terminal after cancellation).
    Inactive,
    /// Subscription is active and paid.
    Active,
    /// Payment failed; access retained during the grace period.
    PastDue,
}

impl SubscriptionStatus {
    /// Parse from the provider's status string.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "past_due" => Self::PastDue,
            _ => Self::Inactive,
        }
    }

    /// Convert to the provider-facing string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::PastDue => "past_due",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted subscription record.
///
/// Canceled subscriptions are retained for audit; a new checkout creates a
/// fresh row rather than reviving an old one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    /// Internal id.
    pub id: String,
    /// Provider-assigned subscription id (unique).
    pub provider_subscription_id: String,
    /// Provider-assigned customer id.
    pub provider_customer_id: String,
    /// Owning account id.
    pub account_id: String,
    /// Plan identifier.
    pub plan_id: String,
    /// Subscription status.
    pub status: SubscriptionStatus,
    /// Current billing period start (Unix timestamp).
    pub current_period_start: u64,
    /// Current billing period end (Unix timestamp).
    pub current_period_end: u64,
    /// When the subscription was canceled, if it was.
    pub canceled_at: Option<u64>,
    /// Created timestamp.
    pub created_at: u64,
    /// Last updated timestamp.
    pub updated_at: u64,
}

impl Subscription {
    /// Check if the subscription grants access (active or in the grace period).
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }

    /// Check if the subscription is active and paid.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// Check if payment has failed.
    #[must_use]
    pub fn is_past_due(&self) -> bool {
        self.status == SubscriptionStatus::PastDue
    }

    /// Check if the subscription has been canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled_at.is_some()
    }
}

/// Fields for creating a subscription row.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub provider_subscription_id: String,
    pub provider_customer_id: String,
    pub account_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: u64,
    pub current_period_end: u64,
}

/// Trait for persisting subscriptions and the account status column.
///
/// Update operations return `false` when no row matched, so callers can
/// distinguish "nothing to update" from a successful write.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    // Subscription rows

    /// Get a subscription by the provider's subscription id.
    async fn get_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>>;

    /// Get the current subscription for an account (latest by creation time).
    async fn get_current_for_account(&self, account_id: &str) -> Result<Option<Subscription>>;

    /// Create a subscription row.
    async fn create(&self, new: NewSubscription) -> Result<Subscription>;

    /// Update the status of a subscription.
    async fn update_status(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<bool>;

    /// Update the billing period dates.
    async fn update_period(
        &self,
        provider_subscription_id: &str,
        period_start: u64,
        period_end: u64,
    ) -> Result<bool>;

    /// Update the plan identifier only.
    async fn update_plan(&self, provider_subscription_id: &str, plan_id: &str) -> Result<bool>;

    /// Record the cancellation timestamp.
    async fn mark_canceled(
        &self,
        provider_subscription_id: &str,
        canceled_at: u64,
    ) -> Result<bool>;

    // Account billing columns

    /// Attach the provider's customer reference to an account.
    async fn set_billing_customer(
        &self,
        account_id: &str,
        provider_customer_id: &str,
    ) -> Result<()>;

    /// Get the provider customer reference for an account.
    async fn billing_customer(&self, account_id: &str) -> Result<Option<String>>;

    /// Set the account's subscription status.
    async fn set_account_status(
        &self,
        account_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()>;

    /// Get the account's subscription status (`Inactive` when never set).
    async fn account_status(&self, account_id: &str) -> Result<SubscriptionStatus>;
}

/// In-memory subscription store (for development/testing)
///
/// In production, implement [`SubscriptionStore`] against your database with
/// a unique constraint on the provider subscription id.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionStore {
    inner: std::sync::Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    subscriptions: std::sync::RwLock<Vec<Subscription>>,
    accounts: std::sync::RwLock<std::collections::HashMap<String, AccountRecord>>,
}

#[derive(Debug, Clone, Default)]
struct AccountRecord {
    provider_customer_id: Option<String>,
    status: Option<SubscriptionStatus>,
}

impl InMemorySubscriptionStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All subscription rows (for testing).
    pub fn all_subscriptions(&self) -> Vec<Subscription> {
        self.inner.subscriptions.read().unwrap().clone()
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        let subs = self.inner.subscriptions.read().unwrap();
        Ok(subs
            .iter()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
            .cloned())
    }

    async fn get_current_for_account(&self, account_id: &str) -> Result<Option<Subscription>> {
        let subs = self.inner.subscriptions.read().unwrap();
        // Rows are appended in creation order, so the last match is the
        // latest by creation time.
        Ok(subs
            .iter()
            .rev()
            .find(|s| s.account_id == account_id)
            .cloned())
    }

    async fn create(&self, new: NewSubscription) -> Result<Subscription> {
        let now = unix_now();
        let sub = Subscription {
            id: uuid::Uuid::new_v4().to_string(),
            provider_subscription_id: new.provider_subscription_id,
            provider_customer_id: new.provider_customer_id,
            account_id: new.account_id,
            plan_id: new.plan_id,
            status: new.status,
            current_period_start: new.current_period_start,
            current_period_end: new.current_period_end,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.subscriptions.write().unwrap().push(sub.clone());
        Ok(sub)
    }

    async fn update_status(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<bool> {
        let mut subs = self.inner.subscriptions.write().unwrap();
        match subs
            .iter_mut()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
        {
            Some(sub) => {
                sub.status = status;
                sub.updated_at = unix_now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_period(
        &self,
        provider_subscription_id: &str,
        period_start: u64,
        period_end: u64,
    ) -> Result<bool> {
        let mut subs = self.inner.subscriptions.write().unwrap();
        match subs
            .iter_mut()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
        {
            Some(sub) => {
                sub.current_period_start = period_start;
                sub.current_period_end = period_end;
                sub.updated_at = unix_now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_plan(&self, provider_subscription_id: &str, plan_id: &str) -> Result<bool> {
        let mut subs = self.inner.subscriptions.write().unwrap();
        match subs
            .iter_mut()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
        {
            Some(sub) => {
                sub.plan_id = plan_id.to_string();
                sub.updated_at = unix_now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_canceled(
        &self,
        provider_subscription_id: &str,
        canceled_at: u64,
    ) -> Result<bool> {
        let mut subs = self.inner.subscriptions.write().unwrap();
        match subs
            .iter_mut()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
        {
            Some(sub) => {
                sub.canceled_at = Some(canceled_at);
                sub.updated_at = unix_now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_billing_customer(
        &self,
        account_id: &str,
        provider_customer_id: &str,
    ) -> Result<()> {
        let mut accounts = self.inner.accounts.write().unwrap();
        accounts
            .entry(account_id.to_string())
            .or_default()
            .provider_customer_id = Some(provider_customer_id.to_string());
        Ok(())
    }

    async fn billing_customer(&self, account_id: &str) -> Result<Option<String>> {
        let accounts = self.inner.accounts.read().unwrap();
        Ok(accounts
            .get(account_id)
            .and_then(|a| a.provider_customer_id.clone()))
    }

    async fn set_account_status(
        &self,
        account_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()> {
        let mut accounts = self.inner.accounts.write().unwrap();
        accounts.entry(account_id.to_string()).or_default().status = Some(status);
        Ok(())
    }

    async fn account_status(&self, account_id: &str) -> Result<SubscriptionStatus> {
        let accounts = self.inner.accounts.read().unwrap();
        Ok(accounts
            .get(account_id)
            .and_then(|a| a.status)
            .unwrap_or(SubscriptionStatus::Inactive))
    }
}
