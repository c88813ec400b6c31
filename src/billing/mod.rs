//! Subscription billing driven by payment provider webhooks.
//!
//! The local subscription state is a cache of the provider's truth, kept in
//! sync by the [`Reconciler`]: every inbound webhook is signature-verified,
//! deduplicated through the [`EventLedger`], and mapped to an idempotent
//! status transition against the [`SubscriptionStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use billsync::billing::{Reconciler, WebhookVerifier};
//!
//! let verifier = WebhookVerifier::new(config.webhook_secret.clone());
//! let reconciler = Reconciler::new(store, ledger);
//!
//! let event = verifier.verify(&raw_body, signature_header)?;
//! let outcome = reconciler.apply(&event).await?;
//! ```

pub mod checkout;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod store;
pub mod webhook;

// Webhook exports
pub use webhook::{WebhookEvent, WebhookEventData, WebhookVerifier};

// Ledger exports
pub use ledger::{EventLedger, InMemoryEventLedger, RecordOutcome};

// Storage exports
pub use store::{
    InMemorySubscriptionStore, NewSubscription, Subscription, SubscriptionStatus,
    SubscriptionStore,
};

// Reconciler exports
pub use reconciler::{ReconcileOutcome, Reconciler};

// Checkout exports
pub use checkout::{
    CheckoutClient, CheckoutConfig, CheckoutManager, CheckoutRequest, CheckoutSession,
    HttpCheckoutClient,
};

// Error exports
pub use error::BillingError;
