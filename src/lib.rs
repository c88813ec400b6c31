//! Billsync - webhook-driven subscription reconciliation
//!
//! Billsync keeps local subscription state in sync with a payment provider
//! (Stripe-shaped wire contract). Inbound webhook deliveries are signature
//! verified, deduplicated through an append-only event ledger, and mapped to
//! idempotent status transitions by the reconciler. The outbound side covers
//! checkout-session creation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use billsync::{
//!     BillingConfigBuilder, Reconciler, WebhookVerifier,
//!     billing::{InMemoryEventLedger, InMemorySubscriptionStore},
//!     http::{WebhookState, webhook_router},
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     billsync::init_tracing();
//!
//!     let config = BillingConfigBuilder::new().from_env().build().unwrap();
//!
//!     let store = InMemorySubscriptionStore::new();
//!     let ledger = InMemoryEventLedger::new();
//!
//!     let state = WebhookState::new(
//!         WebhookVerifier::new(config.webhook_secret.clone()),
//!         Reconciler::new(store, ledger),
//!     );
//!     let app = webhook_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod billing;
mod config;
mod error;
pub mod http;

// Re-exports for public API
pub use billing::{
    BillingError, CheckoutClient, CheckoutConfig, CheckoutManager, CheckoutRequest,
    CheckoutSession, EventLedger, HttpCheckoutClient, NewSubscription, ReconcileOutcome,
    Reconciler, RecordOutcome, Subscription, SubscriptionStatus, SubscriptionStore,
    WebhookEvent, WebhookVerifier,
};
pub use config::{BillingConfig, BillingConfigBuilder};
pub use error::{BillsyncError, Result};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main().
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "billsync=debug")
/// - `BILLSYNC_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("BILLSYNC_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
