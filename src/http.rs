//! HTTP boundary for inbound webhooks.
//!
//! One route: `POST /webhooks/stripe`. The handler reads the exact raw body
//! bytes (the signature is computed over them, so no earlier parsing is
//! allowed), verifies the signature, and hands the event to the reconciler.
//!
//! Response mapping:
//! - `200` — applied, duplicate, ignored, or recorded gap (no retry wanted)
//! - `400` — missing header or signature failure (no retry wanted)
//! - `5xx` — transient store failure (provider should redeliver)

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;

use crate::billing::ledger::EventLedger;
use crate::billing::reconciler::Reconciler;
use crate::billing::store::SubscriptionStore;
use crate::billing::webhook::WebhookVerifier;

/// Shared state for the webhook route.
pub struct WebhookState<S: SubscriptionStore, L: EventLedger> {
    verifier: Arc<WebhookVerifier>,
    reconciler: Arc<Reconciler<S, L>>,
}

impl<S: SubscriptionStore, L: EventLedger> WebhookState<S, L> {
    /// Create the route state.
    #[must_use]
    pub fn new(verifier: WebhookVerifier, reconciler: Reconciler<S, L>) -> Self {
        Self {
            verifier: Arc::new(verifier),
            reconciler: Arc::new(reconciler),
        }
    }
}

impl<S: SubscriptionStore, L: EventLedger> Clone for WebhookState<S, L> {
    fn clone(&self) -> Self {
        Self {
            verifier: Arc::clone(&self.verifier),
            reconciler: Arc::clone(&self.reconciler),
        }
    }
}

/// Build a router exposing the webhook endpoint, for merging into a host app.
pub fn webhook_router<S, L>(state: WebhookState<S, L>) -> Router
where
    S: SubscriptionStore + 'static,
    L: EventLedger + 'static,
{
    Router::new()
        .route("/webhooks/stripe", post(handle_webhook::<S, L>))
        .with_state(state)
}

/// Handle one webhook delivery.
pub async fn handle_webhook<S, L>(
    State(state): State<WebhookState<S, L>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: SubscriptionStore + 'static,
    L: EventLedger + 'static,
{
    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing stripe-signature header"})),
        )
            .into_response();
    };

    // Fail closed at the boundary: no state change on verification failure.
    let event = match state.verifier.verify(&body, signature) {
        Ok(event) => event,
        Err(err) => return err.into_response(),
    };

    match state.reconciler.apply(&event).await {
        Ok(outcome) => {
            tracing::debug!(
                target: "billsync::http",
                event_id = %event.id,
                event_type = %event.event_type,
                ?outcome,
                "webhook processed"
            );
            // Duplicates and gaps are accepted: redelivery would not help.
            (StatusCode::OK, Json(json!({"received": true}))).into_response()
        }
        // Store failures map to 5xx so the provider redelivers.
        Err(err) => err.into_response(),
    }
}
