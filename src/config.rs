use secrecy::SecretString;

use crate::error::{BillsyncError, Result};

/// Billing configuration, passed explicitly into the verifier, reconciler,
/// and checkout client at startup. There is no ambient global lookup.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Provider API secret key.
    pub api_key: SecretString,
    /// Webhook signing secret.
    pub webhook_secret: SecretString,
    /// Provider price reference for the subscription plan.
    pub price_id: String,
    /// Redirect URL after successful checkout.
    pub success_url: String,
    /// Redirect URL when checkout is abandoned.
    pub cancel_url: String,
    /// Tolerance for the webhook signature timestamp, in seconds.
    pub signature_tolerance_secs: i64,
}

/// Builder for [`BillingConfig`] with environment variable support
#[must_use = "builder does nothing until you call build()"]
#[derive(Default)]
pub struct BillingConfigBuilder {
    api_key: Option<SecretString>,
    webhook_secret: Option<SecretString>,
    price_id: Option<String>,
    success_url: Option<String>,
    cancel_url: Option<String>,
    signature_tolerance_secs: Option<i64>,
}

impl BillingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from environment variables:
    ///
    /// - `STRIPE_SECRET_KEY`
    /// - `STRIPE_WEBHOOK_SECRET`
    /// - `STRIPE_PRICE_ID`
    /// - `CHECKOUT_SUCCESS_URL`
    /// - `CHECKOUT_CANCEL_URL`
    pub fn from_env(mut self) -> Self {
        if let Ok(v) = std::env::var("STRIPE_SECRET_KEY") {
            self.api_key = Some(v.into());
        }
        if let Ok(v) = std::env::var("STRIPE_WEBHOOK_SECRET") {
            self.webhook_secret = Some(v.into());
        }
        if let Ok(v) = std::env::var("STRIPE_PRICE_ID") {
            self.price_id = Some(v);
        }
        if let Ok(v) = std::env::var("CHECKOUT_SUCCESS_URL") {
            self.success_url = Some(v);
        }
        if let Ok(v) = std::env::var("CHECKOUT_CANCEL_URL") {
            self.cancel_url = Some(v);
        }
        self
    }

    pub fn with_api_key(mut self, key: impl Into<SecretString>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<SecretString>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_price_id(mut self, price_id: impl Into<String>) -> Self {
        self.price_id = Some(price_id.into());
        self
    }

    pub fn with_success_url(mut self, url: impl Into<String>) -> Self {
        self.success_url = Some(url.into());
        self
    }

    pub fn with_cancel_url(mut self, url: impl Into<String>) -> Self {
        self.cancel_url = Some(url.into());
        self
    }

    pub fn with_signature_tolerance_secs(mut self, secs: i64) -> Self {
        self.signature_tolerance_secs = Some(secs);
        self
    }

    /// Build the config, failing if a required setting is missing.
    pub fn build(self) -> Result<BillingConfig> {
        let require = |field: Option<String>, name: &str| {
            field.ok_or_else(|| {
                BillsyncError::Internal(format!("missing required billing config: {name}"))
            })
        };

        Ok(BillingConfig {
            api_key: self.api_key.ok_or_else(|| {
                BillsyncError::Internal("missing required billing config: api_key".to_string())
            })?,
            webhook_secret: self.webhook_secret.ok_or_else(|| {
                BillsyncError::Internal(
                    "missing required billing config: webhook_secret".to_string(),
                )
            })?,
            price_id: require(self.price_id, "price_id")?,
            success_url: require(self.success_url, "success_url")?,
            cancel_url: require(self.cancel_url, "cancel_url")?,
            signature_tolerance_secs: self.signature_tolerance_secs.unwrap_or(300),
        })
    }
}
