//! Billing-specific error types.
//!
//! Granular errors for webhook verification, reconciliation, and the
//! outbound provider API, converted to `BillsyncError` at the HTTP boundary.

use std::fmt;

/// Billing-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    // Webhook verification errors
    /// The signature header could not be parsed.
    InvalidSignatureHeader { message: String },
    /// The signature did not match the payload.
    InvalidSignature,
    /// The signed timestamp is outside the tolerance window (replay protection).
    TimestampExpired { age_seconds: i64 },
    /// The event payload is malformed.
    InvalidPayload { message: String },

    // Checkout errors
    /// Invalid redirect URL provided.
    InvalidRedirectUrl { url: String, reason: String },
    /// Redirect URL domain not in allowed list.
    RedirectDomainNotAllowed { domain: String },

    // Provider API errors
    /// The payment provider API returned an error.
    ProviderApi {
        operation: String,
        message: String,
        http_status: Option<u16>,
    },

    // Persistence errors
    /// The backing store is unreachable or failed transiently.
    StoreUnavailable { message: String },

    // General errors
    /// An unexpected internal error occurred.
    Internal { message: String },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignatureHeader { message } => {
                write!(f, "Invalid signature header: {}", message)
            }
            Self::InvalidSignature => {
                write!(f, "Invalid webhook signature")
            }
            Self::TimestampExpired { age_seconds } => {
                write!(f, "Webhook timestamp expired ({} seconds old)", age_seconds)
            }
            Self::InvalidPayload { message } => {
                write!(f, "Invalid webhook payload: {}", message)
            }
            Self::InvalidRedirectUrl { url, reason } => {
                write!(f, "Invalid redirect URL '{}': {}", url, reason)
            }
            Self::RedirectDomainNotAllowed { domain } => {
                write!(f, "Redirect domain '{}' is not allowed", domain)
            }
            Self::ProviderApi { operation, message, http_status } => {
                write!(f, "Provider API error during '{}': {}", operation, message)?;
                if let Some(status) = http_status {
                    write!(f, " [HTTP {}]", status)?;
                }
                Ok(())
            }
            Self::StoreUnavailable { message } => {
                write!(f, "Store unavailable: {}", message)
            }
            Self::Internal { message } => {
                write!(f, "Internal billing error: {}", message)
            }
        }
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for crate::error::BillsyncError {
    fn from(err: BillingError) -> Self {
        match &err {
            // Map to BadRequest (no retry desired)
            BillingError::InvalidSignatureHeader { .. }
            | BillingError::InvalidSignature
            | BillingError::TimestampExpired { .. }
            | BillingError::InvalidPayload { .. }
            | BillingError::InvalidRedirectUrl { .. }
            | BillingError::RedirectDomainNotAllowed { .. } => {
                crate::error::BillsyncError::BadRequest(err.to_string())
            }

            // Map to ServiceUnavailable (provider will redeliver)
            BillingError::StoreUnavailable { .. } => {
                crate::error::BillsyncError::ServiceUnavailable(err.to_string())
            }

            // Map provider API errors based on HTTP status
            BillingError::ProviderApi { http_status, .. } => match http_status {
                Some(400..=499) => crate::error::BillsyncError::BadRequest(err.to_string()),
                _ => crate::error::BillsyncError::Internal(err.to_string()),
            },

            BillingError::Internal { .. } => {
                crate::error::BillsyncError::Internal(err.to_string())
            }
        }
    }
}

impl BillingError {
    /// Check if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidSignatureHeader { .. }
            | Self::InvalidSignature
            | Self::TimestampExpired { .. }
            | Self::InvalidPayload { .. }
            | Self::InvalidRedirectUrl { .. }
            | Self::RedirectDomainNotAllowed { .. } => true,
            Self::ProviderApi { http_status, .. } => {
                matches!(http_status, Some(400..=499))
            }
            _ => false,
        }
    }

    /// Check if this error is retryable by the webhook provider.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable { .. } | Self::Internal { .. } => true,
            Self::ProviderApi { http_status, .. } => {
                matches!(http_status, Some(429) | Some(500..=599) | None)
            }
            _ => false,
        }
    }
}
