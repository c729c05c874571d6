//! Checkout Error Types

use serde::Serialize;
use thiserror::Error;

use crate::order::OrderId;

/// Result type alias
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Faults that abort a checkout request.
///
/// Problems the shopper can fix are [`FormError`]s instead and travel inside
/// the returned view.
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Collaborator storage failed (orders, customers, shippers)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Vault document exists but cannot be parsed
    #[error("Card vault corrupt: {0}")]
    VaultCorrupt(String),

    /// Payment authorizer refused the charge
    #[error("Card declined: {0}")]
    Declined(String),

    /// Payment authorizer could not be reached
    #[error("Authorizer unavailable: {0}")]
    AuthorizerUnavailable(String),

    /// Gateway accepted the request but its answer could not be read;
    /// the card may or may not have been charged
    #[error("Payment gateway response unreadable: {0}")]
    GatewayResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl CheckoutError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::Storage(_) | CheckoutError::AuthorizerUnavailable(_) | CheckoutError::Io(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            CheckoutError::Declined(_) => "Your card was declined. Please use another card.",
            CheckoutError::AuthorizerUnavailable(_) => {
                "Payment processing is unavailable. Please try again."
            }
            CheckoutError::GatewayResponse(_) => {
                "We could not confirm your payment. Please contact us before trying again."
            }
            CheckoutError::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your order.",
        }
    }
}

impl From<anyhow::Error> for CheckoutError {
    fn from(err: anyhow::Error) -> Self {
        CheckoutError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for CheckoutError {
    fn from(err: reqwest::Error) -> Self {
        CheckoutError::AuthorizerUnavailable(err.to_string())
    }
}

/// Problems reported back on the form or view the shopper is looking at.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum FormError {
    #[error("I can't identify you. Please log in and try again.")]
    NotIdentified,

    #[error("You have no items in your cart.")]
    EmptyCart,

    #[error("That card is not valid.  Please enter a valid card.")]
    InvalidCard,

    #[error("Shipping method {0} is not available.")]
    UnknownShipper(i32),

    #[error("Your payment could not be authorized: {0}")]
    PaymentDeclined(String),

    #[error("No order specified.  Please try again.")]
    NoOrderSpecified,

    #[error("Order {0} was not found.")]
    OrderNotFound(OrderId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(CheckoutError::AuthorizerUnavailable("timeout".into()).is_retryable());
        assert!(!CheckoutError::Declined("insufficient funds".into()).is_retryable());
        assert!(!CheckoutError::VaultCorrupt("bad json".into()).is_retryable());
        assert!(!CheckoutError::GatewayResponse("expected value".into()).is_retryable());
    }

    #[test]
    fn test_form_error_messages() {
        assert_eq!(
            FormError::OrderNotFound(OrderId(42)).to_string(),
            "Order 42 was not found."
        );
        assert_eq!(FormError::EmptyCart.to_string(), "You have no items in your cart.");
    }
}
