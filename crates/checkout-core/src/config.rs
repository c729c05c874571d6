//! Checkout Configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CheckoutError, Result};

/// Tunables for the checkout flow
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// JSON file backing the card vault
    pub vault_path: PathBuf,

    /// Expiration years offered on the form, counting the current one
    pub expiration_year_window: u32,

    /// Days from order date until the order is required
    pub required_in_days: i64,

    /// Days from order date until it ships
    pub ships_in_days: i64,

    /// Days from order date until the shipment is handed to the carrier
    pub shipment_in_days: i64,

    /// Payment gateway endpoint; `None` selects the mock authorizer
    pub gateway_url: Option<String>,

    pub gateway_api_key: Option<String>,

    pub gateway_timeout: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            vault_path: PathBuf::from("data/stored_cards.json"),
            expiration_year_window: 6,
            required_in_days: 7,
            ships_in_days: 3,
            shipment_in_days: 1,
            gateway_url: None,
            gateway_api_key: None,
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

impl CheckoutConfig {
    /// Create from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            vault_path: std::env::var("CHECKOUT_VAULT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.vault_path),
            expiration_year_window: parse_var("CHECKOUT_EXPIRATION_YEARS")?
                .unwrap_or(defaults.expiration_year_window),
            required_in_days: parse_var("CHECKOUT_REQUIRED_DAYS")?.unwrap_or(defaults.required_in_days),
            ships_in_days: parse_var("CHECKOUT_SHIPS_DAYS")?.unwrap_or(defaults.ships_in_days),
            shipment_in_days: parse_var("CHECKOUT_SHIPMENT_DAYS")?.unwrap_or(defaults.shipment_in_days),
            gateway_url: std::env::var("CHECKOUT_GATEWAY_URL").ok().filter(|v| !v.is_empty()),
            gateway_api_key: std::env::var("CHECKOUT_GATEWAY_API_KEY").ok().filter(|v| !v.is_empty()),
            gateway_timeout: parse_var::<u64>("CHECKOUT_GATEWAY_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.gateway_timeout),
        })
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CheckoutError::Config(format!("{} has invalid value '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}
