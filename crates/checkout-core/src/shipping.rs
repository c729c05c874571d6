//! Shippers
//!
//! Shipper lookup, per-order shipping cost and tracking number allocation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// A carrier the storefront ships with
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipper {
    pub shipper_id: i32,
    pub company_name: String,

    /// Flat charge per order
    pub base_cost: Decimal,

    /// Fraction of the subtotal added on top, 0.05 = 5%
    pub rate: Decimal,
}

impl Shipper {
    pub fn new(shipper_id: i32, company_name: impl Into<String>, base_cost: Decimal, rate: Decimal) -> Self {
        Self {
            shipper_id,
            company_name: company_name.into(),
            base_cost,
            rate,
        }
    }

    /// Freight for an order with this subtotal, rounded to cents
    pub fn shipping_cost(&self, subtotal: Decimal) -> Decimal {
        (self.base_cost + subtotal * self.rate).round_dp(2)
    }
}

/// A priced shipping choice shown on the checkout form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingOption {
    pub shipper_id: i32,
    pub label: String,
    pub cost: Decimal,
}

/// Shipper lookup trait
#[async_trait]
pub trait ShipperDirectory: Send + Sync {
    /// Every shipper, priced for `subtotal`
    async fn shipping_options(&self, subtotal: Decimal) -> Result<Vec<ShippingOption>>;

    async fn shipper_by_id(&self, shipper_id: i32) -> Result<Option<Shipper>>;

    /// Allocate the next tracking number for a shipment with `shipper`
    async fn next_tracking_number(&self, shipper: &Shipper) -> Result<String>;
}

/// In-memory shipper directory (for development)
pub struct MemoryShipperDirectory {
    shippers: RwLock<BTreeMap<i32, Shipper>>,
    next_sequence: AtomicU64,
}

impl Default for MemoryShipperDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryShipperDirectory {
    pub fn new() -> Self {
        Self {
            shippers: RwLock::new(BTreeMap::new()),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn insert(&self, shipper: Shipper) -> Result<()> {
        let mut shippers = self.shippers.write().map_err(|_| Self::poisoned())?;
        shippers.insert(shipper.shipper_id, shipper);
        Ok(())
    }

    fn poisoned() -> CheckoutError {
        CheckoutError::Storage("shipper directory lock poisoned".into())
    }
}

#[async_trait]
impl ShipperDirectory for MemoryShipperDirectory {
    async fn shipping_options(&self, subtotal: Decimal) -> Result<Vec<ShippingOption>> {
        let shippers = self.shippers.read().map_err(|_| Self::poisoned())?;
        Ok(shippers
            .values()
            .map(|s| {
                let cost = s.shipping_cost(subtotal);
                ShippingOption {
                    shipper_id: s.shipper_id,
                    label: format!("{} - ${}", s.company_name, cost),
                    cost,
                }
            })
            .collect())
    }

    async fn shipper_by_id(&self, shipper_id: i32) -> Result<Option<Shipper>> {
        let shippers = self.shippers.read().map_err(|_| Self::poisoned())?;
        Ok(shippers.get(&shipper_id).cloned())
    }

    async fn next_tracking_number(&self, shipper: &Shipper) -> Result<String> {
        let seq = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let prefix: String = shipper
            .company_name
            .chars()
            .filter(char::is_ascii_alphabetic)
            .take(3)
            .collect::<String>()
            .to_uppercase();
        Ok(format!("{}{:010}", prefix, seq))
    }
}
