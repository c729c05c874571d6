//! Orders and Payments
//!
//! Order records, payment records and the store they are persisted to.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::authorizer::ApprovalCode;
use crate::card::Expiry;
use crate::cart::{lines_subtotal, CartLine};
use crate::error::{CheckoutError, Result};

/// Order identifier assigned by the order store
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an order ships to
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipTo {
    pub name: String,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Carrier hand-off details
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub shipment_date: NaiveDate,
    pub shipper_id: i32,
    pub tracking_number: String,
}

/// A placed order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Assigned on creation; ignored when passed to `create_order`
    pub order_id: Option<OrderId>,
    pub customer_id: String,
    pub order_date: DateTime<Utc>,
    pub required_date: DateTime<Utc>,
    pub shipped_date: DateTime<Utc>,
    pub ship_via: i32,
    pub ship_to: ShipTo,
    pub lines: Vec<CartLine>,
    pub freight: Decimal,
    pub shipment: Option<Shipment>,
}

impl Order {
    pub fn subtotal(&self) -> Decimal {
        lines_subtotal(&self.lines)
    }

    /// Amount charged to the card
    pub fn total(&self) -> Decimal {
        self.subtotal() + self.freight
    }
}

/// Payment taken for an order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayment {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub card_number: String,
    pub expiry: Expiry,
    pub approval_code: ApprovalCode,
    pub payment_date: DateTime<Utc>,
}

/// Order persistence trait
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order and return its id
    async fn create_order(&self, order: Order) -> Result<OrderId>;

    async fn create_order_payment(&self, payment: OrderPayment) -> Result<()>;

    /// `None` when no such order exists
    async fn order_by_id(&self, order_id: OrderId) -> Result<Option<Order>>;

    async fn orders_by_customer(&self, customer_id: &str) -> Result<Vec<Order>>;
}

/// In-memory order store (for development)
pub struct MemoryOrderStore {
    orders: RwLock<BTreeMap<OrderId, Order>>,
    payments: RwLock<Vec<OrderPayment>>,
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(BTreeMap::new()),
            payments: RwLock::new(Vec::new()),
        }
    }

    /// Payments recorded for an order
    pub fn payments_for(&self, order_id: OrderId) -> Result<Vec<OrderPayment>> {
        let payments = self.payments.read().map_err(|_| Self::poisoned())?;
        Ok(payments.iter().filter(|p| p.order_id == order_id).cloned().collect())
    }

    pub fn order_count(&self) -> Result<usize> {
        let orders = self.orders.read().map_err(|_| Self::poisoned())?;
        Ok(orders.len())
    }

    fn poisoned() -> CheckoutError {
        CheckoutError::Storage("order store lock poisoned".into())
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create_order(&self, mut order: Order) -> Result<OrderId> {
        let mut orders = self.orders.write().map_err(|_| Self::poisoned())?;
        let next = orders.keys().next_back().map_or(10_248, |id| id.0 + 1);
        let order_id = OrderId(next);
        order.order_id = Some(order_id);
        orders.insert(order_id, order);
        Ok(order_id)
    }

    async fn create_order_payment(&self, payment: OrderPayment) -> Result<()> {
        {
            let orders = self.orders.read().map_err(|_| Self::poisoned())?;
            if !orders.contains_key(&payment.order_id) {
                return Err(CheckoutError::Storage(format!(
                    "payment references unknown order {}",
                    payment.order_id
                )));
            }
        }
        let mut payments = self.payments.write().map_err(|_| Self::poisoned())?;
        payments.push(payment);
        Ok(())
    }

    async fn order_by_id(&self, order_id: OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().map_err(|_| Self::poisoned())?;
        Ok(orders.get(&order_id).cloned())
    }

    async fn orders_by_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let orders = self.orders.read().map_err(|_| Self::poisoned())?;
        Ok(orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect())
    }
}
