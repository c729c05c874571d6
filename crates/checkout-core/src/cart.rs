//! Shopping Cart

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One product line in the cart (and later in the order)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i32,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,

    /// Fractional discount, 0.15 = 15% off
    #[serde(default)]
    pub discount: Decimal,
}

impl CartLine {
    pub fn new(product_id: i32, product_name: impl Into<String>, unit_price: Decimal, quantity: u32) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            unit_price,
            quantity,
            discount: Decimal::ZERO,
        }
    }

    pub fn with_discount(mut self, discount: Decimal) -> Self {
        self.discount = discount;
        self
    }

    /// Extended price after discount, rounded to cents
    pub fn extended_price(&self) -> Decimal {
        (self.unit_price * Decimal::from(self.quantity) * (Decimal::ONE - self.discount)).round_dp(2)
    }
}

/// Cart carried by the shopper's request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line, merging quantities for a product already in the cart
    pub fn add(&mut self, line: CartLine) {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == line.product_id) {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
        } else {
            self.lines.push(line);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn subtotal(&self) -> Decimal {
        lines_subtotal(&self.lines)
    }
}

/// Subtotal of a set of lines
pub(crate) fn lines_subtotal(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::extended_price).sum()
}
