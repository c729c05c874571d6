//! Demo Catalog
//!
//! Customers, shippers and a cart to run checkouts against.

use std::sync::Arc;

use anyhow::Context;
use rust_decimal_macros::dec;

use checkout_core::{
    Authorizer, Cart, CartLine, CheckoutConfig, Customer, HttpAuthorizer,
    MemoryCustomerDirectory, MemoryShipperDirectory, MockAuthorizer, Shipper,
};

pub const DEMO_USER: &str = "alfki";

pub fn customers() -> anyhow::Result<Arc<MemoryCustomerDirectory>> {
    let directory = MemoryCustomerDirectory::new();
    directory.insert(Customer {
        customer_id: "ALFKI".into(),
        username: DEMO_USER.into(),
        company_name: "Alfreds Futterkiste".into(),
        address: "Obere Str. 57".into(),
        city: "Berlin".into(),
        region: None,
        postal_code: "12209".into(),
        country: "Germany".into(),
    })?;
    Ok(Arc::new(directory))
}

pub fn shippers() -> anyhow::Result<Arc<MemoryShipperDirectory>> {
    let directory = MemoryShipperDirectory::new();
    directory.insert(Shipper::new(1, "Speedy Express", dec!(4.50), dec!(0.03)))?;
    directory.insert(Shipper::new(2, "United Package", dec!(8.00), dec!(0.02)))?;
    directory.insert(Shipper::new(3, "Federal Shipping", dec!(12.00), dec!(0)))?;
    Ok(Arc::new(directory))
}

pub fn cart() -> Cart {
    let mut cart = Cart::new();
    cart.add(CartLine::new(1, "Chai", dec!(18.00), 2));
    cart.add(CartLine::new(14, "Tofu", dec!(23.25), 1).with_discount(dec!(0.05)));
    cart
}

/// Payment gateway if one is configured, otherwise the mock
pub fn authorizer(config: &CheckoutConfig) -> anyhow::Result<Arc<dyn Authorizer>> {
    match config.gateway_url {
        Some(ref url) => {
            let gateway = HttpAuthorizer::new(url.clone(), config.gateway_api_key.clone(), config.gateway_timeout)
                .context("building payment gateway client")?;
            Ok(Arc::new(gateway))
        }
        None => Ok(Arc::new(MockAuthorizer::new().declining("0002"))),
    }
}
