//! Checkout Orchestration
//!
//! Drives one checkout submission from the shopper's form to a paid order:
//!
//! ```text
//! identify ─▶ cart ─▶ shipper ─▶ load card ─▶ reconcile ─▶ validate
//!                                                             │
//!                      FormError ◀── declined ◀── authorize ◀─┘
//!                                                    │
//!                           remember? ─▶ order ─▶ payment ─▶ done
//! ```
//!
//! Anything the shopper can fix comes back as a [`FormError`] alongside the
//! form they submitted; only infrastructure faults surface as `Err`.

use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::authorizer::{ApprovalCode, Authorizer};
use crate::card::{reconcile, SubmittedCardInput};
use crate::cart::Cart;
use crate::config::CheckoutConfig;
use crate::customer::{Customer, CustomerDirectory};
use crate::error::{CheckoutError, FormError, Result};
use crate::order::{Order, OrderId, OrderPayment, OrderStore, ShipTo, Shipment};
use crate::shipping::{ShipperDirectory, ShippingOption};
use crate::vault::CardVault;

/// User-facing outcome of a view: the model, or the error to show instead
pub type ViewResult<T> = std::result::Result<T, FormError>;

/// Request-scoped state the storefront keeps between pages
#[derive(Clone, Debug, Default)]
pub struct CheckoutContext {
    /// Authenticated username, `None` when logged out
    pub username: Option<String>,

    pub cart: Option<Cart>,

    /// Order placed by the last completed checkout
    pub pending_order_id: Option<OrderId>,
}

impl CheckoutContext {
    pub fn new(username: impl Into<String>, cart: Cart) -> Self {
        Self {
            username: Some(username.into()),
            cart: Some(cart),
            pending_order_id: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Checkout form fields
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutForm {
    pub ship_target: String,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub shipping_method: i32,
    pub card: SubmittedCardInput,
    #[serde(default)]
    pub remember_card: bool,
}

impl CheckoutForm {
    fn ship_to(&self) -> ShipTo {
        ShipTo {
            name: self.ship_target.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            region: self.region.clone(),
            postal_code: self.postal_code.clone(),
            country: self.country.clone(),
        }
    }
}

/// Everything the checkout page needs to render
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckoutPage {
    /// Pre-filled form; the card number is masked
    pub form: CheckoutForm,
    pub cart: Option<Cart>,
    pub available_expiration_years: Vec<i32>,
    pub shipping_options: Vec<ShippingOption>,
    pub error: Option<FormError>,
}

/// Paid order summary
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletedCheckout {
    pub order_id: OrderId,
    pub approval_code: ApprovalCode,
    pub total: Decimal,
}

/// Result of submitting the checkout form
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Completed(CompletedCheckout),

    /// Redisplay `form` as submitted, with `error`
    Rejected { form: CheckoutForm, error: FormError },
}

/// Package tracking page model
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PackageTracking {
    pub selected_carrier: Option<String>,
    pub selected_tracking_number: Option<String>,
    pub orders: Vec<Order>,
}

/// Checkout orchestrator
pub struct CheckoutService {
    config: CheckoutConfig,
    vault: Arc<CardVault>,
    customers: Arc<dyn CustomerDirectory>,
    shippers: Arc<dyn ShipperDirectory>,
    orders: Arc<dyn OrderStore>,
    authorizer: Arc<dyn Authorizer>,
}

impl CheckoutService {
    pub fn new(
        config: CheckoutConfig,
        vault: Arc<CardVault>,
        customers: Arc<dyn CustomerDirectory>,
        shippers: Arc<dyn ShipperDirectory>,
        orders: Arc<dyn OrderStore>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            config,
            vault,
            customers,
            shippers,
            orders,
            authorizer,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Build the checkout page for the current shopper
    pub async fn checkout_form(&self, ctx: &CheckoutContext) -> Result<CheckoutPage> {
        let mut page = CheckoutPage::default();

        let Some(customer) = self.identify(ctx).await? else {
            page.error = Some(FormError::NotIdentified);
            return Ok(page);
        };

        let stored = self.vault.load_card(&customer.username).await?;
        page.form.card = SubmittedCardInput::new(
            stored.masked_number(),
            stored.expiry.month,
            stored.expiry.year,
        );

        let cart = match ctx.cart.as_ref() {
            Some(cart) if !cart.is_empty() => cart,
            _ => {
                page.error = Some(FormError::EmptyCart);
                return Ok(page);
            }
        };

        page.form.ship_target = customer.company_name.clone();
        page.form.address = customer.address.clone();
        page.form.city = customer.city.clone();
        page.form.region = customer.region.clone();
        page.form.postal_code = customer.postal_code.clone();
        page.form.country = customer.country.clone();

        let this_year = Utc::now().year();
        page.available_expiration_years = (0..self.config.expiration_year_window)
            .map(|offset| this_year + offset as i32)
            .collect();

        page.shipping_options = self.shippers.shipping_options(cart.subtotal()).await?;
        page.cart = Some(cart.clone());

        Ok(page)
    }

    /// Process a submitted checkout form.
    ///
    /// On success the cart is cleared and `ctx.pending_order_id` points at
    /// the new order.
    pub async fn submit(&self, ctx: &mut CheckoutContext, form: CheckoutForm) -> Result<CheckoutOutcome> {
        let Some(customer) = self.identify(ctx).await? else {
            return Ok(rejected(form, FormError::NotIdentified));
        };

        let cart = match ctx.cart.as_ref() {
            Some(cart) if !cart.is_empty() => cart.clone(),
            _ => return Ok(rejected(form, FormError::EmptyCart)),
        };

        let shipping_method = form.shipping_method;
        let Some(shipper) = self.shippers.shipper_by_id(shipping_method).await? else {
            return Ok(rejected(form, FormError::UnknownShipper(shipping_method)));
        };

        let now = Utc::now();
        let mut order = Order {
            order_id: None,
            customer_id: customer.customer_id.clone(),
            order_date: now,
            required_date: now + Duration::days(self.config.required_in_days),
            shipped_date: now + Duration::days(self.config.ships_in_days),
            ship_via: shipper.shipper_id,
            ship_to: form.ship_to(),
            freight: shipper.shipping_cost(cart.subtotal()),
            lines: cart.lines,
            shipment: None,
        };
        let total = order.total();

        let stored = self.vault.load_card(&customer.username).await?;
        let (card, decision) = reconcile(&stored, &form.card);
        tracing::debug!(
            user = %customer.username,
            new_card = decision.new_card,
            number_changed = decision.number_changed,
            expiry_changed = decision.expiry_changed,
            "Reconciled card"
        );

        if let Err(reason) = card.validate() {
            tracing::warn!(
                user = %customer.username,
                reason = reason.as_str(),
                "Rejected card"
            );
            return Ok(rejected(form, FormError::InvalidCard));
        }

        let approval_code = match self.authorizer.charge_card(&card, total).await {
            Ok(code) => code,
            Err(err @ (CheckoutError::Declined(_) | CheckoutError::AuthorizerUnavailable(_))) => {
                tracing::warn!(
                    user = %customer.username,
                    card = %card.fingerprint(),
                    authorizer = self.authorizer.name(),
                    error = %err,
                    "Payment not authorized"
                );
                let reason = err.user_message().to_string();
                return Ok(rejected(form, FormError::PaymentDeclined(reason)));
            }
            Err(err) => return Err(err),
        };

        if form.remember_card {
            self.vault.save_card(&customer.username, &card).await?;
        }

        let tracking_number = self.shippers.next_tracking_number(&shipper).await?;
        order.shipment = Some(Shipment {
            shipment_date: now.date_naive() + Duration::days(self.config.shipment_in_days),
            shipper_id: shipper.shipper_id,
            tracking_number,
        });

        let order_id = self.orders.create_order(order).await?;
        ctx.pending_order_id = Some(order_id);
        ctx.cart = None;

        self.orders
            .create_order_payment(OrderPayment {
                order_id,
                amount: total,
                card_number: card.number.clone(),
                expiry: card.expiry,
                approval_code: approval_code.clone(),
                payment_date: now,
            })
            .await?;

        tracing::info!(
            user = %customer.username,
            order_id = %order_id,
            total = %total,
            card = %card.fingerprint(),
            approval_code = %approval_code,
            "Checkout completed"
        );

        Ok(CheckoutOutcome::Completed(CompletedCheckout {
            order_id,
            approval_code,
            total,
        }))
    }

    /// Receipt for `order_id`, or for the order just placed
    pub async fn receipt(&self, ctx: &CheckoutContext, order_id: Option<OrderId>) -> Result<ViewResult<Order>> {
        let Some(order_id) = order_id.or(ctx.pending_order_id) else {
            return Ok(Err(FormError::NoOrderSpecified));
        };

        match self.orders.order_by_id(order_id).await? {
            Some(order) => Ok(Ok(order)),
            None => {
                tracing::debug!(order_id = %order_id, "Receipt for unknown order");
                Ok(Err(FormError::OrderNotFound(order_id)))
            }
        }
    }

    /// Every order the current shopper has placed
    pub async fn receipts(&self, ctx: &CheckoutContext) -> Result<ViewResult<Vec<Order>>> {
        self.customer_orders(ctx).await
    }

    pub async fn package_tracking(
        &self,
        ctx: &CheckoutContext,
        carrier: Option<String>,
        tracking_number: Option<String>,
    ) -> Result<ViewResult<PackageTracking>> {
        Ok(self.customer_orders(ctx).await?.map(|orders| PackageTracking {
            selected_carrier: carrier,
            selected_tracking_number: tracking_number,
            orders,
        }))
    }

    async fn customer_orders(&self, ctx: &CheckoutContext) -> Result<ViewResult<Vec<Order>>> {
        let Some(customer) = self.identify(ctx).await? else {
            return Ok(Err(FormError::NotIdentified));
        };
        Ok(Ok(self.orders.orders_by_customer(&customer.customer_id).await?))
    }

    async fn identify(&self, ctx: &CheckoutContext) -> Result<Option<Customer>> {
        match ctx.username.as_deref() {
            Some(username) => self.customers.customer_by_username(username).await,
            None => Ok(None),
        }
    }
}

fn rejected(form: CheckoutForm, error: FormError) -> CheckoutOutcome {
    tracing::warn!(error = %error, "Checkout rejected");
    CheckoutOutcome::Rejected { form, error }
}
