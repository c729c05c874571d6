//! # checkout-core
//!
//! Storefront checkout: card reconciliation, the per-user card vault, and the
//! orchestration that turns a submitted form into a paid order.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      CheckoutService                         │
//! │  ┌────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │ CardVault  │──│  reconcile   │──│  Authorizer          │  │
//! │  │ (CardStore)│  │  + validate  │  │  (Strategy)          │  │
//! │  └────────────┘  └──────────────┘  └──────────────────────┘  │
//! │        ▲                                     │               │
//! │        └──── save if remembered ◀────────────┤               │
//! │                                              ▼               │
//! │                              OrderStore (order + payment)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every collaborator is a trait with an in-memory implementation, so the
//! whole flow runs in tests without a database or a payment gateway.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_core::{CheckoutContext, CheckoutOutcome};
//!
//! let mut ctx = CheckoutContext::new("alice", cart);
//! match service.submit(&mut ctx, form).await? {
//!     CheckoutOutcome::Completed(done) => println!("order {}", done.order_id),
//!     CheckoutOutcome::Rejected { form, error } => redisplay(form, error),
//! }
//! ```

pub mod authorizer;
pub mod card;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod customer;
pub mod error;
pub mod order;
pub mod shipping;
pub mod vault;

pub use authorizer::{ApprovalCode, Authorizer, HttpAuthorizer, MockAuthorizer};
pub use card::{reconcile, EffectiveCard, Expiry, StoredCard, SubmittedCardInput};
pub use cart::{Cart, CartLine};
pub use checkout::{
    CheckoutContext, CheckoutForm, CheckoutOutcome, CheckoutPage, CheckoutService,
    CompletedCheckout, PackageTracking, ViewResult,
};
pub use config::CheckoutConfig;
pub use customer::{Customer, CustomerDirectory, MemoryCustomerDirectory};
pub use error::{CheckoutError, FormError, Result};
pub use order::{MemoryOrderStore, Order, OrderId, OrderPayment, OrderStore, ShipTo, Shipment};
pub use shipping::{MemoryShipperDirectory, Shipper, ShipperDirectory, ShippingOption};
pub use vault::{CardStore, CardVault, FileCardStore, MemoryCardStore};
