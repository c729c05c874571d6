//! Storefront Checkout Demo
//!
//! Runs two checkouts for the demo customer: the first with a new card that
//! gets remembered, the second reusing it through the masked form.

mod seed;

use std::sync::Arc;

use anyhow::bail;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_core::{
    CardVault, CheckoutConfig, CheckoutContext, CheckoutOutcome, CheckoutService, FileCardStore,
    MemoryOrderStore, SubmittedCardInput,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,checkout_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = CheckoutConfig::from_env()?;
    tracing::info!(vault = %config.vault_path.display(), "Using card vault");

    let authorizer = seed::authorizer(&config)?;
    tracing::info!(authorizer = authorizer.name(), "Payment authorizer ready");

    let vault = Arc::new(CardVault::new(Arc::new(FileCardStore::new(&config.vault_path))));
    let orders = Arc::new(MemoryOrderStore::new());

    let service = CheckoutService::new(
        config,
        vault,
        seed::customers()?,
        seed::shippers()?,
        orders,
        authorizer,
    );

    // First visit: no card on file unless a previous run remembered one
    let mut ctx = CheckoutContext::new(seed::DEMO_USER, seed::cart());
    let page = service.checkout_form(&ctx).await?;
    if let Some(error) = page.error {
        bail!("checkout page unavailable: {error}");
    }
    for option in &page.shipping_options {
        tracing::info!("  Shipping: {}", option.label);
    }

    let mut form = page.form;
    form.shipping_method = 1;
    if form.card.number_field.is_empty() {
        let year = page.available_expiration_years.last().copied().unwrap_or_default();
        form.card = SubmittedCardInput::new("4111111111111111", 12, year);
    }
    form.remember_card = true;
    run_checkout(&service, &mut ctx, form).await?;

    // Second visit: the form comes back masked and is submitted untouched
    let mut ctx = CheckoutContext::new(seed::DEMO_USER, seed::cart());
    let page = service.checkout_form(&ctx).await?;
    tracing::info!(card = %page.form.card.number_field, "Card on file");

    let mut form = page.form;
    form.shipping_method = 2;
    form.remember_card = false;
    run_checkout(&service, &mut ctx, form).await?;

    if let Ok(orders) = service.receipts(&ctx).await? {
        tracing::info!("{} orders on record for {}", orders.len(), seed::DEMO_USER);
    }

    Ok(())
}

async fn run_checkout(
    service: &CheckoutService,
    ctx: &mut CheckoutContext,
    form: checkout_core::CheckoutForm,
) -> anyhow::Result<()> {
    match service.submit(ctx, form).await? {
        CheckoutOutcome::Completed(done) => {
            let order = service.receipt(ctx, None).await?;
            match order {
                Ok(order) => {
                    let tracking = order
                        .shipment
                        .as_ref()
                        .map(|s| s.tracking_number.as_str())
                        .unwrap_or("-");
                    tracing::info!(
                        order_id = %done.order_id,
                        total = %done.total,
                        approval_code = %done.approval_code,
                        tracking = %tracking,
                        "Receipt"
                    );
                }
                Err(error) => tracing::warn!(%error, "Receipt unavailable"),
            }
        }
        CheckoutOutcome::Rejected { error, .. } => {
            tracing::warn!(%error, "Checkout rejected");
        }
    }
    Ok(())
}
