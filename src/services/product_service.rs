use super::resource_matcher::{LookupKey, ResourceMatcher};
use super::run_context::{RunContext, TargetPrice};
use super::submission::create_or_preview;
use crate::config::{RunConfig, Step};
use crate::error::AppError;
use crate::external::{AccountClient, list_typed};
use crate::models::{
    CreatePrice, Outcome, Price, Product, ResourceKind, RunReport, create_product_params,
};

/// Migrates active products and their active prices.
pub struct ProductService<'a, C: ?Sized> {
    source: &'a C,
    target: &'a C,
    config: RunConfig,
}

impl<'a, C: AccountClient + ?Sized> ProductService<'a, C> {
    pub fn new(source: &'a C, target: &'a C, config: RunConfig) -> Self {
        Self {
            source,
            target,
            config,
        }
    }

    pub async fn run(&self, ctx: &mut RunContext, report: &mut RunReport) {
        let products: Vec<Product> = match list_typed(
            self.source,
            ResourceKind::Product,
            &[("active", "true".to_string())],
        )
        .await
        {
            Ok(products) => products,
            Err(e) => {
                log::error!("Failed to list products from source account: {e}");
                report.record(Step::Products, ResourceKind::Product, "*", Outcome::failed(&e));
                return;
            }
        };
        log::info!("Found {} active product(s) in source account", products.len());

        for product in &products {
            let available = self.migrate_product(ctx, report, product).await;
            self.migrate_prices(ctx, report, product, available).await;
        }
    }

    /// Returns whether the product exists (or would exist) in the target.
    async fn migrate_product(
        &self,
        ctx: &mut RunContext,
        report: &mut RunReport,
        product: &Product,
    ) -> bool {
        log::info!(
            "Processing product {} ({})",
            product.name.as_deref().unwrap_or_default(),
            product.id
        );
        let matcher = ResourceMatcher::new(self.target);
        let outcome = match matcher.find_existing(ctx, &LookupKey::for_product(product)).await {
            Ok(Some(existing)) => Outcome::SkippedExisting {
                target_id: Some(existing.id),
            },
            Ok(None) => {
                let payload = create_product_params(product);
                match create_or_preview(self.target, self.config.live, ResourceKind::Product, &payload).await {
                    Ok(submitted) => submitted.outcome,
                    Err(e) => Outcome::failed(&e),
                }
            }
            Err(e) => Outcome::failed(&e),
        };

        let available = !matches!(outcome, Outcome::Failed { .. });
        report.record(Step::Products, ResourceKind::Product, product.id.as_str(), outcome);
        available
    }

    async fn migrate_prices(
        &self,
        ctx: &mut RunContext,
        report: &mut RunReport,
        product: &Product,
        product_available: bool,
    ) {
        let filters = [
            ("product", product.id.to_string()),
            ("active", "true".to_string()),
            ("expand[]", "data.tiers".to_string()),
        ];
        let prices: Vec<Price> = match list_typed(self.source, ResourceKind::Price, &filters).await {
            Ok(prices) => prices,
            Err(e) => {
                log::error!("Failed to list prices for source product {}: {e}", product.id);
                report.record(
                    Step::Products,
                    ResourceKind::Price,
                    format!("{}/*", product.id),
                    Outcome::failed(&e),
                );
                return;
            }
        };
        log::info!("  Found {} active price(s) for product {}", prices.len(), product.id);

        for price in &prices {
            let outcome = if product_available {
                self.migrate_price(ctx, price).await
            } else {
                Outcome::failed(&AppError::PreconditionUnmet(format!(
                    "product {} is not available in target account",
                    product.id
                )))
            };
            report.record(Step::Products, ResourceKind::Price, &price.id, outcome);
        }
    }

    async fn migrate_price(&self, ctx: &mut RunContext, price: &Price) -> Outcome {
        let matcher = ResourceMatcher::new(self.target);
        match matcher.find_existing(ctx, &LookupKey::for_price(price)).await {
            Ok(Some(existing)) => {
                return Outcome::SkippedExisting {
                    target_id: Some(existing.id),
                };
            }
            Ok(None) => {}
            Err(e) => return Outcome::failed(&e),
        }

        // Target products reuse the source product id.
        let target_product_id = price.product_id();
        let payload = CreatePrice::from_source(price, &target_product_id, self.config.price_status_policy);
        match create_or_preview(self.target, self.config.live, ResourceKind::Price, &payload).await {
            Ok(submitted) => {
                if let Some(target_id) = submitted.target_id() {
                    ctx.record_price(
                        &price.id,
                        TargetPrice {
                            id: target_id.to_string(),
                            active: payload.active,
                        },
                    );
                } else if !self.config.live {
                    ctx.plan_price(&price.id);
                }
                submitted.outcome
            }
            Err(e) => Outcome::failed(&e),
        }
    }
}
