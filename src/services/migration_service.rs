use super::coupon_service::CouponService;
use super::product_service::ProductService;
use super::run_context::RunContext;
use super::subscription_service::SubscriptionService;
use crate::config::{RunConfig, Step};
use crate::external::AccountClient;
use crate::models::RunReport;

/// Runs the configured step(s) in dependency order and collects every item
/// outcome into one report. Item failures never abort the run.
pub struct MigrationService<'a, C: ?Sized> {
    source: &'a C,
    target: &'a C,
    config: RunConfig,
}

impl<'a, C: AccountClient + ?Sized> MigrationService<'a, C> {
    pub fn new(source: &'a C, target: &'a C, config: RunConfig) -> Self {
        Self {
            source,
            target,
            config,
        }
    }

    pub async fn run(&self) -> RunReport {
        let mut ctx = RunContext::new();
        let mut report = RunReport::new(self.config.live);
        let mode = if self.config.live { "LIVE" } else { "DRY RUN" };

        for step in self.config.step.expand() {
            log::info!("Starting step '{step}' ({mode})");
            match step {
                Step::Products => {
                    ProductService::new(self.source, self.target, self.config)
                        .run(&mut ctx, &mut report)
                        .await
                }
                Step::Coupons => {
                    CouponService::new(self.source, self.target, self.config)
                        .run(&mut ctx, &mut report)
                        .await
                }
                Step::Subscriptions => {
                    SubscriptionService::new(self.source, self.target, self.config)
                        .run(&mut ctx, &mut report)
                        .await
                }
                // `expand` never yields `All`.
                Step::All => continue,
            }
            let done = report.items_for(step).count();
            log::info!("Finished step '{step}': {done} item(s)");
        }

        let summary = report.summary();
        log::info!(
            "Migration summary: created={} skipped_existing={} would_create={} skipped_no_payment_method={} failed={}",
            summary.created,
            summary.skipped_existing,
            summary.would_create,
            summary.skipped_no_payment_method,
            summary.failed
        );
        report
    }
}
