use super::resource_matcher::{LookupKey, ResourceMatcher};
use super::run_context::{RunContext, planned_id};
use super::submission::create_or_preview;
use crate::config::{RunConfig, Step};
use crate::error::AppError;
use crate::external::{AccountClient, list_typed};
use crate::models::{
    Coupon, CreatePromotionCode, Outcome, PromotionCode, ResourceKind, RunReport,
    create_coupon_params,
};

/// Migrates coupons by id, then the active promotion codes of each coupon.
pub struct CouponService<'a, C: ?Sized> {
    source: &'a C,
    target: &'a C,
    config: RunConfig,
}

impl<'a, C: AccountClient + ?Sized> CouponService<'a, C> {
    pub fn new(source: &'a C, target: &'a C, config: RunConfig) -> Self {
        Self {
            source,
            target,
            config,
        }
    }

    pub async fn run(&self, ctx: &mut RunContext, report: &mut RunReport) {
        // `applies_to` is only returned when expanded.
        let filters = [("expand[]", "data.applies_to".to_string())];
        let coupons: Vec<Coupon> = match list_typed(self.source, ResourceKind::Coupon, &filters).await {
            Ok(coupons) => coupons,
            Err(e) => {
                log::error!("Failed to list coupons from source account: {e}");
                report.record(Step::Coupons, ResourceKind::Coupon, "*", Outcome::failed(&e));
                return;
            }
        };
        log::info!("Found {} coupon(s) in source account", coupons.len());

        for coupon in &coupons {
            let target_coupon_id = self.migrate_coupon(ctx, report, coupon).await;
            ctx.coupons
                .insert(coupon.id.to_string(), target_coupon_id.clone());
            if let Some(target_coupon_id) = target_coupon_id {
                self.migrate_promotion_codes(ctx, report, coupon, &target_coupon_id)
                    .await;
            }
        }
    }

    /// Returns the target coupon id when the coupon exists (or would exist).
    async fn migrate_coupon(
        &self,
        ctx: &mut RunContext,
        report: &mut RunReport,
        coupon: &Coupon,
    ) -> Option<String> {
        if !coupon.valid.unwrap_or(true) {
            let err = AppError::PreconditionUnmet(format!(
                "coupon {} is no longer valid in source account",
                coupon.id
            ));
            report.record(
                Step::Coupons,
                ResourceKind::Coupon,
                coupon.id.as_str(),
                Outcome::failed(&err),
            );
            return None;
        }

        let matcher = ResourceMatcher::new(self.target);
        let (outcome, target_id) = match matcher.find_existing(ctx, &LookupKey::for_coupon(coupon)).await {
            Ok(Some(existing)) => {
                let id = existing.id.clone();
                (
                    Outcome::SkippedExisting {
                        target_id: Some(existing.id),
                    },
                    Some(id),
                )
            }
            Ok(None) => {
                let payload = create_coupon_params(coupon);
                match create_or_preview(self.target, self.config.live, ResourceKind::Coupon, &payload).await {
                    // Target coupons keep the source id.
                    Ok(submitted) => (submitted.outcome, Some(coupon.id.to_string())),
                    Err(e) => (Outcome::failed(&e), None),
                }
            }
            Err(e) => (Outcome::failed(&e), None),
        };

        report.record(Step::Coupons, ResourceKind::Coupon, coupon.id.as_str(), outcome);
        target_id
    }

    async fn migrate_promotion_codes(
        &self,
        ctx: &mut RunContext,
        report: &mut RunReport,
        coupon: &Coupon,
        target_coupon_id: &str,
    ) {
        let filters = [("coupon", coupon.id.to_string()), ("active", "true".to_string())];
        let codes: Vec<PromotionCode> =
            match list_typed(self.source, ResourceKind::PromotionCode, &filters).await {
                Ok(codes) => codes,
                Err(e) => {
                    log::error!("Failed to list promotion codes for coupon {}: {e}", coupon.id);
                    report.record(
                        Step::Coupons,
                        ResourceKind::PromotionCode,
                        format!("{}/*", coupon.id),
                        Outcome::failed(&e),
                    );
                    return;
                }
            };
        if !codes.is_empty() {
            log::info!("  Found {} active promotion code(s) for coupon {}", codes.len(), coupon.id);
        }

        for promotion_code in &codes {
            let outcome = self
                .migrate_promotion_code(ctx, promotion_code, target_coupon_id)
                .await;
            report.record(
                Step::Coupons,
                ResourceKind::PromotionCode,
                &promotion_code.id,
                outcome,
            );
        }
    }

    async fn migrate_promotion_code(
        &self,
        ctx: &mut RunContext,
        promotion_code: &PromotionCode,
        target_coupon_id: &str,
    ) -> Outcome {
        let matcher = ResourceMatcher::new(self.target);
        match matcher
            .find_existing(ctx, &LookupKey::for_promotion_code(promotion_code))
            .await
        {
            Ok(Some(existing)) => {
                return Outcome::SkippedExisting {
                    target_id: Some(existing.id),
                };
            }
            Ok(None) => {}
            Err(e) => return Outcome::failed(&e),
        }

        let payload = CreatePromotionCode::from_source(promotion_code, target_coupon_id);
        let code = promotion_code.code.clone();
        match create_or_preview(
            self.target,
            self.config.live,
            ResourceKind::PromotionCode,
            &payload,
        )
        .await
        {
            Ok(submitted) => {
                match (submitted.target_id(), self.config.live) {
                    (Some(id), _) => {
                        ctx.promotion_codes.insert(code, Some(id.to_string()));
                    }
                    (None, false) => {
                        let planned = planned_id(ResourceKind::PromotionCode, &promotion_code.id);
                        ctx.promotion_codes.insert(code, Some(planned));
                    }
                    // Created concurrently; look it up again next time.
                    (None, true) => {
                        ctx.promotion_codes.remove(&code);
                    }
                }
                submitted.outcome
            }
            Err(e) => Outcome::failed(&e),
        }
    }
}
