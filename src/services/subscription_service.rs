use super::payment_method_resolver::PaymentMethodResolver;
use super::price_mapper::PriceMapper;
use super::resource_matcher::{LookupKey, ResourceMatcher};
use super::run_context::{RunContext, SubscriptionKey, planned_id};
use super::submission::create_or_preview;
use crate::config::{RunConfig, Step};
use crate::error::{AppError, AppResult};
use crate::external::{AccountClient, list_typed, retrieve_optional};
use crate::models::{
    CreateSubscription, Discount, DiscountParams, Outcome, PromotionCode, ResourceKind, RunReport,
    Subscription, SubscriptionItemParams, expanded_id,
};

/// Recreates active source subscriptions in the target account. The target
/// subscription starts in a trial that ends when the source billing period
/// ends, so the customer is not charged twice for the same period.
pub struct SubscriptionService<'a, C: ?Sized> {
    source: &'a C,
    target: &'a C,
    config: RunConfig,
}

impl<'a, C: AccountClient + ?Sized> SubscriptionService<'a, C> {
    pub fn new(source: &'a C, target: &'a C, config: RunConfig) -> Self {
        Self {
            source,
            target,
            config,
        }
    }

    pub async fn run(&self, ctx: &mut RunContext, report: &mut RunReport) {
        let filters = [("status", "active".to_string())];
        let subscriptions: Vec<Subscription> =
            match list_typed(self.source, ResourceKind::Subscription, &filters).await {
                Ok(subscriptions) => subscriptions,
                Err(e) => {
                    log::error!("Failed to list subscriptions from source account: {e}");
                    report.record(
                        Step::Subscriptions,
                        ResourceKind::Subscription,
                        "*",
                        Outcome::failed(&e),
                    );
                    return;
                }
            };
        log::info!(
            "Found {} active subscription(s) in source account",
            subscriptions.len()
        );

        for subscription in &subscriptions {
            let outcome = match self.migrate_subscription(ctx, subscription).await {
                Ok(outcome) => outcome,
                Err(e) => Outcome::failed(&e),
            };
            report.record(
                Step::Subscriptions,
                ResourceKind::Subscription,
                &subscription.id,
                outcome,
            );
        }
    }

    async fn migrate_subscription(
        &self,
        ctx: &mut RunContext,
        subscription: &Subscription,
    ) -> AppResult<Outcome> {
        let customer_id = subscription.customer_id();
        log::info!(
            "Processing subscription {} for customer {}",
            subscription.id,
            customer_id
        );
        if subscription.items.data.is_empty() {
            return Err(AppError::PreconditionUnmet(format!(
                "subscription {} has no line items",
                subscription.id
            )));
        }

        let mapper = PriceMapper::new(
            self.target,
            self.config.price_status_policy,
            self.config.live,
        );
        let source_price_ids = subscription.price_ids();
        let target_price_ids = mapper.resolve_all(ctx, &source_price_ids).await?;
        let key = SubscriptionKey::new(customer_id.clone(), target_price_ids.clone());

        let lookup = LookupKey::Subscription {
            source_id: subscription.id.clone(),
            key: key.clone(),
        };
        if let Some(existing) = ResourceMatcher::new(self.target)
            .find_existing(ctx, &lookup)
            .await?
        {
            return Ok(Outcome::SkippedExisting {
                target_id: Some(existing.id),
            });
        }

        let trial_end = subscription.period_end().ok_or_else(|| {
            AppError::PreconditionUnmet(format!(
                "subscription {} reports no current period end",
                subscription.id
            ))
        })?;

        let discount = match &subscription.discount {
            Some(discount) => self.resolve_discount(ctx, discount).await?,
            None => None,
        };

        let Some(payment_method) = PaymentMethodResolver::new(self.target)
            .resolve_default_payment_method(ctx, &customer_id)
            .await?
        else {
            return Ok(Outcome::SkippedNoPaymentMethod {
                customer: customer_id,
            });
        };

        let items = subscription
            .items
            .data
            .iter()
            .zip(target_price_ids)
            .map(|(item, price)| SubscriptionItemParams {
                price,
                quantity: item.quantity,
            })
            .collect();
        let payload = CreateSubscription::new(
            &subscription.id,
            &customer_id,
            items,
            trial_end,
            &payment_method,
            discount,
        );

        // Only a subscription about to be created touches archived prices.
        mapper.reactivate_archived(ctx, &source_price_ids).await?;
        let submitted = create_or_preview(
            self.target,
            self.config.live,
            ResourceKind::Subscription,
            &payload,
        )
        .await?;
        let recorded_id = match submitted.target_id() {
            Some(id) => Some(id.to_string()),
            None if !self.config.live => {
                Some(planned_id(ResourceKind::Subscription, &subscription.id))
            }
            None => None,
        };
        if let Some(target_id) = recorded_id {
            ctx.record_subscription(&target_id, key, &subscription.id);
        }
        Ok(submitted.outcome)
    }

    /// Maps the source discount onto the target: promotion codes by code
    /// string, bare coupons by id.
    async fn resolve_discount(
        &self,
        ctx: &mut RunContext,
        discount: &Discount,
    ) -> AppResult<Option<DiscountParams>> {
        let matcher = ResourceMatcher::new(self.target);

        if let Some(source_code) = &discount.promotion_code {
            let source_code_id = expanded_id(source_code);
            let promotion_code: PromotionCode =
                retrieve_optional(self.source, ResourceKind::PromotionCode, &source_code_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::PreconditionUnmet(format!(
                            "promotion code {source_code_id} not found in source account"
                        ))
                    })?;
            let existing = matcher
                .find_existing(ctx, &LookupKey::for_promotion_code(&promotion_code))
                .await?
                .ok_or_else(|| {
                    AppError::PreconditionUnmet(format!(
                        "promotion code {} has not been migrated to target account",
                        promotion_code.code
                    ))
                })?;
            return Ok(Some(DiscountParams::PromotionCode(existing.id)));
        }

        let Some(coupon_id) = discount.coupon.as_ref().map(expanded_id) else {
            return Ok(None);
        };
        let target_coupon = match ctx.coupons.get(&coupon_id) {
            Some(cached) => cached.clone(),
            None => {
                let found = matcher
                    .find_existing(ctx, &LookupKey::Coupon(coupon_id.clone()))
                    .await?
                    .map(|existing| existing.id);
                ctx.coupons.insert(coupon_id.clone(), found.clone());
                found
            }
        };
        target_coupon
            .map(|id| Some(DiscountParams::Coupon(id)))
            .ok_or_else(|| {
                AppError::PreconditionUnmet(format!(
                    "coupon {coupon_id} is not available in target account"
                ))
            })
    }
}
