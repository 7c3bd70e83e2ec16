use serde_json::json;
use std::collections::BTreeSet;

use super::run_context::{RunContext, TargetPrice};
use crate::config::PriceStatusPolicy;
use crate::error::{AppError, AppResult};
use crate::external::AccountClient;
use crate::models::{ResourceKind, SOURCE_PRICE_ID};

/// Resolves source price ids to target price ids through the
/// `source_price_id` metadata written when prices were migrated.
pub struct PriceMapper<'a, C: ?Sized> {
    target: &'a C,
    policy: PriceStatusPolicy,
    live: bool,
}

impl<'a, C: AccountClient + ?Sized> PriceMapper<'a, C> {
    pub fn new(target: &'a C, policy: PriceStatusPolicy, live: bool) -> Self {
        Self {
            target,
            policy,
            live,
        }
    }

    pub async fn resolve_target_price_id(
        &self,
        ctx: &mut RunContext,
        source_price_id: &str,
    ) -> AppResult<String> {
        let mut resolved = self
            .resolve_all(ctx, &[source_price_id.to_string()])
            .await?;
        resolved
            .pop()
            .ok_or_else(|| AppError::PreconditionUnmet(missing_message([source_price_id])))
    }

    /// Resolves every id or fails naming all the ids without a mapping.
    /// Never writes to the target; see [`PriceMapper::reactivate_archived`].
    pub async fn resolve_all(
        &self,
        ctx: &mut RunContext,
        source_price_ids: &[String],
    ) -> AppResult<Vec<String>> {
        let index = ctx.price_index(self.target).await?;
        let mut found: Vec<Option<TargetPrice>> = source_price_ids
            .iter()
            .map(|source_id| index.get(source_id).cloned())
            .collect();

        // A dry run treats prices it would have created as mapped.
        if !self.live {
            for (slot, source_id) in found.iter_mut().zip(source_price_ids) {
                if slot.is_none()
                    && let Some(planned) = ctx.planned_price(source_id)
                {
                    *slot = Some(TargetPrice {
                        id: planned,
                        active: true,
                    });
                }
            }
        }

        let missing: BTreeSet<&str> = found
            .iter()
            .zip(source_price_ids)
            .filter(|(slot, _)| slot.is_none())
            .map(|(_, source_id)| source_id.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::PreconditionUnmet(missing_message(missing)));
        }

        Ok(found.into_iter().flatten().map(|price| price.id).collect())
    }

    /// Under the `unarchive` policy, reactivates the archived target prices
    /// mapped from these source ids. Call it only once nothing else can stop
    /// the subscription that needs them.
    pub async fn reactivate_archived(
        &self,
        ctx: &mut RunContext,
        source_price_ids: &[String],
    ) -> AppResult<()> {
        if self.policy != PriceStatusPolicy::Unarchive {
            return Ok(());
        }
        let index = ctx.price_index(self.target).await?;
        let archived: Vec<(String, TargetPrice)> = source_price_ids
            .iter()
            .filter_map(|source_id| {
                index
                    .get(source_id)
                    .filter(|price| !price.active)
                    .map(|price| (source_id.clone(), price.clone()))
            })
            .collect();
        for (source_id, price) in &archived {
            self.reconcile_status(ctx, source_id, price).await?;
        }
        Ok(())
    }

    async fn reconcile_status(
        &self,
        ctx: &mut RunContext,
        source_id: &str,
        price: &TargetPrice,
    ) -> AppResult<()> {
        if price.active || self.policy != PriceStatusPolicy::Unarchive {
            return Ok(());
        }
        if !self.live {
            log::info!(
                "[Dry Run] Would reactivate archived target price {} (source {})",
                price.id,
                source_id
            );
            return Ok(());
        }

        self.target
            .update(ResourceKind::Price, &price.id, &json!({"active": true}))
            .await?;
        log::info!(
            "Reactivated archived target price {} (source {})",
            price.id,
            source_id
        );
        ctx.record_price(
            source_id,
            TargetPrice {
                id: price.id.clone(),
                active: true,
            },
        );
        Ok(())
    }
}

fn missing_message<'s>(ids: impl IntoIterator<Item = &'s str>) -> String {
    let ids: Vec<&str> = ids.into_iter().collect();
    format!(
        "no target price carries {SOURCE_PRICE_ID} for source price(s): {}",
        ids.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::memory::MemoryAccount;
    use serde_json::Value;

    fn target_with_prices(prices: Vec<Value>) -> MemoryAccount {
        prices
            .into_iter()
            .fold(MemoryAccount::new(), |acc, p| acc.with(ResourceKind::Price, p))
    }

    #[tokio::test]
    async fn test_resolves_through_metadata() {
        let target = target_with_prices(vec![json!({
            "id": "price_t1", "product": "prod_1", "currency": "usd", "active": true,
            "metadata": {"source_price_id": "price_1"}
        })]);
        let mapper = PriceMapper::new(&target, PriceStatusPolicy::Preserve, true);
        let mut ctx = RunContext::new();
        assert_eq!(
            mapper.resolve_target_price_id(&mut ctx, "price_1").await.unwrap(),
            "price_t1"
        );
    }

    #[tokio::test]
    async fn test_reports_every_missing_price() {
        let target = target_with_prices(vec![json!({
            "id": "price_t1", "product": "prod_1", "currency": "usd",
            "metadata": {"source_price_id": "price_1"}
        })]);
        let mapper = PriceMapper::new(&target, PriceStatusPolicy::Preserve, true);
        let mut ctx = RunContext::new();
        let err = mapper
            .resolve_all(
                &mut ctx,
                &["price_3".to_string(), "price_1".to_string(), "price_2".to_string()],
            )
            .await
            .unwrap_err();
        match err {
            AppError::PreconditionUnmet(msg) => {
                assert!(msg.contains("price_2, price_3"), "{msg}");
                assert!(!msg.contains("price_1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unarchive_reactivates_in_live_mode_only() {
        let archived = json!({
            "id": "price_t1", "product": "prod_1", "currency": "usd", "active": false,
            "metadata": {"source_price_id": "price_1"}
        });

        let ids = ["price_1".to_string()];

        let target = target_with_prices(vec![archived.clone()]);
        let mut ctx = RunContext::new();
        PriceMapper::new(&target, PriceStatusPolicy::Unarchive, false)
            .reactivate_archived(&mut ctx, &ids)
            .await
            .unwrap();
        assert!(target.updates(ResourceKind::Price).is_empty());

        let target = target_with_prices(vec![archived]);
        let mut ctx = RunContext::new();
        let mapper = PriceMapper::new(&target, PriceStatusPolicy::Unarchive, true);
        mapper.reactivate_archived(&mut ctx, &ids).await.unwrap();
        let updates = target.updates(ResourceKind::Price);
        assert_eq!(updates, vec![("price_t1".to_string(), json!({"active": true}))]);

        // The index now knows the price is active again.
        mapper.reactivate_archived(&mut ctx, &ids).await.unwrap();
        assert_eq!(target.updates(ResourceKind::Price).len(), 1);
    }

    #[tokio::test]
    async fn test_resolving_never_writes() {
        let target = target_with_prices(vec![json!({
            "id": "price_t1", "product": "prod_1", "currency": "usd", "active": false,
            "metadata": {"source_price_id": "price_1"}
        })]);
        let mut ctx = RunContext::new();
        let mapper = PriceMapper::new(&target, PriceStatusPolicy::Unarchive, true);
        let resolved = mapper
            .resolve_all(&mut ctx, &["price_1".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved, vec!["price_t1".to_string()]);
        assert_eq!(target.total_writes(), 0);
    }

    #[tokio::test]
    async fn test_preserve_leaves_archived_price_alone() {
        let target = target_with_prices(vec![json!({
            "id": "price_t1", "product": "prod_1", "currency": "usd", "active": false,
            "metadata": {"source_price_id": "price_1"}
        })]);
        let mut ctx = RunContext::new();
        PriceMapper::new(&target, PriceStatusPolicy::Preserve, true)
            .resolve_target_price_id(&mut ctx, "price_1")
            .await
            .unwrap();
        assert_eq!(target.total_writes(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_uses_planned_prices() {
        let target = MemoryAccount::new();
        let mut ctx = RunContext::new();
        ctx.plan_price("price_1");
        let mapper = PriceMapper::new(&target, PriceStatusPolicy::Preserve, false);
        let id = mapper.resolve_target_price_id(&mut ctx, "price_1").await.unwrap();
        assert_eq!(id, "planned:prices:price_1");

        let live = PriceMapper::new(&target, PriceStatusPolicy::Preserve, true);
        assert!(live.resolve_target_price_id(&mut ctx, "price_1").await.is_err());
    }
}
