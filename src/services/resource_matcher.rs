use serde_json::Value;

use super::run_context::{RunContext, SubscriptionKey};
use crate::error::AppResult;
use crate::external::{AccountClient, list_typed, retrieve_optional};
use crate::models::{Coupon, Price, Product, PromotionCode, ResourceKind};

/// How a source resource is looked up in the target account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    /// Same identifier in both accounts.
    Product(String),
    Coupon(String),
    /// Same identifier, then `source_price_id` provenance.
    Price(String),
    /// Exact code string.
    PromotionCode(String),
    /// `source_subscription_id` provenance, then customer + price set.
    Subscription {
        source_id: String,
        key: SubscriptionKey,
    },
}

impl LookupKey {
    pub fn for_product(product: &Product) -> Self {
        LookupKey::Product(product.id.to_string())
    }

    pub fn for_coupon(coupon: &Coupon) -> Self {
        LookupKey::Coupon(coupon.id.to_string())
    }

    pub fn for_price(price: &Price) -> Self {
        LookupKey::Price(price.id.clone())
    }

    pub fn for_promotion_code(promotion_code: &PromotionCode) -> Self {
        LookupKey::PromotionCode(promotion_code.code.clone())
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            LookupKey::Product(_) => ResourceKind::Product,
            LookupKey::Coupon(_) => ResourceKind::Coupon,
            LookupKey::Price(_) => ResourceKind::Price,
            LookupKey::PromotionCode(_) => ResourceKind::PromotionCode,
            LookupKey::Subscription { .. } => ResourceKind::Subscription,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingMatch {
    pub kind: ResourceKind,
    pub id: String,
}

impl ExistingMatch {
    fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

pub struct ResourceMatcher<'a, C: ?Sized> {
    target: &'a C,
}

impl<'a, C: AccountClient + ?Sized> ResourceMatcher<'a, C> {
    pub fn new(target: &'a C) -> Self {
        Self { target }
    }

    /// `Ok(None)` means "no equivalent in the target, go ahead and create".
    pub async fn find_existing(
        &self,
        ctx: &mut RunContext,
        key: &LookupKey,
    ) -> AppResult<Option<ExistingMatch>> {
        let kind = key.kind();
        match key {
            LookupKey::Product(id) | LookupKey::Coupon(id) => self.by_id(kind, id).await,
            LookupKey::Price(id) => {
                if let Some(found) = self.by_id(kind, id).await? {
                    return Ok(Some(found));
                }
                let index = ctx.price_index(self.target).await?;
                Ok(index.get(id).map(|price| ExistingMatch::new(kind, price.id.clone())))
            }
            LookupKey::PromotionCode(code) => self.by_code(ctx, code).await,
            LookupKey::Subscription { source_id, key } => {
                let index = ctx.subscription_index(self.target).await?;
                Ok(index
                    .find(source_id, key)
                    .map(|id| ExistingMatch::new(kind, id)))
            }
        }
    }

    async fn by_id(&self, kind: ResourceKind, id: &str) -> AppResult<Option<ExistingMatch>> {
        let found: Option<Value> = retrieve_optional(self.target, kind, id).await?;
        Ok(found.map(|_| ExistingMatch::new(kind, id)))
    }

    async fn by_code(&self, ctx: &mut RunContext, code: &str) -> AppResult<Option<ExistingMatch>> {
        if let Some(cached) = ctx.promotion_codes.get(code) {
            return Ok(cached
                .as_ref()
                .map(|id| ExistingMatch::new(ResourceKind::PromotionCode, id.clone())));
        }

        // The API filter is case-insensitive; the match must not be.
        let candidates: Vec<PromotionCode> = list_typed(
            self.target,
            ResourceKind::PromotionCode,
            &[("code", code.to_string())],
        )
        .await?;
        let found = candidates
            .into_iter()
            .find(|candidate| candidate.code == code)
            .map(|candidate| candidate.id);
        ctx.promotion_codes.insert(code.to_string(), found.clone());
        Ok(found.map(|id| ExistingMatch::new(ResourceKind::PromotionCode, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::memory::MemoryAccount;
    use serde_json::json;

    #[tokio::test]
    async fn test_product_not_found_is_negative_match() {
        let target = MemoryAccount::new();
        let mut ctx = RunContext::new();
        let found = ResourceMatcher::new(&target)
            .find_existing(&mut ctx, &LookupKey::Product("prod_1".to_string()))
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_price_falls_back_to_provenance() {
        let target = MemoryAccount::new().with(
            ResourceKind::Price,
            json!({"id": "price_t1", "product": "prod_1", "currency": "usd",
                   "metadata": {"source_price_id": "price_1"}}),
        );
        let mut ctx = RunContext::new();
        let found = ResourceMatcher::new(&target)
            .find_existing(&mut ctx, &LookupKey::Price("price_1".to_string()))
            .await
            .unwrap();
        assert_eq!(found.map(|m| m.id), Some("price_t1".to_string()));
    }

    #[tokio::test]
    async fn test_price_direct_id_wins() {
        let target = MemoryAccount::new().with(
            ResourceKind::Price,
            json!({"id": "price_1", "product": "prod_1", "currency": "usd", "metadata": {}}),
        );
        let mut ctx = RunContext::new();
        let found = ResourceMatcher::new(&target)
            .find_existing(&mut ctx, &LookupKey::Price("price_1".to_string()))
            .await
            .unwrap();
        assert_eq!(found.map(|m| m.id), Some("price_1".to_string()));
    }

    #[tokio::test]
    async fn test_promotion_code_match_is_case_sensitive() {
        let target = MemoryAccount::new().with(
            ResourceKind::PromotionCode,
            json!({"id": "promo_t1", "code": "SUMMER", "coupon": "SAVE10", "active": true}),
        );
        let matcher = ResourceMatcher::new(&target);
        let mut ctx = RunContext::new();

        let found = matcher
            .find_existing(&mut ctx, &LookupKey::PromotionCode("SUMMER".to_string()))
            .await
            .unwrap();
        assert_eq!(found.map(|m| m.id), Some("promo_t1".to_string()));

        let found = matcher
            .find_existing(&mut ctx, &LookupKey::PromotionCode("summer".to_string()))
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_subscription_matches_on_normalized_key() {
        let target = MemoryAccount::new().with(
            ResourceKind::Subscription,
            json!({"id": "sub_t1", "customer": "cus_1", "status": "active",
                   "items": {"data": [
                       {"price": {"id": "price_b"}, "quantity": 1},
                       {"price": {"id": "price_a"}, "quantity": 1}
                   ]}}),
        );
        let mut ctx = RunContext::new();
        let key = LookupKey::Subscription {
            source_id: "sub_1".to_string(),
            key: SubscriptionKey::new("cus_1", vec!["price_a".to_string(), "price_b".to_string()]),
        };
        let found = ResourceMatcher::new(&target)
            .find_existing(&mut ctx, &key)
            .await
            .unwrap();
        assert_eq!(found.map(|m| m.id), Some("sub_t1".to_string()));
    }
}
