use std::collections::HashMap;

use crate::error::AppResult;
use crate::external::{AccountClient, list_typed};
use crate::models::{PaymentMethodRef, Price, ResourceKind, SOURCE_PRICE_ID, SOURCE_SUBSCRIPTION_ID, Subscription};

/// Placeholder id for a resource a dry run would create.
pub fn planned_id(kind: ResourceKind, source_id: &str) -> String {
    format!("planned:{}:{}", kind.path(), source_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPrice {
    pub id: String,
    pub active: bool,
}

/// Matching key for subscriptions: customer plus the sorted, de-duplicated set
/// of target price ids. Quantities are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub customer: String,
    pub price_ids: Vec<String>,
}

impl SubscriptionKey {
    pub fn new(customer: impl Into<String>, price_ids: impl IntoIterator<Item = String>) -> Self {
        let mut price_ids: Vec<String> = price_ids.into_iter().collect();
        price_ids.sort();
        price_ids.dedup();
        Self {
            customer: customer.into(),
            price_ids,
        }
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    by_source: HashMap<String, String>,
    by_key: HashMap<SubscriptionKey, String>,
}

impl SubscriptionIndex {
    pub fn insert(&mut self, target_id: &str, key: SubscriptionKey, source_id: Option<&str>) {
        if let Some(source_id) = source_id {
            self.by_source
                .insert(source_id.to_string(), target_id.to_string());
        }
        self.by_key.entry(key).or_insert_with(|| target_id.to_string());
    }

    /// Provenance first, then the composite key.
    pub fn find(&self, source_id: &str, key: &SubscriptionKey) -> Option<&str> {
        self.by_source
            .get(source_id)
            .or_else(|| self.by_key.get(key))
            .map(String::as_str)
    }
}

/// Lookup caches for a single run. Built lazily, kept current as the run
/// creates resources, dropped with the run.
#[derive(Debug, Default)]
pub struct RunContext {
    /// source price id -> migrated target price
    prices: Option<HashMap<String, TargetPrice>>,
    planned_prices: HashMap<String, String>,
    subscriptions: Option<SubscriptionIndex>,
    /// source coupon id -> target coupon id, `None` when unavailable
    pub coupons: HashMap<String, Option<String>>,
    /// code string -> target promotion code id
    pub promotion_codes: HashMap<String, Option<String>>,
    /// target customer id -> resolved default payment method
    pub payment_methods: HashMap<String, Option<PaymentMethodRef>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn price_index<C>(&mut self, target: &C) -> AppResult<&mut HashMap<String, TargetPrice>>
    where
        C: AccountClient + ?Sized,
    {
        if self.prices.is_none() {
            let prices: Vec<Price> = list_typed(target, ResourceKind::Price, &[]).await?;
            let mut index: HashMap<String, TargetPrice> = HashMap::new();
            for price in prices {
                let Some(source_id) = price.metadata.get(SOURCE_PRICE_ID) else {
                    continue;
                };
                // An active duplicate wins over an archived one.
                if let Some(existing) = index
                    .get(source_id)
                    .filter(|existing| existing.active || !price.active)
                {
                    log::warn!(
                        "Target prices {} and {} both map source price {}, keeping {}",
                        existing.id,
                        price.id,
                        source_id,
                        existing.id
                    );
                    continue;
                }
                index.insert(
                    source_id.clone(),
                    TargetPrice {
                        id: price.id.clone(),
                        active: price.active,
                    },
                );
            }
            log::info!("Indexed {} migrated price(s) in target account", index.len());
            self.prices = Some(index);
        }
        Ok(self.prices.get_or_insert_with(HashMap::new))
    }

    pub fn record_price(&mut self, source_price_id: &str, price: TargetPrice) {
        self.prices
            .get_or_insert_with(HashMap::new)
            .insert(source_price_id.to_string(), price);
    }

    pub fn plan_price(&mut self, source_price_id: &str) {
        self.planned_prices.insert(
            source_price_id.to_string(),
            planned_id(ResourceKind::Price, source_price_id),
        );
    }

    pub fn planned_price(&self, source_price_id: &str) -> Option<String> {
        self.planned_prices.get(source_price_id).cloned()
    }

    pub async fn subscription_index<C>(&mut self, target: &C) -> AppResult<&mut SubscriptionIndex>
    where
        C: AccountClient + ?Sized,
    {
        if self.subscriptions.is_none() {
            let subscriptions: Vec<Subscription> = list_typed(
                target,
                ResourceKind::Subscription,
                &[("status", "all".to_string())],
            )
            .await?;
            let mut index = SubscriptionIndex::default();
            for sub in subscriptions.iter().filter(|s| s.is_live()) {
                let key = SubscriptionKey::new(sub.customer_id(), sub.price_ids());
                let source_id = sub.metadata.get(SOURCE_SUBSCRIPTION_ID).map(String::as_str);
                index.insert(&sub.id, key, source_id);
            }
            log::info!(
                "Indexed {} live subscription(s) in target account",
                index.by_key.len()
            );
            self.subscriptions = Some(index);
        }
        Ok(self.subscriptions.get_or_insert_with(SubscriptionIndex::default))
    }

    pub fn record_subscription(&mut self, target_id: &str, key: SubscriptionKey, source_id: &str) {
        self.subscriptions
            .get_or_insert_with(SubscriptionIndex::default)
            .insert(target_id, key, Some(source_id));
    }
}
