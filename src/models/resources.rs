//! Views of account resources.
//!
//! Products, coupons and customers are read as the SDK's own types. Prices,
//! promotion codes and subscriptions use narrower views: the SDK's promotion
//! code and subscription types require fields the migration never reads, and
//! price attributes are copied into the payload verbatim. References between
//! resources are `stripe::Expandable` either way.

use serde::{Deserialize, Serialize};
use stripe::Expandable;

use super::common::{Metadata, expanded_id, nullable_metadata};

pub use stripe::{Coupon, Customer, Product};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurring {
    pub interval: String,
    #[serde(default)]
    pub interval_count: Option<u32>,
    #[serde(default)]
    pub usage_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceTier {
    #[serde(default)]
    pub flat_amount: Option<i64>,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    /// `None` is the open-ended last tier.
    #[serde(default)]
    pub up_to: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformQuantity {
    pub divide_by: i64,
    pub round: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomUnitAmount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
    pub product: Expandable<Product>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub currency: String,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub unit_amount_decimal: Option<String>,
    #[serde(default)]
    pub billing_scheme: Option<String>,
    #[serde(default)]
    pub recurring: Option<Recurring>,
    #[serde(default)]
    pub tiers: Option<Vec<PriceTier>>,
    #[serde(default)]
    pub tiers_mode: Option<String>,
    #[serde(default)]
    pub transform_quantity: Option<TransformQuantity>,
    #[serde(default)]
    pub custom_unit_amount: Option<CustomUnitAmount>,
    #[serde(default)]
    pub tax_behavior: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default, deserialize_with = "nullable_metadata")]
    pub metadata: Metadata,
}

impl Price {
    pub fn product_id(&self) -> String {
        expanded_id(&self.product)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionRestrictions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_time_transaction: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_amount_currency: Option<String>,
}

impl PromotionRestrictions {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromotionCode {
    pub id: String,
    pub code: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub coupon: Expandable<Coupon>,
    #[serde(default)]
    pub customer: Option<Expandable<Customer>>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub max_redemptions: Option<i64>,
    #[serde(default)]
    pub restrictions: Option<PromotionRestrictions>,
    #[serde(default, deserialize_with = "nullable_metadata")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Expandable<stripe::Price>,
    #[serde(default)]
    pub quantity: Option<u64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Discount {
    #[serde(default)]
    pub coupon: Option<Expandable<Coupon>>,
    #[serde(default)]
    pub promotion_code: Option<Expandable<stripe::PromotionCode>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer: Expandable<Customer>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub items: SubscriptionItems,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub discount: Option<Discount>,
    #[serde(default, deserialize_with = "nullable_metadata")]
    pub metadata: Metadata,
}

impl Subscription {
    pub fn customer_id(&self) -> String {
        expanded_id(&self.customer)
    }

    pub fn price_ids(&self) -> Vec<String> {
        self.items
            .data
            .iter()
            .map(|item| expanded_id(&item.price))
            .collect()
    }

    /// Newer API versions only report the billing period per item.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .iter()
                .filter_map(|item| item.current_period_end)
                .max()
        })
    }

    /// Subscriptions in these states still bill, so they count as existing.
    pub fn is_live(&self) -> bool {
        matches!(
            self.status.as_str(),
            "active" | "trialing" | "past_due" | "unpaid" | "incomplete"
        )
    }
}

fn default_true() -> bool {
    true
}
