use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use stripe::{Expandable, Object};

/// Stripe metadata. Ordered so serialized payloads are stable across runs.
pub type Metadata = BTreeMap<String, String>;

pub const SOURCE_PRICE_ID: &str = "source_price_id";
pub const SOURCE_PROMOTION_CODE_ID: &str = "source_promotion_code_id";
pub const SOURCE_SUBSCRIPTION_ID: &str = "source_subscription_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Product,
    Price,
    Coupon,
    PromotionCode,
    Subscription,
    Customer,
    PaymentMethod,
}

impl ResourceKind {
    /// REST collection path under `/v1`.
    pub fn path(self) -> &'static str {
        match self {
            ResourceKind::Product => "products",
            ResourceKind::Price => "prices",
            ResourceKind::Coupon => "coupons",
            ResourceKind::PromotionCode => "promotion_codes",
            ResourceKind::Subscription => "subscriptions",
            ResourceKind::Customer => "customers",
            ResourceKind::PaymentMethod => "payment_methods",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Product => "product",
            ResourceKind::Price => "price",
            ResourceKind::Coupon => "coupon",
            ResourceKind::PromotionCode => "promotion code",
            ResourceKind::Subscription => "subscription",
            ResourceKind::Customer => "customer",
            ResourceKind::PaymentMethod => "payment method",
        };
        f.write_str(s)
    }
}

/// Id of a field that may come back as a bare id or an expanded object.
pub fn expanded_id<T>(field: &Expandable<T>) -> String
where
    T: Object,
    T::Id: fmt::Display,
{
    match field {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(object) => object.id().to_string(),
    }
}

/// Stripe's `metadata` is always present but may be `null` in fixtures.
pub fn nullable_metadata<'de, D>(deserializer: D) -> Result<Metadata, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Metadata>::deserialize(deserializer).map(Option::unwrap_or_default)
}
