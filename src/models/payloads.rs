//! Creation payloads submitted to the target account.
//!
//! Dry-run previews and live submissions both serialize these same structs,
//! so the preview is exactly what a live run sends.

use serde::Serialize;
use stripe::{CreateCoupon, CreateCouponAppliesTo, CreateProduct, Expandable};

use super::common::{
    Metadata, SOURCE_PRICE_ID, SOURCE_PROMOTION_CODE_ID, SOURCE_SUBSCRIPTION_ID, expanded_id,
};
use super::resources::{
    Coupon, CustomUnitAmount, Price, PriceTier, Product, PromotionCode, PromotionRestrictions,
    Recurring, TransformQuantity,
};
use crate::config::PriceStatusPolicy;

/// The target product reuses the source identifier.
pub fn create_product_params(product: &Product) -> CreateProduct<'_> {
    let mut params = CreateProduct::new(product.name.as_deref().unwrap_or_default());
    params.id = Some(product.id.as_str());
    params.active = product.active;
    params.description = product.description.as_deref();
    params.images = product.images.clone().filter(|images| !images.is_empty());
    params.metadata = product.metadata.clone();
    params.statement_descriptor = product.statement_descriptor.as_deref();
    params.tax_code = product.tax_code.as_ref().map(|code| match code {
        Expandable::Id(id) => id.clone(),
        Expandable::Object(tax_code) => tax_code.id.clone(),
    });
    params.unit_label = product.unit_label.as_deref();
    params.url = product.url.as_deref();
    params
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TierBound {
    Amount(i64),
    /// Serializes as `"inf"`.
    Inf(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePriceTier {
    pub up_to: TierBound,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat_amount: Option<i64>,
}

impl From<&PriceTier> for CreatePriceTier {
    fn from(tier: &PriceTier) -> Self {
        Self {
            up_to: tier.up_to.map(TierBound::Amount).unwrap_or(TierBound::Inf("inf")),
            unit_amount: tier.unit_amount,
            flat_amount: tier.flat_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCustomUnitAmount {
    pub enabled: bool,
    #[serde(flatten)]
    pub bounds: CustomUnitAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePrice {
    pub product: String,
    pub currency: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_amount_decimal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurring>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<CreatePriceTier>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform_quantity: Option<TransformQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_unit_amount: Option<CreateCustomUnitAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_behavior: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub metadata: Metadata,
}

impl CreatePrice {
    pub fn from_source(price: &Price, target_product_id: &str, policy: PriceStatusPolicy) -> Self {
        let mut metadata = price.metadata.clone();
        metadata.insert(SOURCE_PRICE_ID.to_string(), price.id.clone());

        let active = match policy {
            PriceStatusPolicy::Unarchive => true,
            PriceStatusPolicy::Preserve => price.active,
        };

        // Stripe rejects unit_amount and unit_amount_decimal together.
        let unit_amount_decimal = if price.unit_amount.is_none() {
            price.unit_amount_decimal.clone()
        } else {
            None
        };

        Self {
            product: target_product_id.to_string(),
            currency: price.currency.clone(),
            active,
            unit_amount: price.unit_amount,
            unit_amount_decimal,
            billing_scheme: price.billing_scheme.clone(),
            recurring: price.recurring.clone(),
            tiers: price
                .tiers
                .as_ref()
                .map(|tiers| tiers.iter().map(CreatePriceTier::from).collect()),
            tiers_mode: price.tiers_mode.clone(),
            transform_quantity: price.transform_quantity.clone(),
            custom_unit_amount: price.custom_unit_amount.clone().map(|bounds| {
                CreateCustomUnitAmount {
                    enabled: true,
                    bounds,
                }
            }),
            tax_behavior: price.tax_behavior.clone(),
            nickname: price.nickname.clone(),
            metadata,
        }
    }
}

/// Validity attributes are copied verbatim, never repaired. Target coupons
/// keep the source id.
pub fn create_coupon_params(coupon: &Coupon) -> CreateCoupon<'_> {
    let mut params = CreateCoupon::new();
    params.id = Some(coupon.id.as_str());
    params.name = coupon.name.as_deref();
    params.duration = coupon.duration.clone();
    params.duration_in_months = coupon.duration_in_months;
    params.percent_off = coupon.percent_off;
    params.amount_off = coupon.amount_off;
    params.currency = coupon.currency.clone();
    params.max_redemptions = coupon.max_redemptions;
    params.redeem_by = coupon.redeem_by;
    params.metadata = coupon.metadata.clone();
    params.applies_to = coupon
        .applies_to
        .as_ref()
        .filter(|applies_to| !applies_to.products.is_empty())
        .map(|applies_to| CreateCouponAppliesTo {
            products: Some(applies_to.products.clone()),
        });
    params
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePromotionCode {
    pub coupon: String,
    pub code: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_redemptions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restrictions: Option<PromotionRestrictions>,
    pub metadata: Metadata,
}

impl CreatePromotionCode {
    pub fn from_source(promotion_code: &PromotionCode, target_coupon_id: &str) -> Self {
        let mut metadata = promotion_code.metadata.clone();
        metadata.insert(
            SOURCE_PROMOTION_CODE_ID.to_string(),
            promotion_code.id.clone(),
        );
        Self {
            coupon: target_coupon_id.to_string(),
            code: promotion_code.code.clone(),
            active: promotion_code.active,
            customer: promotion_code.customer.as_ref().map(expanded_id),
            expires_at: promotion_code.expires_at,
            max_redemptions: promotion_code.max_redemptions,
            restrictions: promotion_code
                .restrictions
                .clone()
                .filter(|r| !r.is_empty()),
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionItemParams {
    pub price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
}

/// Discount carried over from the source subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscountParams {
    PromotionCode(String),
    Coupon(String),
}

/// Reference to the payment instrument a target subscription bills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum PaymentMethodRef {
    PaymentMethod(String),
    /// Legacy card or source object.
    Source(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateSubscription {
    pub customer: String,
    pub items: Vec<SubscriptionItemParams>,
    pub trial_end: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
    pub off_session: bool,
    pub metadata: Metadata,
}

impl CreateSubscription {
    pub fn new(
        source_subscription_id: &str,
        customer: &str,
        items: Vec<SubscriptionItemParams>,
        trial_end: i64,
        payment_method: &PaymentMethodRef,
        discount: Option<DiscountParams>,
    ) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(
            SOURCE_SUBSCRIPTION_ID.to_string(),
            source_subscription_id.to_string(),
        );

        let (default_payment_method, default_source) = match payment_method {
            PaymentMethodRef::PaymentMethod(id) => (Some(id.clone()), None),
            PaymentMethodRef::Source(id) => (None, Some(id.clone())),
        };
        let (promotion_code, coupon) = match discount {
            Some(DiscountParams::PromotionCode(id)) => (Some(id), None),
            Some(DiscountParams::Coupon(id)) => (None, Some(id)),
            None => (None, None),
        };

        Self {
            customer: customer.to_string(),
            items,
            trial_end,
            default_payment_method,
            default_source,
            promotion_code,
            coupon,
            off_session: true,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source_price(active: bool) -> Price {
        serde_json::from_value(json!({
            "id": "price_1",
            "product": "prod_1",
            "active": active,
            "currency": "usd",
            "unit_amount": 1000,
            "unit_amount_decimal": "1000",
            "billing_scheme": "per_unit",
            "recurring": {"interval": "month", "interval_count": 1, "usage_type": "licensed"},
            "metadata": {"tier": "basic"}
        }))
        .unwrap()
    }

    #[test]
    fn test_price_payload_carries_provenance() {
        let payload = CreatePrice::from_source(&source_price(true), "prod_1", PriceStatusPolicy::Preserve);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["metadata"]["source_price_id"], "price_1");
        assert_eq!(value["metadata"]["tier"], "basic");
        assert_eq!(value["unit_amount"], 1000);
        assert!(value.get("unit_amount_decimal").is_none());
        assert_eq!(value["recurring"]["interval"], "month");
    }

    #[test]
    fn test_price_active_policy() {
        let archived = source_price(false);
        assert!(!CreatePrice::from_source(&archived, "prod_1", PriceStatusPolicy::Preserve).active);
        assert!(CreatePrice::from_source(&archived, "prod_1", PriceStatusPolicy::Unarchive).active);
    }

    #[test]
    fn test_open_ended_tier_serializes_as_inf() {
        let tier = PriceTier {
            flat_amount: None,
            unit_amount: Some(400),
            up_to: None,
        };
        let value = serde_json::to_value(CreatePriceTier::from(&tier)).unwrap();
        assert_eq!(value, json!({"up_to": "inf", "unit_amount": 400}));
    }

    #[test]
    fn test_product_payload_keeps_source_id() {
        let product: Product = serde_json::from_value(json!({
            "id": "prod_1",
            "object": "product",
            "name": "Basic",
            "active": true,
            "images": [],
            "tax_code": "txcd_10000000",
            "metadata": {"plan": "basic"}
        }))
        .unwrap();
        let value = serde_json::to_value(create_product_params(&product)).unwrap();
        assert_eq!(value["id"], "prod_1");
        assert_eq!(value["name"], "Basic");
        assert_eq!(value["tax_code"], "txcd_10000000");
        assert_eq!(value["metadata"]["plan"], "basic");
        assert!(value.get("images").is_none());
    }

    #[test]
    fn test_coupon_payload_carries_product_restriction() {
        let coupon: Coupon = serde_json::from_value(json!({
            "id": "SAVE10",
            "object": "coupon",
            "percent_off": 10.0,
            "duration": "repeating",
            "duration_in_months": 3,
            "applies_to": {"products": ["prod_1", "prod_2"]},
            "valid": true
        }))
        .unwrap();
        let value = serde_json::to_value(create_coupon_params(&coupon)).unwrap();
        assert_eq!(value["id"], "SAVE10");
        assert_eq!(value["duration"], "repeating");
        assert_eq!(value["duration_in_months"], 3);
        assert_eq!(value["applies_to"], json!({"products": ["prod_1", "prod_2"]}));

        let unrestricted: Coupon = serde_json::from_value(json!({
            "id": "FLAT5", "object": "coupon", "amount_off": 500, "currency": "usd", "duration": "once"
        }))
        .unwrap();
        let value = serde_json::to_value(create_coupon_params(&unrestricted)).unwrap();
        assert!(value.get("applies_to").is_none());
        assert_eq!(value["currency"], "usd");
    }

    #[test]
    fn test_subscription_payload_with_legacy_source() {
        let payload = CreateSubscription::new(
            "sub_1",
            "cus_1",
            vec![SubscriptionItemParams {
                price: "price_new".to_string(),
                quantity: Some(2),
            }],
            1717200000,
            &PaymentMethodRef::Source("card_1".to_string()),
            Some(DiscountParams::Coupon("SAVE10".to_string())),
        );
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["default_source"], "card_1");
        assert!(value.get("default_payment_method").is_none());
        assert_eq!(value["coupon"], "SAVE10");
        assert_eq!(value["trial_end"], 1717200000);
        assert_eq!(value["off_session"], true);
        assert_eq!(value["metadata"]["source_subscription_id"], "sub_1");
    }
}
