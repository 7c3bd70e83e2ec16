use serde::Deserialize;

use super::run_context::RunContext;
use crate::error::{AppError, AppResult};
use crate::external::{AccountClient, list_typed, retrieve_optional};
use crate::models::{Customer, PaymentMethodRef, ResourceKind, expanded_id};

pub struct PaymentMethodResolver<'a, C: ?Sized> {
    target: &'a C,
}

impl<'a, C: AccountClient + ?Sized> PaymentMethodResolver<'a, C> {
    pub fn new(target: &'a C) -> Self {
        Self { target }
    }

    /// Invoice-settings default payment method first, then the legacy default
    /// source, then the first card attached to the customer. `Ok(None)` means
    /// the customer has none of these.
    pub async fn resolve_default_payment_method(
        &self,
        ctx: &mut RunContext,
        customer_id: &str,
    ) -> AppResult<Option<PaymentMethodRef>> {
        if let Some(cached) = ctx.payment_methods.get(customer_id) {
            return Ok(cached.clone());
        }

        let customer: Customer = retrieve_optional(self.target, ResourceKind::Customer, customer_id)
            .await?
            .filter(|c: &Customer| !c.deleted)
            .ok_or_else(|| {
                AppError::PreconditionUnmet(format!(
                    "customer {customer_id} does not exist in target account"
                ))
            })?;

        let mut resolved = customer
            .invoice_settings
            .as_ref()
            .and_then(|settings| settings.default_payment_method.as_ref())
            .map(|method| PaymentMethodRef::PaymentMethod(expanded_id(method)))
            .or_else(|| {
                customer
                    .default_source
                    .as_ref()
                    .map(|source| PaymentMethodRef::Source(expanded_id(source)))
            });
        if resolved.is_none() {
            resolved = self
                .first_attached_card(customer_id)
                .await?
                .map(PaymentMethodRef::PaymentMethod);
        }

        match &resolved {
            Some(method) => log::debug!("Customer {customer_id} pays with {method:?}"),
            None => log::warn!("Customer {customer_id} has no default payment method in target"),
        }
        ctx.payment_methods
            .insert(customer_id.to_string(), resolved.clone());
        Ok(resolved)
    }

    async fn first_attached_card(&self, customer_id: &str) -> AppResult<Option<String>> {
        let filters = [
            ("customer", customer_id.to_string()),
            ("type", "card".to_string()),
        ];
        let cards: Vec<AttachedPaymentMethod> =
            list_typed(self.target, ResourceKind::PaymentMethod, &filters).await?;
        Ok(cards.into_iter().next().map(|card| card.id))
    }
}

#[derive(Debug, Deserialize)]
struct AttachedPaymentMethod {
    id: String,
}
