//! In-memory account used to exercise the migration core without HTTP.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use super::stripe::AccountClient;
use crate::error::{AppError, AppResult};
use crate::models::ResourceKind;

#[derive(Default)]
struct State {
    resources: BTreeMap<ResourceKind, Vec<Value>>,
    created: Vec<(ResourceKind, Value)>,
    updated: Vec<(ResourceKind, String, Value)>,
    create_failures: VecDeque<(ResourceKind, AppError)>,
    next_id: u64,
}

#[derive(Default)]
pub struct MemoryAccount {
    state: Mutex<State>,
}

impl MemoryAccount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, kind: ResourceKind, resource: Value) -> Self {
        self.insert(kind, resource);
        self
    }

    pub fn insert(&self, kind: ResourceKind, resource: Value) {
        let mut state = self.state.lock().unwrap();
        state.resources.entry(kind).or_default().push(resource);
    }

    pub fn resources(&self, kind: ResourceKind) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state.resources.get(&kind).cloned().unwrap_or_default()
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.resources(kind).len()
    }

    /// Payloads exactly as they were submitted to `create`.
    pub fn created_payloads(&self, kind: ResourceKind) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state
            .created
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn total_writes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.created.len() + state.updated.len()
    }

    pub fn updates(&self, kind: ResourceKind) -> Vec<(String, Value)> {
        let state = self.state.lock().unwrap();
        state
            .updated
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, id, payload)| (id.clone(), payload.clone()))
            .collect()
    }

    /// The next `create` of `kind` fails with `err`.
    pub fn fail_next_create(&self, kind: ResourceKind, err: AppError) {
        let mut state = self.state.lock().unwrap();
        state.create_failures.push_back((kind, err));
    }
}

fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Product => "prod",
        ResourceKind::Price => "price",
        ResourceKind::Coupon => "coupon",
        ResourceKind::PromotionCode => "promo",
        ResourceKind::Subscription => "sub",
        ResourceKind::Customer => "cus",
        ResourceKind::PaymentMethod => "pm",
    }
}

fn matches_filter(resource: &Value, key: &str, expected: &str) -> bool {
    if key.starts_with("expand") || (key == "status" && expected == "all") {
        return true;
    }
    match &resource[key] {
        // Stripe filters promotion codes case-insensitively.
        Value::String(s) if key == "code" => s.eq_ignore_ascii_case(expected),
        Value::String(s) => s == expected,
        Value::Bool(b) => b.to_string() == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Object(obj) => obj.get("id").and_then(Value::as_str) == Some(expected),
        _ => false,
    }
}

/// Shapes a create payload the way the API would echo it back.
fn materialize(kind: ResourceKind, id: String, payload: &Value) -> Value {
    let mut object: Map<String, Value> = payload.as_object().cloned().unwrap_or_default();
    object.insert("id".to_string(), Value::String(id));
    object.entry("metadata").or_insert_with(|| json!({}));
    match kind {
        ResourceKind::Product | ResourceKind::Price | ResourceKind::PromotionCode => {
            object.entry("active").or_insert(Value::Bool(true));
        }
        ResourceKind::Coupon => {
            object.insert("valid".to_string(), Value::Bool(true));
        }
        ResourceKind::Subscription => {
            let items: Vec<Value> = object
                .get("items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .map(|item| json!({"price": {"id": item["price"]}, "quantity": item["quantity"]}))
                        .collect()
                })
                .unwrap_or_default();
            object.insert("items".to_string(), json!({"data": items, "has_more": false}));
            object.insert("status".to_string(), json!("trialing"));
        }
        ResourceKind::Customer | ResourceKind::PaymentMethod => {}
    }
    Value::Object(object)
}

#[async_trait]
impl AccountClient for MemoryAccount {
    async fn list(&self, kind: ResourceKind, filters: &[(&str, String)]) -> AppResult<Vec<Value>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .resources
            .get(&kind)
            .map(|all| {
                all.iter()
                    .filter(|r| filters.iter().all(|(k, v)| matches_filter(r, k, v)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn retrieve(&self, kind: ResourceKind, id: &str) -> AppResult<Value> {
        let state = self.state.lock().unwrap();
        state
            .resources
            .get(&kind)
            .and_then(|all| all.iter().find(|r| r["id"] == id))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("No such {kind}: '{id}'")))
    }

    async fn create(&self, kind: ResourceKind, payload: &Value) -> AppResult<Value> {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.create_failures.iter().position(|(k, _)| *k == kind)
            && let Some((_, err)) = state.create_failures.remove(pos)
        {
            return Err(err);
        }

        let id = match payload["id"].as_str() {
            Some(id) => id.to_string(),
            None => {
                state.next_id += 1;
                format!("{}_target_{}", id_prefix(kind), state.next_id)
            }
        };
        let exists = state
            .resources
            .get(&kind)
            .is_some_and(|all| all.iter().any(|r| r["id"] == id.as_str()));
        if exists {
            return Err(AppError::AlreadyExists(format!("{kind} {id} already exists")));
        }

        let resource = materialize(kind, id, payload);
        state.created.push((kind, payload.clone()));
        state
            .resources
            .entry(kind)
            .or_default()
            .push(resource.clone());
        Ok(resource)
    }

    async fn update(&self, kind: ResourceKind, id: &str, payload: &Value) -> AppResult<Value> {
        let mut state = self.state.lock().unwrap();
        state.updated.push((kind, id.to_string(), payload.clone()));
        let resource = state
            .resources
            .get_mut(&kind)
            .and_then(|all| all.iter_mut().find(|r| r["id"] == id))
            .ok_or_else(|| AppError::NotFound(format!("No such {kind}: '{id}'")))?;
        if let (Some(target), Some(changes)) = (resource.as_object_mut(), payload.as_object()) {
            for (k, v) in changes {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(resource.clone())
    }
}
