use async_trait::async_trait;
use chrono::Local;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;
use stripe::{Client, List, RequestStrategy, StripeError};
use url::Url;

use crate::config::StripeConfig;
use crate::error::{AppError, AppResult};
use crate::models::ResourceKind;
use crate::utils::{RetryPolicy, retry_with_backoff};

const PAGE_SIZE: u64 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The only I/O boundary of the migration core: raw list/retrieve/create/update
/// per resource kind against one account.
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Returns every resource matching `filters`, following pagination.
    /// A key ending in `[]` (`expand[]`) may repeat and is sent as an array.
    async fn list(&self, kind: ResourceKind, filters: &[(&str, String)]) -> AppResult<Vec<Value>>;

    /// Fails with `AppError::NotFound` when the id does not exist.
    async fn retrieve(&self, kind: ResourceKind, id: &str) -> AppResult<Value>;

    async fn create(&self, kind: ResourceKind, payload: &Value) -> AppResult<Value>;

    async fn update(&self, kind: ResourceKind, id: &str, payload: &Value) -> AppResult<Value>;
}

pub async fn list_typed<T, C>(
    client: &C,
    kind: ResourceKind,
    filters: &[(&str, String)],
) -> AppResult<Vec<T>>
where
    T: DeserializeOwned,
    C: AccountClient + ?Sized,
{
    client
        .list(kind, filters)
        .await?
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(AppError::from))
        .collect()
}

/// `NotFound` becomes `Ok(None)`.
pub async fn retrieve_optional<T, C>(client: &C, kind: ResourceKind, id: &str) -> AppResult<Option<T>>
where
    T: DeserializeOwned,
    C: AccountClient + ?Sized,
{
    match client.retrieve(kind, id).await {
        Ok(value) => Ok(Some(serde_json::from_value(value)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// `AccountClient` over the async-stripe HTTP client. Every call goes through
/// `retry_with_backoff`; every POST carries an idempotency key so a retried
/// create never commits twice.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    retry: RetryPolicy,
    label: &'static str,
    /// Scopes idempotency keys to this process run.
    run_started: String,
}

impl StripeClient {
    /// `label` names the account ("source"/"target") in log lines.
    pub fn new(config: StripeConfig, retry: RetryPolicy, label: &'static str) -> AppResult<Self> {
        let api_base = Url::parse(&config.api_base).map_err(|e| {
            AppError::ConfigError(format!("{label} api_base {:?}: {e}", config.api_base))
        })?;
        let client = Client::from_url(api_base.as_str(), config.secret_key);
        Ok(Self {
            client,
            retry,
            label,
            run_started: Local::now().to_rfc3339(),
        })
    }

    async fn get<T>(&self, path: &str, params: &Map<String, Value>) -> AppResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let what = format!("{} GET {}", self.label, path);
        retry_with_backoff(&self.retry, &what, || {
            send(self.client.get_query::<T, _>(path, params))
        })
        .await
    }

    async fn post(&self, path: &str, form: &Value) -> AppResult<Value> {
        let form = without_nulls(form);
        let key = self.idempotency_key(path, &form);
        log::debug!("{}: POST {} with idempotency key {}", self.label, path, key);
        // Every attempt below reuses the same key.
        let client = self
            .client
            .clone()
            .with_strategy(RequestStrategy::Idempotent(key));
        let what = format!("{} POST {}", self.label, path);
        retry_with_backoff(&self.retry, &what, || {
            send(client.post_form::<Value, _>(path, &form))
        })
        .await
    }

    /// One key per logical write: same run, same path, same payload.
    fn idempotency_key(&self, path: &str, form: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.run_started.as_bytes());
        hasher.update(self.label.as_bytes());
        hasher.update(path.as_bytes());
        hasher.update(form.to_string().as_bytes());
        format!("stripe-migrate-{}", hex::encode(hasher.finalize()))
    }
}

async fn send<T, F>(request: F) -> AppResult<T>
where
    F: Future<Output = Result<T, StripeError>>,
{
    match tokio::time::timeout(REQUEST_TIMEOUT, request).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::TransientApiError(format!(
            "no response within {}s",
            REQUEST_TIMEOUT.as_secs()
        ))),
    }
}

/// `{collection}/{id}` with the id percent-encoded as one path segment.
fn resource_path(kind: ResourceKind, id: &str) -> String {
    format!("{}/{}", kind.path(), urlencoding::encode(id))
}

/// `expand[]`-style keys collect into arrays; everything else is a scalar.
fn query_params(filters: &[(&str, String)]) -> Map<String, Value> {
    let mut params = Map::new();
    for (key, value) in filters {
        match key.strip_suffix("[]") {
            Some(array_key) => {
                let entry = params
                    .entry(array_key.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = entry {
                    items.push(Value::String(value.clone()));
                }
            }
            None => {
                params.insert(key.to_string(), Value::String(value.clone()));
            }
        }
    }
    params
}

/// Null fields are left out of the form body.
fn without_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), without_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(without_nulls).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl AccountClient for StripeClient {
    async fn list(&self, kind: ResourceKind, filters: &[(&str, String)]) -> AppResult<Vec<Value>> {
        let base = query_params(filters);
        let mut all = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut params = base.clone();
            params.insert("limit".to_string(), Value::from(PAGE_SIZE));
            if let Some(cursor) = starting_after.take() {
                params.insert("starting_after".to_string(), Value::String(cursor));
            }

            let page: List<Value> = self.get(kind.path(), &params).await?;
            let cursor = page
                .data
                .last()
                .and_then(|v| v["id"].as_str())
                .map(str::to_string);
            all.extend(page.data);
            match (page.has_more, cursor) {
                (true, Some(id)) => starting_after = Some(id),
                _ => break,
            }
        }

        log::debug!("{}: listed {} {}", self.label, all.len(), kind.path());
        Ok(all)
    }

    async fn retrieve(&self, kind: ResourceKind, id: &str) -> AppResult<Value> {
        self.get(&resource_path(kind, id), &Map::new()).await
    }

    async fn create(&self, kind: ResourceKind, payload: &Value) -> AppResult<Value> {
        self.post(kind.path(), payload).await
    }

    async fn update(&self, kind: ResourceKind, id: &str, payload: &Value) -> AppResult<Value> {
        self.post(&resource_path(kind, id), payload).await
    }
}
