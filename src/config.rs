use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::utils::RetryPolicy;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: StripeConfig,
    pub target: StripeConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    /// The API version is pinned by the Stripe SDK.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrationConfig {
    #[serde(default)]
    pub price_status_policy: PriceStatusPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: 2.0,
        }
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

/// Which migration step(s) a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Products,
    Coupons,
    Subscriptions,
    All,
}

impl Step {
    /// Expands `All` into the dependency order products → coupons → subscriptions.
    pub fn expand(self) -> Vec<Step> {
        match self {
            Step::All => vec![Step::Products, Step::Coupons, Step::Subscriptions],
            step => vec![step],
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Products => "products",
            Step::Coupons => "coupons",
            Step::Subscriptions => "subscriptions",
            Step::All => "all",
        };
        f.write_str(s)
    }
}

/// How the `active` flag of migrated prices is reconciled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatusPolicy {
    /// Force every migrated price to be active in the target.
    Unarchive,
    /// Copy the source price's active flag.
    #[default]
    Preserve,
}

impl std::str::FromStr for PriceStatusPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unarchive" => Ok(PriceStatusPolicy::Unarchive),
            "preserve" => Ok(PriceStatusPolicy::Preserve),
            other => Err(AppError::ConfigError(format!(
                "unknown price status policy: {other}"
            ))),
        }
    }
}

/// Fully resolved settings handed to the migration core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub step: Step,
    pub live: bool,
    pub price_status_policy: PriceStatusPolicy,
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => toml::from_str(&config_str).map_err(|e| {
                AppError::ConfigError(format!("failed to parse {config_path}: {e}"))
            })?,
            // No file: everything comes from the environment.
            Err(e) if e.kind() == ErrorKind::NotFound => Config {
                source: StripeConfig {
                    secret_key: String::new(),
                    api_base: default_api_base(),
                },
                target: StripeConfig {
                    secret_key: String::new(),
                    api_base: default_api_base(),
                },
                migration: MigrationConfig::default(),
                retry: RetryConfig::default(),
            },
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "unable to read config file {config_path}: {e}"
                )));
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> AppResult<()> {
        if let Ok(v) = env::var("API_KEY_SOURCE") {
            self.source.secret_key = v;
        }
        if let Ok(v) = env::var("API_KEY_TARGET") {
            self.target.secret_key = v;
        }
        if let Ok(v) = env::var("STRIPE_API_BASE") {
            self.source.api_base = v.clone();
            self.target.api_base = v;
        }
        if let Ok(v) = env::var("PRICE_STATUS_POLICY") {
            self.migration.price_status_policy = v.parse()?;
        }
        if let Ok(v) = env::var("RETRY_MAX_ATTEMPTS")
            && let Ok(n) = v.parse()
        {
            self.retry.max_attempts = n;
        }
        if let Ok(v) = env::var("RETRY_INITIAL_DELAY_MS")
            && let Ok(n) = v.parse()
        {
            self.retry.initial_delay_ms = n;
        }
        if let Ok(v) = env::var("RETRY_MAX_DELAY_MS")
            && let Ok(n) = v.parse()
        {
            self.retry.max_delay_ms = n;
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.source.secret_key.is_empty() {
            return Err(AppError::ConfigError(
                "API_KEY_SOURCE is not set and no source.secret_key in config file".to_string(),
            ));
        }
        if self.target.secret_key.is_empty() {
            return Err(AppError::ConfigError(
                "API_KEY_TARGET is not set and no target.secret_key in config file".to_string(),
            ));
        }
        if self.source.secret_key == self.target.secret_key {
            return Err(AppError::ConfigError(
                "source and target secret keys point at the same account".to_string(),
            ));
        }
        for (label, account) in [("source", &self.source), ("target", &self.target)] {
            Url::parse(&account.api_base).map_err(|e| {
                AppError::ConfigError(format!(
                    "{label}.api_base {:?} is not a valid URL: {e}",
                    account.api_base
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_file() {
        let raw = r#"
            [source]
            secret_key = "sk_test_source"

            [target]
            secret_key = "sk_test_target"
            api_base = "http://localhost:12111"

            [migration]
            price_status_policy = "unarchive"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.source.api_base, DEFAULT_API_BASE);
        assert_eq!(config.target.api_base, "http://localhost:12111");
        assert_eq!(
            config.migration.price_status_policy,
            PriceStatusPolicy::Unarchive
        );
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_same_account_is_rejected() {
        let raw = r#"
            [source]
            secret_key = "sk_test_same"
            [target]
            secret_key = "sk_test_same"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_malformed_api_base_is_rejected() {
        let raw = r#"
            [source]
            secret_key = "sk_test_source"
            [target]
            secret_key = "sk_test_target"
            api_base = "api.stripe.com"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        match config.validate() {
            Err(AppError::ConfigError(msg)) => assert!(msg.contains("target.api_base"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_step_expansion_order() {
        assert_eq!(
            Step::All.expand(),
            vec![Step::Products, Step::Coupons, Step::Subscriptions]
        );
        assert_eq!(Step::Coupons.expand(), vec![Step::Coupons]);
    }

    #[test]
    fn test_price_policy_from_str() {
        assert_eq!(
            "Unarchive".parse::<PriceStatusPolicy>().unwrap(),
            PriceStatusPolicy::Unarchive
        );
        assert!("archive".parse::<PriceStatusPolicy>().is_err());
    }

    #[test]
    fn test_retry_policy_never_zero_attempts() {
        let retry = RetryConfig {
            max_attempts: 0,
            initial_delay_ms: 10,
            max_delay_ms: 100,
        };
        assert_eq!(retry.policy().max_attempts, 1);
    }
}
