use serde::Serialize;
use serde_json::Value;

use super::common::ResourceKind;
use crate::config::Step;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PreconditionUnmet,
    Transient,
    Validation,
    Api,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&AppError> for FailureReason {
    fn from(err: &AppError) -> Self {
        let kind = match err {
            AppError::PreconditionUnmet(_) => FailureKind::PreconditionUnmet,
            AppError::ValidationError { .. } => FailureKind::Validation,
            e if e.is_retryable() => FailureKind::Transient,
            _ => FailureKind::Api,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Created { target_id: String },
    SkippedExisting { target_id: Option<String> },
    WouldCreate { payload: Value },
    SkippedNoPaymentMethod { customer: String },
    Failed { reason: FailureReason },
}

impl Outcome {
    pub fn failed(err: &AppError) -> Self {
        Outcome::Failed {
            reason: FailureReason::from(err),
        }
    }

    /// Failures and permanent skips make the run unclean.
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            Outcome::Failed { .. } | Outcome::SkippedNoPaymentMethod { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub step: Step,
    pub kind: ResourceKind,
    pub source_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub created: usize,
    pub skipped_existing: usize,
    pub would_create: usize,
    pub skipped_no_payment_method: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub live: bool,
    pub items: Vec<ItemOutcome>,
}

impl RunReport {
    pub fn new(live: bool) -> Self {
        Self {
            live,
            items: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        step: Step,
        kind: ResourceKind,
        source_id: impl Into<String>,
        outcome: Outcome,
    ) {
        let source_id = source_id.into();
        let prefix = if self.live { "" } else { "[Dry Run] " };
        match &outcome {
            Outcome::Created { target_id } => {
                log::info!("{prefix}{step}: created {kind} {target_id} from {source_id}")
            }
            Outcome::SkippedExisting { target_id } => log::info!(
                "{prefix}{step}: {kind} {source_id} already exists in target ({})",
                target_id.as_deref().unwrap_or("unknown id")
            ),
            Outcome::WouldCreate { payload } => {
                log::info!("{prefix}{step}: would create {kind} for {source_id}");
                log::debug!("{prefix}{step}: payload for {source_id}: {payload}");
            }
            Outcome::SkippedNoPaymentMethod { customer } => log::warn!(
                "{prefix}{step}: skipping {kind} {source_id}, customer {customer} has no default payment method"
            ),
            Outcome::Failed { reason } => {
                log::error!("{prefix}{step}: {kind} {source_id} failed: {}", reason.message)
            }
        }
        self.items.push(ItemOutcome {
            step,
            kind,
            source_id,
            outcome,
        });
    }

    pub fn summary(&self) -> ReportSummary {
        self.items
            .iter()
            .fold(ReportSummary::default(), |mut acc, item| {
                match item.outcome {
                    Outcome::Created { .. } => acc.created += 1,
                    Outcome::SkippedExisting { .. } => acc.skipped_existing += 1,
                    Outcome::WouldCreate { .. } => acc.would_create += 1,
                    Outcome::SkippedNoPaymentMethod { .. } => acc.skipped_no_payment_method += 1,
                    Outcome::Failed { .. } => acc.failed += 1,
                }
                acc
            })
    }

    /// False when any item failed or was permanently skipped.
    pub fn is_clean(&self) -> bool {
        !self.items.iter().any(|item| item.outcome.is_problem())
    }

    pub fn items_for(&self, step: Step) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(move |item| item.step == step)
    }

    /// Payloads recorded as `would_create`, in run order.
    pub fn previews(&self, kind: ResourceKind) -> Vec<&Value> {
        self.items
            .iter()
            .filter(|item| item.kind == kind)
            .filter_map(|item| match &item.outcome {
                Outcome::WouldCreate { payload } => Some(payload),
                _ => None,
            })
            .collect()
    }
}
