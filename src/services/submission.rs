use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::external::AccountClient;
use crate::models::{Outcome, ResourceKind};

pub struct Submitted {
    pub outcome: Outcome,
    /// The resource as returned by the target, live runs only.
    pub created: Option<Value>,
}

impl Submitted {
    pub fn target_id(&self) -> Option<&str> {
        self.created.as_ref().and_then(|c| c["id"].as_str())
    }
}

/// Serializes `payload` once; a dry run records it, a live run submits it.
pub async fn create_or_preview<C, P>(
    target: &C,
    live: bool,
    kind: ResourceKind,
    payload: &P,
) -> AppResult<Submitted>
where
    C: AccountClient + ?Sized,
    P: Serialize,
{
    let payload = serde_json::to_value(payload)?;
    if !live {
        return Ok(Submitted {
            outcome: Outcome::WouldCreate { payload },
            created: None,
        });
    }

    match target.create(kind, &payload).await {
        Ok(created) => {
            let target_id = created["id"].as_str().unwrap_or_default().to_string();
            Ok(Submitted {
                outcome: Outcome::Created { target_id },
                created: Some(created),
            })
        }
        Err(AppError::AlreadyExists(message)) => {
            log::warn!("{kind} was created concurrently in target: {message}");
            Ok(Submitted {
                outcome: Outcome::SkippedExisting {
                    target_id: payload["id"].as_str().map(str::to_string),
                },
                created: None,
            })
        }
        Err(e) => Err(e),
    }
}
