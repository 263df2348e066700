//! Posts the active form and tracks the confirmation it is waiting for.

use reqwest::StatusCode;
use serde_json::Value;
use shared::{
    domain::CorrelationId,
    error::ApiError,
    protocol::{AsyncResponse, EventResolution},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    api::SandboxApi,
    forms::{ActiveForm, FormKind, MissingFields, Payload},
    watcher::{AwaitedEvent, Confirmation, EventWatcher, WatchError},
};

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerStatus {
    Idle,
    Awaiting(CorrelationId),
    Completed {
        id: CorrelationId,
        resolution: EventResolution,
    },
}

/// Transient message for the user about the last submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub endpoint: String,
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// `202`: the operation completes asynchronously under this id.
    Accepted(AsyncResponse),
    /// Any other success status; nothing to wait for.
    Completed(Value),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    MissingFields(#[from] MissingFields),
    #[error("{endpoint} answered {status}: {message}")]
    Rejected {
        endpoint: String,
        status: StatusCode,
        message: String,
    },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned an unreadable 202 body: {body}")]
    MalformedAccepted { endpoint: String, body: Value },
}

impl SubmitError {
    pub fn notification(&self) -> Option<Notification> {
        match self {
            SubmitError::MissingFields(_) => None,
            SubmitError::Rejected {
                endpoint, status, ..
            } => Some(Notification {
                endpoint: endpoint.clone(),
                status: Some(status.as_u16()),
                message: self.to_string(),
            }),
            SubmitError::Transport { endpoint, .. }
            | SubmitError::MalformedAccepted { endpoint, .. } => Some(Notification {
                endpoint: endpoint.clone(),
                status: None,
                message: self.to_string(),
            }),
        }
    }
}

pub struct SubmissionTrigger {
    api: SandboxApi,
    watcher: EventWatcher,
    form: FormKind,
    status: TriggerStatus,
    awaited: Option<AwaitedEvent>,
    notification: Option<Notification>,
}

impl SubmissionTrigger {
    pub fn new(api: SandboxApi, watcher: EventWatcher, form: FormKind) -> Self {
        Self {
            api,
            watcher,
            form,
            status: TriggerStatus::Idle,
            awaited: None,
            notification: None,
        }
    }

    pub fn status(&self) -> &TriggerStatus {
        &self.status
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.status, TriggerStatus::Awaiting(_))
    }

    pub fn active_form(&self) -> FormKind {
        self.form
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn dismiss_notification(&mut self) {
        self.notification = None;
    }

    /// Switches the target form. Any awaited confirmation is forgotten
    /// locally; the server is not told.
    pub fn select_form(&mut self, form: FormKind) {
        if let Some(awaited) = self.awaited.take() {
            info!(id = %awaited.id(), "dropping awaited confirmation on form change");
            awaited.cancel();
        }
        self.form = form;
        self.status = TriggerStatus::Idle;
    }

    pub async fn submit(&mut self, form: &ActiveForm) -> Result<SubmitOutcome, SubmitError> {
        if form.kind() != self.form {
            self.select_form(form.kind());
        }
        let payload = form.payload()?;
        let endpoint = payload.endpoint();

        // A new submission supersedes whatever was pending.
        self.awaited = None;
        self.status = TriggerStatus::Idle;
        self.notification = None;

        let result = self.post(&endpoint, &payload).await;
        match &result {
            Ok(SubmitOutcome::Accepted(accepted)) => {
                info!(%endpoint, id = %accepted.id, kind = accepted.kind.as_str(), "submission accepted");
                self.awaited = Some(self.watcher.register(accepted.id.clone()));
                self.status = TriggerStatus::Awaiting(accepted.id.clone());
            }
            Ok(SubmitOutcome::Completed(_)) => {}
            Err(error) => {
                warn!(%endpoint, %error, "submission failed");
                self.notification = error.notification();
            }
        }
        result
    }

    async fn post(
        &self,
        endpoint: &str,
        payload: &Payload,
    ) -> Result<SubmitOutcome, SubmitError> {
        let response = self
            .api
            .post_payload(payload)
            .await
            .map_err(|source| SubmitError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if response.status == StatusCode::ACCEPTED {
            let accepted: AsyncResponse =
                serde_json::from_value(response.body.clone()).map_err(|_| {
                    SubmitError::MalformedAccepted {
                        endpoint: endpoint.to_string(),
                        body: response.body.clone(),
                    }
                })?;
            return Ok(SubmitOutcome::Accepted(accepted));
        }
        if response.status.is_success() {
            return Ok(SubmitOutcome::Completed(response.body));
        }

        let message = serde_json::from_value::<ApiError>(response.body.clone())
            .map(|err| err.message)
            .unwrap_or_else(|_| response.body.to_string());
        Err(SubmitError::Rejected {
            endpoint: endpoint.to_string(),
            status: response.status,
            message,
        })
    }

    /// Non-blocking: settles the status if the confirmation already arrived.
    pub fn poll_confirmation(&mut self) -> Option<Confirmation> {
        let confirmation = self.awaited.as_mut()?.try_resolve()?;
        self.complete(&confirmation);
        Some(confirmation)
    }

    /// Waits for the pending confirmation. Returns `Ok(None)` when nothing is
    /// being awaited.
    pub async fn wait_for_confirmation(&mut self) -> Result<Option<Confirmation>, WatchError> {
        let Some(awaited) = self.awaited.as_mut() else {
            return Ok(None);
        };
        let confirmation = awaited.wait().await?;
        self.complete(&confirmation);
        Ok(Some(confirmation))
    }

    fn complete(&mut self, confirmation: &Confirmation) {
        if let Some(awaited) = self.awaited.take() {
            info!(id = %awaited.id(), resolution = ?confirmation.resolution, "confirmation received");
            self.status = TriggerStatus::Completed {
                id: awaited.id().clone(),
                resolution: confirmation.resolution,
            };
        }
    }
}

#[cfg(test)]
#[path = "tests/trigger_tests.rs"]
mod tests;
