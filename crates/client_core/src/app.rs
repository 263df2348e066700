use anyhow::{Context, Result};
use shared::{domain::Organization, protocol::NetworkEvent};
use tokio::{
    sync::broadcast::{self, error::TryRecvError},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    api::SandboxApi,
    forms::{ActiveForm, FormKind},
    trigger::{SubmissionTrigger, SubmitError, SubmitOutcome},
    watcher::{Confirmation, EventWatcher, WatchError},
};

/// Everything a front end needs between screens: who we are, who else is
/// on the network, the form being edited and the event feed.
pub struct AppState {
    pub api: SandboxApi,
    pub watcher: EventWatcher,
    pub identity: Organization,
    pub organizations: Vec<Organization>,
    active_form: ActiveForm,
    trigger: SubmissionTrigger,
    events_rx: broadcast::Receiver<NetworkEvent>,
    new_events: Vec<NetworkEvent>,
    relay_task: Option<JoinHandle<()>>,
}

impl AppState {
    /// Loads identity and peers from the server and opens the event relay.
    /// A relay that cannot be reached is logged; reads and submissions
    /// still work without it.
    pub async fn connect(server_url: &str) -> Result<Self> {
        let api = SandboxApi::new(server_url);
        let identity = api
            .self_organization()
            .await
            .with_context(|| format!("failed to load local organization from {server_url}"))?;
        let organizations = api
            .organizations(true)
            .await
            .context("failed to load network organizations")?;
        info!(org = %identity.name, peers = organizations.len(), "connected to sandbox server");

        let watcher = EventWatcher::default();
        let events_rx = watcher.subscribe();
        let relay_task = match watcher.connect(api.server_url()).await {
            Ok(task) => Some(task),
            Err(error) => {
                warn!(%error, "event relay unavailable; confirmations will not arrive");
                None
            }
        };

        let form = FormKind::Broadcast;
        Ok(Self {
            trigger: SubmissionTrigger::new(api.clone(), watcher.clone(), form),
            active_form: ActiveForm::blank(form),
            api,
            watcher,
            identity,
            organizations,
            events_rx,
            new_events: Vec::new(),
            relay_task,
        })
    }

    pub fn is_ws_connected(&self) -> bool {
        self.watcher.is_connected()
    }

    pub fn active_form(&self) -> &ActiveForm {
        &self.active_form
    }

    pub fn form_mut(&mut self) -> &mut ActiveForm {
        &mut self.active_form
    }

    pub fn trigger(&self) -> &SubmissionTrigger {
        &self.trigger
    }

    /// Replaces the active form. Switching always drops the awaited
    /// confirmation, even when the new form is of the same kind.
    pub fn select_form(&mut self, form: ActiveForm) {
        self.trigger.select_form(form.kind());
        self.active_form = form;
    }

    pub fn missing_required_fields(&self) -> bool {
        self.active_form.missing_required_fields()
    }

    pub async fn submit(&mut self) -> Result<SubmitOutcome, SubmitError> {
        self.trigger.submit(&self.active_form).await
    }

    pub async fn wait_for_confirmation(&mut self) -> Result<Option<Confirmation>, WatchError> {
        self.trigger.wait_for_confirmation().await
    }

    /// Events relayed since the last [`AppState::clear_new_events`]. Also
    /// settles the trigger when its confirmation is among them.
    pub fn new_events(&mut self) -> &[NetworkEvent] {
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => self.new_events.push(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event feed lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        self.trigger.poll_confirmation();
        &self.new_events
    }

    pub fn clear_new_events(&mut self) {
        let _ = self.new_events();
        self.new_events.clear();
    }

    /// Leaving a page: a blank form of the same kind, nothing awaited, an
    /// empty event feed. Identity and the relay survive.
    pub fn reset_for_navigation(&mut self) {
        let kind = self.active_form.kind();
        self.select_form(ActiveForm::blank(kind));
        self.trigger.dismiss_notification();
        self.clear_new_events();
    }

    pub fn shutdown(mut self) {
        if let Some(task) = self.relay_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
