//! Correlates confirmation events from the server's relay with the ids
//! returned by `202 Accepted` responses.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use shared::{
    domain::CorrelationId,
    protocol::{EventResolution, NetworkEvent},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

pub const DEFAULT_RECENT_EVENTS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub resolution: EventResolution,
    pub event: NetworkEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("event watcher shut down before {0} was confirmed")]
    Closed(CorrelationId),
}

#[derive(Default)]
struct WatcherState {
    pending: HashMap<String, HashMap<u64, oneshot::Sender<NetworkEvent>>>,
    recent: VecDeque<NetworkEvent>,
    next_token: u64,
}

struct Shared {
    state: Mutex<WatcherState>,
    events: broadcast::Sender<NetworkEvent>,
    connected: AtomicBool,
    recent_capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WatcherState> {
        // A panic while holding the lock leaves the maps consistent.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Process-wide event subscription. Cloning shares the same registrations.
#[derive(Clone)]
pub struct EventWatcher {
    shared: Arc<Shared>,
}

impl Default for EventWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_EVENTS)
    }
}

impl EventWatcher {
    pub fn new(recent_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(recent_capacity.max(16));
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(WatcherState::default()),
                events,
                connected: AtomicBool::new(false),
                recent_capacity: recent_capacity.max(1),
            }),
        }
    }

    /// Registers interest in `id`. An already-seen resolving event for the
    /// same id settles the handle immediately.
    pub fn register(&self, id: impl Into<CorrelationId>) -> AwaitedEvent {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        let mut state = self.shared.lock();

        let seen = state
            .recent
            .iter()
            .rev()
            .find(|event| {
                event.resolution().is_some()
                    && event.correlation_ids().any(|cid| cid == id.as_str())
            })
            .cloned();
        let token = state.next_token;
        state.next_token += 1;

        match seen {
            Some(event) => {
                let _ = tx.send(event);
            }
            None => {
                state
                    .pending
                    .entry(id.as_str().to_string())
                    .or_default()
                    .insert(token, tx);
            }
        }
        drop(state);

        debug!(%id, "awaiting confirmation");
        AwaitedEvent {
            id,
            token,
            receiver: rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Records an event, settles matching registrations and republishes it.
    pub fn dispatch(&self, event: NetworkEvent) {
        {
            let mut state = self.shared.lock();
            if state.recent.len() == self.shared.recent_capacity {
                state.recent.pop_front();
            }
            state.recent.push_back(event.clone());

            if event.resolution().is_some() {
                let ids: Vec<String> = event.correlation_ids().map(str::to_string).collect();
                for id in ids {
                    if let Some(waiters) = state.pending.remove(&id) {
                        debug!(%id, event_type = %event.event_type, waiters = waiters.len(), "confirmation matched");
                        for (_, waiter) in waiters {
                            let _ = waiter.send(event.clone());
                        }
                    }
                }
            }
        }
        let _ = self.shared.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.shared.events.subscribe()
    }

    pub fn recent_events(&self) -> Vec<NetworkEvent> {
        self.shared.lock().recent.iter().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.values().map(HashMap::len).sum()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Opens the server's `/api/ws` relay and feeds every event into
    /// [`EventWatcher::dispatch`] until the socket closes. Registrations
    /// still pending at that point are released with [`WatchError::Closed`].
    pub async fn connect(&self, server_url: &str) -> Result<JoinHandle<()>> {
        let ws_url = relay_url(server_url)?;
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        let (_, mut ws_reader) = ws_stream.split();
        self.shared.connected.store(true, Ordering::SeqCst);
        info!(%ws_url, "listening for network events");

        let watcher = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<NetworkEvent>(&text) {
                        Ok(event) => watcher.dispatch(event),
                        Err(error) => warn!(%error, "ignoring malformed event frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "event relay connection failed");
                        break;
                    }
                }
            }
            watcher.shared.connected.store(false, Ordering::SeqCst);
            // Nothing will settle these any more; waiters see `Closed`.
            let abandoned = std::mem::take(&mut watcher.shared.lock().pending);
            info!(abandoned = abandoned.len(), "event relay disconnected");
        }))
    }
}

fn relay_url(server_url: &str) -> Result<String> {
    let server_url = server_url.trim_end_matches('/');
    let ws_url = if server_url.starts_with("https://") {
        server_url.replacen("https://", "wss://", 1)
    } else if server_url.starts_with("http://") {
        server_url.replacen("http://", "ws://", 1)
    } else {
        return Err(anyhow!("server_url must start with http:// or https://"));
    };
    Ok(format!("{ws_url}/api/ws"))
}

/// Pending confirmation for one correlation id. Dropping the handle removes
/// the registration.
pub struct AwaitedEvent {
    id: CorrelationId,
    token: u64,
    receiver: oneshot::Receiver<NetworkEvent>,
    shared: Arc<Shared>,
}

impl AwaitedEvent {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Waits for the matching confirmation or rejection.
    pub async fn wait(&mut self) -> Result<Confirmation, WatchError> {
        match (&mut self.receiver).await {
            Ok(event) => Ok(settle(event)),
            Err(_) => Err(WatchError::Closed(self.id.clone())),
        }
    }

    /// Non-blocking check, for callers that poll between redraws.
    pub fn try_resolve(&mut self) -> Option<Confirmation> {
        self.receiver.try_recv().ok().map(settle)
    }

    pub fn cancel(self) {}
}

impl Drop for AwaitedEvent {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if let Some(waiters) = state.pending.get_mut(self.id.as_str()) {
            waiters.remove(&self.token);
            if waiters.is_empty() {
                state.pending.remove(self.id.as_str());
            }
        }
    }
}

fn settle(event: NetworkEvent) -> Confirmation {
    Confirmation {
        resolution: event.resolution().unwrap_or(EventResolution::Confirmed),
        event,
    }
}

#[cfg(test)]
#[path = "tests/watcher_tests.rs"]
mod tests;
