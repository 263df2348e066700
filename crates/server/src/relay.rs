//! Pumps the node's event stream into the server's broadcast channel and
//! fans it out to websocket clients on `/api/ws`.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use network_client::{NetworkClient, NetworkError};
use shared::protocol::NetworkEvent;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::app_state::AppState;

pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(3);

pub(crate) fn spawn_event_pump(
    network: Arc<dyn NetworkClient>,
    events: broadcast::Sender<NetworkEvent>,
    reconnect_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match network.subscribe_events().await {
                Ok(mut stream) => {
                    info!("subscribed to network events");
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(event) => {
                                debug!(id = %event.id, event_type = %event.event_type, "relaying event");
                                // No receivers is fine; clients come and go.
                                let _ = events.send(event);
                            }
                            Err(NetworkError::Decode(error)) => {
                                warn!(%error, "skipping undecodable network event");
                            }
                            Err(error) => {
                                warn!(%error, "network event stream failed");
                                break;
                            }
                        }
                    }
                    warn!("network event stream ended");
                }
                Err(error) => warn!(%error, "failed to subscribe to network events"),
            }
            tokio::time::sleep(reconnect_delay).await;
        }
    })
}

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagged behind event relay");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/relay_tests.rs"]
mod tests;
