use super::*;
use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use shared::protocol::EventResolution;
use tokio::net::TcpListener;

use crate::forms::{MessageContent, TokenAction, TokenForm};

#[derive(Clone)]
struct MockServer {
    events: broadcast::Sender<String>,
}

async fn self_org() -> Json<Value> {
    Json(json!({ "id": "org1", "did": "did:firefly:org/org_1", "name": "org_1" }))
}

async fn orgs() -> Json<Value> {
    Json(json!([{ "id": "org2", "did": "did:firefly:org/org_2", "name": "org_2" }]))
}

async fn mint(State(server): State<MockServer>) -> (StatusCode, Json<Value>) {
    let events = server.events.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = events.send(
            json!({
                "id": "evt1",
                "type": "token_transfer_confirmed",
                "reference": "transfer1",
                "namespace": "default"
            })
            .to_string(),
        );
    });
    (
        StatusCode::ACCEPTED,
        Json(json!({ "type": "token_transfer", "id": "transfer1" })),
    )
}

async fn ws(ws: WebSocketUpgrade, State(server): State<MockServer>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay(socket, server))
}

async fn relay(socket: WebSocket, server: MockServer) {
    let (mut sender, _) = socket.split();
    let mut rx = server.events.subscribe();
    while let Ok(text) = rx.recv().await {
        if sender.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}

async fn spawn_server() -> (String, MockServer) {
    let (events, _) = broadcast::channel(16);
    let server = MockServer { events };
    let app = Router::new()
        .route("/api/common/organizations/self", get(self_org))
        .route("/api/common/organizations", get(orgs))
        .route("/api/tokens/mint", post(mint))
        .route("/api/ws", get(ws))
        .with_state(server.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), server)
}

async fn wait_for_subscriber(server: &MockServer) {
    for _ in 0..100 {
        if server.events.receiver_count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("relay never subscribed");
}

#[tokio::test]
async fn connect_loads_identity_and_peers() {
    let (url, _server) = spawn_server().await;
    let state = AppState::connect(&url).await.expect("connect");

    assert_eq!(state.identity.name, "org_1");
    assert_eq!(state.organizations.len(), 1);
    assert_eq!(state.organizations[0].id.as_str(), "org2");
    assert!(state.is_ws_connected());
    assert_eq!(state.active_form().kind(), FormKind::Broadcast);
    state.shutdown();
}

#[tokio::test]
async fn mint_is_confirmed_through_the_relay() {
    let (url, server) = spawn_server().await;
    let mut state = AppState::connect(&url).await.expect("connect");
    wait_for_subscriber(&server).await;

    let mut form = TokenForm::new(TokenAction::Mint);
    form.pool = "my-pool".into();
    form.amount = "10".into();
    state.select_form(ActiveForm::Token(form));
    assert!(!state.missing_required_fields());

    state.submit().await.expect("submit");
    assert!(state.trigger().is_awaiting());

    let confirmation = tokio::time::timeout(Duration::from_secs(2), state.wait_for_confirmation())
        .await
        .expect("confirmed in time")
        .expect("watch")
        .expect("confirmation");
    assert_eq!(confirmation.resolution, EventResolution::Confirmed);
    assert!(!state.trigger().is_awaiting());

    let events = state.new_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "token_transfer_confirmed");
    state.shutdown();
}

#[tokio::test]
async fn navigation_resets_form_and_feed() {
    let (url, server) = spawn_server().await;
    let mut state = AppState::connect(&url).await.expect("connect");
    wait_for_subscriber(&server).await;

    if let ActiveForm::Message(form) = state.form_mut() {
        form.content = MessageContent::Text("draft".into());
    }
    state.watcher.dispatch(shared::protocol::NetworkEvent {
        id: "evt9".into(),
        sequence: None,
        event_type: "message_confirmed".into(),
        namespace: None,
        reference: Some("m1".into()),
        correlator: None,
        topic: None,
        tx: None,
        created: None,
    });
    assert_eq!(state.new_events().len(), 1);

    state.reset_for_navigation();
    assert_eq!(state.active_form(), &ActiveForm::blank(FormKind::Broadcast));
    assert!(state.new_events().is_empty());
    assert!(!state.trigger().is_awaiting());
    state.shutdown();
}

#[tokio::test]
async fn connect_fails_when_server_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    assert!(AppState::connect(&format!("http://{addr}")).await.is_err());
}

#[tokio::test]
async fn polling_the_feed_settles_the_trigger() {
    let (url, server) = spawn_server().await;
    let mut state = AppState::connect(&url).await.expect("connect");
    wait_for_subscriber(&server).await;

    let mut form = TokenForm::new(TokenAction::Mint);
    form.pool = "my-pool".into();
    form.amount = "10".into();
    state.select_form(ActiveForm::Token(form));
    state.submit().await.expect("submit");

    for _ in 0..200 {
        if !state.new_events().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.new_events().len(), 1);
    assert_eq!(
        state.trigger().status(),
        &crate::trigger::TriggerStatus::Completed {
            id: "transfer1".into(),
            resolution: EventResolution::Confirmed,
        }
    );
    state.shutdown();
}
