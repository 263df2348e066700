use super::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{extract::State, http::StatusCode as AxumStatus, routing::post, Json, Router};
use serde_json::json;
use shared::{domain::AsyncKind, protocol::NetworkEvent};
use tokio::net::TcpListener;

use crate::forms::{TokenAction, TokenForm};

#[derive(Clone, Default)]
struct MockServer {
    posts: Arc<AtomicUsize>,
}

async fn mint(State(server): State<MockServer>) -> (AxumStatus, Json<Value>) {
    server.posts.fetch_add(1, Ordering::SeqCst);
    (
        AxumStatus::ACCEPTED,
        Json(json!({ "type": "token_transfer", "id": "transfer1" })),
    )
}

async fn transfer(State(server): State<MockServer>) -> (AxumStatus, Json<Value>) {
    server.posts.fetch_add(1, Ordering::SeqCst);
    (
        AxumStatus::CONFLICT,
        Json(json!({ "code": "upstream", "message": "FF10119: insufficient balance", "status": 409 })),
    )
}

async fn spawn_server() -> (String, MockServer) {
    let server = MockServer::default();
    let app = Router::new()
        .route("/api/tokens/mint", post(mint))
        .route("/api/tokens/transfer", post(transfer))
        .with_state(server.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), server)
}

fn mint_form() -> ActiveForm {
    let mut form = TokenForm::new(TokenAction::Mint);
    form.pool = "my-pool".into();
    form.amount = "10".into();
    ActiveForm::Token(form)
}

fn confirmed(reference: &str) -> NetworkEvent {
    NetworkEvent {
        id: "evt1".into(),
        sequence: Some(1),
        event_type: "token_transfer_confirmed".into(),
        namespace: Some("default".into()),
        reference: Some(reference.into()),
        correlator: None,
        topic: None,
        tx: Some("tx1".into()),
        created: None,
    }
}

#[tokio::test]
async fn accepted_submission_awaits_until_confirmed() {
    let (url, server) = spawn_server().await;
    let watcher = EventWatcher::default();
    let mut trigger = SubmissionTrigger::new(SandboxApi::new(url), watcher.clone(), FormKind::Mint);

    let outcome = trigger.submit(&mint_form()).await.expect("submit");
    assert_eq!(
        outcome,
        SubmitOutcome::Accepted(AsyncResponse::new(AsyncKind::TokenTransfer, "transfer1"))
    );
    assert_eq!(
        trigger.status(),
        &TriggerStatus::Awaiting(CorrelationId::from("transfer1"))
    );
    assert_eq!(server.posts.load(Ordering::SeqCst), 1);
    assert!(trigger.poll_confirmation().is_none());

    watcher.dispatch(confirmed("transfer1"));
    let confirmation = trigger
        .wait_for_confirmation()
        .await
        .expect("watch")
        .expect("confirmation");
    assert_eq!(confirmation.resolution, EventResolution::Confirmed);
    assert_eq!(
        trigger.status(),
        &TriggerStatus::Completed {
            id: "transfer1".into(),
            resolution: EventResolution::Confirmed,
        }
    );
}

#[tokio::test]
async fn switching_forms_clears_awaiting_without_a_request() {
    let (url, server) = spawn_server().await;
    let watcher = EventWatcher::default();
    let mut trigger = SubmissionTrigger::new(SandboxApi::new(url), watcher.clone(), FormKind::Mint);

    trigger.submit(&mint_form()).await.expect("submit");
    assert!(trigger.is_awaiting());
    assert_eq!(watcher.pending_count(), 1);

    trigger.select_form(FormKind::Broadcast);
    assert!(!trigger.is_awaiting());
    assert_eq!(trigger.status(), &TriggerStatus::Idle);
    assert_eq!(watcher.pending_count(), 0);
    assert_eq!(server.posts.load(Ordering::SeqCst), 1);

    // The late confirmation no longer affects the trigger.
    watcher.dispatch(confirmed("transfer1"));
    assert!(trigger.poll_confirmation().is_none());
    assert_eq!(trigger.status(), &TriggerStatus::Idle);
}

#[tokio::test]
async fn new_submission_supersedes_the_previous_one() {
    let (url, server) = spawn_server().await;
    let watcher = EventWatcher::default();
    let mut trigger = SubmissionTrigger::new(SandboxApi::new(url), watcher.clone(), FormKind::Mint);

    trigger.submit(&mint_form()).await.expect("first");
    trigger.submit(&mint_form()).await.expect("second");
    assert_eq!(server.posts.load(Ordering::SeqCst), 2);
    assert_eq!(watcher.pending_count(), 1);
}

#[tokio::test]
async fn rejected_submission_notifies_and_does_not_await() {
    let (url, _server) = spawn_server().await;
    let watcher = EventWatcher::default();
    let mut trigger =
        SubmissionTrigger::new(SandboxApi::new(url), watcher.clone(), FormKind::Transfer);

    let mut form = TokenForm::new(TokenAction::Transfer);
    form.pool = "my-pool".into();
    form.amount = "1000".into();
    form.to = "0xdef".into();

    let err = trigger
        .submit(&ActiveForm::Token(form))
        .await
        .expect_err("conflict");
    assert!(matches!(
        err,
        SubmitError::Rejected { status, .. } if status == StatusCode::CONFLICT
    ));
    assert!(!trigger.is_awaiting());
    let notification = trigger.notification().expect("notification");
    assert_eq!(notification.status, Some(409));
    assert!(notification.message.contains("insufficient balance"));
    assert_eq!(watcher.pending_count(), 0);
}

#[tokio::test]
async fn incomplete_form_is_not_posted() {
    let (url, server) = spawn_server().await;
    let mut trigger = SubmissionTrigger::new(
        SandboxApi::new(url),
        EventWatcher::default(),
        FormKind::Mint,
    );

    let err = trigger
        .submit(&ActiveForm::blank(FormKind::Mint))
        .await
        .expect_err("missing fields");
    assert!(matches!(err, SubmitError::MissingFields(_)));
    assert!(trigger.notification().is_none());
    assert_eq!(server.posts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_server_is_reported_as_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut trigger = SubmissionTrigger::new(
        SandboxApi::new(format!("http://{addr}")),
        EventWatcher::default(),
        FormKind::Mint,
    );
    let err = trigger.submit(&mint_form()).await.expect_err("transport");
    assert!(matches!(err, SubmitError::Transport { .. }));
    assert_eq!(trigger.notification().and_then(|n| n.status), None);
    assert!(trigger.notification().is_some());
    assert!(!trigger.is_awaiting());
}
