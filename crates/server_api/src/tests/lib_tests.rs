use super::*;
use network_client::{
    testing::{RecordedCall, RecordingNetworkClient},
    NetworkBalance, NetworkOrganization, NetworkVerifier,
};
use serde_json::json;
use shared::domain::TokenPoolType;

fn org(id: &str, name: &str) -> NetworkOrganization {
    NetworkOrganization {
        id: id.into(),
        did: format!("did:firefly:org/{name}"),
        name: name.into(),
        parent: None,
        description: None,
    }
}

fn sample_schema() -> Value {
    json!({
        "$id": "https://example.com/widget.schema.json",
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "Widget",
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "The unique identifier for the widget." },
            "name": { "type": "string", "description": "The person's last name." }
        }
    })
}

fn setup(network: RecordingNetworkClient) -> (ApiContext, Arc<RecordingNetworkClient>) {
    let network = Arc::new(network);
    (
        ApiContext {
            network: network.clone(),
        },
        network,
    )
}

#[tokio::test]
async fn exclude_self_removes_only_the_local_organization() {
    let orgs = vec![org("org1", "org_1"), org("org2", "org_2"), org("org3", "org_3")];
    let (ctx, _) = setup(
        RecordingNetworkClient::new()
            .with_organizations(orgs.clone())
            .with_self_org(&orgs[1]),
    );

    let all = list_organizations(&ctx, false).await.expect("orgs");
    assert_eq!(all.len(), 3);

    let others = list_organizations(&ctx, true).await.expect("orgs");
    let ids: Vec<&str> = others.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["org1", "org3"]);
}

#[tokio::test]
async fn listing_without_exclusion_skips_status_lookup() {
    let (ctx, network) = setup(RecordingNetworkClient::new().with_organizations(vec![org(
        "org1", "org_1",
    )]));

    list_organizations(&ctx, false).await.expect("orgs");
    assert_eq!(network.calls().await, vec![RecordedCall::GetOrganizations]);
}

#[tokio::test]
async fn self_organization_comes_from_status() {
    let local = org("org1", "org_1");
    let (ctx, _) = setup(RecordingNetworkClient::new().with_self_org(&local));

    let me = self_organization(&ctx).await.expect("self");
    assert_eq!(me.id.as_str(), "org1");
    assert_eq!(me.did, "did:firefly:org/org_1");
    assert_eq!(me.name, "org_1");
}

#[tokio::test]
async fn verifiers_without_known_organization_are_dropped() {
    let (ctx, network) = setup(
        RecordingNetworkClient::new()
            .with_organizations(vec![org("org1", "org_1")])
            .with_verifiers(vec![
                NetworkVerifier {
                    identity: "org1".into(),
                    verifier_type: "ethereum_address".into(),
                    value: "0x111".into(),
                    namespace: None,
                },
                NetworkVerifier {
                    identity: "unknown".into(),
                    verifier_type: "ethereum_address".into(),
                    value: "0x222".into(),
                    namespace: None,
                },
            ]),
    );

    let verifiers = list_verifiers(&ctx).await.expect("verifiers");
    assert_eq!(
        verifiers,
        vec![Verifier {
            did: "did:firefly:org/org_1".into(),
            verifier_type: "ethereum_address".into(),
            value: "0x111".into(),
        }]
    );
    assert!(network
        .calls()
        .await
        .contains(&RecordedCall::GetVerifiers(SYSTEM_NAMESPACE.into())));
}

#[tokio::test]
async fn datatype_schema_round_trips_by_name_and_version() {
    let (ctx, network) = setup(RecordingNetworkClient::new());

    let accepted = create_datatype(
        &ctx,
        DatatypeInput {
            name: "my-datatype".into(),
            version: "1.0".into(),
            schema: sample_schema(),
        },
    )
    .await
    .expect("create");
    assert_eq!(accepted, AsyncResponse::new(AsyncKind::Datatype, "datatype1"));
    assert_eq!(
        network.calls().await[0],
        RecordedCall::CreateDatatype(CreateDatatype {
            name: "my-datatype".into(),
            version: "1.0".into(),
            value: sample_schema(),
        })
    );

    let fetched = get_datatype(&ctx, "my-datatype", "1.0").await.expect("get");
    let schema: Value = serde_json::from_str(&fetched.schema).expect("schema json");
    assert_eq!(schema, sample_schema());
}

#[tokio::test]
async fn pre_serialized_schemas_are_passed_through() {
    let raw = sample_schema().to_string();
    let (ctx, _) = setup(RecordingNetworkClient::new().with_datatypes(vec![NetworkDatatype {
        id: "datatype1".into(),
        name: "my-datatype".into(),
        version: "1.0".into(),
        value: Value::String(raw.clone()),
        validator: Some("json".into()),
        hash: None,
        created: None,
    }]));

    let datatypes = list_datatypes(&ctx).await.expect("list");
    assert_eq!(datatypes[0].schema, raw);
}

#[tokio::test]
async fn create_pool_defaults_config_to_empty_object() {
    let (ctx, network) = setup(RecordingNetworkClient::new());

    let accepted = create_token_pool(
        &ctx,
        TokenPoolInput {
            name: "my-pool".into(),
            symbol: Some("P1".into()),
            pool_type: TokenPoolType::Fungible,
            config: None,
        },
    )
    .await
    .expect("create");
    assert_eq!(accepted, AsyncResponse::new(AsyncKind::TokenPool, "pool1"));

    let RecordedCall::CreateTokenPool(request) = &network.calls().await[0] else {
        panic!("expected create pool call");
    };
    assert_eq!(
        serde_json::to_value(request).expect("json"),
        json!({ "name": "my-pool", "symbol": "P1", "type": "fungible", "config": {} })
    );
}

#[tokio::test]
async fn mint_forwards_exactly_the_supplied_fields() {
    let (ctx, network) = setup(RecordingNetworkClient::new().with_transfer_id("transfer1"));

    let accepted = mint_tokens(
        &ctx,
        TokenMintBurn {
            pool: "my-pool".into(),
            amount: "10".into(),
            token_index: None,
        },
    )
    .await
    .expect("mint");
    assert_eq!(
        accepted,
        AsyncResponse::new(AsyncKind::TokenTransfer, "transfer1")
    );

    let RecordedCall::MintTokens(request) = &network.calls().await[0] else {
        panic!("expected mint call");
    };
    assert_eq!(
        serde_json::to_value(request).expect("json"),
        json!({ "pool": "my-pool", "amount": "10" })
    );
}

#[tokio::test]
async fn transfer_requires_recipient() {
    let (ctx, network) = setup(RecordingNetworkClient::new());

    let err = transfer_tokens(
        &ctx,
        TokenTransferInput {
            pool: "my-pool".into(),
            amount: "1".into(),
            to: " ".into(),
            token_index: None,
        },
    )
    .await
    .expect_err("missing recipient");
    assert_eq!(err.code, ErrorCode::Validation);
    assert!(network.calls().await.is_empty());
}

#[tokio::test]
async fn balances_default_to_positive_filter_and_resolve_pools_once() {
    let (ctx, network) = setup(
        RecordingNetworkClient::new()
            .with_token_pools(vec![NetworkTokenPool {
                id: "poolA".into(),
                name: Some("poolA".into()),
                pool_type: Some(TokenPoolType::Fungible),
                ..NetworkTokenPool::default()
            }])
            .with_balances(vec![
                NetworkBalance {
                    key: "0x123".into(),
                    balance: "1".into(),
                    pool: "poolA".into(),
                    token_index: None,
                },
                NetworkBalance {
                    key: "0x456".into(),
                    balance: "5".into(),
                    pool: "poolA".into(),
                    token_index: None,
                },
            ]),
    );

    let balances = token_balances(
        &ctx,
        BalanceQuery {
            pool: Some("poolA".into()),
            key: None,
            balance: None,
        },
    )
    .await
    .expect("balances");
    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0].pool.name.as_deref(), Some("poolA"));

    let calls = network.calls().await;
    assert_eq!(
        calls[0],
        RecordedCall::GetTokenBalances(BalanceFilter {
            pool: Some("poolA".into()),
            key: None,
            balance: Some(">0".into()),
        })
    );
    let pool_lookups = calls
        .iter()
        .filter(|c| matches!(c, RecordedCall::GetTokenPool(_)))
        .count();
    assert_eq!(pool_lookups, 1);
}

#[tokio::test]
async fn private_message_targets_recipients() {
    let (ctx, network) = setup(RecordingNetworkClient::new());

    let accepted = private_message(
        &ctx,
        PrivateValue {
            message: BroadcastValue {
                tag: Some("greeting".into()),
                topic: Some("".into()),
                value: Some("hello".into()),
                ..BroadcastValue::default()
            },
            recipients: vec!["did:firefly:org/org_2".into()],
        },
    )
    .await
    .expect("private");
    assert_eq!(accepted, AsyncResponse::new(AsyncKind::Message, "message1"));

    let RecordedCall::SendPrivate(message) = &network.calls().await[0] else {
        panic!("expected private send");
    };
    assert_eq!(
        serde_json::to_value(message).expect("json"),
        json!({
            "header": { "tag": "greeting" },
            "group": { "members": [{ "identity": "did:firefly:org/org_2" }] },
            "data": [{ "value": "hello" }]
        })
    );
}

#[tokio::test]
async fn private_message_without_recipients_is_rejected() {
    let (ctx, network) = setup(RecordingNetworkClient::new());
    let err = private_message(
        &ctx,
        PrivateValue {
            message: BroadcastValue {
                value: Some("hello".into()),
                ..BroadcastValue::default()
            },
            recipients: Vec::new(),
        },
    )
    .await
    .expect_err("no recipients");
    assert_eq!(err.code, ErrorCode::Validation);
    assert!(network.calls().await.is_empty());
}

#[tokio::test]
async fn json_broadcast_binds_datatype() {
    let (ctx, network) = setup(RecordingNetworkClient::new());

    broadcast_message(
        &ctx,
        BroadcastValue {
            json_value: Some(json!({ "id": "w1", "name": "widget" })),
            datatypename: Some("widget".into()),
            datatypeversion: Some("1.0".into()),
            ..BroadcastValue::default()
        },
    )
    .await
    .expect("broadcast");

    let RecordedCall::SendBroadcast(message) = &network.calls().await[0] else {
        panic!("expected broadcast");
    };
    assert_eq!(
        serde_json::to_value(&message.data).expect("json"),
        json!([{
            "value": { "id": "w1", "name": "widget" },
            "validator": "json",
            "datatype": { "name": "widget", "version": "1.0" }
        }])
    );
}

#[tokio::test]
async fn blob_transfer_uploads_then_attaches_data() {
    let (ctx, network) = setup(RecordingNetworkClient::new());

    let accepted = token_operation_blob(
        &ctx,
        TokenOperation::Transfer,
        BlobTokenOperation {
            file: BlobFile {
                filename: "invoice.pdf".into(),
                content_type: Some("application/pdf".into()),
                bytes: b"%PDF".to_vec(),
            },
            tag: None,
            topic: Some("invoices".into()),
            pool: "my-pool".into(),
            amount: "1".into(),
            token_index: Some(String::new()),
            to: Some("0x111".into()),
        },
    )
    .await
    .expect("transfer blob");
    assert_eq!(
        accepted,
        AsyncResponse::new(AsyncKind::TokenTransfer, "transfer1")
    );

    let calls = network.calls().await;
    assert_eq!(
        calls[0],
        RecordedCall::UploadBlob {
            filename: "invoice.pdf".into(),
            size: 4
        }
    );
    let RecordedCall::TransferTokens(request) = &calls[1] else {
        panic!("expected transfer");
    };
    assert_eq!(
        serde_json::to_value(request).expect("json"),
        json!({
            "pool": "my-pool",
            "amount": "1",
            "to": "0x111",
            "message": {
                "header": { "topics": ["invoices"] },
                "data": [{ "id": "data1" }]
            }
        })
    );
}

#[tokio::test]
async fn upstream_failures_keep_status_and_message() {
    let (ctx, _) = setup(RecordingNetworkClient::new().failing(409, "FF10127: conflict"));

    let err = list_token_pools(&ctx).await.expect_err("upstream failure");
    assert_eq!(err.code, ErrorCode::Upstream);
    assert_eq!(err.status, Some(409));
    assert_eq!(err.message, "FF10127: conflict");
    assert_eq!(err.http_status(), 409);
}
