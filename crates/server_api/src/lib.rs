use std::{collections::HashMap, sync::Arc};

use network_client::{
    BalanceFilter, BlobUpload, CreateDatatype, CreateTokenPool, DataInput, DatatypeRef,
    GroupInput, GroupMember, MessageHeader, MessageInput, MintBurnRequest, NetworkClient,
    NetworkDatatype, NetworkError, NetworkTokenPool, TransferRequest,
};
use serde_json::Value;
use shared::{
    domain::{AsyncKind, Balance, Datatype, Organization, TokenPool, Verifier},
    error::{ApiError, ErrorCode},
    protocol::{
        AsyncResponse, BalanceQuery, BroadcastValue, DatatypeInput, PrivateValue, TokenMintBurn,
        TokenPoolInput, TokenTransferInput,
    },
};
use tracing::info;

/// Namespace holding verifiers for every organization in the network.
pub const SYSTEM_NAMESPACE: &str = "ff_system";

/// Balance filter applied when the caller does not supply one.
pub const DEFAULT_BALANCE_FILTER: &str = ">0";

#[derive(Clone)]
pub struct ApiContext {
    pub network: Arc<dyn NetworkClient>,
}

/// File received through a multipart upload.
#[derive(Debug, Clone)]
pub struct BlobFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BlobMessage {
    pub file: BlobFile,
    pub tag: Option<String>,
    pub topic: Option<String>,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BlobTokenOperation {
    pub file: BlobFile,
    pub tag: Option<String>,
    pub topic: Option<String>,
    pub pool: String,
    pub amount: String,
    pub token_index: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOperation {
    Mint,
    Burn,
    Transfer,
}

pub async fn list_organizations(
    ctx: &ApiContext,
    exclude_self: bool,
) -> Result<Vec<Organization>, ApiError> {
    let mut orgs = ctx.network.get_organizations().await.map_err(upstream)?;
    if exclude_self {
        let status = ctx.network.get_status().await.map_err(upstream)?;
        orgs.retain(|o| o.id != status.org.id);
    }
    Ok(orgs
        .into_iter()
        .map(|o| Organization {
            id: o.id.into(),
            did: o.did,
            name: o.name,
        })
        .collect())
}

pub async fn self_organization(ctx: &ApiContext) -> Result<Organization, ApiError> {
    let status = ctx.network.get_status().await.map_err(upstream)?;
    Ok(Organization {
        id: status.org.id.into(),
        did: status.org.did,
        name: status.org.name,
    })
}

pub async fn list_verifiers(ctx: &ApiContext) -> Result<Vec<Verifier>, ApiError> {
    let orgs = ctx.network.get_organizations().await.map_err(upstream)?;
    let verifiers = ctx
        .network
        .get_verifiers(SYSTEM_NAMESPACE)
        .await
        .map_err(upstream)?;

    let did_by_org: HashMap<&str, &str> = orgs
        .iter()
        .map(|o| (o.id.as_str(), o.did.as_str()))
        .collect();
    Ok(verifiers
        .into_iter()
        .filter_map(|v| {
            let did = did_by_org.get(v.identity.as_str())?;
            Some(Verifier {
                did: did.to_string(),
                verifier_type: v.verifier_type,
                value: v.value,
            })
        })
        .collect())
}

pub async fn create_datatype(
    ctx: &ApiContext,
    input: DatatypeInput,
) -> Result<AsyncResponse, ApiError> {
    require("name", &input.name)?;
    require("version", &input.version)?;
    let datatype = ctx
        .network
        .create_datatype(CreateDatatype {
            name: input.name,
            version: input.version,
            value: input.schema,
        })
        .await
        .map_err(upstream)?;
    info!(id = %datatype.id, name = %datatype.name, version = %datatype.version, "datatype submitted");
    Ok(AsyncResponse::new(AsyncKind::Datatype, datatype.id))
}

pub async fn list_datatypes(ctx: &ApiContext) -> Result<Vec<Datatype>, ApiError> {
    let datatypes = ctx.network.get_datatypes().await.map_err(upstream)?;
    Ok(datatypes.into_iter().map(to_datatype).collect())
}

pub async fn get_datatype(
    ctx: &ApiContext,
    name: &str,
    version: &str,
) -> Result<Datatype, ApiError> {
    let datatype = ctx
        .network
        .get_datatype(name, version)
        .await
        .map_err(upstream)?;
    Ok(to_datatype(datatype))
}

pub async fn list_token_pools(ctx: &ApiContext) -> Result<Vec<TokenPool>, ApiError> {
    let pools = ctx.network.get_token_pools().await.map_err(upstream)?;
    Ok(pools.into_iter().map(to_token_pool).collect())
}

pub async fn get_token_pool(ctx: &ApiContext, name_or_id: &str) -> Result<TokenPool, ApiError> {
    let pool = ctx
        .network
        .get_token_pool(name_or_id)
        .await
        .map_err(upstream)?;
    Ok(to_token_pool(pool))
}

pub async fn create_token_pool(
    ctx: &ApiContext,
    input: TokenPoolInput,
) -> Result<AsyncResponse, ApiError> {
    require("name", &input.name)?;
    let pool = ctx
        .network
        .create_token_pool(CreateTokenPool {
            name: input.name,
            symbol: input.symbol,
            pool_type: input.pool_type,
            config: input
                .config
                .unwrap_or_else(|| Value::Object(Default::default())),
        })
        .await
        .map_err(upstream)?;
    info!(id = %pool.id, "token pool submitted");
    Ok(AsyncResponse::new(AsyncKind::TokenPool, pool.id))
}

pub async fn mint_tokens(
    ctx: &ApiContext,
    input: TokenMintBurn,
) -> Result<AsyncResponse, ApiError> {
    validate_mint_burn(&input)?;
    let transfer = ctx
        .network
        .mint_tokens(mint_burn_request(input, None))
        .await
        .map_err(upstream)?;
    Ok(transfer_accepted(TokenOperation::Mint, transfer.local_id))
}

pub async fn burn_tokens(
    ctx: &ApiContext,
    input: TokenMintBurn,
) -> Result<AsyncResponse, ApiError> {
    validate_mint_burn(&input)?;
    let transfer = ctx
        .network
        .burn_tokens(mint_burn_request(input, None))
        .await
        .map_err(upstream)?;
    Ok(transfer_accepted(TokenOperation::Burn, transfer.local_id))
}

pub async fn transfer_tokens(
    ctx: &ApiContext,
    input: TokenTransferInput,
) -> Result<AsyncResponse, ApiError> {
    require("pool", &input.pool)?;
    require("amount", &input.amount)?;
    require("to", &input.to)?;
    let transfer = ctx
        .network
        .transfer_tokens(TransferRequest {
            pool: input.pool,
            amount: input.amount,
            to: input.to,
            token_index: input.token_index,
            message: None,
        })
        .await
        .map_err(upstream)?;
    Ok(transfer_accepted(TokenOperation::Transfer, transfer.local_id))
}

pub async fn token_balances(
    ctx: &ApiContext,
    query: BalanceQuery,
) -> Result<Vec<Balance>, ApiError> {
    let balances = ctx
        .network
        .get_token_balances(BalanceFilter {
            pool: query.pool,
            key: query.key,
            balance: Some(
                query
                    .balance
                    .unwrap_or_else(|| DEFAULT_BALANCE_FILTER.to_string()),
            ),
        })
        .await
        .map_err(upstream)?;

    let mut pools: HashMap<String, TokenPool> = HashMap::new();
    let mut result = Vec::with_capacity(balances.len());
    for balance in balances {
        let pool = match pools.get(&balance.pool) {
            Some(pool) => pool.clone(),
            None => {
                let pool = get_token_pool(ctx, &balance.pool).await?;
                pools.insert(balance.pool.clone(), pool.clone());
                pool
            }
        };
        result.push(Balance {
            key: balance.key,
            balance: balance.balance,
            pool,
            token_index: balance.token_index,
        });
    }
    Ok(result)
}

pub async fn broadcast_message(
    ctx: &ApiContext,
    input: BroadcastValue,
) -> Result<AsyncResponse, ApiError> {
    let message = MessageInput {
        header: message_header(input.tag.as_deref(), input.topic.as_deref()),
        group: None,
        data: message_data(&input)?,
    };
    let sent = ctx.network.send_broadcast(message).await.map_err(upstream)?;
    message_accepted(sent.header)
}

pub async fn private_message(
    ctx: &ApiContext,
    input: PrivateValue,
) -> Result<AsyncResponse, ApiError> {
    let group = recipients_group(&input.recipients)?;
    let message = MessageInput {
        header: message_header(input.message.tag.as_deref(), input.message.topic.as_deref()),
        group: Some(group),
        data: message_data(&input.message)?,
    };
    let sent = ctx.network.send_private(message).await.map_err(upstream)?;
    message_accepted(sent.header)
}

pub async fn broadcast_blob(
    ctx: &ApiContext,
    input: BlobMessage,
) -> Result<AsyncResponse, ApiError> {
    let data_id = upload(ctx, input.file).await?;
    let message = MessageInput {
        header: message_header(input.tag.as_deref(), input.topic.as_deref()),
        group: None,
        data: vec![data_reference(data_id)],
    };
    let sent = ctx.network.send_broadcast(message).await.map_err(upstream)?;
    message_accepted(sent.header)
}

pub async fn private_blob(
    ctx: &ApiContext,
    input: BlobMessage,
) -> Result<AsyncResponse, ApiError> {
    let group = recipients_group(&input.recipients)?;
    let data_id = upload(ctx, input.file).await?;
    let message = MessageInput {
        header: message_header(input.tag.as_deref(), input.topic.as_deref()),
        group: Some(group),
        data: vec![data_reference(data_id)],
    };
    let sent = ctx.network.send_private(message).await.map_err(upstream)?;
    message_accepted(sent.header)
}

/// Uploads the file and submits the token operation with the file attached
/// as its message.
pub async fn token_operation_blob(
    ctx: &ApiContext,
    operation: TokenOperation,
    input: BlobTokenOperation,
) -> Result<AsyncResponse, ApiError> {
    require("pool", &input.pool)?;
    require("amount", &input.amount)?;
    let to = match operation {
        TokenOperation::Transfer => {
            let to = input.to.unwrap_or_default();
            require("to", &to)?;
            Some(to)
        }
        TokenOperation::Mint | TokenOperation::Burn => None,
    };

    let data_id = upload(ctx, input.file).await?;
    let message = MessageInput {
        header: message_header(input.tag.as_deref(), input.topic.as_deref()),
        group: None,
        data: vec![data_reference(data_id)],
    };
    let mint_burn = TokenMintBurn {
        pool: input.pool,
        amount: input.amount,
        token_index: input.token_index.filter(|index| !index.is_empty()),
    };

    let transfer = match (operation, to) {
        (TokenOperation::Transfer, Some(to)) => ctx
            .network
            .transfer_tokens(TransferRequest {
                pool: mint_burn.pool,
                amount: mint_burn.amount,
                to,
                token_index: mint_burn.token_index,
                message: Some(message),
            })
            .await
            .map_err(upstream)?,
        (TokenOperation::Burn, _) => ctx
            .network
            .burn_tokens(mint_burn_request(mint_burn, Some(message)))
            .await
            .map_err(upstream)?,
        _ => ctx
            .network
            .mint_tokens(mint_burn_request(mint_burn, Some(message)))
            .await
            .map_err(upstream)?,
    };
    Ok(transfer_accepted(operation, transfer.local_id))
}

fn to_datatype(datatype: NetworkDatatype) -> Datatype {
    Datatype {
        id: datatype.id,
        name: datatype.name,
        version: datatype.version,
        schema: schema_string(datatype.value),
    }
}

/// Schemas may come back from the node already serialized.
fn schema_string(value: Value) -> String {
    match value {
        Value::String(raw) => raw,
        other => other.to_string(),
    }
}

fn to_token_pool(pool: NetworkTokenPool) -> TokenPool {
    TokenPool {
        id: pool.id,
        name: pool.name,
        symbol: pool.symbol,
        pool_type: pool.pool_type,
        standard: pool.standard,
        decimals: pool.decimals,
        connector: pool.connector,
        state: pool.state,
        created: pool.created,
    }
}

fn validate_mint_burn(input: &TokenMintBurn) -> Result<(), ApiError> {
    require("pool", &input.pool)?;
    require("amount", &input.amount)
}

fn mint_burn_request(input: TokenMintBurn, message: Option<MessageInput>) -> MintBurnRequest {
    MintBurnRequest {
        pool: input.pool,
        amount: input.amount,
        token_index: input.token_index,
        message,
    }
}

fn transfer_accepted(operation: TokenOperation, local_id: String) -> AsyncResponse {
    info!(?operation, %local_id, "token transfer submitted");
    AsyncResponse::new(AsyncKind::TokenTransfer, local_id)
}

fn message_accepted(header: MessageHeader) -> Result<AsyncResponse, ApiError> {
    let id = header
        .id
        .ok_or_else(|| ApiError::new(ErrorCode::Upstream, "node accepted message without an id"))?;
    info!(%id, "message submitted");
    Ok(AsyncResponse::new(AsyncKind::Message, id))
}

fn message_header(tag: Option<&str>, topic: Option<&str>) -> MessageHeader {
    MessageHeader {
        id: None,
        tag: non_empty(tag),
        topics: non_empty(topic).map(|topic| vec![topic]),
    }
}

fn message_data(input: &BroadcastValue) -> Result<Vec<DataInput>, ApiError> {
    if let Some(json_value) = &input.json_value {
        let datatype = match (
            non_empty(input.datatypename.as_deref()),
            non_empty(input.datatypeversion.as_deref()),
        ) {
            (Some(name), Some(version)) => Some(DatatypeRef { name, version }),
            _ => None,
        };
        return Ok(vec![DataInput {
            value: Some(json_value.clone()),
            validator: datatype.as_ref().map(|_| "json".to_string()),
            datatype,
            ..DataInput::default()
        }]);
    }
    match non_empty(input.value.as_deref()) {
        Some(value) => Ok(vec![DataInput {
            value: Some(Value::String(value)),
            ..DataInput::default()
        }]),
        None => Err(ApiError::validation("value or jsonValue is required")),
    }
}

fn recipients_group(recipients: &[String]) -> Result<GroupInput, ApiError> {
    let members: Vec<GroupMember> = recipients
        .iter()
        .filter(|r| !r.trim().is_empty())
        .map(|r| GroupMember {
            identity: r.trim().to_string(),
        })
        .collect();
    if members.is_empty() {
        return Err(ApiError::validation("at least one recipient is required"));
    }
    Ok(GroupInput { members })
}

fn data_reference(id: String) -> DataInput {
    DataInput {
        id: Some(id),
        ..DataInput::default()
    }
}

async fn upload(ctx: &ApiContext, file: BlobFile) -> Result<String, ApiError> {
    if file.bytes.is_empty() {
        return Err(ApiError::validation("file cannot be empty"));
    }
    let data = ctx
        .network
        .upload_blob(BlobUpload {
            filename: file.filename,
            content_type: file.content_type,
            bytes: file.bytes,
        })
        .await
        .map_err(upstream)?;
    Ok(data.id)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn upstream(err: NetworkError) -> ApiError {
    match err {
        NetworkError::Upstream { status, message } => ApiError::upstream(status, message),
        NetworkError::Transport(_) | NetworkError::EventStream(_) => {
            ApiError::new(ErrorCode::Unavailable, err.to_string())
        }
        NetworkError::Endpoint(_) | NetworkError::Decode(_) => {
            ApiError::new(ErrorCode::Internal, err.to_string())
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
