//! In-memory [`NetworkClient`] that records every call, for controller and
//! route tests.

use async_trait::async_trait;
use futures::StreamExt;
use shared::protocol::{NetworkEvent, TxRef};
use tokio::sync::{broadcast, Mutex};

use crate::{
    BalanceFilter, BlobUpload, CreateDatatype, CreateTokenPool, EventStream, MessageHeader,
    MessageInput, MintBurnRequest, NetworkBalance, NetworkClient, NetworkData, NetworkDatatype,
    NetworkError, NetworkMessage, NetworkOrganization, NetworkResult, NetworkTokenPool,
    NetworkTransfer, NetworkVerifier, NodeStatus, StatusOrg, TransferRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    GetOrganizations,
    GetStatus,
    GetVerifiers(String),
    CreateDatatype(CreateDatatype),
    GetDatatypes,
    GetDatatype { name: String, version: String },
    GetTokenPools,
    GetTokenPool(String),
    CreateTokenPool(CreateTokenPool),
    MintTokens(MintBurnRequest),
    BurnTokens(MintBurnRequest),
    TransferTokens(TransferRequest),
    GetTokenBalances(BalanceFilter),
    SendBroadcast(MessageInput),
    SendPrivate(MessageInput),
    UploadBlob { filename: String, size: usize },
    SubscribeEvents,
}

#[derive(Default)]
struct MockState {
    organizations: Vec<NetworkOrganization>,
    status: Option<NodeStatus>,
    verifiers: Vec<NetworkVerifier>,
    datatypes: Vec<NetworkDatatype>,
    token_pools: Vec<NetworkTokenPool>,
    balances: Vec<NetworkBalance>,
    transfer_id: String,
    message_id: String,
    fail_with: Option<(u16, String)>,
}

pub struct RecordingNetworkClient {
    state: Mutex<MockState>,
    calls: Mutex<Vec<RecordedCall>>,
    events: broadcast::Sender<Result<NetworkEvent, String>>,
}

impl Default for RecordingNetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingNetworkClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MockState {
                transfer_id: "transfer1".into(),
                message_id: "message1".into(),
                ..MockState::default()
            }),
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn with_organizations(mut self, organizations: Vec<NetworkOrganization>) -> Self {
        self.state.get_mut().organizations = organizations;
        self
    }

    pub fn with_self_org(mut self, org: &NetworkOrganization) -> Self {
        self.state.get_mut().status = Some(NodeStatus {
            org: StatusOrg {
                id: org.id.clone(),
                did: org.did.clone(),
                name: org.name.clone(),
                registered: true,
            },
            node: None,
        });
        self
    }

    pub fn with_verifiers(mut self, verifiers: Vec<NetworkVerifier>) -> Self {
        self.state.get_mut().verifiers = verifiers;
        self
    }

    pub fn with_datatypes(mut self, datatypes: Vec<NetworkDatatype>) -> Self {
        self.state.get_mut().datatypes = datatypes;
        self
    }

    pub fn with_token_pools(mut self, token_pools: Vec<NetworkTokenPool>) -> Self {
        self.state.get_mut().token_pools = token_pools;
        self
    }

    pub fn with_balances(mut self, balances: Vec<NetworkBalance>) -> Self {
        self.state.get_mut().balances = balances;
        self
    }

    pub fn with_transfer_id(mut self, local_id: impl Into<String>) -> Self {
        self.state.get_mut().transfer_id = local_id.into();
        self
    }

    /// Every subsequent call fails with this node status and message.
    pub fn failing(mut self, status: u16, message: impl Into<String>) -> Self {
        self.state.get_mut().fail_with = Some((status, message.into()));
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Pushes an event to every open subscription.
    pub fn emit(&self, event: NetworkEvent) -> usize {
        self.events.send(Ok(event)).unwrap_or(0)
    }

    /// Pushes a frame that subscribers receive as [`NetworkError::Decode`].
    pub fn emit_undecodable(&self, frame: &str) -> usize {
        self.events.send(Err(frame.to_string())).unwrap_or(0)
    }

    async fn record(
        &self,
        call: RecordedCall,
    ) -> NetworkResult<tokio::sync::MutexGuard<'_, MockState>> {
        self.calls.lock().await.push(call);
        let state = self.state.lock().await;
        if let Some((status, message)) = &state.fail_with {
            return Err(NetworkError::Upstream {
                status: *status,
                message: message.clone(),
            });
        }
        Ok(state)
    }
}

fn not_found(what: &str) -> NetworkError {
    NetworkError::Upstream {
        status: 404,
        message: format!("{what} not found"),
    }
}

fn tx() -> Option<TxRef> {
    Some(TxRef {
        id: "tx1".into(),
        tx_type: None,
    })
}

#[async_trait]
impl NetworkClient for RecordingNetworkClient {
    async fn get_organizations(&self) -> NetworkResult<Vec<NetworkOrganization>> {
        let state = self.record(RecordedCall::GetOrganizations).await?;
        Ok(state.organizations.clone())
    }

    async fn get_status(&self) -> NetworkResult<NodeStatus> {
        let state = self.record(RecordedCall::GetStatus).await?;
        state.status.clone().ok_or_else(|| NetworkError::Upstream {
            status: 500,
            message: "local organization is not registered".into(),
        })
    }

    async fn get_verifiers(&self, namespace: &str) -> NetworkResult<Vec<NetworkVerifier>> {
        let state = self
            .record(RecordedCall::GetVerifiers(namespace.to_string()))
            .await?;
        Ok(state.verifiers.clone())
    }

    async fn create_datatype(&self, request: CreateDatatype) -> NetworkResult<NetworkDatatype> {
        let mut state = self
            .record(RecordedCall::CreateDatatype(request.clone()))
            .await?;
        let datatype = NetworkDatatype {
            id: format!("datatype{}", state.datatypes.len() + 1),
            name: request.name,
            version: request.version,
            value: request.value,
            validator: Some("json".into()),
            hash: None,
            created: None,
        };
        state.datatypes.push(datatype.clone());
        Ok(datatype)
    }

    async fn get_datatypes(&self) -> NetworkResult<Vec<NetworkDatatype>> {
        let state = self.record(RecordedCall::GetDatatypes).await?;
        Ok(state.datatypes.clone())
    }

    async fn get_datatype(&self, name: &str, version: &str) -> NetworkResult<NetworkDatatype> {
        let state = self
            .record(RecordedCall::GetDatatype {
                name: name.to_string(),
                version: version.to_string(),
            })
            .await?;
        state
            .datatypes
            .iter()
            .find(|d| d.name == name && d.version == version)
            .cloned()
            .ok_or_else(|| not_found("datatype"))
    }

    async fn get_token_pools(&self) -> NetworkResult<Vec<NetworkTokenPool>> {
        let state = self.record(RecordedCall::GetTokenPools).await?;
        Ok(state.token_pools.clone())
    }

    async fn get_token_pool(&self, name_or_id: &str) -> NetworkResult<NetworkTokenPool> {
        let state = self
            .record(RecordedCall::GetTokenPool(name_or_id.to_string()))
            .await?;
        state
            .token_pools
            .iter()
            .find(|p| p.id == name_or_id || p.name.as_deref() == Some(name_or_id))
            .cloned()
            .ok_or_else(|| not_found("token pool"))
    }

    async fn create_token_pool(
        &self,
        request: CreateTokenPool,
    ) -> NetworkResult<NetworkTokenPool> {
        let mut state = self
            .record(RecordedCall::CreateTokenPool(request.clone()))
            .await?;
        let pool = NetworkTokenPool {
            id: format!("pool{}", state.token_pools.len() + 1),
            name: Some(request.name),
            symbol: request.symbol,
            pool_type: Some(request.pool_type),
            tx: tx(),
            ..NetworkTokenPool::default()
        };
        state.token_pools.push(pool.clone());
        Ok(pool)
    }

    async fn mint_tokens(&self, request: MintBurnRequest) -> NetworkResult<NetworkTransfer> {
        let state = self.record(RecordedCall::MintTokens(request)).await?;
        Ok(transfer(&state.transfer_id))
    }

    async fn burn_tokens(&self, request: MintBurnRequest) -> NetworkResult<NetworkTransfer> {
        let state = self.record(RecordedCall::BurnTokens(request)).await?;
        Ok(transfer(&state.transfer_id))
    }

    async fn transfer_tokens(&self, request: TransferRequest) -> NetworkResult<NetworkTransfer> {
        let state = self.record(RecordedCall::TransferTokens(request)).await?;
        Ok(transfer(&state.transfer_id))
    }

    async fn get_token_balances(
        &self,
        filter: BalanceFilter,
    ) -> NetworkResult<Vec<NetworkBalance>> {
        let state = self.record(RecordedCall::GetTokenBalances(filter)).await?;
        Ok(state.balances.clone())
    }

    async fn send_broadcast(&self, message: MessageInput) -> NetworkResult<NetworkMessage> {
        let state = self.record(RecordedCall::SendBroadcast(message.clone())).await?;
        Ok(accepted_message(&state.message_id, message))
    }

    async fn send_private(&self, message: MessageInput) -> NetworkResult<NetworkMessage> {
        let state = self.record(RecordedCall::SendPrivate(message.clone())).await?;
        Ok(accepted_message(&state.message_id, message))
    }

    async fn upload_blob(&self, upload: BlobUpload) -> NetworkResult<NetworkData> {
        self.record(RecordedCall::UploadBlob {
            filename: upload.filename,
            size: upload.bytes.len(),
        })
        .await?;
        Ok(NetworkData {
            id: "data1".into(),
            hash: None,
        })
    }

    async fn subscribe_events(&self) -> NetworkResult<EventStream> {
        drop(self.record(RecordedCall::SubscribeEvents).await?);
        let receiver = self.events.subscribe();
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(Ok(event)) => return Some((Ok(event), receiver)),
                    Ok(Err(frame)) => {
                        let error = NetworkError::Decode(format!("invalid event: {frame}"));
                        return Some((Err(error), receiver));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

fn transfer(local_id: &str) -> NetworkTransfer {
    NetworkTransfer {
        local_id: local_id.to_string(),
        pool: None,
        amount: None,
        from: None,
        to: None,
        tx: tx(),
    }
}

fn accepted_message(id: &str, message: MessageInput) -> NetworkMessage {
    NetworkMessage {
        header: MessageHeader {
            id: Some(id.to_string()),
            ..message.header
        },
        state: Some("staged".into()),
    }
}
