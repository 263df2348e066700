//! Facade over the network node's REST and websocket API.
//!
//! Controllers depend on the [`NetworkClient`] trait only; [`FireFlyClient`]
//! is the HTTP implementation used by the server binary.

use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::protocol::NetworkEvent;

pub mod error;
mod firefly;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use error::NetworkError;
pub use firefly::FireFlyClient;
pub use types::*;

pub type NetworkResult<T> = Result<T, NetworkError>;
pub type EventStream = BoxStream<'static, NetworkResult<NetworkEvent>>;

#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn get_organizations(&self) -> NetworkResult<Vec<NetworkOrganization>>;
    async fn get_status(&self) -> NetworkResult<NodeStatus>;
    async fn get_verifiers(&self, namespace: &str) -> NetworkResult<Vec<NetworkVerifier>>;

    async fn create_datatype(&self, request: CreateDatatype) -> NetworkResult<NetworkDatatype>;
    async fn get_datatypes(&self) -> NetworkResult<Vec<NetworkDatatype>>;
    async fn get_datatype(&self, name: &str, version: &str) -> NetworkResult<NetworkDatatype>;

    async fn get_token_pools(&self) -> NetworkResult<Vec<NetworkTokenPool>>;
    async fn get_token_pool(&self, name_or_id: &str) -> NetworkResult<NetworkTokenPool>;
    async fn create_token_pool(&self, request: CreateTokenPool)
        -> NetworkResult<NetworkTokenPool>;
    async fn mint_tokens(&self, request: MintBurnRequest) -> NetworkResult<NetworkTransfer>;
    async fn burn_tokens(&self, request: MintBurnRequest) -> NetworkResult<NetworkTransfer>;
    async fn transfer_tokens(&self, request: TransferRequest) -> NetworkResult<NetworkTransfer>;
    async fn get_token_balances(&self, filter: BalanceFilter)
        -> NetworkResult<Vec<NetworkBalance>>;

    async fn send_broadcast(&self, message: MessageInput) -> NetworkResult<NetworkMessage>;
    async fn send_private(&self, message: MessageInput) -> NetworkResult<NetworkMessage>;
    async fn upload_blob(&self, upload: BlobUpload) -> NetworkResult<NetworkData>;

    /// Opens a live feed of node events for the configured namespace.
    async fn subscribe_events(&self) -> NetworkResult<EventStream>;
}
