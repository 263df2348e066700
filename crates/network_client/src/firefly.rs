use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use reqwest::{multipart, Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::protocol::NetworkEvent;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};
use url::Url;

use crate::{
    error::upstream_error, BalanceFilter, BlobUpload, CreateDatatype, CreateTokenPool,
    EventStream, MessageInput, MintBurnRequest, NetworkBalance, NetworkClient, NetworkData,
    NetworkDatatype, NetworkError, NetworkMessage, NetworkOrganization, NetworkResult,
    NetworkTokenPool, NetworkTransfer, NetworkVerifier, NodeStatus, TransferRequest,
};

/// HTTP client for a FireFly-style node rooted at `endpoint`.
#[derive(Clone)]
pub struct FireFlyClient {
    http: Client,
    endpoint: Url,
    namespace: String,
}

#[derive(Serialize)]
struct StartListening<'a> {
    #[serde(rename = "type")]
    command: &'static str,
    namespace: &'a str,
    autoack: bool,
    ephemeral: bool,
}

impl FireFlyClient {
    pub fn new(endpoint: &str, namespace: impl Into<String>) -> NetworkResult<Self> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(NetworkError::Endpoint(format!(
                "{endpoint} cannot be used as a base url"
            )));
        }
        Ok(Self {
            http: Client::new(),
            endpoint,
            namespace: namespace.into(),
        })
    }

    fn namespaced_url(&self, namespace: &str, segments: &[&str]) -> NetworkResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| NetworkError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["api", "v1", "namespaces", namespace])
            .extend(segments);
        Ok(url)
    }

    fn url(&self, segments: &[&str]) -> NetworkResult<Url> {
        self.namespaced_url(&self.namespace, segments)
    }

    fn websocket_url(&self) -> NetworkResult<Url> {
        let mut url = self.endpoint.clone();
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(NetworkError::Endpoint(format!(
                    "unsupported scheme for event stream: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| NetworkError::Endpoint(self.endpoint.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| NetworkError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .push("ws");
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> NetworkResult<T> {
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        decode(response).await
    }

    async fn post<B, T>(&self, url: Url, body: &B) -> NetworkResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> NetworkResult<T> {
    if !response.status().is_success() {
        return Err(upstream_error(response).await);
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| NetworkError::Decode(err.to_string()))
}

#[async_trait]
impl NetworkClient for FireFlyClient {
    async fn get_organizations(&self) -> NetworkResult<Vec<NetworkOrganization>> {
        self.get(self.url(&["network", "organizations"])?).await
    }

    async fn get_status(&self) -> NetworkResult<NodeStatus> {
        self.get(self.url(&["status"])?).await
    }

    async fn get_verifiers(&self, namespace: &str) -> NetworkResult<Vec<NetworkVerifier>> {
        self.get(self.namespaced_url(namespace, &["verifiers"])?)
            .await
    }

    async fn create_datatype(&self, request: CreateDatatype) -> NetworkResult<NetworkDatatype> {
        self.post(self.url(&["datatypes"])?, &request).await
    }

    async fn get_datatypes(&self) -> NetworkResult<Vec<NetworkDatatype>> {
        self.get(self.url(&["datatypes"])?).await
    }

    async fn get_datatype(&self, name: &str, version: &str) -> NetworkResult<NetworkDatatype> {
        self.get(self.url(&["datatypes", name, version])?).await
    }

    async fn get_token_pools(&self) -> NetworkResult<Vec<NetworkTokenPool>> {
        self.get(self.url(&["tokens", "pools"])?).await
    }

    async fn get_token_pool(&self, name_or_id: &str) -> NetworkResult<NetworkTokenPool> {
        self.get(self.url(&["tokens", "pools", name_or_id])?).await
    }

    async fn create_token_pool(
        &self,
        request: CreateTokenPool,
    ) -> NetworkResult<NetworkTokenPool> {
        self.post(self.url(&["tokens", "pools"])?, &request).await
    }

    async fn mint_tokens(&self, request: MintBurnRequest) -> NetworkResult<NetworkTransfer> {
        self.post(self.url(&["tokens", "mint"])?, &request).await
    }

    async fn burn_tokens(&self, request: MintBurnRequest) -> NetworkResult<NetworkTransfer> {
        self.post(self.url(&["tokens", "burn"])?, &request).await
    }

    async fn transfer_tokens(&self, request: TransferRequest) -> NetworkResult<NetworkTransfer> {
        self.post(self.url(&["tokens", "transfers"])?, &request)
            .await
    }

    async fn get_token_balances(
        &self,
        filter: BalanceFilter,
    ) -> NetworkResult<Vec<NetworkBalance>> {
        let url = self.url(&["tokens", "balances"])?;
        debug!(%url, ?filter, "GET");
        let response = self.http.get(url).query(&filter).send().await?;
        decode(response).await
    }

    async fn send_broadcast(&self, message: MessageInput) -> NetworkResult<NetworkMessage> {
        self.post(self.url(&["messages", "broadcast"])?, &message)
            .await
    }

    async fn send_private(&self, message: MessageInput) -> NetworkResult<NetworkMessage> {
        self.post(self.url(&["messages", "private"])?, &message)
            .await
    }

    async fn upload_blob(&self, upload: BlobUpload) -> NetworkResult<NetworkData> {
        let url = self.url(&["data"])?;
        debug!(%url, filename = %upload.filename, size = upload.bytes.len(), "POST blob");
        let mut part = multipart::Part::bytes(upload.bytes).file_name(upload.filename);
        if let Some(content_type) = upload.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }
        let form = multipart::Form::new()
            .text("autometa", "true")
            .part("file", part);
        let response = self.http.post(url).multipart(form).send().await?;
        decode(response).await
    }

    async fn subscribe_events(&self) -> NetworkResult<EventStream> {
        let url = self.websocket_url()?;
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|err| NetworkError::EventStream(format!("connect {url}: {err}")))?;
        let (mut writer, reader) = socket.split();

        let start = serde_json::to_string(&StartListening {
            command: "start",
            namespace: &self.namespace,
            autoack: true,
            ephemeral: true,
        })
        .map_err(|err| NetworkError::Decode(err.to_string()))?;
        writer
            .send(Message::Text(start))
            .await
            .map_err(|err| NetworkError::EventStream(err.to_string()))?;
        info!(%url, namespace = %self.namespace, "listening for network events");

        let events = reader
            .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(
                        serde_json::from_str::<NetworkEvent>(&text)
                            .map_err(|err| NetworkError::Decode(format!("invalid event: {err}"))),
                    ),
                    Ok(_) => None,
                    Err(err) => Some(Err(NetworkError::EventStream(err.to_string()))),
                }
            });
        Ok(events.boxed())
    }
}

#[cfg(test)]
#[path = "tests/firefly_tests.rs"]
mod tests;
