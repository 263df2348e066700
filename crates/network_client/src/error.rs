use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("network node returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("network node unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid network endpoint: {0}")]
    Endpoint(String),
    #[error("unexpected network response: {0}")]
    Decode(String),
    #[error("event stream failed: {0}")]
    EventStream(String),
}

/// Error body returned by the node, e.g. `{"error": "FF10109: ..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct NodeErrorBody {
    pub(crate) error: String,
}

impl From<url::ParseError> for NetworkError {
    fn from(value: url::ParseError) -> Self {
        Self::Endpoint(value.to_string())
    }
}

pub(crate) async fn upstream_error(response: reqwest::Response) -> NetworkError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<NodeErrorBody>(&body)
        .map(|parsed| parsed.error)
        .unwrap_or(body);
    NetworkError::Upstream { status, message }
}
