use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AsyncKind, CorrelationId, TokenPoolType};

/// Body of every `202 Accepted` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncResponse {
    #[serde(rename = "type")]
    pub kind: AsyncKind,
    pub id: CorrelationId,
}

impl AsyncResponse {
    pub fn new(kind: AsyncKind, id: impl Into<CorrelationId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatatypeInput {
    pub name: String,
    pub version: String,
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPoolInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(rename = "type")]
    pub pool_type: TokenPoolType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMintBurn {
    pub pool: String,
    pub amount: String,
    #[serde(rename = "tokenIndex", default, skip_serializing_if = "Option::is_none")]
    pub token_index: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransferInput {
    pub pool: String,
    pub amount: String,
    pub to: String,
    #[serde(rename = "tokenIndex", default, skip_serializing_if = "Option::is_none")]
    pub token_index: Option<String>,
}

/// Broadcast message request. Either `value` (plain text) or `jsonValue`
/// (optionally bound to a datatype) carries the content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BroadcastValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "jsonValue", default, skip_serializing_if = "Option::is_none")]
    pub json_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatypename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatypeversion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrivateValue {
    #[serde(flatten)]
    pub message: BroadcastValue,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRef {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<String>,
}

/// Event emitted by the network node and relayed to clients over `/api/ws`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResolution {
    Confirmed,
    Rejected,
}

impl NetworkEvent {
    /// Ids this event can be correlated with: the referenced object and,
    /// for operation events, the correlator of the originating request.
    pub fn correlation_ids(&self) -> impl Iterator<Item = &str> {
        self.reference
            .as_deref()
            .into_iter()
            .chain(self.correlator.as_deref())
    }

    /// Whether this event settles the operation it references.
    pub fn resolution(&self) -> Option<EventResolution> {
        let event_type = self.event_type.as_str();
        if event_type.ends_with("_confirmed") {
            Some(EventResolution::Confirmed)
        } else if event_type.ends_with("_rejected") || event_type.ends_with("_failed") {
            Some(EventResolution::Rejected)
        } else {
            None
        }
    }
}
