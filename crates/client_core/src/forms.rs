//! Form state for every operation the sandbox can submit.
//!
//! Each form owns its raw inputs and derives two things from them: the typed
//! [`Payload`] that would be posted right now, and the list of required
//! fields that are still empty. Only fields meaningful for the active form
//! reach the payload: the file only for blob submissions, tag and topic only
//! for messages or blob-attached token operations.

use std::path::Path;

use serde_json::Value;
use shared::{
    domain::TokenPoolType,
    protocol::{
        BroadcastValue, DatatypeInput, PrivateValue, TokenMintBurn, TokenPoolInput,
        TokenTransferInput,
    },
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    Broadcast,
    Private,
    DefineDatatype,
    CreatePool,
    Mint,
    Burn,
    Transfer,
}

impl FormKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            FormKind::Broadcast => "/api/messages/broadcast",
            FormKind::Private => "/api/messages/private",
            FormKind::DefineDatatype => "/api/datatypes",
            FormKind::CreatePool => "/api/tokens/pools",
            FormKind::Mint => "/api/tokens/mint",
            FormKind::Burn => "/api/tokens/burn",
            FormKind::Transfer => "/api/tokens/transfer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required fields: {}", .0.join(", "))]
pub struct MissingFields(pub Vec<&'static str>);

/// File chosen for a blob submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "blob".to_string());
        Ok(Self {
            filename,
            content_type: None,
            bytes,
        })
    }
}

/// Multipart body for a `*blob` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPayload {
    pub file: Attachment,
    pub fields: Vec<(String, String)>,
}

impl BlobPayload {
    fn new(file: Attachment) -> Self {
        Self {
            file,
            fields: Vec::new(),
        }
    }

    fn field(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.fields.push((name.to_string(), value.to_string()));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Broadcast(BroadcastValue),
    Private(PrivateValue),
    DefineDatatype(DatatypeInput),
    CreatePool(TokenPoolInput),
    Mint(TokenMintBurn),
    Burn(TokenMintBurn),
    Transfer(TokenTransferInput),
    Blob { kind: FormKind, body: BlobPayload },
}

impl Payload {
    pub fn kind(&self) -> FormKind {
        match self {
            Payload::Broadcast(_) => FormKind::Broadcast,
            Payload::Private(_) => FormKind::Private,
            Payload::DefineDatatype(_) => FormKind::DefineDatatype,
            Payload::CreatePool(_) => FormKind::CreatePool,
            Payload::Mint(_) => FormKind::Mint,
            Payload::Burn(_) => FormKind::Burn,
            Payload::Transfer(_) => FormKind::Transfer,
            Payload::Blob { kind, .. } => *kind,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            Payload::Blob { kind, .. } => format!("{}blob", kind.endpoint()),
            other => other.kind().endpoint().to_string(),
        }
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Payload::Blob { .. })
    }

    /// JSON body for non-blob payloads.
    pub fn json_body(&self) -> Option<Value> {
        let body = match self {
            Payload::Broadcast(v) => serde_json::to_value(v),
            Payload::Private(v) => serde_json::to_value(v),
            Payload::DefineDatatype(v) => serde_json::to_value(v),
            Payload::CreatePool(v) => serde_json::to_value(v),
            Payload::Mint(v) | Payload::Burn(v) => serde_json::to_value(v),
            Payload::Transfer(v) => serde_json::to_value(v),
            Payload::Blob { .. } => return None,
        };
        body.ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatatypeChoice {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Json {
        value: Value,
        datatype: Option<DatatypeChoice>,
    },
    File(Attachment),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

/// Broadcast and private messages share one form; recipients are only
/// required (and only sent) when the form is private.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageForm {
    pub private: bool,
    pub tag: String,
    pub topic: String,
    pub content: MessageContent,
    pub recipients: Vec<String>,
}

impl MessageForm {
    pub fn broadcast() -> Self {
        Self {
            private: false,
            tag: String::new(),
            topic: String::new(),
            content: MessageContent::default(),
            recipients: Vec::new(),
        }
    }

    pub fn private() -> Self {
        Self {
            private: true,
            ..Self::broadcast()
        }
    }

    pub fn kind(&self) -> FormKind {
        if self.private {
            FormKind::Private
        } else {
            FormKind::Broadcast
        }
    }

    pub fn toggle_recipient(&mut self, did: &str) {
        if let Some(pos) = self.recipients.iter().position(|r| r == did) {
            self.recipients.remove(pos);
        } else {
            self.recipients.push(did.to_string());
        }
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match &self.content {
            MessageContent::Text(text) if text.trim().is_empty() => missing.push("value"),
            MessageContent::Json { value, .. } if value.is_null() => missing.push("jsonValue"),
            MessageContent::File(file) if file.bytes.is_empty() => missing.push("file"),
            _ => {}
        }
        if self.private && self.recipients.is_empty() {
            missing.push("recipients");
        }
        missing
    }

    fn payload(&self) -> Payload {
        if let MessageContent::File(file) = &self.content {
            let mut body = BlobPayload::new(file.clone());
            body.field("tag", Some(&self.tag));
            body.field("topic", Some(&self.topic));
            if self.private {
                for recipient in &self.recipients {
                    body.field("recipients[]", Some(recipient));
                }
            }
            return Payload::Blob {
                kind: self.kind(),
                body,
            };
        }

        let mut value = BroadcastValue {
            tag: optional(&self.tag),
            topic: optional(&self.topic),
            ..BroadcastValue::default()
        };
        match &self.content {
            MessageContent::Text(text) => value.value = Some(text.clone()),
            MessageContent::Json { value: json, datatype } => {
                value.json_value = Some(json.clone());
                if let Some(datatype) = datatype {
                    value.datatypename = Some(datatype.name.clone());
                    value.datatypeversion = Some(datatype.version.clone());
                }
            }
            MessageContent::File(_) => {}
        }

        if self.private {
            Payload::Private(PrivateValue {
                message: value,
                recipients: self.recipients.clone(),
            })
        } else {
            Payload::Broadcast(value)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatatypeForm {
    pub name: String,
    pub version: String,
    pub schema: Value,
}

impl Default for DatatypeForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "1.0".into(),
            schema: Value::Null,
        }
    }
}

impl DatatypeForm {
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.version.trim().is_empty() {
            missing.push("version");
        }
        if self.schema.is_null() {
            missing.push("schema");
        }
        missing
    }

    fn payload(&self) -> Payload {
        Payload::DefineDatatype(DatatypeInput {
            name: self.name.trim().to_string(),
            version: self.version.trim().to_string(),
            schema: self.schema.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolForm {
    pub name: String,
    pub symbol: String,
    pub pool_type: TokenPoolType,
    pub config: Option<Value>,
}

impl Default for PoolForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            symbol: String::new(),
            pool_type: TokenPoolType::Fungible,
            config: None,
        }
    }
}

impl PoolForm {
    fn missing(&self) -> Vec<&'static str> {
        if self.name.trim().is_empty() {
            vec!["name"]
        } else {
            Vec::new()
        }
    }

    fn payload(&self) -> Payload {
        Payload::CreatePool(TokenPoolInput {
            name: self.name.trim().to_string(),
            symbol: optional(&self.symbol),
            pool_type: self.pool_type,
            config: self.config.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    Mint,
    Burn,
    Transfer,
}

/// Mint, burn and transfer. `to` is only read for transfers; `tag`, `topic`
/// and `attachment` only when a file is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenForm {
    pub action: TokenAction,
    pub pool: String,
    pub amount: String,
    pub token_index: String,
    pub to: String,
    pub tag: String,
    pub topic: String,
    pub attachment: Option<Attachment>,
}

impl TokenForm {
    pub fn new(action: TokenAction) -> Self {
        Self {
            action,
            pool: String::new(),
            amount: String::new(),
            token_index: String::new(),
            to: String::new(),
            tag: String::new(),
            topic: String::new(),
            attachment: None,
        }
    }

    pub fn kind(&self) -> FormKind {
        match self.action {
            TokenAction::Mint => FormKind::Mint,
            TokenAction::Burn => FormKind::Burn,
            TokenAction::Transfer => FormKind::Transfer,
        }
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.pool.trim().is_empty() {
            missing.push("pool");
        }
        if self.amount.trim().is_empty() {
            missing.push("amount");
        }
        if self.action == TokenAction::Transfer && self.to.trim().is_empty() {
            missing.push("to");
        }
        missing
    }

    fn payload(&self) -> Payload {
        let pool = self.pool.trim().to_string();
        let amount = self.amount.trim().to_string();
        let token_index = optional(&self.token_index);

        if let Some(file) = &self.attachment {
            let mut body = BlobPayload::new(file.clone());
            body.field("tag", Some(&self.tag));
            body.field("topic", Some(&self.topic));
            body.field("pool", Some(&pool));
            body.field("amount", Some(&amount));
            body.field("tokenIndex", token_index.as_deref());
            if self.action == TokenAction::Transfer {
                body.field("to", Some(&self.to));
            }
            return Payload::Blob {
                kind: self.kind(),
                body,
            };
        }

        match self.action {
            TokenAction::Mint => Payload::Mint(TokenMintBurn {
                pool,
                amount,
                token_index,
            }),
            TokenAction::Burn => Payload::Burn(TokenMintBurn {
                pool,
                amount,
                token_index,
            }),
            TokenAction::Transfer => Payload::Transfer(TokenTransferInput {
                pool,
                amount,
                to: self.to.trim().to_string(),
                token_index,
            }),
        }
    }
}

/// The form currently shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveForm {
    Message(MessageForm),
    Datatype(DatatypeForm),
    Pool(PoolForm),
    Token(TokenForm),
}

impl ActiveForm {
    /// Empty form for the given operation.
    pub fn blank(kind: FormKind) -> Self {
        match kind {
            FormKind::Broadcast => ActiveForm::Message(MessageForm::broadcast()),
            FormKind::Private => ActiveForm::Message(MessageForm::private()),
            FormKind::DefineDatatype => ActiveForm::Datatype(DatatypeForm::default()),
            FormKind::CreatePool => ActiveForm::Pool(PoolForm::default()),
            FormKind::Mint => ActiveForm::Token(TokenForm::new(TokenAction::Mint)),
            FormKind::Burn => ActiveForm::Token(TokenForm::new(TokenAction::Burn)),
            FormKind::Transfer => ActiveForm::Token(TokenForm::new(TokenAction::Transfer)),
        }
    }

    pub fn kind(&self) -> FormKind {
        match self {
            ActiveForm::Message(form) => form.kind(),
            ActiveForm::Datatype(_) => FormKind::DefineDatatype,
            ActiveForm::Pool(_) => FormKind::CreatePool,
            ActiveForm::Token(form) => form.kind(),
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        match self {
            ActiveForm::Message(form) => form.missing(),
            ActiveForm::Datatype(form) => form.missing(),
            ActiveForm::Pool(form) => form.missing(),
            ActiveForm::Token(form) => form.missing(),
        }
    }

    pub fn missing_required_fields(&self) -> bool {
        !self.missing_fields().is_empty()
    }

    pub fn payload(&self) -> Result<Payload, MissingFields> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(MissingFields(missing));
        }
        Ok(match self {
            ActiveForm::Message(form) => form.payload(),
            ActiveForm::Datatype(form) => form.payload(),
            ActiveForm::Pool(form) => form.payload(),
            ActiveForm::Token(form) => form.payload(),
        })
    }
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
#[path = "tests/forms_tests.rs"]
mod tests;
