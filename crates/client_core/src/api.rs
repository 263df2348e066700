use anyhow::{anyhow, Result};
use reqwest::{
    multipart::{Form, Part},
    Client, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{Balance, Datatype, Organization, TokenPool, Verifier},
    protocol::BalanceQuery,
};
use url::Url;

use crate::forms::{BlobPayload, Payload};

/// Status and decoded body of a submission, whatever the status.
#[derive(Debug, Clone)]
pub struct PostResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// HTTP client for the sandbox server.
#[derive(Clone)]
pub struct SandboxApi {
    http: Client,
    server_url: String,
}

impl SandboxApi {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Server URL with `segments` appended, each percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("server_url cannot take a path: {}", self.server_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn organizations(&self, exclude_self: bool) -> Result<Vec<Organization>> {
        let orgs = self
            .http
            .get(self.url(&["api", "common", "organizations"])?)
            .query(&[("exclude_self", exclude_self)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(orgs)
    }

    pub async fn self_organization(&self) -> Result<Organization> {
        self.get_json(&["api", "common", "organizations", "self"])
            .await
    }

    pub async fn verifiers(&self) -> Result<Vec<Verifier>> {
        self.get_json(&["api", "common", "verifiers"]).await
    }

    pub async fn datatypes(&self) -> Result<Vec<Datatype>> {
        self.get_json(&["api", "datatypes"]).await
    }

    pub async fn datatype(&self, name: &str, version: &str) -> Result<Datatype> {
        self.get_json(&["api", "datatypes", name, version]).await
    }

    pub async fn token_pools(&self) -> Result<Vec<TokenPool>> {
        self.get_json(&["api", "tokens", "pools"]).await
    }

    pub async fn balances(&self, query: &BalanceQuery) -> Result<Vec<Balance>> {
        let balances = self
            .http
            .get(self.url(&["api", "tokens", "balances"])?)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(balances)
    }

    /// Posts a payload as JSON, or as multipart for blob payloads. Non-2xx
    /// statuses are returned, not raised.
    pub async fn post_payload(&self, payload: &Payload) -> reqwest::Result<PostResponse> {
        let url = format!("{}{}", self.server_url, payload.endpoint());
        let request = match payload {
            Payload::Blob { body, .. } => self.http.post(url).multipart(multipart_form(body)?),
            other => self
                .http
                .post(url)
                .json(&other.json_body().unwrap_or(Value::Null)),
        };
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        Ok(PostResponse { status, body })
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let value = self
            .http
            .get(self.url(segments)?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }
}

fn multipart_form(body: &BlobPayload) -> reqwest::Result<Form> {
    let mut part = Part::bytes(body.file.bytes.clone()).file_name(body.file.filename.clone());
    if let Some(content_type) = &body.file.content_type {
        part = part.mime_str(content_type)?;
    }
    let mut form = Form::new().part("file", part);
    for (name, value) in &body.fields {
        form = form.text(name.clone(), value.clone());
    }
    Ok(form)
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
