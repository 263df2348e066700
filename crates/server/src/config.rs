use std::{collections::HashMap, fs};

use anyhow::{bail, Context};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub firefly_endpoint: String,
    pub firefly_namespace: String,
    pub event_buffer: usize,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3001".into(),
            firefly_endpoint: "http://localhost:5000".into(),
            firefly_namespace: "default".into(),
            event_buffer: 256,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    let text = |key: &str| {
        file_cfg.get(key).map(|value| match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    };

    if let Some(v) = text("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = text("firefly_endpoint") {
        settings.firefly_endpoint = v;
    }
    if let Some(v) = text("firefly_namespace") {
        settings.firefly_namespace = v;
    }
    if let Some(v) = text("event_buffer").and_then(|v| v.parse().ok()) {
        settings.event_buffer = v;
    }
    if let Some(v) = text("max_upload_bytes").and_then(|v| v.parse().ok()) {
        settings.max_upload_bytes = v;
    }
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = lookup("FIREFLY_ENDPOINT") {
        settings.firefly_endpoint = v;
    }
    if let Some(v) = lookup("APP__FIREFLY_ENDPOINT") {
        settings.firefly_endpoint = v;
    }

    if let Some(v) = lookup("FIREFLY_NAMESPACE") {
        settings.firefly_namespace = v;
    }
    if let Some(v) = lookup("APP__FIREFLY_NAMESPACE") {
        settings.firefly_namespace = v;
    }

    if let Some(v) = lookup("APP__EVENT_BUFFER") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.event_buffer = parsed;
        }
    }
    if let Some(v) = lookup("APP__MAX_UPLOAD_BYTES") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.max_upload_bytes = parsed;
        }
    }
}

/// Normalizes the node endpoint to an `http(s)` base url without a trailing slash.
pub fn prepare_firefly_endpoint(raw_endpoint: &str) -> anyhow::Result<String> {
    let raw_endpoint = raw_endpoint.trim().trim_end_matches('/');
    if raw_endpoint.is_empty() {
        return Ok(Settings::default().firefly_endpoint);
    }

    let endpoint = if raw_endpoint.contains("://") {
        raw_endpoint.to_string()
    } else {
        format!("http://{raw_endpoint}")
    };

    let parsed = Url::parse(&endpoint)
        .with_context(|| format!("invalid network endpoint '{raw_endpoint}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!(
            "network endpoint '{raw_endpoint}' must use http or https, not {}",
            parsed.scheme()
        );
    }

    Ok(endpoint)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
