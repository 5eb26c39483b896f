//! `vault_kv_secret_v2`: a secret in a KV version 2 mount.

use crate::diagnostics::Diagnostics;
use crate::interface::{ProviderContext, Resource};
use crate::provider::ProviderError;
use crate::resources::generic_secret::{flatten_data, parse_data_json};
use crate::resources::read_data;
use crate::vault::common::{str_field, u64_field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvSecretV2Config {
    pub mount: String,
    pub name: String,
    pub data_json: String,
    /// Check-and-set version for writes.
    #[serde(default)]
    pub cas: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvSecretV2State {
    pub mount: String,
    pub name: String,
    pub path: String,
    pub data_json: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub cas: Option<u64>,
}

pub fn data_path(mount: &str, name: &str) -> String {
    format!("{}/data/{}", mount.trim_matches('/'), name.trim_matches('/'))
}

pub fn metadata_path(mount: &str, name: &str) -> String {
    format!("{}/metadata/{}", mount.trim_matches('/'), name.trim_matches('/'))
}

/// Splits `<mount>/data/<name>` into mount and name.
pub fn parse_id(id: &str) -> Option<(String, String)> {
    let (mount, name) = id.trim_matches('/').split_once("/data/")?;
    (!mount.is_empty() && !name.is_empty()).then(|| (mount.to_string(), name.to_string()))
}

/// The secret in a KV v2 read response. A deleted or destroyed latest
/// version has `data: null` and counts as missing.
pub fn secret_of(body: &Map<String, Value>) -> Option<(Map<String, Value>, Map<String, Value>)> {
    let data = body.get("data")?.as_object()?.clone();
    let metadata = body
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some((data, metadata))
}

#[derive(Debug, Default)]
pub struct KvSecretV2;

#[async_trait]
impl Resource for KvSecretV2 {
    const TYPE_NAME: &'static str = "vault_kv_secret_v2";

    type Config = KvSecretV2Config;
    type State = KvSecretV2State;

    fn validate(&self, config: &Self::Config, diags: &mut Diagnostics) {
        if config.mount.trim_matches('/').is_empty() {
            diags.error("mount", "mount must not be empty");
        }
        if config.name.trim_matches('/').is_empty() {
            diags.error("name", "name must not be empty");
        }
        if let Err(e) = parse_data_json(&config.data_json) {
            diags.error("data_json", e);
        }
    }

    fn id(&self, state: &Self::State) -> String {
        state.path.clone()
    }

    fn requires_replace(&self, prior: &Self::State, config: &Self::Config) -> Vec<String> {
        let mut attrs = Vec::new();
        if prior.mount.trim_matches('/') != config.mount.trim_matches('/') {
            attrs.push("mount".to_string());
        }
        if prior.name.trim_matches('/') != config.name.trim_matches('/') {
            attrs.push("name".to_string());
        }
        attrs
    }

    fn has_changes(&self, prior: &Self::State, config: &Self::Config) -> bool {
        parse_data_json(&config.data_json).ok() != parse_data_json(&prior.data_json).ok()
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        config: &Self::Config,
    ) -> Result<Self::State, ProviderError> {
        let data = parse_data_json(&config.data_json).map_err(ProviderError::Config)?;
        let path = data_path(&config.mount, &config.name);
        let mut body = json!({ "data": data });
        if let Some(cas) = config.cas {
            body["options"] = json!({ "cas": cas });
        }
        ctx.client.write(&path, body).await?;

        let prior = KvSecretV2State {
            mount: config.mount.clone(),
            name: config.name.clone(),
            path: path.clone(),
            data_json: String::new(),
            data: BTreeMap::new(),
            version: 0,
            created_time: None,
            cas: config.cas,
        };
        self.read(ctx, &path, Some(&prior)).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("{} right after writing it", path))
        })
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        prior: Option<&Self::State>,
    ) -> Result<Option<Self::State>, ProviderError> {
        let (mount, name) = match prior {
            Some(p) => (p.mount.clone(), p.name.clone()),
            None => parse_id(id).ok_or_else(|| {
                ProviderError::Config(format!("invalid id {:?}, expected <mount>/data/<name>", id))
            })?,
        };
        let path = data_path(&mount, &name);
        let Some(body) = read_data(&ctx.client, &path).await? else {
            return Ok(None);
        };
        let Some((data, metadata)) = secret_of(&body) else {
            return Ok(None);
        };

        Ok(Some(KvSecretV2State {
            mount,
            name,
            path,
            data_json: Value::Object(data.clone()).to_string(),
            data: flatten_data(&data),
            version: u64_field(&metadata, "version"),
            created_time: str_field(&metadata, "created_time"),
            cas: prior.and_then(|p| p.cas),
        }))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        _prior: &Self::State,
        config: &Self::Config,
    ) -> Result<Self::State, ProviderError> {
        self.create(ctx, config).await
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Self::State) -> Result<(), ProviderError> {
        ctx.client
            .delete(&metadata_path(&state.mount, &state.name))
            .await?;
        Ok(())
    }
}
