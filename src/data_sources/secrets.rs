//! Secret lookups: `vault_generic_secret` and `vault_kv_secret_v2`.

use crate::diagnostics::Diagnostics;
use crate::interface::{DataSource, ProviderContext};
use crate::provider::ProviderError;
use crate::resources::generic_secret::flatten_data;
use crate::resources::kv_secret_v2::{data_path, secret_of};
use crate::resources::read_data;
use crate::vault::common::{bool_field, response_data, str_field, u64_field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenericSecretQuery {
    pub path: String,
    /// Version to read from a KV v2 mount addressed by its raw path.
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenericSecretData {
    pub path: String,
    pub data_json: String,
    pub data: BTreeMap<String, String>,
    pub lease_id: String,
    pub lease_duration: u64,
    pub lease_renewable: bool,
}

fn with_version(path: &str, version: Option<u64>) -> String {
    match version {
        Some(v) => format!("{}?version={}", path, v),
        None => path.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct GenericSecretLookup;

#[async_trait]
impl DataSource for GenericSecretLookup {
    const TYPE_NAME: &'static str = "vault_generic_secret";

    type Config = GenericSecretQuery;
    type State = GenericSecretData;

    fn validate(&self, config: &GenericSecretQuery, diags: &mut Diagnostics) {
        if config.path.trim_matches('/').is_empty() {
            diags.error("path", "path must not be empty");
        }
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        config: &GenericSecretQuery,
    ) -> Result<GenericSecretData, ProviderError> {
        let resp = ctx
            .client
            .read(&with_version(&config.path, config.version))
            .await?
            .ok_or_else(|| ProviderError::NotFound(config.path.clone()))?;
        let top = resp.as_object().cloned().unwrap_or_default();
        let data = response_data(&resp).cloned().unwrap_or_default();
        Ok(GenericSecretData {
            path: config.path.clone(),
            data_json: Value::Object(data.clone()).to_string(),
            data: flatten_data(&data),
            lease_id: str_field(&top, "lease_id").unwrap_or_default(),
            lease_duration: u64_field(&top, "lease_duration"),
            lease_renewable: bool_field(&top, "renewable"),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvSecretV2Query {
    pub mount: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KvSecretV2Data {
    pub path: String,
    pub data_json: String,
    pub data: BTreeMap<String, String>,
    pub version: u64,
    pub created_time: Option<String>,
    pub deletion_time: Option<String>,
    pub destroyed: bool,
    pub custom_metadata: BTreeMap<String, String>,
}

fn custom_metadata(metadata: &Map<String, Value>) -> BTreeMap<String, String> {
    metadata
        .get("custom_metadata")
        .and_then(Value::as_object)
        .map(flatten_data)
        .unwrap_or_default()
}

#[derive(Debug, Default)]
pub struct KvSecretV2Lookup;

#[async_trait]
impl DataSource for KvSecretV2Lookup {
    const TYPE_NAME: &'static str = "vault_kv_secret_v2";

    type Config = KvSecretV2Query;
    type State = KvSecretV2Data;

    fn validate(&self, config: &KvSecretV2Query, diags: &mut Diagnostics) {
        if config.mount.trim_matches('/').is_empty() {
            diags.error("mount", "mount must not be empty");
        }
        if config.name.trim_matches('/').is_empty() {
            diags.error("name", "name must not be empty");
        }
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        config: &KvSecretV2Query,
    ) -> Result<KvSecretV2Data, ProviderError> {
        let path = data_path(&config.mount, &config.name);
        let (data, metadata) = read_data(&ctx.client, &with_version(&path, config.version))
            .await?
            .as_ref()
            .and_then(secret_of)
            .ok_or_else(|| ProviderError::NotFound(path.clone()))?;

        Ok(KvSecretV2Data {
            path,
            data_json: Value::Object(data.clone()).to_string(),
            data: flatten_data(&data),
            version: u64_field(&metadata, "version"),
            created_time: str_field(&metadata, "created_time"),
            deletion_time: str_field(&metadata, "deletion_time").filter(|t| !t.is_empty()),
            destroyed: bool_field(&metadata, "destroyed"),
            custom_metadata: custom_metadata(&metadata),
        })
    }
}
