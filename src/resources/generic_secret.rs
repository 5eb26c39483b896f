//! `vault_generic_secret`: a JSON object written to an arbitrary path.

use crate::diagnostics::Diagnostics;
use crate::interface::{ProviderContext, Resource};
use crate::provider::ProviderError;
use crate::resources::read_data;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenericSecretConfig {
    pub path: String,
    pub data_json: String,
    /// Never read the secret back, e.g. for write-only endpoints.
    #[serde(default)]
    pub disable_read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericSecretState {
    pub path: String,
    pub data_json: String,
    #[serde(default)]
    pub disable_read: bool,
    /// Top-level values as strings.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Parses `data_json`, which must hold a JSON object.
pub fn parse_data_json(data_json: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(data_json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("data_json must be a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(format!("data_json is not valid JSON: {}", e)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// String view of a secret: strings as they are, anything else as JSON.
pub fn flatten_data(data: &Map<String, Value>) -> BTreeMap<String, String> {
    data.iter()
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), s)
        })
        .collect()
}

fn state_from(path: &str, disable_read: bool, data: &Map<String, Value>) -> GenericSecretState {
    GenericSecretState {
        path: path.to_string(),
        data_json: Value::Object(data.clone()).to_string(),
        disable_read,
        data: flatten_data(data),
    }
}

#[derive(Debug, Default)]
pub struct GenericSecret;

impl GenericSecret {
    async fn write(
        &self,
        ctx: &ProviderContext,
        config: &GenericSecretConfig,
    ) -> Result<GenericSecretState, ProviderError> {
        let data = parse_data_json(&config.data_json).map_err(ProviderError::Config)?;
        ctx.client
            .write(&config.path, Value::Object(data.clone()))
            .await?;
        Ok(state_from(&config.path, config.disable_read, &data))
    }
}

#[async_trait]
impl Resource for GenericSecret {
    const TYPE_NAME: &'static str = "vault_generic_secret";

    type Config = GenericSecretConfig;
    type State = GenericSecretState;

    fn validate(&self, config: &Self::Config, diags: &mut Diagnostics) {
        if config.path.trim_matches('/').is_empty() {
            diags.error("path", "path must not be empty");
        }
        if let Err(e) = parse_data_json(&config.data_json) {
            diags.error("data_json", e);
        }
    }

    fn id(&self, state: &Self::State) -> String {
        state.path.clone()
    }

    fn requires_replace(&self, prior: &Self::State, config: &Self::Config) -> Vec<String> {
        if prior.path != config.path {
            vec!["path".to_string()]
        } else {
            Vec::new()
        }
    }

    fn has_changes(&self, prior: &Self::State, config: &Self::Config) -> bool {
        let desired = parse_data_json(&config.data_json).ok();
        let current = parse_data_json(&prior.data_json).ok();
        prior.path != config.path || prior.disable_read != config.disable_read || desired != current
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        config: &Self::Config,
    ) -> Result<Self::State, ProviderError> {
        self.write(ctx, config).await
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        prior: Option<&Self::State>,
    ) -> Result<Option<Self::State>, ProviderError> {
        if let Some(prior) = prior.filter(|p| p.disable_read) {
            return Ok(Some(prior.clone()));
        }
        let Some(data) = read_data(&ctx.client, id).await? else {
            return Ok(None);
        };
        Ok(Some(state_from(id, false, &data)))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        _prior: &Self::State,
        config: &Self::Config,
    ) -> Result<Self::State, ProviderError> {
        self.write(ctx, config).await
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Self::State) -> Result<(), ProviderError> {
        ctx.client.delete(&state.path).await?;
        Ok(())
    }
}
