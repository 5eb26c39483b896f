//! Identity entities and entity aliases.
//!
//! Both are addressed by the ID Vault assigns on creation. Alias writes go
//! through a table Vault does not guard against concurrent updates, so
//! every alias operation holds the `identity/entity-alias` lock.

use crate::diagnostics::Diagnostics;
use crate::interface::{ProviderContext, Resource};
use crate::provider::ProviderError;
use crate::resources::read_data;
use crate::vault::common::{bool_field, response_data, str_field, string_list};
use crate::vault::{VaultClient, VaultError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const ALIAS_LOCK: &str = "identity/entity-alias";

fn string_map(data: &Map<String, Value>, key: &str) -> BTreeMap<String, String> {
    data.get(key)
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Pulls the new object's ID out of a create response.
fn created_id(path: &str, resp: Option<Value>) -> Option<String> {
    let id = resp
        .as_ref()
        .and_then(response_data)
        .and_then(|d| str_field(d, "id"));
    if id.is_none() {
        debug!("{} returned no id", path);
    }
    id
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityEntity {
    pub name: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
    /// Set by Vault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl IdentityEntity {
    fn body(&self) -> Value {
        json!({
            "name": self.name,
            "policies": self.policies,
            "metadata": self.metadata,
            "disabled": self.disabled,
        })
    }
}

async fn fetch_entity(client: &VaultClient, id: &str) -> Result<Option<IdentityEntity>, VaultError> {
    let Some(data) = read_data(client, &format!("identity/entity/id/{}", id)).await? else {
        return Ok(None);
    };
    Ok(Some(IdentityEntity {
        name: str_field(&data, "name").unwrap_or_default(),
        policies: string_list(&data, "policies"),
        metadata: string_map(&data, "metadata"),
        disabled: bool_field(&data, "disabled"),
        id: Some(id.to_string()),
    }))
}

/// Lookup path for an entity by name. The name is a single path segment.
fn entity_name_path(name: &str) -> String {
    format!("identity/entity/name/{}", urlencoding::encode(name))
}

#[derive(Debug, Default)]
pub struct Entity;

#[async_trait]
impl Resource for Entity {
    const TYPE_NAME: &'static str = "vault_identity_entity";

    type Config = IdentityEntity;
    type State = IdentityEntity;

    fn validate(&self, config: &IdentityEntity, diags: &mut Diagnostics) {
        if config.name.trim().is_empty() {
            diags.error("name", "name must not be empty");
        }
        if config.id.is_some() {
            diags.error("id", "id is set by Vault and cannot be configured");
        }
    }

    fn id(&self, state: &IdentityEntity) -> String {
        state.id.clone().unwrap_or_default()
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        config: &IdentityEntity,
    ) -> Result<IdentityEntity, ProviderError> {
        let resp = ctx.client.write("identity/entity", config.body()).await?;
        // Writing an existing name updates that entity and returns nothing,
        // so fall back to a lookup by name.
        let id = match created_id("identity/entity", resp) {
            Some(id) => id,
            None => read_data(&ctx.client, &entity_name_path(&config.name))
                .await?
                .and_then(|d| str_field(&d, "id"))
                .ok_or_else(|| {
                    ProviderError::NotFound(format!("identity entity {}", config.name))
                })?,
        };
        fetch_entity(&ctx.client, &id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("identity/entity/id/{}", id)))
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _prior: Option<&IdentityEntity>,
    ) -> Result<Option<IdentityEntity>, ProviderError> {
        Ok(fetch_entity(&ctx.client, id).await?)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &IdentityEntity,
        config: &IdentityEntity,
    ) -> Result<IdentityEntity, ProviderError> {
        let id = self.id(prior);
        ctx.client
            .write(&format!("identity/entity/id/{}", id), config.body())
            .await?;
        fetch_entity(&ctx.client, &id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("identity/entity/id/{}", id)))
    }

    async fn delete(&self, ctx: &ProviderContext, state: &IdentityEntity) -> Result<(), ProviderError> {
        ctx.client
            .delete(&format!("identity/entity/id/{}", self.id(state)))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityEntityAlias {
    pub name: String,
    pub mount_accessor: String,
    pub canonical_id: String,
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
    /// Set by Vault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl IdentityEntityAlias {
    fn body(&self) -> Value {
        json!({
            "name": self.name,
            "mount_accessor": self.mount_accessor,
            "canonical_id": self.canonical_id,
            "custom_metadata": self.custom_metadata,
        })
    }
}

async fn fetch_alias(client: &VaultClient, id: &str) -> Result<Option<IdentityEntityAlias>, VaultError> {
    let Some(data) = read_data(client, &format!("identity/entity-alias/id/{}", id)).await? else {
        return Ok(None);
    };
    Ok(Some(IdentityEntityAlias {
        name: str_field(&data, "name").unwrap_or_default(),
        mount_accessor: str_field(&data, "mount_accessor").unwrap_or_default(),
        canonical_id: str_field(&data, "canonical_id").unwrap_or_default(),
        custom_metadata: string_map(&data, "custom_metadata"),
        id: Some(id.to_string()),
    }))
}

#[derive(Debug, Default)]
pub struct EntityAlias;

#[async_trait]
impl Resource for EntityAlias {
    const TYPE_NAME: &'static str = "vault_identity_entity_alias";

    type Config = IdentityEntityAlias;
    type State = IdentityEntityAlias;

    fn validate(&self, config: &IdentityEntityAlias, diags: &mut Diagnostics) {
        for (attr, value) in [
            ("name", &config.name),
            ("mount_accessor", &config.mount_accessor),
            ("canonical_id", &config.canonical_id),
        ] {
            if value.trim().is_empty() {
                diags.error(attr, format!("{} must not be empty", attr));
            }
        }
        if config.id.is_some() {
            diags.error("id", "id is set by Vault and cannot be configured");
        }
    }

    fn id(&self, state: &IdentityEntityAlias) -> String {
        state.id.clone().unwrap_or_default()
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        config: &IdentityEntityAlias,
    ) -> Result<IdentityEntityAlias, ProviderError> {
        let _guard = ctx.locks.lock(ALIAS_LOCK).await;
        let resp = ctx.client.write("identity/entity-alias", config.body()).await?;
        let id = created_id("identity/entity-alias", resp).ok_or_else(|| VaultError::Parse {
            path: "identity/entity-alias".to_string(),
            message: "response has no alias id".to_string(),
        })?;
        fetch_alias(&ctx.client, &id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("identity/entity-alias/id/{}", id)))
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _prior: Option<&IdentityEntityAlias>,
    ) -> Result<Option<IdentityEntityAlias>, ProviderError> {
        let _guard = ctx.locks.lock(ALIAS_LOCK).await;
        Ok(fetch_alias(&ctx.client, id).await?)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &IdentityEntityAlias,
        config: &IdentityEntityAlias,
    ) -> Result<IdentityEntityAlias, ProviderError> {
        let _guard = ctx.locks.lock(ALIAS_LOCK).await;
        let id = self.id(prior);
        ctx.client
            .write(&format!("identity/entity-alias/id/{}", id), config.body())
            .await?;
        fetch_alias(&ctx.client, &id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("identity/entity-alias/id/{}", id)))
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        state: &IdentityEntityAlias,
    ) -> Result<(), ProviderError> {
        let _guard = ctx.locks.lock(ALIAS_LOCK).await;
        ctx.client
            .delete(&format!("identity/entity-alias/id/{}", self.id(state)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_validation() {
        let alias: IdentityEntityAlias = serde_json::from_value(json!({
            "name": "bob",
            "mount_accessor": "",
            "canonical_id": "e-1",
            "id": "a-1"
        }))
        .unwrap();
        let mut diags = Diagnostics::new();
        EntityAlias.validate(&alias, &mut diags);
        let attrs: Vec<_> = diags.iter().filter_map(|d| d.attribute.clone()).collect();
        assert_eq!(attrs, vec!["mount_accessor", "id"]);
    }

    #[test]
    fn test_entity_name_path_encodes_segment() {
        assert_eq!(entity_name_path("svc"), "identity/entity/name/svc");
        assert_eq!(
            entity_name_path("team a/ops?x"),
            "identity/entity/name/team%20a%2Fops%3Fx"
        );
    }

    #[test]
    fn test_string_map_skips_non_strings() {
        let data = json!({"metadata": {"team": "infra", "n": 1}});
        let map = string_map(data.as_object().unwrap(), "metadata");
        assert_eq!(map.len(), 1);
        assert_eq!(map["team"], "infra");
    }
}
