//! `vault_consul_secret_backend_role`: a role that issues Consul tokens.

use crate::diagnostics::Diagnostics;
use crate::interface::{ProviderContext, Resource};
use crate::provider::ProviderError;
use crate::resources::pki_role::{parse_role_id, role_path};
use crate::resources::read_data;
use crate::vault::common::{bool_field, str_field, string_list, u64_field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

fn default_backend() -> String {
    "consul".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsulRole {
    #[serde(default = "default_backend")]
    pub backend: String,
    pub name: String,
    /// Consul ACL policies attached to issued tokens.
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub consul_roles: Vec<String>,
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub max_ttl: u64,
    #[serde(default)]
    pub local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl ConsulRole {
    fn path(&self) -> String {
        role_path(&self.backend, &self.name)
    }
}

#[derive(Debug, Default)]
pub struct ConsulSecretBackendRole;

#[async_trait]
impl Resource for ConsulSecretBackendRole {
    const TYPE_NAME: &'static str = "vault_consul_secret_backend_role";

    type Config = ConsulRole;
    type State = ConsulRole;

    fn validate(&self, config: &ConsulRole, diags: &mut Diagnostics) {
        if config.name.trim().is_empty() {
            diags.error("name", "name must not be empty");
        }
        if config.policies.is_empty() && config.consul_roles.is_empty() {
            diags.error("policies", "at least one of policies or consul_roles is required");
        }
        if let Some(token_type) = config.token_type.as_deref() {
            if token_type != "client" && token_type != "management" {
                diags.error("token_type", "token_type must be client or management");
            }
        }
    }

    fn id(&self, state: &ConsulRole) -> String {
        state.path()
    }

    fn requires_replace(&self, prior: &ConsulRole, config: &ConsulRole) -> Vec<String> {
        let mut attrs = Vec::new();
        if prior.backend.trim_matches('/') != config.backend.trim_matches('/') {
            attrs.push("backend".to_string());
        }
        if prior.name != config.name {
            attrs.push("name".to_string());
        }
        attrs
    }

    async fn create(&self, ctx: &ProviderContext, config: &ConsulRole) -> Result<ConsulRole, ProviderError> {
        let mut body = json!({
            "consul_policies": config.policies,
            "consul_roles": config.consul_roles,
            "ttl": config.ttl,
            "max_ttl": config.max_ttl,
            "local": config.local,
        });
        if let Some(token_type) = &config.token_type {
            body["token_type"] = json!(token_type);
        }
        ctx.client.write(&config.path(), body).await?;
        Ok(config.clone())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        prior: Option<&ConsulRole>,
    ) -> Result<Option<ConsulRole>, ProviderError> {
        let (backend, name) = match prior {
            Some(p) => (p.backend.clone(), p.name.clone()),
            None => parse_role_id(id).ok_or_else(|| {
                ProviderError::Config(format!("invalid id {:?}, expected <backend>/roles/<name>", id))
            })?,
        };
        let Some(data) = read_data(&ctx.client, &role_path(&backend, &name)).await? else {
            return Ok(None);
        };
        // Older servers echo the policies under their pre-1.11 name.
        let mut policies = string_list(&data, "consul_policies");
        if policies.is_empty() {
            policies = string_list(&data, "policies");
        }
        Ok(Some(ConsulRole {
            backend,
            name,
            policies,
            consul_roles: string_list(&data, "consul_roles"),
            ttl: u64_field(&data, "ttl"),
            max_ttl: u64_field(&data, "max_ttl"),
            local: bool_field(&data, "local"),
            token_type: str_field(&data, "token_type").or_else(|| prior.and_then(|p| p.token_type.clone())),
        }))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        _prior: &ConsulRole,
        config: &ConsulRole,
    ) -> Result<ConsulRole, ProviderError> {
        self.create(ctx, config).await
    }

    async fn delete(&self, ctx: &ProviderContext, state: &ConsulRole) -> Result<(), ProviderError> {
        ctx.client.delete(&state.path()).await?;
        Ok(())
    }
}
