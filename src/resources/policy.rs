//! `vault_policy`: an ACL policy.

use crate::diagnostics::Diagnostics;
use crate::interface::{ProviderContext, Resource};
use crate::provider::ProviderError;
use crate::resources::read_data;
use crate::vault::common::str_field;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyData {
    pub name: String,
    pub policy: String,
}

pub fn policy_path(name: &str) -> String {
    format!("sys/policies/acl/{}", name)
}

#[derive(Debug, Default)]
pub struct Policy;

impl Policy {
    async fn write(&self, ctx: &ProviderContext, config: &PolicyData) -> Result<PolicyData, ProviderError> {
        ctx.client
            .write(&policy_path(&config.name), json!({ "policy": config.policy }))
            .await?;
        Ok(config.clone())
    }
}

#[async_trait]
impl Resource for Policy {
    const TYPE_NAME: &'static str = "vault_policy";

    type Config = PolicyData;
    type State = PolicyData;

    fn validate(&self, config: &PolicyData, diags: &mut Diagnostics) {
        if config.name.trim().is_empty() {
            diags.error("name", "name must not be empty");
        }
        if config.policy.trim().is_empty() {
            diags.error("policy", "policy must not be empty");
        }
    }

    fn id(&self, state: &PolicyData) -> String {
        state.name.clone()
    }

    fn requires_replace(&self, prior: &PolicyData, config: &PolicyData) -> Vec<String> {
        if prior.name != config.name {
            vec!["name".to_string()]
        } else {
            Vec::new()
        }
    }

    async fn create(&self, ctx: &ProviderContext, config: &PolicyData) -> Result<PolicyData, ProviderError> {
        self.write(ctx, config).await
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _prior: Option<&PolicyData>,
    ) -> Result<Option<PolicyData>, ProviderError> {
        let Some(data) = read_data(&ctx.client, &policy_path(id)).await? else {
            return Ok(None);
        };
        Ok(str_field(&data, "policy").map(|policy| PolicyData {
            name: id.to_string(),
            policy,
        }))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        _prior: &PolicyData,
        config: &PolicyData,
    ) -> Result<PolicyData, ProviderError> {
        self.write(ctx, config).await
    }

    async fn delete(&self, ctx: &ProviderContext, state: &PolicyData) -> Result<(), ProviderError> {
        ctx.client.delete(&policy_path(&state.name)).await?;
        Ok(())
    }
}
