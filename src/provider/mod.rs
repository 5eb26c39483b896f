//! Provider configuration, resolution and the resource registry.
//!
//! A [`VaultProvider`] is built once from a [`ProviderConfig`]. It owns the
//! resolved client and the lock registry and dispatches operations to the
//! handler registered for each type name.

pub mod config;
pub mod env;
pub mod error;
pub mod resolve;
pub mod token;

pub use config::ProviderConfig;
pub use env::Environment;
pub use error::ProviderError;
pub use resolve::resolve;
pub use token::{resolve_token, ResolvedToken, TokenSource};

use crate::diagnostics::Diagnostics;
use crate::interface::{DynamicDataSource, DynamicResource, Plan, ProviderContext, ResourceState};
use crate::vault::VaultClient;
use crate::{data_sources, resources};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

pub struct VaultProvider {
    ctx: ProviderContext,
    resources: HashMap<&'static str, Box<dyn DynamicResource>>,
    data_sources: HashMap<&'static str, Box<dyn DynamicDataSource>>,
}

impl VaultProvider {
    /// Resolves `config` against `env` and builds a provider around the
    /// resulting client.
    pub async fn configure(config: &ProviderConfig, env: &Environment) -> Result<Self, ProviderError> {
        let client = resolve(config, env).await?;
        Ok(Self::with_client(client))
    }

    /// Builds a provider around an already authenticated client.
    pub fn with_client(client: VaultClient) -> Self {
        Self::with_context(ProviderContext::new(client))
    }

    pub fn with_context(ctx: ProviderContext) -> Self {
        Self {
            ctx,
            resources: resources::registry(),
            data_sources: data_sources::registry(),
        }
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    pub fn resource_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.resources.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn data_source_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.data_sources.keys().copied().collect();
        names.sort_unstable();
        names
    }

    fn resource(&self, type_name: &str) -> Result<&dyn DynamicResource, ProviderError> {
        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource {
                kind: "resource",
                name: type_name.to_string(),
            })
    }

    fn data_source(&self, type_name: &str) -> Result<&dyn DynamicDataSource, ProviderError> {
        self.data_sources
            .get(type_name)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource {
                kind: "data source",
                name: type_name.to_string(),
            })
    }

    pub fn validate(&self, type_name: &str, config: &Value) -> Result<Diagnostics, ProviderError> {
        self.resource(type_name)?.validate(config)
    }

    pub fn plan(
        &self,
        type_name: &str,
        prior: Option<&ResourceState>,
        config: &Value,
    ) -> Result<Plan, ProviderError> {
        self.resource(type_name)?.plan(prior, config)
    }

    pub async fn create(&self, type_name: &str, config: &Value) -> Result<ResourceState, ProviderError> {
        let state = self.resource(type_name)?.create(&self.ctx, config).await?;
        info!("Created {} {}", type_name, state.id);
        Ok(state)
    }

    pub async fn read(
        &self,
        type_name: &str,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        self.resource(type_name)?.read(&self.ctx, state).await
    }

    pub async fn update(
        &self,
        type_name: &str,
        prior: &ResourceState,
        config: &Value,
    ) -> Result<ResourceState, ProviderError> {
        let state = self
            .resource(type_name)?
            .update(&self.ctx, prior, config)
            .await?;
        info!("Updated {} {}", type_name, state.id);
        Ok(state)
    }

    pub async fn delete(&self, type_name: &str, state: &ResourceState) -> Result<(), ProviderError> {
        self.resource(type_name)?.delete(&self.ctx, state).await?;
        info!("Deleted {} {}", type_name, state.id);
        Ok(())
    }

    pub async fn import(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<Option<ResourceState>, ProviderError> {
        self.resource(type_name)?.import(&self.ctx, id).await
    }

    pub async fn read_data_source(&self, type_name: &str, config: &Value) -> Result<Value, ProviderError> {
        self.data_source(type_name)?.read(&self.ctx, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> VaultProvider {
        VaultProvider::with_client(VaultClient::new("http://127.0.0.1:8200", Some("root")).unwrap())
    }

    #[test]
    fn test_registry_contains_catalog() {
        let provider = provider();
        let resources = provider.resource_types();
        for name in [
            "vault_mount",
            "vault_kv_secret_backend",
            "vault_consul_secret_backend",
            "vault_kubernetes_auth_backend",
            "vault_identity_entity_alias",
            "vault_policy",
        ] {
            assert!(resources.contains(&name), "missing {}", name);
        }
        let data_sources = provider.data_source_types();
        assert!(data_sources.contains(&"vault_transit_verify"));
        assert!(data_sources.contains(&"vault_policy_document"));
    }

    #[test]
    fn test_unknown_type() {
        let err = provider()
            .plan("vault_nope", None, &json!({}))
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource { .. }));
    }

    #[test]
    fn test_decode_error_names_type() {
        let err = provider()
            .validate("vault_policy", &json!({"name": "x", "policy": "p", "bogus": 1}))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("vault_policy config"), "{}", msg);
    }
}
