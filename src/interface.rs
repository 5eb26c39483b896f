//! Resource and data source seams.
//!
//! Handlers implement the typed [`Resource`] or [`DataSource`] traits. The
//! provider stores them behind the JSON-in/JSON-out [`DynamicResource`] and
//! [`DynamicDataSource`] traits, which decode configs, run validation before
//! any network call and encode state.

use crate::diagnostics::Diagnostics;
use crate::locks::PathLocks;
use crate::provider::ProviderError;
use crate::vault::{RemountOptions, VaultClient};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Everything a handler needs to talk to Vault.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub client: VaultClient,
    pub locks: PathLocks,
    pub remount: RemountOptions,
}

impl ProviderContext {
    pub fn new(client: VaultClient) -> Self {
        Self {
            client,
            locks: PathLocks::new(),
            remount: RemountOptions::default(),
        }
    }
}

/// Stored state of one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub attributes: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Create,
    Update,
    Replace,
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub action: PlanAction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_replace: Vec<String>,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

/// A managed Vault object.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name the resource is registered under.
    const TYPE_NAME: &'static str;

    type Config: Serialize + DeserializeOwned + Send + Sync;
    type State: Serialize + DeserializeOwned + Clone + Send + Sync;

    fn validate(&self, _config: &Self::Config, _diags: &mut Diagnostics) {}

    fn id(&self, state: &Self::State) -> String;

    /// Attributes whose change cannot be applied in place.
    fn requires_replace(&self, _prior: &Self::State, _config: &Self::Config) -> Vec<String> {
        Vec::new()
    }

    fn has_changes(&self, prior: &Self::State, config: &Self::Config) -> bool {
        config_differs(config, prior)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        config: &Self::Config,
    ) -> Result<Self::State, ProviderError>;

    /// Reads the object behind `id`. `Ok(None)` means it no longer exists.
    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        prior: Option<&Self::State>,
    ) -> Result<Option<Self::State>, ProviderError>;

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &Self::State,
        config: &Self::Config,
    ) -> Result<Self::State, ProviderError>;

    async fn delete(&self, ctx: &ProviderContext, state: &Self::State) -> Result<(), ProviderError>;

    async fn import(
        &self,
        ctx: &ProviderContext,
        id: &str,
    ) -> Result<Option<Self::State>, ProviderError> {
        self.read(ctx, id, None).await
    }
}

/// A read-only lookup.
#[async_trait]
pub trait DataSource: Send + Sync {
    const TYPE_NAME: &'static str;

    type Config: DeserializeOwned + Send + Sync;
    type State: Serialize + Send + Sync;

    fn validate(&self, _config: &Self::Config, _diags: &mut Diagnostics) {}

    async fn read(
        &self,
        ctx: &ProviderContext,
        config: &Self::Config,
    ) -> Result<Self::State, ProviderError>;
}

/// True when an attribute set in `config` has a different value in
/// `state`. Attributes the state does not carry are not compared.
pub fn config_differs<C: Serialize, S: Serialize>(config: &C, state: &S) -> bool {
    let (Ok(Value::Object(config)), Ok(Value::Object(state))) =
        (serde_json::to_value(config), serde_json::to_value(state))
    else {
        return true;
    };
    config
        .iter()
        .filter(|(_, v)| !v.is_null())
        .any(|(k, v)| state.get(k).is_some_and(|current| current != v))
}

fn decode<T: DeserializeOwned>(type_name: &str, what: &str, value: &Value) -> Result<T, ProviderError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ProviderError::decode(format!("{} {}", type_name, what), e))
}

fn encode<T: Serialize>(type_name: &str, value: &T) -> Result<Value, ProviderError> {
    serde_json::to_value(value).map_err(|e| ProviderError::decode(format!("{} state", type_name), e))
}

/// Type-erased resource handler.
#[async_trait]
pub trait DynamicResource: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn validate(&self, config: &Value) -> Result<Diagnostics, ProviderError>;
    fn plan(&self, prior: Option<&ResourceState>, config: &Value) -> Result<Plan, ProviderError>;
    async fn create(&self, ctx: &ProviderContext, config: &Value) -> Result<ResourceState, ProviderError>;
    async fn read(
        &self,
        ctx: &ProviderContext,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError>;
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &ResourceState,
        config: &Value,
    ) -> Result<ResourceState, ProviderError>;
    async fn delete(&self, ctx: &ProviderContext, state: &ResourceState) -> Result<(), ProviderError>;
    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Option<ResourceState>, ProviderError>;
}

/// Decodes and validates a config, failing on any error diagnostic.
fn checked_config<R: Resource>(resource: &R, config: &Value) -> Result<R::Config, ProviderError> {
    let config: R::Config = decode(R::TYPE_NAME, "config", config)?;
    let mut diags = Diagnostics::new();
    resource.validate(&config, &mut diags);
    if diags.has_errors() {
        return Err(ProviderError::Validation(diags));
    }
    Ok(config)
}

fn to_resource_state<R: Resource>(resource: &R, state: &R::State) -> Result<ResourceState, ProviderError> {
    Ok(ResourceState {
        id: resource.id(state),
        attributes: encode(R::TYPE_NAME, state)?,
    })
}

#[async_trait]
impl<R> DynamicResource for R
where
    R: Resource + 'static,
{
    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn validate(&self, config: &Value) -> Result<Diagnostics, ProviderError> {
        let config: R::Config = decode(R::TYPE_NAME, "config", config)?;
        let mut diags = Diagnostics::new();
        Resource::validate(self, &config, &mut diags);
        Ok(diags)
    }

    fn plan(&self, prior: Option<&ResourceState>, config: &Value) -> Result<Plan, ProviderError> {
        let decoded: R::Config = decode(R::TYPE_NAME, "config", config)?;
        let mut diagnostics = Diagnostics::new();
        Resource::validate(self, &decoded, &mut diagnostics);

        let Some(prior) = prior else {
            return Ok(Plan {
                action: PlanAction::Create,
                requires_replace: Vec::new(),
                diagnostics,
            });
        };
        let prior: R::State = decode(R::TYPE_NAME, "state", &prior.attributes)?;
        let requires_replace = self.requires_replace(&prior, &decoded);
        let action = if !requires_replace.is_empty() {
            PlanAction::Replace
        } else if self.has_changes(&prior, &decoded) {
            PlanAction::Update
        } else {
            PlanAction::NoOp
        };
        Ok(Plan {
            action,
            requires_replace,
            diagnostics,
        })
    }

    async fn create(&self, ctx: &ProviderContext, config: &Value) -> Result<ResourceState, ProviderError> {
        let config = checked_config(self, config)?;
        let state = Resource::create(self, ctx, &config).await?;
        to_resource_state(self, &state)
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let prior: R::State = decode(R::TYPE_NAME, "state", &state.attributes)?;
        match Resource::read(self, ctx, &state.id, Some(&prior)).await? {
            Some(current) => Ok(Some(to_resource_state(self, &current)?)),
            None => {
                info!("{} {} no longer exists", R::TYPE_NAME, state.id);
                Ok(None)
            }
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &ResourceState,
        config: &Value,
    ) -> Result<ResourceState, ProviderError> {
        let config = checked_config(self, config)?;
        let prior: R::State = decode(R::TYPE_NAME, "state", &prior.attributes)?;

        let replace = self.requires_replace(&prior, &config);
        let state = if replace.is_empty() {
            Resource::update(self, ctx, &prior, &config).await?
        } else {
            info!(
                "Replacing {} {} ({} changed)",
                R::TYPE_NAME,
                self.id(&prior),
                replace.join(", ")
            );
            Resource::delete(self, ctx, &prior).await?;
            Resource::create(self, ctx, &config).await?
        };
        to_resource_state(self, &state)
    }

    async fn delete(&self, ctx: &ProviderContext, state: &ResourceState) -> Result<(), ProviderError> {
        let state: R::State = decode(R::TYPE_NAME, "state", &state.attributes)?;
        Resource::delete(self, ctx, &state).await
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Option<ResourceState>, ProviderError> {
        match Resource::import(self, ctx, id).await? {
            Some(state) => Ok(Some(to_resource_state(self, &state)?)),
            None => Ok(None),
        }
    }
}

/// Type-erased data source handler.
#[async_trait]
pub trait DynamicDataSource: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn validate(&self, config: &Value) -> Result<Diagnostics, ProviderError>;
    async fn read(&self, ctx: &ProviderContext, config: &Value) -> Result<Value, ProviderError>;
}

#[async_trait]
impl<D> DynamicDataSource for D
where
    D: DataSource + 'static,
{
    fn type_name(&self) -> &'static str {
        D::TYPE_NAME
    }

    fn validate(&self, config: &Value) -> Result<Diagnostics, ProviderError> {
        let config: D::Config = decode(D::TYPE_NAME, "config", config)?;
        let mut diags = Diagnostics::new();
        DataSource::validate(self, &config, &mut diags);
        Ok(diags)
    }

    async fn read(&self, ctx: &ProviderContext, config: &Value) -> Result<Value, ProviderError> {
        let config: D::Config = decode(D::TYPE_NAME, "config", config)?;
        let mut diags = Diagnostics::new();
        DataSource::validate(self, &config, &mut diags);
        if diags.has_errors() {
            return Err(ProviderError::Validation(diags));
        }
        let state = DataSource::read(self, ctx, &config).await?;
        encode(D::TYPE_NAME, &state)
    }
}
