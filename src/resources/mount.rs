//! One resource type for every mount-backed engine.
//!
//! [`MountResource`] handles the mount itself through the reconciler in
//! [`crate::vault::mount`]. What differs between engines (the mounted type,
//! secret or auth table, extra options and configuration written under the
//! mount) comes from an [`Engine`] implementation.

use crate::diagnostics::Diagnostics;
use crate::interface::{ProviderContext, Resource};
use crate::provider::ProviderError;
use crate::vault::mount::{self as reconciler, plan_mount_change};
use crate::vault::{
    Migration, MountChange, MountInfo, MountKind, MountSpec, SecondaryConfig, VaultClient,
    VaultError,
};
use async_trait::async_trait;
use serde::de::{DeserializeOwned, Error as _};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::debug;

/// Engine specific behavior of a mount resource.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    const TYPE_NAME: &'static str;
    /// Engine type that gets mounted. `None` takes it from the `type`
    /// attribute.
    const ENGINE_TYPE: Option<&'static str>;
    const KIND: MountKind;
    const MIGRATION: Migration = Migration::Remount;

    type Settings: Serialize
        + DeserializeOwned
        + Clone
        + PartialEq
        + Default
        + Debug
        + Send
        + Sync
        + 'static;

    fn validate(&self, _settings: &Self::Settings, _diags: &mut Diagnostics) {}

    /// Mount options derived from the settings, e.g. the KV `version`.
    fn options(&self, _settings: &Self::Settings) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Configuration written under the mount once it exists.
    fn secondary<'a>(&self, _settings: &'a Self::Settings) -> Option<&'a dyn SecondaryConfig> {
        None
    }

    /// Refreshes the settings from Vault. Values Vault never returns, like
    /// credentials, are kept from `prior`.
    async fn read_settings(
        &self,
        _client: &VaultClient,
        _live: &MountInfo,
        prior: &Self::Settings,
    ) -> Result<Self::Settings, VaultError> {
        Ok(prior.clone())
    }
}

/// Settings of engines that have nothing beyond the mount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoSettings {}

const MOUNT_FIELDS: &[&str] = &[
    "path",
    "type",
    "description",
    "default_lease_ttl_seconds",
    "max_lease_ttl_seconds",
    "local",
    "seal_wrap",
    "options",
    "accessor",
];

/// Attributes shared by every mount resource.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountAttributes {
    pub path: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub engine_type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_lease_ttl_seconds: u64,
    #[serde(default)]
    pub max_lease_ttl_seconds: u64,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub seal_wrap: bool,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Set by Vault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessor: Option<String>,
}

/// Config and state of a mount resource: the shared mount attributes plus
/// the engine's settings, side by side in one flat object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MountData<S> {
    pub mount: MountAttributes,
    pub settings: S,
}

impl<S: Serialize> Serialize for MountData<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = match serde_json::to_value(&self.mount).map_err(Ser::Error::custom)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        match serde_json::to_value(&self.settings).map_err(Ser::Error::custom)? {
            Value::Object(settings) => map.extend(settings),
            Value::Null => {}
            _ => return Err(Ser::Error::custom("engine settings must be an object")),
        }
        map.serialize(serializer)
    }
}

impl<'de, S: DeserializeOwned> Deserialize<'de> for MountData<S> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;
        let mount: Map<String, Value> = MOUNT_FIELDS
            .iter()
            .filter_map(|k| map.remove(*k).map(|v| (k.to_string(), v)))
            .collect();
        let mount = serde_json::from_value(Value::Object(mount)).map_err(D::Error::custom)?;
        let settings = serde_json::from_value(Value::Object(map)).map_err(D::Error::custom)?;
        Ok(Self { mount, settings })
    }
}

#[derive(Debug, Default)]
pub struct MountResource<E> {
    engine: E,
}

impl<E: Engine> MountResource<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    fn engine_type(&self, attrs: &MountAttributes) -> String {
        E::ENGINE_TYPE
            .map(str::to_string)
            .or_else(|| attrs.engine_type.clone())
            .unwrap_or_default()
    }

    /// The mount as the reconciler sees it.
    pub fn spec(&self, data: &MountData<E::Settings>) -> MountSpec {
        let mut spec = MountSpec::new(E::KIND, &data.mount.path, &self.engine_type(&data.mount));
        spec.description = data.mount.description.clone();
        spec.default_lease_ttl = data.mount.default_lease_ttl_seconds;
        spec.max_lease_ttl = data.mount.max_lease_ttl_seconds;
        spec.local = data.mount.local;
        spec.seal_wrap = data.mount.seal_wrap;
        spec.options = data.mount.options.clone();
        spec.options.extend(self.engine.options(&data.settings));
        spec
    }

    /// Reads the live mount and builds state from it. Without a prior state
    /// (import) every live option is taken over.
    async fn observe(
        &self,
        client: &VaultClient,
        path: &str,
        prior: Option<&MountData<E::Settings>>,
    ) -> Result<Option<MountData<E::Settings>>, ProviderError> {
        let Some(live) = reconciler::read_mount(client, E::KIND, path).await? else {
            return Ok(None);
        };
        if let Some(expected) = E::ENGINE_TYPE {
            if live.engine_type != expected {
                return Err(VaultError::MountTypeMismatch {
                    path: live.path.clone(),
                    expected: expected.to_string(),
                    actual: live.engine_type.clone(),
                }
                .into());
            }
        }

        let mut spec = match prior {
            Some(prior) => self.spec(prior),
            None => {
                let mut spec = MountSpec::new(E::KIND, path, &live.engine_type);
                spec.options = live.options.clone();
                spec
            }
        };
        spec.merge_live(&live);

        let prior_settings = prior.map(|p| p.settings.clone()).unwrap_or_default();
        let settings = self
            .engine
            .read_settings(client, &live, &prior_settings)
            .await?;
        let engine_options = self.engine.options(&settings);
        spec.options.retain(|k, _| !engine_options.contains_key(k));

        Ok(Some(MountData {
            mount: MountAttributes {
                path: spec.path,
                engine_type: Some(spec.engine_type),
                description: spec.description,
                default_lease_ttl_seconds: spec.default_lease_ttl,
                max_lease_ttl_seconds: spec.max_lease_ttl,
                local: spec.local,
                seal_wrap: spec.seal_wrap,
                options: spec.options,
                accessor: Some(live.accessor).filter(|a| !a.is_empty()),
            },
            settings,
        }))
    }

    async fn observe_existing(
        &self,
        client: &VaultClient,
        path: &str,
        config: &MountData<E::Settings>,
    ) -> Result<MountData<E::Settings>, ProviderError> {
        self.observe(client, path, Some(config))
            .await?
            .ok_or_else(|| {
                VaultError::Parse {
                    path: path.to_string(),
                    message: "mount not found right after writing it".to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl<E: Engine> Resource for MountResource<E> {
    const TYPE_NAME: &'static str = E::TYPE_NAME;

    type Config = MountData<E::Settings>;
    type State = MountData<E::Settings>;

    fn validate(&self, config: &Self::Config, diags: &mut Diagnostics) {
        if config.mount.path.trim_matches('/').is_empty() {
            diags.error("path", "path must not be empty");
        }
        match (E::ENGINE_TYPE, config.mount.engine_type.as_deref()) {
            (None, None) | (None, Some("")) => diags.error("type", "type is required"),
            (Some(fixed), Some(given)) if given != fixed => diags.error(
                "type",
                format!("{} always mounts the {} engine", E::TYPE_NAME, fixed),
            ),
            _ => {}
        }
        if config.mount.accessor.is_some() {
            diags.error("accessor", "accessor is set by Vault and cannot be configured");
        }
        let (default_ttl, max_ttl) = (
            config.mount.default_lease_ttl_seconds,
            config.mount.max_lease_ttl_seconds,
        );
        if max_ttl > 0 && default_ttl > max_ttl {
            diags.error(
                "default_lease_ttl_seconds",
                "default_lease_ttl_seconds must not exceed max_lease_ttl_seconds",
            );
        }
        self.engine.validate(&config.settings, diags);
    }

    fn id(&self, state: &Self::State) -> String {
        state.mount.path.trim_matches('/').to_string()
    }

    fn requires_replace(&self, prior: &Self::State, config: &Self::Config) -> Vec<String> {
        match plan_mount_change(&self.spec(prior), &self.spec(config)) {
            MountChange::Replace(attrs) => attrs.iter().map(|a| a.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        config: &Self::Config,
    ) -> Result<Self::State, ProviderError> {
        let spec = self.spec(config);
        let outcome =
            reconciler::create_mount(&ctx.client, &spec, self.engine.secondary(&config.settings))
                .await?;
        debug!("{} {}: {:?}", E::TYPE_NAME, spec.path, outcome);
        self.observe_existing(&ctx.client, &spec.path, config).await
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        prior: Option<&Self::State>,
    ) -> Result<Option<Self::State>, ProviderError> {
        self.observe(&ctx.client, id, prior).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: &Self::State,
        config: &Self::Config,
    ) -> Result<Self::State, ProviderError> {
        let desired = self.spec(config);
        let secondary = self.engine.secondary(&config.settings);
        let change = reconciler::update_mount(
            &ctx.client,
            &self.spec(prior),
            &desired,
            E::MIGRATION,
            secondary,
            ctx.remount,
        )
        .await?;
        debug!("{} {}: {:?}", E::TYPE_NAME, desired.path, change);

        // Migrations and replacements already rewrote the configuration.
        if matches!(change, MountChange::None | MountChange::Tune) && prior.settings != config.settings
        {
            if let Some(secondary) = secondary {
                secondary.write(&ctx.client, &desired.path).await?;
            }
        }
        self.observe_existing(&ctx.client, &desired.path, config).await
    }

    async fn delete(&self, ctx: &ProviderContext, state: &Self::State) -> Result<(), ProviderError> {
        reconciler::delete_mount(&ctx.client, &self.spec(state)).await?;
        Ok(())
    }
}
