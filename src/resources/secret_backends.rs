//! Secret engine mounts.

use crate::diagnostics::Diagnostics;
use crate::resources::mount::{Engine, MountResource, NoSettings};
use crate::vault::common::{response_data, str_field};
use crate::vault::{Migration, MountInfo, MountKind, SecondaryConfig, VaultClient, VaultError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::info;

/// `vault_mount`: any secret engine, named by the `type` attribute.
#[derive(Debug, Default)]
pub struct AnySecretEngine;

impl Engine for AnySecretEngine {
    const TYPE_NAME: &'static str = "vault_mount";
    const ENGINE_TYPE: Option<&'static str> = None;
    const KIND: MountKind = MountKind::Secret;
    type Settings = NoSettings;
}

pub type GenericMount = MountResource<AnySecretEngine>;

#[derive(Debug, Default)]
pub struct KvEngine;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvSettings {
    /// KV version, 1 or 2.
    #[serde(default)]
    pub version: Option<u8>,
}

#[async_trait]
impl Engine for KvEngine {
    const TYPE_NAME: &'static str = "vault_kv_secret_backend";
    const ENGINE_TYPE: Option<&'static str> = Some("kv");
    const KIND: MountKind = MountKind::Secret;
    type Settings = KvSettings;

    fn validate(&self, settings: &KvSettings, diags: &mut Diagnostics) {
        if let Some(version) = settings.version {
            if version != 1 && version != 2 {
                diags.error("version", "version must be 1 or 2");
            }
        }
    }

    fn options(&self, settings: &KvSettings) -> BTreeMap<String, String> {
        settings
            .version
            .map(|v| BTreeMap::from([("version".to_string(), v.to_string())]))
            .unwrap_or_default()
    }

    async fn read_settings(
        &self,
        _client: &VaultClient,
        live: &MountInfo,
        prior: &KvSettings,
    ) -> Result<KvSettings, VaultError> {
        Ok(KvSettings {
            version: live
                .options
                .get("version")
                .and_then(|v| v.parse().ok())
                .or(prior.version),
        })
    }
}

pub type KvSecretBackend = MountResource<KvEngine>;

#[derive(Debug, Default)]
pub struct PkiEngine;

impl Engine for PkiEngine {
    const TYPE_NAME: &'static str = "vault_pki_secret_backend";
    const ENGINE_TYPE: Option<&'static str> = Some("pki");
    const KIND: MountKind = MountKind::Secret;
    type Settings = NoSettings;
}

pub type PkiSecretBackend = MountResource<PkiEngine>;

#[derive(Debug, Default)]
pub struct TransitEngine;

impl Engine for TransitEngine {
    const TYPE_NAME: &'static str = "vault_transit_secret_backend";
    const ENGINE_TYPE: Option<&'static str> = Some("transit");
    const KIND: MountKind = MountKind::Secret;
    type Settings = NoSettings;
}

pub type TransitSecretBackend = MountResource<TransitEngine>;

/// Inserts `value` under `key` when it is set.
fn put_opt(body: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        body.insert(key.to_string(), Value::String(v.clone()));
    }
}

fn non_empty_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    str_field(data, key).filter(|v| !v.is_empty())
}

#[derive(Debug, Default)]
pub struct AwsEngine;

/// Root credentials written to `<path>/config/root`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsSettings {
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub iam_endpoint: Option<String>,
    #[serde(default)]
    pub sts_endpoint: Option<String>,
}

impl AwsSettings {
    fn is_configured(&self) -> bool {
        self.access_key.is_some()
            || self.region.is_some()
            || self.iam_endpoint.is_some()
            || self.sts_endpoint.is_some()
    }
}

#[async_trait]
impl SecondaryConfig for AwsSettings {
    async fn write(&self, client: &VaultClient, mount_path: &str) -> Result<(), VaultError> {
        let mut body = Map::new();
        put_opt(&mut body, "access_key", &self.access_key);
        put_opt(&mut body, "secret_key", &self.secret_key);
        put_opt(&mut body, "region", &self.region);
        put_opt(&mut body, "iam_endpoint", &self.iam_endpoint);
        put_opt(&mut body, "sts_endpoint", &self.sts_endpoint);
        info!("Writing AWS root config for {}", mount_path);
        client
            .write(&format!("{}/config/root", mount_path), Value::Object(body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Engine for AwsEngine {
    const TYPE_NAME: &'static str = "vault_aws_secret_backend";
    const ENGINE_TYPE: Option<&'static str> = Some("aws");
    const KIND: MountKind = MountKind::Secret;
    type Settings = AwsSettings;

    fn validate(&self, settings: &AwsSettings, diags: &mut Diagnostics) {
        if settings.access_key.is_some() != settings.secret_key.is_some() {
            diags.error(
                "secret_key",
                "access_key and secret_key must be set together",
            );
        }
    }

    fn secondary<'a>(&self, settings: &'a AwsSettings) -> Option<&'a dyn SecondaryConfig> {
        settings
            .is_configured()
            .then_some(settings as &dyn SecondaryConfig)
    }

    async fn read_settings(
        &self,
        client: &VaultClient,
        live: &MountInfo,
        prior: &AwsSettings,
    ) -> Result<AwsSettings, VaultError> {
        let resp = client.read(&format!("{}/config/root", live.path)).await?;
        let Some(data) = resp.as_ref().and_then(response_data) else {
            return Ok(prior.clone());
        };
        Ok(AwsSettings {
            access_key: non_empty_field(data, "access_key"),
            secret_key: prior.secret_key.clone(),
            region: non_empty_field(data, "region"),
            iam_endpoint: non_empty_field(data, "iam_endpoint"),
            sts_endpoint: non_empty_field(data, "sts_endpoint"),
        })
    }
}

pub type AwsSecretBackend = MountResource<AwsEngine>;

/// Consul cannot be remounted with its access config intact, so it moves by
/// mounting the new path and dropping the old one.
#[derive(Debug, Default)]
pub struct ConsulEngine;

/// Access settings written to `<path>/config/access`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsulSettings {
    pub address: String,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub ca_cert: Option<String>,
}

#[async_trait]
impl SecondaryConfig for ConsulSettings {
    async fn write(&self, client: &VaultClient, mount_path: &str) -> Result<(), VaultError> {
        let mut body = Map::new();
        body.insert("address".to_string(), Value::String(self.address.clone()));
        put_opt(&mut body, "scheme", &self.scheme);
        put_opt(&mut body, "token", &self.token);
        put_opt(&mut body, "ca_cert", &self.ca_cert);
        info!("Writing Consul access config for {}", mount_path);
        client
            .write(&format!("{}/config/access", mount_path), Value::Object(body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Engine for ConsulEngine {
    const TYPE_NAME: &'static str = "vault_consul_secret_backend";
    const ENGINE_TYPE: Option<&'static str> = Some("consul");
    const KIND: MountKind = MountKind::Secret;
    const MIGRATION: Migration = Migration::Recreate;
    type Settings = ConsulSettings;

    fn validate(&self, settings: &ConsulSettings, diags: &mut Diagnostics) {
        if settings.address.trim().is_empty() {
            diags.error("address", "address must not be empty");
        }
        if let Some(scheme) = settings.scheme.as_deref() {
            if scheme != "http" && scheme != "https" {
                diags.error("scheme", "scheme must be http or https");
            }
        }
    }

    fn secondary<'a>(&self, settings: &'a ConsulSettings) -> Option<&'a dyn SecondaryConfig> {
        Some(settings)
    }

    async fn read_settings(
        &self,
        client: &VaultClient,
        live: &MountInfo,
        prior: &ConsulSettings,
    ) -> Result<ConsulSettings, VaultError> {
        let resp = client.read(&format!("{}/config/access", live.path)).await?;
        let Some(data) = resp.as_ref().and_then(response_data) else {
            return Ok(prior.clone());
        };
        Ok(ConsulSettings {
            address: str_field(data, "address").unwrap_or_else(|| prior.address.clone()),
            scheme: non_empty_field(data, "scheme").or_else(|| prior.scheme.clone()),
            token: prior.token.clone(),
            ca_cert: prior.ca_cert.clone(),
        })
    }
}

pub type ConsulSecretBackend = MountResource<ConsulEngine>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::Resource;
    use crate::resources::mount::MountData;
    use serde_json::json;

    #[test]
    fn test_kv_version_becomes_mount_option() {
        let resource = KvSecretBackend::default();
        let config: MountData<KvSettings> =
            serde_json::from_value(json!({"path": "secret", "version": 2})).unwrap();
        let spec = resource.spec(&config);
        assert_eq!(spec.engine_type, "kv");
        assert_eq!(spec.options["version"], "2");
    }

    #[test]
    fn test_kv_rejects_unknown_version() {
        let resource = KvSecretBackend::default();
        let config: MountData<KvSettings> =
            serde_json::from_value(json!({"path": "secret", "version": 3})).unwrap();
        let mut diags = Diagnostics::new();
        resource.validate(&config, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_fixed_engine_rejects_other_type() {
        let resource = PkiSecretBackend::default();
        let config: MountData<NoSettings> =
            serde_json::from_value(json!({"path": "pki", "type": "kv"})).unwrap();
        let mut diags = Diagnostics::new();
        resource.validate(&config, &mut diags);
        assert!(diags.to_string().contains("pki engine"));
    }

    #[test]
    fn test_aws_secondary_only_when_configured() {
        let engine = AwsEngine;
        assert!(engine.secondary(&AwsSettings::default()).is_none());
        let settings = AwsSettings {
            region: Some("eu-west-1".into()),
            ..Default::default()
        };
        assert!(engine.secondary(&settings).is_some());

        let mut diags = Diagnostics::new();
        engine.validate(
            &AwsSettings {
                access_key: Some("AKIA".into()),
                ..Default::default()
            },
            &mut diags,
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_consul_uses_recreate() {
        assert_eq!(ConsulEngine::MIGRATION, Migration::Recreate);
        assert_eq!(AwsEngine::MIGRATION, Migration::Remount);
    }
}
