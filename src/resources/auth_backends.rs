//! Auth method mounts.

use crate::diagnostics::Diagnostics;
use crate::resources::mount::{Engine, MountResource, NoSettings};
use crate::vault::common::{bool_field, response_data, str_field, string_list};
use crate::vault::{MountInfo, MountKind, SecondaryConfig, VaultClient, VaultError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// `vault_auth_backend`: any auth method, named by the `type` attribute.
#[derive(Debug, Default)]
pub struct AnyAuthMethod;

impl Engine for AnyAuthMethod {
    const TYPE_NAME: &'static str = "vault_auth_backend";
    const ENGINE_TYPE: Option<&'static str> = None;
    const KIND: MountKind = MountKind::Auth;
    type Settings = NoSettings;
}

pub type AuthBackend = MountResource<AnyAuthMethod>;

#[derive(Debug, Default)]
pub struct AppRoleMethod;

impl Engine for AppRoleMethod {
    const TYPE_NAME: &'static str = "vault_approle_auth_backend";
    const ENGINE_TYPE: Option<&'static str> = Some("approle");
    const KIND: MountKind = MountKind::Auth;
    type Settings = NoSettings;
}

pub type AppRoleAuthBackend = MountResource<AppRoleMethod>;

#[derive(Debug, Default)]
pub struct KubernetesMethod;

/// Written to `auth/<path>/config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KubernetesSettings {
    pub kubernetes_host: String,
    #[serde(default)]
    pub kubernetes_ca_cert: Option<String>,
    #[serde(default)]
    pub token_reviewer_jwt: Option<String>,
    #[serde(default)]
    pub pem_keys: Vec<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub disable_iss_validation: bool,
    #[serde(default)]
    pub disable_local_ca_jwt: bool,
}

fn config_path(mount_path: &str) -> String {
    format!("{}/config", MountKind::Auth.logical_path(mount_path))
}

#[async_trait]
impl SecondaryConfig for KubernetesSettings {
    async fn write(&self, client: &VaultClient, mount_path: &str) -> Result<(), VaultError> {
        let mut body = json!({
            "kubernetes_host": self.kubernetes_host,
            "pem_keys": self.pem_keys,
            "disable_iss_validation": self.disable_iss_validation,
            "disable_local_ca_jwt": self.disable_local_ca_jwt,
        });
        if let Some(ca) = &self.kubernetes_ca_cert {
            body["kubernetes_ca_cert"] = json!(ca);
        }
        if let Some(jwt) = &self.token_reviewer_jwt {
            body["token_reviewer_jwt"] = json!(jwt);
        }
        if let Some(issuer) = &self.issuer {
            body["issuer"] = json!(issuer);
        }
        let path = config_path(mount_path);
        info!("Writing Kubernetes auth config to {}", path);
        client.write(&path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl Engine for KubernetesMethod {
    const TYPE_NAME: &'static str = "vault_kubernetes_auth_backend";
    const ENGINE_TYPE: Option<&'static str> = Some("kubernetes");
    const KIND: MountKind = MountKind::Auth;
    type Settings = KubernetesSettings;

    fn validate(&self, settings: &KubernetesSettings, diags: &mut Diagnostics) {
        let host = settings.kubernetes_host.trim();
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            diags.error(
                "kubernetes_host",
                "kubernetes_host must be an http or https URL",
            );
        }
    }

    fn secondary<'a>(&self, settings: &'a KubernetesSettings) -> Option<&'a dyn SecondaryConfig> {
        Some(settings)
    }

    async fn read_settings(
        &self,
        client: &VaultClient,
        live: &MountInfo,
        prior: &KubernetesSettings,
    ) -> Result<KubernetesSettings, VaultError> {
        let resp = client.read(&config_path(&live.path)).await?;
        let Some(data) = resp.as_ref().and_then(response_data) else {
            return Ok(prior.clone());
        };
        Ok(KubernetesSettings {
            kubernetes_host: str_field(data, "kubernetes_host").unwrap_or_default(),
            kubernetes_ca_cert: str_field(data, "kubernetes_ca_cert").filter(|c| !c.is_empty()),
            token_reviewer_jwt: prior.token_reviewer_jwt.clone(),
            pem_keys: string_list(data, "pem_keys"),
            issuer: str_field(data, "issuer").filter(|i| !i.is_empty()),
            disable_iss_validation: bool_field(data, "disable_iss_validation"),
            disable_local_ca_jwt: data
                .get("disable_local_ca_jwt")
                .and_then(Value::as_bool)
                .unwrap_or(prior.disable_local_ca_jwt),
        })
    }
}

pub type KubernetesAuthBackend = MountResource<KubernetesMethod>;
