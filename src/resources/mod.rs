//! Managed resources and their type-name registry.

pub mod approle_role;
pub mod auth_backends;
pub mod consul_role;
pub mod generic_secret;
pub mod identity;
pub mod kv_secret_v2;
pub mod mount;
pub mod pki_role;
pub mod policy;
pub mod secret_backends;

use crate::interface::DynamicResource;
use crate::vault::common::response_data;
use crate::vault::{VaultClient, VaultError};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Reads `path` and returns the `data` object of the response, if anything
/// is there.
pub(crate) async fn read_data(
    client: &VaultClient,
    path: &str,
) -> Result<Option<Map<String, Value>>, VaultError> {
    Ok(client.read(path).await?.as_ref().and_then(response_data).cloned())
}

fn entry<R: DynamicResource + 'static>(resource: R) -> (&'static str, Box<dyn DynamicResource>) {
    (resource.type_name(), Box::new(resource))
}

/// Every resource type the provider manages.
pub fn registry() -> HashMap<&'static str, Box<dyn DynamicResource>> {
    HashMap::from([
        entry(secret_backends::GenericMount::default()),
        entry(secret_backends::KvSecretBackend::default()),
        entry(secret_backends::PkiSecretBackend::default()),
        entry(secret_backends::TransitSecretBackend::default()),
        entry(secret_backends::AwsSecretBackend::default()),
        entry(secret_backends::ConsulSecretBackend::default()),
        entry(auth_backends::AuthBackend::default()),
        entry(auth_backends::AppRoleAuthBackend::default()),
        entry(auth_backends::KubernetesAuthBackend::default()),
        entry(generic_secret::GenericSecret),
        entry(kv_secret_v2::KvSecretV2),
        entry(policy::Policy),
        entry(approle_role::AppRoleAuthBackendRole),
        entry(pki_role::PkiSecretBackendRole),
        entry(consul_role::ConsulSecretBackendRole),
        entry(identity::Entity),
        entry(identity::EntityAlias),
    ])
}
