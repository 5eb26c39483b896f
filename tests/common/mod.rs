//! Shared fixtures for the integration tests.
//!
//! Most tests run against a `wiremock` server standing in for Vault. The
//! tests in `integration.rs` start a dev-mode Vault container instead and
//! only run when `VAULT_PROVIDER_RUN_INTEGRATION_TESTS` is set.

use serde_json::{json, Value};
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use vault_provider::{ProviderContext, VaultClient};
use wiremock::MockServer;

/// Set up logging for tests
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// A mock Vault and a context with a client pointed at it.
#[allow(dead_code)]
pub async fn mock_vault() -> (MockServer, ProviderContext) {
    init_logging();
    let server = MockServer::start().await;
    let client = VaultClient::new(&server.uri(), Some("root")).unwrap();
    (server, ProviderContext::new(client))
}

/// A mount table entry as `sys/mounts` and `sys/auth` report it.
#[allow(dead_code)]
pub fn mount_entry(engine_type: &str, accessor: &str, options: Value) -> Value {
    json!({
        "type": engine_type,
        "description": "",
        "accessor": accessor,
        "local": false,
        "seal_wrap": false,
        "config": {"default_lease_ttl": 0, "max_lease_ttl": 0},
        "options": options,
    })
}

/// Wraps mount entries in a `sys/mounts` response body.
#[allow(dead_code)]
pub fn mount_table(entries: &[(&str, Value)]) -> Value {
    let data: serde_json::Map<String, Value> = entries
        .iter()
        .map(|(path, entry)| (format!("{}/", path.trim_matches('/')), entry.clone()))
        .collect();
    json!({ "data": data })
}

#[allow(dead_code)]
pub fn integration_enabled() -> bool {
    std::env::var("VAULT_PROVIDER_RUN_INTEGRATION_TESTS").is_ok()
}

/// A dev-mode Vault with root token `root`.
#[allow(dead_code)]
pub struct VaultFixture {
    _container: ContainerAsync<GenericImage>,
    pub addr: String,
}

#[allow(dead_code)]
impl VaultFixture {
    pub async fn start() -> Self {
        let container = GenericImage::new("hashicorp/vault", "1.18.4")
            .with_exposed_port(8200.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Vault server started!"))
            .with_env_var("VAULT_DEV_ROOT_TOKEN_ID", "root")
            .with_env_var("VAULT_DEV_LISTEN_ADDRESS", "0.0.0.0:8200")
            .with_cmd(vec!["server", "-dev", "-dev-root-token-id=root"])
            .start()
            .await
            .unwrap();
        let port = container.get_host_port_ipv4(8200).await.unwrap();
        VaultFixture {
            _container: container,
            addr: format!("http://127.0.0.1:{}", port),
        }
    }

    pub fn client(&self) -> VaultClient {
        VaultClient::new(&self.addr, Some("root")).unwrap()
    }
}
