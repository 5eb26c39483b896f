//! Mount table operations (`sys/mounts`, `sys/auth`, `sys/remount`).
//!
//! Secret engines and auth methods are managed through two parallel sets of
//! endpoints. [`MountKind`] selects the right one so callers can treat both
//! the same way.

use crate::vault::common::{bool_field, response_data, str_field, trim_path, u64_field};
use crate::vault::{VaultClient, VaultError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

/// Whether a mount holds a secret engine or an auth method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MountKind {
    #[default]
    Secret,
    Auth,
}

impl MountKind {
    fn table(self) -> &'static str {
        match self {
            MountKind::Secret => "sys/mounts",
            MountKind::Auth => "sys/auth",
        }
    }

    /// Path of the mount as seen from the root of the logical namespace.
    pub fn logical_path(self, path: &str) -> String {
        match self {
            MountKind::Secret => trim_path(path),
            MountKind::Auth => format!("auth/{}", trim_path(path)),
        }
    }
}

/// Live metadata of a mount as reported by Vault.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MountInfo {
    pub path: String,
    #[serde(rename = "type")]
    pub engine_type: String,
    pub description: String,
    pub accessor: String,
    pub local: bool,
    pub seal_wrap: bool,
    pub default_lease_ttl: u64,
    pub max_lease_ttl: u64,
    pub options: BTreeMap<String, String>,
}

impl MountInfo {
    fn from_entry(path: &str, entry: &Map<String, Value>) -> Self {
        let config = entry
            .get("config")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let options = entry
            .get("options")
            .and_then(Value::as_object)
            .map(|opts| {
                opts.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        MountInfo {
            path: trim_path(path),
            engine_type: str_field(entry, "type").unwrap_or_default(),
            description: str_field(entry, "description").unwrap_or_default(),
            accessor: str_field(entry, "accessor").unwrap_or_default(),
            local: bool_field(entry, "local"),
            seal_wrap: bool_field(entry, "seal_wrap"),
            default_lease_ttl: u64_field(&config, "default_lease_ttl"),
            max_lease_ttl: u64_field(&config, "max_lease_ttl"),
            options,
        }
    }
}

/// Parameters sent when enabling a mount.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnableMount {
    pub engine_type: String,
    pub description: String,
    pub local: bool,
    pub seal_wrap: bool,
    pub default_lease_ttl: u64,
    pub max_lease_ttl: u64,
    pub options: BTreeMap<String, String>,
}

/// Parameters sent when tuning a mount.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TuneMount {
    pub description: String,
    pub default_lease_ttl: u64,
    pub max_lease_ttl: u64,
    pub options: BTreeMap<String, String>,
}

/// Lists the mounts of one kind keyed by their normalized path.
pub async fn list_mounts(
    client: &VaultClient,
    kind: MountKind,
) -> Result<HashMap<String, MountInfo>, VaultError> {
    let resp = client.read(kind.table()).await?.unwrap_or(Value::Null);
    // Newer servers wrap the table in `data`, older ones only return it at
    // the top level next to request metadata.
    let table = response_data(&resp)
        .or_else(|| resp.as_object())
        .cloned()
        .unwrap_or_default();

    let mounts = table
        .iter()
        .filter_map(|(path, entry)| {
            let entry = entry.as_object()?;
            entry.get("type")?;
            let info = MountInfo::from_entry(path, entry);
            Some((info.path.clone(), info))
        })
        .collect::<HashMap<_, _>>();

    debug!("Found {} {:?} mounts", mounts.len(), kind);
    Ok(mounts)
}

/// Looks up a single mount. `None` means nothing is mounted at `path`.
pub async fn get_mount(
    client: &VaultClient,
    kind: MountKind,
    path: &str,
) -> Result<Option<MountInfo>, VaultError> {
    let mut mounts = list_mounts(client, kind).await?;
    Ok(mounts.remove(&trim_path(path)))
}

/// Enables a secret engine or auth method at `path`.
pub async fn enable(
    client: &VaultClient,
    kind: MountKind,
    path: &str,
    params: &EnableMount,
) -> Result<(), VaultError> {
    let mut config = Map::new();
    if params.default_lease_ttl > 0 {
        config.insert(
            "default_lease_ttl".into(),
            json!(format!("{}s", params.default_lease_ttl)),
        );
    }
    if params.max_lease_ttl > 0 {
        config.insert(
            "max_lease_ttl".into(),
            json!(format!("{}s", params.max_lease_ttl)),
        );
    }

    let body = json!({
        "type": params.engine_type,
        "description": params.description,
        "local": params.local,
        "seal_wrap": params.seal_wrap,
        "config": config,
        "options": params.options,
    });

    let path = trim_path(path);
    info!("Mounting {} engine at {}", params.engine_type, path);
    client
        .write(&format!("{}/{}", kind.table(), path), body)
        .await?;
    Ok(())
}

/// Disables the mount at `path`. Vault deletes all data stored under it.
pub async fn disable(client: &VaultClient, kind: MountKind, path: &str) -> Result<(), VaultError> {
    let path = trim_path(path);
    info!("Unmounting {}", path);
    client.delete(&format!("{}/{}", kind.table(), path)).await
}

/// Updates the tunable settings of a mount.
pub async fn tune(
    client: &VaultClient,
    kind: MountKind,
    path: &str,
    params: &TuneMount,
) -> Result<(), VaultError> {
    let mut body = json!({
        "description": params.description,
        "default_lease_ttl": format!("{}s", params.default_lease_ttl),
        "max_lease_ttl": format!("{}s", params.max_lease_ttl),
    });
    if !params.options.is_empty() {
        body["options"] = json!(params.options);
    }

    let path = trim_path(path);
    info!("Tuning mount {}", path);
    client
        .write(&format!("{}/{}/tune", kind.table(), path), body)
        .await?;
    Ok(())
}

/// Timing used while waiting for a remount to finish.
#[derive(Debug, Clone, Copy)]
pub struct RemountOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for RemountOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Moves a mount, keeping its data. Vault runs the move in the background
/// and hands back a migration ID which is polled until it settles.
pub async fn remount(
    client: &VaultClient,
    kind: MountKind,
    from: &str,
    to: &str,
    opts: RemountOptions,
) -> Result<(), VaultError> {
    let from = kind.logical_path(from);
    let to = kind.logical_path(to);
    info!("Remounting {} to {}", from, to);

    let resp = client
        .write("sys/remount", json!({ "from": from, "to": to }))
        .await?;

    let migration_id = resp.as_ref().and_then(|r| {
        response_data(r)
            .and_then(|d| str_field(d, "migration_id"))
            .or_else(|| r.get("migration_id").and_then(Value::as_str).map(str::to_string))
    });

    // Servers older than 1.10 remount synchronously and return nothing.
    let Some(migration_id) = migration_id else {
        return Ok(());
    };

    let start = Instant::now();
    loop {
        let status = client
            .read(&format!("sys/remount/status/{}", migration_id))
            .await?
            .as_ref()
            .and_then(response_data)
            .and_then(|d| d.get("migration_info"))
            .and_then(|info| info.get("status"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match status.as_deref() {
            Some("success") => {
                info!("Remount {} finished", migration_id);
                return Ok(());
            }
            Some("failure") => {
                return Err(VaultError::RemountFailed {
                    from,
                    to,
                    message: format!("migration {} reported failure", migration_id),
                });
            }
            other => debug!("Remount {} status: {:?}", migration_id, other),
        }

        if start.elapsed() > opts.timeout {
            return Err(VaultError::Timeout(format!("remount {}", migration_id)));
        }
        sleep(opts.poll_interval).await;
    }
}
