//! Mount reconciliation.
//!
//! Decides whether a desired mount needs to be created, tuned, moved or
//! replaced, and performs the Vault calls for it. Engines that write
//! configuration under their mount right after enabling it pass a
//! [`SecondaryConfig`]; when that write fails the mount change is undone so
//! Vault's mount table looks the way it did before the operation.

use crate::vault::sys::{self, EnableMount, MountInfo, MountKind, RemountOptions, TuneMount};
use crate::vault::{VaultClient, VaultError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, warn};

/// Desired state of a mount.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MountSpec {
    pub path: String,
    #[serde(rename = "type")]
    pub engine_type: String,
    #[serde(default)]
    pub kind: MountKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_lease_ttl: u64,
    #[serde(default)]
    pub max_lease_ttl: u64,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub seal_wrap: bool,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl MountSpec {
    pub fn new(kind: MountKind, path: &str, engine_type: &str) -> Self {
        Self {
            path: path.trim_matches('/').to_string(),
            engine_type: engine_type.to_string(),
            kind,
            ..Default::default()
        }
    }

    fn enable_params(&self) -> EnableMount {
        EnableMount {
            engine_type: self.engine_type.clone(),
            description: self.description.clone(),
            local: self.local,
            seal_wrap: self.seal_wrap,
            default_lease_ttl: self.default_lease_ttl,
            max_lease_ttl: self.max_lease_ttl,
            options: self.options.clone(),
        }
    }

    fn tune_params(&self) -> TuneMount {
        TuneMount {
            description: self.description.clone(),
            default_lease_ttl: self.default_lease_ttl,
            max_lease_ttl: self.max_lease_ttl,
            options: self.options.clone(),
        }
    }

    /// True when a tunable field differs from what Vault reports. Options
    /// that are not part of the desired spec are ignored; Vault adds its own.
    pub fn needs_tune(&self, live: &MountInfo) -> bool {
        self.description != live.description
            || self.default_lease_ttl != live.default_lease_ttl
            || self.max_lease_ttl != live.max_lease_ttl
            || self
                .options
                .iter()
                .any(|(k, v)| live.options.get(k) != Some(v))
    }

    /// Copies the live mount metadata into this spec.
    pub fn merge_live(&mut self, live: &MountInfo) {
        self.engine_type = live.engine_type.clone();
        self.description = live.description.clone();
        self.default_lease_ttl = live.default_lease_ttl;
        self.max_lease_ttl = live.max_lease_ttl;
        self.local = live.local;
        self.seal_wrap = live.seal_wrap;
        for (k, v) in self.options.iter_mut() {
            if let Some(live_value) = live.options.get(k) {
                *v = live_value.clone();
            }
        }
    }
}

/// What [`ensure_mount`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Created,
    Tuned,
    Unchanged,
}

/// How a mount is moved to a new path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Migration {
    /// `sys/remount`: data is kept.
    Remount,
    /// Mount the new path, configure it, then unmount the old one. Engine
    /// state that is not rewritten by the secondary config is lost.
    Recreate,
}

/// Classification of a change between prior and desired mount specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountChange {
    None,
    Tune,
    Migrate,
    /// The listed attributes cannot be changed in place.
    Replace(Vec<&'static str>),
}

/// Configuration an engine writes under its mount after enabling it.
#[async_trait]
pub trait SecondaryConfig: Send + Sync {
    async fn write(&self, client: &VaultClient, mount_path: &str) -> Result<(), VaultError>;
}

/// Compares prior and desired specs. Path changes are taken from this diff,
/// never by looking at Vault.
pub fn plan_mount_change(prior: &MountSpec, desired: &MountSpec) -> MountChange {
    let mut replace = Vec::new();
    if prior.engine_type != desired.engine_type {
        replace.push("type");
    }
    if prior.local != desired.local {
        replace.push("local");
    }
    if prior.seal_wrap != desired.seal_wrap {
        replace.push("seal_wrap");
    }
    if prior.kind != desired.kind {
        replace.push("kind");
    }
    if !replace.is_empty() {
        return MountChange::Replace(replace);
    }

    if prior.path.trim_matches('/') != desired.path.trim_matches('/') {
        return MountChange::Migrate;
    }

    if prior.description != desired.description
        || prior.default_lease_ttl != desired.default_lease_ttl
        || prior.max_lease_ttl != desired.max_lease_ttl
        || prior.options != desired.options
    {
        return MountChange::Tune;
    }
    MountChange::None
}

/// Makes the mount at `desired.path` match `desired`, given the current
/// mount table. Calling this again with the same spec issues no writes.
pub async fn ensure_mount(
    client: &VaultClient,
    desired: &MountSpec,
    current: &HashMap<String, MountInfo>,
) -> Result<MountOutcome, VaultError> {
    let path = desired.path.trim_matches('/');
    match current.get(path) {
        None => {
            sys::enable(client, desired.kind, path, &desired.enable_params()).await?;
            Ok(MountOutcome::Created)
        }
        Some(live) if live.engine_type != desired.engine_type => {
            Err(VaultError::MountTypeMismatch {
                path: path.to_string(),
                expected: desired.engine_type.clone(),
                actual: live.engine_type.clone(),
            })
        }
        Some(live) if desired.needs_tune(live) => {
            sys::tune(client, desired.kind, path, &desired.tune_params()).await?;
            Ok(MountOutcome::Tuned)
        }
        Some(_) => Ok(MountOutcome::Unchanged),
    }
}

/// Reads a mount. `None` means it was removed out of band.
pub async fn read_mount(
    client: &VaultClient,
    kind: MountKind,
    path: &str,
) -> Result<Option<MountInfo>, VaultError> {
    sys::get_mount(client, kind, path).await
}

/// Creates a mount and writes its secondary configuration. If the
/// configuration write fails a freshly created mount is removed again.
pub async fn create_mount(
    client: &VaultClient,
    desired: &MountSpec,
    secondary: Option<&dyn SecondaryConfig>,
) -> Result<MountOutcome, VaultError> {
    let current = sys::list_mounts(client, desired.kind).await?;
    let outcome = ensure_mount(client, desired, &current).await?;

    if let Some(config) = secondary {
        if let Err(cause) = config.write(client, &desired.path).await {
            if outcome != MountOutcome::Created {
                return Err(cause);
            }
            warn!(
                "Configuring {} failed, removing the new mount: {}",
                desired.path, cause
            );
            return Err(rollback(
                &desired.path,
                cause,
                sys::disable(client, desired.kind, &desired.path).await,
            ));
        }
    }
    Ok(outcome)
}

/// Moves a mount from `prior.path` to `desired.path`.
pub async fn migrate_mount(
    client: &VaultClient,
    prior: &MountSpec,
    desired: &MountSpec,
    strategy: Migration,
    secondary: Option<&dyn SecondaryConfig>,
    opts: RemountOptions,
) -> Result<(), VaultError> {
    info!(
        "Migrating mount {} to {} ({:?})",
        prior.path, desired.path, strategy
    );
    match strategy {
        Migration::Remount => {
            sys::remount(client, desired.kind, &prior.path, &desired.path, opts).await?;
            let tuned = match retune_moved(client, desired).await {
                Ok(outcome) => outcome == MountOutcome::Tuned,
                Err(cause) => {
                    warn!(
                        "Tuning {} failed, moving the mount back to {}: {}",
                        desired.path, prior.path, cause
                    );
                    let undo = undo_remount(client, prior, desired, false, opts).await;
                    return Err(rollback(&desired.path, cause, undo));
                }
            };

            if let Some(config) = secondary {
                if let Err(cause) = config.write(client, &desired.path).await {
                    warn!(
                        "Configuring {} failed, moving the mount back to {}: {}",
                        desired.path, prior.path, cause
                    );
                    let undo = undo_remount(client, prior, desired, tuned, opts).await;
                    return Err(rollback(&desired.path, cause, undo));
                }
            }
            Ok(())
        }
        Migration::Recreate => {
            sys::enable(client, desired.kind, &desired.path, &desired.enable_params()).await?;

            if let Some(config) = secondary {
                if let Err(cause) = config.write(client, &desired.path).await {
                    warn!(
                        "Configuring {} failed, removing the new mount: {}",
                        desired.path, cause
                    );
                    return Err(rollback(
                        &desired.path,
                        cause,
                        sys::disable(client, desired.kind, &desired.path).await,
                    ));
                }
            }
            sys::disable(client, prior.kind, &prior.path).await
        }
    }
}

async fn retune_moved(client: &VaultClient, desired: &MountSpec) -> Result<MountOutcome, VaultError> {
    let current = sys::list_mounts(client, desired.kind).await?;
    ensure_mount(client, desired, &current).await
}

/// Puts a remounted mount back at `prior.path`, restoring the prior tunable
/// settings first when they were changed after the move.
async fn undo_remount(
    client: &VaultClient,
    prior: &MountSpec,
    desired: &MountSpec,
    tuned: bool,
    opts: RemountOptions,
) -> Result<(), VaultError> {
    if tuned {
        sys::tune(client, desired.kind, &desired.path, &prior.tune_params()).await?;
    }
    sys::remount(client, desired.kind, &desired.path, &prior.path, opts).await
}

/// Brings the mount from `prior` to `desired`, whatever kind of change that
/// is. Secondary config is rewritten after a replace or migration.
pub async fn update_mount(
    client: &VaultClient,
    prior: &MountSpec,
    desired: &MountSpec,
    strategy: Migration,
    secondary: Option<&dyn SecondaryConfig>,
    opts: RemountOptions,
) -> Result<MountChange, VaultError> {
    let change = plan_mount_change(prior, desired);
    match &change {
        MountChange::None => {}
        MountChange::Tune => {
            let current = sys::list_mounts(client, desired.kind).await?;
            ensure_mount(client, desired, &current).await?;
        }
        MountChange::Migrate => {
            migrate_mount(client, prior, desired, strategy, secondary, opts).await?;
        }
        MountChange::Replace(attrs) => {
            info!("Replacing mount {} ({} changed)", prior.path, attrs.join(", "));
            sys::disable(client, prior.kind, &prior.path).await?;
            create_mount(client, desired, secondary).await?;
        }
    }
    Ok(change)
}

/// Removes a mount.
pub async fn delete_mount(client: &VaultClient, spec: &MountSpec) -> Result<(), VaultError> {
    sys::disable(client, spec.kind, &spec.path).await
}

fn rollback(path: &str, cause: VaultError, undo: Result<(), VaultError>) -> VaultError {
    match undo {
        Ok(()) => cause,
        Err(compensation) => {
            error!(
                "Rollback of {} failed, Vault state may be inconsistent: {}",
                path, compensation
            );
            VaultError::Inconsistent {
                path: path.to_string(),
                cause: Box::new(cause),
                compensation: Box::new(compensation),
            }
        }
    }
}
