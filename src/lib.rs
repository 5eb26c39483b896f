//! vault-provider - declarative management of HashiCorp Vault
//!
//! This crate resolves provider configuration into an authenticated Vault
//! client, reconciles secret engine and auth method mounts, and exposes
//! create/read/update/delete/import handlers for Vault objects keyed by a
//! resource type name.
//!
//! ## Architecture
//!
//! The crate is layered, each layer only calling the ones below it:
//!
//! - `cli` module - command-line harness (uses `provider`)
//! - `provider` module - configuration, token resolution and the registry
//! - `resources` / `data_sources` modules - one handler per type name
//! - `interface` module - the traits and context handlers are written against
//! - `vault` module - HTTP-level Vault calls and the mount reconciler
//!
//! Handlers never build their own clients; they receive a
//! [`ProviderContext`] holding the resolved client and the per-path lock
//! registry.

pub mod cli;
pub mod data_sources;
pub mod diagnostics;
pub mod interface;
pub mod locks;
pub mod provider;
pub mod resources;
pub mod vault;

// Re-export public types for convenience
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use interface::{DataSource, Plan, PlanAction, ProviderContext, Resource, ResourceState};
pub use locks::PathLocks;
pub use provider::{Environment, ProviderConfig, ProviderError, VaultProvider};
pub use vault::{VaultClient, VaultError};

/// Initialize logging for the application.
///
/// Honors `RUST_LOG` and falls back to `info`. Safe to call more than once.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
