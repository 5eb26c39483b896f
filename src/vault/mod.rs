//! Vault module for the vault-provider library
//!
//! This module implements the HTTP-level interaction with HashiCorp Vault:
//! logical reads and writes, the mount table, auth logins and transit calls.
//! Nothing in here knows about resources or provider configuration; the
//! `resources` and `provider` modules build on top of it.
//!
//! ## Testing strategy:
//! - Each module contains its own unit tests within a `#[cfg(test)] mod tests` block
//! - HTTP behavior is tested against a `wiremock` server standing in for Vault
//! - Tests against a real dev-mode Vault live in `tests/integration.rs`

pub mod auth;
pub mod client;
pub mod common;
pub mod error;
pub mod mount;
pub mod sys;
pub mod transit;

// Re-export key types for convenience
pub use client::{TlsSettings, VaultClient};
pub use error::VaultError;
pub use mount::{Migration, MountChange, MountOutcome, MountSpec, SecondaryConfig};
pub use sys::{MountInfo, MountKind, RemountOptions};
