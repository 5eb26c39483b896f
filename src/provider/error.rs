use crate::diagnostics::Diagnostics;
use crate::vault::transit::BatchInputError;
use crate::vault::VaultError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while configuring the provider or running a resource
/// operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider configuration error: {0}")]
    Config(String),

    #[error("token helper {} failed: {message}", path.display())]
    TokenHelper { path: PathBuf, message: String },

    #[error("failed to read token file {}: {source}", path.display())]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid Vault CLI config {}: {message}", path.display())]
    CliConfig { path: PathBuf, message: String },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("auth login failed: {0}")]
    Login(#[source] VaultError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("validation failed: {0}")]
    Validation(Diagnostics),

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no data found at {0}")]
    NotFound(String),

    #[error("unknown {kind} type {name}")]
    UnknownResource { kind: &'static str, name: String },

    #[error(transparent)]
    BatchInput(#[from] BatchInputError),
}

impl ProviderError {
    pub fn decode(what: impl Into<String>, source: serde_json::Error) -> Self {
        ProviderError::Decode {
            what: what.into(),
            source,
        }
    }
}
