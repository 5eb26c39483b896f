/// Errors returned by the Vault HTTP layer and the mount reconciler.
///
/// Every variant carries the Vault path that failed so the message can be
/// surfaced to the user unchanged.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("error on {path}: HTTP status {status}: {}", .errors.join(", "))]
    Api {
        path: String,
        status: u16,
        errors: Vec<String>,
    },

    #[error("network error on {path}: {message}")]
    Network { path: String, message: String },

    #[error("failed to parse response from {path}: {message}")]
    Parse { path: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("path {path} is already mounted with type {actual}, expected {expected}")]
    MountTypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("remount of {from} to {to} failed: {message}")]
    RemountFailed {
        from: String,
        to: String,
        message: String,
    },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error(
        "failed to configure {path}: {cause}; rollback also failed: {compensation}. \
         Vault state may now be inconsistent with Terraform state"
    )]
    Inconsistent {
        path: String,
        cause: Box<VaultError>,
        compensation: Box<VaultError>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            VaultError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when Vault answered but the object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
