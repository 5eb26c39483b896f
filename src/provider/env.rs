//! Snapshot of the process environment used during resolution.
//!
//! Resolution reads environment variables and the home directory through an
//! [`Environment`] value instead of the process globals, so tests can build
//! one by hand.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
}

impl Environment {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
            home: dirs::home_dir(),
        }
    }

    /// An environment with no variables and no home directory.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Returns a variable's value. Unset and whitespace-only values are
    /// treated alike.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Parses a boolean flag the way the Vault CLI does: `1`, `true`, `t`
    /// and `yes` are true.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.var(key).map(|v| {
            matches!(
                v.to_ascii_lowercase().as_str(),
                "1" | "true" | "t" | "yes" | "y"
            )
        })
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }
}

type RestoreVar = (String, Option<String>);

/// Sets a process environment variable until the returned guard is dropped,
/// then restores the previous value.
pub fn set_scoped(
    key: &str,
    value: &str,
) -> scopeguard::ScopeGuard<RestoreVar, impl FnOnce(RestoreVar)> {
    let previous = std::env::var(key).ok();
    std::env::set_var(key, value);
    scopeguard::guard((key.to_string(), previous), |(key, previous)| match previous {
        Some(value) => std::env::set_var(&key, value),
        None => std::env::remove_var(&key),
    })
}
