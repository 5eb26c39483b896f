//! Token discovery.
//!
//! The token is taken from the first source that yields a non-empty value:
//! provider config, `VAULT_TOKEN`, the Vault CLI token helper, then the
//! `~/.vault-token` file.

use crate::provider::env::Environment;
use crate::provider::ProviderError;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

pub const TOKEN_FILE_NAME: &str = ".vault-token";
pub const CLI_CONFIG_FILE_NAME: &str = ".vault";

/// Where the token came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Config,
    Environment,
    Helper(PathBuf),
    File(PathBuf),
    None,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Config => write!(f, "provider config"),
            TokenSource::Environment => write!(f, "VAULT_TOKEN"),
            TokenSource::Helper(path) => write!(f, "token helper {}", path.display()),
            TokenSource::File(path) => write!(f, "token file {}", path.display()),
            TokenSource::None => write!(f, "none"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub token: Option<String>,
    pub source: TokenSource,
}

impl std::fmt::Debug for ResolvedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedToken")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .finish()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Walks the token sources in order. The token helper inherits the process
/// environment, so it only sees the resolved address when the caller has
/// exported it as `VAULT_ADDR`.
pub async fn resolve_token(
    config_token: Option<&str>,
    env: &Environment,
) -> Result<ResolvedToken, ProviderError> {
    let resolved = |token: String, source: TokenSource| ResolvedToken {
        token: Some(token),
        source,
    };

    if let Some(token) = config_token.and_then(non_empty) {
        return Ok(resolved(token, TokenSource::Config));
    }
    if let Some(token) = env.var("VAULT_TOKEN").and_then(non_empty) {
        return Ok(resolved(token, TokenSource::Environment));
    }

    if let Some(config_path) = cli_config_path(env) {
        if let Some(helper) = read_token_helper(&config_path)? {
            debug!("Using token helper {}", helper.display());
            if let Some(token) = run_token_helper(&helper).await? {
                return Ok(resolved(token, TokenSource::Helper(helper)));
            }
        }
    }

    if let Some(home) = env.home() {
        let path = home.join(TOKEN_FILE_NAME);
        if let Some(token) = read_token_file(&path)? {
            return Ok(resolved(token, TokenSource::File(path)));
        }
    }

    info!("No Vault token found");
    Ok(ResolvedToken {
        token: None,
        source: TokenSource::None,
    })
}

/// Location of the Vault CLI config: `VAULT_CONFIG_PATH`, else `~/.vault`.
pub fn cli_config_path(env: &Environment) -> Option<PathBuf> {
    env.var("VAULT_CONFIG_PATH")
        .map(PathBuf::from)
        .or_else(|| env.home().map(|home| home.join(CLI_CONFIG_FILE_NAME)))
}

/// Reads the `token_helper` setting from a Vault CLI config file. A missing
/// file means no helper.
pub fn read_token_helper(path: &Path) -> Result<Option<PathBuf>, ProviderError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ProviderError::CliConfig {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };
    parse_token_helper(&contents)
        .map(|helper| helper.map(PathBuf::from))
        .map_err(|message| ProviderError::CliConfig {
            path: path.to_path_buf(),
            message,
        })
}

/// Extracts `token_helper` from CLI config text, either the HCL form
/// `token_helper = "/path"` or the JSON form.
pub fn parse_token_helper(contents: &str) -> Result<Option<String>, String> {
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
        return match value.get("token_helper") {
            None => Ok(None),
            Some(Value::String(s)) => Ok(non_empty(s)),
            Some(other) => Err(format!("token_helper must be a string, got {}", other)),
        };
    }

    let mut helper = None;
    for (number, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("line {}: expected key = value", number + 1));
        };
        if key.trim() != "token_helper" {
            continue;
        }
        let value = value.trim();
        let unquoted = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .ok_or_else(|| format!("line {}: token_helper must be a quoted string", number + 1))?;
        helper = non_empty(unquoted);
    }
    Ok(helper)
}

/// Runs `<helper> get` and returns its trimmed stdout.
pub async fn run_token_helper(helper: &Path) -> Result<Option<String>, ProviderError> {
    let output = Command::new(helper)
        .arg("get")
        .output()
        .await
        .map_err(|e| ProviderError::TokenHelper {
            path: helper.to_path_buf(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ProviderError::TokenHelper {
            path: helper.to_path_buf(),
            message: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(non_empty(&String::from_utf8_lossy(&output.stdout)))
}

/// Reads a token file. A missing file means no token; any other read error
/// is reported.
pub fn read_token_file(path: &Path) -> Result<Option<String>, ProviderError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(non_empty(&contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ProviderError::TokenFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}
