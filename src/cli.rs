use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::interface::{DynamicResource, PlanAction, ResourceState};
use crate::provider::env::set_scoped;
use crate::provider::{resolve_token, Environment, ProviderConfig, VaultProvider};
use crate::vault::sys::{self, MountKind};

#[derive(Parser)]
#[command(
    name = "vault-provider",
    about = "Declarative Vault provider harness (plan, apply, read, import, destroy)",
    version
)]
pub struct Cli {
    /// Provider configuration file (JSON). Environment variables fill in
    /// whatever it leaves out.
    #[arg(long, global = true, env = "VAULT_PROVIDER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the resource and data source types.
    Resources,
    /// Show where the Vault token would be taken from.
    TokenSource,
    /// List secret engine and auth method mounts.
    Mounts,
    /// Show what applying a resource config would do.
    Plan {
        #[arg(long = "type")]
        type_name: String,
        /// Resource config file (JSON).
        #[arg(long)]
        resource: PathBuf,
        /// State file from a previous apply.
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Create or update a resource and write its state.
    Apply {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        resource: PathBuf,
        #[arg(long)]
        state: PathBuf,
    },
    /// Refresh a resource's state from Vault.
    Read {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        state: PathBuf,
    },
    /// Adopt an existing Vault object by id and write its state.
    Import {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        state: PathBuf,
    },
    /// Delete a resource and its state file.
    Destroy {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        state: PathBuf,
    },
    /// Evaluate a data source.
    Data {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        query: PathBuf,
    },
}

fn read_json(path: &Path) -> Result<Value> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<ProviderConfig> {
    match path {
        Some(path) => {
            let contents =
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            ProviderConfig::from_json(&contents)
                .with_context(|| format!("parsing provider config {}", path.display()))
        }
        None => Ok(ProviderConfig::default()),
    }
}

fn load_state(path: &Path) -> Result<Option<ResourceState>> {
    if !path.exists() {
        return Ok(None);
    }
    let value = read_json(path)?;
    let state = serde_json::from_value(value)
        .with_context(|| format!("decoding state {}", path.display()))?;
    Ok(Some(state))
}

fn save_state(path: &Path, state: &ResourceState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!("State written to {}", path.display());
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let env = Environment::from_process();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Resources => {
            let mut resources: Vec<_> = crate::resources::registry().into_keys().collect();
            let mut data_sources: Vec<_> = crate::data_sources::registry().into_keys().collect();
            resources.sort_unstable();
            data_sources.sort_unstable();
            println!("Resources:");
            for name in resources {
                println!("  {}", name);
            }
            println!("Data sources:");
            for name in data_sources {
                println!("  {}", name);
            }
        }

        Commands::TokenSource => {
            let _addr_guard = match (config.add_address_to_env, config.address.as_deref()) {
                (true, Some(addr)) => Some(set_scoped("VAULT_ADDR", addr)),
                _ => None,
            };
            let resolved = resolve_token(config.token.as_deref(), &env).await?;
            println!("{}", resolved.source);
        }

        Commands::Mounts => {
            let provider = VaultProvider::configure(&config, &env).await?;
            let client = &provider.context().client;
            let (secrets, auths) = futures::try_join!(
                sys::list_mounts(client, MountKind::Secret),
                sys::list_mounts(client, MountKind::Auth),
            )?;
            for (label, mounts) in [("secret", secrets), ("auth", auths)] {
                let mut mounts: Vec<_> = mounts.into_values().collect();
                mounts.sort_by(|a, b| a.path.cmp(&b.path));
                for mount in mounts {
                    println!("{:<7} {:<30} {:<12} {}", label, mount.path, mount.engine_type, mount.accessor);
                }
            }
        }

        Commands::Plan {
            type_name,
            resource,
            state,
        } => {
            // Planning is offline; no client is resolved.
            let resources = crate::resources::registry();
            let handler = resources
                .get(type_name.as_str())
                .ok_or_else(|| anyhow!("unknown resource type {}", type_name))?;
            let desired = read_json(&resource)?;
            let prior = match state {
                Some(path) => load_state(&path)?,
                None => None,
            };
            let plan = handler.plan(prior.as_ref(), &desired)?;
            print_json(&plan)?;
        }

        Commands::Apply {
            type_name,
            resource,
            state,
        } => {
            let provider = VaultProvider::configure(&config, &env).await?;
            let desired = read_json(&resource)?;
            let prior = match load_state(&state)? {
                Some(prior) => provider.read(&type_name, &prior).await?,
                None => None,
            };
            let plan = provider.plan(&type_name, prior.as_ref(), &desired)?;
            if plan.diagnostics.has_errors() {
                return Err(anyhow!("invalid {} config: {}", type_name, plan.diagnostics));
            }
            if !plan.diagnostics.is_empty() {
                warn!("{}", plan.diagnostics);
            }
            let new_state = match (plan.action, prior) {
                (PlanAction::NoOp, Some(prior)) => {
                    info!("{} {} is up to date", type_name, prior.id);
                    prior
                }
                (_, Some(prior)) => provider.update(&type_name, &prior, &desired).await?,
                (_, None) => provider.create(&type_name, &desired).await?,
            };
            save_state(&state, &new_state)?;
            print_json(&new_state)?;
        }

        Commands::Read { type_name, state } => {
            let provider = VaultProvider::configure(&config, &env).await?;
            let prior = load_state(&state)?
                .ok_or_else(|| anyhow!("no state at {}", state.display()))?;
            match provider.read(&type_name, &prior).await? {
                Some(current) => {
                    save_state(&state, &current)?;
                    print_json(&current)?;
                }
                None => {
                    warn!("{} {} no longer exists in Vault", type_name, prior.id);
                    fs::remove_file(&state)
                        .with_context(|| format!("removing {}", state.display()))?;
                }
            }
        }

        Commands::Import {
            type_name,
            id,
            state,
        } => {
            let provider = VaultProvider::configure(&config, &env).await?;
            let imported = provider
                .import(&type_name, &id)
                .await?
                .ok_or_else(|| anyhow!("{} {} not found", type_name, id))?;
            save_state(&state, &imported)?;
            print_json(&imported)?;
        }

        Commands::Destroy { type_name, state } => {
            let provider = VaultProvider::configure(&config, &env).await?;
            let prior = load_state(&state)?
                .ok_or_else(|| anyhow!("no state at {}", state.display()))?;
            provider.delete(&type_name, &prior).await?;
            fs::remove_file(&state).with_context(|| format!("removing {}", state.display()))?;
        }

        Commands::Data { type_name, query } => {
            let provider = VaultProvider::configure(&config, &env).await?;
            let query = read_json(&query)?;
            let result = provider.read_data_source(&type_name, &query).await?;
            print_json(&result)?;
        }
    }
    Ok(())
}
