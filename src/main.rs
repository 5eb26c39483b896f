// src/main.rs
use vault_provider::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vault_provider::init_logging();
    cli::run_cli().await
}
