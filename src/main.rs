use clap::Parser;
use dca_dapp::cli::{self, Cli, Commands};
use dca_dapp::config::AppConfig;
use dca_dapp::domain::TxKind;
use dca_dapp::error::{DappError, Result};
use dca_dapp::logging::init_logging;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    init_logging(&config.logging);

    // Deploying is how the contract address gets produced in the first place.
    let needs_contract = !matches!(cli.command, Commands::Deploy { .. });
    if let Err(errors) = config.validate(needs_contract) {
        for problem in &errors {
            error!("Invalid configuration: {}", problem);
        }
        return Err(DappError::Other(anyhow::anyhow!(
            "{} configuration problem(s)",
            errors.len()
        )));
    }

    match &cli.command {
        Commands::Status => cli::show_status(&config).await,
        Commands::Invest { amount } => cli::run_flow(&config, TxKind::Invest, amount).await,
        Commands::Purchase { amount } => cli::run_flow(&config, TxKind::Purchase, amount).await,
        Commands::Deploy {
            artifact,
            lock_duration,
        } => cli::run_deploy(&config, artifact, *lock_duration).await,
    }
}
