use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::config::AppConfig;
use crate::connection::ConnectionManager;
use crate::contract::AlloyDcaContract;
use crate::deploy::{self, DeployPlan};
use crate::domain::TxKind;
use crate::error::{DappError, Result};
use crate::orchestrator::{FlowOutcome, OrchestratorConfig, TransactionOrchestrator};
use crate::wallet::{local, LocalKeyConnector, SignerHandle};

#[derive(Parser)]
#[command(name = "dca")]
#[command(version = "0.1.0")]
#[command(about = "ETH-DCA strategy client: invest, purchase and deploy", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect the wallet and show the session
    Status,
    /// Approve and invest deposit tokens into the strategy
    Invest {
        /// Amount in whole tokens (e.g. 1.5)
        amount: String,
    },
    /// Purchase ETH with pooled deposits (contract owner)
    Purchase {
        /// Amount in whole tokens; 0 does nothing
        amount: String,
    },
    /// Deploy the DCA contract from a compiled artifact
    Deploy {
        /// Path to the compiled contract artifact JSON
        #[arg(short, long)]
        artifact: PathBuf,
        /// Override the lock duration in seconds
        #[arg(long)]
        lock_duration: Option<u64>,
    },
}

fn rpc_url(config: &AppConfig) -> Result<Url> {
    Url::parse(&config.network.rpc_url)
        .map_err(|e| DappError::AddressParsing(format!("Invalid RPC URL: {}", e)))
}

fn connection_manager(config: &AppConfig) -> Result<Arc<ConnectionManager>> {
    let connector = LocalKeyConnector::new(rpc_url(config)?, config.network.chain_poll_interval());
    Ok(Arc::new(ConnectionManager::new(
        Arc::new(connector),
        config.network.chain_id,
    )))
}

/// Connect and print the resulting session.
pub async fn show_status(config: &AppConfig) -> Result<()> {
    let connection = connection_manager(config)?;
    let result = connection.connect().await;

    let session = connection.session().await;
    println!("\n=== Wallet Session ===");
    println!("Status:   {}", session.status());
    if let Some(chain_id) = session.network_id() {
        println!("Chain:    {} (required {})", chain_id, connection.required_chain_id());
    }
    if let Some(signer) = session.signer() {
        println!("Account:  {}", signer.account());
    }
    println!("Contract: {}", config.contract.address);

    result
}

/// Connect, run one flow and print how it ended.
pub async fn run_flow(config: &AppConfig, kind: TxKind, amount: &str) -> Result<()> {
    let connection = connection_manager(config)?;
    connection.connect().await?;

    let contract = AlloyDcaContract::new(config.contract.address, rpc_url(config)?);
    let orchestrator = TransactionOrchestrator::new(
        connection,
        Arc::new(contract),
        OrchestratorConfig {
            contract_address: config.contract.address,
            token_decimals: config.contract.token_decimals,
            confirmation_timeout: config.transactions.confirmation_timeout(),
        },
    );

    let flow = async {
        match kind {
            TxKind::Purchase => orchestrator.purchase(amount).await,
            _ => orchestrator.invest(amount).await,
        }
    };

    let outcome = tokio::select! {
        outcome = flow => outcome,
        _ = tokio::signal::ctrl_c() => {
            let phase = orchestrator
                .phase(kind)
                .map(|p| p.to_string())
                .unwrap_or_else(|| "IDLE".to_string());
            println!("\nInterrupted in phase {}.", phase);
            println!("Anything already broadcast will still be mined; check the explorer.");
            return Ok(());
        }
    };

    let decimals = config.contract.token_decimals;
    match outcome {
        Ok(FlowOutcome::Skipped) => {
            println!("Amount is zero, nothing submitted.");
            Ok(())
        }
        Ok(FlowOutcome::Confirmed(report)) => {
            println!("\n=== {} confirmed ===", report.kind);
            println!("Amount: {}", report.amount.format_units(decimals));
            if let Some(approval) = &report.approval {
                println!("Approve tx: {}", approval.tx_hash);
            }
            println!("Tx:     {}", report.confirmation.tx_hash);
            if let Some(block) = report.confirmation.block_number {
                println!("Block:  {}", block);
            }
            for transition in &report.transitions {
                println!(
                    "  {} {} -> {}",
                    transition.timestamp.format("%H:%M:%S"),
                    transition.from,
                    transition.to
                );
            }
            Ok(())
        }
        Err(e) => {
            println!("\x1b[31m✗ {}\x1b[0m", e);
            println!("Next step: {:?}", e.category());
            Err(e)
        }
    }
}

/// Deploy the contract with the configured constructor args.
pub async fn run_deploy(
    config: &AppConfig,
    artifact: &Path,
    lock_duration: Option<u64>,
) -> Result<()> {
    let mut deploy_config = config.deploy.clone();
    if let Some(secs) = lock_duration {
        deploy_config.lock_duration_secs = secs;
    }

    let plan = DeployPlan::from_artifact(artifact, &deploy_config)?;
    let signer = SignerHandle::from_local(local::signer_from_env()?);
    let address = deploy::deploy(&plan, &signer, rpc_url(config)?).await?;

    println!("FinalProject Contract Address: {}", address);
    Ok(())
}
