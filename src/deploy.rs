//! One-shot deployment of the DCA contract.

use alloy::network::{Ethereum, Network, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol_types::SolValue;
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use url::Url;

use crate::config::DeployConfig;
use crate::error::{DappError, Result};
use crate::wallet::SignerHandle;

/// Compiled contract artifact; only the creation bytecode is needed.
#[derive(Debug, Deserialize)]
struct Artifact {
    bytecode: ArtifactBytecode,
}

/// Hardhat writes a plain hex string, Foundry an object with `object`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    Hex(String),
    Object { object: String },
}

/// Creation code plus constructor arguments
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub bytecode: Bytes,
    pub lock_duration: U256,
    pub swap_router: Address,
}

impl DeployPlan {
    pub fn new(bytecode: Bytes, config: &DeployConfig) -> Result<Self> {
        if bytecode.is_empty() {
            return Err(DappError::Deployment("artifact has no bytecode".to_string()));
        }
        let swap_router = config.swap_router.parse::<Address>().map_err(|e| {
            DappError::AddressParsing(format!("Invalid swap router address: {}", e))
        })?;

        Ok(Self {
            bytecode,
            lock_duration: U256::from(config.lock_duration_secs),
            swap_router,
        })
    }

    /// Load the creation bytecode from a compiled artifact JSON file.
    pub fn from_artifact<P: AsRef<Path>>(path: P, config: &DeployConfig) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let artifact: Artifact = serde_json::from_str(&raw)?;
        let hex_code = match artifact.bytecode {
            ArtifactBytecode::Hex(code) => code,
            ArtifactBytecode::Object { object } => object,
        };
        let bytecode = hex::decode(hex_code.trim().trim_start_matches("0x"))
            .map_err(|e| DappError::Deployment(format!("bytecode is not hex: {}", e)))?;

        Self::new(Bytes::from(bytecode), config)
    }

    /// Bytecode followed by ABI-encoded `(uint256 lockDuration, address swapRouter)`.
    pub fn creation_code(&self) -> Bytes {
        let args = (self.lock_duration, self.swap_router).abi_encode_params();
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&args);
        Bytes::from(code)
    }
}

/// Send the creation transaction and wait for the deployed address.
pub async fn deploy(plan: &DeployPlan, signer: &SignerHandle, rpc_url: Url) -> Result<Address> {
    let provider = ProviderBuilder::new()
        .wallet(signer.wallet().clone())
        .connect_http(rpc_url);

    info!(
        "Deploying DCA contract from {} (lock {}s, router {})",
        signer.account(),
        plan.lock_duration,
        plan.swap_router
    );

    let tx = <Ethereum as Network>::TransactionRequest::default()
        .with_deploy_code(plan.creation_code());
    let pending = provider
        .send_transaction(tx)
        .await
        .map_err(|e| DappError::Deployment(format!("creation tx rejected: {}", e)))?;
    let receipt = pending
        .get_receipt()
        .await
        .map_err(|e| DappError::Deployment(format!("creation tx not mined: {}", e)))?;

    if !receipt.status() {
        return Err(DappError::Deployment(format!(
            "creation tx {} reverted",
            receipt.transaction_hash()
        )));
    }

    let address = receipt
        .contract_address()
        .ok_or_else(|| DappError::Deployment("receipt has no contract address".to_string()))?;
    info!("DCA contract deployed at {}", address);
    Ok(address)
}
