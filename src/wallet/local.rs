use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;
use zeroize::Zeroize;

use super::{ProviderEvent, ProviderSubscription, SignerHandle, WalletConnector, WalletProvider};
use crate::error::{DappError, Result};

/// Environment variables checked for the signing key, in order
pub const PRIVATE_KEY_VARS: [&str; 2] = ["DCA_PRIVATE_KEY", "PRIVATE_KEY"];

/// Parse a private key hex string, zeroizing the working copy afterwards.
pub fn parse_private_key(private_key: &str) -> Result<PrivateKeySigner> {
    let mut secure_key = private_key.trim().trim_start_matches("0x").to_string();

    let signer = secure_key
        .parse::<PrivateKeySigner>()
        .map_err(|e| DappError::Wallet(format!("Invalid private key: {}", e)));

    secure_key.zeroize();
    signer
}

/// Read the signing key from the environment.
pub fn signer_from_env() -> Result<PrivateKeySigner> {
    let mut private_key = PRIVATE_KEY_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .ok_or_else(|| {
            DappError::Wallet(format!(
                "{} environment variable not set",
                PRIVATE_KEY_VARS.join(" or ")
            ))
        })?;

    let result = parse_private_key(&private_key);
    private_key.zeroize();
    result
}

/// Connector for a wallet whose key lives on this machine.
///
/// "Connecting" loads the key and opens an HTTP JSON-RPC provider. The RPC endpoint's chain id
/// is watched in the background so a node switching networks surfaces as `ChainChanged`.
pub struct LocalKeyConnector {
    rpc_url: Url,
    chain_poll_interval: Duration,
}

impl LocalKeyConnector {
    pub fn new(rpc_url: Url, chain_poll_interval: Duration) -> Self {
        Self {
            rpc_url,
            chain_poll_interval,
        }
    }
}

#[async_trait]
impl WalletConnector for LocalKeyConnector {
    async fn connect(&self) -> Result<Arc<dyn WalletProvider>> {
        let signer = signer_from_env()
            .map_err(|e| DappError::ConnectionRefused(e.to_string()))?;
        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.clone())
            .erased();

        info!(
            "Local wallet {} attached to {}",
            signer.address(),
            self.rpc_url
        );

        Ok(Arc::new(LocalKeyProvider {
            signer,
            provider,
            chain_poll_interval: self.chain_poll_interval,
        }))
    }
}

struct LocalKeyProvider {
    signer: PrivateKeySigner,
    provider: DynProvider,
    chain_poll_interval: Duration,
}

#[async_trait]
impl WalletProvider for LocalKeyProvider {
    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| DappError::NetworkTimeout(format!("eth_chainId failed: {}", e)))
    }

    async fn signer(&self) -> Result<SignerHandle> {
        Ok(SignerHandle::from_local(self.signer.clone()))
    }

    fn subscribe(&self) -> ProviderSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let provider = self.provider.clone();
        let interval = self.chain_poll_interval;

        let feeder = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_chain: Option<u64> = None;

            loop {
                ticker.tick().await;
                match provider.get_chain_id().await {
                    Ok(chain_id) => {
                        if last_chain.is_some_and(|prev| prev != chain_id) {
                            debug!("RPC chain changed to {}", chain_id);
                            if tx.send(ProviderEvent::ChainChanged(chain_id)).is_err() {
                                break;
                            }
                        }
                        last_chain = Some(chain_id);
                    }
                    Err(e) => warn!("Chain watcher could not read chain id: {}", e),
                }
            }
        });

        ProviderSubscription::new(rx).with_feeder(feeder)
    }
}
