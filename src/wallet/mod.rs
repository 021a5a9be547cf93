//! Wallet-provider seam.
//!
//! A connector runs the interactive connect flow and hands back a provider. The provider
//! answers chain-id and signer queries and pushes account/network notifications through a
//! cancelable subscription.

pub mod local;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

pub use local::LocalKeyConnector;

/// Notification pushed by a wallet provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Active accounts changed; empty means the wallet locked or revoked access
    AccountsChanged(Vec<Address>),
    /// Wallet switched to another chain
    ChainChanged(u64),
    /// Provider went away
    Disconnected,
}

/// Capability to authorize transactions for one account.
#[derive(Clone)]
pub struct SignerHandle {
    account: Address,
    wallet: EthereumWallet,
}

impl SignerHandle {
    pub fn from_local(signer: PrivateKeySigner) -> Self {
        Self {
            account: signer.address(),
            wallet: EthereumWallet::from(signer),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }
}

impl std::fmt::Debug for SignerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerHandle")
            .field("account", &self.account)
            .finish()
    }
}

/// Stream of provider events. Dropping or cancelling it stops delivery.
pub struct ProviderSubscription {
    events: mpsc::UnboundedReceiver<ProviderEvent>,
    feeder: Option<JoinHandle<()>>,
}

impl ProviderSubscription {
    pub fn new(events: mpsc::UnboundedReceiver<ProviderEvent>) -> Self {
        Self {
            events,
            feeder: None,
        }
    }

    /// Attach the background task producing the events so cancellation stops it too.
    pub fn with_feeder(mut self, feeder: JoinHandle<()>) -> Self {
        self.feeder = Some(feeder);
        self
    }

    /// Next event, or `None` once the provider stopped sending.
    pub async fn next(&mut self) -> Option<ProviderEvent> {
        self.events.recv().await
    }

    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.events.close();
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

impl Drop for ProviderSubscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A connected, signing-capable provider
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Chain the provider is currently on
    async fn chain_id(&self) -> Result<u64>;

    /// Signer for the provider's active account
    async fn signer(&self) -> Result<SignerHandle>;

    /// Subscribe to account and network notifications
    fn subscribe(&self) -> ProviderSubscription;
}

/// Runs the (possibly interactive) connect flow
#[async_trait]
pub trait WalletConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn WalletProvider>>;
}
