//! Contract-binding seam for the DCA contract.

pub mod rpc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;

use crate::domain::TokenAmount;
use crate::error::TxFailure;
use crate::wallet::SignerHandle;

pub use rpc::AlloyDcaContract;

pub type TxResult<T> = std::result::Result<T, TxFailure>;

/// Mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxConfirmation {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// A transaction accepted into the pending pool
#[async_trait]
pub trait SubmittedTx: Send {
    fn tx_hash(&self) -> B256;

    /// Wait until the transaction is mined. A mined-but-reverted transaction is
    /// `TxFailure::Reverted`.
    async fn wait_for_confirmation(&mut self) -> TxResult<TxConfirmation>;
}

/// Typed call surface of the DCA contract.
///
/// Each call resolves once the wallet has signed and the node accepted the transaction.
#[async_trait]
pub trait DcaContract: Send + Sync {
    fn address(&self) -> Address;

    async fn approve(
        &self,
        signer: &SignerHandle,
        spender: Address,
        amount: TokenAmount,
    ) -> TxResult<Box<dyn SubmittedTx>>;

    async fn invest(
        &self,
        signer: &SignerHandle,
        amount: TokenAmount,
    ) -> TxResult<Box<dyn SubmittedTx>>;

    async fn purchase(
        &self,
        signer: &SignerHandle,
        amount: TokenAmount,
    ) -> TxResult<Box<dyn SubmittedTx>>;
}
