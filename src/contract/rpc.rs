//! DCA contract binding over alloy's HTTP provider.

use alloy::network::{Ethereum, ReceiptResponse};
use alloy::primitives::{Address, B256};
use alloy::providers::{
    DynProvider, PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder,
};
use alloy::sol;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::{DcaContract, SubmittedTx, TxConfirmation, TxResult};
use crate::domain::TokenAmount;
use crate::error::TxFailure;
use crate::wallet::SignerHandle;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IFinalProject {
        /// Grant `spender` an allowance over the caller's deposit token
        function approve(address spender, uint256 amount) external returns (bool);

        /// Deposit `amount` into the DCA strategy
        function invest(uint256 amount) external;

        /// Owner buys ETH with `amount` of the pooled deposit token
        function purchase(uint256 amount) external;
    }
}

pub struct AlloyDcaContract {
    address: Address,
    rpc_url: Url,
}

impl AlloyDcaContract {
    pub fn new(address: Address, rpc_url: Url) -> Self {
        Self { address, rpc_url }
    }

    fn provider(&self, signer: &SignerHandle) -> DynProvider {
        ProviderBuilder::new()
            .wallet(signer.wallet().clone())
            .connect_http(self.rpc_url.clone())
            .erased()
    }
}

/// Prefer the JSON-RPC error code; fall back to the message text when the error never
/// reached the node (signing, transport).
fn classify(call: &str, rpc_error: Option<(i64, &str)>, err: impl std::fmt::Display) -> TxFailure {
    let failure = match rpc_error {
        Some((code, message)) => TxFailure::from_rpc_code(code, message),
        None => TxFailure::classify(&err.to_string()),
    };
    warn!("{} call failed: {} ({})", call, err, failure);
    failure
}

fn classify_call(call: &str, err: alloy::contract::Error) -> TxFailure {
    let rpc_error = match &err {
        alloy::contract::Error::TransportError(e) => {
            e.as_error_resp().map(|resp| (resp.code, &*resp.message))
        }
        _ => None,
    };
    classify(call, rpc_error, &err)
}

fn classify_receipt(err: PendingTransactionError) -> TxFailure {
    let rpc_error = match &err {
        PendingTransactionError::TransportError(e) => {
            e.as_error_resp().map(|resp| (resp.code, &*resp.message))
        }
        _ => None,
    };
    classify("receipt", rpc_error, &err)
}

#[async_trait]
impl DcaContract for AlloyDcaContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn approve(
        &self,
        signer: &SignerHandle,
        spender: Address,
        amount: TokenAmount,
    ) -> TxResult<Box<dyn SubmittedTx>> {
        let contract = IFinalProject::new(self.address, self.provider(signer));
        let pending = contract
            .approve(spender, amount.base_units())
            .send()
            .await
            .map_err(|e| classify_call("approve", e))?;
        Ok(Box::new(AlloySubmittedTx::new(pending)))
    }

    async fn invest(
        &self,
        signer: &SignerHandle,
        amount: TokenAmount,
    ) -> TxResult<Box<dyn SubmittedTx>> {
        let contract = IFinalProject::new(self.address, self.provider(signer));
        let pending = contract
            .invest(amount.base_units())
            .send()
            .await
            .map_err(|e| classify_call("invest", e))?;
        Ok(Box::new(AlloySubmittedTx::new(pending)))
    }

    async fn purchase(
        &self,
        signer: &SignerHandle,
        amount: TokenAmount,
    ) -> TxResult<Box<dyn SubmittedTx>> {
        let contract = IFinalProject::new(self.address, self.provider(signer));
        let pending = contract
            .purchase(amount.base_units())
            .send()
            .await
            .map_err(|e| classify_call("purchase", e))?;
        Ok(Box::new(AlloySubmittedTx::new(pending)))
    }
}

struct AlloySubmittedTx {
    tx_hash: B256,
    pending: Option<PendingTransactionBuilder<Ethereum>>,
}

impl AlloySubmittedTx {
    fn new(pending: PendingTransactionBuilder<Ethereum>) -> Self {
        let tx_hash = *pending.tx_hash();
        debug!("Transaction accepted: {}", tx_hash);
        Self {
            tx_hash,
            pending: Some(pending),
        }
    }
}

#[async_trait]
impl SubmittedTx for AlloySubmittedTx {
    fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    async fn wait_for_confirmation(&mut self) -> TxResult<TxConfirmation> {
        let pending = self.pending.take().ok_or_else(|| {
            TxFailure::Timeout(format!("{} is no longer being watched", self.tx_hash))
        })?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(classify_receipt)?;

        if !receipt.status() {
            return Err(TxFailure::Reverted {
                reason: format!("transaction {} reverted", self.tx_hash),
            });
        }

        info!(
            "Transaction {} mined in block {:?}",
            self.tx_hash,
            receipt.block_number()
        );
        Ok(TxConfirmation {
            tx_hash: self.tx_hash,
            block_number: receipt.block_number(),
        })
    }
}
