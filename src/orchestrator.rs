//! Invest and purchase flows.
//!
//! Each flow drives fresh [`PendingTransaction`]s through their phases:
//!
//! ```text
//! invest:   Idle -> Submitting -> AwaitingApproval -> Submitted(hash) -> Confirmed
//! purchase: Idle -> Submitting -> Submitted(hash) -> Confirmed
//! ```
//!
//! Any step may end in `Failed(reason)`. Nothing is retried.

use alloy::primitives::{Address, B256};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::connection::ConnectionManager;
use crate::contract::{DcaContract, SubmittedTx, TxConfirmation, TxResult};
use crate::domain::{PendingTransaction, PhaseTransition, TokenAmount, TxKind, TxPhase};
use crate::error::{DappError, Result, TxFailure};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// DCA contract, approved as spender before investing
    pub contract_address: Address,
    /// Decimals used to parse user input
    pub token_decimals: u8,
    /// Upper bound on waiting for a transaction to be mined
    pub confirmation_timeout: Duration,
}

/// What a finished flow reports back
#[derive(Debug, Clone)]
pub enum FlowOutcome {
    /// Transaction mined successfully
    Confirmed(FlowReport),
    /// Nothing to submit (zero purchase)
    Skipped,
}

#[derive(Debug, Clone)]
pub struct FlowReport {
    pub kind: TxKind,
    pub amount: TokenAmount,
    /// Allowance approval that preceded an invest
    pub approval: Option<TxConfirmation>,
    pub confirmation: TxConfirmation,
    pub transitions: Vec<PhaseTransition>,
}

/// Holds a flow slot; releases it and recomputes the busy signal on drop.
struct FlowGuard {
    kind: TxKind,
    in_flight: Arc<DashSet<TxKind>>,
    phases: Arc<DashMap<TxKind, TxPhase>>,
    busy: Arc<watch::Sender<bool>>,
    finished: bool,
}

impl FlowGuard {
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(phase) = self.phases.get(&self.kind) {
                if phase.is_in_flight() {
                    // Only observation stops; a broadcast transaction still settles on-chain.
                    warn!(
                        "Stopped observing {} flow in phase {}",
                        self.kind,
                        phase.value()
                    );
                }
            }
        }
        self.in_flight.remove(&self.kind);
        self.busy.send_replace(!self.in_flight.is_empty());
    }
}

/// Runs the approve→invest and purchase flows against the DCA contract.
pub struct TransactionOrchestrator {
    connection: Arc<ConnectionManager>,
    contract: Arc<dyn DcaContract>,
    config: OrchestratorConfig,
    in_flight: Arc<DashSet<TxKind>>,
    phases: Arc<DashMap<TxKind, TxPhase>>,
    busy: Arc<watch::Sender<bool>>,
}

impl TransactionOrchestrator {
    pub fn new(
        connection: Arc<ConnectionManager>,
        contract: Arc<dyn DcaContract>,
        config: OrchestratorConfig,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            connection,
            contract,
            config,
            in_flight: Arc::new(DashSet::new()),
            phases: Arc::new(DashMap::new()),
            busy: Arc::new(busy),
        }
    }

    /// True while any flow is between `Submitting` and a terminal phase
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub fn watch_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    /// Phase of the latest transaction of `kind`, for display
    pub fn phase(&self, kind: TxKind) -> Option<TxPhase> {
        self.phases.get(&kind).map(|phase| phase.value().clone())
    }

    /// Parse `input` and run the invest flow. Zero is rejected.
    #[instrument(skip(self))]
    pub async fn invest(&self, input: &str) -> Result<FlowOutcome> {
        let amount = TokenAmount::parse_units(input, self.config.token_decimals)?;
        self.invest_amount(amount).await
    }

    /// Parse `input` and run the purchase flow. Zero is a no-op.
    #[instrument(skip(self))]
    pub async fn purchase(&self, input: &str) -> Result<FlowOutcome> {
        let amount = TokenAmount::parse_units(input, self.config.token_decimals)?;
        self.purchase_amount(amount).await
    }

    /// Approve the contract for `amount`, wait for the approval to be mined, then invest.
    pub async fn invest_amount(&self, amount: TokenAmount) -> Result<FlowOutcome> {
        let mut invest = PendingTransaction::new(TxKind::Invest, amount)?;
        let mut guard = self.reserve(TxKind::Invest)?;
        self.record(&mut invest, TxPhase::Submitting)?;

        let signer = match self.connection.get_signer().await {
            Ok(signer) => signer,
            Err(e) => return Err(self.fail(&mut invest, signer_failure(e))),
        };

        // Allowance leg
        let mut approve = PendingTransaction::new(TxKind::Approve, amount)?;
        self.record(&mut approve, TxPhase::Submitting)?;
        let mut approval_tx = match self
            .contract
            .approve(&signer, self.config.contract_address, amount)
            .await
        {
            Ok(tx) => tx,
            Err(failure) => {
                self.fail(&mut approve, failure.clone());
                return Err(self.fail(&mut invest, failure));
            }
        };
        self.record(&mut approve, TxPhase::Submitted(approval_tx.tx_hash()))?;
        self.record(&mut invest, TxPhase::AwaitingApproval)?;

        let approval = match self.await_confirmation(approval_tx.as_mut()).await {
            Ok(confirmation) => confirmation,
            Err(failure) => {
                self.fail(&mut approve, failure.clone());
                return Err(self.fail(&mut invest, failure));
            }
        };
        self.record(&mut approve, TxPhase::Confirmed)?;
        info!("Allowance of {} approved in {}", amount, approval.tx_hash);

        // Investment leg; the account or network may have changed while approving.
        let signer = match self.connection.get_signer().await {
            Ok(signer) => signer,
            Err(e) => return Err(self.fail(&mut invest, signer_failure(e))),
        };
        let mut invest_tx = match self.contract.invest(&signer, amount).await {
            Ok(tx) => tx,
            Err(failure) => return Err(self.fail(&mut invest, failure)),
        };
        self.record(&mut invest, TxPhase::Submitted(invest_tx.tx_hash()))?;

        let confirmation = match self.await_confirmation(invest_tx.as_mut()).await {
            Ok(confirmation) => confirmation,
            Err(failure) => return Err(self.fail(&mut invest, failure)),
        };
        self.record(&mut invest, TxPhase::Confirmed)?;
        guard.finish();

        info!("Invested {} in {}", amount, confirmation.tx_hash);
        Ok(FlowOutcome::Confirmed(FlowReport {
            kind: TxKind::Invest,
            amount,
            approval: Some(approval),
            confirmation,
            transitions: invest.history().to_vec(),
        }))
    }

    /// Submit `purchase(amount)` and wait for it to be mined.
    pub async fn purchase_amount(&self, amount: TokenAmount) -> Result<FlowOutcome> {
        if amount.is_zero() {
            info!("Purchase amount is zero, nothing to submit");
            return Ok(FlowOutcome::Skipped);
        }

        let mut purchase = PendingTransaction::new(TxKind::Purchase, amount)?;
        let mut guard = self.reserve(TxKind::Purchase)?;
        self.record(&mut purchase, TxPhase::Submitting)?;

        let signer = match self.connection.get_signer().await {
            Ok(signer) => signer,
            Err(e) => return Err(self.fail(&mut purchase, signer_failure(e))),
        };
        let mut purchase_tx = match self.contract.purchase(&signer, amount).await {
            Ok(tx) => tx,
            Err(failure) => return Err(self.fail(&mut purchase, failure)),
        };
        self.record(&mut purchase, TxPhase::Submitted(purchase_tx.tx_hash()))?;

        let confirmation = match self.await_confirmation(purchase_tx.as_mut()).await {
            Ok(confirmation) => confirmation,
            Err(failure) => return Err(self.fail(&mut purchase, failure)),
        };
        self.record(&mut purchase, TxPhase::Confirmed)?;
        guard.finish();

        info!("Purchased with {} in {}", amount, confirmation.tx_hash);
        Ok(FlowOutcome::Confirmed(FlowReport {
            kind: TxKind::Purchase,
            amount,
            approval: None,
            confirmation,
            transitions: purchase.history().to_vec(),
        }))
    }

    fn reserve(&self, kind: TxKind) -> Result<FlowGuard> {
        if !self.in_flight.insert(kind) {
            warn!("Rejected {} submission: flow already in progress", kind);
            return Err(DappError::FlowBusy(kind));
        }
        self.busy.send_replace(true);

        Ok(FlowGuard {
            kind,
            in_flight: self.in_flight.clone(),
            phases: self.phases.clone(),
            busy: self.busy.clone(),
            finished: false,
        })
    }

    fn record(&self, tx: &mut PendingTransaction, next: TxPhase) -> Result<()> {
        tx.advance(next)?;
        self.phases.insert(tx.kind(), tx.phase().clone());
        Ok(())
    }

    fn fail(&self, tx: &mut PendingTransaction, failure: TxFailure) -> DappError {
        warn!("{} transaction failed: {}", tx.kind(), failure);
        if let Err(e) = tx.fail(failure.clone()) {
            warn!("{}", e);
        }
        self.phases.insert(tx.kind(), tx.phase().clone());
        failure.into()
    }

    async fn await_confirmation(&self, tx: &mut dyn SubmittedTx) -> TxResult<TxConfirmation> {
        let tx_hash: B256 = tx.tx_hash();
        let timeout = self.config.confirmation_timeout;
        match tokio::time::timeout(timeout, tx.wait_for_confirmation()).await {
            Ok(result) => result,
            Err(_) => Err(TxFailure::Timeout(format!(
                "{} not mined within {:?}",
                tx_hash, timeout
            ))),
        }
    }
}

fn signer_failure(err: DappError) -> TxFailure {
    match err {
        DappError::WrongNetwork { required, actual } => TxFailure::WrongNetwork { required, actual },
        _ => TxFailure::NotConnected,
    }
}
