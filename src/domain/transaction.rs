use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::TokenAmount;
use crate::error::{DappError, Result, TxFailure};

/// Which contract call a pending transaction represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    Approve,
    Invest,
    Purchase,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Approve => "approve",
            TxKind::Invest => "invest",
            TxKind::Purchase => "purchase",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle phase of one on-chain call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxPhase {
    /// Built, amount validated, nothing sent
    Idle,
    /// Signer obtained, call being sent to the wallet
    Submitting,
    /// Invest only: allowance approval sent, waiting for it to be mined
    AwaitingApproval,
    /// Accepted into the pending pool
    Submitted(B256),
    /// Mined successfully
    Confirmed,
    /// Rejected, reverted or timed out
    Failed(TxFailure),
}

impl TxPhase {
    pub fn name(&self) -> &'static str {
        match self {
            TxPhase::Idle => "IDLE",
            TxPhase::Submitting => "SUBMITTING",
            TxPhase::AwaitingApproval => "AWAITING_APPROVAL",
            TxPhase::Submitted(_) => "SUBMITTED",
            TxPhase::Confirmed => "CONFIRMED",
            TxPhase::Failed(_) => "FAILED",
        }
    }

    /// Check if this phase can move to `target`. Transitions only go forward.
    pub fn can_transition_to(&self, target: &TxPhase) -> bool {
        use TxPhase::*;

        match (self, target) {
            (Idle, Submitting) => true,

            (Submitting, AwaitingApproval) => true,
            (Submitting, Submitted(_)) => true,
            (Submitting, Failed(_)) => true,

            (AwaitingApproval, Submitted(_)) => true,
            (AwaitingApproval, Failed(_)) => true,

            (Submitted(_), Confirmed) => true,
            (Submitted(_), Failed(_)) => true,

            // Confirmed and Failed are terminal
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxPhase::Confirmed | TxPhase::Failed(_))
    }

    /// Between `Submitting` and a terminal phase
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            TxPhase::Submitting | TxPhase::AwaitingApproval | TxPhase::Submitted(_)
        )
    }

    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            TxPhase::Submitted(hash) => Some(*hash),
            _ => None,
        }
    }
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxPhase::Submitted(hash) => write!(f, "SUBMITTED({})", hash),
            TxPhase::Failed(reason) => write!(f, "FAILED({})", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Phase transition record
#[derive(Debug, Clone)]
pub struct PhaseTransition {
    pub from: TxPhase,
    pub to: TxPhase,
    pub timestamp: DateTime<Utc>,
}

/// One in-flight on-chain call, owned by the flow that created it.
#[derive(Debug)]
pub struct PendingTransaction {
    kind: TxKind,
    amount: TokenAmount,
    phase: TxPhase,
    tx_hash: Option<B256>,
    history: Vec<PhaseTransition>,
}

impl PendingTransaction {
    /// Create an `Idle` transaction. Zero amounts cannot be submitted.
    pub fn new(kind: TxKind, amount: TokenAmount) -> Result<Self> {
        if amount.is_zero() {
            return Err(DappError::InvalidAmount(format!(
                "{} amount must be greater than zero",
                kind
            )));
        }

        Ok(Self {
            kind,
            amount,
            phase: TxPhase::Idle,
            tx_hash: None,
            history: Vec::new(),
        })
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    pub fn amount(&self) -> TokenAmount {
        self.amount
    }

    pub fn phase(&self) -> &TxPhase {
        &self.phase
    }

    /// Hash of the accepted transaction; kept after it is confirmed or fails.
    pub fn tx_hash(&self) -> Option<B256> {
        self.tx_hash
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    /// Move to `next`, rejecting anything the phase graph does not allow.
    pub fn advance(&mut self, next: TxPhase) -> Result<()> {
        if !self.phase.can_transition_to(&next) {
            return Err(DappError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }

        debug!("{} tx: {} -> {}", self.kind, self.phase, next);
        if let TxPhase::Submitted(hash) = &next {
            self.tx_hash = Some(*hash);
        }
        let from = std::mem::replace(&mut self.phase, next.clone());
        self.history.push(PhaseTransition {
            from,
            to: next,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Mark as failed. Errors if the transaction is already terminal.
    pub fn fail(&mut self, reason: TxFailure) -> Result<()> {
        self.advance(TxPhase::Failed(reason))
    }
}
