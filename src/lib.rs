pub mod cli;
pub mod config;
pub mod connection;
pub mod contract;
pub mod deploy;
pub mod domain;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod wallet;

pub use config::AppConfig;
pub use connection::ConnectionManager;
pub use contract::{AlloyDcaContract, DcaContract, SubmittedTx, TxConfirmation};
pub use domain::{
    PendingTransaction, SessionStatus, TokenAmount, TxKind, TxPhase, WalletSession,
};
pub use error::{DappError, ErrorCategory, Result, TxFailure};
pub use orchestrator::{FlowOutcome, FlowReport, OrchestratorConfig, TransactionOrchestrator};
pub use wallet::{
    LocalKeyConnector, ProviderEvent, ProviderSubscription, SignerHandle, WalletConnector,
    WalletProvider,
};
