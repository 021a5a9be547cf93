//! Scripted wallet and contract doubles shared by the integration tests.
#![allow(dead_code)]

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use dca_dapp::contract::TxResult;
use dca_dapp::{
    ConnectionManager, DappError, DcaContract, ProviderEvent, ProviderSubscription, Result,
    SessionStatus, SignerHandle, SubmittedTx, TokenAmount, TxConfirmation, TxFailure, TxKind,
    WalletConnector, WalletProvider,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};

pub const REQUIRED_CHAIN: u64 = 5;

/// Wallet whose chain, account and availability the test controls.
pub struct FakeWallet {
    chain_id: AtomicU64,
    signer: Mutex<SignerHandle>,
    unreadable: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedSender<ProviderEvent>>>,
    chain_gate: Mutex<Option<Arc<Notify>>>,
    chain_reads: AtomicUsize,
}

impl FakeWallet {
    pub fn on_chain(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id: AtomicU64::new(chain_id),
            signer: Mutex::new(SignerHandle::from_local(PrivateKeySigner::random())),
            unreadable: AtomicBool::new(false),
            events: Mutex::new(None),
            chain_gate: Mutex::new(None),
            chain_reads: AtomicUsize::new(0),
        })
    }

    /// Change chain without notifying, like a provider that swaps networks silently.
    pub fn switch_chain_silently(&self, chain_id: u64) {
        self.chain_id.store(chain_id, Ordering::SeqCst);
    }

    /// Switch to a fresh account and return its address.
    pub fn switch_account(&self) -> Address {
        let signer = SignerHandle::from_local(PrivateKeySigner::random());
        let account = signer.account();
        *self.signer.lock().unwrap() = signer;
        account
    }

    pub fn account(&self) -> Address {
        self.signer.lock().unwrap().account()
    }

    pub fn set_unreadable(&self, unreadable: bool) {
        self.unreadable.store(unreadable, Ordering::SeqCst);
    }

    /// Make chain-id reads block until `release_chain_reads`, like a wallet waiting on its user.
    pub fn gate_chain_reads(&self) {
        *self.chain_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    /// Let the blocked chain-id read through and stop gating.
    pub fn release_chain_reads(&self) {
        if let Some(gate) = self.chain_gate.lock().unwrap().take() {
            gate.notify_one();
        }
    }

    /// Number of chain-id reads started so far
    pub fn chain_reads(&self) -> usize {
        self.chain_reads.load(Ordering::SeqCst)
    }

    /// Wait (bounded) until more than `seen` chain-id reads have started.
    pub async fn wait_for_chain_read(&self, seen: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.chain_reads() <= seen {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("wallet was never asked for its chain");
    }

    /// Push an event to the current subscriber. False if nobody is listening.
    pub fn emit(&self, event: ProviderEvent) -> bool {
        if let ProviderEvent::ChainChanged(chain_id) = event {
            self.chain_id.store(chain_id, Ordering::SeqCst);
        }
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn chain_id(&self) -> Result<u64> {
        self.chain_reads.fetch_add(1, Ordering::SeqCst);
        let gate = self.chain_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(DappError::NetworkTimeout("wallet not responding".into()));
        }
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    async fn signer(&self) -> Result<SignerHandle> {
        Ok(self.signer.lock().unwrap().clone())
    }

    fn subscribe(&self) -> ProviderSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        ProviderSubscription::new(rx)
    }
}

/// Connector that hands out one wallet, or refuses.
pub struct FakeConnector {
    wallet: Mutex<Option<Arc<FakeWallet>>>,
    refusal: Option<String>,
}

impl FakeConnector {
    pub fn accepting(wallet: Arc<FakeWallet>) -> Arc<Self> {
        Arc::new(Self {
            wallet: Mutex::new(Some(wallet)),
            refusal: None,
        })
    }

    pub fn refusing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            wallet: Mutex::new(None),
            refusal: Some(reason.to_string()),
        })
    }

    /// Hand out a different wallet on the next connect.
    pub fn replace_wallet(&self, wallet: Arc<FakeWallet>) {
        *self.wallet.lock().unwrap() = Some(wallet);
    }
}

#[async_trait]
impl WalletConnector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn WalletProvider>> {
        if let Some(reason) = &self.refusal {
            return Err(DappError::ConnectionRefused(reason.clone()));
        }
        let wallet = self
            .wallet
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DappError::ConnectionRefused("no wallet installed".into()))?;
        Ok(wallet)
    }
}

pub fn manager_for(wallet: &Arc<FakeWallet>) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        FakeConnector::accepting(wallet.clone()),
        REQUIRED_CHAIN,
    ))
}

pub async fn connected_manager(wallet: &Arc<FakeWallet>) -> Arc<ConnectionManager> {
    let manager = manager_for(wallet);
    manager.connect().await.expect("wallet should connect");
    manager
}

/// Wait (bounded) until the watched status equals `expected`.
pub async fn wait_for_status(rx: &mut watch::Receiver<SessionStatus>, expected: SessionStatus) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if *rx.borrow_and_update() == expected {
                return;
            }
            if rx.changed().await.is_err() {
                panic!("status channel closed before reaching {}", expected);
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("status never became {}", expected));
}

pub async fn wait_for_busy(rx: &mut watch::Receiver<bool>, expected: bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if *rx.borrow_and_update() == expected {
                return;
            }
            rx.changed().await.expect("busy channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("busy never became {}", expected));
}

/// How one kind of contract call behaves.
#[derive(Clone)]
pub struct CallScript {
    pub submit: std::result::Result<(), TxFailure>,
    pub confirm: std::result::Result<(), TxFailure>,
    /// Confirmation waits for this before resolving
    pub hold: Option<Arc<Notify>>,
    /// Confirmation never resolves
    pub hang: bool,
}

impl Default for CallScript {
    fn default() -> Self {
        Self {
            submit: Ok(()),
            confirm: Ok(()),
            hold: None,
            hang: false,
        }
    }
}

/// Contract double that logs every call and confirmation in order.
pub struct FakeContract {
    address: Address,
    scripts: Mutex<HashMap<TxKind, CallScript>>,
    log: Arc<Mutex<Vec<String>>>,
    accounts: Mutex<Vec<(TxKind, Address)>>,
    next_hash: AtomicU8,
}

impl FakeContract {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            address: Address::repeat_byte(0xdc),
            scripts: Mutex::new(HashMap::new()),
            log: Arc::new(Mutex::new(Vec::new())),
            accounts: Mutex::new(Vec::new()),
            next_hash: AtomicU8::new(1),
        })
    }

    pub fn script(&self, kind: TxKind, script: CallScript) {
        self.scripts.lock().unwrap().insert(kind, script);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn accounts(&self) -> Vec<(TxKind, Address)> {
        self.accounts.lock().unwrap().clone()
    }

    fn submit(&self, kind: TxKind, signer: &SignerHandle) -> TxResult<Box<dyn SubmittedTx>> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        self.accounts.lock().unwrap().push((kind, signer.account()));
        if let Err(failure) = script.submit {
            self.log.lock().unwrap().push(format!("{}:rejected", kind));
            return Err(failure);
        }

        self.log.lock().unwrap().push(format!("{}:submit", kind));
        let tx_hash = B256::repeat_byte(self.next_hash.fetch_add(1, Ordering::SeqCst));
        Ok(Box::new(FakeSubmittedTx {
            kind,
            tx_hash,
            script,
            log: self.log.clone(),
        }))
    }
}

#[async_trait]
impl DcaContract for FakeContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn approve(
        &self,
        signer: &SignerHandle,
        spender: Address,
        _amount: TokenAmount,
    ) -> TxResult<Box<dyn SubmittedTx>> {
        assert_eq!(spender, self.address, "allowance must go to the DCA contract");
        self.submit(TxKind::Approve, signer)
    }

    async fn invest(
        &self,
        signer: &SignerHandle,
        _amount: TokenAmount,
    ) -> TxResult<Box<dyn SubmittedTx>> {
        self.submit(TxKind::Invest, signer)
    }

    async fn purchase(
        &self,
        signer: &SignerHandle,
        _amount: TokenAmount,
    ) -> TxResult<Box<dyn SubmittedTx>> {
        self.submit(TxKind::Purchase, signer)
    }
}

struct FakeSubmittedTx {
    kind: TxKind,
    tx_hash: B256,
    script: CallScript,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SubmittedTx for FakeSubmittedTx {
    fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    async fn wait_for_confirmation(&mut self) -> TxResult<TxConfirmation> {
        if self.script.hang {
            std::future::pending::<()>().await;
        }
        if let Some(hold) = &self.script.hold {
            hold.notified().await;
        }

        match &self.script.confirm {
            Ok(()) => {
                self.log.lock().unwrap().push(format!("{}:confirmed", self.kind));
                Ok(TxConfirmation {
                    tx_hash: self.tx_hash,
                    block_number: Some(100),
                })
            }
            Err(failure) => {
                self.log.lock().unwrap().push(format!("{}:failed", self.kind));
                Err(failure.clone())
            }
        }
    }
}
