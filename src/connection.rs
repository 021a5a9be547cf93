//! Wallet connection lifecycle.
//!
//! The manager is the only writer of the [`WalletSession`]. It changes the session on
//! explicit `connect`/`disconnect` calls and on provider notifications, and re-checks the
//! provider's chain every time a signer is handed out.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::domain::{SessionStatus, WalletSession};
use crate::error::{DappError, Result};
use crate::wallet::{
    ProviderEvent, ProviderSubscription, SignerHandle, WalletConnector, WalletProvider,
};

struct ConnectionState {
    session: WalletSession,
    provider: Option<Arc<dyn WalletProvider>>,
    /// Bumped whenever the provider is replaced or dropped, so a stale listener stops.
    generation: u64,
}

struct SessionShared {
    required_chain_id: u64,
    state: RwLock<ConnectionState>,
    status: watch::Sender<SessionStatus>,
    /// Kept outside `state` so it can be aborted while the listener holds the state lock.
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionShared {
    fn take_listener(&self) -> Option<JoinHandle<()>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn stop_listener(&self) {
        if let Some(listener) = self.take_listener() {
            listener.abort();
        }
    }

    fn set_listener(&self, listener: JoinHandle<()>) {
        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(listener);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn set_session(&self, state: &mut ConnectionState, session: WalletSession) {
        let from = state.session.status();
        let to = session.status();
        if from != to {
            info!("Wallet session: {} -> {}", from, to);
        }
        state.session = session;
        self.status.send_replace(to);
    }

    /// Drop the provider and everything derived from it.
    fn reset(&self, state: &mut ConnectionState, reason: &str) {
        self.stop_listener();
        state.provider = None;
        state.generation += 1;
        debug!("Wallet session reset: {}", reason);
        self.set_session(state, WalletSession::disconnected());
    }

    /// Recompute the session from the provider. `known_chain` skips the chain-id query when
    /// the event already carried it. Returns false when the session ended.
    async fn rederive(&self, state: &mut ConnectionState, known_chain: Option<u64>) -> bool {
        let Some(provider) = state.provider.clone() else {
            return false;
        };

        let chain_id = match known_chain {
            Some(chain_id) => chain_id,
            None => match provider.chain_id().await {
                Ok(chain_id) => chain_id,
                Err(e) => {
                    warn!("Could not read chain id after wallet event: {}", e);
                    self.reset(state, "provider unreadable");
                    return false;
                }
            },
        };

        if chain_id != self.required_chain_id {
            warn!(
                "Wallet moved to chain {} (required {})",
                chain_id, self.required_chain_id
            );
            self.set_session(state, WalletSession::network_mismatch(chain_id));
            return true;
        }

        match provider.signer().await {
            Ok(signer) => {
                self.set_session(state, WalletSession::connected(chain_id, signer));
                true
            }
            Err(e) => {
                warn!("Could not obtain signer after wallet event: {}", e);
                self.reset(state, "signer unavailable");
                false
            }
        }
    }

    /// Apply one provider notification. Returns false once the listener should stop.
    async fn apply_event(&self, generation: u64, event: ProviderEvent) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!("Ignoring {:?} from a replaced provider", event);
            return false;
        }

        debug!("Wallet event: {:?}", event);
        match event {
            ProviderEvent::ChainChanged(chain_id) => self.rederive(&mut state, Some(chain_id)).await,
            ProviderEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                // Detach rather than abort: this runs on the listener task itself.
                self.take_listener();
                self.reset(&mut state, "wallet revoked account access");
                false
            }
            ProviderEvent::AccountsChanged(_) => self.rederive(&mut state, None).await,
            ProviderEvent::Disconnected => {
                self.take_listener();
                self.reset(&mut state, "provider disconnected");
                false
            }
        }
    }
}

async fn listen(shared: Arc<SessionShared>, generation: u64, mut subscription: ProviderSubscription) {
    while let Some(event) = subscription.next().await {
        if !shared.apply_event(generation, event).await {
            break;
        }
    }
    debug!("Wallet subscription {} closed", generation);
}

/// Owns the wallet connection and the active network/account.
pub struct ConnectionManager {
    connector: Arc<dyn WalletConnector>,
    shared: Arc<SessionShared>,
}

impl ConnectionManager {
    /// Create a manager for a connector; the session starts `Disconnected`.
    pub fn new(connector: Arc<dyn WalletConnector>, required_chain_id: u64) -> Self {
        let (status, _) = watch::channel(SessionStatus::Disconnected);
        Self {
            connector,
            shared: Arc::new(SessionShared {
                required_chain_id,
                state: RwLock::new(ConnectionState {
                    session: WalletSession::disconnected(),
                    provider: None,
                    generation: 0,
                }),
                status,
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn required_chain_id(&self) -> u64 {
        self.shared.required_chain_id
    }

    /// Current status
    pub fn status(&self) -> SessionStatus {
        *self.shared.status.borrow()
    }

    /// Receiver for status changes, including those caused by provider events
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Snapshot of the session
    pub async fn session(&self) -> WalletSession {
        self.shared.state.read().await.session.clone()
    }

    /// Run the connector's connect flow and check the provider's network.
    ///
    /// May wait indefinitely for the user. On a wrong network the provider stays attached
    /// (status `NetworkMismatch`) so switching the wallet to the right chain connects it.
    /// The session lock is not held while the provider is queried; a `disconnect` or newer
    /// `connect` in the meantime wins and this call fails `ConnectionRefused`.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        let shared = &self.shared;

        let provider = match self.connector.connect().await {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Wallet connection refused: {}", e);
                let mut state = shared.state.write().await;
                shared.reset(&mut state, "connector failed");
                return Err(match e {
                    DappError::ConnectionRefused(msg) => DappError::ConnectionRefused(msg),
                    other => DappError::ConnectionRefused(other.to_string()),
                });
            }
        };

        let generation = {
            let mut state = shared.state.write().await;
            shared.stop_listener();
            state.generation += 1;
            state.provider = Some(provider.clone());
            shared.set_session(&mut state, WalletSession::connecting());
            state.generation
        };

        let chain_id = provider.chain_id().await;
        let signer = match &chain_id {
            Ok(chain_id) if *chain_id == shared.required_chain_id => Some(provider.signer().await),
            _ => None,
        };

        let mut state = shared.state.write().await;
        if state.generation != generation {
            debug!("Connect attempt {} superseded", generation);
            return Err(DappError::ConnectionRefused(
                "connection attempt superseded".to_string(),
            ));
        }

        let chain_id = match chain_id {
            Ok(chain_id) => chain_id,
            Err(e) => {
                shared.reset(&mut state, "chain id unreadable");
                return Err(DappError::ConnectionRefused(format!(
                    "could not read wallet network: {}",
                    e
                )));
            }
        };

        let outcome = match signer {
            Some(Ok(signer)) => {
                info!("Wallet {} connected on chain {}", signer.account(), chain_id);
                shared.set_session(&mut state, WalletSession::connected(chain_id, signer));
                Ok(())
            }
            Some(Err(e)) => {
                shared.reset(&mut state, "signer unavailable");
                return Err(DappError::ConnectionRefused(format!(
                    "wallet returned no signer: {}",
                    e
                )));
            }
            None => {
                warn!(
                    "Wallet is on chain {}, required chain {}",
                    chain_id, shared.required_chain_id
                );
                shared.set_session(&mut state, WalletSession::network_mismatch(chain_id));
                Err(DappError::WrongNetwork {
                    required: shared.required_chain_id,
                    actual: chain_id,
                })
            }
        };

        let subscription = provider.subscribe();
        shared.set_listener(tokio::spawn(listen(shared.clone(), generation, subscription)));

        outcome
    }

    /// Drop the provider and stop listening to it.
    pub async fn disconnect(&self) {
        let mut state = self.shared.state.write().await;
        self.shared.reset(&mut state, "disconnect requested");
    }

    /// Signer for the next submission.
    ///
    /// Call right before every transaction: the provider's chain is re-read on each call, and
    /// the account may have changed since the last one.
    pub async fn get_signer(&self) -> Result<SignerHandle> {
        let shared = &self.shared;
        let mut state = shared.state.write().await;

        if !state.session.is_connected() {
            return Err(DappError::NotConnected);
        }
        let provider = state.provider.clone().ok_or(DappError::NotConnected)?;

        let chain_id = match provider.chain_id().await {
            Ok(chain_id) => chain_id,
            Err(e) => {
                warn!("Wallet stopped answering: {}", e);
                shared.reset(&mut state, "provider unreadable");
                return Err(DappError::NotConnected);
            }
        };

        if chain_id != shared.required_chain_id {
            warn!(
                "Wallet switched to chain {} (required {})",
                chain_id, shared.required_chain_id
            );
            shared.set_session(&mut state, WalletSession::network_mismatch(chain_id));
            return Err(DappError::WrongNetwork {
                required: shared.required_chain_id,
                actual: chain_id,
            });
        }

        let signer = match provider.signer().await {
            Ok(signer) => signer,
            Err(e) => {
                warn!("Wallet returned no signer: {}", e);
                shared.reset(&mut state, "signer unavailable");
                return Err(DappError::NotConnected);
            }
        };

        let previous = state.session.signer().map(SignerHandle::account);
        if previous != Some(signer.account()) {
            info!("Active account is now {}", signer.account());
            shared.set_session(&mut state, WalletSession::connected(chain_id, signer.clone()));
        }

        Ok(signer)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.stop_listener();
    }
}
