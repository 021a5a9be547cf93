use serde::{Deserialize, Serialize};
use std::fmt;

use crate::wallet::SignerHandle;

/// Wallet connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No provider attached
    Disconnected,
    /// Provider attached, network not yet checked
    Connecting,
    /// Provider on the required chain, signer available
    Connected,
    /// Provider attached but on another chain
    NetworkMismatch,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "DISCONNECTED",
            SessionStatus::Connecting => "CONNECTING",
            SessionStatus::Connected => "CONNECTED",
            SessionStatus::NetworkMismatch => "NETWORK_MISMATCH",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The user's connection to a signing-capable provider.
///
/// Fields are private so the signer can only exist on a `Connected` session.
#[derive(Debug, Clone)]
pub struct WalletSession {
    status: SessionStatus,
    network_id: Option<u64>,
    signer: Option<SignerHandle>,
}

impl WalletSession {
    pub fn disconnected() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            network_id: None,
            signer: None,
        }
    }

    pub fn connecting() -> Self {
        Self {
            status: SessionStatus::Connecting,
            network_id: None,
            signer: None,
        }
    }

    pub fn connected(network_id: u64, signer: SignerHandle) -> Self {
        Self {
            status: SessionStatus::Connected,
            network_id: Some(network_id),
            signer: Some(signer),
        }
    }

    pub fn network_mismatch(network_id: u64) -> Self {
        Self {
            status: SessionStatus::NetworkMismatch,
            network_id: Some(network_id),
            signer: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn network_id(&self) -> Option<u64> {
        self.network_id
    }

    pub fn signer(&self) -> Option<&SignerHandle> {
        self.signer.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }
}

impl Default for WalletSession {
    fn default() -> Self {
        Self::disconnected()
    }
}
