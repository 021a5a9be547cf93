use alloy::primitives::Address;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::domain::MAX_DECIMALS;

/// Goerli, the chain the DCA contract was deployed to
pub const DEFAULT_CHAIN_ID: u64 = 5;

/// Uniswap V3 SwapRouter, same address on every chain it is deployed to
pub const DEFAULT_SWAP_ROUTER: &str = "0xE592427A0AEce92De3Edee1F18E0157C05861564";

/// Two days
pub const DEFAULT_LOCK_DURATION_SECS: u64 = 172_800;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub contract: ContractConfig,
    #[serde(default)]
    pub transactions: TransactionConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// The single chain the wallet must be on
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// How often the local wallet checks the endpoint's chain id
    #[serde(default = "default_chain_poll_interval")]
    pub chain_poll_interval_ms: u64,
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_chain_poll_interval() -> u64 {
    4000
}

impl NetworkConfig {
    pub fn chain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.chain_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
    /// Deployed DCA contract; also the spender for the invest allowance
    pub address: Address,
    /// Decimals of the deposit token (18 for DAI)
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
}

fn default_token_decimals() -> u8 {
    18
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionConfig {
    /// How long to wait for a submitted transaction to be mined
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

fn default_confirmation_timeout() -> u64 {
    300
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout(),
        }
    }
}

impl TransactionConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// Constructor arg: seconds deposits stay locked
    #[serde(default = "default_lock_duration")]
    pub lock_duration_secs: u64,
    /// Constructor arg: swap router the contract buys through
    #[serde(default = "default_swap_router")]
    pub swap_router: String,
}

fn default_lock_duration() -> u64 {
    DEFAULT_LOCK_DURATION_SECS
}

fn default_swap_router() -> String {
    DEFAULT_SWAP_ROUTER.to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            lock_duration_secs: default_lock_duration(),
            swap_router: default_swap_router(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("network.chain_id", DEFAULT_CHAIN_ID)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/mainnet.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DCA_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DCA__NETWORK__RPC_URL, etc.)
            .add_source(
                Environment::with_prefix("DCA")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values. `require_contract` is false only for deployment.
    pub fn validate(&self, require_contract: bool) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if url::Url::parse(&self.network.rpc_url).is_err() {
            errors.push(format!("network.rpc_url is not a URL: {}", self.network.rpc_url));
        }

        if self.network.chain_poll_interval_ms == 0 {
            errors.push("network.chain_poll_interval_ms must be positive".to_string());
        }

        if require_contract && self.contract.address == Address::ZERO {
            errors.push("contract.address must not be the zero address".to_string());
        }

        if self.contract.token_decimals > MAX_DECIMALS {
            errors.push(format!(
                "contract.token_decimals must be at most {}",
                MAX_DECIMALS
            ));
        }

        if self.transactions.confirmation_timeout_secs == 0 {
            errors.push("transactions.confirmation_timeout_secs must be positive".to_string());
        }

        if self.deploy.swap_router.parse::<Address>().is_err() {
            errors.push(format!(
                "deploy.swap_router is not an address: {}",
                self.deploy.swap_router
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
