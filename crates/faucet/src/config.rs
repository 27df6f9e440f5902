//! Faucet configuration

use crate::error::{FaucetError, FaucetResult};
use crate::ledger::WithdrawalLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tco2_common::types::amount_serde;
use tco2_common::utils::logging::LoggingConfig;
use tco2_common::{Address, Amount};

/// Default deployer: the first well-known local development account
pub const DEFAULT_OWNER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

/// Initial balance of one holder of a seeded token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHolder {
    pub address: Address,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

/// A token contract created when the service starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSeed {
    pub address: Address,
    #[serde(default)]
    pub holders: Vec<TokenHolder>,
}

/// Faucet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Server address
    pub server_addr: String,

    /// Database path
    pub db_path: String,

    /// Administrator; also the deployer the custody address derives from
    pub owner: Address,

    /// Deployer nonce used to derive the custody address
    pub deployer_nonce: u64,

    /// Cooldown and per-withdrawal maximum
    pub limits: WithdrawalLimits,

    /// Pools marked eligible at deployment
    pub eligible_pools: Vec<Address>,

    /// Tokens the contract registry recognises
    pub registry_tokens: Vec<Address>,

    /// Token contracts to create at startup
    pub tokens: Vec<TokenSeed>,

    /// Live event channel capacity
    pub event_capacity: usize,

    /// Enable CORS
    pub cors_enabled: bool,

    pub logging: LoggingConfig,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:3000".to_string(),
            db_path: "./faucet_data".to_string(),
            owner: DEFAULT_OWNER.parse().unwrap_or(Address::ZERO),
            deployer_nonce: 0,
            limits: WithdrawalLimits::default(),
            eligible_pools: Vec::new(),
            registry_tokens: Vec::new(),
            tokens: Vec::new(),
            event_capacity: 1024,
            cors_enabled: true,
            logging: LoggingConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> FaucetResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| FaucetError::Config(format!("{}: {}", key, e)))
}

fn parse_address_list(key: &str, value: &str) -> FaucetResult<Vec<Address>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_env(key, s))
        .collect()
}

impl FaucetConfig {
    /// Load from a TOML/YAML/JSON file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> FaucetResult<Self> {
        tco2_common::utils::config::load_config(path)
            .map_err(|e| FaucetError::Config(format!("{:#}", e)))
    }

    /// Override fields from `FAUCET_*` environment variables
    pub fn apply_env(&mut self) -> FaucetResult<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F: Fn(&str) -> Option<String>>(&mut self, var: F) -> FaucetResult<()> {
        if let Some(addr) = var("FAUCET_SERVER_ADDR") {
            self.server_addr = addr;
        }

        if let Some(db_path) = var("FAUCET_DB_PATH") {
            self.db_path = db_path;
        }

        if let Some(owner) = var("FAUCET_OWNER") {
            self.owner = parse_env("FAUCET_OWNER", &owner)?;
        }

        if let Some(nonce) = var("FAUCET_DEPLOYER_NONCE") {
            self.deployer_nonce = parse_env("FAUCET_DEPLOYER_NONCE", &nonce)?;
        }

        if let Some(timeout) = var("FAUCET_TIMEOUT_LIMIT") {
            self.limits.timeout_limit_secs = parse_env("FAUCET_TIMEOUT_LIMIT", &timeout)?;
        }

        if let Some(max_amount) = var("FAUCET_MAX_WITHDRAWAL_AMOUNT") {
            self.limits.max_withdrawal_amount =
                parse_env("FAUCET_MAX_WITHDRAWAL_AMOUNT", &max_amount)?;
        }

        if let Some(pools) = var("FAUCET_ELIGIBLE_POOLS") {
            self.eligible_pools = parse_address_list("FAUCET_ELIGIBLE_POOLS", &pools)?;
        }

        if let Some(tokens) = var("FAUCET_REGISTRY_TOKENS") {
            self.registry_tokens = parse_address_list("FAUCET_REGISTRY_TOKENS", &tokens)?;
        }

        if let Some(level) = var("FAUCET_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Reject configurations the ledger cannot run with
    pub fn validate(&self) -> FaucetResult<()> {
        if self.owner.is_zero() {
            return Err(FaucetError::Config("owner must not be the zero address".to_string()));
        }
        self.limits.validate()?;
        if self.event_capacity == 0 {
            return Err(FaucetError::Config("event_capacity must be greater than zero".to_string()));
        }
        Ok(())
    }
}
