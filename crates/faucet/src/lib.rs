//! TCO2 Faucet: a rate-limited custody ledger for whitelisted tokens
//!
//! Callers deposit eligible tokens into custody and withdraw them again with:
//! - A per-account cooldown between withdrawals
//! - A maximum amount per withdrawal
//! - Owner-managed token eligibility, falling back to a contract registry
//! - An owner withdrawal that bypasses both limits
//!
//! State is kept in sled; an axum service exposes the ledger over HTTP.

pub mod api;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod ledger;
pub mod registry;
pub mod service;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::FaucetConfig;
pub use database::{LedgerDatabase, LedgerStatistics};
pub use error::{FaucetError, FaucetResult, TokenError};
pub use events::{EventRecord, LedgerEvent};
pub use ledger::{Collaborators, DeployParams, Faucet, WithdrawalLimits};
pub use registry::{ContractRegistry, StaticRegistry};
pub use service::{FaucetService, FaucetStatus, LedgerReceipt};
pub use token::{Erc20Token, StoredToken, TokenResolver, TokenStore};
