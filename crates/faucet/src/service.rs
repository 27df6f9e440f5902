//! Faucet service: serializes ledger operations and wires up collaborators

use crate::clock::SystemClock;
use crate::config::FaucetConfig;
use crate::database::{LedgerDatabase, LedgerStatistics};
use crate::error::FaucetResult;
use crate::events::{EventRecord, EventSubscriber};
use crate::ledger::{Collaborators, DeployParams, Faucet, WithdrawalLimits};
use crate::registry::StaticRegistry;
use crate::token::TokenResolver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tco2_common::types::{amount_serde, amount_vec_serde};
use tco2_common::{Address, Amount};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Which ledger operation a receipt is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deposit,
    Withdraw,
    OwnerWithdraw,
}

/// Result of a successful token movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub operation: Operation,
    pub caller: Address,
    pub token: Address,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    /// Custody balance after the operation
    #[serde(with = "amount_serde")]
    pub custody_balance: Amount,
}

/// Cooldown state of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownStatus {
    pub account: Address,
    pub in_timeout: bool,
    pub remaining_secs: u64,
}

/// Faucet status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetStatus {
    pub address: Address,
    pub owner: Address,
    pub limits: WithdrawalLimits,
    pub statistics: LedgerStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalances {
    pub tokens: Vec<Address>,
    #[serde(with = "amount_vec_serde")]
    pub balances: Vec<Amount>,
}

/// Faucet service
pub struct FaucetService {
    faucet: Mutex<Faucet>,
    tokens: Arc<dyn TokenResolver>,
    address: Address,
}

impl FaucetService {
    pub fn new(faucet: Faucet, tokens: Arc<dyn TokenResolver>) -> Self {
        let address = faucet.address();
        Self {
            faucet: Mutex::new(faucet),
            tokens,
            address,
        }
    }

    /// Seed configured tokens, build the registry and deploy (or reopen) the ledger.
    /// Tokens already present in the database keep their stored balances.
    pub fn from_config(config: &FaucetConfig, database: LedgerDatabase) -> FaucetResult<Self> {
        config.validate()?;

        let tokens = Arc::new(database.tokens()?);
        for seed in &config.tokens {
            let holders: Vec<(Address, Amount)> = seed
                .holders
                .iter()
                .map(|holder| (holder.address, holder.amount))
                .collect();
            if !tokens.seed(seed.address, &holders)? {
                debug!("Token {} already seeded", seed.address);
            }
        }

        let registry = Arc::new(StaticRegistry::new(config.registry_tokens.iter().copied()));

        let params = DeployParams {
            deployer: config.owner,
            deployer_nonce: config.deployer_nonce,
            limits: config.limits,
            eligible_pools: config.eligible_pools.clone(),
            event_capacity: config.event_capacity,
        };

        let faucet = Faucet::deploy(
            params,
            database,
            Collaborators {
                registry,
                tokens: tokens.clone(),
                clock: Arc::new(SystemClock),
            },
        )?;

        Ok(Self::new(faucet, tokens))
    }

    /// Custody address
    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn status(&self) -> FaucetResult<FaucetStatus> {
        let faucet = self.faucet.lock().await;
        Ok(FaucetStatus {
            address: faucet.address(),
            owner: faucet.owner(),
            limits: faucet.limits(),
            statistics: faucet.statistics()?,
        })
    }

    pub async fn is_pool_eligible(&self, token: &Address) -> FaucetResult<bool> {
        self.faucet.lock().await.is_pool_eligible(token)
    }

    pub async fn set_pool_eligible(
        &self,
        caller: &Address,
        token: Address,
        eligible: bool,
    ) -> FaucetResult<()> {
        self.faucet.lock().await.set_pool_eligible(caller, token, eligible)
    }

    pub async fn token_balances(&self, tokens: Vec<Address>) -> FaucetResult<TokenBalances> {
        let balances = self.faucet.lock().await.token_balances(&tokens)?;
        Ok(TokenBalances { tokens, balances })
    }

    /// Let the custody address pull `amount` of `token` from `caller`
    pub async fn approve(&self, caller: &Address, token: &Address, amount: Amount) -> FaucetResult<()> {
        self.tokens.resolve(token)?.approve(caller, &self.address, amount)?;
        info!("{} approved {} of {} for the faucet", caller, amount, token);
        Ok(())
    }

    pub async fn deposit(&self, caller: Address, token: Address, amount: Amount) -> FaucetResult<LedgerReceipt> {
        let mut faucet = self.faucet.lock().await;
        faucet.deposit(&caller, token, amount)?;
        Ok(LedgerReceipt {
            operation: Operation::Deposit,
            caller,
            token,
            amount,
            custody_balance: faucet.token_balance(&token)?,
        })
    }

    pub async fn withdraw(&self, caller: Address, token: Address, amount: Amount) -> FaucetResult<LedgerReceipt> {
        let mut faucet = self.faucet.lock().await;
        faucet.withdraw(&caller, token, amount)?;
        Ok(LedgerReceipt {
            operation: Operation::Withdraw,
            caller,
            token,
            amount,
            custody_balance: faucet.token_balance(&token)?,
        })
    }

    pub async fn owner_withdraw(
        &self,
        caller: Address,
        token: Address,
        amount: Amount,
    ) -> FaucetResult<LedgerReceipt> {
        let mut faucet = self.faucet.lock().await;
        faucet.owner_withdraw(&caller, token, amount)?;
        Ok(LedgerReceipt {
            operation: Operation::OwnerWithdraw,
            caller,
            token,
            amount,
            custody_balance: faucet.token_balance(&token)?,
        })
    }

    pub async fn transfer_ownership(&self, caller: &Address, new_owner: Address) -> FaucetResult<()> {
        self.faucet.lock().await.transfer_ownership(caller, new_owner)
    }

    pub async fn cooldown(&self, account: Address) -> FaucetResult<CooldownStatus> {
        let remaining = self
            .faucet
            .lock()
            .await
            .withdrawal_cooldown_remaining(&account)?;
        Ok(CooldownStatus {
            account,
            in_timeout: remaining.is_some(),
            remaining_secs: remaining.unwrap_or(0),
        })
    }

    pub async fn recent_events(&self, limit: usize) -> FaucetResult<Vec<EventRecord>> {
        self.faucet.lock().await.recent_events(limit)
    }

    pub async fn subscribe(&self) -> EventSubscriber {
        self.faucet.lock().await.subscribe()
    }

    pub async fn flush(&self) -> FaucetResult<()> {
        self.faucet.lock().await.flush()
    }
}
