//! The faucet ledger
//!
//! A rate-limited custody ledger over whitelisted tokens. Callers deposit
//! eligible tokens into custody and withdraw them back out, at most
//! `max_withdrawal_amount` at a time and no more than once per
//! `timeout_limit_secs`. The owner manages eligibility and can withdraw
//! without either limit.
//!
//! Mutating operations take `&mut self`: the ledger is a single-threaded
//! state machine and callers are expected to serialize access. Every
//! operation either fully succeeds or leaves the stored state untouched.

use crate::clock::Clock;
use crate::database::{LedgerDatabase, LedgerStatistics};
use crate::error::{FaucetError, FaucetResult};
use crate::events::{EventPublisher, EventRecord, EventSubscriber, LedgerEvent};
use crate::registry::ContractRegistry;
use crate::token::{Erc20Token, TokenResolver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tco2_common::types::amount_serde;
use tco2_common::{Address, Amount};
use tracing::{debug, info, warn};

/// Seconds an account must wait between withdrawals
pub const DEFAULT_TIMEOUT_LIMIT_SECS: u64 = 30;

/// 5 tokens at 18 decimals
pub const DEFAULT_MAX_WITHDRAWAL_AMOUNT: Amount = 5_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalLimits {
    pub timeout_limit_secs: u64,
    #[serde(with = "amount_serde")]
    pub max_withdrawal_amount: Amount,
}

impl WithdrawalLimits {
    /// Reject limits the ledger cannot enforce
    pub fn validate(&self) -> FaucetResult<()> {
        if self.max_withdrawal_amount == 0 {
            return Err(FaucetError::Config(
                "max_withdrawal_amount must be greater than zero".to_string(),
            ));
        }
        if i64::try_from(self.timeout_limit_secs).is_err() {
            return Err(FaucetError::Config(format!(
                "timeout_limit_secs must be at most {}",
                i64::MAX
            )));
        }
        Ok(())
    }
}

impl Default for WithdrawalLimits {
    fn default() -> Self {
        Self {
            timeout_limit_secs: DEFAULT_TIMEOUT_LIMIT_SECS,
            max_withdrawal_amount: DEFAULT_MAX_WITHDRAWAL_AMOUNT,
        }
    }
}

/// Constructor arguments
#[derive(Debug, Clone)]
pub struct DeployParams {
    /// Becomes the owner
    pub deployer: Address,
    pub deployer_nonce: u64,
    pub limits: WithdrawalLimits,
    /// Marked eligible on first deployment
    pub eligible_pools: Vec<Address>,
    pub event_capacity: usize,
}

impl DeployParams {
    pub fn new(deployer: Address) -> Self {
        Self {
            deployer,
            deployer_nonce: 0,
            limits: WithdrawalLimits::default(),
            eligible_pools: Vec::new(),
            event_capacity: 1024,
        }
    }
}

/// External systems the ledger talks to
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn ContractRegistry>,
    pub tokens: Arc<dyn TokenResolver>,
    pub clock: Arc<dyn Clock>,
}

pub struct Faucet {
    address: Address,
    owner: Address,
    limits: WithdrawalLimits,
    database: LedgerDatabase,
    registry: Arc<dyn ContractRegistry>,
    tokens: Arc<dyn TokenResolver>,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
}

impl Faucet {
    /// Deploy a new ledger into `database`, or reattach to the one already stored there.
    ///
    /// On first deployment the deployer becomes owner and `eligible_pools` are
    /// flagged eligible. A reopened database keeps its owner, custody address
    /// and flags; only the limits are taken from `params`.
    pub fn deploy(
        params: DeployParams,
        database: LedgerDatabase,
        collaborators: Collaborators,
    ) -> FaucetResult<Self> {
        params.limits.validate()?;
        let stored_owner = database.owner()?;
        let stored_address = database.custody_address()?;

        let faucet = Self {
            address: stored_address
                .unwrap_or_else(|| Address::create(&params.deployer, params.deployer_nonce)),
            owner: stored_owner.unwrap_or(params.deployer),
            limits: params.limits,
            database,
            registry: collaborators.registry,
            tokens: collaborators.tokens,
            clock: collaborators.clock,
            events: EventPublisher::new(params.event_capacity),
        };

        if stored_owner.is_some() {
            info!(
                "Reopened faucet {} (owner {})",
                faucet.address, faucet.owner
            );
            return Ok(faucet);
        }

        if params.deployer.is_zero() {
            return Err(FaucetError::InvalidOwner);
        }

        // the owner is written last: its presence marks a completed deployment
        faucet.database.set_custody_address(&faucet.address)?;
        for pool in &params.eligible_pools {
            faucet.database.set_pool_eligibility(pool, true)?;
        }
        let record = faucet.database.transfer_owner(
            &params.deployer,
            faucet.clock.now(),
            LedgerEvent::OwnershipTransferred {
                previous_owner: Address::ZERO,
                new_owner: params.deployer,
            },
        )?;
        faucet.events.publish(record);

        info!(
            "Deployed faucet {} (owner {}, {} eligible pools)",
            faucet.address,
            faucet.owner,
            params.eligible_pools.len()
        );
        Ok(faucet)
    }

    /// Custody address holding all deposited tokens
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn limits(&self) -> WithdrawalLimits {
        self.limits
    }

    pub fn timeout_limit(&self) -> u64 {
        self.limits.timeout_limit_secs
    }

    pub fn max_withdrawal_amount(&self) -> Amount {
        self.limits.max_withdrawal_amount
    }

    fn only_owner(&self, caller: &Address) -> FaucetResult<()> {
        if *caller != self.owner {
            warn!("Rejected admin call from {}", caller);
            return Err(FaucetError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    fn token(&self, token: &Address) -> FaucetResult<Arc<dyn Erc20Token>> {
        Ok(self.tokens.resolve(token)?)
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> FaucetResult<()> {
        self.only_owner(caller)?;
        if new_owner.is_zero() {
            return Err(FaucetError::InvalidOwner);
        }

        let previous_owner = self.owner;
        let record = self.database.transfer_owner(
            &new_owner,
            self.clock.now(),
            LedgerEvent::OwnershipTransferred {
                previous_owner,
                new_owner,
            },
        )?;
        self.owner = new_owner;
        self.events.publish(record);

        info!("Ownership transferred from {} to {}", previous_owner, new_owner);
        Ok(())
    }

    pub fn set_pool_eligible(
        &mut self,
        caller: &Address,
        token: Address,
        eligible: bool,
    ) -> FaucetResult<()> {
        self.only_owner(caller)?;
        self.database.set_pool_eligibility(&token, eligible)?;
        info!("Pool {} marked {}", token, if eligible { "eligible" } else { "ineligible" });
        Ok(())
    }

    /// Explicit flag if one was set, otherwise whatever the registry says
    pub fn is_pool_eligible(&self, token: &Address) -> FaucetResult<bool> {
        match self.database.pool_eligibility(token)? {
            Some(eligible) => Ok(eligible),
            None => Ok(self.registry.check_erc20(token)),
        }
    }

    fn ensure_eligible(&self, token: &Address) -> FaucetResult<()> {
        if !self.is_pool_eligible(token)? {
            warn!("Token {} rejected", token);
            return Err(FaucetError::TokenRejected(*token));
        }
        Ok(())
    }

    /// Custody balance of a single token
    pub fn token_balance(&self, token: &Address) -> FaucetResult<Amount> {
        Ok(self.token(token)?.balance_of(&self.address)?)
    }

    /// Custody balance of each token, in input order
    pub fn token_balances(&self, tokens: &[Address]) -> FaucetResult<Vec<Amount>> {
        tokens.iter().map(|token| self.token_balance(token)).collect()
    }

    /// Pull `amount` of `token` from `caller` into custody.
    /// The caller must have approved the custody address beforehand.
    pub fn deposit(&mut self, caller: &Address, token: Address, amount: Amount) -> FaucetResult<()> {
        self.ensure_eligible(&token)?;
        let contract = self.token(&token)?;

        let record = self
            .database
            .append_event(self.clock.now(), LedgerEvent::Deposited { token, amount })?;

        if let Err(e) = contract.transfer_from(&self.address, caller, &self.address, amount) {
            self.database.retract_event(&record)?;
            return Err(e.into());
        }
        self.events.publish(record);

        info!("{} deposited {} of {}", caller, amount, contract.address());
        Ok(())
    }

    /// Seconds left before `caller` may withdraw again, `None` if it may withdraw now
    pub fn withdrawal_cooldown_remaining(&self, caller: &Address) -> FaucetResult<Option<u64>> {
        let last = match self.database.last_withdrawal(caller)? {
            Some(last) => last,
            None => return Ok(None),
        };

        let window = i64::try_from(self.limits.timeout_limit_secs).unwrap_or(i64::MAX);
        let ready_at = last.saturating_add(window);
        let now = self.clock.now();
        if now < ready_at {
            Ok(Some((ready_at - now) as u64))
        } else {
            Ok(None)
        }
    }

    /// Whether `caller` is still inside the cooldown window of its last withdrawal
    pub fn check_if_withdrawal_timeout(&self, caller: &Address) -> FaucetResult<bool> {
        Ok(self.withdrawal_cooldown_remaining(caller)?.is_some())
    }

    /// Release `amount` of `token` from custody to `caller`
    pub fn withdraw(&mut self, caller: &Address, token: Address, amount: Amount) -> FaucetResult<()> {
        self.ensure_eligible(&token)?;

        if amount > self.limits.max_withdrawal_amount {
            warn!("{} asked for {} of {}, above the maximum", caller, amount, token);
            return Err(FaucetError::AmountTooHigh {
                amount,
                max: self.limits.max_withdrawal_amount,
            });
        }

        if let Some(remaining_secs) = self.withdrawal_cooldown_remaining(caller)? {
            warn!("{} withdrew too recently, {}s remaining", caller, remaining_secs);
            return Err(FaucetError::WithdrawalTimeout { remaining_secs });
        }

        let contract = self.token(&token)?;
        let (previous, record) = self.database.record_withdrawal(
            caller,
            self.clock.now(),
            LedgerEvent::Withdrawn {
                account: *caller,
                token,
                amount,
            },
        )?;

        if let Err(e) = contract.transfer(&self.address, caller, amount) {
            self.database.revert_withdrawal(caller, previous, &record)?;
            return Err(e.into());
        }
        self.events.publish(record);

        info!("{} withdrew {} of {}", caller, amount, contract.address());
        Ok(())
    }

    /// Owner-only withdrawal with no cooldown or amount limit
    pub fn owner_withdraw(&mut self, caller: &Address, token: Address, amount: Amount) -> FaucetResult<()> {
        self.only_owner(caller)?;

        self.token(&token)?.transfer(&self.address, &self.owner, amount)?;

        info!("Owner withdrew {} of {}", amount, token);
        Ok(())
    }

    pub fn subscribe(&self) -> EventSubscriber {
        let subscriber = self.events.subscribe();
        debug!(
            "New ledger event subscriber ({} active)",
            self.events.active_subscribers()
        );
        subscriber
    }

    /// Persisted events, newest first
    pub fn recent_events(&self, limit: usize) -> FaucetResult<Vec<EventRecord>> {
        self.database.recent_events(limit)
    }

    pub fn statistics(&self) -> FaucetResult<LedgerStatistics> {
        self.database.statistics()
    }

    pub fn flush(&self) -> FaucetResult<()> {
        self.database.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TokenError;
    use crate::registry::StaticRegistry;
    use crate::token::TokenStore;
    use std::sync::Mutex;

    const START: i64 = 1_700_000_000;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    /// Token double that records transfers and returns whatever it is told to
    #[derive(Default)]
    struct FakeToken {
        balance: Mutex<Amount>,
        fail_transfers: Mutex<bool>,
        transfers: Mutex<Vec<(Address, Address, Amount)>>,
        transfers_from: Mutex<Vec<(Address, Address, Address, Amount)>>,
    }

    impl Erc20Token for FakeToken {
        fn address(&self) -> Address {
            Address::ZERO
        }

        fn balance_of(&self, _owner: &Address) -> Result<Amount, TokenError> {
            Ok(*self.balance.lock().unwrap())
        }

        fn allowance(&self, _owner: &Address, _spender: &Address) -> Result<Amount, TokenError> {
            Ok(Amount::MAX)
        }

        fn approve(&self, _owner: &Address, _spender: &Address, _amount: Amount) -> Result<(), TokenError> {
            Ok(())
        }

        fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
            if *self.fail_transfers.lock().unwrap() {
                return Err(TokenError::InsufficientBalance { balance: 0, amount });
            }
            self.transfers.lock().unwrap().push((*from, *to, amount));
            Ok(())
        }

        fn transfer_from(
            &self,
            spender: &Address,
            from: &Address,
            to: &Address,
            amount: Amount,
        ) -> Result<(), TokenError> {
            if *self.fail_transfers.lock().unwrap() {
                return Err(TokenError::InsufficientAllowance { allowance: 0, amount });
            }
            self.transfers_from
                .lock()
                .unwrap()
                .push((*spender, *from, *to, amount));
            Ok(())
        }
    }

    struct FakeTokens(Vec<(Address, Arc<FakeToken>)>);

    impl TokenResolver for FakeTokens {
        fn resolve(&self, token: &Address) -> Result<Arc<dyn Erc20Token>, TokenError> {
            self.0
                .iter()
                .find(|(a, _)| a == token)
                .map(|(_, t)| t.clone() as Arc<dyn Erc20Token>)
                .ok_or(TokenError::UnknownToken(*token))
        }
    }

    struct Fixture {
        faucet: Faucet,
        owner: Address,
        alice: Address,
        pool1: Address,
        pool2: Address,
        pool3: Address,
        fake1: Arc<FakeToken>,
        fake2: Arc<FakeToken>,
        registry: Arc<StaticRegistry>,
        clock: Arc<ManualClock>,
    }

    /// Owner deploys with pool1 and pool2 eligible; the registry accepts every pool.
    fn fixture() -> Fixture {
        let owner = addr(1);
        let (pool1, pool2, pool3) = (addr(101), addr(102), addr(103));
        let fake1 = Arc::new(FakeToken::default());
        let fake2 = Arc::new(FakeToken::default());
        let fake3 = Arc::new(FakeToken::default());

        let registry = Arc::new(StaticRegistry::new([pool1, pool2, pool3]));
        let clock = Arc::new(ManualClock::new(START));
        let tokens = Arc::new(FakeTokens(vec![
            (pool1, fake1.clone()),
            (pool2, fake2.clone()),
            (pool3, fake3),
        ]));

        let mut params = DeployParams::new(owner);
        params.eligible_pools = vec![pool1, pool2];

        let faucet = Faucet::deploy(
            params,
            LedgerDatabase::temporary().unwrap(),
            Collaborators {
                registry: registry.clone(),
                tokens,
                clock: clock.clone(),
            },
        )
        .unwrap();

        Fixture {
            faucet,
            owner,
            alice: addr(2),
            pool1,
            pool2,
            pool3,
            fake1,
            fake2,
            registry,
            clock,
        }
    }

    #[test]
    fn test_deploy_sets_owner_and_pools() {
        let f = fixture();
        assert_eq!(f.faucet.owner(), f.owner);
        assert_eq!(f.faucet.address(), Address::create(&f.owner, 0));
        assert_eq!(f.faucet.timeout_limit(), 30);
        assert_eq!(f.faucet.max_withdrawal_amount(), DEFAULT_MAX_WITHDRAWAL_AMOUNT);

        f.registry.revoke(&f.pool1);
        assert!(f.faucet.is_pool_eligible(&f.pool1).unwrap());
    }

    #[test]
    fn test_set_pool_eligible_requires_owner() {
        let mut f = fixture();
        let err = f.faucet.set_pool_eligible(&f.alice, f.pool1, false).unwrap_err();
        assert!(matches!(err, FaucetError::Unauthorized { .. }));
        assert!(f.faucet.is_pool_eligible(&f.pool1).unwrap());
    }

    #[test]
    fn test_sets_pool_eligible() {
        let mut f = fixture();
        f.registry.revoke(&f.pool3);
        let owner = f.owner;
        f.faucet.set_pool_eligible(&owner, f.pool3, true).unwrap();
        assert!(f.faucet.is_pool_eligible(&f.pool3).unwrap());
    }

    #[test]
    fn test_explicit_ineligibility_overrides_registry() {
        let mut f = fixture();
        let owner = f.owner;
        f.faucet.set_pool_eligible(&owner, f.pool2, false).unwrap();

        assert!(f.registry.check_erc20(&f.pool2));
        assert!(!f.faucet.is_pool_eligible(&f.pool2).unwrap());
    }

    #[test]
    fn test_unset_pool_falls_back_to_registry() {
        let f = fixture();
        assert!(f.faucet.is_pool_eligible(&f.pool3).unwrap());
        f.registry.revoke(&f.pool3);
        assert!(!f.faucet.is_pool_eligible(&f.pool3).unwrap());
    }

    #[test]
    fn test_token_balances_in_order() {
        let f = fixture();
        *f.fake1.balance.lock().unwrap() = 42;
        *f.fake2.balance.lock().unwrap() = 3;

        assert_eq!(f.faucet.token_balances(&[f.pool1]).unwrap(), vec![42]);
        assert_eq!(f.faucet.token_balances(&[f.pool1, f.pool2]).unwrap(), vec![42, 3]);
        assert_eq!(f.faucet.token_balances(&[f.pool2, f.pool1]).unwrap(), vec![3, 42]);
        assert!(f.faucet.token_balances(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_deposit_rejects_ineligible_token() {
        let mut f = fixture();
        f.registry.revoke(&f.pool3);
        let owner = f.owner;
        f.faucet.set_pool_eligible(&owner, f.pool1, false).unwrap();

        let alice = f.alice;
        let err = f.faucet.deposit(&alice, f.pool3, 42).unwrap_err();
        assert!(matches!(err, FaucetError::TokenRejected(t) if t == f.pool3));
        let err = f.faucet.deposit(&alice, f.pool1, 42).unwrap_err();
        assert!(matches!(err, FaucetError::TokenRejected(_)));
    }

    #[test]
    fn test_deposit_pulls_from_sender() {
        let mut f = fixture();
        let alice = f.alice;
        let custody = f.faucet.address();
        let mut events = f.faucet.subscribe();

        f.faucet.deposit(&alice, f.pool1, 42).unwrap();

        assert_eq!(
            *f.fake1.transfers_from.lock().unwrap(),
            vec![(custody, alice, custody, 42)]
        );
        let record = events.try_recv().unwrap();
        assert_eq!(record.event, LedgerEvent::Deposited { token: f.pool1, amount: 42 });
    }

    #[test]
    fn test_failed_deposit_leaves_no_event() {
        let mut f = fixture();
        let alice = f.alice;
        let mut events = f.faucet.subscribe();
        *f.fake1.fail_transfers.lock().unwrap() = true;

        let err = f.faucet.deposit(&alice, f.pool1, 42).unwrap_err();
        assert!(matches!(err, FaucetError::Token(TokenError::InsufficientAllowance { .. })));

        let stats = f.faucet.statistics().unwrap();
        assert_eq!(stats.deposits, 0);
        assert_eq!(stats.total_events, 1);
        assert!(events.try_recv().is_none());

        *f.fake1.fail_transfers.lock().unwrap() = false;
        f.faucet.deposit(&alice, f.pool1, 42).unwrap();
        assert_eq!(f.faucet.statistics().unwrap().deposits, 1);
    }

    #[test]
    fn test_deposit_ignores_cooldown() {
        let mut f = fixture();
        let alice = f.alice;
        f.faucet.withdraw(&alice, f.pool1, 1).unwrap();
        assert!(f.faucet.check_if_withdrawal_timeout(&alice).unwrap());
        f.faucet.deposit(&alice, f.pool1, 1).unwrap();
    }

    #[test]
    fn test_no_timeout_before_first_withdrawal() {
        let f = fixture();
        assert!(!f.faucet.check_if_withdrawal_timeout(&f.alice).unwrap());
        assert_eq!(f.faucet.withdrawal_cooldown_remaining(&f.alice).unwrap(), None);
    }

    #[test]
    fn test_timeout_right_after_withdrawal() {
        let mut f = fixture();
        let alice = f.alice;
        f.faucet.withdraw(&alice, f.pool1, 42).unwrap();

        assert!(f.faucet.check_if_withdrawal_timeout(&alice).unwrap());
        assert_eq!(f.faucet.withdrawal_cooldown_remaining(&alice).unwrap(), Some(30));
    }

    #[test]
    fn test_timeout_boundary() {
        let mut f = fixture();
        let alice = f.alice;
        f.faucet.withdraw(&alice, f.pool1, 42).unwrap();

        f.clock.advance(29);
        assert!(f.faucet.check_if_withdrawal_timeout(&alice).unwrap());
        f.clock.advance(1);
        assert!(!f.faucet.check_if_withdrawal_timeout(&alice).unwrap());
    }

    #[test]
    fn test_withdraw_rejects_ineligible_token() {
        let mut f = fixture();
        f.registry.revoke(&f.pool3);
        let alice = f.alice;
        let err = f.faucet.withdraw(&alice, f.pool3, 42).unwrap_err();
        assert!(matches!(err, FaucetError::TokenRejected(_)));
        assert!(!f.faucet.check_if_withdrawal_timeout(&alice).unwrap());
    }

    #[test]
    fn test_withdraw_twice_hits_timeout() {
        let mut f = fixture();
        let alice = f.alice;
        f.faucet.withdraw(&alice, f.pool1, 42).unwrap();

        let err = f.faucet.withdraw(&alice, f.pool1, 42).unwrap_err();
        assert!(matches!(err, FaucetError::WithdrawalTimeout { remaining_secs: 30 }));
        assert_eq!(err.to_string(), "Cannot withdraw that often");
    }

    #[test]
    fn test_cooldown_is_per_account() {
        let mut f = fixture();
        let (alice, owner) = (f.alice, f.owner);
        f.faucet.withdraw(&alice, f.pool1, 42).unwrap();
        f.faucet.withdraw(&owner, f.pool1, 42).unwrap();
    }

    #[test]
    fn test_cooldown_spans_tokens() {
        let mut f = fixture();
        let alice = f.alice;
        f.faucet.withdraw(&alice, f.pool1, 42).unwrap();
        let err = f.faucet.withdraw(&alice, f.pool2, 42).unwrap_err();
        assert!(matches!(err, FaucetError::WithdrawalTimeout { .. }));
    }

    #[test]
    fn test_withdraw_above_maximum() {
        let mut f = fixture();
        let alice = f.alice;
        let max = f.faucet.max_withdrawal_amount();

        let err = f.faucet.withdraw(&alice, f.pool1, max + 1).unwrap_err();
        assert!(matches!(err, FaucetError::AmountTooHigh { .. }));
        assert_eq!(err.to_string(), "Amount too high");

        f.faucet.withdraw(&alice, f.pool1, max).unwrap();
    }

    #[test]
    fn test_amount_too_high_while_cooling_down() {
        let mut f = fixture();
        let alice = f.alice;
        f.faucet.withdraw(&alice, f.pool1, 1).unwrap();

        let max = f.faucet.max_withdrawal_amount();
        let err = f.faucet.withdraw(&alice, f.pool1, max + 1).unwrap_err();
        assert!(matches!(err, FaucetError::AmountTooHigh { .. }));
    }

    #[test]
    fn test_withdraw_transfers_to_sender() {
        let mut f = fixture();
        let alice = f.alice;
        let custody = f.faucet.address();
        let mut events = f.faucet.subscribe();

        f.faucet.withdraw(&alice, f.pool1, 42).unwrap();

        assert_eq!(*f.fake1.transfers.lock().unwrap(), vec![(custody, alice, 42)]);
        assert_eq!(
            events.try_recv().unwrap().event,
            LedgerEvent::Withdrawn { account: alice, token: f.pool1, amount: 42 }
        );
    }

    #[test]
    fn test_withdraw_after_timeout() {
        let mut f = fixture();
        let alice = f.alice;
        f.faucet.withdraw(&alice, f.pool1, 42).unwrap();

        f.clock.advance(f.faucet.timeout_limit() + 1);

        f.faucet.withdraw(&alice, f.pool1, 42).unwrap();
        assert_eq!(f.fake1.transfers.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_transfer_leaves_no_cooldown() {
        let mut f = fixture();
        let alice = f.alice;
        *f.fake1.fail_transfers.lock().unwrap() = true;

        let err = f.faucet.withdraw(&alice, f.pool1, 42).unwrap_err();
        assert!(matches!(err, FaucetError::Token(_)));
        assert!(!f.faucet.check_if_withdrawal_timeout(&alice).unwrap());
        let stats = f.faucet.statistics().unwrap();
        assert_eq!(stats.withdrawals, 0);
        assert_eq!(stats.withdrawing_accounts, 0);
        assert_eq!(stats.total_events, 1);
    }

    #[test]
    fn test_failed_transfer_keeps_earlier_cooldown() {
        let mut f = fixture();
        let alice = f.alice;
        f.faucet.withdraw(&alice, f.pool1, 42).unwrap();
        f.clock.advance(31);
        *f.fake1.fail_transfers.lock().unwrap() = true;

        assert!(f.faucet.withdraw(&alice, f.pool1, 42).is_err());
        // the stored timestamp is still the first withdrawal's
        f.clock.set(START + 29);
        assert!(f.faucet.check_if_withdrawal_timeout(&alice).unwrap());
    }

    #[test]
    fn test_withdraw_unknown_token() {
        let mut f = fixture();
        let unknown = addr(999);
        f.registry.approve(unknown);
        let alice = f.alice;

        let err = f.faucet.withdraw(&alice, unknown, 1).unwrap_err();
        assert!(matches!(err, FaucetError::Token(TokenError::UnknownToken(_))));
        assert!(!f.faucet.check_if_withdrawal_timeout(&alice).unwrap());
    }

    #[test]
    fn test_owner_withdraw_requires_owner() {
        let mut f = fixture();
        let alice = f.alice;
        let err = f.faucet.owner_withdraw(&alice, f.pool1, 42).unwrap_err();
        assert!(err.to_string().contains("not the owner"));
    }

    #[test]
    fn test_owner_withdraw_bypasses_limits() {
        let mut f = fixture();
        let owner = f.owner;
        let custody = f.faucet.address();
        f.faucet.withdraw(&owner, f.pool1, 1).unwrap();

        let huge = f.faucet.max_withdrawal_amount() * 10;
        f.faucet.owner_withdraw(&owner, f.pool1, huge).unwrap();
        f.faucet.owner_withdraw(&owner, f.pool1, huge).unwrap();

        assert!(f.fake1.transfers.lock().unwrap().contains(&(custody, owner, huge)));
    }

    #[test]
    fn test_owner_withdraw_ignores_eligibility() {
        let mut f = fixture();
        let owner = f.owner;
        f.faucet.set_pool_eligible(&owner, f.pool1, false).unwrap();
        f.faucet.owner_withdraw(&owner, f.pool1, 5).unwrap();
    }

    #[test]
    fn test_transfer_ownership() {
        let mut f = fixture();
        let (owner, alice) = (f.owner, f.alice);

        assert!(matches!(
            f.faucet.transfer_ownership(&owner, Address::ZERO),
            Err(FaucetError::InvalidOwner)
        ));

        f.faucet.transfer_ownership(&owner, alice).unwrap();
        assert_eq!(f.faucet.owner(), alice);
        assert!(f.faucet.set_pool_eligible(&owner, f.pool1, false).is_err());
        f.faucet.set_pool_eligible(&alice, f.pool1, false).unwrap();
    }

    #[test]
    fn test_reopen_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger");
        let path = path.to_str().unwrap();
        let owner = addr(1);
        let alice = addr(2);
        let pool = addr(101);

        let tokens = Arc::new(TokenStore::temporary().unwrap());
        tokens.deploy(pool).unwrap();
        let clock = Arc::new(ManualClock::new(START));
        let collaborators = Collaborators {
            registry: Arc::new(StaticRegistry::default()),
            tokens,
            clock: clock.clone(),
        };

        let mut params = DeployParams::new(owner);
        params.eligible_pools = vec![pool];

        {
            let mut faucet =
                Faucet::deploy(params.clone(), LedgerDatabase::open(path).unwrap(), collaborators.clone())
                    .unwrap();
            faucet.transfer_ownership(&owner, alice).unwrap();
            faucet.flush().unwrap();
        }

        // a different deployer in the params does not take over a stored ledger
        params.deployer = addr(3);
        params.eligible_pools.clear();
        let faucet = Faucet::deploy(params, LedgerDatabase::open(path).unwrap(), collaborators).unwrap();
        assert_eq!(faucet.owner(), alice);
        assert_eq!(faucet.address(), Address::create(&owner, 0));
        assert!(faucet.is_pool_eligible(&pool).unwrap());
        assert_eq!(faucet.recent_events(10).unwrap().len(), 2);
    }

    #[test]
    fn test_deploy_rejects_zero_deployer() {
        let result = Faucet::deploy(
            DeployParams::new(Address::ZERO),
            LedgerDatabase::temporary().unwrap(),
            Collaborators {
                registry: Arc::new(StaticRegistry::default()),
                tokens: Arc::new(TokenStore::temporary().unwrap()),
                clock: Arc::new(ManualClock::new(START)),
            },
        );
        assert!(matches!(result, Err(FaucetError::InvalidOwner)));
    }

    #[test]
    fn test_deploy_rejects_unbounded_timeout() {
        let mut params = DeployParams::new(addr(1));
        params.limits.timeout_limit_secs = u64::MAX;

        let result = Faucet::deploy(
            params,
            LedgerDatabase::temporary().unwrap(),
            Collaborators {
                registry: Arc::new(StaticRegistry::default()),
                tokens: Arc::new(TokenStore::temporary().unwrap()),
                clock: Arc::new(ManualClock::new(START)),
            },
        );
        assert!(matches!(result, Err(FaucetError::Config(_))));
    }

    #[test]
    fn test_ownership_event_matches_owner() {
        let mut f = fixture();
        let (owner, alice) = (f.owner, f.alice);
        let mut events = f.faucet.subscribe();

        assert!(f.faucet.transfer_ownership(&alice, alice).is_err());
        assert!(events.try_recv().is_none());

        f.faucet.transfer_ownership(&owner, alice).unwrap();
        let expected = LedgerEvent::OwnershipTransferred { previous_owner: owner, new_owner: alice };
        assert_eq!(events.try_recv().unwrap().event, expected);
        assert_eq!(f.faucet.recent_events(1).unwrap()[0].event, expected);
    }
}
