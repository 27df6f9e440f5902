//! Fungible token collaborators
//!
//! The ledger never tracks balances itself. Custody balances and transfers
//! are delegated to token contracts through [`Erc20Token`]; a
//! [`TokenResolver`] maps a token address to its contract handle.
//!
//! [`TokenStore`] keeps token books in sled so that they live and persist
//! alongside the ledger state.

use crate::error::TokenError;
use sled::transaction::{abort, ConflictableTransactionResult, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::sync::Arc;
use tco2_common::{Address, Amount};
use tracing::{debug, info};

/// Standard fungible token surface. `owner`/`from`/`spender` stand in for
/// the `msg.sender` of the token call.
pub trait Erc20Token: Send + Sync {
    fn address(&self) -> Address;

    fn balance_of(&self, owner: &Address) -> Result<Amount, TokenError>;

    fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, TokenError>;

    fn approve(&self, owner: &Address, spender: &Address, amount: Amount) -> Result<(), TokenError>;

    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError>;

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError>;
}

/// Looks up token contracts by address
pub trait TokenResolver: Send + Sync {
    fn resolve(&self, token: &Address) -> Result<Arc<dyn Erc20Token>, TokenError>;
}

fn balance_key(token: &Address, owner: &Address) -> Vec<u8> {
    [token.as_bytes(), owner.as_bytes()].concat()
}

fn allowance_key(token: &Address, owner: &Address, spender: &Address) -> Vec<u8> {
    [token.as_bytes(), owner.as_bytes(), spender.as_bytes()].concat()
}

fn decode_amount(bytes: &[u8]) -> Result<Amount, TokenError> {
    <[u8; 16]>::try_from(bytes)
        .map(Amount::from_be_bytes)
        .map_err(|_| TokenError::Storage("Invalid amount format".to_string()))
}

fn read_amount(tree: &Tree, key: &[u8]) -> Result<Amount, TokenError> {
    match tree.get(key)? {
        Some(bytes) => decode_amount(&bytes),
        None => Ok(0),
    }
}

fn tx_amount(tree: &TransactionalTree, key: &[u8]) -> ConflictableTransactionResult<Amount, TokenError> {
    match tree.get(key)? {
        Some(bytes) => match decode_amount(&bytes) {
            Ok(amount) => Ok(amount),
            Err(e) => abort(e),
        },
        None => Ok(0),
    }
}

fn tx_credit(
    balances: &TransactionalTree,
    key: &[u8],
    amount: Amount,
) -> ConflictableTransactionResult<(), TokenError> {
    let balance = tx_amount(balances, key)?;
    let credited = match balance.checked_add(amount) {
        Some(credited) => credited,
        None => return abort(TokenError::Overflow),
    };
    balances.insert(key, &credited.to_be_bytes()[..])?;
    Ok(())
}

fn tx_move(
    balances: &TransactionalTree,
    token: &Address,
    from: &Address,
    to: &Address,
    amount: Amount,
) -> ConflictableTransactionResult<(), TokenError> {
    if to.is_zero() {
        return abort(TokenError::ZeroAddress);
    }

    let from_key = balance_key(token, from);
    let balance = tx_amount(balances, &from_key)?;
    if balance < amount {
        return abort(TokenError::InsufficientBalance { balance, amount });
    }

    balances.insert(from_key, &(balance - amount).to_be_bytes()[..])?;
    tx_credit(balances, &balance_key(token, to), amount)
}

/// One ERC-20 book inside a [`TokenStore`]. Infinite approvals
/// (`Amount::MAX`) are not decremented.
pub struct StoredToken {
    address: Address,
    balances: Tree,
    allowances: Tree,
}

impl StoredToken {
    /// Credit `amount` to `to` out of thin air
    pub fn mint(&self, to: &Address, amount: Amount) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        let key = balance_key(&self.address, to);
        self.balances.transaction(|balances| tx_credit(balances, &key, amount))?;
        debug!("Minted {} of {} to {}", amount, self.address, to);
        Ok(())
    }
}

impl Erc20Token for StoredToken {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, owner: &Address) -> Result<Amount, TokenError> {
        read_amount(&self.balances, &balance_key(&self.address, owner))
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, TokenError> {
        read_amount(&self.allowances, &allowance_key(&self.address, owner, spender))
    }

    fn approve(&self, owner: &Address, spender: &Address, amount: Amount) -> Result<(), TokenError> {
        if spender.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.allowances.insert(
            allowance_key(&self.address, owner, spender),
            &amount.to_be_bytes()[..],
        )?;
        Ok(())
    }

    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        self.balances
            .transaction(|balances| tx_move(balances, &self.address, from, to, amount))?;
        Ok(())
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let key = allowance_key(&self.address, from, spender);

        (&self.balances, &self.allowances).transaction(
            |(balances, allowances)| -> ConflictableTransactionResult<(), TokenError> {
                let allowance = tx_amount(allowances, &key)?;
                if allowance < amount {
                    return abort(TokenError::InsufficientAllowance { allowance, amount });
                }

                tx_move(balances, &self.address, from, to, amount)?;

                if allowance != Amount::MAX {
                    allowances.insert(key.as_slice(), &(allowance - amount).to_be_bytes()[..])?;
                }
                Ok(())
            },
        )?;
        Ok(())
    }
}

/// Token contracts kept in sled trees
///
/// - `token_contracts`: token -> marker
/// - `token_balances`: token ++ owner -> u128 (big endian)
/// - `token_allowances`: token ++ owner ++ spender -> u128 (big endian)
#[derive(Clone)]
pub struct TokenStore {
    // keeps a temporary database alive
    _db: Db,
    contracts: Tree,
    balances: Tree,
    allowances: Tree,
}

impl TokenStore {
    /// Open the token trees of an existing sled database
    pub fn from_db(db: &Db) -> Result<Self, TokenError> {
        Ok(Self {
            _db: db.clone(),
            contracts: db.open_tree("token_contracts")?,
            balances: db.open_tree("token_balances")?,
            allowances: db.open_tree("token_allowances")?,
        })
    }

    /// Throwaway store, removed on drop
    pub fn temporary() -> Result<Self, TokenError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(&db)
    }

    fn handle(&self, address: Address) -> Arc<StoredToken> {
        Arc::new(StoredToken {
            address,
            balances: self.balances.clone(),
            allowances: self.allowances.clone(),
        })
    }

    pub fn contains(&self, address: &Address) -> Result<bool, TokenError> {
        Ok(self.contracts.contains_key(address.as_bytes())?)
    }

    /// Register a token at `address`, returning the existing one if already deployed
    pub fn deploy(&self, address: Address) -> Result<Arc<StoredToken>, TokenError> {
        self.contracts.insert(address.as_bytes(), &[1u8][..])?;
        Ok(self.handle(address))
    }

    /// Deploy `address` with initial `holders` in one step.
    /// Returns `false` without minting if the token already exists.
    pub fn seed(&self, address: Address, holders: &[(Address, Amount)]) -> Result<bool, TokenError> {
        if let Some((holder, _)) = holders.iter().find(|(holder, _)| holder.is_zero()) {
            debug!("Refusing to seed {} to {}", address, holder);
            return Err(TokenError::ZeroAddress);
        }

        let created = (&self.contracts, &self.balances).transaction(
            |(contracts, balances)| -> ConflictableTransactionResult<bool, TokenError> {
                if contracts.get(address.as_bytes())?.is_some() {
                    return Ok(false);
                }
                for (holder, amount) in holders {
                    tx_credit(balances, &balance_key(&address, holder), *amount)?;
                }
                contracts.insert(address.as_bytes(), &[1u8][..])?;
                Ok(true)
            },
        )?;

        if created {
            info!("Token {} seeded with {} holders", address, holders.len());
        }
        Ok(created)
    }
}

impl TokenResolver for TokenStore {
    fn resolve(&self, token: &Address) -> Result<Arc<dyn Erc20Token>, TokenError> {
        if !self.contains(token)? {
            return Err(TokenError::UnknownToken(*token));
        }
        Ok(self.handle(*token))
    }
}
