//! Ledger storage
//!
//! All ledger state lives in sled trees: eligibility flags, per-account last
//! withdrawal times, the owner/custody metadata, and the event log. Writes
//! that pair a state change with its event go through one transaction.

use crate::error::{FaucetError, FaucetResult};
use crate::events::{EventRecord, LedgerEvent};
use crate::token::TokenStore;
use serde::{Deserialize, Serialize};
use sled::transaction::{abort, ConflictableTransactionResult, TransactionalTree};
use sled::{Db, IVec, Transactional, Tree};
use tco2_common::{Address, Timestamp};
use tracing::{debug, info};

const OWNER_KEY: &[u8] = b"owner";
const CUSTODY_KEY: &[u8] = b"custody_address";
const DEPOSITS_KEY: &[u8] = b"deposits";
const WITHDRAWALS_KEY: &[u8] = b"withdrawals";

/// Faucet ledger database
pub struct LedgerDatabase {
    db: Db,
    /// token -> eligibility flag (1 byte)
    eligible_pools: Tree,
    /// account -> last withdrawal timestamp (i64, big endian)
    last_withdrawals: Tree,
    /// sequence -> bincode EventRecord
    events: Tree,
    /// owner, custody address and event counters (u64, big endian)
    meta: Tree,
}

fn decode_timestamp(bytes: &[u8]) -> FaucetResult<Timestamp> {
    <[u8; 8]>::try_from(bytes)
        .map(Timestamp::from_be_bytes)
        .map_err(|_| FaucetError::InternalError("Invalid timestamp format".to_string()))
}

fn decode_counter(bytes: &[u8]) -> FaucetResult<u64> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .map_err(|_| FaucetError::InternalError("Invalid counter format".to_string()))
}

/// Counter bumped by an event, if any
fn counter_key(event: &LedgerEvent) -> Option<&'static [u8]> {
    match event {
        LedgerEvent::Deposited { .. } => Some(DEPOSITS_KEY),
        LedgerEvent::Withdrawn { .. } => Some(WITHDRAWALS_KEY),
        LedgerEvent::OwnershipTransferred { .. } => None,
    }
}

fn tx_count(
    meta: &TransactionalTree,
    event: &LedgerEvent,
    added: bool,
) -> ConflictableTransactionResult<(), FaucetError> {
    let key = match counter_key(event) {
        Some(key) => key,
        None => return Ok(()),
    };

    let current = match meta.get(key)? {
        Some(bytes) => match decode_counter(&bytes) {
            Ok(count) => count,
            Err(e) => return abort(e),
        },
        None => 0,
    };
    let updated = if added {
        current.saturating_add(1)
    } else {
        current.saturating_sub(1)
    };
    meta.insert(key, &updated.to_be_bytes()[..])?;
    Ok(())
}

fn tx_append(
    events: &TransactionalTree,
    meta: &TransactionalTree,
    record: &EventRecord,
    value: &[u8],
) -> ConflictableTransactionResult<(), FaucetError> {
    events.insert(&record.sequence.to_be_bytes()[..], value)?;
    tx_count(meta, &record.event, true)
}

fn tx_retract(
    events: &TransactionalTree,
    meta: &TransactionalTree,
    record: &EventRecord,
) -> ConflictableTransactionResult<(), FaucetError> {
    if events.remove(&record.sequence.to_be_bytes()[..])?.is_some() {
        tx_count(meta, &record.event, false)?;
    }
    Ok(())
}

impl LedgerDatabase {
    /// Create or open ledger database
    pub fn open(path: &str) -> FaucetResult<Self> {
        info!("Opening ledger database at: {}", path);

        let db = sled::Config::default()
            .path(path)
            .cache_capacity(64 * 1024 * 1024)
            .open()?;

        Self::from_db(db)
    }

    /// Throwaway database, removed on drop
    pub fn temporary() -> FaucetResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> FaucetResult<Self> {
        let eligible_pools = db.open_tree("eligible_pools")?;
        let last_withdrawals = db.open_tree("last_withdrawals")?;
        let events = db.open_tree("events")?;
        let meta = db.open_tree("meta")?;

        Ok(Self {
            db,
            eligible_pools,
            last_withdrawals,
            events,
            meta,
        })
    }

    /// Token books stored in the same database
    pub fn tokens(&self) -> FaucetResult<TokenStore> {
        Ok(TokenStore::from_db(&self.db)?)
    }

    fn read_address(&self, key: &[u8]) -> FaucetResult<Option<Address>> {
        match self.meta.get(key)? {
            Some(bytes) => Ok(Some(Address::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_counter(&self, key: &[u8]) -> FaucetResult<u64> {
        match self.meta.get(key)? {
            Some(bytes) => decode_counter(&bytes),
            None => Ok(0),
        }
    }

    pub fn owner(&self) -> FaucetResult<Option<Address>> {
        self.read_address(OWNER_KEY)
    }

    pub fn custody_address(&self) -> FaucetResult<Option<Address>> {
        self.read_address(CUSTODY_KEY)
    }

    pub fn set_custody_address(&self, address: &Address) -> FaucetResult<()> {
        self.meta.insert(CUSTODY_KEY, address.as_bytes())?;
        Ok(())
    }

    /// Explicit eligibility flag, `None` if never set
    pub fn pool_eligibility(&self, token: &Address) -> FaucetResult<Option<bool>> {
        Ok(self
            .eligible_pools
            .get(token.as_bytes())?
            .map(|value| value.first() == Some(&1)))
    }

    pub fn set_pool_eligibility(&self, token: &Address, eligible: bool) -> FaucetResult<()> {
        self.eligible_pools
            .insert(token.as_bytes(), IVec::from(&[eligible as u8][..]))?;
        debug!("Pool {} eligibility set to {}", token, eligible);
        Ok(())
    }

    pub fn last_withdrawal(&self, account: &Address) -> FaucetResult<Option<Timestamp>> {
        match self.last_withdrawals.get(account.as_bytes())? {
            Some(bytes) => Ok(Some(decode_timestamp(&bytes)?)),
            None => Ok(None),
        }
    }

    fn new_record(&self, timestamp: Timestamp, event: LedgerEvent) -> FaucetResult<(EventRecord, Vec<u8>)> {
        let record = EventRecord {
            sequence: self.db.generate_id()?,
            timestamp,
            event,
        };
        let value = bincode::serialize(&record)?;
        Ok((record, value))
    }

    /// Append an event to the log
    pub fn append_event(&self, timestamp: Timestamp, event: LedgerEvent) -> FaucetResult<EventRecord> {
        let (record, value) = self.new_record(timestamp, event)?;
        (&self.events, &self.meta).transaction(
            |(events, meta)| -> ConflictableTransactionResult<(), FaucetError> {
                tx_append(events, meta, &record, &value)
            },
        )?;
        Ok(record)
    }

    /// Remove an event appended for an operation that then failed
    pub fn retract_event(&self, record: &EventRecord) -> FaucetResult<()> {
        (&self.events, &self.meta).transaction(
            |(events, meta)| -> ConflictableTransactionResult<(), FaucetError> {
                tx_retract(events, meta, record)
            },
        )?;
        debug!("Retracted event {}", record.sequence);
        Ok(())
    }

    /// Store the new owner together with its `OwnershipTransferred` event
    pub fn transfer_owner(
        &self,
        new_owner: &Address,
        timestamp: Timestamp,
        event: LedgerEvent,
    ) -> FaucetResult<EventRecord> {
        let (record, value) = self.new_record(timestamp, event)?;
        (&self.events, &self.meta).transaction(
            |(events, meta)| -> ConflictableTransactionResult<(), FaucetError> {
                meta.insert(OWNER_KEY, new_owner.as_bytes())?;
                tx_append(events, meta, &record, &value)
            },
        )?;
        Ok(record)
    }

    /// Set `account`'s last withdrawal to `timestamp` and append its event.
    /// Returns the previous timestamp for [`Self::revert_withdrawal`].
    pub fn record_withdrawal(
        &self,
        account: &Address,
        timestamp: Timestamp,
        event: LedgerEvent,
    ) -> FaucetResult<(Option<Timestamp>, EventRecord)> {
        let (record, value) = self.new_record(timestamp, event)?;
        let previous = (&self.last_withdrawals, &self.events, &self.meta).transaction(
            |(last_withdrawals, events, meta)| -> ConflictableTransactionResult<Option<Timestamp>, FaucetError> {
                let previous = match last_withdrawals.insert(account.as_bytes(), &timestamp.to_be_bytes()[..])? {
                    Some(bytes) => match decode_timestamp(&bytes) {
                        Ok(previous) => Some(previous),
                        Err(e) => return abort(e),
                    },
                    None => None,
                };
                tx_append(events, meta, &record, &value)?;
                Ok(previous)
            },
        )?;
        Ok((previous, record))
    }

    /// Undo [`Self::record_withdrawal`] after the transfer failed
    pub fn revert_withdrawal(
        &self,
        account: &Address,
        previous: Option<Timestamp>,
        record: &EventRecord,
    ) -> FaucetResult<()> {
        (&self.last_withdrawals, &self.events, &self.meta).transaction(
            |(last_withdrawals, events, meta)| -> ConflictableTransactionResult<(), FaucetError> {
                match previous {
                    Some(timestamp) => {
                        last_withdrawals.insert(account.as_bytes(), &timestamp.to_be_bytes()[..])?;
                    }
                    None => {
                        last_withdrawals.remove(account.as_bytes())?;
                    }
                }
                tx_retract(events, meta, record)
            },
        )?;
        debug!("Reverted withdrawal of {}", account);
        Ok(())
    }

    /// Most recent events, newest first
    pub fn recent_events(&self, limit: usize) -> FaucetResult<Vec<EventRecord>> {
        let mut records = Vec::new();
        for item in self.events.iter().rev().take(limit) {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    pub fn statistics(&self) -> FaucetResult<LedgerStatistics> {
        Ok(LedgerStatistics {
            total_events: self.events.len(),
            deposits: self.read_counter(DEPOSITS_KEY)?,
            withdrawals: self.read_counter(WITHDRAWALS_KEY)?,
            withdrawing_accounts: self.last_withdrawals.len(),
            pool_overrides: self.eligible_pools.len(),
        })
    }

    pub fn flush(&self) -> FaucetResult<usize> {
        Ok(self.db.flush()?)
    }
}

/// Ledger statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatistics {
    pub total_events: usize,
    pub deposits: u64,
    pub withdrawals: u64,
    pub withdrawing_accounts: usize,
    pub pool_overrides: usize,
}
