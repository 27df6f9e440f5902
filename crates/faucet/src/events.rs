//! Ledger events
//!
//! Every successful state change emits a [`LedgerEvent`]. Events are
//! persisted by the ledger database and fanned out to live subscribers.

use serde::{Deserialize, Serialize};
use tco2_common::types::amount_serde;
use tco2_common::{Address, Amount, Timestamp};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Tokens pulled into custody
    Deposited {
        token: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    /// Tokens released to a caller
    Withdrawn {
        account: Address,
        token: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
}

/// A persisted event with its position in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub event: LedgerEvent,
}

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventRecord>,
}

impl EventSubscriber {
    /// Receive next event, `None` once the publisher is gone
    pub async fn recv(&mut self) -> Option<EventRecord> {
        loop {
            match self.receiver.recv().await {
                Ok(record) => return Some(record),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<EventRecord> {
        self.receiver.try_recv().ok()
    }
}

/// Event publisher for ledger events
pub struct EventPublisher {
    sender: broadcast::Sender<EventRecord>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish event to all subscribers
    pub fn publish(&self, record: EventRecord) {
        if let Err(e) = self.sender.send(record) {
            debug!("No subscribers to receive event: {:?}", e.0.event);
        }
    }

    /// Get receiver count (active subscribers)
    pub fn active_subscribers(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
