//! Contract registry consulted for tokens without an explicit eligibility flag

use dashmap::DashSet;
use tco2_common::Address;

pub trait ContractRegistry: Send + Sync {
    /// Whether `token` is a token contract known to the registry
    fn check_erc20(&self, token: &Address) -> bool;
}

/// Registry backed by a fixed set of approved token addresses
#[derive(Debug, Default)]
pub struct StaticRegistry {
    approved: DashSet<Address>,
}

impl StaticRegistry {
    pub fn new<I: IntoIterator<Item = Address>>(approved: I) -> Self {
        let set = DashSet::new();
        for token in approved {
            set.insert(token);
        }
        Self { approved: set }
    }

    pub fn approve(&self, token: Address) {
        self.approved.insert(token);
    }

    pub fn revoke(&self, token: &Address) {
        self.approved.remove(token);
    }
}

impl ContractRegistry for StaticRegistry {
    fn check_erc20(&self, token: &Address) -> bool {
        self.approved.contains(token)
    }
}
