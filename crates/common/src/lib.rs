//! Shared primitives for the TCO2 faucet workspace.

pub mod error;
pub mod types;
pub mod utils;

pub use error::{CommonError, Result};
pub use types::{Address, Amount, Timestamp};
