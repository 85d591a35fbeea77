//! Economy Module
//!
//! Currency holdings and the ledger that mutates them.
//!
//! ## Module Structure
//!
//! - `balance`: Currencies, balances, costs and rewards
//! - `ledger`: Funds checks and per-player serialized balance writes

pub mod balance;
pub mod ledger;

pub use balance::{Balance, Cost, Currency, Reward};
pub use ledger::{apply_play, check_funds, InsufficientFunds, Ledger, LedgerError, LedgerTxn, Settled};
