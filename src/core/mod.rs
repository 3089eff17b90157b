//! Core domain types and abstractions

pub mod account;
pub mod config;
pub mod error;
pub mod log;
pub mod market;
pub mod store;
pub mod transaction;

// Re-export main types for cleaner imports
pub use account::{Account, Balances};
pub use error::{Error, Result};
pub use market::{CoinSnapshot, MarketDataProvider};
pub use store::{DocumentStore, Precondition, Snapshot, StoreError, Subscription};
pub use transaction::{Transaction, TransactionKind};
