//! Source adapters. Each one turns a single upstream API into normalized
//! records and applies no cross-source logic.

pub mod dex;
pub mod fields;
pub mod ledger;
pub mod lending;

pub use dex::DexSource;
pub use ledger::{LedgerSource, TokenType, TransactionFilter};
pub use lending::LendingSource;
