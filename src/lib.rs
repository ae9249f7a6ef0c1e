pub mod amount;
pub mod cli;
pub mod csv;
pub mod ledger;
pub mod model;
pub mod store;

pub use amount::Amount;
pub use ledger::{Account, AccountError, Ledger, LedgerError, WithdrawalPolicy};
pub use model::{AccountNumber, Operation, TransactionKind, TransactionRecord};
