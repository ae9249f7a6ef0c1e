//! Rejection types for account and ledger operations.

use thiserror::Error;

use crate::Amount;
use crate::model::AccountNumber;

/// Top-level error returned by [`Ledger`](super::Ledger) operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Account(#[from] AccountError),

    /// Unknown account or wrong PIN. The two cases are deliberately not told apart.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("target account {0} not found")]
    TargetNotFound(AccountNumber),

    #[error("no account numbers left to assign")]
    AccountNumbersExhausted,
}

/// A balance mutation rejected by an account's rules. No state was changed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("invalid amount {0}: must be greater than zero")]
    InvalidAmount(Amount),

    #[error(
        "insufficient funds in account {account}: balance {balance}, requested {requested}, minimum balance {minimum}"
    )]
    InsufficientFunds {
        account: AccountNumber,
        balance: Amount,
        requested: Amount,
        minimum: Amount,
    },

    #[error(
        "daily withdrawal limit exceeded for account {account}: requested {requested}, remaining {remaining}"
    )]
    DailyLimitExceeded {
        account: AccountNumber,
        requested: Amount,
        remaining: Amount,
    },

    #[error("crediting {requested} would overflow the balance {balance} of account {account}")]
    BalanceOverflow {
        account: AccountNumber,
        balance: Amount,
        requested: Amount,
    },
}
