//! Core domain types for the ledger.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Amount;

/// Account identifier. Minted accounts use the decimal form of the ledger counter,
/// seeded or restored accounts may carry any string.
pub type AccountNumber = String;

/// Length of a PIN.
pub const PIN_LENGTH: usize = 4;

/// A PIN is exactly four ASCII digits. Callers check this before opening an account.
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit())
}

/// The kind of balance-affecting event a [`TransactionRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    TransferIn,
    TransferOut,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdraw => "WITHDRAW",
            TransactionKind::TransferIn => "TRANSFER_IN",
            TransactionKind::TransferOut => "TRANSFER_OUT",
        };
        f.write_str(name)
    }
}

/// One entry in an account's history. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    kind: TransactionKind,
    amount: Amount,
    timestamp: DateTime<Local>,
    balance_after: Amount,
    note: Option<String>,
}

impl TransactionRecord {
    pub fn new(
        kind: TransactionKind,
        amount: Amount,
        timestamp: DateTime<Local>,
        balance_after: Amount,
        note: Option<String>,
    ) -> Self {
        Self {
            kind,
            amount,
            timestamp,
            balance_after,
            note,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Account balance right after this event was applied.
    pub fn balance_after(&self) -> Amount {
        self.balance_after
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | Balance: {} | {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            self.amount.inr(),
            self.balance_after.inr(),
            self.note.as_deref().unwrap_or("")
        )
    }
}

/// A request fed to [`Ledger::apply`](crate::Ledger::apply), typically read from a batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create an account with a minted number.
    Open {
        name: String,
        pin: String,
        initial_deposit: Amount,
    },
    /// Credit an authenticated account.
    Deposit {
        account: AccountNumber,
        pin: String,
        amount: Amount,
    },
    /// Debit an authenticated account, subject to the withdrawal policy.
    Withdraw {
        account: AccountNumber,
        pin: String,
        amount: Amount,
    },
    /// Move funds from an authenticated account to any existing account.
    Transfer {
        from: AccountNumber,
        pin: String,
        to: AccountNumber,
        amount: Amount,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn record_display_includes_all_fields() {
        let record = TransactionRecord::new(
            TransactionKind::TransferOut,
            Amount::from_rupees(300),
            at_noon(),
            Amount::from_rupees(700),
            Some("To: 102".to_string()),
        );
        assert_eq!(
            record.to_string(),
            "2024-03-15 12:00:00 | TRANSFER_OUT | ₹300.00 | Balance: ₹700.00 | To: 102"
        );
    }

    #[test]
    fn record_display_without_note() {
        let record = TransactionRecord::new(
            TransactionKind::Deposit,
            Amount::from_rupees(25_000),
            at_noon(),
            Amount::from_rupees(125_000),
            None,
        );
        assert_eq!(
            record.to_string(),
            "2024-03-15 12:00:00 | DEPOSIT | ₹25,000.00 | Balance: ₹1,25,000.00 | "
        );
    }

    #[test]
    fn pin_must_be_four_digits() {
        assert!(is_valid_pin("1234"));
        assert!(is_valid_pin("0000"));
        assert!(!is_valid_pin("123"));
        assert!(!is_valid_pin("12345"));
        assert!(!is_valid_pin("12a4"));
        assert!(!is_valid_pin("١٢٣٤"));
    }

    #[test]
    fn kind_serializes_in_screaming_case() {
        let json = serde_json::to_string(&TransactionKind::TransferIn).unwrap();
        assert_eq!(json, "\"TRANSFER_IN\"");
    }
}
