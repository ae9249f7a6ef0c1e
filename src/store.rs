//! Loading and saving ledger snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::Amount;
use crate::model::{AccountNumber, TransactionRecord};

/// Errors raised by a [`LedgerStore`].
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("{path}: malformed ledger data: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Full persisted state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub number: AccountNumber,
    pub name: String,
    pub pin: String,
    pub balance: Amount,
    pub daily_withdrawn: Amount,
    pub last_withdraw_date: Option<NaiveDate>,
    /// Most recent first
    pub transactions: Vec<TransactionRecord>,
}

/// Full persisted state of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub next_account_number: u64,
    pub accounts: Vec<AccountSnapshot>,
}

/// Durable storage for ledger snapshots.
pub trait LedgerStore {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<LedgerSnapshot>, PersistenceError>;

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), PersistenceError>;
}

/// Stores the snapshot as a single JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn json_error(&self, source: serde_json::Error) -> PersistenceError {
        PersistenceError::Json {
            path: self.path.clone(),
            source,
        }
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>, PersistenceError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let snapshot =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| self.json_error(e))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), PersistenceError> {
        let file = File::create(&self.path).map_err(|e| self.io_error(e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot).map_err(|e| self.json_error(e))?;
        writer.flush().map_err(|e| self.io_error(e))
    }
}
