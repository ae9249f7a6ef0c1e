use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::amount::AmountParseError;
use crate::ledger::AccountSummary;
use crate::model::{AccountNumber, Operation, is_valid_pin};
use crate::Amount;

/// Errors that can occur when reading operations or writing summaries
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open csv input: {0}")]
    Open(#[source] csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized operation type '{op_type}'")]
    UnrecognizedType { line: usize, op_type: String },

    #[error("line {line}: {op_type} missing {field}")]
    MissingField {
        line: usize,
        op_type: String,
        field: &'static str,
    },

    #[error("line {line}: invalid amount: {source}")]
    InvalidAmount {
        line: usize,
        source: AmountParseError,
    },

    #[error("line {line}: PIN must be exactly 4 digits")]
    InvalidPin { line: usize },

    #[error("failed to write csv output: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush csv output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct InputRow {
    r#type: String,
    account: Option<AccountNumber>,
    pin: Option<String>,
    amount: Option<String>,
    target: Option<AccountNumber>,
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    account: &'a str,
    name: &'a str,
    balance: String,
}

/// Pulls named fields out of a row, reporting the first missing one.
struct RowReader {
    line: usize,
    op_type: String,
}

impl RowReader {
    fn field(&self, value: Option<String>, field: &'static str) -> Result<String, CsvError> {
        value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CsvError::MissingField {
                line: self.line,
                op_type: self.op_type.clone(),
                field,
            })
    }

    fn amount(&self, value: Option<String>) -> Result<Amount, CsvError> {
        self.field(value, "amount")?
            .parse()
            .map_err(|source| CsvError::InvalidAmount {
                line: self.line,
                source,
            })
    }
}

fn parse_row(line: usize, row: InputRow) -> Result<Operation, CsvError> {
    let op_type = row.r#type.to_ascii_lowercase();
    let r = RowReader {
        line,
        op_type: op_type.clone(),
    };

    match op_type.as_str() {
        "open" => {
            let name = r.field(row.name, "name")?;
            let pin = r.field(row.pin, "pin")?;
            if !is_valid_pin(&pin) {
                return Err(CsvError::InvalidPin { line });
            }
            Ok(Operation::Open {
                name,
                pin,
                initial_deposit: r.amount(row.amount)?,
            })
        }
        "deposit" => Ok(Operation::Deposit {
            account: r.field(row.account, "account")?,
            pin: r.field(row.pin, "pin")?,
            amount: r.amount(row.amount)?,
        }),
        "withdraw" | "withdrawal" => Ok(Operation::Withdraw {
            account: r.field(row.account, "account")?,
            pin: r.field(row.pin, "pin")?,
            amount: r.amount(row.amount)?,
        }),
        "transfer" => Ok(Operation::Transfer {
            from: r.field(row.account, "account")?,
            pin: r.field(row.pin, "pin")?,
            to: r.field(row.target, "target")?,
            amount: r.amount(row.amount)?,
        }),
        _ => Err(CsvError::UnrecognizedType {
            line,
            op_type: row.r#type,
        }),
    }
}

/// Read operations from a csv source with header `type,account,pin,amount,target,name`
pub fn read_operations_from(
    reader: impl io::Read,
) -> impl Iterator<Item = Result<Operation, CsvError>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            parse_row(line, row)
        })
}

/// Read operations from a csv file
pub fn read_operations(
    path: &Path,
) -> Result<impl Iterator<Item = Result<Operation, CsvError>> + use<>, CsvError> {
    let file = std::fs::File::open(path)
        .map_err(|e| CsvError::Open(csv::Error::from(e)))?;
    Ok(read_operations_from(file))
}

/// Write account summaries in csv format
pub fn write_accounts<'a>(
    writer: impl io::Write,
    accounts: impl IntoIterator<Item = &'a AccountSummary>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for summary in accounts {
        writer.serialize(OutputRow {
            account: &summary.number,
            name: &summary.name,
            balance: summary.balance.to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}
