//! Interactive text menu on top of a [`Ledger`].

use std::io::{self, BufRead, Write};
use thiserror::Error;

use crate::Amount;
use crate::ledger::{AccountError, Ledger, LedgerError};
use crate::model::is_valid_pin;

/// Number of transactions shown by the balance inquiry.
const RECENT_TRANSACTIONS: usize = 5;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("input closed")]
    InputClosed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What the loop should do after a menu choice.
enum Flow {
    Continue,
    Exit,
}

/// Line-oriented menu session. Reads answers from `input`, writes prompts and
/// results to `output`.
pub struct Menu<'a, R, W> {
    ledger: &'a Ledger,
    input: R,
    output: W,
    /// Read PINs through a hidden terminal prompt instead of `input`
    masked: bool,
}

impl<'a, R: BufRead, W: Write> Menu<'a, R, W> {
    pub fn new(ledger: &'a Ledger, input: R, output: W, masked: bool) -> Self {
        Self {
            ledger,
            input,
            output,
            masked,
        }
    }

    /// Serve menu choices until the user picks Save & Exit or input ends.
    /// Saving is left to the caller.
    pub fn run(&mut self) -> Result<(), CliError> {
        loop {
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) | Err(CliError::InputClosed) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn step(&mut self) -> Result<Flow, CliError> {
        writeln!(self.output)?;
        writeln!(self.output, "===== Banking System Menu =====")?;
        writeln!(self.output, "1. Deposit")?;
        writeln!(self.output, "2. Withdraw")?;
        writeln!(self.output, "3. Transfer")?;
        writeln!(self.output, "4. Balance Inquiry & Recent Transactions")?;
        writeln!(self.output, "5. Create New Account")?;
        writeln!(self.output, "6. List All Account Numbers")?;
        writeln!(self.output, "7. Save & Exit")?;

        let choice = self.prompt("Enter choice: ")?;
        match choice.as_str() {
            "1" => self.deposit()?,
            "2" => self.withdraw()?,
            "3" => self.transfer()?,
            "4" => self.balance_inquiry()?,
            "5" => self.create_account()?,
            "6" => self.list_accounts()?,
            "7" => {
                writeln!(self.output, "Saving data and exiting...")?;
                return Ok(Flow::Exit);
            }
            _ => writeln!(self.output, "Invalid choice. Try again.")?,
        }
        Ok(Flow::Continue)
    }

    fn deposit(&mut self) -> Result<(), CliError> {
        let number = self.prompt("Enter account number: ")?;
        let pin = self.prompt_pin("Enter PIN: ")?;
        if self.ledger.authenticated_lookup(&number, &pin).is_err() {
            writeln!(self.output, "Invalid account or PIN.")?;
            return Ok(());
        }

        let amount = self.prompt_amount("Enter deposit amount (₹): ")?;
        match self.ledger.deposit(&number, &pin, amount) {
            Ok(_) => writeln!(self.output, "Deposited {} successfully.", amount.inr())?,
            Err(e) => writeln!(self.output, "Deposit failed. {}", describe(&e))?,
        }
        Ok(())
    }

    fn withdraw(&mut self) -> Result<(), CliError> {
        let number = self.prompt("Enter account number: ")?;
        let pin = self.prompt_pin("Enter PIN: ")?;
        if self.ledger.authenticated_lookup(&number, &pin).is_err() {
            writeln!(self.output, "Invalid account or PIN.")?;
            return Ok(());
        }

        let amount = self.prompt_amount("Enter withdraw amount (₹): ")?;
        match self.ledger.withdraw(&number, &pin, amount) {
            Ok(_) => writeln!(self.output, "Withdrew {} successfully.", amount.inr())?,
            Err(e) => writeln!(self.output, "Withdrawal failed. {}", describe(&e))?,
        }
        Ok(())
    }

    fn transfer(&mut self) -> Result<(), CliError> {
        let from = self.prompt("Enter your account number: ")?;
        let pin = self.prompt_pin("Enter your PIN: ")?;
        let to = self.prompt("Enter target account number: ")?;
        let amount = self.prompt_amount("Enter transfer amount (₹): ")?;

        match self.ledger.transfer(&from, &pin, &to, amount) {
            Ok(()) => writeln!(self.output, "Transfer successful.")?,
            Err(e) => writeln!(self.output, "Transfer failed. {}", describe(&e))?,
        }
        Ok(())
    }

    fn balance_inquiry(&mut self) -> Result<(), CliError> {
        let number = self.prompt("Enter account number: ")?;
        let pin = self.prompt_pin("Enter PIN: ")?;
        let Ok(account) = self.ledger.authenticated_lookup(&number, &pin) else {
            writeln!(self.output, "Invalid account or PIN.")?;
            return Ok(());
        };

        writeln!(self.output, "Account Number: {}", account.number())?;
        writeln!(self.output, "Customer Name:  {}", account.customer_name())?;
        writeln!(self.output, "Balance:        {}", account.balance().inr())?;
        writeln!(self.output, "Recent Transactions:")?;
        let recent = account.recent_transactions(RECENT_TRANSACTIONS);
        if recent.is_empty() {
            writeln!(self.output, "  No transactions yet.")?;
        }
        for record in recent {
            writeln!(self.output, "  {record}")?;
        }
        Ok(())
    }

    fn create_account(&mut self) -> Result<(), CliError> {
        let name = self.prompt("Enter your full name: ")?;
        let pin = loop {
            let pin = self.prompt_pin("Set a 4-digit PIN: ")?;
            if is_valid_pin(&pin) {
                break pin;
            }
            writeln!(self.output, "PIN must be exactly 4 digits.")?;
        };
        let initial = self.prompt_amount("Enter initial deposit amount (₹): ")?;

        match self.ledger.create_account(name, pin, initial) {
            Ok(number) => writeln!(
                self.output,
                "Account created successfully! Your account number: {number}"
            )?,
            Err(e) => writeln!(self.output, "Account creation failed. {}", describe(&e))?,
        }
        Ok(())
    }

    fn list_accounts(&mut self) -> Result<(), CliError> {
        let numbers: Vec<_> = self.ledger.list_account_numbers().into_iter().collect();
        writeln!(self.output, "Accounts: {}", numbers.join(", "))?;
        Ok(())
    }

    /// Print `prompt` and read one trimmed line.
    fn prompt(&mut self, prompt: &str) -> Result<String, CliError> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        self.read_line()
    }

    fn read_line(&mut self) -> Result<String, CliError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(CliError::InputClosed);
        }
        Ok(line.trim().to_string())
    }

    /// Read a PIN without echo when a terminal is available, otherwise as a
    /// visible line.
    fn prompt_pin(&mut self, prompt: &str) -> Result<String, CliError> {
        if self.masked {
            let hidden = dialoguer::Password::new()
                .with_prompt(prompt.trim_end().trim_end_matches(':'))
                .allow_empty_password(true)
                .interact();
            if let Ok(pin) = hidden {
                return Ok(pin.trim().to_string());
            }
        }
        self.prompt(&format!("(input hidden not available here) {prompt}"))
    }

    /// Keep asking until a non-negative amount is entered.
    fn prompt_amount(&mut self, prompt: &str) -> Result<Amount, CliError> {
        loop {
            let line = self.prompt(prompt)?;
            match line.parse::<Amount>() {
                Ok(amount) if amount.is_negative() => {
                    writeln!(self.output, "Enter a positive amount.")?;
                }
                Ok(amount) => return Ok(amount),
                Err(_) => writeln!(self.output, "Invalid number. Try again.")?,
            }
        }
    }
}

/// User-facing explanation of a rejection.
fn describe(error: &LedgerError) -> String {
    match error {
        LedgerError::Account(AccountError::InvalidAmount(_)) => {
            "Amount must be greater than zero.".to_string()
        }
        LedgerError::Account(AccountError::InsufficientFunds { minimum, .. }) => format!(
            "Minimum balance requirement of {} must be maintained.",
            minimum.inr()
        ),
        LedgerError::Account(AccountError::DailyLimitExceeded { remaining, .. }) => format!(
            "Daily withdrawal limit exceeded! Remaining limit: {}",
            remaining.inr()
        ),
        LedgerError::Account(AccountError::BalanceOverflow { .. }) => {
            "Amount is too large for this account.".to_string()
        }
        LedgerError::AuthenticationFailed => "Invalid account or PIN.".to_string(),
        LedgerError::TargetNotFound(number) => format!("Target account {number} not found."),
        LedgerError::AccountNumbersExhausted => "No account numbers left.".to_string(),
    }
}
