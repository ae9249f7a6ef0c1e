//! Account ledger and transfer engine.
//!
//! The ledger owns every account, mints account numbers and routes
//! authenticated requests to the right account. Each account serializes its
//! own mutations; the ledger lock only guards the account map and the counter,
//! so operations on different accounts never wait on each other.

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::Amount;
use crate::model::{AccountNumber, Operation};
use crate::store::{LedgerSnapshot, LedgerStore, PersistenceError};

mod account;
pub use account::{Account, WithdrawalPolicy};

mod error;
pub use error::{AccountError, LedgerError};

/// First number handed out by a fresh, unseeded ledger.
const FIRST_ACCOUNT_NUMBER: u64 = 1;

/// Name, number and balance of one account, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub number: AccountNumber,
    pub name: String,
    pub balance: Amount,
}

/// How [`Ledger::load_or_seed`] obtained its state.
#[derive(Debug)]
pub enum Bootstrap {
    /// Restored from a saved snapshot.
    Restored,
    /// No snapshot existed; seeded with the sample accounts.
    Fresh,
    /// The snapshot could not be read; seeded with the sample accounts.
    Recovered(PersistenceError),
}

/// The bank: all accounts plus the account number counter.
#[derive(Debug)]
pub struct Ledger {
    registry: RwLock<Registry>,
    policy: WithdrawalPolicy,
}

#[derive(Debug)]
struct Registry {
    accounts: HashMap<AccountNumber, Arc<Account>>,
    /// Greater than every numeric account number in `accounts`, except
    /// `u64::MAX` which can never be exceeded
    next_account_number: u64,
}

impl Registry {
    fn insert(&mut self, account: Arc<Account>) {
        let numeric = account.number().parse::<u64>().ok();
        if let Some(next) = numeric.and_then(|numeric| numeric.checked_add(1)) {
            self.next_account_number = self.next_account_number.max(next);
        }
        self.accounts.insert(account.number().to_string(), account);
    }

    /// `None` once the counter has reached `u64::MAX`.
    fn mint(&mut self) -> Option<AccountNumber> {
        loop {
            let candidate = self.next_account_number;
            self.next_account_number = candidate.checked_add(1)?;
            let candidate = candidate.to_string();
            if !self.accounts.contains_key(&candidate) {
                return Some(candidate);
            }
        }
    }
}

/// Public API
impl Ledger {
    pub fn new(policy: WithdrawalPolicy) -> Self {
        Self {
            registry: RwLock::new(Registry {
                accounts: HashMap::new(),
                next_account_number: FIRST_ACCOUNT_NUMBER,
            }),
            policy,
        }
    }

    /// A ledger holding the two sample accounts, 101 and 102.
    pub fn seeded(policy: WithdrawalPolicy) -> Self {
        let ledger = Self::new(policy);
        ledger.add_account("101", "John Doe", "1234", Amount::from_rupees(1000));
        ledger.add_account("102", "Jane Smith", "5678", Amount::from_rupees(1500));
        ledger
    }

    /// Restore a saved ledger. The counter is raised past any numeric account
    /// number in the snapshot if the saved value lags behind.
    pub fn from_snapshot(snapshot: LedgerSnapshot, policy: WithdrawalPolicy) -> Self {
        let ledger = Self::new(policy);
        {
            let mut registry = ledger.registry.write();
            registry.next_account_number = snapshot.next_account_number.max(FIRST_ACCOUNT_NUMBER);
            for account in snapshot.accounts {
                registry.insert(Arc::new(Account::from_snapshot(account, policy)));
            }
        }
        ledger
    }

    /// Load the saved ledger, falling back to the sample accounts when there is
    /// nothing to load or the saved data is unreadable.
    pub fn load_or_seed(
        store: &impl LedgerStore,
        policy: WithdrawalPolicy,
    ) -> (Self, Bootstrap) {
        match store.load() {
            Ok(Some(snapshot)) => {
                info!(accounts = snapshot.accounts.len(), "ledger restored");
                (Self::from_snapshot(snapshot, policy), Bootstrap::Restored)
            }
            Ok(None) => {
                info!("no saved ledger, starting with sample accounts");
                (Self::seeded(policy), Bootstrap::Fresh)
            }
            Err(e) => {
                warn!(error = %e, "failed to load saved ledger, starting with sample accounts");
                (Self::seeded(policy), Bootstrap::Recovered(e))
            }
        }
    }

    pub fn save(&self, store: &impl LedgerStore) -> Result<(), PersistenceError> {
        let snapshot = self.snapshot();
        let result = store.save(&snapshot);
        match &result {
            Ok(()) => info!(accounts = snapshot.accounts.len(), "ledger saved"),
            Err(e) => warn!(error = %e, "failed to save ledger"),
        }
        result
    }

    pub fn policy(&self) -> WithdrawalPolicy {
        self.policy
    }

    /// Insert an account under a caller-chosen number, replacing any account
    /// with the same number.
    pub fn add_account(
        &self,
        number: impl Into<AccountNumber>,
        name: impl Into<String>,
        pin: impl Into<String>,
        opening_balance: Amount,
    ) -> Arc<Account> {
        let account = Arc::new(Account::new(number, name, pin, opening_balance, self.policy));
        self.registry.write().insert(Arc::clone(&account));
        account
    }

    /// Open an account under a freshly minted number and return that number.
    ///
    /// The PIN format is not checked here; see [`is_valid_pin`](crate::model::is_valid_pin).
    pub fn create_account(
        &self,
        name: impl Into<String>,
        pin: impl Into<String>,
        initial_deposit: Amount,
    ) -> Result<AccountNumber, LedgerError> {
        if initial_deposit.is_negative() {
            return Err(AccountError::InvalidAmount(initial_deposit).into());
        }

        let mut registry = self.registry.write();
        let number = registry
            .mint()
            .ok_or(LedgerError::AccountNumbersExhausted)?;
        let account = Account::new(number.clone(), name, pin, initial_deposit, self.policy);
        registry.insert(Arc::new(account));
        Ok(number)
    }

    /// The account, if it exists and `pin` matches.
    pub fn authenticated_lookup(
        &self,
        number: &str,
        pin: &str,
    ) -> Result<Arc<Account>, LedgerError> {
        self.account(number)
            .filter(|account| account.authenticate(pin))
            .ok_or(LedgerError::AuthenticationFailed)
    }

    /// Unauthenticated lookup.
    pub fn account(&self, number: &str) -> Option<Arc<Account>> {
        self.registry.read().accounts.get(number).cloned()
    }

    pub fn deposit(&self, number: &str, pin: &str, amount: Amount) -> Result<Amount, LedgerError> {
        let result = self
            .authenticated_lookup(number, pin)
            .and_then(|account| account.deposit(amount).map_err(LedgerError::from));
        Self::log_result("deposit", number, amount, &result);
        result
    }

    pub fn withdraw(&self, number: &str, pin: &str, amount: Amount) -> Result<Amount, LedgerError> {
        let result = self
            .authenticated_lookup(number, pin)
            .and_then(|account| account.withdraw(amount).map_err(LedgerError::from));
        Self::log_result("withdraw", number, amount, &result);
        result
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// The debit and the credit are two separate critical sections. Between
    /// them the money has left `from` but not yet reached `to`; a crash at that
    /// point loses it.
    pub fn transfer(
        &self,
        from: &str,
        pin: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.transfer_at(from, pin, to, amount, Local::now())
    }

    pub fn transfer_at(
        &self,
        from: &str,
        pin: &str,
        to: &str,
        amount: Amount,
        now: DateTime<Local>,
    ) -> Result<(), LedgerError> {
        let result = self.apply_transfer(from, pin, to, amount, now);
        match &result {
            Ok(()) => info!(from, to, amount = %amount, "transfer applied"),
            Err(e) => info!(from, to, amount = %amount, reason = %e, "transfer rejected"),
        }
        result
    }

    /// All account numbers, sorted.
    pub fn list_account_numbers(&self) -> BTreeSet<AccountNumber> {
        self.registry.read().accounts.keys().cloned().collect()
    }

    /// One row per account, sorted by account number.
    pub fn summaries(&self) -> Vec<AccountSummary> {
        let mut rows: Vec<_> = self
            .accounts()
            .iter()
            .map(|account| AccountSummary {
                number: account.number().to_string(),
                name: account.customer_name().to_string(),
                balance: account.balance(),
            })
            .collect();
        rows.sort_by(|a, b| a.number.cmp(&b.number));
        rows
    }

    /// Point-in-time copy of every account. Accounts are read one at a time,
    /// so a transfer running concurrently may show up on one side only.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let (next_account_number, accounts) = {
            let registry = self.registry.read();
            (
                registry.next_account_number,
                registry.accounts.values().cloned().collect::<Vec<_>>(),
            )
        };

        let mut accounts: Vec<_> = accounts.iter().map(|account| account.snapshot()).collect();
        accounts.sort_by(|a, b| a.number.cmp(&b.number));
        LedgerSnapshot {
            next_account_number,
            accounts,
        }
    }

    /// Apply a single operation.
    pub fn apply(&self, op: Operation) -> Result<(), LedgerError> {
        match op {
            Operation::Open {
                name,
                pin,
                initial_deposit,
            } => {
                let result = self.create_account(name, pin, initial_deposit);
                match &result {
                    Ok(number) => {
                        info!(account = %number, amount = %initial_deposit, "open applied")
                    }
                    Err(e) => info!(amount = %initial_deposit, reason = %e, "open rejected"),
                }
                result.map(|_| ())
            }
            Operation::Deposit {
                account,
                pin,
                amount,
            } => self.deposit(&account, &pin, amount).map(|_| ()),
            Operation::Withdraw {
                account,
                pin,
                amount,
            } => self.withdraw(&account, &pin, amount).map(|_| ()),
            Operation::Transfer {
                from,
                pin,
                to,
                amount,
            } => self.transfer(&from, &pin, &to, amount),
        }
    }

    /// Run the ledger over the given operation stream. Rejected operations are
    /// logged and do not stop the stream.
    pub async fn run(&self, mut stream: impl Stream<Item = Operation> + Unpin) {
        while let Some(op) = stream.next().await {
            let _ = self.apply(op);
        }
    }
}

/// Private API
impl Ledger {
    fn accounts(&self) -> Vec<Arc<Account>> {
        self.registry.read().accounts.values().cloned().collect()
    }

    /// Small helper to log single-account results
    fn log_result<T>(op: &str, account: &str, amount: Amount, result: &Result<T, LedgerError>) {
        match result {
            Ok(_) => info!(account, amount = %amount, "{op} applied"),
            Err(e) => info!(account, amount = %amount, reason = %e, "{op} rejected"),
        }
    }

    /// Transfer steps:
    /// - Authenticate the source
    /// - Resolve the target (no PIN needed)
    /// - Debit the source under its withdrawal policy
    /// - Credit the target, or give the amount back to the source if that fails
    fn apply_transfer(
        &self,
        from: &str,
        pin: &str,
        to: &str,
        amount: Amount,
        now: DateTime<Local>,
    ) -> Result<(), LedgerError> {
        let source = self.authenticated_lookup(from, pin)?;
        let target = self
            .account(to)
            .ok_or_else(|| LedgerError::TargetNotFound(to.to_string()))?;

        source.transfer_out(amount, to, now)?;
        if let Err(e) = target.transfer_in(amount, from, now) {
            if let Err(reversal) = source.reverse_transfer_out(amount, to, now) {
                error!(
                    from,
                    to,
                    amount = %amount,
                    reason = %reversal,
                    "transfer reversal failed"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(WithdrawalPolicy::default())
    }
}
