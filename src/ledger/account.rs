use chrono::{DateTime, Local, NaiveDate};
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::error::AccountError;
use crate::Amount;
use crate::model::{AccountNumber, TransactionKind, TransactionRecord};
use crate::store::AccountSnapshot;

/// Limits applied to every withdrawal and outgoing transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalPolicy {
    /// Lowest balance a debit may leave behind.
    pub minimum_balance: Amount,
    /// Cap on the sum of debits per calendar day.
    pub daily_limit: Amount,
}

impl WithdrawalPolicy {
    pub const MINIMUM_BALANCE: Amount = Amount::from_rupees(500);
    pub const DAILY_LIMIT: Amount = Amount::from_rupees(10_000);
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            minimum_balance: Self::MINIMUM_BALANCE,
            daily_limit: Self::DAILY_LIMIT,
        }
    }
}

/// A customer account.
///
/// Identity fields are immutable. Balance, the daily withdrawal counter and the
/// history live behind one mutex, so every mutation is a single critical section
/// and readers never observe a balance without its matching record.
#[derive(Debug)]
pub struct Account {
    number: AccountNumber,
    customer_name: String,
    pin: String,
    policy: WithdrawalPolicy,
    state: Mutex<AccountState>,
}

#[derive(Debug, Default)]
struct AccountState {
    balance: Amount,
    daily_withdrawn: Amount,
    last_withdraw_date: Option<NaiveDate>,
    /// Most recent first
    transactions: VecDeque<TransactionRecord>,
}

impl AccountState {
    /// Amount already withdrawn on `today`. A counter from an earlier day counts as zero.
    fn withdrawn_on(&self, today: NaiveDate) -> Amount {
        if self.last_withdraw_date == Some(today) {
            self.daily_withdrawn
        } else {
            Amount::ZERO
        }
    }

    /// Keep record timestamps non-decreasing even if the wall clock steps back.
    fn stamp(&self, now: DateTime<Local>) -> DateTime<Local> {
        match self.transactions.front() {
            Some(latest) if latest.timestamp() > now => latest.timestamp(),
            _ => now,
        }
    }

    fn record(
        &mut self,
        kind: TransactionKind,
        amount: Amount,
        note: Option<String>,
        now: DateTime<Local>,
    ) {
        let timestamp = self.stamp(now);
        self.transactions.push_front(TransactionRecord::new(
            kind,
            amount,
            timestamp,
            self.balance,
            note,
        ));
    }
}

/// Public API
impl Account {
    pub fn new(
        number: impl Into<AccountNumber>,
        customer_name: impl Into<String>,
        pin: impl Into<String>,
        opening_balance: Amount,
        policy: WithdrawalPolicy,
    ) -> Self {
        Self::opened_at(
            number,
            customer_name,
            pin,
            opening_balance,
            policy,
            Local::now(),
        )
    }

    /// Like [`Account::new`], with an explicit time for the opening record.
    pub fn opened_at(
        number: impl Into<AccountNumber>,
        customer_name: impl Into<String>,
        pin: impl Into<String>,
        opening_balance: Amount,
        policy: WithdrawalPolicy,
        now: DateTime<Local>,
    ) -> Self {
        let mut state = AccountState {
            balance: opening_balance,
            ..AccountState::default()
        };
        state.record(
            TransactionKind::Deposit,
            opening_balance,
            Some("Initial deposit".to_string()),
            now,
        );

        Self {
            number: number.into(),
            customer_name: customer_name.into(),
            pin: pin.into(),
            policy,
            state: Mutex::new(state),
        }
    }

    /// Plain string comparison against the stored PIN.
    pub fn authenticate(&self, pin: &str) -> bool {
        self.pin == pin
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn policy(&self) -> WithdrawalPolicy {
        self.policy
    }

    pub fn balance(&self) -> Amount {
        self.state.lock().balance
    }

    /// Credit the account. Returns the new balance.
    pub fn deposit(&self, amount: Amount) -> Result<Amount, AccountError> {
        self.deposit_at(amount, Local::now())
    }

    pub fn deposit_at(
        &self,
        amount: Amount,
        now: DateTime<Local>,
    ) -> Result<Amount, AccountError> {
        self.credit(amount, TransactionKind::Deposit, None, now)
    }

    /// Debit the account if both the daily limit and the minimum balance allow it.
    /// Returns the new balance.
    pub fn withdraw(&self, amount: Amount) -> Result<Amount, AccountError> {
        self.withdraw_at(amount, Local::now())
    }

    pub fn withdraw_at(
        &self,
        amount: Amount,
        now: DateTime<Local>,
    ) -> Result<Amount, AccountError> {
        self.debit(amount, TransactionKind::Withdraw, None, now)
    }

    /// Outgoing leg of a transfer: a withdrawal recorded as `TransferOut`.
    pub fn transfer_out(
        &self,
        amount: Amount,
        to: &str,
        now: DateTime<Local>,
    ) -> Result<Amount, AccountError> {
        self.debit(
            amount,
            TransactionKind::TransferOut,
            Some(format!("To: {to}")),
            now,
        )
    }

    /// Incoming leg of a transfer: a deposit recorded as `TransferIn`.
    pub fn transfer_in(
        &self,
        amount: Amount,
        from: &str,
        now: DateTime<Local>,
    ) -> Result<Amount, AccountError> {
        self.credit(
            amount,
            TransactionKind::TransferIn,
            Some(format!("From: {from}")),
            now,
        )
    }

    /// Undo an outgoing leg whose credit could not be applied: the amount comes
    /// back as `TransferIn` and is released from the daily counter.
    pub fn reverse_transfer_out(
        &self,
        amount: Amount,
        to: &str,
        now: DateTime<Local>,
    ) -> Result<Amount, AccountError> {
        let mut state = self.state.lock();
        self.add_to_balance(&mut state, amount)?;
        if state.last_withdraw_date == Some(now.date_naive()) {
            state.daily_withdrawn = state
                .daily_withdrawn
                .checked_sub(amount)
                .filter(|left| !left.is_negative())
                .unwrap_or(Amount::ZERO);
        }
        state.record(
            TransactionKind::TransferIn,
            amount,
            Some(format!("Reversed: To: {to}")),
            now,
        );
        Ok(state.balance)
    }

    /// Prepend a record to the history.
    pub fn add_transaction(&self, record: TransactionRecord) {
        self.state.lock().transactions.push_front(record);
    }

    /// Up to `n` records, most recent first.
    pub fn recent_transactions(&self, n: usize) -> Vec<TransactionRecord> {
        self.state
            .lock()
            .transactions
            .iter()
            .take(n)
            .cloned()
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().transactions.len()
    }

    /// How much may still be withdrawn on `today`.
    pub fn remaining_daily_limit(&self, today: NaiveDate) -> Amount {
        self.policy.daily_limit - self.state.lock().withdrawn_on(today)
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        let state = self.state.lock();
        AccountSnapshot {
            number: self.number.clone(),
            name: self.customer_name.clone(),
            pin: self.pin.clone(),
            balance: state.balance,
            daily_withdrawn: state.daily_withdrawn,
            last_withdraw_date: state.last_withdraw_date,
            transactions: state.transactions.iter().cloned().collect(),
        }
    }

    pub fn from_snapshot(snapshot: AccountSnapshot, policy: WithdrawalPolicy) -> Self {
        Self {
            number: snapshot.number,
            customer_name: snapshot.name,
            pin: snapshot.pin,
            policy,
            state: Mutex::new(AccountState {
                balance: snapshot.balance,
                daily_withdrawn: snapshot.daily_withdrawn,
                last_withdraw_date: snapshot.last_withdraw_date,
                transactions: snapshot.transactions.into(),
            }),
        }
    }
}

/// Private API
impl Account {
    fn credit(
        &self,
        amount: Amount,
        kind: TransactionKind,
        note: Option<String>,
        now: DateTime<Local>,
    ) -> Result<Amount, AccountError> {
        if !amount.is_positive() {
            return Err(AccountError::InvalidAmount(amount));
        }

        let mut state = self.state.lock();
        self.add_to_balance(&mut state, amount)?;
        state.record(kind, amount, note, now);
        Ok(state.balance)
    }

    fn add_to_balance(&self, state: &mut AccountState, amount: Amount) -> Result<(), AccountError> {
        let balance = state.balance;
        state.balance = balance
            .checked_add(amount)
            .ok_or_else(|| AccountError::BalanceOverflow {
                account: self.number.clone(),
                balance,
                requested: amount,
            })?;
        Ok(())
    }

    /// All checks run before any mutation, so a rejection leaves balance,
    /// daily counter and history untouched.
    fn debit(
        &self,
        amount: Amount,
        kind: TransactionKind,
        note: Option<String>,
        now: DateTime<Local>,
    ) -> Result<Amount, AccountError> {
        if !amount.is_positive() {
            return Err(AccountError::InvalidAmount(amount));
        }

        let today = now.date_naive();
        let mut state = self.state.lock();

        let withdrawn = state.withdrawn_on(today);
        let within_limit = withdrawn
            .checked_add(amount)
            .is_some_and(|total| total <= self.policy.daily_limit);
        if !within_limit {
            return Err(AccountError::DailyLimitExceeded {
                account: self.number.clone(),
                requested: amount,
                remaining: self.policy.daily_limit - withdrawn,
            });
        }

        // Overflows only for a minimum far below zero, which leaves no floor at all.
        let below_floor = state
            .balance
            .checked_sub(self.policy.minimum_balance)
            .is_some_and(|spare| amount > spare);
        if below_floor {
            return Err(AccountError::InsufficientFunds {
                account: self.number.clone(),
                balance: state.balance,
                requested: amount,
                minimum: self.policy.minimum_balance,
            });
        }

        state.balance -= amount;
        // Cannot overflow: checked against the daily limit above.
        state.daily_withdrawn = withdrawn + amount;
        state.last_withdraw_date = Some(today);
        state.record(kind, amount, note, now);
        Ok(state.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()
    }

    fn account_with(balance: i64) -> Account {
        Account::opened_at(
            "101",
            "John Doe",
            "1234",
            Amount::from_rupees(balance),
            WithdrawalPolicy::default(),
            morning(),
        )
    }

    #[test]
    fn opening_balance_is_recorded_as_deposit() {
        let account = account_with(1000);
        assert_eq!(account.balance(), Amount::from_rupees(1000));

        let history = account.recent_transactions(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind(), TransactionKind::Deposit);
        assert_eq!(history[0].balance_after(), Amount::from_rupees(1000));
        assert_eq!(history[0].note(), Some("Initial deposit"));
    }

    #[test]
    fn authenticate_compares_pin() {
        let account = account_with(1000);
        assert!(account.authenticate("1234"));
        assert!(!account.authenticate("4321"));
        assert!(!account.authenticate(""));
    }

    // Deposit

    #[test]
    fn deposit_increases_balance_and_records() {
        let account = account_with(1000);
        let balance = account
            .deposit_at(Amount::from_rupees(250), morning())
            .unwrap();

        assert_eq!(balance, Amount::from_rupees(1250));
        assert_eq!(account.balance(), Amount::from_rupees(1250));

        let latest = &account.recent_transactions(1)[0];
        assert_eq!(latest.kind(), TransactionKind::Deposit);
        assert_eq!(latest.amount(), Amount::from_rupees(250));
        assert_eq!(latest.balance_after(), Amount::from_rupees(1250));
        assert_eq!(latest.note(), None);
    }

    #[test]
    fn deposit_non_positive_fails() {
        let account = account_with(1000);
        for amount in [Amount::ZERO, Amount::from_rupees(-5)] {
            assert_eq!(
                account.deposit_at(amount, morning()),
                Err(AccountError::InvalidAmount(amount))
            );
        }
        assert_eq!(account.balance(), Amount::from_rupees(1000));
        assert_eq!(account.transaction_count(), 1);
    }

    #[test]
    fn deposit_has_no_upper_bound() {
        let account = account_with(1000);
        account
            .deposit_at(Amount::from_rupees(50_000_000), morning())
            .unwrap();
        assert_eq!(account.balance(), Amount::from_rupees(50_001_000));
    }

    #[test]
    fn deposit_overflowing_balance_fails_without_change() {
        let account = account_with(1000);
        let huge = Amount::from_paise(i64::MAX);
        assert_eq!(
            account.deposit_at(huge, morning()),
            Err(AccountError::BalanceOverflow {
                account: "101".to_string(),
                balance: Amount::from_rupees(1000),
                requested: huge,
            })
        );
        assert_eq!(account.balance(), Amount::from_rupees(1000));
        assert_eq!(account.transaction_count(), 1);
    }

    // Withdrawal

    #[test]
    fn withdrawal_leaving_less_than_minimum_fails() {
        let account = account_with(1000);

        let result = account.withdraw_at(Amount::from_rupees(600), morning());
        assert!(matches!(
            result,
            Err(AccountError::InsufficientFunds { .. })
        ));

        // Nothing changed
        assert_eq!(account.balance(), Amount::from_rupees(1000));
        assert_eq!(account.transaction_count(), 1);
        assert_eq!(
            account.remaining_daily_limit(morning().date_naive()),
            WithdrawalPolicy::DAILY_LIMIT
        );
    }

    #[test]
    fn withdrawal_down_to_minimum_succeeds() {
        let account = account_with(1000);
        account
            .withdraw_at(Amount::from_rupees(500), morning())
            .unwrap();
        assert_eq!(account.balance(), WithdrawalPolicy::MINIMUM_BALANCE);
    }

    #[test]
    fn withdrawal_decreases_balance_and_records() {
        let account = account_with(1000);
        let balance = account
            .withdraw_at(Amount::from_rupees(400), morning())
            .unwrap();

        assert_eq!(balance, Amount::from_rupees(600));
        let latest = &account.recent_transactions(1)[0];
        assert_eq!(latest.kind(), TransactionKind::Withdraw);
        assert_eq!(latest.amount(), Amount::from_rupees(400));
        assert_eq!(latest.balance_after(), Amount::from_rupees(600));
        assert_eq!(account.transaction_count(), 2);
    }

    #[test]
    fn withdrawal_non_positive_fails() {
        let account = account_with(1000);
        assert_eq!(
            account.withdraw_at(Amount::ZERO, morning()),
            Err(AccountError::InvalidAmount(Amount::ZERO))
        );
        assert_eq!(account.transaction_count(), 1);
    }

    #[test]
    fn daily_limit_is_enforced() {
        let account = account_with(20_000);
        for _ in 0..9 {
            account
                .withdraw_at(Amount::from_rupees(1000), morning())
                .unwrap();
        }

        let result = account.withdraw_at(Amount::from_rupees(1500), morning());
        assert_eq!(
            result,
            Err(AccountError::DailyLimitExceeded {
                account: "101".to_string(),
                requested: Amount::from_rupees(1500),
                remaining: Amount::from_rupees(1000),
            })
        );
        assert_eq!(account.balance(), Amount::from_rupees(11_000));
        assert_eq!(account.transaction_count(), 10);

        // Exactly the remainder is still allowed
        account
            .withdraw_at(Amount::from_rupees(1000), morning())
            .unwrap();
        assert_eq!(
            account.remaining_daily_limit(morning().date_naive()),
            Amount::ZERO
        );
    }

    #[test]
    fn daily_limit_is_checked_before_minimum_balance() {
        let account = account_with(600);
        let result = account.withdraw_at(Amount::from_rupees(10_001), morning());
        assert!(matches!(
            result,
            Err(AccountError::DailyLimitExceeded { .. })
        ));
    }

    #[test]
    fn huge_withdrawal_after_earlier_one_hits_daily_limit() {
        let account = account_with(1000);
        account
            .withdraw_at(Amount::from_rupees(100), morning())
            .unwrap();

        let huge = Amount::from_paise(i64::MAX);
        assert_eq!(
            account.withdraw_at(huge, morning()),
            Err(AccountError::DailyLimitExceeded {
                account: "101".to_string(),
                requested: huge,
                remaining: Amount::from_rupees(9900),
            })
        );
        assert_eq!(account.balance(), Amount::from_rupees(900));
        assert_eq!(account.transaction_count(), 2);
        assert_eq!(
            account.remaining_daily_limit(morning().date_naive()),
            Amount::from_rupees(9900)
        );
    }

    #[test]
    fn daily_counter_resets_on_a_new_day() {
        let account = account_with(30_000);
        account
            .withdraw_at(Amount::from_rupees(10_000), morning())
            .unwrap();
        assert!(
            account
                .withdraw_at(Amount::from_rupees(1), morning())
                .is_err()
        );

        let tomorrow = morning() + Duration::days(1);
        assert_eq!(
            account.remaining_daily_limit(tomorrow.date_naive()),
            WithdrawalPolicy::DAILY_LIMIT
        );
        account
            .withdraw_at(Amount::from_rupees(10_000), tomorrow)
            .unwrap();
        assert_eq!(account.balance(), Amount::from_rupees(10_000));
    }

    #[test]
    fn custom_policy_applies() {
        let policy = WithdrawalPolicy {
            minimum_balance: Amount::ZERO,
            daily_limit: Amount::from_rupees(100),
        };
        let account = Account::opened_at(
            "x",
            "X",
            "0000",
            Amount::from_rupees(100),
            policy,
            morning(),
        );
        account
            .withdraw_at(Amount::from_rupees(100), morning())
            .unwrap();
        assert_eq!(account.balance(), Amount::ZERO);
    }

    // Transfer legs

    #[test]
    fn transfer_legs_record_single_entries_with_notes() {
        let from = account_with(1000);
        let to = Account::opened_at(
            "102",
            "Jane Smith",
            "5678",
            Amount::from_rupees(1500),
            WithdrawalPolicy::default(),
            morning(),
        );

        from.transfer_out(Amount::from_rupees(300), "102", morning())
            .unwrap();
        to.transfer_in(Amount::from_rupees(300), "101", morning())
            .unwrap();

        let out = &from.recent_transactions(1)[0];
        assert_eq!(out.kind(), TransactionKind::TransferOut);
        assert_eq!(out.note(), Some("To: 102"));
        assert_eq!(out.balance_after(), Amount::from_rupees(700));

        let inbound = &to.recent_transactions(1)[0];
        assert_eq!(inbound.kind(), TransactionKind::TransferIn);
        assert_eq!(inbound.note(), Some("From: 101"));
        assert_eq!(inbound.balance_after(), Amount::from_rupees(1800));

        assert_eq!(from.transaction_count(), 2);
        assert_eq!(to.transaction_count(), 2);
    }

    #[test]
    fn transfer_out_counts_against_daily_limit() {
        let account = account_with(50_000);
        account
            .transfer_out(Amount::from_rupees(9_000), "102", morning())
            .unwrap();
        assert!(matches!(
            account.withdraw_at(Amount::from_rupees(1_001), morning()),
            Err(AccountError::DailyLimitExceeded { .. })
        ));
    }

    #[test]
    fn reversed_transfer_restores_balance_and_daily_budget() {
        let account = account_with(2000);
        account
            .transfer_out(Amount::from_rupees(300), "102", morning())
            .unwrap();

        let balance = account
            .reverse_transfer_out(Amount::from_rupees(300), "102", morning())
            .unwrap();
        assert_eq!(balance, Amount::from_rupees(2000));
        assert_eq!(
            account.remaining_daily_limit(morning().date_naive()),
            Amount::from_rupees(10_000)
        );

        let latest = &account.recent_transactions(1)[0];
        assert_eq!(latest.kind(), TransactionKind::TransferIn);
        assert_eq!(latest.note(), Some("Reversed: To: 102"));
        assert_eq!(account.transaction_count(), 3);
    }

    // History

    #[test]
    fn recent_transactions_are_most_recent_first_and_bounded() {
        let account = account_with(1000);
        for rupees in 1..=6 {
            account
                .deposit_at(
                    Amount::from_rupees(rupees),
                    morning() + Duration::minutes(rupees),
                )
                .unwrap();
        }

        let recent = account.recent_transactions(5);
        assert_eq!(recent.len(), 5);
        let amounts: Vec<_> = recent.iter().map(|r| r.amount()).collect();
        assert_eq!(
            amounts,
            (2..=6).rev().map(Amount::from_rupees).collect::<Vec<_>>()
        );

        assert_eq!(account.recent_transactions(100).len(), 7);
        assert!(account.recent_transactions(0).is_empty());
    }

    #[test]
    fn reads_do_not_mutate() {
        let account = account_with(1000);
        account
            .withdraw_at(Amount::from_rupees(100), morning())
            .unwrap();

        let first = (account.balance(), account.recent_transactions(3));
        let second = (account.balance(), account.recent_transactions(3));
        assert_eq!(first, second);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let account = account_with(1000);
        let earlier = morning() - Duration::hours(2);
        account.deposit_at(Amount::from_rupees(1), earlier).unwrap();

        let history = account.recent_transactions(2);
        assert!(history[0].timestamp() >= history[1].timestamp());
    }

    #[test]
    fn add_transaction_prepends() {
        let account = account_with(1000);
        let record = TransactionRecord::new(
            TransactionKind::Deposit,
            Amount::from_rupees(1),
            morning(),
            Amount::from_rupees(1000),
            Some("manual".to_string()),
        );
        account.add_transaction(record.clone());
        assert_eq!(account.recent_transactions(1), vec![record]);
    }

    #[test]
    fn snapshot_restores_state() {
        let account = account_with(5000);
        account
            .withdraw_at(Amount::from_rupees(1000), morning())
            .unwrap();

        let restored =
            Account::from_snapshot(account.snapshot(), WithdrawalPolicy::default());
        assert_eq!(restored.number(), "101");
        assert_eq!(restored.customer_name(), "John Doe");
        assert!(restored.authenticate("1234"));
        assert_eq!(restored.balance(), Amount::from_rupees(4000));
        assert_eq!(
            restored.recent_transactions(10),
            account.recent_transactions(10)
        );
        assert_eq!(
            restored.remaining_daily_limit(morning().date_naive()),
            Amount::from_rupees(9000)
        );
    }
}
