//! Narrow repository over the rows the ledger owns.
//!
//! Lifecycle operations only ever see a `&mut dyn LedgerStore` handed to them
//! inside [`TransactionalStore::transaction`], so every multi-step mutation is
//! committed or rolled back as a unit whichever backend is plugged in.

pub mod memory;
pub mod sqlite;

use chrono::NaiveDate;

use crate::errors::StoreError;
use crate::state::{BalanceEntry, Expense, Income, Loan, Repayment};
use crate::types::{ExpenseId, IncomeId, LoanId, OwnerKey, RepaymentId};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// row-level access used by the ledger
pub trait LedgerStore {
    // loans
    fn insert_loan(&mut self, loan: &Loan) -> StoreResult<()>;
    fn get_loan(&self, id: LoanId) -> StoreResult<Option<Loan>>;
    /// writes `loan` if the stored version equals `loan.version`, then bumps it
    fn update_loan(&mut self, loan: &Loan) -> StoreResult<Loan>;
    fn delete_loan(&mut self, id: LoanId) -> StoreResult<bool>;
    fn loans_by_owner(&self, owner: &OwnerKey) -> StoreResult<Vec<Loan>>;

    // repayments
    fn insert_repayments(&mut self, repayments: &[Repayment]) -> StoreResult<()>;
    fn get_repayment(&self, id: RepaymentId) -> StoreResult<Option<Repayment>>;
    fn update_repayment(&mut self, repayment: &Repayment) -> StoreResult<()>;
    /// ordered by scheduled date ascending
    fn repayments_by_loan(&self, loan_id: LoanId) -> StoreResult<Vec<Repayment>>;
    /// pending rows of an owner across all loans, ordered by scheduled date
    fn pending_repayments_by_owner(&self, owner: &OwnerKey) -> StoreResult<Vec<Repayment>>;
    /// the repayment an expense was generated for, if any
    fn repayment_by_expense(&self, expense_id: ExpenseId) -> StoreResult<Option<Repayment>>;
    fn delete_repayment(&mut self, id: RepaymentId) -> StoreResult<bool>;
    fn delete_pending_repayments(&mut self, loan_id: LoanId) -> StoreResult<usize>;
    fn count_due_pending(&self, owner: &OwnerKey, as_of: NaiveDate) -> StoreResult<u64>;

    // expenses
    fn insert_expense(&mut self, expense: &Expense) -> StoreResult<()>;
    fn get_expense(&self, id: ExpenseId) -> StoreResult<Option<Expense>>;
    fn delete_expense(&mut self, id: ExpenseId) -> StoreResult<bool>;

    // incomes
    fn insert_income(&mut self, income: &Income) -> StoreResult<()>;
    fn get_income(&self, id: IncomeId) -> StoreResult<Option<Income>>;
    fn delete_income(&mut self, id: IncomeId) -> StoreResult<bool>;

    // balance history
    /// latest row strictly before `date`
    fn balance_entry_before(&self, owner: &OwnerKey, date: NaiveDate) -> StoreResult<Option<BalanceEntry>>;
    /// rows with `from <= date <= to`, ascending
    fn balance_entries_between(
        &self,
        owner: &OwnerKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<BalanceEntry>>;
    fn latest_balance_entry(&self, owner: &OwnerKey) -> StoreResult<Option<BalanceEntry>>;
    /// upsert keyed on (owner, date)
    fn put_balance_entries(&mut self, entries: &[BalanceEntry]) -> StoreResult<()>;
}

/// a store able to run a closure as one atomic unit
pub trait TransactionalStore {
    fn transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerStore) -> std::result::Result<T, E>,
        E: From<StoreError>;
}
