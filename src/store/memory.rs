use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::errors::StoreError;
use crate::state::{BalanceEntry, Expense, Income, Loan, Repayment};
use crate::types::{ExpenseId, IncomeId, LoanId, OwnerKey, RepaymentId};

use super::{LedgerStore, StoreResult, TransactionalStore};

#[derive(Debug, Clone, Default)]
struct Tables {
    loans: BTreeMap<LoanId, Loan>,
    repayments: BTreeMap<RepaymentId, Repayment>,
    expenses: BTreeMap<ExpenseId, Expense>,
    incomes: BTreeMap<IncomeId, Income>,
    balance: BTreeMap<(OwnerKey, NaiveDate), BalanceEntry>,
    /// remaining writes before an injected failure
    write_budget: Option<usize>,
}

/// in-process store; a transaction is a snapshot restored on error
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// make every write after the next `writes` fail with a store error
    pub fn fail_after_writes(&mut self, writes: usize) {
        self.tables.write_budget = Some(writes);
    }

    pub fn clear_faults(&mut self) {
        self.tables.write_budget = None;
    }

    pub fn expense_count(&self) -> usize {
        self.tables.expenses.len()
    }

    pub fn repayment_count(&self) -> usize {
        self.tables.repayments.len()
    }
}

impl Tables {
    fn charge_write(&mut self) -> StoreResult<()> {
        match self.write_budget.as_mut() {
            Some(0) => Err(StoreError::Corrupt {
                table: "memory",
                message: "injected write failure".to_string(),
            }),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn owner_range(
        &self,
        owner: &OwnerKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl DoubleEndedIterator<Item = &BalanceEntry> {
        self.balance
            .range((owner.clone(), from)..=(owner.clone(), to))
            .map(|(_, entry)| entry)
    }
}

impl LedgerStore for Tables {
    fn insert_loan(&mut self, loan: &Loan) -> StoreResult<()> {
        self.charge_write()?;
        self.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    fn get_loan(&self, id: LoanId) -> StoreResult<Option<Loan>> {
        Ok(self.loans.get(&id).cloned())
    }

    fn update_loan(&mut self, loan: &Loan) -> StoreResult<Loan> {
        self.charge_write()?;
        let stored = self.loans.get_mut(&loan.id).ok_or_else(|| StoreError::Conflict {
            entity: "loan",
            id: loan.id.to_string(),
            expected: loan.version,
        })?;
        if stored.version != loan.version {
            return Err(StoreError::Conflict {
                entity: "loan",
                id: loan.id.to_string(),
                expected: loan.version,
            });
        }
        let mut updated = loan.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    fn delete_loan(&mut self, id: LoanId) -> StoreResult<bool> {
        self.charge_write()?;
        Ok(self.loans.remove(&id).is_some())
    }

    fn loans_by_owner(&self, owner: &OwnerKey) -> StoreResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .loans
            .values()
            .filter(|l| &l.owner == owner)
            .cloned()
            .collect();
        loans.sort_by_key(|l| (l.next_due_date, l.id));
        Ok(loans)
    }

    fn insert_repayments(&mut self, repayments: &[Repayment]) -> StoreResult<()> {
        self.charge_write()?;
        for r in repayments {
            self.repayments.insert(r.id, r.clone());
        }
        Ok(())
    }

    fn get_repayment(&self, id: RepaymentId) -> StoreResult<Option<Repayment>> {
        Ok(self.repayments.get(&id).cloned())
    }

    fn update_repayment(&mut self, repayment: &Repayment) -> StoreResult<()> {
        self.charge_write()?;
        self.repayments.insert(repayment.id, repayment.clone());
        Ok(())
    }

    fn repayments_by_loan(&self, loan_id: LoanId) -> StoreResult<Vec<Repayment>> {
        let mut rows: Vec<Repayment> = self
            .repayments
            .values()
            .filter(|r| r.belongs_to(loan_id))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.scheduled_date, r.id));
        Ok(rows)
    }

    fn pending_repayments_by_owner(&self, owner: &OwnerKey) -> StoreResult<Vec<Repayment>> {
        let mut rows: Vec<Repayment> = self
            .repayments
            .values()
            .filter(|r| &r.owner == owner && r.is_pending())
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.scheduled_date, r.id));
        Ok(rows)
    }

    fn repayment_by_expense(&self, expense_id: ExpenseId) -> StoreResult<Option<Repayment>> {
        Ok(self
            .repayments
            .values()
            .find(|r| r.expense_id == Some(expense_id))
            .cloned())
    }

    fn delete_repayment(&mut self, id: RepaymentId) -> StoreResult<bool> {
        self.charge_write()?;
        Ok(self.repayments.remove(&id).is_some())
    }

    fn delete_pending_repayments(&mut self, loan_id: LoanId) -> StoreResult<usize> {
        self.charge_write()?;
        let before = self.repayments.len();
        self.repayments
            .retain(|_, r| !(r.belongs_to(loan_id) && r.is_pending()));
        Ok(before - self.repayments.len())
    }

    fn count_due_pending(&self, owner: &OwnerKey, as_of: NaiveDate) -> StoreResult<u64> {
        Ok(self
            .repayments
            .values()
            .filter(|r| &r.owner == owner && r.is_pending() && r.scheduled_date <= as_of)
            .count() as u64)
    }

    fn insert_expense(&mut self, expense: &Expense) -> StoreResult<()> {
        self.charge_write()?;
        self.expenses.insert(expense.id, expense.clone());
        Ok(())
    }

    fn get_expense(&self, id: ExpenseId) -> StoreResult<Option<Expense>> {
        Ok(self.expenses.get(&id).cloned())
    }

    fn delete_expense(&mut self, id: ExpenseId) -> StoreResult<bool> {
        self.charge_write()?;
        Ok(self.expenses.remove(&id).is_some())
    }

    fn insert_income(&mut self, income: &Income) -> StoreResult<()> {
        self.charge_write()?;
        self.incomes.insert(income.id, income.clone());
        Ok(())
    }

    fn get_income(&self, id: IncomeId) -> StoreResult<Option<Income>> {
        Ok(self.incomes.get(&id).cloned())
    }

    fn delete_income(&mut self, id: IncomeId) -> StoreResult<bool> {
        self.charge_write()?;
        Ok(self.incomes.remove(&id).is_some())
    }

    fn balance_entry_before(&self, owner: &OwnerKey, date: NaiveDate) -> StoreResult<Option<BalanceEntry>> {
        let Some(day_before) = date.pred_opt() else {
            return Ok(None);
        };
        Ok(self.owner_range(owner, NaiveDate::MIN, day_before).next_back().cloned())
    }

    fn balance_entries_between(
        &self,
        owner: &OwnerKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<BalanceEntry>> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self.owner_range(owner, from, to).cloned().collect())
    }

    fn latest_balance_entry(&self, owner: &OwnerKey) -> StoreResult<Option<BalanceEntry>> {
        Ok(self
            .owner_range(owner, NaiveDate::MIN, NaiveDate::MAX)
            .next_back()
            .cloned())
    }

    fn put_balance_entries(&mut self, entries: &[BalanceEntry]) -> StoreResult<()> {
        self.charge_write()?;
        for entry in entries {
            self.balance
                .insert((entry.owner.clone(), entry.date), entry.clone());
        }
        Ok(())
    }
}

impl TransactionalStore for MemoryStore {
    fn transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerStore) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let snapshot = self.tables.clone();
        match f(&mut self.tables) {
            Ok(value) => Ok(value),
            Err(err) => {
                let budget = self.tables.write_budget;
                self.tables = snapshot;
                self.tables.write_budget = budget;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_balance_range_is_per_owner_and_ordered() {
        let mut store = MemoryStore::new();
        let alice = OwnerKey::new("alice");
        let bob = OwnerKey::new("bob");
        let rows = vec![
            BalanceEntry::empty(alice.clone(), day(3)),
            BalanceEntry::empty(bob.clone(), day(2)),
            BalanceEntry::empty(alice.clone(), day(1)),
        ];
        store
            .transaction(|tx| tx.put_balance_entries(&rows))
            .unwrap();

        let t = &store.tables;
        let alice_rows = t.balance_entries_between(&alice, day(1), day(31)).unwrap();
        assert_eq!(alice_rows.iter().map(|e| e.date).collect::<Vec<_>>(), vec![day(1), day(3)]);
        assert_eq!(t.balance_entry_before(&alice, day(3)).unwrap().unwrap().date, day(1));
        assert!(t.balance_entry_before(&alice, day(1)).unwrap().is_none());
        assert_eq!(t.latest_balance_entry(&bob).unwrap().unwrap().date, day(2));
    }

    #[test]
    fn test_failed_transaction_restores_snapshot() {
        let mut store = MemoryStore::new();
        let owner = OwnerKey::new("alice");
        let expense = Expense::new(owner.clone(), "rent".to_string(), Money::from_major(10), day(1));

        let result: std::result::Result<(), StoreError> = store.transaction(|tx| {
            tx.insert_expense(&expense)?;
            Err(StoreError::Poisoned)
        });
        assert!(result.is_err());
        assert_eq!(store.expense_count(), 0);
    }

    #[test]
    fn test_injected_write_failure() {
        let mut store = MemoryStore::new();
        store.fail_after_writes(1);
        let owner = OwnerKey::new("alice");
        let a = Expense::new(owner.clone(), "a".to_string(), Money::ONE, day(1));
        let b = Expense::new(owner, "b".to_string(), Money::ONE, day(2));

        let result: std::result::Result<(), StoreError> = store.transaction(|tx| {
            tx.insert_expense(&a)?;
            tx.insert_expense(&b)
        });
        assert!(result.is_err());
        assert_eq!(store.expense_count(), 0);

        store.clear_faults();
        store.transaction::<_, StoreError, _>(|tx| tx.insert_expense(&a)).unwrap();
        assert_eq!(store.expense_count(), 1);
    }
}
