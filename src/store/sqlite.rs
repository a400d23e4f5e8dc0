use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::errors::StoreError;
use crate::state::{BalanceEntry, Expense, Income, Loan, Repayment};
use crate::types::{ExpenseId, IncomeId, LoanId, OwnerKey, RepaymentId};

use super::{LedgerStore, StoreResult, TransactionalStore};

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS loans (
  id TEXT PRIMARY KEY,
  owner TEXT NOT NULL,
  lender TEXT NOT NULL,
  principal TEXT NOT NULL,
  remaining_principal TEXT NOT NULL,
  interest_rate TEXT NOT NULL,
  tenure_months INTEGER NOT NULL,
  frequency TEXT NOT NULL,
  installment TEXT NOT NULL,
  next_due_date TEXT NOT NULL,
  paid_off INTEGER NOT NULL DEFAULT 0,
  version INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS expenses (
  id TEXT PRIMARY KEY,
  owner TEXT NOT NULL,
  name TEXT NOT NULL,
  amount TEXT NOT NULL,
  date TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS incomes (
  id TEXT PRIMARY KEY,
  owner TEXT NOT NULL,
  name TEXT NOT NULL,
  amount TEXT NOT NULL,
  date TEXT NOT NULL,
  category TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS repayments (
  id TEXT PRIMARY KEY,
  loan_id TEXT REFERENCES loans(id),
  owner TEXT NOT NULL,
  scheduled_date TEXT NOT NULL,
  amount TEXT NOT NULL,
  principal_part TEXT NOT NULL,
  interest_part TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'pending',
  expense_id TEXT REFERENCES expenses(id)
);
CREATE INDEX IF NOT EXISTS repayments_by_loan ON repayments (loan_id, scheduled_date);
CREATE INDEX IF NOT EXISTS repayments_by_owner ON repayments (owner, status, scheduled_date);
CREATE INDEX IF NOT EXISTS repayments_by_expense ON repayments (expense_id);
CREATE TABLE IF NOT EXISTS balance_history (
  id TEXT PRIMARY KEY,
  owner TEXT NOT NULL,
  date TEXT NOT NULL,
  total_income TEXT NOT NULL,
  total_expense TEXT NOT NULL,
  balance TEXT NOT NULL,
  UNIQUE (owner, date)
);
";

const LOAN_COLUMNS: &str = "id, owner, lender, principal, remaining_principal, interest_rate, \
     tenure_months, frequency, installment, next_due_date, paid_off, version";

const REPAYMENT_COLUMNS: &str = "id, loan_id, owner, scheduled_date, amount, principal_part, \
     interest_part, status, expense_id";

const BALANCE_COLUMNS: &str = "id, owner, date, total_income, total_expense, balance";

/// sqlite-backed store; every transaction is a sqlite transaction
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl TransactionalStore for SqliteStore {
    fn transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerStore) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self.conn.transaction().map_err(StoreError::from)?;
        let mut scope = SqliteScope { conn: &*tx };
        // dropping `tx` without commit rolls back
        let value = f(&mut scope)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

/// view of the connection inside one open transaction
struct SqliteScope<'a> {
    conn: &'a Connection,
}

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// read a text column and parse it, reporting failures as conversion errors
fn text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into()))
}

fn optional_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse::<T>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
        })
    })
    .transpose()
}

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: text(row, 0)?,
        owner: OwnerKey::new(row.get::<_, String>(1)?),
        lender: row.get(2)?,
        principal: text(row, 3)?,
        remaining_principal: text(row, 4)?,
        interest_rate: text(row, 5)?,
        tenure_months: row.get(6)?,
        frequency: text(row, 7)?,
        installment: text(row, 8)?,
        next_due_date: text(row, 9)?,
        paid_off: row.get(10)?,
        version: row.get(11)?,
    })
}

fn repayment_from_row(row: &Row<'_>) -> rusqlite::Result<Repayment> {
    Ok(Repayment {
        id: text(row, 0)?,
        loan_id: optional_text(row, 1)?,
        owner: OwnerKey::new(row.get::<_, String>(2)?),
        scheduled_date: text(row, 3)?,
        amount: text(row, 4)?,
        principal_part: text(row, 5)?,
        interest_part: text(row, 6)?,
        status: text(row, 7)?,
        expense_id: optional_text(row, 8)?,
    })
}

fn expense_from_row(row: &Row<'_>) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: text(row, 0)?,
        owner: OwnerKey::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        amount: text(row, 3)?,
        date: text(row, 4)?,
    })
}

fn income_from_row(row: &Row<'_>) -> rusqlite::Result<Income> {
    Ok(Income {
        id: text(row, 0)?,
        owner: OwnerKey::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        amount: text(row, 3)?,
        date: text(row, 4)?,
        category: text(row, 5)?,
    })
}

fn balance_from_row(row: &Row<'_>) -> rusqlite::Result<BalanceEntry> {
    Ok(BalanceEntry {
        id: text(row, 0)?,
        owner: OwnerKey::new(row.get::<_, String>(1)?),
        date: text(row, 2)?,
        total_income: text(row, 3)?,
        total_expense: text(row, 4)?,
        balance: text(row, 5)?,
    })
}

impl SqliteScope<'_> {
    fn query_repayments(&self, sql: &str, args: impl rusqlite::Params) -> StoreResult<Vec<Repayment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, repayment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn query_balance(&self, sql: &str, args: impl rusqlite::Params) -> StoreResult<Vec<BalanceEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, balance_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl LedgerStore for SqliteScope<'_> {
    fn insert_loan(&mut self, loan: &Loan) -> StoreResult<()> {
        self.conn.execute(
            &format!("INSERT INTO loans ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)", LOAN_COLUMNS),
            params![
                loan.id.to_string(),
                loan.owner.as_str(),
                loan.lender,
                loan.principal.to_string(),
                loan.remaining_principal.to_string(),
                loan.interest_rate.as_percentage().to_string(),
                loan.tenure_months,
                loan.frequency.as_str(),
                loan.installment.to_string(),
                day(loan.next_due_date),
                loan.paid_off,
                loan.version,
            ],
        )?;
        Ok(())
    }

    fn get_loan(&self, id: LoanId) -> StoreResult<Option<Loan>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM loans WHERE id = ?1", LOAN_COLUMNS),
                params![id.to_string()],
                loan_from_row,
            )
            .optional()?)
    }

    fn update_loan(&mut self, loan: &Loan) -> StoreResult<Loan> {
        let changed = self.conn.execute(
            "UPDATE loans SET lender = ?2, principal = ?3, remaining_principal = ?4, interest_rate = ?5,
               tenure_months = ?6, frequency = ?7, installment = ?8, next_due_date = ?9, paid_off = ?10,
               version = version + 1
             WHERE id = ?1 AND version = ?11",
            params![
                loan.id.to_string(),
                loan.lender,
                loan.principal.to_string(),
                loan.remaining_principal.to_string(),
                loan.interest_rate.as_percentage().to_string(),
                loan.tenure_months,
                loan.frequency.as_str(),
                loan.installment.to_string(),
                day(loan.next_due_date),
                loan.paid_off,
                loan.version,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::Conflict {
                entity: "loan",
                id: loan.id.to_string(),
                expected: loan.version,
            });
        }
        let mut updated = loan.clone();
        updated.version += 1;
        Ok(updated)
    }

    fn delete_loan(&mut self, id: LoanId) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM loans WHERE id = ?1", params![id.to_string()])? > 0)
    }

    fn loans_by_owner(&self, owner: &OwnerKey) -> StoreResult<Vec<Loan>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM loans WHERE owner = ?1 ORDER BY next_due_date, id", LOAN_COLUMNS))?;
        let rows = stmt.query_map(params![owner.as_str()], loan_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_repayments(&mut self, repayments: &[Repayment]) -> StoreResult<()> {
        let mut stmt = self.conn.prepare(&format!(
            "INSERT INTO repayments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            REPAYMENT_COLUMNS
        ))?;
        for r in repayments {
            stmt.execute(params![
                r.id.to_string(),
                r.loan_id.map(|id| id.to_string()),
                r.owner.as_str(),
                day(r.scheduled_date),
                r.amount.to_string(),
                r.principal_part.to_string(),
                r.interest_part.to_string(),
                r.status.as_str(),
                r.expense_id.map(|id| id.to_string()),
            ])?;
        }
        Ok(())
    }

    fn get_repayment(&self, id: RepaymentId) -> StoreResult<Option<Repayment>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM repayments WHERE id = ?1", REPAYMENT_COLUMNS),
                params![id.to_string()],
                repayment_from_row,
            )
            .optional()?)
    }

    fn update_repayment(&mut self, r: &Repayment) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE repayments SET loan_id = ?2, scheduled_date = ?3, amount = ?4, principal_part = ?5,
               interest_part = ?6, status = ?7, expense_id = ?8
             WHERE id = ?1",
            params![
                r.id.to_string(),
                r.loan_id.map(|id| id.to_string()),
                day(r.scheduled_date),
                r.amount.to_string(),
                r.principal_part.to_string(),
                r.interest_part.to_string(),
                r.status.as_str(),
                r.expense_id.map(|id| id.to_string()),
            ],
        )?;
        Ok(())
    }

    fn repayments_by_loan(&self, loan_id: LoanId) -> StoreResult<Vec<Repayment>> {
        self.query_repayments(
            &format!(
                "SELECT {} FROM repayments WHERE loan_id = ?1 ORDER BY scheduled_date, id",
                REPAYMENT_COLUMNS
            ),
            params![loan_id.to_string()],
        )
    }

    fn pending_repayments_by_owner(&self, owner: &OwnerKey) -> StoreResult<Vec<Repayment>> {
        self.query_repayments(
            &format!(
                "SELECT {} FROM repayments WHERE owner = ?1 AND status = 'pending' ORDER BY scheduled_date, id",
                REPAYMENT_COLUMNS
            ),
            params![owner.as_str()],
        )
    }

    fn repayment_by_expense(&self, expense_id: ExpenseId) -> StoreResult<Option<Repayment>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM repayments WHERE expense_id = ?1", REPAYMENT_COLUMNS),
                params![expense_id.to_string()],
                repayment_from_row,
            )
            .optional()?)
    }

    fn delete_repayment(&mut self, id: RepaymentId) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM repayments WHERE id = ?1", params![id.to_string()])? > 0)
    }

    fn delete_pending_repayments(&mut self, loan_id: LoanId) -> StoreResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM repayments WHERE loan_id = ?1 AND status = 'pending'",
            params![loan_id.to_string()],
        )?)
    }

    fn count_due_pending(&self, owner: &OwnerKey, as_of: NaiveDate) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM repayments WHERE owner = ?1 AND status = 'pending' AND scheduled_date <= ?2",
            params![owner.as_str(), day(as_of)],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn insert_expense(&mut self, expense: &Expense) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO expenses (id, owner, name, amount, date) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                expense.id.to_string(),
                expense.owner.as_str(),
                expense.name,
                expense.amount.to_string(),
                day(expense.date),
            ],
        )?;
        Ok(())
    }

    fn get_expense(&self, id: ExpenseId) -> StoreResult<Option<Expense>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, owner, name, amount, date FROM expenses WHERE id = ?1",
                params![id.to_string()],
                expense_from_row,
            )
            .optional()?)
    }

    fn delete_expense(&mut self, id: ExpenseId) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM expenses WHERE id = ?1", params![id.to_string()])? > 0)
    }

    fn insert_income(&mut self, income: &Income) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO incomes (id, owner, name, amount, date, category) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                income.id.to_string(),
                income.owner.as_str(),
                income.name,
                income.amount.to_string(),
                day(income.date),
                income.category.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_income(&self, id: IncomeId) -> StoreResult<Option<Income>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, owner, name, amount, date, category FROM incomes WHERE id = ?1",
                params![id.to_string()],
                income_from_row,
            )
            .optional()?)
    }

    fn delete_income(&mut self, id: IncomeId) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM incomes WHERE id = ?1", params![id.to_string()])? > 0)
    }

    fn balance_entry_before(&self, owner: &OwnerKey, date: NaiveDate) -> StoreResult<Option<BalanceEntry>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM balance_history WHERE owner = ?1 AND date < ?2 ORDER BY date DESC LIMIT 1",
                    BALANCE_COLUMNS
                ),
                params![owner.as_str(), day(date)],
                balance_from_row,
            )
            .optional()?)
    }

    fn balance_entries_between(
        &self,
        owner: &OwnerKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<BalanceEntry>> {
        self.query_balance(
            &format!(
                "SELECT {} FROM balance_history WHERE owner = ?1 AND date >= ?2 AND date <= ?3 ORDER BY date",
                BALANCE_COLUMNS
            ),
            params![owner.as_str(), day(from), day(to)],
        )
    }

    fn latest_balance_entry(&self, owner: &OwnerKey) -> StoreResult<Option<BalanceEntry>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM balance_history WHERE owner = ?1 ORDER BY date DESC LIMIT 1",
                    BALANCE_COLUMNS
                ),
                params![owner.as_str()],
                balance_from_row,
            )
            .optional()?)
    }

    fn put_balance_entries(&mut self, entries: &[BalanceEntry]) -> StoreResult<()> {
        let mut stmt = self.conn.prepare(&format!(
            "INSERT INTO balance_history ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (owner, date) DO UPDATE SET
               total_income = excluded.total_income,
               total_expense = excluded.total_expense,
               balance = excluded.balance",
            BALANCE_COLUMNS
        ))?;
        for e in entries {
            stmt.execute(params![
                e.id.to_string(),
                e.owner.as_str(),
                day(e.date),
                e.total_income.to_string(),
                e.total_expense.to_string(),
                e.balance.to_string(),
            ])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::types::RepaymentFrequency;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_loan(owner: &OwnerKey) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            owner: owner.clone(),
            lender: "Axis".to_string(),
            principal: Money::from_major(12_000),
            remaining_principal: Money::from_major(12_000),
            interest_rate: Rate::from_percentage(12),
            tenure_months: 12,
            frequency: RepaymentFrequency::Monthly,
            installment: Money::from_str_exact("1066.19").unwrap(),
            next_due_date: date(2025, 1, 5),
            paid_off: false,
            version: 0,
        }
    }

    #[test]
    fn test_loan_round_trip_and_version_check() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let owner = OwnerKey::new("alice");
        let loan = sample_loan(&owner);

        store.transaction::<_, StoreError, _>(|tx| tx.insert_loan(&loan)).unwrap();

        let stored = store
            .transaction::<_, StoreError, _>(|tx| tx.get_loan(loan.id))
            .unwrap()
            .unwrap();
        assert_eq!(stored, loan);

        let mut changed = stored.clone();
        changed.remaining_principal = Money::from_major(11_000);
        let updated = store
            .transaction::<_, StoreError, _>(|tx| tx.update_loan(&changed))
            .unwrap();
        assert_eq!(updated.version, 1);

        // stale version is refused
        let stale = store.transaction::<_, StoreError, _>(|tx| tx.update_loan(&changed));
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let owner = OwnerKey::new("alice");
        let loan = sample_loan(&owner);

        let result: std::result::Result<(), StoreError> = store.transaction(|tx| {
            tx.insert_loan(&loan)?;
            Err(StoreError::Poisoned)
        });
        assert!(result.is_err());

        let found = store
            .transaction::<_, StoreError, _>(|tx| tx.get_loan(loan.id))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_repayments_ordered_and_counted() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let owner = OwnerKey::new("alice");
        let loan = sample_loan(&owner);
        let later = Repayment::pending(loan.id, owner.clone(), date(2025, 3, 5), Money::ONE, Money::ZERO);
        let earlier = Repayment::pending(loan.id, owner.clone(), date(2025, 2, 5), Money::ONE, Money::ZERO);

        store
            .transaction::<_, StoreError, _>(|tx| {
                tx.insert_loan(&loan)?;
                tx.insert_repayments(&[later.clone(), earlier.clone()])
            })
            .unwrap();

        let rows = store
            .transaction::<_, StoreError, _>(|tx| tx.repayments_by_loan(loan.id))
            .unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![earlier.id, later.id]);

        let due = store
            .transaction::<_, StoreError, _>(|tx| tx.count_due_pending(&owner, date(2025, 2, 28)))
            .unwrap();
        assert_eq!(due, 1);

        let removed = store
            .transaction::<_, StoreError, _>(|tx| tx.delete_pending_repayments(loan.id))
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[test]
    fn test_balance_upsert_keeps_one_row_per_day() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let owner = OwnerKey::new("alice");
        let mut entry = BalanceEntry::empty(owner.clone(), date(2025, 1, 1));
        entry.total_income = Money::from_major(100);
        entry.balance = Money::from_major(100);

        store
            .transaction::<_, StoreError, _>(|tx| tx.put_balance_entries(&[entry.clone()]))
            .unwrap();

        // a second row for the same day under a new id updates in place
        let mut again = BalanceEntry::empty(owner.clone(), date(2025, 1, 1));
        again.total_expense = Money::from_major(40);
        again.balance = Money::from_major(-40);
        store
            .transaction::<_, StoreError, _>(|tx| tx.put_balance_entries(&[again.clone()]))
            .unwrap();

        let rows = store
            .transaction::<_, StoreError, _>(|tx| {
                tx.balance_entries_between(&owner, date(2024, 12, 1), date(2025, 2, 1))
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, entry.id);
        assert_eq!(rows[0].total_expense, Money::from_major(40));
    }
}
