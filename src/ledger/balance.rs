use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{EventStore, LedgerEvent};
use crate::state::BalanceEntry;
use crate::store::LedgerStore;
use crate::types::{Direction, MovementKind, OwnerKey};

/// a dated money movement landing in one day's totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub kind: MovementKind,
    pub direction: Direction,
    pub amount: Money,
}

impl Movement {
    pub fn new(kind: MovementKind, direction: Direction, amount: Money) -> Self {
        Self {
            kind,
            direction,
            amount,
        }
    }

    pub fn add_expense(amount: Money) -> Self {
        Self::new(MovementKind::Expense, Direction::Add, amount)
    }

    pub fn deduct_expense(amount: Money) -> Self {
        Self::new(MovementKind::Expense, Direction::Deduct, amount)
    }

    pub fn add_income(amount: Money) -> Self {
        Self::new(MovementKind::Income, Direction::Add, amount)
    }

    pub fn deduct_income(amount: Money) -> Self {
        Self::new(MovementKind::Income, Direction::Deduct, amount)
    }

    /// the same movement with the opposite direction
    pub fn reversed(&self) -> Self {
        let direction = match self.direction {
            Direction::Add => Direction::Deduct,
            Direction::Deduct => Direction::Add,
        };
        Self { direction, ..*self }
    }

    fn signed_amount(&self) -> Money {
        match self.direction {
            Direction::Add => self.amount,
            Direction::Deduct => -self.amount,
        }
    }

    fn apply_to(&self, entry: &mut BalanceEntry) {
        match self.kind {
            MovementKind::Income => entry.total_income += self.signed_amount(),
            MovementKind::Expense => entry.total_expense += self.signed_amount(),
        }
    }
}

/// outcome of one forward recomputation
#[derive(Debug, Clone, PartialEq)]
pub struct Recalculation {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub rows: usize,
}

/// per-owner daily income/expense/balance ledger
///
/// `balance[d] = total_income[d] - total_expense[d] + balance[d - 1]`, one row
/// per (owner, date), dense from the first row up to today.
pub struct BalanceLedger {
    today: NaiveDate,
}

impl BalanceLedger {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// add the movement to the (owner, date) row, creating it with zero totals;
    /// the row's balance becomes its own net
    pub fn upsert_and_add(
        &self,
        store: &mut dyn LedgerStore,
        owner: &OwnerKey,
        date: NaiveDate,
        movement: Movement,
    ) -> Result<BalanceEntry> {
        if movement.amount.is_negative() {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: movement.amount,
            });
        }

        let mut entry = store
            .balance_entries_between(owner, date, date)?
            .into_iter()
            .next()
            .unwrap_or_else(|| BalanceEntry::empty(owner.clone(), date));

        movement.apply_to(&mut entry);
        entry.balance = entry.net();
        store.put_balance_entries(std::slice::from_ref(&entry))?;
        Ok(entry)
    }

    /// apply a movement on `date` and carry the running balance forward
    ///
    /// Rows are read once as a contiguous range and written back in a single
    /// batch, filling any missing day between the previous row and the end of
    /// the range so the ledger stays dense. Days filled in this way stay
    /// behind as zero rows even if an opposite movement later cancels the one
    /// that created them.
    pub fn recalc_from_date(
        &self,
        store: &mut dyn LedgerStore,
        owner: &OwnerKey,
        date: NaiveDate,
        movement: Movement,
        events: &mut EventStore,
    ) -> Result<Recalculation> {
        self.upsert_and_add(store, owner, date, movement)?;

        let previous = store.balance_entry_before(owner, date)?;
        let start = match &previous {
            Some(entry) => entry.date.succ_opt().unwrap_or(date),
            None => date,
        };

        let latest = store
            .latest_balance_entry(owner)?
            .map(|e| e.date)
            .unwrap_or(date);
        let end = self.today.max(latest).max(date);

        let mut existing: BTreeMap<NaiveDate, BalanceEntry> = store
            .balance_entries_between(owner, start, end)?
            .into_iter()
            .map(|e| (e.date, e))
            .collect();

        let mut running = previous.map(|e| e.balance).unwrap_or(Money::ZERO);
        let mut rows = Vec::new();
        for day in start.iter_days().take_while(|d| *d <= end) {
            let mut entry = existing
                .remove(&day)
                .unwrap_or_else(|| BalanceEntry::empty(owner.clone(), day));
            running += entry.net();
            entry.balance = running;
            rows.push(entry);
        }

        store.put_balance_entries(&rows)?;

        debug!(
            owner = %owner,
            from = %start,
            to = %end,
            rows = rows.len(),
            "balance history recalculated"
        );

        events.emit(LedgerEvent::BalanceRecalculated {
            owner: owner.clone(),
            from_date: start,
            to_date: end,
            kind: movement.kind,
            direction: movement.direction,
            amount: movement.amount,
            rows: rows.len(),
        });

        Ok(Recalculation {
            from_date: start,
            to_date: end,
            rows: rows.len(),
        })
    }

    /// stored rows for `owner` in `from..=to`
    pub fn history(
        &self,
        store: &dyn LedgerStore,
        owner: &OwnerKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BalanceEntry>> {
        if from > to {
            return Err(LedgerError::InvalidDate {
                message: format!("range start {} is after its end {}", from, to),
            });
        }
        Ok(store.balance_entries_between(owner, from, to)?)
    }
}
