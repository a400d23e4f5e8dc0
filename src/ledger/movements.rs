use tracing::debug;

use crate::errors::{LedgerError, Result};
use crate::events::{EventStore, LedgerEvent};
use crate::state::{Expense, Income};
use crate::store::LedgerStore;

use super::balance::{BalanceLedger, Movement};

/// insert the expense and add it to its day of the balance history
pub fn post_expense(
    store: &mut dyn LedgerStore,
    balance: &BalanceLedger,
    expense: &Expense,
    events: &mut EventStore,
) -> Result<()> {
    if !expense.amount.is_positive() {
        return Err(LedgerError::InvalidPaymentAmount {
            amount: expense.amount,
        });
    }
    store.insert_expense(expense)?;
    balance.recalc_from_date(
        store,
        &expense.owner,
        expense.date,
        Movement::add_expense(expense.amount),
        events,
    )?;
    debug!(expense_id = %expense.id, amount = %expense.amount, date = %expense.date, "expense posted");
    events.emit(LedgerEvent::ExpenseRecorded {
        expense_id: expense.id,
        amount: expense.amount,
        date: expense.date,
    });
    Ok(())
}

/// delete the expense and take it back out of the balance history
pub fn unpost_expense(
    store: &mut dyn LedgerStore,
    balance: &BalanceLedger,
    expense: &Expense,
    events: &mut EventStore,
) -> Result<()> {
    if !store.delete_expense(expense.id)? {
        return Err(LedgerError::ExpenseNotFound { id: expense.id });
    }
    balance.recalc_from_date(
        store,
        &expense.owner,
        expense.date,
        Movement::deduct_expense(expense.amount),
        events,
    )?;
    debug!(expense_id = %expense.id, amount = %expense.amount, date = %expense.date, "expense removed");
    events.emit(LedgerEvent::ExpenseRemoved {
        expense_id: expense.id,
        amount: expense.amount,
        date: expense.date,
    });
    Ok(())
}

pub fn post_income(
    store: &mut dyn LedgerStore,
    balance: &BalanceLedger,
    income: &Income,
    events: &mut EventStore,
) -> Result<()> {
    if !income.amount.is_positive() {
        return Err(LedgerError::InvalidPaymentAmount {
            amount: income.amount,
        });
    }
    store.insert_income(income)?;
    balance.recalc_from_date(
        store,
        &income.owner,
        income.date,
        Movement::add_income(income.amount),
        events,
    )?;
    events.emit(LedgerEvent::IncomeRecorded {
        income_id: income.id,
        amount: income.amount,
        date: income.date,
    });
    Ok(())
}

pub fn unpost_income(
    store: &mut dyn LedgerStore,
    balance: &BalanceLedger,
    income: &Income,
    events: &mut EventStore,
) -> Result<()> {
    if !store.delete_income(income.id)? {
        return Err(LedgerError::IncomeNotFound { id: income.id });
    }
    balance.recalc_from_date(
        store,
        &income.owner,
        income.date,
        Movement::deduct_income(income.amount),
        events,
    )?;
    events.emit(LedgerEvent::IncomeRemoved {
        income_id: income.id,
        amount: income.amount,
        date: income.date,
    });
    Ok(())
}
