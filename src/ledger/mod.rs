//! Row-level building blocks run inside a store transaction: the balance
//! cascade, expense/income posting and the repayment ledger.

pub mod balance;
pub mod movements;
pub mod repayments;

use chrono::NaiveDate;
use tracing::info;

use crate::errors::{LedgerError, Result};
use crate::events::{EventStore, LedgerEvent};
use crate::state::{Expense, Income, Loan, Repayment};
use crate::store::LedgerStore;
use crate::types::{ExpenseId, IncomeId, LoanId, Owned, OwnerKey, RepaymentId};

pub use balance::{BalanceLedger, Movement, Recalculation};
pub use movements::{post_expense, post_income, unpost_expense, unpost_income};
pub use repayments::{DeletedRepayment, PaidRepayment, RepaymentLedger};

/// loan `id` as seen by `owner`; someone else's loan is reported missing
pub fn load_loan(store: &dyn LedgerStore, id: LoanId, owner: &OwnerKey) -> Result<Loan> {
    store
        .get_loan(id)?
        .filter(|loan| loan.is_owned_by(owner))
        .ok_or(LedgerError::LoanNotFound { id })
}

pub fn load_repayment(store: &dyn LedgerStore, id: RepaymentId, owner: &OwnerKey) -> Result<Repayment> {
    store
        .get_repayment(id)?
        .filter(|r| r.is_owned_by(owner))
        .ok_or(LedgerError::RepaymentNotFound { id })
}

pub fn load_expense(store: &dyn LedgerStore, id: ExpenseId, owner: &OwnerKey) -> Result<Expense> {
    store
        .get_expense(id)?
        .filter(|e| e.is_owned_by(owner))
        .ok_or(LedgerError::ExpenseNotFound { id })
}

pub fn load_income(store: &dyn LedgerStore, id: IncomeId, owner: &OwnerKey) -> Result<Income> {
    store
        .get_income(id)?
        .filter(|i| i.is_owned_by(owner))
        .ok_or(LedgerError::IncomeNotFound { id })
}

/// sync `next_due_date` and `paid_off` with the pending set, then persist
///
/// `as_of` is the date reported if this write pays the loan off.
pub fn settle_loan(
    store: &mut dyn LedgerStore,
    mut loan: Loan,
    as_of: NaiveDate,
    events: &mut EventStore,
) -> Result<Loan> {
    let next_pending = store
        .repayments_by_loan(loan.id)?
        .into_iter()
        .find(Repayment::is_pending);

    if let Some(next) = &next_pending {
        loan.next_due_date = next.scheduled_date;
    }

    let was_paid_off = loan.paid_off;
    loan.paid_off = loan.remaining_principal.is_zero() && next_pending.is_none();

    let loan = store.update_loan(&loan)?;
    if loan.paid_off && !was_paid_off {
        info!(loan_id = %loan.id, date = %as_of, "loan paid off");
        events.emit(LedgerEvent::LoanPaidOff {
            loan_id: loan.id,
            date: as_of,
        });
    }
    Ok(loan)
}
