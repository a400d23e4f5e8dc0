use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{EventStore, LedgerEvent};
use crate::ledger::{self, BalanceLedger};
use crate::state::{Expense, Loan, Repayment};
use crate::store::LedgerStore;
use crate::types::{RepaymentId, RepaymentStatus};

use super::amortization::{AmortizationSchedule, ScheduleSeed};
use super::ExtraPaymentRequest;

/// pending set swapped by a reschedule
#[derive(Debug, Clone, PartialEq)]
pub struct Rescheduled {
    pub from_date: NaiveDate,
    pub removed: usize,
    pub generated: usize,
}

/// outcome of an extra payment
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraPaymentResult {
    pub loan: Loan,
    pub repayment_id: RepaymentId,
    pub expense_id: Uuid,
    pub old_principal: Money,
    pub new_principal: Money,
    pub rescheduled: Rescheduled,
}

/// applies extra principal payments and regenerates the pending schedule
pub struct ExtraPaymentHandler<'a> {
    config: &'a LedgerConfig,
    balance: &'a BalanceLedger,
}

impl<'a> ExtraPaymentHandler<'a> {
    pub fn new(config: &'a LedgerConfig, balance: &'a BalanceLedger) -> Self {
        Self { config, balance }
    }

    /// record the payment, cut the principal and rebuild the pending tail
    pub fn apply(
        &self,
        store: &mut dyn LedgerStore,
        request: &ExtraPaymentRequest,
        events: &mut EventStore,
    ) -> Result<ExtraPaymentResult> {
        request.validate()?;
        let extra_amount = self.config.round(request.extra_amount);
        let fee = self.config.round(request.fee);

        let mut loan = ledger::load_loan(store, request.loan_id, &request.owner)?;
        let old_principal = loan.remaining_principal;
        let new_principal = old_principal.saturating_sub(extra_amount);

        let anchor = match next_pending_date(store, &loan)? {
            Some(date) => date,
            None => {
                warn!(loan_id = %loan.id, "extra payment on a loan with no pending repayments");
                return Err(LedgerError::NoUpcomingRepayments { loan_id: loan.id });
            }
        };

        // the new tail is computed before anything is written
        loan.remaining_principal = new_principal;
        let schedule = AmortizationSchedule::generate(&ScheduleSeed::resume(&loan, anchor), self.config)?;

        let expense = Expense::new(
            request.owner.clone(),
            self.config.expense_label(&loan.lender),
            extra_amount + fee,
            request.payment_date,
        );
        ledger::post_expense(store, self.balance, &expense, events)?;

        let paid = Repayment {
            id: Uuid::new_v4(),
            loan_id: Some(loan.id),
            owner: request.owner.clone(),
            scheduled_date: request.payment_date,
            amount: extra_amount + fee,
            principal_part: extra_amount,
            interest_part: fee,
            status: RepaymentStatus::Paid,
            expense_id: Some(expense.id),
        };
        store.insert_repayments(std::slice::from_ref(&paid))?;

        let loan = store.update_loan(&loan)?;
        let rescheduled = self.replace_pending(store, &loan, anchor, &schedule, events)?;
        let loan = ledger::settle_loan(store, loan, request.payment_date, events)?;

        events.emit(LedgerEvent::ExtraPaymentApplied {
            loan_id: loan.id,
            repayment_id: paid.id,
            expense_id: expense.id,
            extra_amount,
            fee,
            remaining_principal: loan.remaining_principal,
        });
        info!(
            loan_id = %loan.id,
            owner = %loan.owner,
            extra = %extra_amount,
            fee = %fee,
            remaining = %loan.remaining_principal,
            regenerated = rescheduled.generated,
            "extra payment applied"
        );

        Ok(ExtraPaymentResult {
            loan,
            repayment_id: paid.id,
            expense_id: expense.id,
            old_principal,
            new_principal,
            rescheduled,
        })
    }

    /// regenerate the pending tail of `loan` from `anchor` with its current balance
    pub fn reschedule(
        &self,
        store: &mut dyn LedgerStore,
        loan: &Loan,
        anchor: NaiveDate,
        events: &mut EventStore,
    ) -> Result<Rescheduled> {
        let schedule = AmortizationSchedule::generate(&ScheduleSeed::resume(loan, anchor), self.config)?;
        self.replace_pending(store, loan, anchor, &schedule, events)
    }

    fn replace_pending(
        &self,
        store: &mut dyn LedgerStore,
        loan: &Loan,
        anchor: NaiveDate,
        schedule: &AmortizationSchedule,
        events: &mut EventStore,
    ) -> Result<Rescheduled> {
        let removed = store.delete_pending_repayments(loan.id)?;
        let repayments = schedule.to_repayments(loan.id, &loan.owner);
        store.insert_repayments(&repayments)?;

        debug!(
            loan_id = %loan.id,
            from = %anchor,
            removed,
            generated = repayments.len(),
            "pending schedule replaced"
        );
        events.emit(LedgerEvent::LoanRescheduled {
            loan_id: loan.id,
            from_date: anchor,
            removed,
            generated: repayments.len(),
        });

        Ok(Rescheduled {
            from_date: anchor,
            removed,
            generated: repayments.len(),
        })
    }
}

fn next_pending_date(store: &dyn LedgerStore, loan: &Loan) -> Result<Option<NaiveDate>> {
    Ok(store
        .repayments_by_loan(loan.id)?
        .into_iter()
        .find(Repayment::is_pending)
        .map(|r| r.scheduled_date))
}
