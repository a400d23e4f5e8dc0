use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{EventStore, LedgerEvent};
use crate::payments::{ExtraPaymentHandler, RepaymentRequest};
use crate::state::{Expense, Loan, Repayment};
use crate::store::LedgerStore;
use crate::types::{LoanId, Owned, OwnerKey, RepaymentId, RepaymentStatus};

use super::balance::BalanceLedger;

/// a repayment after it was settled
#[derive(Debug, Clone, PartialEq)]
pub struct PaidRepayment {
    pub loan: Loan,
    pub repayment: Repayment,
    pub expense: Expense,
}

/// what a repayment deletion unwound
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedRepayment {
    pub repayment: Repayment,
    pub expense_removed: bool,
    pub loan: Option<Loan>,
}

/// lifecycle of individual repayments: pending -> paid, and removal
pub struct RepaymentLedger<'a> {
    config: &'a LedgerConfig,
    balance: &'a BalanceLedger,
}

impl<'a> RepaymentLedger<'a> {
    pub fn new(config: &'a LedgerConfig, balance: &'a BalanceLedger) -> Self {
        Self { config, balance }
    }

    /// repayments of a loan, earliest first
    pub fn for_loan(&self, store: &dyn LedgerStore, loan_id: LoanId) -> Result<Vec<Repayment>> {
        Ok(store.repayments_by_loan(loan_id)?)
    }

    /// pending repayments due on or before `as_of`, across every loan of the owner
    pub fn count_due(&self, store: &dyn LedgerStore, owner: &OwnerKey, as_of: NaiveDate) -> Result<u64> {
        Ok(store.count_due_pending(owner, as_of)?)
    }

    pub fn mark_paid(
        &self,
        store: &mut dyn LedgerStore,
        request: &RepaymentRequest,
        events: &mut EventStore,
    ) -> Result<PaidRepayment> {
        request.validate()?;
        let amount = self.config.round(request.amount_paid);
        let principal_part = self.config.round(request.principal_component);

        let mut loan = super::load_loan(store, request.loan_id, &request.owner)?;
        let mut repayment = super::load_repayment(store, request.repayment_id, &request.owner)?;

        if !repayment.belongs_to(loan.id) {
            return Err(LedgerError::RepaymentLoanMismatch {
                repayment_id: repayment.id,
                loan_id: loan.id,
            });
        }
        if repayment.is_paid() {
            warn!(repayment_id = %repayment.id, "repayment already paid");
            return Err(LedgerError::RepaymentAlreadyPaid { id: repayment.id });
        }
        if principal_part > loan.remaining_principal {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: principal_part,
            });
        }

        let expense = Expense::new(
            request.owner.clone(),
            self.config.expense_label(&loan.lender),
            amount,
            repayment.scheduled_date,
        );
        super::post_expense(store, self.balance, &expense, events)?;

        repayment.amount = amount;
        repayment.principal_part = principal_part;
        repayment.interest_part = amount - principal_part;
        repayment.status = RepaymentStatus::Paid;
        repayment.expense_id = Some(expense.id);
        store.update_repayment(&repayment)?;

        loan.remaining_principal -= principal_part;
        let loan = super::settle_loan(store, loan, repayment.scheduled_date, events)?;

        events.emit(LedgerEvent::RepaymentPaid {
            loan_id: loan.id,
            repayment_id: repayment.id,
            expense_id: expense.id,
            amount,
            principal_portion: principal_part,
            remaining_principal: loan.remaining_principal,
        });
        info!(
            loan_id = %loan.id,
            repayment_id = %repayment.id,
            owner = %loan.owner,
            amount = %amount,
            principal = %principal_part,
            remaining = %loan.remaining_principal,
            "repayment marked paid"
        );

        Ok(PaidRepayment {
            loan,
            repayment,
            expense,
        })
    }

    /// remove one repayment and its linked expense
    ///
    /// A paid repayment gives its principal back to the loan, whose pending
    /// tail is then regenerated. Pending rows of a live loan belong to its
    /// schedule and cannot be removed one by one.
    pub fn delete(
        &self,
        store: &mut dyn LedgerStore,
        repayment_id: RepaymentId,
        owner: &OwnerKey,
        events: &mut EventStore,
    ) -> Result<DeletedRepayment> {
        let repayment = super::load_repayment(store, repayment_id, owner)?;
        let loan = match repayment.loan_id {
            Some(loan_id) => store.get_loan(loan_id)?.filter(|l| l.is_owned_by(owner)),
            None => None,
        };

        if repayment.is_pending() && loan.is_some() {
            return Err(LedgerError::InvariantViolation {
                message: format!(
                    "pending repayment {} is part of a live schedule; reschedule the loan instead",
                    repayment.id
                ),
            });
        }

        store.delete_repayment(repayment.id)?;

        let mut expense_removed = false;
        if let Some(expense_id) = repayment.expense_id {
            match store.get_expense(expense_id)? {
                Some(expense) => {
                    super::unpost_expense(store, self.balance, &expense, events)?;
                    expense_removed = true;
                }
                None => warn!(repayment_id = %repayment.id, %expense_id, "linked expense already gone"),
            }
        }

        let loan = match loan {
            Some(mut loan) if repayment.is_paid() => {
                // outstanding is what the surviving paid rows leave uncovered
                let remaining = store.repayments_by_loan(loan.id)?;
                let paid_principal: Money = remaining
                    .iter()
                    .filter(|r| r.is_paid())
                    .map(|r| r.principal_part)
                    .sum();
                loan.remaining_principal = loan.principal.saturating_sub(paid_principal);
                let anchor = remaining
                    .iter()
                    .find(|r| r.is_pending())
                    .map(|r| r.scheduled_date)
                    .unwrap_or(loan.next_due_date);
                let loan = store.update_loan(&loan)?;
                ExtraPaymentHandler::new(self.config, self.balance).reschedule(store, &loan, anchor, events)?;
                Some(super::settle_loan(store, loan, anchor, events)?)
            }
            other => other,
        };

        events.emit(LedgerEvent::RepaymentDeleted {
            loan_id: repayment.loan_id,
            repayment_id: repayment.id,
            expense_id: repayment.expense_id,
        });
        info!(
            repayment_id = %repayment.id,
            owner = %owner,
            expense_removed,
            restored = %loan.as_ref().map(|l| l.remaining_principal).unwrap_or(Money::ZERO),
            "repayment deleted"
        );

        Ok(DeletedRepayment {
            repayment,
            expense_removed,
            loan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::payments::{AmortizationCalculator, AmortizationSchedule, ExtraPaymentRequest, ScheduleSeed};
    use crate::store::{MemoryStore, TransactionalStore};
    use crate::types::RepaymentFrequency;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn seeded_loan(store: &mut MemoryStore, config: &LedgerConfig) -> (Loan, Vec<Repayment>) {
        let principal = Money::from_major(12_000);
        let rate = Rate::from_percentage(12);
        let installment = AmortizationCalculator::new(config)
            .installment(principal, rate, 12, RepaymentFrequency::Monthly)
            .unwrap();
        let loan = Loan {
            id: Uuid::new_v4(),
            owner: OwnerKey::new("alice"),
            lender: "SBI".to_string(),
            principal,
            remaining_principal: principal,
            interest_rate: rate,
            tenure_months: 12,
            frequency: RepaymentFrequency::Monthly,
            installment,
            next_due_date: date(1, 5),
            paid_off: false,
            version: 0,
        };
        let rows = AmortizationSchedule::generate(&ScheduleSeed::resume(&loan, date(1, 5)), config)
            .unwrap()
            .to_repayments(loan.id, &loan.owner);
        store
            .transaction::<_, LedgerError, _>(|tx| {
                tx.insert_loan(&loan)?;
                tx.insert_repayments(&rows)?;
                Ok(())
            })
            .unwrap();
        (loan, rows)
    }

    fn pay(loan: &Loan, r: &Repayment) -> RepaymentRequest {
        RepaymentRequest {
            repayment_id: r.id,
            loan_id: loan.id,
            owner: loan.owner.clone(),
            amount_paid: r.amount,
            principal_component: r.principal_part,
        }
    }

    #[test]
    fn test_mark_paid_decrements_principal_and_links_expense() {
        let config = LedgerConfig::default();
        let balance = BalanceLedger::new(date(3, 1));
        let ledger = RepaymentLedger::new(&config, &balance);
        let mut store = MemoryStore::new();
        let (loan, rows) = seeded_loan(&mut store, &config);
        let mut events = EventStore::new();

        let paid = store
            .transaction(|tx| ledger.mark_paid(tx, &pay(&loan, &rows[0]), &mut events))
            .unwrap();

        assert_eq!(paid.loan.remaining_principal, Money::from_decimal(dec!(11053.81)));
        assert_eq!(paid.loan.next_due_date, date(2, 5));
        assert_eq!(paid.repayment.expense_id, Some(paid.expense.id));
        assert_eq!(paid.expense.name, "Loan Repayment - SBI");
        assert_eq!(paid.expense.date, date(1, 5));
        assert_eq!(paid.expense.amount, Money::from_decimal(dec!(1066.19)));
        assert_eq!(store.expense_count(), 1);
    }

    #[test]
    fn test_mark_paid_twice_is_rejected() {
        let config = LedgerConfig::default();
        let balance = BalanceLedger::new(date(3, 1));
        let ledger = RepaymentLedger::new(&config, &balance);
        let mut store = MemoryStore::new();
        let (loan, rows) = seeded_loan(&mut store, &config);
        let mut events = EventStore::new();

        store
            .transaction(|tx| ledger.mark_paid(tx, &pay(&loan, &rows[0]), &mut events))
            .unwrap();
        let err = store
            .transaction(|tx| ledger.mark_paid(tx, &pay(&loan, &rows[0]), &mut events))
            .unwrap_err();
        assert!(matches!(err, LedgerError::RepaymentAlreadyPaid { .. }));
        assert_eq!(store.expense_count(), 1);
    }

    #[test]
    fn test_foreign_owner_sees_not_found() {
        let config = LedgerConfig::default();
        let balance = BalanceLedger::new(date(3, 1));
        let ledger = RepaymentLedger::new(&config, &balance);
        let mut store = MemoryStore::new();
        let (loan, rows) = seeded_loan(&mut store, &config);
        let mut events = EventStore::new();

        let mut req = pay(&loan, &rows[0]);
        req.owner = OwnerKey::new("mallory");
        let err = store
            .transaction(|tx| ledger.mark_paid(tx, &req, &mut events))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_count_due() {
        let config = LedgerConfig::default();
        let balance = BalanceLedger::new(date(3, 1));
        let ledger = RepaymentLedger::new(&config, &balance);
        let mut store = MemoryStore::new();
        let (loan, _) = seeded_loan(&mut store, &config);

        let due = store
            .transaction(|tx| ledger.count_due(tx, &loan.owner, date(3, 5)))
            .unwrap();
        assert_eq!(due, 3);
    }

    #[test]
    fn test_delete_paid_repayment_restores_principal() {
        let config = LedgerConfig::default();
        let balance = BalanceLedger::new(date(3, 1));
        let ledger = RepaymentLedger::new(&config, &balance);
        let mut store = MemoryStore::new();
        let (loan, rows) = seeded_loan(&mut store, &config);
        let mut events = EventStore::new();

        store
            .transaction(|tx| ledger.mark_paid(tx, &pay(&loan, &rows[0]), &mut events))
            .unwrap();
        let deleted = store
            .transaction(|tx| ledger.delete(tx, rows[0].id, &loan.owner, &mut events))
            .unwrap();

        assert!(deleted.expense_removed);
        assert_eq!(store.expense_count(), 0);
        let loan = deleted.loan.unwrap();
        assert_eq!(loan.remaining_principal, Money::from_major(12_000));

        let pending = store
            .transaction(|tx| ledger.for_loan(tx, loan.id))
            .unwrap();
        let total: Money = pending.iter().map(|r| r.principal_part).sum();
        assert_eq!(total, Money::from_major(12_000));
        assert!(pending.iter().all(Repayment::is_pending));
    }

    #[test]
    fn test_delete_oversized_extra_payment_restores_applied_principal() {
        let config = LedgerConfig::default();
        let balance = BalanceLedger::new(date(3, 1));
        let ledger = RepaymentLedger::new(&config, &balance);
        let mut store = MemoryStore::new();
        let (loan, rows) = seeded_loan(&mut store, &config);
        let mut events = EventStore::new();

        let first = store
            .transaction(|tx| ledger.mark_paid(tx, &pay(&loan, &rows[0]), &mut events))
            .unwrap();
        let before = first.loan.remaining_principal;

        let extra = ExtraPaymentRequest {
            loan_id: loan.id,
            owner: loan.owner.clone(),
            extra_amount: Money::from_major(15_000),
            fee: Money::ZERO,
            payment_date: date(1, 20),
        };
        let applied = store
            .transaction(|tx| ExtraPaymentHandler::new(&config, &balance).apply(tx, &extra, &mut events))
            .unwrap();
        assert!(applied.loan.paid_off);

        let deleted = store
            .transaction(|tx| ledger.delete(tx, applied.repayment_id, &loan.owner, &mut events))
            .unwrap();

        let loan = deleted.loan.unwrap();
        assert_eq!(loan.remaining_principal, before);
        assert!(loan.remaining_principal <= loan.principal);
        assert!(!loan.paid_off);

        let pending: Vec<Repayment> = store
            .transaction(|tx| ledger.for_loan(tx, loan.id))
            .unwrap()
            .into_iter()
            .filter(Repayment::is_pending)
            .collect();
        let total: Money = pending.iter().map(|r| r.principal_part).sum();
        assert_eq!(total, loan.remaining_principal);
        assert_eq!(pending[0].scheduled_date, date(2, 5));
        assert_eq!(loan.next_due_date, date(2, 5));
    }

    #[test]
    fn test_delete_pending_repayment_of_live_loan_is_rejected() {
        let config = LedgerConfig::default();
        let balance = BalanceLedger::new(date(3, 1));
        let ledger = RepaymentLedger::new(&config, &balance);
        let mut store = MemoryStore::new();
        let (loan, rows) = seeded_loan(&mut store, &config);
        let mut events = EventStore::new();

        let err = store
            .transaction(|tx| ledger.delete(tx, rows[3].id, &loan.owner, &mut events))
            .unwrap_err();
        assert!(err.is_invariant());
        assert_eq!(store.repayment_count(), 12);
    }
}
