use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use hourglass_rs::{SafeTimeProvider, TimeSource};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result, StoreError};
use crate::events::{EventStore, LedgerEvent};
use crate::ledger::{self, BalanceLedger, DeletedRepayment, Movement, PaidRepayment, Recalculation, RepaymentLedger};
use crate::payments::{
    AmortizationCalculator, AmortizationSchedule, ExtraPaymentHandler, ExtraPaymentRequest,
    ExtraPaymentResult, LoanRequest, RepaymentRequest, ScheduleSeed,
};
use crate::state::{BalanceEntry, Expense, Income, Loan, Repayment};
use crate::store::{LedgerStore, TransactionalStore};
use crate::types::{
    Direction, ExpenseId, IncomeCategory, IncomeId, LoanId, MovementKind, OwnerKey, RepaymentId,
};
use crate::views::LoanView;

/// aggregate over an owner's active loans
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LoanSummary {
    pub active_loans: usize,
    pub total_outstanding: Money,
    /// smallest installment among active loans
    pub next_installment: Option<Money>,
}

/// what a loan deletion removed
#[derive(Debug, Clone, PartialEq)]
pub struct LoanDeletion {
    pub loan_id: LoanId,
    pub repayments_removed: usize,
    pub expenses_removed: usize,
}

/// single write path over loans, their schedules and the balance history
///
/// Every operation runs as one store transaction while holding the store
/// lock, so operations on a ledger never interleave. Events are published
/// only once the transaction has committed.
pub struct LoanLedger<S> {
    store: Mutex<S>,
    config: LedgerConfig,
    time: SafeTimeProvider,
    events: Mutex<EventStore>,
}

impl<S: TransactionalStore> LoanLedger<S> {
    pub fn new(store: S, config: LedgerConfig, time: SafeTimeProvider) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: Mutex::new(store),
            config,
            time,
            events: Mutex::new(EventStore::new()),
        })
    }

    /// default configuration on the system clock
    pub fn with_defaults(store: S) -> Result<Self> {
        Self::new(store, LedgerConfig::default(), SafeTimeProvider::new(TimeSource::System))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn time(&self) -> &SafeTimeProvider {
        &self.time
    }

    pub fn today(&self) -> NaiveDate {
        self.time.now().date_naive()
    }

    /// drain events published since the last call
    pub fn take_events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_events()
    }

    /// run `op` as one transaction and publish its events on commit
    fn write<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut dyn LedgerStore, &BalanceLedger, &mut EventStore) -> Result<T>,
    ) -> Result<T> {
        let balance = BalanceLedger::new(self.today());
        let mut staged = EventStore::new();
        let mut store = self.store.lock().map_err(|_| StoreError::Poisoned)?;

        match store.transaction(|tx| op(tx, &balance, &mut staged)) {
            Ok(value) => {
                self.events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(staged.take_events());
                Ok(value)
            }
            Err(err) => {
                warn!(operation, error = %err, "operation rolled back");
                Err(err)
            }
        }
    }

    fn read<T>(&self, op: impl FnOnce(&dyn LedgerStore) -> Result<T>) -> Result<T> {
        let mut store = self.store.lock().map_err(|_| StoreError::Poisoned)?;
        store.transaction(|tx| op(tx))
    }

    /// validate, compute the installment, persist the loan and its schedule
    pub fn create_loan(&self, request: LoanRequest) -> Result<LoanId> {
        request.validate(&self.config)?;

        let calculator = AmortizationCalculator::new(&self.config);
        let principal = self.config.round(request.principal);
        let installment = calculator.installment(
            principal,
            request.interest_rate,
            request.tenure_months,
            request.frequency,
        )?;

        let loan = Loan {
            id: Uuid::new_v4(),
            owner: request.owner,
            lender: request.lender,
            principal,
            remaining_principal: principal,
            interest_rate: request.interest_rate,
            tenure_months: request.tenure_months,
            frequency: request.frequency,
            installment,
            next_due_date: request.first_due_date,
            paid_off: false,
            version: 0,
        };
        let schedule = AmortizationSchedule::generate(
            &ScheduleSeed::resume(&loan, request.first_due_date),
            &self.config,
        )?;
        let repayments = schedule.to_repayments(loan.id, &loan.owner);

        self.write("create_loan", |store, _, events| {
            store.insert_loan(&loan)?;
            store.insert_repayments(&repayments)?;
            events.emit(LedgerEvent::LoanCreated {
                loan_id: loan.id,
                owner: loan.owner.clone(),
                principal: loan.principal,
                installment: loan.installment,
                repayments: repayments.len(),
            });
            Ok(())
        })?;

        info!(
            loan_id = %loan.id,
            owner = %loan.owner,
            principal = %loan.principal,
            installment = %loan.installment,
            repayments = repayments.len(),
            "loan created"
        );
        Ok(loan.id)
    }

    pub fn mark_repayment_paid(&self, request: RepaymentRequest) -> Result<PaidRepayment> {
        self.write("mark_repayment_paid", |store, balance, events| {
            RepaymentLedger::new(&self.config, balance).mark_paid(store, &request, events)
        })
    }

    pub fn apply_extra_payment(&self, request: ExtraPaymentRequest) -> Result<ExtraPaymentResult> {
        self.write("apply_extra_payment", |store, balance, events| {
            ExtraPaymentHandler::new(&self.config, balance).apply(store, &request, events)
        })
    }

    /// remove the loan, every repayment and every expense they generated
    pub fn delete_loan(&self, loan_id: LoanId, owner: &OwnerKey) -> Result<LoanDeletion> {
        let deletion = self.write("delete_loan", |store, balance, events| {
            let loan = ledger::load_loan(store, loan_id, owner)?;
            let repayments = store.repayments_by_loan(loan.id)?;

            // repayment rows hold the expense link, so they go first
            for repayment in &repayments {
                store.delete_repayment(repayment.id)?;
            }

            let mut expenses_removed = 0;
            for expense_id in repayments.iter().filter_map(|r| r.expense_id) {
                match store.get_expense(expense_id)? {
                    Some(expense) => {
                        ledger::unpost_expense(store, balance, &expense, events)?;
                        expenses_removed += 1;
                    }
                    None => debug!(%expense_id, "linked expense already removed"),
                }
            }

            if !store.delete_loan(loan.id)? {
                return Err(LedgerError::LoanNotFound { id: loan.id });
            }

            events.emit(LedgerEvent::LoanDeleted {
                loan_id: loan.id,
                repayments_removed: repayments.len(),
                expenses_removed,
            });
            Ok(LoanDeletion {
                loan_id: loan.id,
                repayments_removed: repayments.len(),
                expenses_removed,
            })
        })?;

        info!(
            loan_id = %deletion.loan_id,
            owner = %owner,
            repayments = deletion.repayments_removed,
            expenses = deletion.expenses_removed,
            "loan deleted"
        );
        Ok(deletion)
    }

    pub fn delete_repayment(&self, repayment_id: RepaymentId, owner: &OwnerKey) -> Result<DeletedRepayment> {
        self.write("delete_repayment", |store, balance, events| {
            RepaymentLedger::new(&self.config, balance).delete(store, repayment_id, owner, events)
        })
    }

    pub fn loans_by_owner(&self, owner: &OwnerKey) -> Result<Vec<Loan>> {
        self.read(|store| Ok(store.loans_by_owner(owner)?))
    }

    pub fn loan(&self, loan_id: LoanId, owner: &OwnerKey) -> Result<Loan> {
        self.read(|store| ledger::load_loan(store, loan_id, owner))
    }

    /// repayments of a loan ordered by scheduled date
    pub fn repayments_by_loan(&self, loan_id: LoanId) -> Result<Vec<Repayment>> {
        self.read(|store| Ok(store.repayments_by_loan(loan_id)?))
    }

    pub fn count_due_pending_repayments(&self, owner: &OwnerKey, as_of: NaiveDate) -> Result<u64> {
        self.read(|store| Ok(store.count_due_pending(owner, as_of)?))
    }

    /// every pending repayment of the owner, earliest first
    pub fn upcoming_repayments(&self, owner: &OwnerKey) -> Result<Vec<Repayment>> {
        self.read(|store| Ok(store.pending_repayments_by_owner(owner)?))
    }

    pub fn loan_summary(&self, owner: &OwnerKey) -> Result<LoanSummary> {
        let loans = self.loans_by_owner(owner)?;
        let active: Vec<&Loan> = loans.iter().filter(|l| !l.paid_off).collect();
        Ok(LoanSummary {
            active_loans: active.len(),
            total_outstanding: active.iter().map(|l| l.remaining_principal).sum(),
            next_installment: active.iter().map(|l| l.installment).min(),
        })
    }

    pub fn loan_view(&self, loan_id: LoanId, owner: &OwnerKey) -> Result<LoanView> {
        self.read(|store| {
            let loan = ledger::load_loan(store, loan_id, owner)?;
            let repayments = store.repayments_by_loan(loan.id)?;
            Ok(LoanView::from_loan(&loan, &repayments))
        })
    }

    /// apply a dated movement and carry the balance forward
    pub fn recalc_balance_history_from_date(
        &self,
        owner: &OwnerKey,
        date: NaiveDate,
        amount: Money,
        kind: MovementKind,
        direction: Direction,
    ) -> Result<Recalculation> {
        let movement = Movement::new(kind, direction, self.config.round(amount));
        self.write("recalc_balance_history", |store, balance, events| {
            balance.recalc_from_date(store, owner, date, movement, events)
        })
    }

    pub fn balance_history(&self, owner: &OwnerKey, from: NaiveDate, to: NaiveDate) -> Result<Vec<BalanceEntry>> {
        let balance = BalanceLedger::new(self.today());
        self.read(|store| balance.history(store, owner, from, to))
    }

    pub fn record_expense(
        &self,
        owner: &OwnerKey,
        name: &str,
        amount: Money,
        date: NaiveDate,
    ) -> Result<ExpenseId> {
        let expense = Expense::new(owner.clone(), name.to_string(), self.config.round(amount), date);
        self.write("record_expense", |store, balance, events| {
            ledger::post_expense(store, balance, &expense, events)
        })?;
        info!(expense_id = %expense.id, owner = %owner, amount = %expense.amount, date = %date, "expense recorded");
        Ok(expense.id)
    }

    /// remove a plain expense; repayment expenses go with their repayment
    pub fn remove_expense(&self, expense_id: ExpenseId, owner: &OwnerKey) -> Result<()> {
        self.write("remove_expense", |store, balance, events| {
            let expense = ledger::load_expense(store, expense_id, owner)?;
            if let Some(repayment) = store.repayment_by_expense(expense.id)? {
                return Err(LedgerError::InvariantViolation {
                    message: format!(
                        "expense {} is linked to repayment {}; delete the repayment instead",
                        expense.id, repayment.id
                    ),
                });
            }
            ledger::unpost_expense(store, balance, &expense, events)
        })?;
        info!(%expense_id, owner = %owner, "expense removed");
        Ok(())
    }

    pub fn record_income(
        &self,
        owner: &OwnerKey,
        name: &str,
        amount: Money,
        date: NaiveDate,
        category: IncomeCategory,
    ) -> Result<IncomeId> {
        let income = Income::new(
            owner.clone(),
            name.to_string(),
            self.config.round(amount),
            date,
            category,
        );
        self.write("record_income", |store, balance, events| {
            ledger::post_income(store, balance, &income, events)
        })?;
        info!(income_id = %income.id, owner = %owner, amount = %income.amount, date = %date, "income recorded");
        Ok(income.id)
    }

    pub fn remove_income(&self, income_id: IncomeId, owner: &OwnerKey) -> Result<()> {
        self.write("remove_income", |store, balance, events| {
            let income = ledger::load_income(store, income_id, owner)?;
            ledger::unpost_income(store, balance, &income, events)
        })?;
        info!(%income_id, owner = %owner, "income removed");
        Ok(())
    }

    /// hand the store back, e.g. to inspect it after a run
    pub fn into_store(self) -> Result<S> {
        Ok(self.store.into_inner().map_err(|_| StoreError::Poisoned)?)
    }
}
