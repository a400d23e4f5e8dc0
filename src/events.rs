use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    Direction, ExpenseId, IncomeId, LoanId, MovementKind, OwnerKey, RepaymentId,
};

/// all events that can be emitted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    // loan lifecycle
    LoanCreated {
        loan_id: LoanId,
        owner: OwnerKey,
        principal: Money,
        installment: Money,
        repayments: usize,
    },
    LoanPaidOff {
        loan_id: LoanId,
        date: NaiveDate,
    },
    LoanDeleted {
        loan_id: LoanId,
        repayments_removed: usize,
        expenses_removed: usize,
    },

    // repayments
    RepaymentPaid {
        loan_id: LoanId,
        repayment_id: RepaymentId,
        expense_id: ExpenseId,
        amount: Money,
        principal_portion: Money,
        remaining_principal: Money,
    },
    ExtraPaymentApplied {
        loan_id: LoanId,
        repayment_id: RepaymentId,
        expense_id: ExpenseId,
        extra_amount: Money,
        fee: Money,
        remaining_principal: Money,
    },
    LoanRescheduled {
        loan_id: LoanId,
        from_date: NaiveDate,
        removed: usize,
        generated: usize,
    },
    RepaymentDeleted {
        loan_id: Option<LoanId>,
        repayment_id: RepaymentId,
        expense_id: Option<ExpenseId>,
    },

    // money movements
    ExpenseRecorded {
        expense_id: ExpenseId,
        amount: Money,
        date: NaiveDate,
    },
    ExpenseRemoved {
        expense_id: ExpenseId,
        amount: Money,
        date: NaiveDate,
    },
    IncomeRecorded {
        income_id: IncomeId,
        amount: Money,
        date: NaiveDate,
    },
    IncomeRemoved {
        income_id: IncomeId,
        amount: Money,
        date: NaiveDate,
    },

    // derived ledger
    BalanceRecalculated {
        owner: OwnerKey,
        from_date: NaiveDate,
        to_date: NaiveDate,
        kind: MovementKind,
        direction: Direction,
        amount: Money,
        rows: usize,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<LedgerEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = LedgerEvent>) {
        self.events.extend(events);
    }

    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }
}
