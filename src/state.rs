use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{
    EntryId, ExpenseId, IncomeCategory, IncomeId, LoanId, Owned, OwnerKey, RepaymentFrequency,
    RepaymentId, RepaymentStatus,
};

/// loan row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub owner: OwnerKey,
    pub lender: String,
    pub principal: Money,
    pub remaining_principal: Money,
    pub interest_rate: Rate,
    pub tenure_months: u32,
    pub frequency: RepaymentFrequency,
    pub installment: Money,
    pub next_due_date: NaiveDate,
    pub paid_off: bool,
    /// bumped on every write, checked by stores on update
    pub version: u32,
}

impl Owned for Loan {
    fn owner(&self) -> &OwnerKey {
        &self.owner
    }
}

/// one scheduled or paid installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repayment {
    pub id: RepaymentId,
    pub loan_id: Option<LoanId>,
    pub owner: OwnerKey,
    pub scheduled_date: NaiveDate,
    pub amount: Money,
    pub principal_part: Money,
    pub interest_part: Money,
    pub status: RepaymentStatus,
    pub expense_id: Option<ExpenseId>,
}

impl Repayment {
    pub fn pending(
        loan_id: LoanId,
        owner: OwnerKey,
        scheduled_date: NaiveDate,
        principal_part: Money,
        interest_part: Money,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id: Some(loan_id),
            owner,
            scheduled_date,
            amount: principal_part + interest_part,
            principal_part,
            interest_part,
            status: RepaymentStatus::Pending,
            expense_id: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RepaymentStatus::Pending
    }

    pub fn is_paid(&self) -> bool {
        self.status == RepaymentStatus::Paid
    }

    pub fn belongs_to(&self, loan_id: LoanId) -> bool {
        self.loan_id == Some(loan_id)
    }
}

impl Owned for Repayment {
    fn owner(&self) -> &OwnerKey {
        &self.owner
    }
}

/// expense row, shared with the plain expense screens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub owner: OwnerKey,
    pub name: String,
    pub amount: Money,
    pub date: NaiveDate,
}

impl Expense {
    pub fn new(owner: OwnerKey, name: String, amount: Money, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            name,
            amount,
            date,
        }
    }
}

impl Owned for Expense {
    fn owner(&self) -> &OwnerKey {
        &self.owner
    }
}

/// income row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Income {
    pub id: IncomeId,
    pub owner: OwnerKey,
    pub name: String,
    pub amount: Money,
    pub date: NaiveDate,
    pub category: IncomeCategory,
}

impl Income {
    pub fn new(
        owner: OwnerKey,
        name: String,
        amount: Money,
        date: NaiveDate,
        category: IncomeCategory,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            name,
            amount,
            date,
            category,
        }
    }
}

impl Owned for Income {
    fn owner(&self) -> &OwnerKey {
        &self.owner
    }
}

/// one day of the derived balance ledger; unique per (owner, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub id: EntryId,
    pub owner: OwnerKey,
    pub date: NaiveDate,
    pub total_income: Money,
    pub total_expense: Money,
    pub balance: Money,
}

impl BalanceEntry {
    /// zero baseline row for a day with no movements yet
    pub fn empty(owner: OwnerKey, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            date,
            total_income: Money::ZERO,
            total_expense: Money::ZERO,
            balance: Money::ZERO,
        }
    }

    /// the day's own contribution to the running balance
    pub fn net(&self) -> Money {
        self.total_income - self.total_expense
    }
}

impl Owned for BalanceEntry {
    fn owner(&self) -> &OwnerKey {
        &self.owner
    }
}
