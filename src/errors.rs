use thiserror::Error;

use crate::decimal::{Money, Rate};
use crate::types::{ExpenseId, IncomeId, LoanId, RepaymentId};

#[derive(Error, Debug)]
pub enum LedgerError {
    // validation
    #[error("invalid principal: {amount}")]
    InvalidPrincipal {
        amount: Money,
    },

    #[error("invalid tenure: {months} months")]
    InvalidTenure {
        months: u32,
    },

    #[error("invalid interest rate: {rate}")]
    InvalidInterestRate {
        rate: Rate,
    },

    #[error("invalid amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("installment {installment} does not cover interest {interest}")]
    InstallmentTooSmall {
        installment: Money,
        interest: Money,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("schedule exceeds {max_periods} periods")]
    ScheduleTooLong {
        max_periods: u32,
    },

    #[error("calculation error: {message}")]
    CalculationError {
        message: String,
    },

    // not found
    #[error("loan not found: {id}")]
    LoanNotFound {
        id: LoanId,
    },

    #[error("repayment not found: {id}")]
    RepaymentNotFound {
        id: RepaymentId,
    },

    #[error("expense not found: {id}")]
    ExpenseNotFound {
        id: ExpenseId,
    },

    #[error("income not found: {id}")]
    IncomeNotFound {
        id: IncomeId,
    },

    // invariant violations
    #[error("no upcoming repayments for loan {loan_id}")]
    NoUpcomingRepayments {
        loan_id: LoanId,
    },

    #[error("repayment already paid: {id}")]
    RepaymentAlreadyPaid {
        id: RepaymentId,
    },

    #[error("repayment {repayment_id} does not belong to loan {loan_id}")]
    RepaymentLoanMismatch {
        repayment_id: RepaymentId,
        loan_id: LoanId,
    },

    #[error("ledger invariant violated: {message}")]
    InvariantViolation {
        message: String,
    },

    // persistence
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// input rejected before anything was written
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidPrincipal { .. }
                | LedgerError::InvalidTenure { .. }
                | LedgerError::InvalidInterestRate { .. }
                | LedgerError::InvalidPaymentAmount { .. }
                | LedgerError::InstallmentTooSmall { .. }
                | LedgerError::InvalidConfiguration { .. }
                | LedgerError::InvalidDate { .. }
                | LedgerError::ScheduleTooLong { .. }
                | LedgerError::CalculationError { .. }
        )
    }

    /// record missing or owned by someone else
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::LoanNotFound { .. }
                | LedgerError::RepaymentNotFound { .. }
                | LedgerError::ExpenseNotFound { .. }
                | LedgerError::IncomeNotFound { .. }
        )
    }

    pub fn is_invariant(&self) -> bool {
        matches!(
            self,
            LedgerError::NoUpcomingRepayments { .. }
                | LedgerError::RepaymentAlreadyPaid { .. }
                | LedgerError::RepaymentLoanMismatch { .. }
                | LedgerError::InvariantViolation { .. }
        )
    }
}

/// failures raised by a backing store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("concurrent update of {entity} {id}: expected version {expected}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u32,
    },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("corrupt row in {table}: {message}")]
    Corrupt {
        table: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
