pub mod amortization;
pub mod overpayment;

use chrono::NaiveDate;

use crate::config::LedgerConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{LoanId, OwnerKey, RepaymentFrequency, RepaymentId};

pub use amortization::{
    due_date, period_count, AmortizationCalculator, AmortizationSchedule, ScheduleSeed,
    ScheduledPayment,
};
pub use overpayment::{ExtraPaymentHandler, ExtraPaymentResult, Rescheduled};

/// loan origination request
#[derive(Debug, Clone, PartialEq)]
pub struct LoanRequest {
    pub owner: OwnerKey,
    pub lender: String,
    pub principal: Money,
    pub interest_rate: Rate,
    pub tenure_months: u32,
    pub frequency: RepaymentFrequency,
    pub first_due_date: NaiveDate,
}

impl LoanRequest {
    pub fn validate(&self, config: &LedgerConfig) -> Result<()> {
        let principal = config.round(self.principal);
        if !principal.is_positive() {
            return Err(LedgerError::InvalidPrincipal {
                amount: self.principal,
            });
        }
        if self.tenure_months == 0 {
            return Err(LedgerError::InvalidTenure {
                months: self.tenure_months,
            });
        }
        if self.interest_rate.is_negative() {
            return Err(LedgerError::InvalidInterestRate {
                rate: self.interest_rate,
            });
        }
        Ok(())
    }
}

/// settle one scheduled repayment
#[derive(Debug, Clone, PartialEq)]
pub struct RepaymentRequest {
    pub repayment_id: RepaymentId,
    pub loan_id: LoanId,
    pub owner: OwnerKey,
    pub amount_paid: Money,
    pub principal_component: Money,
}

impl RepaymentRequest {
    pub fn validate(&self) -> Result<()> {
        if !self.amount_paid.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: self.amount_paid,
            });
        }
        if self.principal_component.is_negative() || self.principal_component > self.amount_paid {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: self.principal_component,
            });
        }
        Ok(())
    }
}

/// out-of-band principal reduction
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraPaymentRequest {
    pub loan_id: LoanId,
    pub owner: OwnerKey,
    pub extra_amount: Money,
    pub fee: Money,
    pub payment_date: NaiveDate,
}

impl ExtraPaymentRequest {
    pub fn validate(&self) -> Result<()> {
        if !self.extra_amount.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: self.extra_amount,
            });
        }
        if self.fee.is_negative() {
            return Err(LedgerError::InvalidPaymentAmount { amount: self.fee });
        }
        Ok(())
    }

    /// what the borrower actually hands over
    pub fn total(&self) -> Money {
        self.extra_amount + self.fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn loan_request() -> LoanRequest {
        LoanRequest {
            owner: OwnerKey::new("a@example.com"),
            lender: "HDFC".to_string(),
            principal: Money::from_major(12_000),
            interest_rate: Rate::from_percentage(12),
            tenure_months: 12,
            frequency: RepaymentFrequency::Monthly,
            first_due_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
        }
    }

    #[test]
    fn test_loan_request_validation() {
        let config = LedgerConfig::default();
        assert!(loan_request().validate(&config).is_ok());

        let mut req = loan_request();
        req.principal = Money::from_decimal(dec!(0.001));
        assert!(matches!(req.validate(&config), Err(LedgerError::InvalidPrincipal { .. })));

        let mut req = loan_request();
        req.tenure_months = 0;
        assert!(matches!(req.validate(&config), Err(LedgerError::InvalidTenure { .. })));

        let mut req = loan_request();
        req.interest_rate = Rate::from_percentage_decimal(dec!(-0.5));
        assert!(matches!(req.validate(&config), Err(LedgerError::InvalidInterestRate { .. })));
    }

    #[test]
    fn test_repayment_request_validation() {
        let mut req = RepaymentRequest {
            repayment_id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            owner: OwnerKey::new("a@example.com"),
            amount_paid: Money::from_major(100),
            principal_component: Money::from_major(80),
        };
        assert!(req.validate().is_ok());

        req.principal_component = Money::from_major(101);
        assert!(req.validate().is_err());

        req.amount_paid = Money::ZERO;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_extra_payment_total_includes_fee() {
        let req = ExtraPaymentRequest {
            loan_id: Uuid::new_v4(),
            owner: OwnerKey::new("a@example.com"),
            extra_amount: Money::from_major(2000),
            fee: Money::from_major(50),
            payment_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        };
        assert!(req.validate().is_ok());
        assert_eq!(req.total(), Money::from_major(2050));

        let negative_fee = ExtraPaymentRequest { fee: Money::from_major(-1), ..req };
        assert!(negative_fee.validate().is_err());
    }
}
