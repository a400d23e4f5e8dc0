//! serialization support for loans
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::state::{Loan, Repayment};
use crate::types::{LoanId, OwnerKey, RepaymentFrequency, RepaymentId, RepaymentStatus};

/// serializable view of a loan with its schedule
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanView {
    pub id: LoanId,
    pub owner: OwnerKey,
    pub lender: String,
    pub terms: TermsView,
    pub progress: ProgressView,
    pub schedule: Vec<RepaymentView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermsView {
    pub principal: Money,
    pub interest_rate: Rate,
    pub tenure_months: u32,
    pub frequency: RepaymentFrequency,
    pub installment: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressView {
    pub remaining_principal: Money,
    pub next_due_date: Option<NaiveDate>,
    pub paid_off: bool,
    pub paid_count: usize,
    pub pending_count: usize,
    pub total_paid: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub total_pending: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RepaymentView {
    pub id: RepaymentId,
    pub scheduled_date: NaiveDate,
    pub amount: Money,
    pub principal_part: Money,
    pub interest_part: Money,
    pub status: RepaymentStatus,
}

impl LoanView {
    pub fn from_loan(loan: &Loan, repayments: &[Repayment]) -> Self {
        let (paid, pending): (Vec<&Repayment>, Vec<&Repayment>) =
            repayments.iter().partition(|r| r.is_paid());

        LoanView {
            id: loan.id,
            owner: loan.owner.clone(),
            lender: loan.lender.clone(),
            terms: TermsView {
                principal: loan.principal,
                interest_rate: loan.interest_rate,
                tenure_months: loan.tenure_months,
                frequency: loan.frequency,
                installment: loan.installment,
            },
            progress: ProgressView {
                remaining_principal: loan.remaining_principal,
                next_due_date: (!loan.paid_off).then_some(loan.next_due_date),
                paid_off: loan.paid_off,
                paid_count: paid.len(),
                pending_count: pending.len(),
                total_paid: paid.iter().map(|r| r.amount).sum(),
                principal_paid: paid.iter().map(|r| r.principal_part).sum(),
                interest_paid: paid.iter().map(|r| r.interest_part).sum(),
                total_pending: pending.iter().map(|r| r.amount).sum(),
            },
            schedule: repayments
                .iter()
                .map(|r| RepaymentView {
                    id: r.id,
                    scheduled_date: r.scheduled_date,
                    amount: r.amount,
                    principal_part: r.principal_part,
                    interest_part: r.interest_part,
                    status: r.status,
                })
                .collect(),
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_view_totals_and_json() {
        let owner = OwnerKey::new("alice");
        let loan_id = Uuid::new_v4();
        let day = |m| NaiveDate::from_ymd_opt(2025, m, 5).unwrap();

        let mut paid = Repayment::pending(loan_id, owner.clone(), day(1), Money::from_major(900), Money::from_major(100));
        paid.status = RepaymentStatus::Paid;
        let pending = Repayment::pending(loan_id, owner.clone(), day(2), Money::from_major(950), Money::from_major(50));

        let loan = Loan {
            id: loan_id,
            owner,
            lender: "ICICI".to_string(),
            principal: Money::from_major(1850),
            remaining_principal: Money::from_major(950),
            interest_rate: Rate::from_percentage(12),
            tenure_months: 2,
            frequency: RepaymentFrequency::Monthly,
            installment: Money::from_major(1000),
            next_due_date: day(2),
            paid_off: false,
            version: 3,
        };

        let view = LoanView::from_loan(&loan, &[paid, pending]);
        assert_eq!(view.progress.paid_count, 1);
        assert_eq!(view.progress.principal_paid, Money::from_major(900));
        assert_eq!(view.progress.total_pending, Money::from_major(1000));
        assert_eq!(view.progress.next_due_date, Some(day(2)));

        let json = view.to_json_pretty().unwrap();
        assert!(json.contains("\"lender\": \"ICICI\""));
        assert!(json.contains("\"frequency\": \"monthly\""));
    }
}
