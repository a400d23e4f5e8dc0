use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::LedgerConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::state::{Loan, Repayment};
use crate::types::{LoanId, OwnerKey, RepaymentFrequency};

/// scheduled payment in amortization schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledPayment {
    pub payment_number: u32,
    pub payment_date: NaiveDate,
    pub beginning_balance: Money,
    pub payment_amount: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub ending_balance: Money,
    pub cumulative_interest: Money,
    pub cumulative_principal: Money,
}

/// starting point of a schedule: a fresh loan or the tail of a rescheduled one
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSeed {
    pub remaining_principal: Money,
    pub installment: Money,
    pub interest_rate: Rate,
    pub frequency: RepaymentFrequency,
    pub first_due_date: NaiveDate,
}

impl ScheduleSeed {
    /// seed that resumes `loan` at `anchor` with its current balance and installment
    pub fn resume(loan: &Loan, anchor: NaiveDate) -> Self {
        Self {
            remaining_principal: loan.remaining_principal,
            installment: loan.installment,
            interest_rate: loan.interest_rate,
            frequency: loan.frequency,
            first_due_date: anchor,
        }
    }
}

/// amortization schedule
#[derive(Debug, Clone)]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub interest_rate: Rate,
    pub frequency: RepaymentFrequency,
    pub first_due_date: NaiveDate,
    pub installment: Money,
    pub payments: Vec<ScheduledPayment>,
    pub total_interest: Money,
    pub total_payment: Money,
}

impl AmortizationSchedule {
    /// generate payment schedule
    pub fn generate(seed: &ScheduleSeed, config: &LedgerConfig) -> Result<Self> {
        let calculator = AmortizationCalculator::new(config);
        let payments = calculator.calculate_schedule(seed)?;

        let total_interest = payments.iter().map(|p| p.interest_portion).sum();
        let total_payment = payments.iter().map(|p| p.payment_amount).sum();

        Ok(Self {
            principal: seed.remaining_principal,
            interest_rate: seed.interest_rate,
            frequency: seed.frequency,
            first_due_date: seed.first_due_date,
            installment: seed.installment,
            payments,
            total_interest,
            total_payment,
        })
    }

    /// get payment for specific period (1-based)
    pub fn get_payment(&self, payment_number: u32) -> Option<&ScheduledPayment> {
        let index = payment_number.checked_sub(1)?;
        self.payments.get(index as usize)
    }

    /// get remaining balance after payment
    pub fn balance_after_payment(&self, payment_number: u32) -> Money {
        self.get_payment(payment_number)
            .map(|p| p.ending_balance)
            .unwrap_or(self.principal)
    }

    pub fn total_principal(&self) -> Money {
        self.payments.iter().map(|p| p.principal_portion).sum()
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    /// pending repayment rows for `loan_id`, one per scheduled payment
    pub fn to_repayments(&self, loan_id: LoanId, owner: &OwnerKey) -> Vec<Repayment> {
        self.payments
            .iter()
            .map(|p| {
                Repayment::pending(
                    loan_id,
                    owner.clone(),
                    p.payment_date,
                    p.principal_portion,
                    p.interest_portion,
                )
            })
            .collect()
    }
}

/// number of periods a tenure in months spans at the given frequency
pub fn period_count(tenure_months: u32, frequency: RepaymentFrequency) -> u32 {
    match frequency {
        RepaymentFrequency::Monthly => tenure_months,
        RepaymentFrequency::Bimonthly => tenure_months.div_ceil(2),
        RepaymentFrequency::Weekly => tenure_months.saturating_mul(4),
    }
}

/// due date of the `index`-th period (0-based), always measured from the anchor
pub fn due_date(anchor: NaiveDate, frequency: RepaymentFrequency, index: u32) -> Result<NaiveDate> {
    let date = match frequency {
        RepaymentFrequency::Monthly => anchor.checked_add_months(Months::new(index)),
        RepaymentFrequency::Bimonthly => index
            .checked_mul(2)
            .and_then(|months| anchor.checked_add_months(Months::new(months))),
        RepaymentFrequency::Weekly => anchor.checked_add_days(Days::new(u64::from(index) * 7)),
    };
    date.ok_or_else(|| LedgerError::InvalidDate {
        message: format!("period {} from {} is out of range", index + 1, anchor),
    })
}

/// amortization calculator
pub struct AmortizationCalculator {
    currency_dp: u32,
    rounding_sweep: Money,
    max_periods: u32,
}

impl AmortizationCalculator {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            currency_dp: config.currency_dp,
            rounding_sweep: config.rounding_sweep,
            max_periods: config.max_periods,
        }
    }

    fn round(&self, amount: Money) -> Money {
        amount.round_currency(self.currency_dp)
    }

    /// periodic installment for a fresh loan
    pub fn installment(
        &self,
        principal: Money,
        annual_rate: Rate,
        tenure_months: u32,
        frequency: RepaymentFrequency,
    ) -> Result<Money> {
        if !principal.is_positive() {
            return Err(LedgerError::InvalidPrincipal { amount: principal });
        }
        if tenure_months == 0 {
            return Err(LedgerError::InvalidTenure {
                months: tenure_months,
            });
        }
        if annual_rate.is_negative() {
            return Err(LedgerError::InvalidInterestRate { rate: annual_rate });
        }

        let periods = period_count(tenure_months, frequency);
        if periods > self.max_periods {
            return Err(LedgerError::ScheduleTooLong {
                max_periods: self.max_periods,
            });
        }

        let emi = calculate_emi_amount(principal, annual_rate, periods)?;
        Ok(self.round(emi))
    }

    /// interest charged on `balance` for one period
    pub fn period_interest(&self, balance: Money, annual_rate: Rate) -> Money {
        self.round(balance * annual_rate.monthly_rate())
    }

    /// fail unless the installment retires some principal in the first period
    pub fn check_covers_interest(&self, seed: &ScheduleSeed) -> Result<()> {
        let balance = self.round(seed.remaining_principal);
        if !balance.is_positive() {
            return Ok(());
        }
        let interest = self.period_interest(balance, seed.interest_rate);
        if seed.installment <= interest {
            return Err(LedgerError::InstallmentTooSmall {
                installment: seed.installment,
                interest,
            });
        }
        Ok(())
    }

    /// calculate full amortization schedule, driven by the remaining principal
    pub fn calculate_schedule(&self, seed: &ScheduleSeed) -> Result<Vec<ScheduledPayment>> {
        if seed.remaining_principal.is_negative() {
            return Err(LedgerError::InvalidPrincipal {
                amount: seed.remaining_principal,
            });
        }
        if seed.interest_rate.is_negative() {
            return Err(LedgerError::InvalidInterestRate {
                rate: seed.interest_rate,
            });
        }
        self.check_covers_interest(seed)?;

        let mut payments = Vec::new();
        let mut balance = self.round(seed.remaining_principal);
        let mut cumulative_interest = Money::ZERO;
        let mut cumulative_principal = Money::ZERO;
        let mut index = 0u32;

        while balance.is_positive() {
            if index >= self.max_periods {
                return Err(LedgerError::ScheduleTooLong {
                    max_periods: self.max_periods,
                });
            }

            let interest_portion = self.period_interest(balance, seed.interest_rate);
            let mut principal_portion = (seed.installment - interest_portion).min(balance);
            if !principal_portion.is_positive() {
                return Err(LedgerError::InstallmentTooSmall {
                    installment: seed.installment,
                    interest: interest_portion,
                });
            }

            // a residual below the sweep goes out with this installment
            let residual = balance - principal_portion;
            if residual.is_positive() && residual < self.rounding_sweep {
                principal_portion = balance;
            }

            let ending_balance = balance - principal_portion;
            cumulative_interest += interest_portion;
            cumulative_principal += principal_portion;

            payments.push(ScheduledPayment {
                payment_number: index + 1,
                payment_date: due_date(seed.first_due_date, seed.frequency, index)?,
                beginning_balance: balance,
                payment_amount: principal_portion + interest_portion,
                principal_portion,
                interest_portion,
                ending_balance,
                cumulative_interest,
                cumulative_principal,
            });

            balance = ending_balance;
            index += 1;
        }

        debug!(
            periods = payments.len(),
            principal = %seed.remaining_principal,
            interest = %cumulative_interest,
            "schedule generated"
        );

        Ok(payments)
    }
}

/// calculate EMI amount
fn calculate_emi_amount(principal: Money, annual_rate: Rate, periods: u32) -> Result<Money> {
    let r = annual_rate.monthly_rate();

    if r.is_zero() {
        return Ok(principal / Decimal::from(periods));
    }

    // EMI = P * r * (1 + r)^n / ((1 + r)^n - 1)
    let overflow = || LedgerError::CalculationError {
        message: format!("(1 + {})^{} overflows", r, periods),
    };
    let base = Decimal::ONE + r;
    let mut compound = Decimal::ONE;
    for _ in 0..periods {
        compound = compound.checked_mul(base).ok_or_else(overflow)?;
    }

    let numerator = principal
        .as_decimal()
        .checked_mul(r)
        .and_then(|v| v.checked_mul(compound))
        .ok_or_else(overflow)?;
    let denominator = compound - Decimal::ONE;
    let emi = numerator.checked_div(denominator).ok_or_else(overflow)?;

    Ok(Money::from_decimal(emi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn money(d: Decimal) -> Money {
        Money::from_decimal(d)
    }

    fn seed(principal: Money, rate: Rate, installment: Money, frequency: RepaymentFrequency) -> ScheduleSeed {
        ScheduleSeed {
            remaining_principal: principal,
            installment,
            interest_rate: rate,
            frequency,
            first_due_date: date(2025, 1, 5),
        }
    }

    #[rstest]
    #[case(RepaymentFrequency::Monthly, 12, 12)]
    #[case(RepaymentFrequency::Bimonthly, 12, 6)]
    #[case(RepaymentFrequency::Bimonthly, 7, 4)]
    #[case(RepaymentFrequency::Weekly, 12, 48)]
    fn test_period_count(#[case] frequency: RepaymentFrequency, #[case] months: u32, #[case] expected: u32) {
        assert_eq!(period_count(months, frequency), expected);
    }

    #[rstest]
    #[case(12_000, 12, 12, RepaymentFrequency::Monthly, dec!(1066.19))]
    #[case(12_000, 12, 12, RepaymentFrequency::Bimonthly, dec!(2070.58))]
    #[case(12_000, 12, 12, RepaymentFrequency::Weekly, dec!(316.01))]
    #[case(100_000, 10, 120, RepaymentFrequency::Monthly, dec!(1321.51))]
    #[case(12_000, 0, 12, RepaymentFrequency::Monthly, dec!(1000))]
    fn test_installment(
        #[case] principal: i64,
        #[case] rate: u32,
        #[case] months: u32,
        #[case] frequency: RepaymentFrequency,
        #[case] expected: Decimal,
    ) {
        let calc = AmortizationCalculator::new(&LedgerConfig::default());
        let emi = calc
            .installment(Money::from_major(principal), Rate::from_percentage(rate), months, frequency)
            .unwrap();
        assert_eq!(emi, money(expected));
    }

    #[test]
    fn test_whole_unit_installment() {
        let calc = AmortizationCalculator::new(&LedgerConfig::whole_units());
        let emi = calc
            .installment(Money::from_major(12_000), Rate::from_percentage(12), 12, RepaymentFrequency::Monthly)
            .unwrap();
        assert_eq!(emi, Money::from_major(1066));
    }

    #[test]
    fn test_installment_rejects_bad_input() {
        let calc = AmortizationCalculator::new(&LedgerConfig::default());
        let monthly = RepaymentFrequency::Monthly;
        let rate = Rate::from_percentage(12);

        assert!(matches!(
            calc.installment(Money::ZERO, rate, 12, monthly),
            Err(LedgerError::InvalidPrincipal { .. })
        ));
        assert!(matches!(
            calc.installment(Money::from_major(100), rate, 0, monthly),
            Err(LedgerError::InvalidTenure { .. })
        ));
        assert!(matches!(
            calc.installment(Money::from_major(100), Rate::from_percentage_decimal(dec!(-1)), 12, monthly),
            Err(LedgerError::InvalidInterestRate { .. })
        ));
        assert!(matches!(
            calc.installment(Money::from_major(100), rate, 400, RepaymentFrequency::Weekly),
            Err(LedgerError::ScheduleTooLong { .. })
        ));
    }

    #[test]
    fn test_first_period_split() {
        let config = LedgerConfig::default();
        let schedule = AmortizationSchedule::generate(
            &seed(
                Money::from_major(12_000),
                Rate::from_percentage(12),
                money(dec!(1066.19)),
                RepaymentFrequency::Monthly,
            ),
            &config,
        )
        .unwrap();

        let first = schedule.get_payment(1).unwrap();
        assert_eq!(first.interest_portion, money(dec!(120.00)));
        assert_eq!(first.principal_portion, money(dec!(946.19)));
        assert_eq!(first.ending_balance, money(dec!(11053.81)));
        assert_eq!(first.payment_date, date(2025, 1, 5));

        assert_eq!(schedule.len(), 12);
        assert_eq!(schedule.total_principal(), Money::from_major(12_000));
        assert_eq!(schedule.balance_after_payment(12), Money::ZERO);
        assert!(schedule.get_payment(0).is_none());
    }

    #[rstest]
    #[case(RepaymentFrequency::Monthly)]
    #[case(RepaymentFrequency::Bimonthly)]
    #[case(RepaymentFrequency::Weekly)]
    fn test_schedule_pays_down_to_zero(#[case] frequency: RepaymentFrequency) {
        let config = LedgerConfig::default();
        let calc = AmortizationCalculator::new(&config);
        let principal = Money::from_major(250_000);
        let rate = Rate::from_percentage_decimal(dec!(8.5));
        let emi = calc.installment(principal, rate, 60, frequency).unwrap();

        let payments = calc.calculate_schedule(&seed(principal, rate, emi, frequency)).unwrap();

        let total: Money = payments.iter().map(|p| p.principal_portion).sum();
        assert_eq!(total, principal);
        for p in &payments {
            assert_eq!(p.principal_portion + p.interest_portion, p.payment_amount);
            assert!(p.principal_portion.is_positive());
        }
        for pair in payments.windows(2) {
            assert!(pair[1].ending_balance <= pair[0].ending_balance);
            assert!(pair[1].payment_date > pair[0].payment_date);
        }
        assert_eq!(payments.last().unwrap().ending_balance, Money::ZERO);
    }

    #[test]
    fn test_zero_rate_schedule() {
        let config = LedgerConfig::default();
        let calc = AmortizationCalculator::new(&config);
        let principal = Money::from_major(12_000);
        let emi = calc
            .installment(principal, Rate::ZERO, 12, RepaymentFrequency::Monthly)
            .unwrap();

        let payments = calc
            .calculate_schedule(&seed(principal, Rate::ZERO, emi, RepaymentFrequency::Monthly))
            .unwrap();
        assert_eq!(payments.len(), 12);
        assert!(payments.iter().all(|p| p.interest_portion.is_zero()));
        assert!(payments.iter().all(|p| p.payment_amount == Money::from_major(1000)));
    }

    #[test]
    fn test_small_residual_is_swept() {
        let config = LedgerConfig::default();
        let calc = AmortizationCalculator::new(&config);
        // 100.50 at 50/period leaves 0.50 after the second payment
        let payments = calc
            .calculate_schedule(&seed(
                money(dec!(100.50)),
                Rate::ZERO,
                Money::from_major(50),
                RepaymentFrequency::Monthly,
            ))
            .unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[1].principal_portion, money(dec!(50.50)));
        assert_eq!(payments[1].ending_balance, Money::ZERO);
    }

    #[test]
    fn test_short_final_installment() {
        let config = LedgerConfig::default();
        let calc = AmortizationCalculator::new(&config);
        let payments = calc
            .calculate_schedule(&seed(
                Money::from_major(130),
                Rate::ZERO,
                Money::from_major(50),
                RepaymentFrequency::Monthly,
            ))
            .unwrap();
        assert_eq!(payments.len(), 3);
        assert_eq!(payments[2].payment_amount, Money::from_major(30));
    }

    #[test]
    fn test_installment_below_interest_is_rejected() {
        let calc = AmortizationCalculator::new(&LedgerConfig::default());
        let result = calc.calculate_schedule(&seed(
            Money::from_major(12_000),
            Rate::from_percentage(12),
            Money::from_major(120),
            RepaymentFrequency::Monthly,
        ));
        assert!(matches!(result, Err(LedgerError::InstallmentTooSmall { .. })));
    }

    #[test]
    fn test_zero_balance_yields_empty_schedule() {
        let calc = AmortizationCalculator::new(&LedgerConfig::default());
        let payments = calc
            .calculate_schedule(&seed(
                Money::ZERO,
                Rate::from_percentage(12),
                money(dec!(1066.19)),
                RepaymentFrequency::Monthly,
            ))
            .unwrap();
        assert!(payments.is_empty());
    }

    #[test]
    fn test_due_dates_follow_anchor() {
        let anchor = date(2025, 1, 31);
        assert_eq!(due_date(anchor, RepaymentFrequency::Monthly, 1).unwrap(), date(2025, 2, 28));
        assert_eq!(due_date(anchor, RepaymentFrequency::Monthly, 2).unwrap(), date(2025, 3, 31));
        assert_eq!(due_date(anchor, RepaymentFrequency::Bimonthly, 1).unwrap(), date(2025, 3, 31));
        assert_eq!(due_date(anchor, RepaymentFrequency::Weekly, 2).unwrap(), date(2025, 2, 14));
    }
}
