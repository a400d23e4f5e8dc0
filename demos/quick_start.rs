/// quick start - create a loan, pay it down and read the balance ledger
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use loan_ledger::{
    ExtraPaymentRequest, IncomeCategory, LedgerConfig, LoanLedger, LoanRequest, MemoryStore, Money,
    OwnerKey, Rate, RepaymentFrequency, RepaymentRequest, SafeTimeProvider, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== loan ledger quick start ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    ));
    let ledger = LoanLedger::new(MemoryStore::new(), LedgerConfig::default(), time)?;
    let owner = OwnerKey::new("alice@example.com");

    ledger.record_income(
        &owner,
        "January salary",
        Money::from_major(5_000),
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        IncomeCategory::Salary,
    )?;

    // 12,000 at 12% over 12 months
    let loan_id = ledger.create_loan(LoanRequest {
        owner: owner.clone(),
        lender: "HDFC".to_string(),
        principal: Money::from_major(12_000),
        interest_rate: Rate::from_percentage(12),
        tenure_months: 12,
        frequency: RepaymentFrequency::Monthly,
        first_due_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
    })?;

    // a month later the first installment is due
    ledger.time().test_control().unwrap().advance(Duration::days(31));
    println!("due repayments: {}", ledger.count_due_pending_repayments(&owner, ledger.today())?);

    let first = ledger.repayments_by_loan(loan_id)?.remove(0);
    ledger.mark_repayment_paid(RepaymentRequest {
        repayment_id: first.id,
        loan_id,
        owner: owner.clone(),
        amount_paid: first.amount,
        principal_component: first.principal_part,
    })?;

    ledger.apply_extra_payment(ExtraPaymentRequest {
        loan_id,
        owner: owner.clone(),
        extra_amount: Money::from_major(2_000),
        fee: Money::from_major(50),
        payment_date: ledger.today(),
    })?;

    println!("{}", ledger.loan_view(loan_id, &owner)?.to_json_pretty()?);

    let summary = ledger.loan_summary(&owner)?;
    println!(
        "\nactive loans: {}, outstanding: {}",
        summary.active_loans, summary.total_outstanding
    );

    if let Some(last) = ledger
        .balance_history(&owner, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), ledger.today())?
        .last()
    {
        println!("balance on {}: {}", last.date, last.balance);
    }

    for event in ledger.take_events() {
        println!("{:?}", event);
    }

    Ok(())
}
