use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a scheduled or paid repayment
pub type RepaymentId = Uuid;

/// unique identifier for an expense row
pub type ExpenseId = Uuid;

/// unique identifier for an income row
pub type IncomeId = Uuid;

/// unique identifier for a balance history row
pub type EntryId = Uuid;

/// free-text key identifying the owner of a record (e.g. an email address)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerKey(String);

impl OwnerKey {
    pub fn new(key: impl Into<String>) -> Self {
        OwnerKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerKey {
    fn from(s: &str) -> Self {
        OwnerKey::new(s)
    }
}

/// authorization seam: every persisted record answers who owns it
pub trait Owned {
    fn owner(&self) -> &OwnerKey;

    fn is_owned_by(&self, owner: &OwnerKey) -> bool {
        self.owner() == owner
    }
}

/// how often a loan is repaid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepaymentFrequency {
    /// one installment per month
    Monthly,
    /// one installment every two months
    Bimonthly,
    /// one installment per week, four per month
    Weekly,
}

impl RepaymentFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepaymentFrequency::Monthly => "monthly",
            RepaymentFrequency::Bimonthly => "bimonthly",
            RepaymentFrequency::Weekly => "weekly",
        }
    }
}

impl FromStr for RepaymentFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(RepaymentFrequency::Monthly),
            "bimonthly" => Ok(RepaymentFrequency::Bimonthly),
            "weekly" => Ok(RepaymentFrequency::Weekly),
            other => Err(format!("unknown repayment frequency: {}", other)),
        }
    }
}

/// lifecycle of a repayment row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepaymentStatus {
    Pending,
    Paid,
}

impl RepaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepaymentStatus::Pending => "pending",
            RepaymentStatus::Paid => "paid",
        }
    }
}

impl FromStr for RepaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RepaymentStatus::Pending),
            "paid" => Ok(RepaymentStatus::Paid),
            other => Err(format!("unknown repayment status: {}", other)),
        }
    }
}

/// which daily total a money movement lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Income,
    Expense,
}

/// whether a movement is being recorded or unwound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Add,
    Deduct,
}

/// income categories offered by the income forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncomeCategory {
    Salary,
    Rental,
    Investments,
    Freelance,
    Gifts,
    Other,
}

impl IncomeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncomeCategory::Salary => "Salary",
            IncomeCategory::Rental => "Rental",
            IncomeCategory::Investments => "Investments",
            IncomeCategory::Freelance => "Freelance",
            IncomeCategory::Gifts => "Gifts",
            IncomeCategory::Other => "Other",
        }
    }
}

impl FromStr for IncomeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Salary" => Ok(IncomeCategory::Salary),
            "Rental" => Ok(IncomeCategory::Rental),
            "Investments" => Ok(IncomeCategory::Investments),
            "Freelance" => Ok(IncomeCategory::Freelance),
            "Gifts" => Ok(IncomeCategory::Gifts),
            "Other" => Ok(IncomeCategory::Other),
            other => Err(format!("unknown income category: {}", other)),
        }
    }
}
