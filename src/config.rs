use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};

/// ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// decimal places kept on every persisted amount (0 gives whole units)
    pub currency_dp: u32,
    /// residual principal below this is folded into the installment that leaves it
    pub rounding_sweep: Money,
    /// generated expenses are named "<prefix> - <lender>"
    pub expense_label_prefix: String,
    /// ceiling on the number of periods a single loan may be scheduled over
    pub max_periods: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency_dp: 2,
            rounding_sweep: Money::ONE,
            expense_label_prefix: "Loan Repayment".to_string(),
            max_periods: 1200,
        }
    }
}

impl LedgerConfig {
    /// whole-unit amounts, as the dashboards originally stored them
    pub fn whole_units() -> Self {
        Self {
            currency_dp: 0,
            ..Self::default()
        }
    }

    /// load from a json document; missing keys fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LedgerConfig =
            serde_json::from_str(json).map_err(|e| LedgerError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.currency_dp > 8 {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("currency_dp {} exceeds 8 decimal places", self.currency_dp),
            });
        }
        if self.rounding_sweep.is_negative() {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("rounding_sweep must not be negative: {}", self.rounding_sweep),
            });
        }
        if self.max_periods == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "max_periods must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// round an amount to the configured currency precision
    pub fn round(&self, amount: Money) -> Money {
        amount.round_currency(self.currency_dp)
    }

    pub fn expense_label(&self, lender: &str) -> String {
        format!("{} - {}", self.expense_label_prefix, lender)
    }
}
