pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod payments;
pub mod state;
pub mod store;
pub mod types;
pub mod views;

// re-export key types
pub use config::LedgerConfig;
pub use decimal::{Money, Rate};
pub use errors::{LedgerError, Result, StoreError};
pub use events::{EventStore, LedgerEvent};
pub use ledger::{BalanceLedger, DeletedRepayment, Movement, PaidRepayment, Recalculation};
pub use lifecycle::{LoanDeletion, LoanLedger, LoanSummary};
pub use payments::{
    AmortizationCalculator, AmortizationSchedule, ExtraPaymentRequest, ExtraPaymentResult,
    LoanRequest, RepaymentRequest, ScheduleSeed, ScheduledPayment,
};
pub use state::{BalanceEntry, Expense, Income, Loan, Repayment};
pub use store::{LedgerStore, MemoryStore, SqliteStore, TransactionalStore};
pub use types::{
    Direction, ExpenseId, IncomeCategory, IncomeId, LoanId, MovementKind, Owned, OwnerKey,
    RepaymentFrequency, RepaymentId, RepaymentStatus,
};
pub use views::LoanView;

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
