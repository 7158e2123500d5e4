#![deny(clippy::print_stdout, clippy::print_stderr)]

mod date_range;
mod entities;
mod error;
mod memory;
mod money;
mod recalc;
mod repository;

pub use date_range::DateRange;
pub use entities::Account;
pub use entities::AccountId;
pub use entities::AccountType;
pub use entities::AllocationId;
pub use entities::BudgetPeriod;
pub use entities::BudgetPeriodId;
pub use entities::Envelope;
pub use entities::EnvelopeAllocation;
pub use entities::EnvelopeId;
pub use entities::Payee;
pub use entities::PayeeId;
pub use entities::SplitLineId;
pub use entities::Transaction;
pub use entities::TransactionId;
pub use entities::TransactionSplitLine;
pub use entities::TransactionType;
pub use error::BudgetError;
pub use error::BudgetResult;
pub use error::ErrorCode;
pub use memory::InMemoryStore;
pub use money::Money;
pub use recalc::ensure_period;
pub use recalc::recalculate;
pub use repository::AccountRepository;
pub use repository::BudgetPeriodRepository;
pub use repository::EnvelopeAllocationRepository;
pub use repository::EnvelopeRepository;
pub use repository::PayeeRepository;
pub use repository::TransactionRepository;
pub use repository::TransactionSplitRepository;
pub use repository::UnitOfWork;
