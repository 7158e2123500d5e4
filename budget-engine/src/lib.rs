#![deny(clippy::print_stdout, clippy::print_stderr)]

mod allocations;
mod orchestrator;
mod telemetry;
mod transactions;

pub use allocations::AllocationChange;
pub use allocations::GoalAssignMode;
pub use orchestrator::BudgetEngine;
pub use orchestrator::BudgetSnapshot;
pub use orchestrator::EngineError;
pub use orchestrator::EngineOutcome;
pub use orchestrator::ImportCommitResult;
pub use telemetry::EngineTelemetry;
pub use telemetry::TelemetryCounters;
pub use transactions::CreateInflowInput;
pub use transactions::CreateOutflowInput;
pub use transactions::TransferOutcome;
pub use transactions::UpdateTransactionInput;
