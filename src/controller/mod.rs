//! Controller module for StackSet reconciliation
//! This module contains the action planner, the operation waiter and the
//! reconciliation engine that ties them to a gateway.

pub mod plan;
mod reconciler;
pub mod waiter;

pub use plan::{plan_action, CorrectiveAction};
pub use reconciler::{EngineConfig, FailureReason, ReconcileOutcome, ReconciliationEngine};
pub use waiter::{OperationWaiter, WaitConfig};
