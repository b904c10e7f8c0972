//! Execution lifecycle for agentexec.
//!
//! [`ExecutionManager`] owns the execution state machine
//! (`PENDING → RUNNING → {COMPLETED | FAILED | CANCELLED}`): it persists a
//! record before running anything, bounds each run with a timeout, wires
//! cancellation through to the reasoning loop and writes exactly one
//! terminal state. The agent itself runs behind the [`Runner`] trait.

pub mod manager;
pub mod runner;

pub use manager::{ExecutionManager, Page};
pub use runner::Runner;
