//! The directional scan: orchestration across roles and the estimate it produces.

mod estimator;
mod orchestrator;

pub use estimator::{estimate_direction, Estimate};
pub use orchestrator::{PhaseFlags, ScanOrchestrator, ScanPhase};
