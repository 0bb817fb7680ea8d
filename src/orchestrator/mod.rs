//! Test-run orchestration.
//!
//! - [`Orchestrator`]: the synchronous run state machine
//! - [`TestSession`]: async driver executing registered [`TestModule`]s
//!   through the orchestrator, with attempts, panic isolation and
//!   cancellation

mod machine;
mod session;
mod state;
mod suite;

pub use machine::{Orchestrator, OrchestratorConfig, PostRunCallback};
pub use session::TestSession;
pub use state::{CaseOutcome, RunSummary, SessionOutcome, StartDecision, strip_ansi};
pub use suite::{CaseBody, CaseResult, TestCase, TestModule};
