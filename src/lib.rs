//! Hardware test-run orchestration.
//!
//! Test cases are registered as [`TestModule`]s and driven by a
//! [`TestSession`]. Every status change is written through the
//! [`reporter::Reporter`] into two views of one run document: a live state
//! view for operator panels and a durable run view for reports. Cases can
//! block on operator input through the [`dialog`] rendezvous.

pub mod config;
pub mod context;
pub mod dialog;
pub mod errors;
pub mod logging;
pub mod model;
pub mod node;
pub mod orchestrator;
pub mod progress;
pub mod reporter;
pub mod signals;
pub mod store;

pub use context::CaseContext;
pub use errors::CaseFailure;
pub use orchestrator::{CaseResult, RunSummary, TestCase, TestModule, TestSession};
