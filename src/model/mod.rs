//! Run document data model.

mod document;
pub mod fields;
mod status;

pub use document::{CaseRecord, DutInfo, ModuleRecord, ProcessInfo, RunDocument, StandInfo};
pub use status::{Group, TestStatus};
