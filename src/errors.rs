//! Typed error hierarchy for HardPy.
//!
//! One enum per subsystem:
//! - `NodeInfoError`: per-test metadata derivation
//! - `ProgressError`: progress calculator setup
//! - `StoreError`: document store engines
//! - `ReporterError`: buffered document access and persistence
//! - `OrchestratorError`: collection and run lifecycle failures
//! - `DialogError`: operator rendezvous failures
//! - `CaseFailure`: how a test case body reports a non-passing result

use thiserror::Error;

use crate::model::TestStatus;

/// Errors raised while deriving test metadata from a case descriptor.
#[derive(Debug, Error)]
pub enum NodeInfoError {
    #[error("Invalid dependency '{value}' in {node}: expected 'module' or 'module::case'")]
    InvalidDependency { node: String, value: String },

    #[error("Invalid attempt value {value} in {node}: attempt must be a positive integer")]
    InvalidAttempt { node: String, value: i64 },

    #[error("Invalid module path '{0}': cannot derive a module id")]
    InvalidModulePath(String),
}

/// Errors from the progress calculator.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Test amount must be positive, got {0}")]
    InvalidAmount(i64),
}

/// Errors from a document store engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document {id} update conflict: stored revision {stored:?}, given {given:?}")]
    Conflict {
        id: String,
        stored: Option<String>,
        given: Option<String>,
    },

    #[error("Document {0} is not a JSON object")]
    NotAnObject(String),

    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize document {id}: {source}")]
    Serde {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors from the reporter.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("A value cannot be restricted to both the state view and the run view")]
    ConflictingMask,

    #[error("Key '{key}' crosses non-object field '{segment}'")]
    NotAnObject { key: String, segment: String },

    #[error("Store '{view}' rejected document after revision reload: {source}")]
    PersistFailed {
        view: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Run document does not match the expected schema: {0}")]
    Schema(#[source] serde_json::Error),

    #[error("Reporter lock poisoned")]
    LockPoisoned,
}

/// Errors from the orchestrator subsystem.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    NodeInfo(#[from] NodeInfoError),

    #[error("Case {case} depends on unknown module '{module}'")]
    UnknownDependencyModule { case: String, module: String },

    #[error("Case {case} depends on unknown case '{module}::{target}'")]
    UnknownDependencyCase {
        case: String,
        module: String,
        target: String,
    },

    #[error("Duplicate test case {0}")]
    DuplicateCase(String),

    #[error("Unknown test case {0}")]
    UnknownCase(String),

    #[error("Case {case} cannot accept {event} while {from}")]
    InvalidTransition {
        case: String,
        from: TestStatus,
        event: &'static str,
    },

    #[error("No test cases collected")]
    NothingCollected,

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Reporter(#[from] ReporterError),
}

/// Errors from the operator rendezvous channel.
#[derive(Debug, Error)]
pub enum DialogError {
    #[error("A dialog box is already open for {0}")]
    DuplicateRequest(String),

    #[error("Failed to bind rendezvous listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Rendezvous connection failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("Widget configuration error: {0}")]
    WidgetConfig(String),

    #[error("Operator reply is not valid UTF-8 after decoding")]
    InvalidEncoding,

    #[error("Wait for operator input was interrupted")]
    Interrupted,

    #[error(transparent)]
    Reporter(#[from] ReporterError),
}

/// Non-passing result of a test case body.
///
/// `Assertion` maps to FAILED, `Error` to ERROR and `Skip` to SKIPPED. Any
/// other error propagated with `?` becomes `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseFailure {
    #[error("{0}")]
    Assertion(String),

    #[error("{0}")]
    Error(String),

    #[error("skipped: {0}")]
    Skip(String),
}

impl CaseFailure {
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }
}

impl From<anyhow::Error> for CaseFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Error(format!("{:#}", err))
    }
}

impl From<DialogError> for CaseFailure {
    fn from(err: DialogError) -> Self {
        Self::Error(err.to_string())
    }
}

impl From<ReporterError> for CaseFailure {
    fn from(err: ReporterError) -> Self {
        Self::Error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_is_distinguishable() {
        let err = StoreError::Conflict {
            id: "current".into(),
            stored: Some("2-ab".into()),
            given: Some("1-cd".into()),
        };
        assert!(err.is_conflict());
        assert!(err.to_string().contains("current"));

        let io = StoreError::Io {
            path: "/tmp/x".into(),
            source: std::io::Error::other("boom"),
        };
        assert!(!io.is_conflict());
    }

    #[test]
    fn node_info_error_carries_node_and_value() {
        let err = NodeInfoError::InvalidDependency {
            node: "test_1::test_a".into(),
            value: "bad dep".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("test_1::test_a"));
        assert!(msg.contains("bad dep"));
    }

    #[test]
    fn orchestrator_error_converts_from_node_info() {
        let inner = NodeInfoError::InvalidAttempt {
            node: "m::c".into(),
            value: 0,
        };
        let err: OrchestratorError = inner.into();
        assert!(matches!(
            err,
            OrchestratorError::NodeInfo(NodeInfoError::InvalidAttempt { value: 0, .. })
        ));
    }

    #[test]
    fn dialog_error_converts_from_reporter() {
        let err: DialogError = ReporterError::ConflictingMask.into();
        assert!(matches!(
            err,
            DialogError::Reporter(ReporterError::ConflictingMask)
        ));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ProgressError::InvalidAmount(0));
        assert_std_error(&ReporterError::LockPoisoned);
        assert_std_error(&OrchestratorError::NothingCollected);
        assert_std_error(&DialogError::Interrupted);
        assert_std_error(&CaseFailure::skip("x"));
    }

    #[test]
    fn case_failure_from_other_errors_is_error() {
        let err: CaseFailure = anyhow::anyhow!("relay stuck").context("power cycle").into();
        assert_eq!(err, CaseFailure::Error("power cycle: relay stuck".into()));

        let err: CaseFailure = DialogError::WidgetConfig("bad width".into()).into();
        assert!(matches!(err, CaseFailure::Error(msg) if msg.contains("bad width")));
        assert_eq!(CaseFailure::skip("no DUT").to_string(), "skipped: no DUT");
    }
}
