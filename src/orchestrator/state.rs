//! Outcome types passed between the session driver and the orchestrator.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{RunDocument, TestStatus};

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|[@-Z\\-_])").expect("valid ANSI escape regex")
});

/// Remove ANSI escape sequences from a failure message.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Result of one executed case, as reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    /// Assertion violation in the case body
    Failed(String),
    /// Anything outside the normal assertion path
    Error(String),
    /// Explicit skip requested by the case body
    Skipped(String),
}

impl CaseOutcome {
    pub fn status(&self) -> TestStatus {
        match self {
            CaseOutcome::Passed => TestStatus::Passed,
            CaseOutcome::Failed(_) => TestStatus::Failed,
            CaseOutcome::Error(_) => TestStatus::Error,
            CaseOutcome::Skipped(_) => TestStatus::Skipped,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CaseOutcome::Passed => None,
            CaseOutcome::Failed(msg) | CaseOutcome::Error(msg) | CaseOutcome::Skipped(msg) => {
                Some(msg)
            }
        }
    }

    /// Whether another attempt should follow this outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaseOutcome::Failed(_) | CaseOutcome::Error(_))
    }
}

/// What to do with a case that is about to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDecision {
    /// Execute the body up to `attempts` times
    Run { attempts: u32 },
    /// The case was marked SKIPPED without running
    Skip(String),
}

/// How the session ended, before it is mapped to a run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every collected case was processed
    Completed,
    /// A termination signal or cancellation stopped the session
    Interrupted,
    /// Collection failed before any case ran
    CollectionFailed,
    /// The session aborted on an internal error
    InternalError,
}

/// Final report of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: TestStatus,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub stopped: usize,
    /// First case that failed the DUT, as `module::case`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_dut_failure_id: Option<String>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl RunSummary {
    pub fn from_document(doc: &RunDocument, duration: Duration) -> Self {
        Self {
            status: doc.status,
            total: doc.cases().count(),
            passed: doc.count_cases(TestStatus::Passed),
            failed: doc.count_cases(TestStatus::Failed),
            errors: doc.count_cases(TestStatus::Error),
            skipped: doc.count_cases(TestStatus::Skipped),
            stopped: doc.count_cases(TestStatus::Stopped),
            caused_dut_failure_id: doc.caused_dut_failure_id.clone(),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

/// Tracks session wall time.
pub(crate) struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub(crate) fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(
            strip_ansi("\x1b[31mAssertionError\x1b[0m: 3 != 4"),
            "AssertionError: 3 != 4"
        );
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[m"), "ok");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_outcome_status_mapping() {
        assert_eq!(CaseOutcome::Passed.status(), TestStatus::Passed);
        assert_eq!(CaseOutcome::Failed("x".into()).status(), TestStatus::Failed);
        assert_eq!(CaseOutcome::Error("x".into()).status(), TestStatus::Error);
        assert_eq!(CaseOutcome::Skipped("x".into()).status(), TestStatus::Skipped);
        assert!(CaseOutcome::Failed("x".into()).is_retryable());
        assert!(!CaseOutcome::Skipped("x".into()).is_retryable());
        assert_eq!(CaseOutcome::Passed.message(), None);
    }

    #[test]
    fn test_summary_serializes_duration_as_millis() {
        let summary = RunSummary {
            status: TestStatus::Passed,
            duration: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["status"], "passed");
        assert!(summary.is_success());
    }
}
