//! Test status and group enums shared by cases, modules and runs.

use serde::{Deserialize, Serialize};

/// Status of a case, module or whole run.
///
/// Cases move `Ready -> Run -> terminal` and never backward. Modules and runs
/// derive their status from their cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Ready,
    Run,
    Passed,
    Failed,
    Error,
    Skipped,
    Stopped,
}

impl TestStatus {
    /// Check if the status is final for a case.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Ready | Self::Run)
    }

    /// Statuses that cause a dependent case to be skipped.
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed | Self::Skipped | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Run => "run",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Stopped => "stopped",
        }
    }

    /// Aggregate terminal case statuses into a module status.
    ///
    /// Returns `None` while any case is still `Ready` or `Run`. Precedence is
    /// ERROR > FAILED > SKIPPED > PASSED; a fully stopped module stays STOPPED.
    pub fn aggregate<'a>(statuses: impl IntoIterator<Item = &'a TestStatus>) -> Option<TestStatus> {
        let mut seen_any = false;
        let (mut error, mut failed, mut skipped, mut passed) = (false, false, false, false);
        for status in statuses {
            seen_any = true;
            match status {
                Self::Ready | Self::Run => return None,
                Self::Error => error = true,
                Self::Failed => failed = true,
                Self::Skipped => skipped = true,
                Self::Passed => passed = true,
                Self::Stopped => {}
            }
        }
        if !seen_any {
            return None;
        }
        Some(if error {
            Self::Error
        } else if failed {
            Self::Failed
        } else if skipped {
            Self::Skipped
        } else if passed {
            Self::Passed
        } else {
            Self::Stopped
        })
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution group of a case or module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Setup,
    #[default]
    Main,
    Teardown,
}

impl Group {
    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Setup => "setup",
            Group::Main => "main",
            Group::Teardown => "teardown",
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Group {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "setup" => Ok(Group::Setup),
            "main" => Ok(Group::Main),
            "teardown" => Ok(Group::Teardown),
            _ => anyhow::bail!("Invalid group '{}'. Valid values: setup, main, teardown", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!TestStatus::Ready.is_terminal());
        assert!(!TestStatus::Run.is_terminal());
        assert!(TestStatus::Passed.is_terminal());
        assert!(TestStatus::Failed.is_terminal());
        assert!(TestStatus::Error.is_terminal());
        assert!(TestStatus::Skipped.is_terminal());
        assert!(TestStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_blocking_statuses() {
        assert!(TestStatus::Failed.blocks_dependents());
        assert!(TestStatus::Skipped.blocks_dependents());
        assert!(TestStatus::Error.blocks_dependents());
        assert!(!TestStatus::Passed.blocks_dependents());
        assert!(!TestStatus::Run.blocks_dependents());
    }

    #[test]
    fn test_aggregate_precedence() {
        use TestStatus::*;
        assert_eq!(TestStatus::aggregate(&[Passed, Skipped, Failed, Error]), Some(Error));
        assert_eq!(TestStatus::aggregate(&[Passed, Failed, Skipped]), Some(Failed));
        assert_eq!(TestStatus::aggregate(&[Passed, Skipped]), Some(Skipped));
        assert_eq!(TestStatus::aggregate(&[Passed, Passed]), Some(Passed));
    }

    #[test]
    fn test_aggregate_waits_for_all_cases() {
        use TestStatus::*;
        assert_eq!(TestStatus::aggregate(&[Passed, Run]), None);
        assert_eq!(TestStatus::aggregate(&[Ready, Failed]), None);
        assert_eq!(TestStatus::aggregate(std::iter::empty()), None);
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&TestStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
        let back: TestStatus = serde_json::from_str("\"run\"").unwrap();
        assert_eq!(back, TestStatus::Run);
    }

    #[test]
    fn test_group_parse() {
        assert_eq!("SETUP".parse::<Group>().unwrap(), Group::Setup);
        assert_eq!(Group::default(), Group::Main);
        assert!("other".parse::<Group>().is_err());
    }
}
