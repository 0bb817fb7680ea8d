//! Typed view of the run document.
//!
//! The reporter works on raw JSON so it can address any field by key; these
//! types are the read side, used by post-run callbacks, the CLI and tests.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::status::{Group, TestStatus};

/// Root record of a test run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDocument {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub stop_time: Option<i64>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub dut: DutInfo,
    #[serde(default)]
    pub test_stand: StandInfo,
    #[serde(default)]
    pub process: ProcessInfo,
    #[serde(default)]
    pub modules: IndexMap<String, ModuleRecord>,
    #[serde(default)]
    pub operator_msg: Option<Value>,
    #[serde(default)]
    pub alert: String,
    /// Run view only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Map<String, Value>>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub caused_dut_failure_id: Option<String>,
}

impl RunDocument {
    /// Look up a case record.
    pub fn case(&self, module_id: &str, case_id: &str) -> Option<&CaseRecord> {
        self.modules.get(module_id)?.cases.get(case_id)
    }

    /// Iterate over all cases in collection order as `(module_id, case_id, record)`.
    pub fn cases(&self) -> impl Iterator<Item = (&str, &str, &CaseRecord)> {
        self.modules.iter().flat_map(|(module_id, module)| {
            module
                .cases
                .iter()
                .map(move |(case_id, case)| (module_id.as_str(), case_id.as_str(), case))
        })
    }

    /// Count cases in the given status.
    pub fn count_cases(&self, status: TestStatus) -> usize {
        self.cases().filter(|(_, _, c)| c.status == status).count()
    }
}

/// Device-under-test information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DutInfo {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
    #[serde(default)]
    pub info: Map<String, Value>,
}

/// Test stand information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub info: Map<String, Value>,
}

/// Production process information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub info: Map<String, Value>,
}

/// A file-level grouping of cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: Group,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub stop_time: Option<i64>,
    #[serde(default)]
    pub cases: IndexMap<String, CaseRecord>,
    /// Run view only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Map<String, Value>>,
}

/// A single test function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: Group,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub stop_time: Option<i64>,
    #[serde(default)]
    pub assertion_msg: Option<String>,
    #[serde(default)]
    pub msg: Option<Map<String, Value>>,
    #[serde(default)]
    pub attempt: u32,
    /// State view only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_box: Option<Value>,
    /// Run view only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "_id": "current",
            "_rev": "3-abc",
            "name": "stand run",
            "status": "failed",
            "progress": 100,
            "modules": {
                "test_1": {
                    "status": "failed",
                    "name": "Module 1",
                    "group": "main",
                    "cases": {
                        "test_a": {"status": "failed", "name": "A", "attempt": 1, "assertion_msg": "boom"},
                        "test_b": {"status": "passed", "name": "B", "attempt": 2}
                    }
                },
                "test_2": {
                    "status": "skipped",
                    "name": "test_2",
                    "group": "setup",
                    "cases": {
                        "test_a": {"status": "skipped", "name": "test_a"}
                    }
                }
            }
        })
    }

    #[test]
    fn test_deserialize_keeps_collection_order() {
        let doc: RunDocument = serde_json::from_value(sample()).unwrap();
        let order: Vec<String> = doc
            .cases()
            .map(|(m, c, _)| format!("{}::{}", m, c))
            .collect();
        assert_eq!(order, vec!["test_1::test_a", "test_1::test_b", "test_2::test_a"]);
        assert_eq!(doc.modules["test_2"].group, Group::Setup);
    }

    #[test]
    fn test_case_lookup_and_counts() {
        let doc: RunDocument = serde_json::from_value(sample()).unwrap();
        assert_eq!(doc.case("test_1", "test_b").unwrap().attempt, 2);
        assert!(doc.case("test_1", "missing").is_none());
        assert_eq!(doc.count_cases(TestStatus::Failed), 1);
        assert_eq!(doc.count_cases(TestStatus::Skipped), 1);
        assert_eq!(doc.rev.as_deref(), Some("3-abc"));
    }

    #[test]
    fn test_missing_fields_default() {
        let doc: RunDocument = serde_json::from_value(json!({"_id": "x"})).unwrap();
        assert_eq!(doc.status, TestStatus::Ready);
        assert_eq!(doc.progress, 0);
        assert!(doc.modules.is_empty());
    }
}
