//! Run-document helpers used by the orchestrator and case contexts.
//!
//! These translate domain operations ("mark case failed", "record attempt")
//! into buffered reporter writes with the right view masks.

use chrono::Utc;
use serde_json::{Map, Value, json};

use super::base::{Reporter, View, ViewMask};
use crate::errors::ReporterError;
use crate::model::{TestStatus, fields};
use crate::node::NodeInfo;

/// Current time as Unix seconds.
pub fn timestamp() -> i64 {
    Utc::now().timestamp()
}

pub(crate) fn module_key(module_id: &str, field: &str) -> String {
    Reporter::generate_key(&[fields::MODULES, module_id, field])
}

pub(crate) fn case_key(module_id: &str, case_id: &str, field: &str) -> String {
    Reporter::generate_key(&[fields::MODULES, module_id, fields::CASES, case_id, field])
}

impl Reporter {
    /// Initialize the run document for a freshly collected session.
    ///
    /// With `clear` the whole document is reset; otherwise run-level
    /// metadata such as DUT and stand info survives from the stored document.
    pub fn init_run(
        &mut self,
        name: &str,
        nodes: &[NodeInfo],
        clear: bool,
    ) -> Result<(), ReporterError> {
        if clear {
            self.clear();
        }
        let both = ViewMask::BOTH;
        self.set_doc_value(fields::NAME, json!(name), both)?;
        self.set_doc_value(fields::STATUS, json!(TestStatus::Ready), both)?;
        self.set_doc_value(fields::PROGRESS, json!(0), both)?;
        self.set_doc_value(fields::START_TIME, Value::Null, both)?;
        self.set_doc_value(fields::STOP_TIME, Value::Null, both)?;
        self.set_doc_value(fields::ALERT, json!(""), both)?;
        self.set_doc_value(fields::ERROR_CODE, Value::Null, both)?;
        self.set_doc_value(fields::CAUSED_DUT_FAILURE_ID, Value::Null, both)?;
        self.set_doc_value(fields::OPERATOR_MSG, Value::Null, ViewMask::STATE_ONLY)?;
        self.set_doc_value(fields::ARTIFACT, json!({}), ViewMask::RUN_ONLY)?;
        for section in [fields::DUT, fields::TEST_STAND, fields::PROCESS] {
            if self.get_field(section).is_none() {
                self.set_doc_value(section, json!({}), both)?;
            }
        }

        self.set_doc_value(fields::MODULES, json!({}), both)?;
        for node in nodes {
            if self
                .get_field(&module_key(&node.module_id, fields::STATUS))
                .is_none()
            {
                self.init_module(node)?;
            }
            self.init_case(node)?;
        }
        Ok(())
    }

    fn init_module(&mut self, node: &NodeInfo) -> Result<(), ReporterError> {
        let module = &node.module_id;
        let both = ViewMask::BOTH;
        self.set_doc_value(&module_key(module, fields::STATUS), json!(TestStatus::Ready), both)?;
        self.set_doc_value(&module_key(module, fields::NAME), json!(node.module_name), both)?;
        self.set_doc_value(&module_key(module, fields::GROUP), json!(node.module_group), both)?;
        self.set_doc_value(&module_key(module, fields::START_TIME), Value::Null, both)?;
        self.set_doc_value(&module_key(module, fields::STOP_TIME), Value::Null, both)?;
        self.set_doc_value(&module_key(module, fields::CASES), json!({}), both)?;
        self.set_doc_value(
            &module_key(module, fields::ARTIFACT),
            json!({}),
            ViewMask::RUN_ONLY,
        )
    }

    fn init_case(&mut self, node: &NodeInfo) -> Result<(), ReporterError> {
        let (module, case) = (&node.module_id, &node.case_id);
        let both = ViewMask::BOTH;
        let key = |field| case_key(module, case, field);
        self.set_doc_value(&key(fields::STATUS), json!(TestStatus::Ready), both)?;
        self.set_doc_value(&key(fields::NAME), json!(node.case_name), both)?;
        self.set_doc_value(&key(fields::GROUP), json!(node.case_group), both)?;
        self.set_doc_value(&key(fields::START_TIME), Value::Null, both)?;
        self.set_doc_value(&key(fields::STOP_TIME), Value::Null, both)?;
        self.set_doc_value(&key(fields::ASSERTION_MSG), Value::Null, both)?;
        self.set_doc_value(&key(fields::MSG), Value::Null, both)?;
        self.set_doc_value(&key(fields::ATTEMPT), json!(0), both)?;
        self.set_doc_value(&key(fields::DIALOG_BOX), Value::Null, ViewMask::STATE_ONLY)?;
        self.set_doc_value(&key(fields::ARTIFACT), json!({}), ViewMask::RUN_ONLY)
    }

    pub fn set_run_status(&mut self, status: TestStatus) -> Result<(), ReporterError> {
        self.set_doc_value(fields::STATUS, json!(status), ViewMask::BOTH)
    }

    pub fn set_run_start_time(&mut self, time: i64) -> Result<(), ReporterError> {
        self.set_doc_value(fields::START_TIME, json!(time), ViewMask::BOTH)
    }

    pub fn set_run_stop_time(&mut self, time: i64) -> Result<(), ReporterError> {
        self.set_doc_value(fields::STOP_TIME, json!(time), ViewMask::BOTH)
    }

    pub fn set_progress(&mut self, progress: u8) -> Result<(), ReporterError> {
        self.set_doc_value(fields::PROGRESS, json!(progress), ViewMask::BOTH)
    }

    pub fn run_status(&self) -> Option<TestStatus> {
        self.get_field(fields::STATUS)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set_module_status(
        &mut self,
        module_id: &str,
        status: TestStatus,
    ) -> Result<(), ReporterError> {
        self.set_doc_value(&module_key(module_id, fields::STATUS), json!(status), ViewMask::BOTH)
    }

    pub fn module_status(&self, module_id: &str) -> Option<TestStatus> {
        self.get_field(&module_key(module_id, fields::STATUS))
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Set a module's start time unless it already has one.
    pub fn set_module_start_time(&mut self, module_id: &str, time: i64) -> Result<(), ReporterError> {
        let key = module_key(module_id, fields::START_TIME);
        if self.get_field(&key).is_some_and(|v| !v.is_null()) {
            return Ok(());
        }
        self.set_doc_value(&key, json!(time), ViewMask::BOTH)
    }

    pub fn set_module_stop_time(&mut self, module_id: &str, time: i64) -> Result<(), ReporterError> {
        self.set_doc_value(&module_key(module_id, fields::STOP_TIME), json!(time), ViewMask::BOTH)
    }

    /// Case ids of a module in collection order.
    pub fn module_case_ids(&self, module_id: &str) -> Vec<String> {
        self.get_field(&module_key(module_id, fields::CASES))
            .and_then(|v| v.as_object().map(|o| o.keys().cloned().collect()))
            .unwrap_or_default()
    }

    /// Module ids in collection order.
    pub fn module_ids(&self) -> Vec<String> {
        self.get_field(fields::MODULES)
            .and_then(|v| v.as_object().map(|o| o.keys().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn set_case_status(
        &mut self,
        module_id: &str,
        case_id: &str,
        status: TestStatus,
    ) -> Result<(), ReporterError> {
        self.set_doc_value(
            &case_key(module_id, case_id, fields::STATUS),
            json!(status),
            ViewMask::BOTH,
        )
    }

    pub fn case_status(&self, module_id: &str, case_id: &str) -> Option<TestStatus> {
        self.get_field(&case_key(module_id, case_id, fields::STATUS))
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set_case_start_time(
        &mut self,
        module_id: &str,
        case_id: &str,
        time: i64,
    ) -> Result<(), ReporterError> {
        self.set_doc_value(
            &case_key(module_id, case_id, fields::START_TIME),
            json!(time),
            ViewMask::BOTH,
        )
    }

    /// Set a case's stop time; the first write wins.
    ///
    /// Returns `false` when a stop time was already recorded.
    pub fn set_case_stop_time_once(
        &mut self,
        module_id: &str,
        case_id: &str,
        time: i64,
    ) -> Result<bool, ReporterError> {
        let key = case_key(module_id, case_id, fields::STOP_TIME);
        if self.get_field(&key).is_some_and(|v| !v.is_null()) {
            return Ok(false);
        }
        self.set_doc_value(&key, json!(time), ViewMask::BOTH)?;
        Ok(true)
    }

    pub fn set_case_attempt(
        &mut self,
        module_id: &str,
        case_id: &str,
        attempt: u32,
    ) -> Result<(), ReporterError> {
        self.set_doc_value(
            &case_key(module_id, case_id, fields::ATTEMPT),
            json!(attempt),
            ViewMask::BOTH,
        )
    }

    pub fn case_attempt(&self, module_id: &str, case_id: &str) -> Option<u32> {
        self.get_field(&case_key(module_id, case_id, fields::ATTEMPT))
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
    }

    pub fn set_assertion_msg(
        &mut self,
        module_id: &str,
        case_id: &str,
        msg: Option<&str>,
    ) -> Result<(), ReporterError> {
        self.set_doc_value(
            &case_key(module_id, case_id, fields::ASSERTION_MSG),
            msg.map_or(Value::Null, |m| json!(m)),
            ViewMask::BOTH,
        )
    }

    /// Add a free-form message to a case. Without a key the next free
    /// numeric key is used.
    pub fn add_case_message(
        &mut self,
        module_id: &str,
        case_id: &str,
        msg: &str,
        msg_key: Option<&str>,
    ) -> Result<(), ReporterError> {
        let key = case_key(module_id, case_id, fields::MSG);
        let mut messages: Map<String, Value> = self
            .get_field(&key)
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        let msg_key = match msg_key {
            Some(k) => k.to_string(),
            None => {
                let mut n = messages.len();
                while messages.contains_key(&n.to_string()) {
                    n += 1;
                }
                n.to_string()
            }
        };
        messages.insert(msg_key, json!(msg));
        self.set_doc_value(&key, Value::Object(messages), ViewMask::BOTH)
    }

    /// Discard output of a previous attempt so only the latest attempt survives.
    pub fn reset_case_output(&mut self, module_id: &str, case_id: &str) -> Result<(), ReporterError> {
        let both = ViewMask::BOTH;
        self.set_doc_value(&case_key(module_id, case_id, fields::ASSERTION_MSG), Value::Null, both)?;
        self.set_doc_value(&case_key(module_id, case_id, fields::MSG), Value::Null, both)?;
        self.set_doc_value(
            &case_key(module_id, case_id, fields::ARTIFACT),
            json!({}),
            ViewMask::RUN_ONLY,
        )
    }

    /// Merge `value` into the `artifact` object at `prefix` in the run view.
    pub fn set_artifact(&mut self, prefix: &str, key: &str, value: Value) -> Result<(), ReporterError> {
        let artifact_key = if prefix.is_empty() {
            Reporter::generate_key(&[fields::ARTIFACT, key])
        } else {
            Reporter::generate_key(&[prefix, fields::ARTIFACT, key])
        };
        self.set_doc_value(&artifact_key, value, ViewMask::RUN_ONLY)
    }

    /// Record the first case that failed the DUT; later calls are ignored.
    pub fn set_caused_dut_failure_once(&mut self, node: &str) -> Result<(), ReporterError> {
        if self
            .get_field(fields::CAUSED_DUT_FAILURE_ID)
            .is_some_and(|v| !v.is_null())
        {
            return Ok(());
        }
        self.set_doc_value(fields::CAUSED_DUT_FAILURE_ID, json!(node), ViewMask::BOTH)
    }

    /// Record the run error code; the first write wins.
    pub fn set_error_code_once(&mut self, code: i64) -> Result<bool, ReporterError> {
        if self
            .get_field(fields::ERROR_CODE)
            .is_some_and(|v| !v.is_null())
        {
            return Ok(false);
        }
        self.set_doc_value(fields::ERROR_CODE, json!(code), ViewMask::BOTH)?;
        Ok(true)
    }

    /// Merge key/value pairs into `section.info` (dut, test_stand, process).
    pub fn merge_info(
        &mut self,
        section: &str,
        info: Map<String, Value>,
    ) -> Result<(), ReporterError> {
        for (k, v) in info {
            self.set_doc_value(
                &Reporter::generate_key(&[section, fields::INFO, k.as_str()]),
                v,
                ViewMask::BOTH,
            )?;
        }
        Ok(())
    }

    /// Open dialog box requests, as `(module_id, case_id)`.
    pub fn open_dialog_boxes(&self) -> Vec<(String, String)> {
        let mut open = Vec::new();
        for module_id in self.module_ids() {
            for case_id in self.module_case_ids(&module_id) {
                let slot = self.get_field_in(View::State, &case_key(&module_id, &case_id, fields::DIALOG_BOX));
                if slot.is_some_and(|v| !v.is_null()) {
                    open.push((module_id.clone(), case_id));
                }
            }
        }
        open
    }

    /// Withdraw every open dialog box request.
    pub fn clear_dialog_boxes(&mut self) -> Result<(), ReporterError> {
        for (module_id, case_id) in self.open_dialog_boxes() {
            self.set_doc_value(
                &case_key(&module_id, &case_id, fields::DIALOG_BOX),
                Value::Null,
                ViewMask::STATE_ONLY,
            )?;
        }
        Ok(())
    }
}
