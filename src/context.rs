//! Handle given to every running test case body.
//!
//! All writes go through the shared reporter and are persisted right away,
//! so the operator panel sees them while the case is still running.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::dialog::{self, ChannelFactory, DialogBox, DialogValue, OperatorMessage};
use crate::errors::{DialogError, ReporterError};
use crate::model::{RunDocument, fields};
use crate::reporter::{Reporter, ReporterHandle, View, ViewMask};

#[derive(Clone)]
pub struct CaseContext {
    reporter: ReporterHandle,
    module_id: String,
    case_id: String,
    attempt: u32,
    channels: Arc<dyn ChannelFactory>,
    cancel: CancellationToken,
}

impl CaseContext {
    pub fn new(
        reporter: ReporterHandle,
        module_id: impl Into<String>,
        case_id: impl Into<String>,
        attempt: u32,
        channels: Arc<dyn ChannelFactory>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reporter,
            module_id: module_id.into(),
            case_id: case_id.into(),
            attempt,
            channels,
            cancel,
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    /// 1-based index of the running attempt.
    pub fn current_attempt(&self) -> u32 {
        self.attempt
    }

    /// Token cancelled when the session is interrupted.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Add a message to the case. Without a key the next numeric key is used.
    pub fn set_message(&self, msg: &str, key: Option<&str>) -> Result<(), ReporterError> {
        self.persist(|r| r.add_case_message(&self.module_id, &self.case_id, msg, key))
    }

    /// Store a case artifact in the durable run view.
    pub fn set_case_artifact(&self, key: &str, value: Value) -> Result<(), ReporterError> {
        let prefix = Reporter::generate_key(&[
            fields::MODULES,
            self.module_id.as_str(),
            fields::CASES,
            self.case_id.as_str(),
        ]);
        self.persist(|r| r.set_artifact(&prefix, key, value))
    }

    /// Store an artifact on the running case's module.
    pub fn set_module_artifact(&self, key: &str, value: Value) -> Result<(), ReporterError> {
        let prefix = Reporter::generate_key(&[fields::MODULES, self.module_id.as_str()]);
        self.persist(|r| r.set_artifact(&prefix, key, value))
    }

    /// Store a run-level artifact.
    pub fn set_run_artifact(&self, key: &str, value: Value) -> Result<(), ReporterError> {
        self.persist(|r| r.set_artifact("", key, value))
    }

    pub fn set_alert(&self, alert: &str) -> Result<(), ReporterError> {
        self.persist(|r| r.set_doc_value(fields::ALERT, json!(alert), ViewMask::BOTH))
    }

    /// Record the run error code. Returns `false` if one was already set.
    pub fn set_error_code(&self, code: i64) -> Result<bool, ReporterError> {
        self.reporter.with(|r| {
            let written = r.set_error_code_once(code)?;
            r.update_db_by_doc()?;
            Ok(written)
        })
    }

    pub fn set_dut_serial_number(&self, serial_number: &str) -> Result<(), ReporterError> {
        self.set_section_field(fields::DUT, fields::SERIAL_NUMBER, json!(serial_number))
    }

    pub fn set_dut_part_number(&self, part_number: &str) -> Result<(), ReporterError> {
        self.set_section_field(fields::DUT, fields::PART_NUMBER, json!(part_number))
    }

    /// Merge free-form key/value pairs into the DUT info.
    pub fn set_dut_info(&self, info: Map<String, Value>) -> Result<(), ReporterError> {
        self.persist(|r| r.merge_info(fields::DUT, info))
    }

    pub fn set_stand_name(&self, name: &str) -> Result<(), ReporterError> {
        self.set_section_field(fields::TEST_STAND, fields::NAME, json!(name))
    }

    pub fn set_stand_location(&self, location: &str) -> Result<(), ReporterError> {
        self.set_section_field(fields::TEST_STAND, fields::LOCATION, json!(location))
    }

    pub fn set_stand_info(&self, info: Map<String, Value>) -> Result<(), ReporterError> {
        self.persist(|r| r.merge_info(fields::TEST_STAND, info))
    }

    pub fn set_process_name(&self, name: &str) -> Result<(), ReporterError> {
        self.set_section_field(fields::PROCESS, fields::NAME, json!(name))
    }

    pub fn set_process_info(&self, info: Map<String, Value>) -> Result<(), ReporterError> {
        self.persist(|r| r.merge_info(fields::PROCESS, info))
    }

    /// Block until the operator answers `dialog`.
    pub async fn run_dialog_box(&self, dialog: &DialogBox) -> Result<DialogValue, DialogError> {
        let mut channel = self.channels.open();
        dialog::run_dialog_box(
            &self.reporter,
            self.module_id.as_str(),
            self.case_id.as_str(),
            dialog,
            channel.as_mut(),
            &self.cancel,
        )
        .await
    }

    /// Show an operator message; blocks only for blocking messages.
    pub async fn set_operator_message(&self, message: &OperatorMessage) -> Result<bool, DialogError> {
        let mut channel = self.channels.open();
        dialog::set_operator_message(&self.reporter, message, channel.as_mut(), &self.cancel).await
    }

    pub fn clear_operator_message(&self) -> Result<(), DialogError> {
        dialog::clear_operator_message(&self.reporter)
    }

    /// Snapshot of the durable run view.
    pub fn current_report(&self) -> Result<RunDocument, ReporterError> {
        self.reporter.lock()?.document(View::Run)
    }

    fn set_section_field(&self, section: &str, field: &str, value: Value) -> Result<(), ReporterError> {
        let key = Reporter::generate_key(&[section, field]);
        self.persist(|r| r.set_doc_value(&key, value, ViewMask::BOTH))
    }

    fn persist<F>(&self, f: F) -> Result<(), ReporterError>
    where
        F: FnOnce(&mut Reporter) -> Result<(), ReporterError>,
    {
        self.reporter.with(|r| {
            f(r)?;
            r.update_db_by_doc()
        })
    }
}
