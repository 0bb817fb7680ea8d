//! Field names of the run document.
//!
//! The document is addressed with dot-joined keys built from these names,
//! e.g. `modules.test_1.cases.test_a.status`.

pub const ID: &str = "_id";
pub const REV: &str = "_rev";

pub const NAME: &str = "name";
pub const STATUS: &str = "status";
pub const START_TIME: &str = "start_time";
pub const STOP_TIME: &str = "stop_time";
pub const PROGRESS: &str = "progress";
pub const GROUP: &str = "group";
pub const ARTIFACT: &str = "artifact";

pub const DUT: &str = "dut";
pub const TEST_STAND: &str = "test_stand";
pub const PROCESS: &str = "process";
pub const SERIAL_NUMBER: &str = "serial_number";
pub const PART_NUMBER: &str = "part_number";
pub const LOCATION: &str = "location";
pub const INFO: &str = "info";

pub const MODULES: &str = "modules";
pub const CASES: &str = "cases";

pub const ASSERTION_MSG: &str = "assertion_msg";
pub const MSG: &str = "msg";
pub const ATTEMPT: &str = "attempt";
pub const DIALOG_BOX: &str = "dialog_box";

pub const OPERATOR_MSG: &str = "operator_msg";
pub const ALERT: &str = "alert";
pub const ERROR_CODE: &str = "error_code";
pub const CAUSED_DUT_FAILURE_ID: &str = "caused_dut_failure_id";
