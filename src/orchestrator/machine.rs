//! The run-level state machine.
//!
//! Any runner drives the orchestrator through its lifecycle methods in
//! order: [`Orchestrator::on_collect`] once, then for every case
//! [`Orchestrator::on_case_start`], one [`Orchestrator::on_case_attempt`] per
//! execution and [`Orchestrator::on_case_result`], and finally
//! [`Orchestrator::on_session_end`]. Every method persists the run document
//! before returning so the operator panel always sees the latest state.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use super::state::{
    CaseOutcome, ExecutionTimer, RunSummary, SessionOutcome, StartDecision, strip_ansi,
};
use crate::errors::{OrchestratorError, ReporterError};
use crate::model::{RunDocument, TestStatus};
use crate::node::{CaseDescriptor, DependencyRef, NodeInfo};
use crate::progress::ProgressCalculator;
use crate::reporter::{Reporter, ReporterHandle, View, timestamp};

/// Callback invoked once with the finalized run document.
pub type PostRunCallback = Box<dyn FnOnce(&RunDocument) + Send>;

/// Run-level settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Name stored in the run document
    pub run_name: String,
    /// Reset the stored document on collection instead of keeping run metadata
    pub clear_database: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            run_name: "hardpy".to_string(),
            clear_database: true,
        }
    }
}

pub struct Orchestrator {
    reporter: ReporterHandle,
    config: OrchestratorConfig,
    progress: ProgressCalculator,
    /// Collected cases in execution order, keyed by (module_id, case_id).
    /// Each entry carries the case's dependency reference and attempt count.
    nodes: IndexMap<(String, String), NodeInfo>,
    critical_failure: Option<String>,
    post_run: Vec<PostRunCallback>,
    timer: Option<ExecutionTimer>,
    finished: Option<RunSummary>,
}

impl Orchestrator {
    pub fn new(reporter: ReporterHandle) -> Self {
        Self {
            reporter,
            config: OrchestratorConfig::default(),
            progress: ProgressCalculator::new(),
            nodes: IndexMap::new(),
            critical_failure: None,
            post_run: Vec::new(),
            timer: None,
            finished: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reporter(&self) -> &ReporterHandle {
        &self.reporter
    }

    /// Collected cases in execution order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    /// Node id of the critical case that stopped the run, if any.
    pub fn critical_failure(&self) -> Option<&str> {
        self.critical_failure.as_deref()
    }

    /// Register a callback to run after the session is finalized.
    ///
    /// Callbacks run exactly once, in registration order.
    pub fn register_post_run<F>(&mut self, callback: F)
    where
        F: FnOnce(&RunDocument) + Send + 'static,
    {
        self.post_run.push(Box::new(callback));
    }

    /// Build the ordered case list and initialize the run document.
    ///
    /// Cases are ordered by a stable natural sort of their module path. Any
    /// malformed annotation or unresolved dependency aborts collection.
    pub fn on_collect(
        &mut self,
        descriptors: &[CaseDescriptor],
    ) -> Result<Vec<NodeInfo>, OrchestratorError> {
        let mut ordered: Vec<&CaseDescriptor> = descriptors.iter().collect();
        ordered.sort_by(|a, b| natural_cmp(&a.module_path, &b.module_path));

        let mut nodes = IndexMap::with_capacity(ordered.len());
        for descriptor in ordered {
            let node = NodeInfo::from_descriptor(descriptor)?;
            if nodes.contains_key(&node.key()) {
                return Err(OrchestratorError::DuplicateCase(node.node_id));
            }
            nodes.insert(node.key(), node);
        }
        if nodes.is_empty() {
            return Err(OrchestratorError::NothingCollected);
        }
        validate_dependencies(&nodes)?;

        self.progress.set_test_amount(nodes.len() as i64)?;
        let collected: Vec<NodeInfo> = nodes.values().cloned().collect();
        {
            let mut r = self.reporter.lock()?;
            r.init_run(
                &self.config.run_name,
                &collected,
                self.config.clear_database,
            )?;
            r.set_run_status(TestStatus::Run)?;
            r.set_run_start_time(timestamp())?;
            r.update_db_by_doc()?;
        }

        self.nodes = nodes;
        self.critical_failure = None;
        self.finished = None;
        self.timer = Some(ExecutionTimer::start());
        info!(
            cases = collected.len(),
            modules = collected
                .iter()
                .map(|n| n.module_id.as_str())
                .collect::<HashSet<_>>()
                .len(),
            "collected test cases"
        );
        Ok(collected)
    }

    /// Decide whether a case runs, marking it SKIPPED when it must not.
    ///
    /// A case is skipped after a critical failure, or when its dependency
    /// (a case, or any case of a module) is FAILED, SKIPPED or ERROR.
    /// A start for a case that already finished changes nothing and returns
    /// `Skip`; a repeated start for a running case returns `Run` again.
    pub fn on_case_start(
        &mut self,
        module_id: &str,
        case_id: &str,
    ) -> Result<StartDecision, OrchestratorError> {
        let node = self.node(module_id, case_id)?.clone();
        let mut r = self.reporter.lock()?;
        r.update_doc_by_db()?;
        let now = timestamp();

        match r.case_status(module_id, case_id) {
            Some(status) if status.is_terminal() => {
                debug!(case = %node.node_id, %status, "ignoring start for finished case");
                return Ok(StartDecision::Skip(format!("case already {}", status)));
            }
            Some(TestStatus::Run) => {
                debug!(case = %node.node_id, "ignoring repeated start for running case");
                return Ok(StartDecision::Run {
                    attempts: node.attempt,
                });
            }
            _ => {}
        }

        let skip_reason = match &self.critical_failure {
            Some(critical) => Some(format!("critical case {} failed", critical)),
            None => node
                .dependency
                .as_ref()
                .and_then(|dep| blocking_dependency(&r, dep)),
        };

        if let Some(reason) = skip_reason {
            info!(case = %node.node_id, %reason, "skipping case");
            r.set_case_status(module_id, case_id, TestStatus::Skipped)?;
            r.set_assertion_msg(module_id, case_id, Some(&reason))?;
            r.set_case_stop_time_once(module_id, case_id, now)?;
            let progress = self.progress.calculate(&node.node_id);
            r.set_progress(progress)?;
            aggregate_module(&mut r, module_id, now)?;
            r.update_db_by_doc()?;
            return Ok(StartDecision::Skip(reason));
        }

        r.set_case_status(module_id, case_id, TestStatus::Run)?;
        r.set_case_start_time(module_id, case_id, now)?;
        if r.module_status(module_id) == Some(TestStatus::Ready) {
            r.set_module_status(module_id, TestStatus::Run)?;
        }
        r.set_module_start_time(module_id, now)?;
        r.update_db_by_doc()?;
        debug!(case = %node.node_id, attempts = node.attempt, "case started");
        Ok(StartDecision::Run {
            attempts: node.attempt,
        })
    }

    /// Record the 1-based attempt about to execute.
    ///
    /// From the second attempt on, the previous attempt's messages and
    /// artifacts are discarded.
    pub fn on_case_attempt(
        &mut self,
        module_id: &str,
        case_id: &str,
        attempt: u32,
    ) -> Result<(), OrchestratorError> {
        let node = self.node(module_id, case_id)?;
        let mut r = self.reporter.lock()?;
        if attempt > 1 {
            info!(case = %node.node_id, attempt, of = node.attempt, "retrying case");
            r.reset_case_output(module_id, case_id)?;
        }
        r.set_case_attempt(module_id, case_id, attempt)?;
        r.update_db_by_doc()?;
        Ok(())
    }

    /// Record the final outcome of a case.
    ///
    /// The stop time is written once; a repeated result for a finished case
    /// changes nothing. A result for a case that was never started is
    /// rejected with [`OrchestratorError::InvalidTransition`].
    pub fn on_case_result(
        &mut self,
        module_id: &str,
        case_id: &str,
        outcome: &CaseOutcome,
    ) -> Result<(), OrchestratorError> {
        let node = self.node(module_id, case_id)?.clone();
        let mut r = self.reporter.lock()?;
        let now = timestamp();

        match r.case_status(module_id, case_id) {
            Some(status) if status.is_terminal() => {
                debug!(case = %node.node_id, "ignoring repeated result for finished case");
                return Ok(());
            }
            Some(TestStatus::Ready) => {
                return Err(OrchestratorError::InvalidTransition {
                    case: node.node_id,
                    from: TestStatus::Ready,
                    event: "a result",
                });
            }
            _ => {}
        }

        let status = outcome.status();
        let assertion_msg = outcome.message().map(strip_ansi);
        r.set_case_status(module_id, case_id, status)?;
        r.set_assertion_msg(module_id, case_id, assertion_msg.as_deref())?;
        r.set_case_stop_time_once(module_id, case_id, now)?;
        let progress = self.progress.calculate(&node.node_id);
        r.set_progress(progress)?;

        if matches!(status, TestStatus::Failed | TestStatus::Error) {
            r.set_caused_dut_failure_once(&format!("{}::{}", module_id, case_id))?;
            if node.critical && self.critical_failure.is_none() {
                warn!(case = %node.node_id, "critical case failed, remaining cases will be skipped");
                self.critical_failure = Some(node.node_id.clone());
            }
        }

        aggregate_module(&mut r, module_id, now)?;
        r.update_db_by_doc()?;

        match status {
            TestStatus::Passed | TestStatus::Skipped => {
                info!(case = %node.node_id, %status, progress, "case finished")
            }
            _ => warn!(
                case = %node.node_id,
                %status,
                progress,
                message = assertion_msg.as_deref().unwrap_or(""),
                "case finished"
            ),
        }
        Ok(())
    }

    /// Finalize the run and invoke post-run callbacks.
    ///
    /// On interruption every case and module still READY or RUN becomes
    /// STOPPED; finished ones keep their status.
    pub fn on_session_end(
        &mut self,
        outcome: SessionOutcome,
    ) -> Result<RunSummary, OrchestratorError> {
        if let Some(summary) = &self.finished {
            warn!("session already finalized");
            return Ok(summary.clone());
        }
        let doc = {
            let mut r = self.reporter.lock()?;
            let now = timestamp();
            if outcome == SessionOutcome::Interrupted {
                stop_unfinished(&mut r, now)?;
            }
            r.clear_dialog_boxes()?;
            let status = match outcome {
                SessionOutcome::Completed => status_from_cases(&r),
                SessionOutcome::Interrupted => TestStatus::Stopped,
                SessionOutcome::CollectionFailed | SessionOutcome::InternalError => {
                    TestStatus::Error
                }
            };
            r.set_run_status(status)?;
            r.set_run_stop_time(now)?;
            r.update_db_by_doc()?;
            r.document(View::Run)?
        };

        let duration = self
            .timer
            .as_ref()
            .map(ExecutionTimer::elapsed)
            .unwrap_or_default();
        let summary = RunSummary::from_document(&doc, duration);
        info!(
            status = %summary.status,
            passed = summary.passed,
            failed = summary.failed,
            errors = summary.errors,
            skipped = summary.skipped,
            stopped = summary.stopped,
            "session finished"
        );

        self.finished = Some(summary.clone());

        for (index, callback) in std::mem::take(&mut self.post_run).into_iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| callback(&doc))).is_err() {
                error!(callback = index, "post-run callback panicked");
            }
        }
        Ok(summary)
    }

    fn node(&self, module_id: &str, case_id: &str) -> Result<&NodeInfo, OrchestratorError> {
        self.nodes
            .get(&(module_id.to_string(), case_id.to_string()))
            .ok_or_else(|| OrchestratorError::UnknownCase(format!("{}::{}", module_id, case_id)))
    }
}

fn validate_dependencies(
    nodes: &IndexMap<(String, String), NodeInfo>,
) -> Result<(), OrchestratorError> {
    let modules: HashSet<&str> = nodes.keys().map(|(m, _)| m.as_str()).collect();
    for node in nodes.values() {
        let Some(dep) = &node.dependency else {
            continue;
        };
        if !modules.contains(dep.module_id.as_str()) {
            return Err(OrchestratorError::UnknownDependencyModule {
                case: node.node_id.clone(),
                module: dep.module_id.clone(),
            });
        }
        if let Some(target) = &dep.case_id
            && !nodes.contains_key(&(dep.module_id.clone(), target.clone()))
        {
            return Err(OrchestratorError::UnknownDependencyCase {
                case: node.node_id.clone(),
                module: dep.module_id.clone(),
                target: target.clone(),
            });
        }
    }
    Ok(())
}

/// Reason to skip when the dependency target currently blocks dependents.
fn blocking_dependency(r: &Reporter, dep: &DependencyRef) -> Option<String> {
    match &dep.case_id {
        Some(case_id) => r
            .case_status(&dep.module_id, case_id)
            .filter(TestStatus::blocks_dependents)
            .map(|status| format!("dependency {} is {}", dep, status)),
        None => r
            .module_case_ids(&dep.module_id)
            .iter()
            .filter_map(|case_id| r.case_status(&dep.module_id, case_id))
            .find(TestStatus::blocks_dependents)
            .map(|status| format!("dependency {} has a {} case", dep, status)),
    }
}

/// Set the module status once all of its cases are terminal.
fn aggregate_module(r: &mut Reporter, module_id: &str, now: i64) -> Result<(), ReporterError> {
    let statuses: Vec<TestStatus> = r
        .module_case_ids(module_id)
        .iter()
        .filter_map(|case_id| r.case_status(module_id, case_id))
        .collect();
    if let Some(status) = TestStatus::aggregate(&statuses) {
        r.set_module_status(module_id, status)?;
        r.set_module_stop_time(module_id, now)?;
        debug!(module = module_id, %status, "module finished");
    }
    Ok(())
}

fn stop_unfinished(r: &mut Reporter, now: i64) -> Result<(), ReporterError> {
    for module_id in r.module_ids() {
        for case_id in r.module_case_ids(&module_id) {
            if r
                .case_status(&module_id, &case_id)
                .is_some_and(|s| !s.is_terminal())
            {
                r.set_case_status(&module_id, &case_id, TestStatus::Stopped)?;
                r.set_case_stop_time_once(&module_id, &case_id, now)?;
            }
        }
        if r.module_status(&module_id).is_some_and(|s| !s.is_terminal()) {
            r.set_module_status(&module_id, TestStatus::Stopped)?;
            r.set_module_stop_time(&module_id, now)?;
        }
    }
    Ok(())
}

/// PASSED unless some case ended FAILED or ERROR.
fn status_from_cases(r: &Reporter) -> TestStatus {
    let failed = r.module_ids().iter().any(|module_id| {
        r.module_case_ids(module_id).iter().any(|case_id| {
            matches!(
                r.case_status(module_id, case_id),
                Some(TestStatus::Failed | TestStatus::Error)
            )
        })
    });
    if failed {
        TestStatus::Failed
    } else {
        TestStatus::Passed
    }
}

/// Compare strings with embedded numbers by numeric value, so that
/// `test_2` sorts before `test_10`.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        let (Some(x), Some(y)) = (a.chars().next(), b.chars().next()) else {
            return a.len().cmp(&b.len());
        };
        if x.is_ascii_digit() && y.is_ascii_digit() {
            let (da, ra) = a.split_at(a.find(|c: char| !c.is_ascii_digit()).unwrap_or(a.len()));
            let (db, rb) = b.split_at(b.find(|c: char| !c.is_ascii_digit()).unwrap_or(b.len()));
            let (ta, tb) = (da.trim_start_matches('0'), db.trim_start_matches('0'));
            let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
            if ord != Ordering::Equal {
                return ord;
            }
            a = ra;
            b = rb;
        } else {
            if x != y {
                return x.cmp(&y);
            }
            a = &a[x.len_utf8()..];
            b = &b[y.len_utf8()..];
        }
    }
}
