//! Async driver that runs registered cases through the orchestrator.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::machine::Orchestrator;
use super::state::{CaseOutcome, RunSummary, SessionOutcome, StartDecision};
use super::suite::{CaseBody, TestModule};
use crate::context::CaseContext;
use crate::dialog::ChannelFactory;
use crate::errors::{CaseFailure, OrchestratorError};
use crate::node::NodeInfo;
use crate::signals;

/// One test session: collection, sequential execution and finalization.
///
/// Cases run one at a time in collection order. Cancelling the session
/// token (directly or through a termination signal) stops the running case
/// at its next suspension point and ends the run STOPPED.
pub struct TestSession {
    orchestrator: Orchestrator,
    modules: Vec<TestModule>,
    channels: Arc<dyn ChannelFactory>,
    cancel: CancellationToken,
    handle_signals: bool,
}

impl TestSession {
    pub fn new(orchestrator: Orchestrator, channels: Arc<dyn ChannelFactory>) -> Self {
        Self {
            orchestrator,
            modules: Vec::new(),
            channels,
            cancel: CancellationToken::new(),
            handle_signals: false,
        }
    }

    pub fn with_module(mut self, module: TestModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Translate process termination signals into an orderly stop.
    pub fn handle_signals(mut self) -> Self {
        self.handle_signals = true;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator {
        &mut self.orchestrator
    }

    /// Run every registered case and finalize the run.
    ///
    /// Collection and internal errors are returned after the run has been
    /// finalized as ERROR, so post-run callbacks still fire.
    pub async fn run(mut self) -> Result<RunSummary, OrchestratorError> {
        let listener = self
            .handle_signals
            .then(|| signals::spawn_termination_listener(self.cancel.clone()));

        let result = self.run_inner().await;
        if let Some(listener) = listener {
            listener.abort();
        }
        result
    }

    async fn run_inner(&mut self) -> Result<RunSummary, OrchestratorError> {
        let mut bodies: HashMap<String, CaseBody> = HashMap::new();
        let mut descriptors = Vec::new();
        for module in &self.modules {
            for case in &module.cases {
                let descriptor = module.descriptor(case);
                bodies.insert(descriptor.node_id(), Arc::clone(&case.body));
                descriptors.push(descriptor);
            }
        }

        let nodes = match self.orchestrator.on_collect(&descriptors) {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(error = %e, "collection failed");
                self.finalize_after_error(SessionOutcome::CollectionFailed);
                return Err(e);
            }
        };

        let outcome = match self.execute(&nodes, &bodies).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "session aborted");
                self.finalize_after_error(SessionOutcome::InternalError);
                return Err(e);
            }
        };
        self.orchestrator.on_session_end(outcome)
    }

    fn finalize_after_error(&mut self, outcome: SessionOutcome) {
        if let Err(e) = self.orchestrator.on_session_end(outcome) {
            error!(error = %e, "failed to finalize run");
        }
    }

    async fn execute(
        &mut self,
        nodes: &[NodeInfo],
        bodies: &HashMap<String, CaseBody>,
    ) -> Result<SessionOutcome, OrchestratorError> {
        for node in nodes {
            if self.cancel.is_cancelled() {
                info!("session interrupted");
                return Ok(SessionOutcome::Interrupted);
            }
            let attempts = match self
                .orchestrator
                .on_case_start(&node.module_id, &node.case_id)?
            {
                StartDecision::Run { attempts } => attempts,
                StartDecision::Skip(_) => continue,
            };
            let body = bodies
                .get(&node.node_id)
                .ok_or_else(|| OrchestratorError::UnknownCase(node.node_id.clone()))?;

            match self.run_attempts(node, body, attempts).await? {
                Some(outcome) => {
                    self.orchestrator
                        .on_case_result(&node.module_id, &node.case_id, &outcome)?
                }
                None => {
                    info!(case = %node.node_id, "session interrupted while case was running");
                    return Ok(SessionOutcome::Interrupted);
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(SessionOutcome::Interrupted);
        }
        Ok(SessionOutcome::Completed)
    }

    /// Execute a case body up to `attempts` times, stopping at the first
    /// non-retryable outcome. Returns `None` when interrupted.
    async fn run_attempts(
        &mut self,
        node: &NodeInfo,
        body: &CaseBody,
        attempts: u32,
    ) -> Result<Option<CaseOutcome>, OrchestratorError> {
        let mut outcome = CaseOutcome::Passed;
        for attempt in 1..=attempts {
            self.orchestrator
                .on_case_attempt(&node.module_id, &node.case_id, attempt)?;
            let ctx = CaseContext::new(
                self.orchestrator.reporter().clone(),
                node.module_id.clone(),
                node.case_id.clone(),
                attempt,
                Arc::clone(&self.channels),
                self.cancel.clone(),
            );

            let execution = AssertUnwindSafe(body(ctx)).catch_unwind();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                result = execution => result,
            };
            outcome = match result {
                Ok(Ok(())) => CaseOutcome::Passed,
                Ok(Err(failure)) => outcome_from_failure(failure),
                Err(panic) => CaseOutcome::Error(panic_message(panic.as_ref())),
            };
            if !outcome.is_retryable() {
                break;
            }
            debug!(case = %node.node_id, attempt, of = attempts, "attempt did not pass");
        }
        Ok(Some(outcome))
    }
}

fn outcome_from_failure(failure: CaseFailure) -> CaseOutcome {
    match failure {
        CaseFailure::Assertion(msg) => CaseOutcome::Failed(msg),
        CaseFailure::Error(msg) => CaseOutcome::Error(msg),
        CaseFailure::Skip(reason) => CaseOutcome::Skipped(reason),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("case panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("case panicked: {}", msg)
    } else {
        "case panicked".to_string()
    }
}
