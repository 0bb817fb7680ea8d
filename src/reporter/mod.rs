//! Reporter: the single mediator between the run and the document stores.
//!
//! The reporter keeps two buffered views of the run document:
//! - the **state** view, polled live by the operator panel (no artifacts)
//! - the **run** view, the durable record used for reports (no dialogs)
//!
//! Orchestrator hooks and test bodies share one reporter through a
//! [`ReporterHandle`].

mod base;
mod run;

pub use base::{Reporter, View, ViewMask};
pub use run::timestamp;
pub(crate) use run::{case_key, module_key};

use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::ReporterError;

/// Shared handle to the process-wide reporter.
///
/// Only one case runs at a time, so the lock is never contended; it exists
/// to let the orchestrator and the running case body hold the same reporter.
#[derive(Clone)]
pub struct ReporterHandle {
    inner: Arc<Mutex<Reporter>>,
}

impl ReporterHandle {
    pub fn new(reporter: Reporter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(reporter)),
        }
    }

    /// Acquire the reporter.
    pub fn lock(&self) -> Result<MutexGuard<'_, Reporter>, ReporterError> {
        self.inner.lock().map_err(|_| ReporterError::LockPoisoned)
    }

    /// Run `f` against the reporter.
    pub fn with<F, R>(&self, f: F) -> Result<R, ReporterError>
    where
        F: FnOnce(&mut Reporter) -> Result<R, ReporterError>,
    {
        let mut guard = self.lock()?;
        f(&mut guard)
    }
}
