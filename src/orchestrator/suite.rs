//! Typed registration of test modules and cases.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::CaseContext;
use crate::errors::CaseFailure;
use crate::model::Group;
use crate::node::CaseDescriptor;

pub type CaseResult = Result<(), CaseFailure>;

/// Executable body of a test case; called once per attempt.
pub type CaseBody = Arc<dyn Fn(CaseContext) -> BoxFuture<'static, CaseResult> + Send + Sync>;

/// Fail the running case with an assertion message unless `cond` holds.
#[macro_export]
macro_rules! case_assert {
    ($cond:expr $(,)?) => {
        if !$cond {
            return Err($crate::errors::CaseFailure::Assertion(format!(
                "assertion failed: {}",
                stringify!($cond)
            )));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::errors::CaseFailure::Assertion(format!($($arg)+)));
        }
    };
}

pub struct TestCase {
    pub(crate) case_id: String,
    name: Option<String>,
    group: Option<Group>,
    dependency: Option<String>,
    attempt: Option<i64>,
    critical: bool,
    pub(crate) body: CaseBody,
}

impl TestCase {
    pub fn new<F, Fut>(case_id: impl Into<String>, body: F) -> Self
    where
        F: Fn(CaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CaseResult> + Send + 'static,
    {
        Self {
            case_id: case_id.into(),
            name: None,
            group: None,
            dependency: None,
            attempt: None,
            critical: false,
            body: Arc::new(move |ctx| Box::pin(body(ctx))),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.group = Some(group);
        self
    }

    /// Depend on `"module"` or `"module::case"`.
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependency = Some(dependency.into());
        self
    }

    /// Allow up to `attempt` executions before the case counts as failed.
    pub fn with_attempt(mut self, attempt: i64) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Stop the run if this case fails.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// A file-level group of cases.
pub struct TestModule {
    path: String,
    name: Option<String>,
    group: Option<Group>,
    pub(crate) cases: Vec<TestCase>,
}

impl TestModule {
    /// `path` is the module's source path; its file stem is the module id.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
            group: None,
            cases: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    pub(crate) fn descriptor(&self, case: &TestCase) -> CaseDescriptor {
        CaseDescriptor {
            module_path: self.path.clone(),
            case_id: case.case_id.clone(),
            module_name: self.name.clone(),
            case_name: case.name.clone(),
            module_group: self.group,
            case_group: case.group,
            dependency: case.dependency.clone(),
            attempt: case.attempt,
            critical: case.critical,
        }
    }
}
