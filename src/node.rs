//! Per-test identity and metadata.
//!
//! A `CaseDescriptor` is the explicit, typed description of one test case as
//! registered by the user. `NodeInfo` derives the normalized identity used by
//! the orchestrator and the run document from it.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::NodeInfoError;
use crate::model::Group;

static MODULE_DEPENDENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+$").expect("valid module dependency regex"));
static CASE_DEPENDENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)::(\w+)$").expect("valid case dependency regex"));

/// Registration-time description of a test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseDescriptor {
    /// Source path of the owning module; its file stem becomes the module id
    pub module_path: String,
    /// Function name of the case
    pub case_id: String,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub case_name: Option<String>,
    #[serde(default)]
    pub module_group: Option<Group>,
    #[serde(default)]
    pub case_group: Option<Group>,
    /// `"module"` or `"module::case"`
    #[serde(default)]
    pub dependency: Option<String>,
    #[serde(default)]
    pub attempt: Option<i64>,
    #[serde(default)]
    pub critical: bool,
}

impl CaseDescriptor {
    pub fn new(module_path: impl Into<String>, case_id: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            case_id: case_id.into(),
            ..Default::default()
        }
    }

    pub fn with_case_name(mut self, name: impl Into<String>) -> Self {
        self.case_name = Some(name.into());
        self
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = Some(name.into());
        self
    }

    pub fn with_case_group(mut self, group: Group) -> Self {
        self.case_group = Some(group);
        self
    }

    pub fn with_module_group(mut self, group: Group) -> Self {
        self.module_group = Some(group);
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependency = Some(dependency.into());
        self
    }

    pub fn with_attempt(mut self, attempt: i64) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Fully qualified node id, e.g. `tests/test_1.rs::test_a`.
    pub fn node_id(&self) -> String {
        format!("{}::{}", self.module_path, self.case_id)
    }
}

/// Pointer from a case to the module or case whose outcome gates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyRef {
    pub module_id: String,
    /// `None` means the dependency is on the whole module
    pub case_id: Option<String>,
}

impl DependencyRef {
    /// Parse a dependency string. Empty input means "no dependency".
    pub fn parse(node: &str, value: &str) -> Result<Option<Self>, NodeInfoError> {
        if value.is_empty() {
            return Ok(None);
        }
        if MODULE_DEPENDENCY.is_match(value) {
            return Ok(Some(Self {
                module_id: value.to_string(),
                case_id: None,
            }));
        }
        if let Some(caps) = CASE_DEPENDENCY.captures(value) {
            return Ok(Some(Self {
                module_id: caps[1].to_string(),
                case_id: Some(caps[2].to_string()),
            }));
        }
        Err(NodeInfoError::InvalidDependency {
            node: node.to_string(),
            value: value.to_string(),
        })
    }
}

impl std::fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.case_id {
            Some(case_id) => write!(f, "{}::{}", self.module_id, case_id),
            None => write!(f, "{}", self.module_id),
        }
    }
}

/// Normalized identity and metadata of a collected case.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub node_id: String,
    pub module_id: String,
    pub case_id: String,
    pub module_name: String,
    pub case_name: String,
    pub module_group: Group,
    pub case_group: Group,
    pub dependency: Option<DependencyRef>,
    pub attempt: u32,
    pub critical: bool,
}

impl NodeInfo {
    /// Derive node info from a descriptor. Pure; fails on malformed
    /// dependency strings or non-positive attempt counts.
    pub fn from_descriptor(descriptor: &CaseDescriptor) -> Result<Self, NodeInfoError> {
        let node_id = descriptor.node_id();
        let module_id = Path::new(&descriptor.module_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NodeInfoError::InvalidModulePath(descriptor.module_path.clone()))?
            .to_string();
        let case_id = descriptor.case_id.clone();

        let dependency = match descriptor.dependency.as_deref() {
            Some(value) => DependencyRef::parse(&node_id, value)?,
            None => None,
        };

        let attempt = match descriptor.attempt {
            None => 1,
            Some(value) if (1..=u32::MAX as i64).contains(&value) => value as u32,
            Some(value) => {
                return Err(NodeInfoError::InvalidAttempt {
                    node: node_id,
                    value,
                });
            }
        };

        Ok(Self {
            module_name: descriptor
                .module_name
                .clone()
                .unwrap_or_else(|| module_id.clone()),
            case_name: descriptor
                .case_name
                .clone()
                .unwrap_or_else(|| case_id.clone()),
            module_group: descriptor.module_group.unwrap_or_default(),
            case_group: descriptor.case_group.unwrap_or_default(),
            node_id,
            module_id,
            case_id,
            dependency,
            attempt,
            critical: descriptor.critical,
        })
    }

    /// Key of this case in the dependency and status tables.
    pub fn key(&self) -> (String, String) {
        (self.module_id.clone(), self.case_id.clone())
    }
}
