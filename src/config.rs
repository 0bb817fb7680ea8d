//! Project configuration loaded from `hardpy.toml`.
//!
//! Every section is optional; missing keys fall back to defaults. A few
//! values can be overridden from the environment so a stand can be
//! re-pointed without editing the file.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-stand"
//!
//! [database]
//! backend = "json"
//! storage_dir = ".hardpy/storage"
//! doc_id = "current"
//!
//! [rendezvous]
//! host = "127.0.0.1"
//! port = 6525
//! poll_interval_ms = 500
//!
//! [run]
//! clear_database = true
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! file = ""
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dialog::TcpChannelFactory;
use crate::orchestrator::OrchestratorConfig;
use crate::reporter::Reporter;
use crate::store::{DocumentStore, JsonFileStore, MemoryStore, RUN_STORE, STATE_STORE};

pub const CONFIG_FILE: &str = "hardpy.toml";

pub const ENV_RENDEZVOUS_HOST: &str = "HARDPY_RENDEZVOUS_HOST";
pub const ENV_RENDEZVOUS_PORT: &str = "HARDPY_RENDEZVOUS_PORT";
pub const ENV_STORAGE_DIR: &str = "HARDPY_STORAGE_DIR";

/// Contents written by `hardpy init`.
pub const DEFAULT_CONFIG: &str = r#"[project]
name = "hardpy-stand"

[database]
backend = "json"
storage_dir = ".hardpy/storage"
doc_id = "current"

[rendezvous]
host = "127.0.0.1"
port = 6525
poll_interval_ms = 500

[run]
clear_database = true

[logging]
level = "info"
format = "pretty"
file = ""
"#;

/// Where run documents are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per view under `storage_dir` (default)
    #[default]
    Json,
    /// Process-local only; nothing survives the run
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Json => write!(f, "json"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(StorageBackend::Json),
            "memory" => Ok(StorageBackend::Memory),
            _ => anyhow::bail!("Invalid storage backend '{}'. Valid values: json, memory", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Stand name stored as the run name (defaults to "hardpy")
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Relative paths resolve against the project directory
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Id of the run document in both views
    #[serde(default = "default_doc_id")]
    pub doc_id: String,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".hardpy/storage")
}

fn default_doc_id() -> String {
    "current".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            storage_dir: default_storage_dir(),
            doc_id: default_doc_id(),
        }
    }
}

/// Operator answer listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendezvousConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How often a waiting dialog re-checks for interruption
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6525
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RendezvousConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Start every run from an empty document
    #[serde(default = "default_clear_database")]
    pub clear_database: bool,
}

fn default_clear_database() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            clear_database: default_clear_database(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "hardpy=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Optional log file; empty disables file output
    #[serde(default)]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: String::new(),
        }
    }
}

impl LoggingConfig {
    pub fn log_file(&self) -> Option<&Path> {
        let file = self.file.trim();
        (!file.is_empty()).then(|| Path::new(file))
    }
}

/// The complete `hardpy.toml` structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardpyConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rendezvous: RendezvousConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HardpyConfig {
    /// Load a config file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string. No overrides are applied.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse hardpy.toml")
    }

    /// Load `<project_dir>/hardpy.toml`, or defaults (plus overrides) when
    /// the file does not exist.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides()?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize hardpy.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_RENDEZVOUS_HOST)
            && !host.trim().is_empty()
        {
            self.rendezvous.host = host.trim().to_string();
        }
        if let Some(port) = lookup(ENV_RENDEZVOUS_PORT) {
            self.rendezvous.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} value '{}'", ENV_RENDEZVOUS_PORT, port))?;
        }
        if let Some(dir) = lookup(ENV_STORAGE_DIR)
            && !dir.trim().is_empty()
        {
            self.database.storage_dir = PathBuf::from(dir.trim());
        }
        Ok(())
    }

    /// Storage directory resolved against `project_dir`.
    pub fn storage_dir(&self, project_dir: &Path) -> PathBuf {
        if self.database.storage_dir.is_absolute() {
            self.database.storage_dir.clone()
        } else {
            project_dir.join(&self.database.storage_dir)
        }
    }

    /// Open both views for the configured backend and load stored documents.
    pub fn build_reporter(&self, project_dir: &Path) -> Result<Reporter> {
        let (state, run): (Box<dyn DocumentStore>, Box<dyn DocumentStore>) =
            match self.database.backend {
                StorageBackend::Json => {
                    let root = self.storage_dir(project_dir);
                    (
                        Box::new(
                            JsonFileStore::open(&root, STATE_STORE)
                                .context("Failed to open state store")?,
                        ),
                        Box::new(
                            JsonFileStore::open(&root, RUN_STORE)
                                .context("Failed to open run store")?,
                        ),
                    )
                }
                StorageBackend::Memory => (
                    Box::new(MemoryStore::new(STATE_STORE)),
                    Box::new(MemoryStore::new(RUN_STORE)),
                ),
            };
        Reporter::new(self.database.doc_id.clone(), state, run)
            .context("Failed to load run document")
    }

    pub fn channel_factory(&self) -> TcpChannelFactory {
        TcpChannelFactory::new(
            &self.rendezvous.host,
            self.rendezvous.port,
            self.rendezvous.poll_interval(),
        )
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let defaults = OrchestratorConfig::default();
        OrchestratorConfig {
            run_name: self.project.name.clone().unwrap_or(defaults.run_name),
            clear_database: self.run.clear_database,
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.database.doc_id.trim().is_empty() {
            warnings.push("database.doc_id is empty".to_string());
        }
        if self.rendezvous.port == 0 {
            warnings.push("rendezvous.port is 0; the OS will pick a port panels cannot know".to_string());
        }
        if self.rendezvous.poll_interval_ms == 0 {
            warnings.push("rendezvous.poll_interval_ms is 0; waits will spin".to_string());
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            warnings.push(format!("Invalid logging.level '{}'", self.logging.level));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HardpyConfig::default();
        assert_eq!(config.database.backend, StorageBackend::Json);
        assert_eq!(config.database.storage_dir, PathBuf::from(".hardpy/storage"));
        assert_eq!(config.database.doc_id, "current");
        assert_eq!(config.rendezvous.addr(), "127.0.0.1:6525");
        assert_eq!(config.rendezvous.poll_interval(), Duration::from_millis(500));
        assert!(config.run.clear_database);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.logging.log_file().is_none());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_default_config_text_parses_to_defaults() {
        let config = HardpyConfig::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.project.name.as_deref(), Some("hardpy-stand"));
        assert_eq!(config.rendezvous.port, 6525);
        assert_eq!(config.database.backend, StorageBackend::Json);
    }

    #[test]
    fn test_partial_sections() {
        let content = r#"
[database]
backend = "memory"

[rendezvous]
port = 7000

[logging]
format = "json"
file = "logs/stand.log"
"#;
        let config = HardpyConfig::parse(content).unwrap();
        assert_eq!(config.database.backend, StorageBackend::Memory);
        assert_eq!(config.database.doc_id, "current");
        assert_eq!(config.rendezvous.host, "127.0.0.1");
        assert_eq!(config.rendezvous.port, 7000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.log_file(), Some(Path::new("logs/stand.log")));
        assert!(config.run.clear_database);
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let result = HardpyConfig::parse("[database]\nbackend = \"couch\"\n");
        assert!(result.is_err());
        assert!("couch".parse::<StorageBackend>().is_err());
        assert_eq!("JSON".parse::<StorageBackend>().unwrap(), StorageBackend::Json);
    }

    #[test]
    fn test_overrides() {
        let mut config = HardpyConfig::default();
        config
            .apply_overrides(overrides(&[
                (ENV_RENDEZVOUS_HOST, "0.0.0.0"),
                (ENV_RENDEZVOUS_PORT, "7100"),
                (ENV_STORAGE_DIR, "/var/lib/hardpy"),
            ]))
            .unwrap();
        assert_eq!(config.rendezvous.addr(), "0.0.0.0:7100");
        assert_eq!(
            config.storage_dir(Path::new("/project")),
            PathBuf::from("/var/lib/hardpy")
        );
    }

    #[test]
    fn test_invalid_port_override_has_context() {
        let mut config = HardpyConfig::default();
        let err = config
            .apply_overrides(overrides(&[(ENV_RENDEZVOUS_PORT, "not-a-port")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_RENDEZVOUS_PORT));
        assert_eq!(config.rendezvous.port, 6525);
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = HardpyConfig::default();
        config.project.name = Some("stand-7".into());
        config.run.clear_database = false;
        config.save(&path).unwrap();

        let loaded = HardpyConfig::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.project.name.as_deref(), Some("stand-7"));
        assert!(!loaded.run.clear_database);

        let orchestrator = loaded.orchestrator_config();
        assert_eq!(orchestrator.run_name, "stand-7");
        assert!(!orchestrator.clear_database);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempdir().unwrap();
        let err = HardpyConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_build_reporter_json_backend_creates_views() {
        let dir = tempdir().unwrap();
        let config = HardpyConfig::default();
        let reporter = config.build_reporter(dir.path()).unwrap();
        assert_eq!(reporter.doc_id(), "current");
        let root = dir.path().join(".hardpy/storage");
        assert!(root.join(STATE_STORE).is_dir());
        assert!(root.join(RUN_STORE).is_dir());
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = HardpyConfig::default();
        config.rendezvous.poll_interval_ms = 0;
        config.database.doc_id = " ".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
    }
}
