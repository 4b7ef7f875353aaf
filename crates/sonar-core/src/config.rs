//! sonarctl.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ProbeOptions;

/// File name looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "sonarctl.toml";

/// Placeholder substituted with the project name in `analysis_command`.
pub const PROJECT_PLACEHOLDER: &str = "{project}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub probe: ProbeConfig,
    pub sequencer: SequencerConfig,
    pub terminal: TerminalConfig,
}

/// Where the SonarQube container lives and how to start it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub status_path: String,
    /// Container engine binary; `<engine>-compose` must also be on PATH.
    pub engine: String,
    /// Directory holding the compose file for the SonarQube stack.
    pub compose_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub retries: u32,
    pub timeout_ms: u64,
    /// Retries for the first probe of a sequencing call.
    pub first_retries: u32,
    /// Per-attempt timeout for the re-check after an ambiguous first probe.
    pub escalation_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub startup_wait_secs: u64,
    pub recheck_wait_secs: u64,
    pub cold_start_wait_secs: u64,
    pub analysis_command: Vec<String>,
    /// Program used to open the post-analysis target.
    pub opener: String,
}

/// Terminal used by the windowed executor on non-macOS hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            status_path: "/api/system/status".to_string(),
            engine: "podman".to_string(),
            compose_dir: "~/sonarqube".to_string(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            retries: ProbeOptions::DEFAULT_RETRIES,
            timeout_ms: ProbeOptions::DEFAULT_TIMEOUT.as_millis() as u64,
            first_retries: 1,
            escalation_timeout_ms: 5000,
        }
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            startup_wait_secs: 60,
            recheck_wait_secs: 45,
            cold_start_wait_secs: 30,
            analysis_command: [
                "mvn",
                "clean",
                "verify",
                "sonar:sonar",
                "-Dsonar.projectKey={project}",
                "-Dsonar.projectName={project}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            opener: default_opener().to_string(),
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            program: "x-terminal-emulator".to_string(),
            args: vec!["-e".to_string()],
        }
    }
}

fn default_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, else `./sonarctl.toml` if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let local = Path::new(CONFIG_FILE_NAME);
        if local.is_file() {
            return Self::from_file(local);
        }
        Ok(Self::default())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a config pointing at the given compose directory.
    pub fn scaffold(compose_dir: &str) -> Self {
        Config {
            service: ServiceConfig {
                compose_dir: compose_dir.to_string(),
                ..ServiceConfig::default()
            },
            ..Config::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.host.trim().is_empty() {
            return Err(ConfigError::Invalid("service.host must not be empty".into()));
        }
        if self.service.port == 0 {
            return Err(ConfigError::Invalid("service.port must be non-zero".into()));
        }
        if !self.service.status_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "service.status_path must start with '/': {}",
                self.service.status_path
            )));
        }
        if self.probe.timeout_ms == 0 || self.probe.escalation_timeout_ms == 0 {
            return Err(ConfigError::Invalid("probe timeouts must be positive".into()));
        }
        if self.sequencer.analysis_command.is_empty() {
            return Err(ConfigError::Invalid(
                "sequencer.analysis_command must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl ServiceConfig {
    /// Base URL of the SonarQube web UI.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn status_url(&self) -> String {
        format!("{}{}", self.base_url(), self.status_path)
    }

    /// Project dashboard URL, the default post-analysis target.
    pub fn dashboard_url(&self, project_name: &str) -> String {
        format!("{}/dashboard?id={}", self.base_url(), project_name)
    }

    /// `compose_dir` with a leading `~/` expanded from `$HOME`.
    pub fn compose_dir_path(&self) -> PathBuf {
        expand_home(&self.compose_dir, std::env::var_os("HOME").map(PathBuf::from))
    }
}

impl ProbeConfig {
    pub fn options(&self) -> ProbeOptions {
        ProbeOptions {
            retries: self.retries,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    pub fn first_options(&self) -> ProbeOptions {
        self.options().with_retries(self.first_retries)
    }

    /// Longer-timeout options for the single re-check; retries stay at the default.
    pub fn escalation_options(&self) -> ProbeOptions {
        self.options()
            .with_timeout(Duration::from_millis(self.escalation_timeout_ms))
    }
}

fn expand_home(path: &str, home: Option<PathBuf>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        (None, Some(home)) if path == "~" => home,
        _ => PathBuf::from(path),
    }
}
