//! Value types shared by the prober and the sequencer.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Coarse classification of the SonarQube service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// The service reports itself fully up.
    Running,
    /// The service answered but is still booting (503 or a non-UP status).
    Starting,
    /// Nothing is listening on the status port.
    Down,
    /// The status endpoint did not answer in time.
    Timeout,
    /// Any other failure.
    Error,
}

impl ServiceState {
    pub const ALL: [ServiceState; 5] = [
        ServiceState::Running,
        ServiceState::Starting,
        ServiceState::Down,
        ServiceState::Timeout,
        ServiceState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Running => "running",
            ServiceState::Starting => "starting",
            ServiceState::Down => "down",
            ServiceState::Timeout => "timeout",
            ServiceState::Error => "error",
        }
    }

    /// Parse the lowercase name used on the CLI and in JSON output.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one health probe.
///
/// `running` is derived from `status` at construction, so
/// `running == (status == Running)` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    running: bool,
    status: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl HealthStatus {
    pub fn new(status: ServiceState, details: Option<String>) -> Self {
        Self {
            running: status == ServiceState::Running,
            status,
            details,
        }
    }

    pub fn with_details(status: ServiceState, details: impl Into<String>) -> Self {
        Self::new(status, Some(details.into()))
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn status(&self) -> ServiceState {
        self.status
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }
}

/// Per-call probe parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Additional attempts after the first one.
    pub retries: u32,
    /// Timeout applied to each attempt.
    pub timeout: Duration,
}

impl ProbeOptions {
    pub const DEFAULT_RETRIES: u32 = 2;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            retries: Self::DEFAULT_RETRIES,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}
