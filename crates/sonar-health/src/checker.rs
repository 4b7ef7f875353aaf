//! Health probe logic.
//!
//! Performs HTTP status checks against the SonarQube endpoint with
//! bounded retries and exponential backoff, then classifies the result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use sonar_core::config::ServiceConfig;
use sonar_core::{HealthStatus, ProbeOptions, ServiceState};

use crate::transport::{HttpTransport, StatusRequest, StatusTransport, TransportError};

/// Delay before the first retry.
pub const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Upper bound for any single gap between attempts.
pub const BACKOFF_CAP: Duration = Duration::from_millis(5000);

const RUNNING_DETAILS: &str = "SonarQube is running normally";

/// Backoff before the next attempt, given how many attempts have failed.
///
/// `min(500ms * 2^(failed - 1), 5s)`.
pub fn backoff_delay(failed_attempts: u32) -> Duration {
    let exponent = failed_attempts.saturating_sub(1).min(16);
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(BACKOFF_CAP)
}

/// Classify an HTTP answer.
///
/// Statuses in `[200, 400)` trust the body's `status` field; a body that
/// is not JSON or has no `status` counts as running. `503` means the
/// service is starting. Anything else is a failure worth retrying.
pub fn classify_response(status: u16, body: &[u8]) -> Result<HealthStatus, TransportError> {
    if (200..400).contains(&status) {
        return Ok(classify_body(status, body));
    }
    if status == 503 {
        return Ok(HealthStatus::with_details(
            ServiceState::Starting,
            "SonarQube is starting (HTTP 503)",
        ));
    }
    Err(TransportError::UnexpectedStatus(status))
}

fn classify_body(status: u16, body: &[u8]) -> HealthStatus {
    let reported = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json.get("status")?.as_str().map(str::to_owned));

    let Some(reported) = reported else {
        return HealthStatus::with_details(
            ServiceState::Running,
            format!("SonarQube responded with HTTP {status}"),
        );
    };

    match reported.as_str() {
        "UP" => HealthStatus::with_details(ServiceState::Running, RUNNING_DETAILS),
        "DOWN" => HealthStatus::with_details(ServiceState::Down, "SonarQube reports DOWN"),
        // STARTING, RESTARTING, DB_MIGRATION_* and anything unknown: it
        // answered, but did not claim to be up.
        other => HealthStatus::with_details(
            ServiceState::Starting,
            format!("SonarQube is starting ({other})"),
        ),
    }
}

/// Final classification once every attempt has failed.
pub fn classify_failure(error: &TransportError) -> HealthStatus {
    match error {
        TransportError::ConnectionRefused => {
            HealthStatus::with_details(ServiceState::Down, "SonarQube server not running")
        }
        TransportError::Timeout => HealthStatus::with_details(
            ServiceState::Timeout,
            "SonarQube not responding, may be starting",
        ),
        other => {
            HealthStatus::with_details(ServiceState::Error, format!("Health check failed: {other}"))
        }
    }
}

/// Probes the SonarQube status endpoint.
#[derive(Debug, Clone)]
pub struct HealthProber<T> {
    transport: T,
    host: String,
    port: u16,
    path: String,
}

impl HealthProber<HttpTransport> {
    /// Prober using the real HTTP transport against the configured endpoint.
    pub fn http(service: &ServiceConfig) -> Self {
        Self::from_config(HttpTransport, service)
    }
}

impl<T: StatusTransport> HealthProber<T> {
    pub fn new(transport: T, host: &str, port: u16, path: &str) -> Self {
        Self {
            transport,
            host: host.to_string(),
            port,
            path: path.to_string(),
        }
    }

    pub fn from_config(transport: T, service: &ServiceConfig) -> Self {
        Self::new(transport, &service.host, service.port, &service.status_path)
    }

    /// `true` only when the service is classified as running.
    pub async fn probe(&self, options: ProbeOptions) -> bool {
        self.probe_detailed(options).await.running()
    }

    /// Probe with retries and return the full classification.
    ///
    /// Makes at most `options.retries + 1` attempts.
    pub async fn probe_detailed(&self, options: ProbeOptions) -> HealthStatus {
        let request = StatusRequest {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            timeout: options.timeout,
        };

        let mut failed = 0u32;
        loop {
            let outcome = match self.transport.get(&request).await {
                Ok(resp) => classify_response(resp.status, &resp.body),
                Err(e) => Err(e),
            };

            let error = match outcome {
                Ok(status) => {
                    info!(
                        state = %status.status(),
                        attempt = failed + 1,
                        "health probe answered"
                    );
                    return status;
                }
                Err(e) => e,
            };

            failed += 1;
            debug!(error = %error, attempt = failed, retries = options.retries, "health probe attempt failed");

            if failed > options.retries {
                let status = classify_failure(&error);
                info!(state = %status.status(), attempts = failed, "health probe gave up");
                return status;
            }

            let delay = backoff_delay(failed);
            debug!(delay_ms = delay.as_millis() as u64, "backing off before next health probe");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Boxed future returned by [`ServiceProbe::probe_status`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>>;

/// Detailed probing as seen by callers that only need a classification.
pub trait ServiceProbe: Send + Sync {
    fn probe_status(&self, options: ProbeOptions) -> ProbeFuture<'_>;
}

impl<S: ServiceProbe + ?Sized> ServiceProbe for Arc<S> {
    fn probe_status(&self, options: ProbeOptions) -> ProbeFuture<'_> {
        (**self).probe_status(options)
    }
}

impl<T: StatusTransport> ServiceProbe for HealthProber<T> {
    fn probe_status(&self, options: ProbeOptions) -> ProbeFuture<'_> {
        Box::pin(self.probe_detailed(options))
    }
}
