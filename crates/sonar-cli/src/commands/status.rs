use std::process::ExitCode;
use std::time::Duration;

use sonar_core::{Config, HealthStatus, ServiceState};
use sonar_health::HealthProber;

pub async fn status(
    config: &Config,
    json: bool,
    retries: Option<u32>,
    timeout_ms: Option<u64>,
) -> anyhow::Result<ExitCode> {
    let mut options = config.probe.options();
    if let Some(retries) = retries {
        options = options.with_retries(retries);
    }
    if let Some(ms) = timeout_ms {
        anyhow::ensure!(ms > 0, "--timeout-ms must be positive");
        options = options.with_timeout(Duration::from_millis(ms));
    }

    let prober = HealthProber::http(&config.service);
    let status = prober.probe_detailed(options).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", format_status(&status, &config.service.status_url()));
    }

    Ok(if status.running() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn format_status(status: &HealthStatus, url: &str) -> String {
    let marker = match status.status() {
        ServiceState::Running => "✓",
        ServiceState::Starting | ServiceState::Timeout => "…",
        ServiceState::Down | ServiceState::Error => "✗",
    };
    let mut out = format!("{marker} SonarQube {}", status.status());
    if let Some(details) = status.details() {
        out.push_str(&format!(" - {details}"));
    }
    out.push_str(&format!("\n  Endpoint: {url}"));
    out
}
