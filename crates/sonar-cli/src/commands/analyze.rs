//! `sonarctl analyze` and `sonarctl plan`.
//!
//! `analyze` runs the full sequencing call: probe, pick a bundle, notify,
//! dispatch. `plan` stops before dispatch and prints the rendered lines.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use sonar_core::{Config, HealthStatus, ServiceState};
use sonar_health::HealthProber;
use sonar_sequencer::{
    assess, bundle_for, AnalysisRequest, BundlePlan, ConsoleNotifier, Notifier, SequenceProbes,
    Sequencer, Session, ShellExecutor,
};

#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
    /// SonarQube project key (default: directory name)
    #[arg(short, long)]
    pub name: Option<String>,
    /// What to open once analysis finishes (default: the project dashboard)
    #[arg(short, long)]
    pub open: Option<String>,
}

pub async fn analyze(config: &Config, target: &TargetArgs, inline: bool) -> Result<ExitCode> {
    let request = resolve_request(config, target)?;
    info!(
        project = %request.project_name,
        path = %request.project_path.display(),
        "analyzing project"
    );

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier::stderr());
    let executor = if inline {
        ShellExecutor::inline(notifier.clone())
    } else {
        ShellExecutor::terminal(notifier.clone(), &config.terminal)
    };
    let prober = HealthProber::http(&config.service);

    let sequencer = Sequencer::from_config(prober, notifier, executor, config);
    let report = sequencer.sequence(&Session::new(), &request).await;

    info!(bundle = %report.kind, probes = report.probes, dispatched = report.dispatched, "analysis finished");
    Ok(if report.dispatched {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn plan(
    config: &Config,
    target: &TargetArgs,
    state: Option<&str>,
    recheck: Option<&str>,
) -> Result<()> {
    let request = resolve_request(config, target)?;

    let (first, second) = match state {
        Some(state) => (parse_state(state)?, recheck.map(parse_state).transpose()?),
        None => probe_states(config).await,
    };
    let kind = bundle_for(first, second);

    let bundle = BundlePlan::from_config(config).build(kind, &request);
    match second {
        Some(second) => println!("# service: {first}, re-check: {second} -> {kind}"),
        None => println!("# service: {first} -> {kind}"),
    }
    for line in bundle.render() {
        println!("{line}");
    }
    Ok(())
}

/// Probe exactly as `analyze` would, without notifying or dispatching.
async fn probe_states(config: &Config) -> (ServiceState, Option<ServiceState>) {
    let prober = HealthProber::http(&config.service);
    let assessment = assess(&prober, SequenceProbes::from(&config.probe)).await;
    (
        assessment.first.status(),
        assessment.recheck.as_ref().map(HealthStatus::status),
    )
}

fn parse_state(s: &str) -> Result<ServiceState> {
    match ServiceState::parse(s) {
        Some(state) => Ok(state),
        None => bail!("unknown service state '{s}' (expected running, starting, down, timeout, or error)"),
    }
}

/// Fill in defaults: absolute project path, name from the directory, and
/// the project dashboard as the target.
fn resolve_request(config: &Config, target: &TargetArgs) -> Result<AnalysisRequest> {
    let project_path = target
        .path
        .canonicalize()
        .with_context(|| format!("project directory {} not found", target.path.display()))?;
    if !project_path.is_dir() {
        bail!("{} is not a directory", project_path.display());
    }

    let project_name = match &target.name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        Some(_) => bail!("--name must not be empty"),
        None => directory_name(&project_path)?,
    };

    let post_success_target = target
        .open
        .clone()
        .unwrap_or_else(|| config.service.dashboard_url(&project_name));

    Ok(AnalysisRequest::new(project_path, project_name, post_success_target))
}

fn directory_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("cannot derive a project name from the filesystem root; pass --name")
}
