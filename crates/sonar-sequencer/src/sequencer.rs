//! Command sequencer: probe, pick a bundle, notify, dispatch.
//!
//! One `sequence` call makes at most two probes:
//!
//! ```text
//! first probe ──running──────────────▶ AlreadyRunning
//!             ├─starting─────────────▶ WaitForStartup
//!             ├─down / error─────────▶ ColdStart
//!             └─timeout ─▶ re-check ─┬─running / starting─▶ AfterRecheck
//!                                    └─anything else──────▶ ColdStart
//! ```
//!
//! The chosen bundle is dispatched exactly once. Executor failures are
//! reported to the user and never retried here.

use tracing::{info, warn};

use sonar_core::config::ProbeConfig;
use sonar_core::{Config, HealthStatus, ProbeOptions, ServiceState};
use sonar_health::ServiceProbe;

use crate::bundle::{AnalysisRequest, BundleKind, BundlePlan};
use crate::executor::CommandExecutor;
use crate::notify::{Notification, NotificationHandle, Notifier, Session};

/// User-facing strings. Supplied by the caller; the sequencer passes them
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Messages {
    pub service_running: String,
    pub service_starting: String,
    pub checking_status: String,
    pub recheck_running: String,
    pub recheck_starting: String,
    pub starting_service: String,
    pub compose_dir_missing: String,
    pub analysis_succeeded: String,
    /// Title of the single failure notice when the bundle does not run.
    pub analysis_failed: String,
    pub retry_label: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            service_running: "SonarQube is running, starting analysis".into(),
            service_starting: "SonarQube is starting, please wait".into(),
            checking_status: "Checking SonarQube status".into(),
            recheck_running: "SonarQube is ready, starting analysis".into(),
            recheck_starting: "SonarQube is still starting, analysis will follow".into(),
            starting_service: "Starting SonarQube".into(),
            compose_dir_missing: "SonarQube compose directory not found".into(),
            analysis_succeeded: "SonarQube analysis launched".into(),
            analysis_failed: "SonarQube analysis failed".into(),
            retry_label: "Retry".into(),
        }
    }
}

/// Probe parameters for the two probes of a sequencing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceProbes {
    pub first: ProbeOptions,
    /// Used for the single re-check after a `timeout`.
    pub escalation: ProbeOptions,
}

impl From<&ProbeConfig> for SequenceProbes {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            first: config.first_options(),
            escalation: config.escalation_options(),
        }
    }
}

/// Probe results a sequencing decision is made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub first: HealthStatus,
    /// Present only when the first probe timed out.
    pub recheck: Option<HealthStatus>,
}

impl Assessment {
    pub fn kind(&self) -> BundleKind {
        bundle_for(
            self.first.status(),
            self.recheck.as_ref().map(HealthStatus::status),
        )
    }

    pub fn probes(&self) -> u32 {
        if self.recheck.is_some() { 2 } else { 1 }
    }

    /// The classification the bundle was chosen on.
    pub fn last(&self) -> &HealthStatus {
        self.recheck.as_ref().unwrap_or(&self.first)
    }
}

/// Run the probes of a sequencing call without notifying or dispatching.
pub async fn assess<P: ServiceProbe + ?Sized>(probe: &P, probes: SequenceProbes) -> Assessment {
    assess_with(probe, probes, |_| ()).await.0
}

/// As [`assess`], calling `before_recheck` between the two probes.
async fn assess_with<P, T>(
    probe: &P,
    probes: SequenceProbes,
    before_recheck: impl FnOnce(&HealthStatus) -> T,
) -> (Assessment, Option<T>)
where
    P: ServiceProbe + ?Sized,
{
    let first = probe.probe_status(probes.first).await;
    info!(state = %first.status(), details = ?first.details(), "first health probe");

    if first.status() != ServiceState::Timeout {
        return (Assessment { first, recheck: None }, None);
    }

    let hook = before_recheck(&first);
    let second = probe.probe_status(probes.escalation).await;
    info!(state = %second.status(), details = ?second.details(), "health re-check");

    let assessment = Assessment {
        first,
        recheck: Some(second),
    };
    (assessment, Some(hook))
}

/// What a sequencing call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub kind: BundleKind,
    /// Number of probes made (1 or 2).
    pub probes: u32,
    /// Classification of the last probe.
    pub state: ServiceState,
    /// Whether the executor accepted and completed the bundle.
    pub dispatched: bool,
}

struct Decision {
    kind: BundleKind,
    probes: u32,
    state: ServiceState,
    /// Progress notification to dismiss once dispatch returns.
    progress: Option<NotificationHandle>,
}

pub struct Sequencer<P, N, E> {
    probe: P,
    notifier: N,
    executor: E,
    plan: BundlePlan,
    probes: SequenceProbes,
    messages: Messages,
}

impl<P, N, E> Sequencer<P, N, E>
where
    P: ServiceProbe,
    N: Notifier,
    E: CommandExecutor,
{
    pub fn new(probe: P, notifier: N, executor: E, plan: BundlePlan, probes: SequenceProbes) -> Self {
        Self {
            probe,
            notifier,
            executor,
            plan,
            probes,
            messages: Messages::default(),
        }
    }

    pub fn from_config(probe: P, notifier: N, executor: E, config: &Config) -> Self {
        Self::new(
            probe,
            notifier,
            executor,
            BundlePlan::from_config(config),
            SequenceProbes::from(&config.probe),
        )
    }

    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.messages = messages;
        self
    }

    pub fn plan(&self) -> &BundlePlan {
        &self.plan
    }

    /// Probe the service, then dispatch the matching bundle for `request`.
    pub async fn sequence(&self, session: &Session, request: &AnalysisRequest) -> SequenceReport {
        let decision = self.decide(&request.project_name).await;

        if decision.kind == BundleKind::ColdStart && !self.plan.compose_dir().is_dir() {
            let warning = Notification::warning(&self.messages.compose_dir_missing)
                .with_message(self.plan.compose_dir().display().to_string());
            session.warn_compose_dir_once(&self.notifier, warning);
        }

        let bundle = self.plan.build(decision.kind, request);
        let lines = bundle.render();
        info!(
            project = %request.project_name,
            bundle = %decision.kind,
            state = %decision.state,
            probes = decision.probes,
            steps = lines.len(),
            "dispatching command bundle"
        );

        let result = self
            .executor
            .execute(
                &lines,
                &self.messages.analysis_succeeded,
                &self.messages.analysis_failed,
            )
            .await;

        if let Some(handle) = decision.progress {
            self.notifier.dismiss(handle);
        }

        let dispatched = match result {
            Ok(()) => true,
            Err(e) => {
                warn!(project = %request.project_name, error = %e, "command bundle was not run");
                self.notifier.notify(
                    Notification::failure(&self.messages.analysis_failed)
                        .with_message(e.to_string())
                        .with_retry(&self.messages.retry_label),
                );
                false
            }
        };

        SequenceReport {
            kind: decision.kind,
            probes: decision.probes,
            state: decision.state,
            dispatched,
        }
    }

    async fn decide(&self, project_name: &str) -> Decision {
        let (assessment, checking) = assess_with(&self.probe, self.probes, |_| {
            self.notifier.notify(
                Notification::progress(&self.messages.checking_status).with_message(project_name),
            )
        })
        .await;

        let kind = assessment.kind();
        let state = assessment.last().status();
        let progress = match checking {
            Some(handle) => self.announce_recheck(state, handle, project_name),
            None => self.announce(kind, project_name),
        };

        Decision {
            kind,
            probes: assessment.probes(),
            state,
            progress,
        }
    }

    /// Tell the user what a single-probe decision means.
    fn announce(&self, kind: BundleKind, project_name: &str) -> Option<NotificationHandle> {
        let (notification, keep) = match kind {
            BundleKind::AlreadyRunning => (Notification::success(&self.messages.service_running), false),
            BundleKind::WaitForStartup | BundleKind::AfterRecheck => {
                (Notification::progress(&self.messages.service_starting), true)
            }
            BundleKind::ColdStart => (Notification::progress(&self.messages.starting_service), true),
        };
        let handle = self.notifier.notify(notification.with_message(project_name));
        keep.then_some(handle)
    }

    /// Replace the "checking" notice with the re-check outcome.
    fn announce_recheck(
        &self,
        state: ServiceState,
        handle: NotificationHandle,
        project_name: &str,
    ) -> Option<NotificationHandle> {
        let (notification, keep) = match state {
            ServiceState::Running => (Notification::success(&self.messages.recheck_running), false),
            ServiceState::Starting => (Notification::progress(&self.messages.recheck_starting), true),
            ServiceState::Down | ServiceState::Error | ServiceState::Timeout => {
                (Notification::progress(&self.messages.starting_service), true)
            }
        };
        self.notifier.update(handle, notification.with_message(project_name));
        keep.then_some(handle)
    }
}

/// Decision table without the probing: the bundle chosen for a first-probe
/// state and, after a `Timeout`, the re-check state.
pub fn bundle_for(first: ServiceState, recheck: Option<ServiceState>) -> BundleKind {
    match (first, recheck) {
        (ServiceState::Running, _) => BundleKind::AlreadyRunning,
        (ServiceState::Starting, _) => BundleKind::WaitForStartup,
        (ServiceState::Timeout, Some(ServiceState::Running | ServiceState::Starting)) => {
            BundleKind::AfterRecheck
        }
        _ => BundleKind::ColdStart,
    }
}
