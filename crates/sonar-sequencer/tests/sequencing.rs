//! Sequencer tests with scripted probes and recording collaborators.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sonar_core::{Config, HealthStatus, ProbeOptions, ServiceState};
use sonar_health::{ProbeFuture, ServiceProbe};
use sonar_sequencer::*;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Notify(Notification),
    Update(u64, Notification),
    Dismiss(u64),
    Execute(Vec<String>),
}

type Journal = Arc<Mutex<Vec<Event>>>;

struct ScriptedProbe {
    states: Mutex<VecDeque<ServiceState>>,
    calls: Mutex<Vec<ProbeOptions>>,
}

impl ServiceProbe for ScriptedProbe {
    fn probe_status(&self, options: ProbeOptions) -> ProbeFuture<'_> {
        self.calls.lock().unwrap().push(options);
        let state = self
            .states
            .lock()
            .unwrap()
            .pop_front()
            .expect("sequencer probed more often than scripted");
        Box::pin(async move { HealthStatus::new(state, None) })
    }
}

struct RecordingNotifier {
    journal: Journal,
    next: AtomicU64,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> NotificationHandle {
        self.journal.lock().unwrap().push(Event::Notify(notification));
        NotificationHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn update(&self, handle: NotificationHandle, notification: Notification) {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Update(handle.0, notification));
    }

    fn dismiss(&self, handle: NotificationHandle) {
        self.journal.lock().unwrap().push(Event::Dismiss(handle.0));
    }
}

struct RecordingExecutor {
    journal: Journal,
    fail: bool,
}

impl CommandExecutor for RecordingExecutor {
    fn execute<'a>(
        &'a self,
        commands: &'a [String],
        _success_message: &'a str,
        _failure_message: &'a str,
    ) -> ExecFuture<'a> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Execute(commands.to_vec()));
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                Err(ExecutorError::Launch {
                    program: "x-terminal-emulator".to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            } else {
                Ok(())
            }
        })
    }
}

struct Harness {
    journal: Journal,
    probe: Arc<ScriptedProbe>,
    sequencer: Sequencer<Arc<ScriptedProbe>, RecordingNotifier, RecordingExecutor>,
    _compose_dir: tempfile::TempDir,
}

fn harness_with(states: &[ServiceState], fail: bool, compose_dir: Option<PathBuf>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.service.compose_dir = compose_dir
        .unwrap_or_else(|| dir.path().to_path_buf())
        .to_string_lossy()
        .into_owned();
    config.sequencer.opener = "open".to_string();

    let journal: Journal = Arc::default();
    let probe = Arc::new(ScriptedProbe {
        states: Mutex::new(states.iter().copied().collect()),
        calls: Mutex::new(Vec::new()),
    });
    let notifier = RecordingNotifier {
        journal: journal.clone(),
        next: AtomicU64::new(1),
    };
    let executor = RecordingExecutor {
        journal: journal.clone(),
        fail,
    };

    Harness {
        sequencer: Sequencer::from_config(probe.clone(), notifier, executor, &config),
        journal,
        probe,
        _compose_dir: dir,
    }
}

fn harness(states: &[ServiceState]) -> Harness {
    harness_with(states, false, None)
}

fn request() -> AnalysisRequest {
    AnalysisRequest::new("/p", "Name", "http://x")
}

impl Harness {
    async fn run(&self) -> SequenceReport {
        self.sequencer.sequence(&Session::new(), &request()).await
    }

    fn events(&self) -> Vec<Event> {
        self.journal.lock().unwrap().clone()
    }

    fn executed(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute(lines) => Some(lines),
                _ => None,
            })
            .collect()
    }

    fn lines(&self) -> Vec<String> {
        let mut executed = self.executed();
        assert_eq!(executed.len(), 1, "exactly one dispatch per call");
        executed.remove(0)
    }

    fn probe_calls(&self) -> Vec<ProbeOptions> {
        self.probe.calls.lock().unwrap().clone()
    }

    fn notifications(&self, level: NotificationLevel) -> Vec<Notification> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Notify(n) if n.level == level => Some(n),
                _ => None,
            })
            .collect()
    }
}

fn starts_service(lines: &[String]) -> bool {
    lines.iter().any(|l| l.contains("machine start"))
}

fn opens_target(lines: &[String]) -> usize {
    lines.iter().filter(|l| *l == "open http://x").count()
}

#[tokio::test]
async fn running_dispatches_analysis_only() {
    let h = harness(&[ServiceState::Running]);
    let report = h.run().await;

    assert_eq!(report.kind, BundleKind::AlreadyRunning);
    assert_eq!(report.probes, 1);
    assert!(report.dispatched);

    let lines = h.lines();
    assert!(!starts_service(&lines));
    assert_eq!(opens_target(&lines), 1);
    assert_eq!(lines[0], "cd /p");
    assert!(lines[1].starts_with("mvn clean verify sonar:sonar"));
    assert!(lines[1].contains("-Dsonar.projectKey=Name"));
    assert_eq!(h.notifications(NotificationLevel::Success).len(), 1);
}

#[tokio::test]
async fn down_dispatches_cold_start() {
    let h = harness(&[ServiceState::Down]);
    let report = h.run().await;
    assert_eq!(report.kind, BundleKind::ColdStart);

    let lines = h.lines();
    assert!(lines.contains(&"podman machine start && podman-compose start".to_string()));
    assert!(lines.contains(&"sleep 30".to_string()));
    assert_eq!(opens_target(&lines), 1);
    assert_eq!(lines.last().unwrap(), "open http://x");
}

#[tokio::test]
async fn error_dispatches_cold_start() {
    let h = harness(&[ServiceState::Error]);
    assert_eq!(h.run().await.kind, BundleKind::ColdStart);
    assert!(starts_service(&h.lines()));
}

#[tokio::test]
async fn starting_waits_then_analyzes() {
    let h = harness(&[ServiceState::Starting]);
    let report = h.run().await;
    assert_eq!(report.kind, BundleKind::WaitForStartup);

    let lines = h.lines();
    assert_eq!(lines[0], "sleep 60");
    assert!(!starts_service(&lines));
    assert!(!lines.iter().any(|l| l.contains("podman")));
    assert_eq!(opens_target(&lines), 1);
}

#[tokio::test]
async fn timeout_then_running_rechecks_once() {
    let h = harness(&[ServiceState::Timeout, ServiceState::Running]);
    let report = h.run().await;

    assert_eq!(report.kind, BundleKind::AfterRecheck);
    assert_eq!(report.probes, 2);
    assert_eq!(report.state, ServiceState::Running);

    let calls = h.probe_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].retries, 1);
    assert_eq!(calls[1].timeout, Duration::from_millis(5000));

    let lines = h.lines();
    assert!(!starts_service(&lines));
    assert_eq!(lines[0], "sleep 45");
    assert_eq!(opens_target(&lines), 1);
}

#[tokio::test]
async fn timeout_then_starting_rechecks_once() {
    let h = harness(&[ServiceState::Timeout, ServiceState::Starting]);
    let report = h.run().await;
    assert_eq!(report.kind, BundleKind::AfterRecheck);
    assert!(!starts_service(&h.lines()));
}

#[tokio::test]
async fn timeout_then_down_falls_through_to_cold_start() {
    let h = harness(&[ServiceState::Timeout, ServiceState::Down]);
    let report = h.run().await;

    assert_eq!(report.kind, BundleKind::ColdStart);
    assert_eq!(report.probes, 2);
    let lines = h.lines();
    assert!(starts_service(&lines));
    assert!(lines.contains(&"sleep 30".to_string()));
    assert_eq!(opens_target(&lines), 1);
}

#[tokio::test]
async fn ambiguous_recheck_never_probes_a_third_time() {
    for second in [ServiceState::Timeout, ServiceState::Error] {
        let h = harness(&[ServiceState::Timeout, second]);
        let report = h.run().await;
        assert_eq!(report.kind, BundleKind::ColdStart);
        assert_eq!(h.probe_calls().len(), 2);
    }
}

#[tokio::test]
async fn notification_precedes_dispatch() {
    let scripts: [&[ServiceState]; 7] = [
        &[ServiceState::Running],
        &[ServiceState::Starting],
        &[ServiceState::Down],
        &[ServiceState::Error],
        &[ServiceState::Timeout, ServiceState::Running],
        &[ServiceState::Timeout, ServiceState::Starting],
        &[ServiceState::Timeout, ServiceState::Down],
    ];
    for script in scripts {
        let h = harness(script);
        h.run().await;

        let events = h.events();
        let dispatch = events
            .iter()
            .position(|e| matches!(e, Event::Execute(_)))
            .expect("dispatched");
        assert!(
            events[..dispatch]
                .iter()
                .any(|e| matches!(e, Event::Notify(_))),
            "no notification before dispatch for {script:?}"
        );
    }
}

#[tokio::test]
async fn progress_is_dismissed_after_dispatch() {
    let h = harness(&[ServiceState::Starting]);
    h.run().await;

    let events = h.events();
    let dispatch = events
        .iter()
        .position(|e| matches!(e, Event::Execute(_)))
        .unwrap();
    assert!(matches!(events[dispatch + 1], Event::Dismiss(1)));
}

#[tokio::test]
async fn recheck_updates_the_checking_notification() {
    let h = harness(&[ServiceState::Timeout, ServiceState::Running]);
    h.run().await;

    let events = h.events();
    assert!(matches!(&events[0], Event::Notify(n) if n.level == NotificationLevel::Progress));
    assert!(matches!(&events[1], Event::Update(1, n) if n.level == NotificationLevel::Success));
    // A success is left on screen.
    assert!(!events.iter().any(|e| matches!(e, Event::Dismiss(_))));
}

#[tokio::test]
async fn executor_failure_is_reported_not_retried() {
    let h = harness_with(&[ServiceState::Running], true, None);
    let report = h.run().await;

    assert!(!report.dispatched);
    assert_eq!(h.executed().len(), 1);

    let failures = h.notifications(NotificationLevel::Failure);
    assert_eq!(failures.len(), 1);
    let failure = &failures[0];
    assert!(failure.message.as_deref().unwrap().contains("x-terminal-emulator"));
    assert_eq!(failure.retry_action.as_ref().unwrap().label, "Retry");
    assert!(matches!(h.events().last(), Some(Event::Notify(n)) if n.level == NotificationLevel::Failure));
}

#[tokio::test]
async fn missing_compose_dir_warns_once_per_session() {
    let missing = PathBuf::from("/nonexistent/sonarqube-compose-4f2a");
    let h = harness_with(
        &[ServiceState::Down, ServiceState::Down, ServiceState::Down],
        false,
        Some(missing),
    );

    let session = Session::new();
    h.sequencer.sequence(&session, &request()).await;
    h.sequencer.sequence(&session, &request()).await;
    assert_eq!(h.notifications(NotificationLevel::Warning).len(), 1);
    assert_eq!(h.executed().len(), 2);

    h.sequencer.sequence(&Session::new(), &request()).await;
    assert_eq!(h.notifications(NotificationLevel::Warning).len(), 2);
}

#[tokio::test]
async fn existing_compose_dir_does_not_warn() {
    let h = harness(&[ServiceState::Down]);
    h.run().await;
    assert!(h.notifications(NotificationLevel::Warning).is_empty());
}

#[tokio::test]
async fn failed_shell_run_shows_a_single_failure_with_retry() {
    let journal: Journal = Arc::default();
    let notifier = Arc::new(RecordingNotifier {
        journal: journal.clone(),
        next: AtomicU64::new(1),
    });
    let probe = ScriptedProbe {
        states: Mutex::new([ServiceState::Running].into()),
        calls: Mutex::new(Vec::new()),
    };
    let executor = ShellExecutor::inline(notifier.clone());
    let sequencer = Sequencer::from_config(probe, notifier, executor, &Config::default());

    // `cd` into a missing project directory stops the inline script.
    let request = AnalysisRequest::new("/nonexistent/sonar-project-9c1e", "Name", "http://x");
    let report = sequencer.sequence(&Session::new(), &request).await;
    assert!(!report.dispatched);

    let failures: Vec<Notification> = journal
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::Notify(n) if n.level == NotificationLevel::Failure => Some(n.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1, "{failures:?}");
    assert_eq!(failures[0].title, "SonarQube analysis failed");
    assert!(failures[0].message.as_deref().unwrap().contains("exited with code"));
    assert_eq!(failures[0].retry_action.as_ref().unwrap().label, "Retry");
}

#[tokio::test]
async fn assess_agrees_with_sequence() {
    let scripts: [&[ServiceState]; 8] = [
        &[ServiceState::Running],
        &[ServiceState::Starting],
        &[ServiceState::Down],
        &[ServiceState::Error],
        &[ServiceState::Timeout, ServiceState::Running],
        &[ServiceState::Timeout, ServiceState::Starting],
        &[ServiceState::Timeout, ServiceState::Down],
        &[ServiceState::Timeout, ServiceState::Timeout],
    ];
    for script in scripts {
        let h = harness(script);
        let report = h.run().await;

        let probe = ScriptedProbe {
            states: Mutex::new(script.iter().copied().collect()),
            calls: Mutex::new(Vec::new()),
        };
        let probes = SequenceProbes::from(&Config::default().probe);
        let assessment = assess(&probe, probes).await;

        assert_eq!(assessment.kind(), report.kind, "{script:?}");
        assert_eq!(assessment.probes(), report.probes, "{script:?}");
        assert_eq!(assessment.last().status(), report.state, "{script:?}");
        assert_eq!(probe.calls.lock().unwrap().len(), script.len());
    }
}
