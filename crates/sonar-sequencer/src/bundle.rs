//! Command bundles: structured shell steps and their rendering.
//!
//! A bundle is built fresh for every sequencing decision and rendered
//! once into shell lines for the executor.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use sonar_core::config::PROJECT_PLACEHOLDER;
use sonar_core::Config;

/// What the user asked for: analyze this project, then open that target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub project_path: PathBuf,
    pub project_name: String,
    pub post_success_target: String,
}

impl AnalysisRequest {
    pub fn new(
        project_path: impl Into<PathBuf>,
        project_name: impl Into<String>,
        post_success_target: impl Into<String>,
    ) -> Self {
        Self {
            project_path: project_path.into(),
            project_name: project_name.into(),
            post_success_target: post_success_target.into(),
        }
    }
}

/// One step of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStep {
    ChangeDirectory { path: PathBuf },
    /// Boot the container machine, then the compose stack.
    StartService { engine: String },
    Echo { text: String },
    Sleep { seconds: u64 },
    Run { argv: Vec<String> },
    Open { opener: String, target: String },
}

impl CommandStep {
    /// Render as a single POSIX shell line.
    pub fn render(&self) -> String {
        match self {
            CommandStep::ChangeDirectory { path } => {
                format!("cd {}", shell_quote(&path.to_string_lossy()))
            }
            CommandStep::StartService { engine } => {
                let engine = shell_quote(engine);
                format!("{engine} machine start && {engine}-compose start")
            }
            CommandStep::Echo { text } => format!("echo {}", shell_quote(text)),
            CommandStep::Sleep { seconds } => format!("sleep {seconds}"),
            CommandStep::Run { argv } => argv
                .iter()
                .map(|arg| shell_quote(arg))
                .collect::<Vec<_>>()
                .join(" "),
            CommandStep::Open { opener, target } => {
                format!("{} {}", shell_quote(opener), shell_quote(target))
            }
        }
    }
}

/// Which of the four command sequences was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleKind {
    /// Service is up: analyze right away.
    AlreadyRunning,
    /// Service is booting: wait for it, then analyze.
    WaitForStartup,
    /// Service answered the slower re-check: short wait, then analyze.
    AfterRecheck,
    /// Service is stopped: start the containers first.
    ColdStart,
}

impl BundleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleKind::AlreadyRunning => "already-running",
            BundleKind::WaitForStartup => "wait-for-startup",
            BundleKind::AfterRecheck => "after-recheck",
            BundleKind::ColdStart => "cold-start",
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list of steps dispatched as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBundle {
    kind: BundleKind,
    steps: Vec<CommandStep>,
}

impl CommandBundle {
    pub fn kind(&self) -> BundleKind {
        self.kind
    }

    pub fn steps(&self) -> &[CommandStep] {
        &self.steps
    }

    /// Shell lines, one per step, in order.
    pub fn render(&self) -> Vec<String> {
        self.steps.iter().map(CommandStep::render).collect()
    }

    pub fn starts_service(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step, CommandStep::StartService { .. }))
    }

    /// Total seconds spent in `Sleep` steps.
    pub fn total_sleep(&self) -> u64 {
        self.steps
            .iter()
            .map(|step| match step {
                CommandStep::Sleep { seconds } => *seconds,
                _ => 0,
            })
            .sum()
    }
}

/// Everything needed to turn a [`BundleKind`] into concrete steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePlan {
    pub engine: String,
    pub compose_dir: PathBuf,
    pub access_url: String,
    pub startup_wait_secs: u64,
    pub recheck_wait_secs: u64,
    pub cold_start_wait_secs: u64,
    /// Analysis argv; `{project}` is replaced by the project name.
    pub analysis_command: Vec<String>,
    pub opener: String,
}

impl BundlePlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            engine: config.service.engine.clone(),
            compose_dir: config.service.compose_dir_path(),
            access_url: config.service.base_url(),
            startup_wait_secs: config.sequencer.startup_wait_secs,
            recheck_wait_secs: config.sequencer.recheck_wait_secs,
            cold_start_wait_secs: config.sequencer.cold_start_wait_secs,
            analysis_command: config.sequencer.analysis_command.clone(),
            opener: config.sequencer.opener.clone(),
        }
    }

    pub fn compose_dir(&self) -> &Path {
        &self.compose_dir
    }

    pub fn build(&self, kind: BundleKind, request: &AnalysisRequest) -> CommandBundle {
        let mut steps = Vec::with_capacity(7);

        match kind {
            BundleKind::AlreadyRunning => {}
            BundleKind::WaitForStartup => steps.push(CommandStep::Sleep {
                seconds: self.startup_wait_secs,
            }),
            BundleKind::AfterRecheck => steps.push(CommandStep::Sleep {
                seconds: self.recheck_wait_secs,
            }),
            BundleKind::ColdStart => {
                steps.push(CommandStep::ChangeDirectory {
                    path: self.compose_dir.clone(),
                });
                steps.push(CommandStep::StartService {
                    engine: self.engine.clone(),
                });
                steps.push(CommandStep::Echo {
                    text: format!("SonarQube is starting, it will be available at {}", self.access_url),
                });
                steps.push(CommandStep::Sleep {
                    seconds: self.cold_start_wait_secs,
                });
            }
        }

        steps.extend(self.analysis_steps(request));
        CommandBundle { kind, steps }
    }

    /// The analysis argv with every `{project}` replaced by the project name.
    pub fn analysis_argv(&self, project_name: &str) -> Vec<String> {
        self.analysis_command
            .iter()
            .map(|arg| arg.replace(PROJECT_PLACEHOLDER, project_name))
            .collect()
    }

    fn analysis_steps(&self, request: &AnalysisRequest) -> [CommandStep; 3] {
        [
            CommandStep::ChangeDirectory {
                path: request.project_path.clone(),
            },
            CommandStep::Run {
                argv: self.analysis_argv(&request.project_name),
            },
            CommandStep::Open {
                opener: self.opener.clone(),
                target: request.post_success_target.clone(),
            },
        ]
    }
}

/// Quote `arg` for a POSIX shell if it contains anything special.
pub fn shell_quote(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}
