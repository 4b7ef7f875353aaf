//! Command executors: run a rendered bundle and report the outcome.
//!
//! The sequencer hands over the shell lines as one unit. [`ShellExecutor`]
//! either runs them in the current terminal or opens a new terminal
//! window for them. It posts the success message itself; failures are
//! returned as [`ExecutorError`] and never notified here.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use sonar_core::config::TerminalConfig;

use crate::notify::{Notification, Notifier};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no commands to run")]
    Empty,

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}")]
    ExitCode { program: String, code: i32 },

    #[error("{program} was terminated by a signal")]
    Terminated { program: String },
}

/// Boxed future returned by [`CommandExecutor::execute`].
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExecutorError>> + Send + 'a>>;

/// Runs a list of shell lines visibly.
///
/// Implementations may post `success_message` once the lines ran. A failure
/// is only returned; the caller reports it, so the user sees one notice.
pub trait CommandExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        commands: &'a [String],
        success_message: &'a str,
        failure_message: &'a str,
    ) -> ExecFuture<'a>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for Arc<E> {
    fn execute<'a>(
        &'a self,
        commands: &'a [String],
        success_message: &'a str,
        failure_message: &'a str,
    ) -> ExecFuture<'a> {
        (**self).execute(commands, success_message, failure_message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// `sh -c` in the current terminal, waiting for completion.
    Inline,
    /// A new terminal window; success means the window was launched.
    Terminal { program: String, args: Vec<String> },
}

pub struct ShellExecutor {
    mode: ExecutionMode,
    notifier: Arc<dyn Notifier>,
}

impl ShellExecutor {
    pub fn inline(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            mode: ExecutionMode::Inline,
            notifier,
        }
    }

    pub fn terminal(notifier: Arc<dyn Notifier>, config: &TerminalConfig) -> Self {
        Self {
            mode: ExecutionMode::Terminal {
                program: config.program.clone(),
                args: config.args.clone(),
            },
            notifier,
        }
    }

    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// Program and arguments that will run `commands`.
    pub fn launch_argv(&self, commands: &[String]) -> Vec<String> {
        match &self.mode {
            ExecutionMode::Inline => vec![
                "sh".to_string(),
                "-c".to_string(),
                inline_script(commands),
            ],
            ExecutionMode::Terminal { .. } if cfg!(target_os = "macos") => {
                let script = applescript_escape(&terminal_script(commands));
                vec![
                    "osascript".to_string(),
                    "-e".to_string(),
                    format!("tell application \"Terminal\" to do script \"{script}\""),
                    "-e".to_string(),
                    "tell application \"Terminal\" to activate".to_string(),
                ]
            }
            ExecutionMode::Terminal { program, args } => {
                let mut argv = Vec::with_capacity(args.len() + 4);
                argv.push(program.clone());
                argv.extend(args.iter().cloned());
                argv.push("sh".to_string());
                argv.push("-c".to_string());
                argv.push(terminal_script(commands));
                argv
            }
        }
    }

    async fn run(&self, commands: &[String]) -> Result<(), ExecutorError> {
        if commands.is_empty() {
            return Err(ExecutorError::Empty);
        }

        let argv = self.launch_argv(commands);
        let program = argv[0].clone();
        debug!(%program, lines = commands.len(), "launching command bundle");

        // Inherit stdio so the user sees the analysis output.
        let status = tokio::process::Command::new(&program)
            .args(&argv[1..])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| ExecutorError::Launch {
                program: program.clone(),
                source,
            })?;

        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(ExecutorError::ExitCode { program, code }),
            None => Err(ExecutorError::Terminated { program }),
        }
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute<'a>(
        &'a self,
        commands: &'a [String],
        success_message: &'a str,
        failure_message: &'a str,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            match self.run(commands).await {
                Ok(()) => {
                    info!(mode = ?self.mode, "command bundle finished");
                    self.notifier.notify(Notification::success(success_message));
                    Ok(())
                }
                // The caller owns the failure notice and its retry action.
                Err(e) => {
                    warn!(error = %e, summary = failure_message, "command bundle failed");
                    Err(e)
                }
            }
        })
    }
}

/// Script for inline runs: stop at the first failing line.
fn inline_script(commands: &[String]) -> String {
    let mut script = String::from("set -e\n");
    script.push_str(&commands.join("\n"));
    script
}

/// Script for terminal windows: chain the lines, then keep a shell open.
fn terminal_script(commands: &[String]) -> String {
    format!("{}; exec \"${{SHELL:-sh}}\"", commands.join(" && "))
}

fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
