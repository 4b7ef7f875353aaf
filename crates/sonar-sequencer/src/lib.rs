//! sonar-sequencer: turns a health classification into a command bundle.
//!
//! Given a project to analyze, the [`Sequencer`] probes SonarQube (once,
//! or twice when the first answer is ambiguous), picks one of four
//! bundles, tells the user what is happening, and hands the bundle to a
//! [`CommandExecutor`] as one atomic list of shell lines.
//!
//! # Components
//!
//! - **`bundle`**: structured steps (`cd`, start, sleep, run, open) and rendering
//! - **`notify`**: notification sink, console notifier, session flags
//! - **`executor`**: executor seam and the shell / terminal-window executor
//! - **`sequencer`**: the decision logic

pub mod bundle;
pub mod executor;
pub mod notify;
pub mod sequencer;

pub use bundle::{AnalysisRequest, BundleKind, BundlePlan, CommandBundle, CommandStep};
pub use executor::{CommandExecutor, ExecFuture, ExecutionMode, ExecutorError, ShellExecutor};
pub use notify::{
    ConsoleNotifier, Notification, NotificationHandle, NotificationLevel, Notifier, RetryAction,
    Session,
};
pub use sequencer::{
    assess, bundle_for, Assessment, Messages, SequenceProbes, SequenceReport, Sequencer,
};
