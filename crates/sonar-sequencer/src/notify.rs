//! User notifications and the per-session warning flags.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    /// Ongoing work; usually dismissed or updated later.
    Progress,
    Success,
    Warning,
    Failure,
}

/// An action the user can take from a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAction {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: Option<String>,
    pub retry_action: Option<RetryAction>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: None,
            retry_action: None,
        }
    }

    pub fn progress(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Progress, title)
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title)
    }

    pub fn failure(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Failure, title)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_retry(mut self, label: impl Into<String>) -> Self {
        self.retry_action = Some(RetryAction {
            label: label.into(),
        });
        self
    }
}

/// Identifies a posted notification for later update or dismissal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationHandle(pub u64);

/// Where user-facing status messages go.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> NotificationHandle;

    /// Replace the content of an earlier notification.
    fn update(&self, handle: NotificationHandle, notification: Notification);

    fn dismiss(&self, handle: NotificationHandle);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notification: Notification) -> NotificationHandle {
        (**self).notify(notification)
    }

    fn update(&self, handle: NotificationHandle, notification: Notification) {
        (**self).update(handle, notification)
    }

    fn dismiss(&self, handle: NotificationHandle) {
        (**self).dismiss(handle)
    }
}

/// Writes notifications as single lines, to stderr by default.
pub struct ConsoleNotifier {
    next_id: AtomicU64,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleNotifier {
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            out: Mutex::new(out),
        }
    }

    fn write(&self, notification: &Notification) {
        let marker = match notification.level {
            NotificationLevel::Progress => "…",
            NotificationLevel::Success => "✓",
            NotificationLevel::Warning => "!",
            NotificationLevel::Failure => "✗",
        };
        let mut line = format!("{marker} {}", notification.title);
        if let Some(message) = &notification.message {
            line.push_str(": ");
            line.push_str(message);
        }
        if let Some(retry) = &notification.retry_action {
            line.push_str(&format!(" [{}]", retry.label));
        }

        // A poisoned lock or a closed stderr is not worth failing over.
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{line}");
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) -> NotificationHandle {
        let handle = NotificationHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write(&notification);
        handle
    }

    fn update(&self, _handle: NotificationHandle, notification: Notification) {
        self.write(&notification);
    }

    fn dismiss(&self, handle: NotificationHandle) {
        debug!(handle = handle.0, "notification dismissed");
    }
}

/// Session-scoped state shared by sequencing calls.
///
/// Holds one-shot "already warned" flags so a warning is shown once per
/// session rather than on every call.
#[derive(Debug, Default)]
pub struct Session {
    compose_dir_warned: AtomicBool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post `notification` unless the compose-dir warning was already shown.
    ///
    /// Returns whether it was posted.
    pub fn warn_compose_dir_once(&self, notifier: &dyn Notifier, notification: Notification) -> bool {
        post_once(&self.compose_dir_warned, notifier, notification)
    }

    pub fn compose_dir_warned(&self) -> bool {
        self.compose_dir_warned.load(Ordering::Acquire)
    }
}

fn post_once(flag: &AtomicBool, notifier: &dyn Notifier, notification: Notification) -> bool {
    if flag.swap(true, Ordering::AcqRel) {
        return false;
    }
    notifier.notify(notification);
    true
}
