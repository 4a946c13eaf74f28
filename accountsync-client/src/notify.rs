//! User notifications (toasts). Fire-and-forget from the components' side.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{error, info, warn};

pub const ERROR_TITLE: &str = "Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub raised_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            raised_at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            "Unknown error".to_string()
        } else {
            message
        };
        Self::new(ERROR_TITLE, message, Severity::Error)
    }
}

pub trait Notifier {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.severity {
            Severity::Error => error!(title = %n.title, "{}", n.message),
            Severity::Warning => warn!(title = %n.title, "{}", n.message),
            Severity::Info | Severity::Success => info!(title = %n.title, "{}", n.message),
        }
    }
}

/// Keeps notifications until the host drains them for display.
#[derive(Debug, Clone, Default)]
pub struct NotificationLog {
    entries: Rc<RefCell<Vec<Notification>>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.entries.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        TracingNotifier.notify(notification.clone());
        self.entries.borrow_mut().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_notification_defaults() {
        let n = Notification::error("");
        assert_eq!(n.title, ERROR_TITLE);
        assert_eq!(n.message, "Unknown error");
        assert_eq!(n.severity, Severity::Error);
    }

    #[test]
    fn test_log_drains_in_order() {
        let log = NotificationLog::new();
        let shared = log.clone();
        shared.notify(Notification::error("first"));
        shared.notify(Notification::new("Saved", "second", Severity::Success));

        assert_eq!(log.len(), 2);
        let drained: Vec<String> = log.drain().into_iter().map(|n| n.message).collect();
        assert_eq!(drained, vec!["first", "second"]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_severity_wire_names() {
        let json = serde_json::to_value(Notification::error("boom")).unwrap();
        assert_eq!(json["severity"], "error");
        assert_eq!(json["title"], "Error");
    }
}
