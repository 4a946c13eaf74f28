// lib.rs
//! Keeps an account/contact tree browser and a record summary panel in sync
//! through a scoped message channel, without either holding a reference to
//! the other.

use std::path::Path;

cfg_if::cfg_if! {
    if #[cfg(feature = "telemetry")] {
        use accountsync_telemetry as logging;
    } else {
        mod log;
        use log as logging;
    }
}

pub mod channel;
pub mod components;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod gate;
pub mod notify;
pub mod projection;
pub mod resolver;
pub mod source;
pub mod tree;

#[cfg(feature = "lua")]
mod lua;

pub use channel::{MessageChannel, Scope, Subscription, Topic, ACCOUNTS_TOPIC};
pub use components::{AccountBrowser, SummaryPanel};
pub use config::{LogConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use event_loop::EventLoop;
pub use gate::{FetchRequest, FetchResponse, FetchTicket, ResponseOutcome, SelectionGate};
pub use notify::{Notification, NotificationLog, Notifier, Severity, TracingNotifier};
pub use projection::{project, FieldValue, LogicalField, Record, RecordProjection};
pub use resolver::{resolve, Selection, TreeSelectEvent};
pub use source::{JsonCatalog, PermissionSource, RecordSource, TreeSource};
pub use tree::{Kind, TreeIndex, TreeNode};

/// Installs the process-wide logger described by `config`. Idempotent.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let dir: &Path = &config.dir;
    logging::setup_logger(dir, &config.level, &config.otel_endpoint)
        .map_err(|e| SyncError::Config(format!("logging: {e}")))
}

/// Flushes whatever the installed logger still buffers. Call before the host
/// process exits.
pub fn shutdown_logging() {
    logging::shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_without_logger_is_noop() {
        shutdown_logging();
        shutdown_logging();
    }
}
