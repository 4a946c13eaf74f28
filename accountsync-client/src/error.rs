//! Error type shared by every part of the sync layer.

use crate::tree::Kind;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Boxed error returned by subscriber callbacks and collaborator sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The picked node is not present in the current tree index (stale UI state).
    #[error("no tree node with id `{id}`")]
    ResolutionMiss { id: String },

    /// A single subscriber failed while handling a delivered message.
    #[error("subscriber {subscription} on `{topic}` failed: {reason}")]
    ChannelDelivery {
        subscription: String,
        topic: String,
        reason: String,
    },

    #[error("fetching {kind} `{id}` failed: {reason}")]
    Fetch { id: String, kind: Kind, reason: String },

    #[error("fetching {kind} `{id}` timed out after {timeout_ms}ms")]
    FetchTimeout { id: String, kind: Kind, timeout_ms: u64 },

    #[error("loading the account tree failed: {0}")]
    TreeLoad(String),

    #[error("source error: {0}")]
    Source(#[source] BoxError),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    pub fn source_error<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        SyncError::Source(err.into())
    }
}

/// Flattens an error and its `source()` chain into user-facing lines,
/// outermost first, skipping consecutive duplicates.
pub fn reduce_error(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut messages: Vec<String> = Vec::new();
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let text = e.to_string();
        if !text.is_empty() && messages.last() != Some(&text) {
            messages.push(text);
        }
        current = e.source();
    }
    messages
}
