use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::tree::{Kind, TreeIndex};

/// Canonical identity of a picked tree node. This is the message carried on
/// the account/contact channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    #[serde(rename = "recordId")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Kind,
}

impl Selection {
    pub fn new(id: impl Into<String>, kind: Kind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Payload of a tree `select` interaction: `{ "detail": { "name": "<id>" } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeSelectEvent {
    pub detail: TreeSelectDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeSelectDetail {
    pub name: String,
}

impl TreeSelectEvent {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            detail: TreeSelectDetail { name: name.into() },
        }
    }
}

/// Resolves a tree interaction into a `Selection`. A miss means the UI is
/// showing a node the current index no longer has; callers must not publish.
pub fn resolve(event: &TreeSelectEvent, index: &TreeIndex) -> Result<Selection> {
    let node = index
        .find_by_id(&event.detail.name)
        .ok_or_else(|| SyncError::ResolutionMiss {
            id: event.detail.name.clone(),
        })?;

    Ok(Selection {
        id: node.id.clone(),
        kind: node.kind,
    })
}
