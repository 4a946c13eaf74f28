//! Data collaborators the components depend on, and a catalog file that
//! implements all of them.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::projection::Record;
use crate::tree::{Kind, TreeNode};

/// Supplies the full account/contact tree.
#[async_trait(?Send)]
pub trait TreeSource {
    async fn load_tree(&self) -> Result<Vec<TreeNode>>;
}

/// Fetches one record by `(id, kind)`.
#[async_trait(?Send)]
pub trait RecordSource {
    async fn fetch(&self, id: &str, kind: Kind) -> Result<Record>;
}

/// Reports the current user's coarse permission category.
#[async_trait(?Send)]
pub trait PermissionSource {
    async fn user_category(&self) -> Result<String>;
}

/// Catalog snapshot read from a JSON or YAML file:
///
/// ```text
/// tree:          [ { name, type, label, items } ... ]
/// records:       { "Account": { "<id>": {...} }, "Contact": { "<id>": {...} } }
/// user_category: "Standard"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonCatalog {
    #[serde(default)]
    tree: Vec<TreeNode>,
    #[serde(default)]
    records: HashMap<String, HashMap<String, Record>>,
    #[serde(default)]
    user_category: Option<String>,
}

impl JsonCatalog {
    #[tracing::instrument]
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let catalog: JsonCatalog = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            _ => serde_json::from_str(&raw)?,
        };
        tracing::debug!(
            roots = catalog.tree.len(),
            kinds = catalog.records.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn with_tree(mut self, tree: Vec<TreeNode>) -> Self {
        self.tree = tree;
        self
    }

    pub fn with_record(mut self, id: impl Into<String>, kind: Kind, record: Record) -> Self {
        self.records
            .entry(kind.as_str().to_string())
            .or_default()
            .insert(id.into(), record);
        self
    }

    pub fn with_user_category(mut self, category: impl Into<String>) -> Self {
        self.user_category = Some(category.into());
        self
    }
}

#[async_trait(?Send)]
impl TreeSource for JsonCatalog {
    async fn load_tree(&self) -> Result<Vec<TreeNode>> {
        Ok(self.tree.clone())
    }
}

#[async_trait(?Send)]
impl RecordSource for JsonCatalog {
    async fn fetch(&self, id: &str, kind: Kind) -> Result<Record> {
        self.records
            .get(kind.as_str())
            .and_then(|by_id| by_id.get(id))
            .cloned()
            .ok_or_else(|| SyncError::Fetch {
                id: id.to_string(),
                kind,
                reason: "record not found".to_string(),
            })
    }
}

#[async_trait(?Send)]
impl PermissionSource for JsonCatalog {
    async fn user_category(&self) -> Result<String> {
        self.user_category
            .clone()
            .ok_or_else(|| SyncError::source_error("catalog has no user_category"))
    }
}
