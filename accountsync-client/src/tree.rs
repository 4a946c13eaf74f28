//! Account/contact tree and its read-only index.
//!
//! The tree is delivered by the tree source as nested items:
//!
//! ```text
//! { "name": "001A", "type": "Account", "label": "Acme", "items": [
//!     { "name": "003C", "type": "Contact", "label": "Jane Roe", "items": [] }
//! ] }
//! ```
//!
//! A `TreeIndex` is built once per load and replaced wholesale on reload.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Record category a tree node (and a fetched record) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Account,
    Contact,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Account => "Account",
            Kind::Contact => "Contact",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Account" | "account" => Ok(Kind::Account),
            "Contact" | "contact" => Ok(Kind::Contact),
            other => Err(format!("unknown record kind `{other}`")),
        }
    }
}

/// One entry of the catalog tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(rename = "name")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(rename = "items", default, deserialize_with = "null_as_default")]
    pub children: Vec<TreeNode>,
}

/// Tree sources send `null` for a missing label or for a leaf's items.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl TreeNode {
    pub fn new(id: impl Into<String>, kind: Kind) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Position of a node: child offsets from the root list downwards.
type NodePath = Vec<usize>;

/// Immutable index over a loaded tree.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    roots: Vec<TreeNode>,
    /// First depth-first occurrence of every id.
    by_id: HashMap<String, NodePath>,
}

impl TreeIndex {
    #[tracing::instrument(skip(roots), fields(root_count = roots.len()))]
    pub fn build(roots: Vec<TreeNode>) -> Self {
        let mut by_id = HashMap::new();
        let mut path = Vec::new();
        index_level(&roots, &mut path, &mut by_id);

        Self { roots, by_id }
    }

    /// Depth-first lookup. With duplicate ids the first depth-first match wins.
    pub fn find_by_id(&self, id: &str) -> Option<&TreeNode> {
        let path = self.by_id.get(id)?;
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get(*first)?;
        for &offset in rest {
            node = node.children.get(offset)?;
        }
        Some(node)
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    /// Number of distinct ids in the tree.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Nodes in depth-first order, children in given order.
    pub fn iter(&self) -> DepthFirst<'_> {
        DepthFirst {
            stack: self.roots.iter().rev().collect(),
        }
    }
}

fn index_level(nodes: &[TreeNode], path: &mut NodePath, by_id: &mut HashMap<String, NodePath>) {
    for (offset, node) in nodes.iter().enumerate() {
        path.push(offset);
        by_id.entry(node.id.clone()).or_insert_with(|| path.clone());
        index_level(&node.children, path, by_id);
        path.pop();
    }
}

pub struct DepthFirst<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
