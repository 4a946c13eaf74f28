//! Account/contact tree browser. Publishes the picked node on the channel.

use std::rc::Rc;
use tracing::{debug, warn};

use crate::channel::{MessageChannel, Scope, Topic};
use crate::config::SyncConfig;
use crate::error::reduce_error;
use crate::notify::{Notification, Notifier};
use crate::resolver::{resolve, Selection, TreeSelectEvent};
use crate::source::{PermissionSource, TreeSource};
use crate::tree::{TreeIndex, TreeNode};

pub struct AccountBrowser {
    index: TreeIndex,
    channel: MessageChannel<Selection>,
    topic: Topic,
    origin: Scope,
    notifier: Rc<dyn Notifier>,
    selected: Option<Selection>,
    error: Option<Vec<String>>,
    user_category: Option<String>,
    empty_state_category: String,
}

impl AccountBrowser {
    pub fn new(
        channel: MessageChannel<Selection>,
        config: &SyncConfig,
        notifier: Rc<dyn Notifier>,
    ) -> Self {
        Self {
            index: TreeIndex::default(),
            channel,
            topic: config.topic(),
            origin: Scope::Application,
            notifier,
            selected: None,
            error: None,
            user_category: None,
            empty_state_category: config.empty_state_category.clone(),
        }
    }

    /// Publishes from a named UI region instead of application-wide.
    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.origin = Scope::Region(region.into());
        self
    }

    /// Loads (or reloads) the tree and the user's permission category. A tree
    /// failure leaves the index empty and raises one error notification.
    #[tracing::instrument(skip_all)]
    pub async fn load(&mut self, tree: &dyn TreeSource, permissions: &dyn PermissionSource) {
        match tree.load_tree().await {
            Ok(roots) => {
                self.index = TreeIndex::build(roots);
                self.error = None;
                debug!(nodes = self.index.len(), "tree loaded");
            }
            Err(err) => {
                let messages = reduce_error(&err);
                warn!(error = %err, "tree load failed");
                self.index = TreeIndex::default();
                self.notifier.notify(Notification::error(messages.join(", ")));
                self.error = Some(messages);
            }
        }

        self.user_category = match permissions.user_category().await {
            Ok(category) => Some(category),
            Err(err) => {
                warn!(error = %err, "permission check failed");
                None
            }
        };
    }

    /// Handles a tree `select` event. Returns the published selection, or
    /// `None` when the node is not in the current index.
    #[tracing::instrument(skip(self), fields(name = %event.detail.name))]
    pub fn handle_tree_select(&mut self, event: &TreeSelectEvent) -> Option<Selection> {
        let selection = match resolve(event, &self.index) {
            Ok(selection) => selection,
            Err(err) => {
                debug!(error = %err, "selection dropped");
                return None;
            }
        };

        let recipients = self
            .channel
            .publish(&self.origin, &self.topic, selection.clone());
        debug!(id = %selection.id, kind = %selection.kind, recipients, "selection published");
        self.selected = Some(selection.clone());
        Some(selection)
    }

    pub fn tree_items(&self) -> &[TreeNode] {
        self.index.roots()
    }

    pub fn index(&self) -> &TreeIndex {
        &self.index
    }

    pub fn selected(&self) -> Option<&Selection> {
        self.selected.as_ref()
    }

    pub fn error(&self) -> Option<&[String]> {
        self.error.as_deref()
    }

    pub fn user_category(&self) -> Option<&str> {
        self.user_category.as_deref()
    }

    /// Whether to show the "no accounts" state: the tree is empty and the user
    /// belongs to the configured category.
    pub fn show_no_accounts(&self) -> bool {
        self.index.is_empty()
            && self.error.is_none()
            && self.user_category.as_deref() == Some(self.empty_state_category.as_str())
    }
}
