use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::fs::archive::ArchiveStore;
use crate::fs::tree::{DirTreeModel, NodeId, NodeKind, NodeStatus, EMPTY_LABEL, ERROR_LABEL};
use crate::loader::{CompletionQueue, TaskLoader};
use crate::providers::preview::{AsyncPreviewProvider, Preview, PreviewProvider};
use crate::providers::tree_data::{AsyncTreeDataProvider, TreeDataProvider, TreeNodeData};
use crate::status::StatusBar;

/// Status category for failed directory/archive listings.
pub const LOAD_FAILED: &str = "Failed to load data";
/// Status category for failed previews.
pub const PREVIEW_FAILED: &str = "Failed to load preview";

/// Interactive state of the explorer: the lazy tree, the status bar and the
/// current preview.
///
/// Every mutation happens on the thread draining the paired
/// [`CompletionQueue`]; background results arrive as callbacks on `&mut Explorer`.
pub struct Explorer {
    model: DirTreeModel,
    status: StatusBar,
    preview: Option<Preview>,
    tree_provider: Option<AsyncTreeDataProvider<Explorer>>,
    preview_provider: Option<AsyncPreviewProvider<Explorer>>,
    archives: Arc<ArchiveStore>,
    loader: TaskLoader<Explorer>,
    last_selected: Option<NodeId>,
}

impl Explorer {
    pub fn new(loader: TaskLoader<Explorer>, archives: Arc<ArchiveStore>) -> Self {
        Self {
            model: DirTreeModel::new(),
            status: StatusBar::new(),
            preview: None,
            tree_provider: None,
            preview_provider: None,
            archives,
            loader,
            last_selected: None,
        }
    }

    /// Enable previews, delaying each request by `debounce`.
    pub fn set_preview_provider(&mut self, provider: Arc<dyn PreviewProvider>, debounce: Duration) {
        if let Some(previous) = self.preview_provider.as_mut() {
            previous.cancel();
        }
        self.preview_provider = Some(AsyncPreviewProvider::new(provider, self.loader.clone(), debounce));
    }

    pub fn model(&self) -> &DirTreeModel {
        &self.model
    }

    pub fn status(&self) -> &StatusBar {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusBar {
        &mut self.status
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn last_selected(&self) -> Option<NodeId> {
        self.last_selected
    }

    pub fn archives(&self) -> &Arc<ArchiveStore> {
        &self.archives
    }

    /// Switch to a new data source: drop the whole tree and seed it with the
    /// provider's top node. Returns the top node.
    ///
    /// Loads still in flight for the old tree find their nodes gone and are
    /// ignored.
    pub fn reset_data_provider(&mut self, provider: Arc<dyn TreeDataProvider>) -> Option<NodeId> {
        if let Some(previews) = self.preview_provider.as_mut() {
            previews.cancel();
        }
        let root = self.model.root();
        self.model.remove_all_children(root);
        self.last_selected = None;
        self.preview = None;

        let async_provider = AsyncTreeDataProvider::new(provider, self.loader.clone());
        let top = async_provider.top_node();
        info!(top = %top.path(), "data provider reset");
        self.tree_provider = Some(async_provider);

        if top.target_kind().is_directory_like() {
            self.model.add_null_dir_child(root, top)
        } else {
            self.model.add_file_child(root, top)
        }
    }

    /// Start loading the children of an unloaded node.
    ///
    /// Returns false if nothing was requested: the node is gone, fake, already
    /// loaded or loading, or there is no data provider.
    pub fn handle_expansion(&mut self, id: NodeId) -> bool {
        let data = match self.model.ext_data(id) {
            Some(ext) if ext.kind() == NodeKind::Normal && ext.status() == NodeStatus::Null => {
                match ext.node_data() {
                    Some(data) => data.clone(),
                    None => return false,
                }
            }
            _ => return false,
        };
        let Some(provider) = self.tree_provider.as_ref() else {
            self.status.set_error_message(LOAD_FAILED, "internal error");
            return false;
        };

        self.model.set_status(id, NodeStatus::Loading);
        let task = provider.get_nodes_for(
            data,
            move |explorer: &mut Explorer, nodes| explorer.insert_contents(id, nodes),
            move |explorer: &mut Explorer, reason| explorer.handle_load_error(id, &reason),
        );
        debug!(?id, task = task.id(), "expansion requested");
        true
    }

    fn insert_contents(&mut self, id: NodeId, nodes: Vec<TreeNodeData>) {
        if !self.model.contains_node(id) {
            debug!(?id, "dropping listing for removed node");
            return;
        }
        self.model.remove_all_children(id);
        if nodes.is_empty() {
            self.model.add_fake_child(id, EMPTY_LABEL);
        }
        for node in nodes {
            if node.target_kind().is_directory_like() {
                self.model.add_null_dir_child(id, node);
            } else {
                self.model.add_file_child(id, node);
            }
        }
        self.model.set_status(id, NodeStatus::Loaded);
    }

    fn handle_load_error(&mut self, id: NodeId, reason: &str) {
        if !self.model.contains_node(id) {
            debug!(?id, reason, "dropping failure for removed node");
            return;
        }
        self.status.set_error_message(LOAD_FAILED, reason);
        self.model.remove_all_children(id);
        self.model.add_fake_child(id, ERROR_LABEL);
        self.model.set_status(id, NodeStatus::Loaded);
    }

    /// Remember the selection and request its preview.
    ///
    /// The previous preview stays visible until the new one arrives.
    pub fn handle_selection(&mut self, id: NodeId) {
        let data = match self.model.ext_data(id) {
            Some(ext) => ext.node_data().cloned(),
            None => return,
        };
        self.last_selected = Some(id);
        let (Some(data), Some(previews)) = (data, self.preview_provider.as_mut()) else {
            return;
        };
        previews.update_preview(
            data,
            |explorer: &mut Explorer, preview| explorer.preview = Some(preview),
            |explorer: &mut Explorer, reason| explorer.status.set_error_message(PREVIEW_FAILED, &reason),
        );
    }

    /// Refresh the last selected node: directories and archives are listed
    /// again, files previewed again.
    pub fn reload_last_selected(&mut self) -> bool {
        let Some(id) = self.last_selected else {
            return false;
        };
        let Some(ext) = self.model.ext_data(id) else {
            self.last_selected = None;
            return false;
        };
        let Some(data) = ext.node_data() else {
            return false;
        };

        if data.target_kind().is_directory_like() {
            if ext.status() == NodeStatus::Loading {
                return false;
            }
            self.model.remove_all_children(id);
            self.model.add_fake_child(id, "");
            self.model.set_status(id, NodeStatus::Null);
            self.handle_expansion(id)
        } else {
            self.handle_selection(id);
            true
        }
    }

    /// Expand every directory-like node up to `depth` levels below `start`,
    /// waiting for each level to load.
    pub async fn expand_to_depth(&mut self, queue: &mut CompletionQueue<Explorer>, start: NodeId, depth: usize) {
        let mut frontier = vec![start];
        for _ in 0..depth {
            for id in &frontier {
                self.handle_expansion(*id);
            }
            queue.run_until_idle(self).await;
            frontier = frontier
                .iter()
                .flat_map(|id| self.model.children(*id).to_vec())
                .filter(|child| {
                    self.model
                        .ext_data(*child)
                        .and_then(|ext| ext.node_data())
                        .is_some_and(|data| data.target_kind().is_directory_like())
                })
                .collect();
            if frontier.is_empty() {
                break;
            }
        }
    }

    /// Walk `labels` from `start`, loading each step on the way.
    pub async fn reveal(&mut self, queue: &mut CompletionQueue<Explorer>, start: NodeId, labels: &[&str]) -> Option<NodeId> {
        let mut current = start;
        for label in labels {
            if self.handle_expansion(current) {
                queue.run_until_idle(self).await;
            }
            current = self.model.find_child(current, label)?;
        }
        Some(current)
    }

    /// Stop pending previews and delete the archive scratch cache.
    pub fn dispose(&mut self) {
        if let Some(previews) = self.preview_provider.as_mut() {
            previews.cancel();
        }
        self.archives.dispose();
        info!("explorer disposed");
    }
}
