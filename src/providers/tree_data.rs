use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::fs::archive::ArchiveStore;
use crate::fs::backend::Backend;
use crate::fs::path::{FsPath, TargetKind, VfsPath};
use crate::loader::{TaskHandle, TaskLoader};

/// The datum behind a normal tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNodeData {
    label: String,
    path: VfsPath,
}

impl TreeNodeData {
    pub fn new(label: impl Into<String>, path: VfsPath) -> Self {
        Self {
            label: label.into(),
            path,
        }
    }

    /// Node labelled with the last component of its path.
    pub fn from_path(path: impl Into<VfsPath>) -> Self {
        let path = path.into();
        let label = path.last_component().to_string();
        Self::new(label, path)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> &VfsPath {
        &self.path
    }

    pub fn target_kind(&self) -> TargetKind {
        self.path.target_kind()
    }
}

impl fmt::Display for TreeNodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Synchronous source of tree nodes. Calls may block.
pub trait TreeDataProvider: Send + Sync {
    /// The node shown directly under the tree root.
    fn top_node(&self) -> TreeNodeData;

    /// Children of a directory-like node, or a human-readable failure reason.
    fn nodes_for(&self, node: &TreeNodeData) -> Result<Vec<TreeNodeData>, String>;
}

/// Listing rules applied to every provider result.
#[derive(Debug, Clone, Copy)]
pub struct ListingOptions {
    pub dirs_first: bool,
    pub show_hidden: bool,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            dirs_first: true,
            show_hidden: false,
        }
    }
}

/// Provider over a backend, descending into archives through the store.
pub struct FsDataProvider {
    top_dir: FsPath,
    backend: Arc<dyn Backend>,
    archives: Arc<ArchiveStore>,
    options: ListingOptions,
}

impl FsDataProvider {
    pub fn new(top_dir: FsPath, backend: Arc<dyn Backend>, archives: Arc<ArchiveStore>, options: ListingOptions) -> Self {
        Self {
            top_dir,
            backend,
            archives,
            options,
        }
    }

    fn list(&self, path: &VfsPath) -> Result<Vec<TreeNodeData>, String> {
        let backend = self.backend.as_ref();
        let nodes: Vec<TreeNodeData> = match path {
            VfsPath::Fs(dir) => match dir.target_kind() {
                TargetKind::Directory => backend
                    .list(dir)
                    .map_err(|e| e.to_string())?
                    .into_iter()
                    .map(TreeNodeData::from_path)
                    .collect(),
                TargetKind::Archive => self
                    .archives
                    .list_archive(dir, backend)
                    .map_err(|e| e.to_string())?
                    .into_iter()
                    .map(TreeNodeData::from_path)
                    .collect(),
                TargetKind::File => return Err(format!("not a directory: {dir}")),
            },
            VfsPath::ArchiveEntry(entry) => self
                .archives
                .list_entry(entry, backend)
                .map_err(|e| e.to_string())?
                .into_iter()
                .map(TreeNodeData::from_path)
                .collect(),
        };
        Ok(self.arrange(nodes))
    }

    fn arrange(&self, mut nodes: Vec<TreeNodeData>) -> Vec<TreeNodeData> {
        if !self.options.show_hidden {
            nodes.retain(|n| !n.label().starts_with('.'));
        }
        let dirs_first = self.options.dirs_first;
        nodes.sort_by(|a, b| compare_nodes(a, b, dirs_first));
        nodes
    }
}

/// Directory-like entries first (optionally), then case-insensitive by label.
fn compare_nodes(a: &TreeNodeData, b: &TreeNodeData, dirs_first: bool) -> Ordering {
    let by_kind = if dirs_first {
        b.target_kind()
            .is_directory_like()
            .cmp(&a.target_kind().is_directory_like())
    } else {
        Ordering::Equal
    };
    by_kind
        .then_with(|| a.label().to_lowercase().cmp(&b.label().to_lowercase()))
        .then_with(|| a.label().cmp(b.label()))
}

impl TreeDataProvider for FsDataProvider {
    fn top_node(&self) -> TreeNodeData {
        let label = match self.top_dir.last_component() {
            "" => self.top_dir.path(),
            name => name,
        };
        TreeNodeData::new(label, VfsPath::Fs(self.top_dir.clone()))
    }

    fn nodes_for(&self, node: &TreeNodeData) -> Result<Vec<TreeNodeData>, String> {
        match self.list(node.path()) {
            Ok(nodes) => {
                debug!(path = %node.path(), count = nodes.len(), "listed node");
                Ok(nodes)
            }
            Err(reason) => {
                warn!(path = %node.path(), %reason, "failed to list node");
                Err(reason)
            }
        }
    }
}

/// Runs a [`TreeDataProvider`] on the task loader.
pub struct AsyncTreeDataProvider<S> {
    provider: Arc<dyn TreeDataProvider>,
    loader: TaskLoader<S>,
}

impl<S: 'static> AsyncTreeDataProvider<S> {
    pub fn new(provider: Arc<dyn TreeDataProvider>, loader: TaskLoader<S>) -> Self {
        Self { provider, loader }
    }

    pub fn top_node(&self) -> TreeNodeData {
        self.provider.top_node()
    }

    /// List `node` in the background; exactly one callback runs unless the
    /// returned handle is cancelled first.
    pub fn get_nodes_for<OnOk, OnErr>(&self, node: TreeNodeData, on_complete: OnOk, on_fail: OnErr) -> TaskHandle
    where
        OnOk: FnOnce(&mut S, Vec<TreeNodeData>) + Send + 'static,
        OnErr: FnOnce(&mut S, String) + Send + 'static,
    {
        let provider = Arc::clone(&self.provider);
        debug!(path = %node.path(), "requesting children");
        self.loader
            .submit(None, move || provider.nodes_for(&node), on_complete, on_fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::archive::DEFAULT_CACHE_PREFIX;
    use crate::fs::backend::LocalBackend;
    use crate::fs::zip_reader::test_support::zip_bytes;
    use crate::loader::task_loader;
    use std::fs;
    use tempfile::TempDir;

    /// root/{ beta/, Alpha/, .hidden, b.txt, A.txt, pack.zip = { dir/b.zip = { c.txt } } }
    fn setup() -> (TempDir, FsDataProvider) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("beta")).unwrap();
        fs::create_dir(dir.path().join("Alpha")).unwrap();
        fs::write(dir.path().join(".hidden"), "x").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("A.txt"), "a").unwrap();
        let inner = zip_bytes(&[("c.txt", b"hello")]);
        fs::write(
            dir.path().join("pack.zip"),
            zip_bytes(&[("dir/", b""), ("dir/b.zip", &inner)]),
        )
        .unwrap();

        let provider = FsDataProvider::new(
            FsPath::from_local(dir.path(), true),
            Arc::new(LocalBackend),
            Arc::new(ArchiveStore::new(DEFAULT_CACHE_PREFIX).unwrap()),
            ListingOptions::default(),
        );
        (dir, provider)
    }

    fn labels(nodes: &[TreeNodeData]) -> Vec<&str> {
        nodes.iter().map(|n| n.label()).collect()
    }

    #[test]
    fn lists_dirs_first_and_skips_hidden() {
        let (_dir, provider) = setup();
        let nodes = provider.nodes_for(&provider.top_node()).unwrap();
        assert_eq!(labels(&nodes), vec!["Alpha", "beta", "pack.zip", "A.txt", "b.txt"]);
        assert_eq!(nodes[2].target_kind(), TargetKind::Archive);
    }

    #[test]
    fn show_hidden_and_mixed_order() {
        let (dir, _) = setup();
        let provider = FsDataProvider::new(
            FsPath::from_local(dir.path(), true),
            Arc::new(LocalBackend),
            Arc::new(ArchiveStore::new(DEFAULT_CACHE_PREFIX).unwrap()),
            ListingOptions {
                dirs_first: false,
                show_hidden: true,
            },
        );
        let nodes = provider.nodes_for(&provider.top_node()).unwrap();
        assert_eq!(
            labels(&nodes),
            vec![".hidden", "A.txt", "Alpha", "b.txt", "beta", "pack.zip"]
        );
    }

    #[test]
    fn descends_into_nested_archives() {
        let (_dir, provider) = setup();
        let top = provider.nodes_for(&provider.top_node()).unwrap();
        let pack = top.iter().find(|n| n.label() == "pack.zip").unwrap();

        let in_pack = provider.nodes_for(pack).unwrap();
        assert_eq!(labels(&in_pack), vec!["dir"]);
        let in_dir = provider.nodes_for(&in_pack[0]).unwrap();
        assert_eq!(labels(&in_dir), vec!["b.zip"]);
        let in_b = provider.nodes_for(&in_dir[0]).unwrap();
        assert_eq!(labels(&in_b), vec!["c.txt"]);
        assert_eq!(in_b[0].target_kind(), TargetKind::File);
    }

    #[test]
    fn listing_a_file_fails_with_reason() {
        let (_dir, provider) = setup();
        let top = provider.nodes_for(&provider.top_node()).unwrap();
        let file = top.iter().find(|n| n.label() == "b.txt").unwrap();
        let reason = provider.nodes_for(file).unwrap_err();
        assert!(reason.starts_with("not a directory"));
    }

    #[test]
    fn broken_archive_fails_with_reason() {
        let (dir, provider) = setup();
        let path = dir.path().join("broken.zip");
        fs::write(&path, "not a zip").unwrap();
        let node = TreeNodeData::from_path(FsPath::from_local(&path, false));
        let reason = provider.nodes_for(&node).unwrap_err();
        assert!(reason.contains("failed to open archive"));
    }

    #[test]
    fn top_node_uses_directory_name() {
        let (dir, provider) = setup();
        let top = provider.top_node();
        assert_eq!(top.label(), dir.path().file_name().unwrap().to_str().unwrap());
        assert_eq!(top.target_kind(), TargetKind::Directory);
    }

    #[tokio::test]
    async fn async_listing_delivers_children() {
        let (_dir, provider) = setup();
        let (loader, mut queue) = task_loader::<Vec<String>>(2);
        let async_provider = AsyncTreeDataProvider::new(Arc::new(provider), loader);

        let mut seen: Vec<String> = Vec::new();
        async_provider.get_nodes_for(
            async_provider.top_node(),
            |seen: &mut Vec<String>, nodes| seen.extend(nodes.iter().map(|n| n.label().to_string())),
            |seen: &mut Vec<String>, reason| seen.push(format!("error: {reason}")),
        );
        queue.run_until_idle(&mut seen).await;
        assert_eq!(seen, vec!["Alpha", "beta", "pack.zip", "A.txt", "b.txt"]);
    }
}
