use std::sync::Arc;
use std::time::Duration;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use tracing::{debug, trace, warn};

use crate::fs::archive::ArchiveStore;
use crate::fs::backend::{Backend, FileHead};
use crate::fs::path::{TargetKind, VfsPath};
use crate::loader::{TaskHandle, TaskLoader};
use crate::providers::render::{format_size, ContentKind, RendererRegistry};
use crate::providers::tree_data::TreeNodeData;

/// Rendered preview of one node.
#[derive(Debug, Clone, Default)]
pub struct Preview {
    pub title: String,
    pub lines: Vec<Line<'static>>,
}

impl Preview {
    /// Plain text of every line, for non-styled output.
    pub fn plain_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }
}

/// Synchronous preview source. Calls may block.
pub trait PreviewProvider: Send + Sync {
    fn get_preview(&self, node: &TreeNodeData) -> Result<Preview, String>;
}

/// Reads the head of a file through the backend or archive store and
/// renders it with the first matching renderer.
///
/// One byte past `max_preview_bytes` is fetched so renderers can tell a
/// file that fits from one that was cut off.
pub struct DefaultPreviewProvider {
    backend: Arc<dyn Backend>,
    archives: Arc<ArchiveStore>,
    renderers: RendererRegistry,
    read_limit: u64,
}

impl DefaultPreviewProvider {
    pub fn new(
        backend: Arc<dyn Backend>,
        archives: Arc<ArchiveStore>,
        renderers: RendererRegistry,
        max_preview_bytes: usize,
    ) -> Self {
        Self {
            backend,
            archives,
            renderers,
            read_limit: max_preview_bytes as u64 + 1,
        }
    }

    fn read_head(&self, path: &VfsPath) -> Result<FileHead, String> {
        match path {
            VfsPath::Fs(p) => self
                .backend
                .read_head(p, self.read_limit)
                .map_err(|e| e.to_string()),
            VfsPath::ArchiveEntry(entry) => self
                .archives
                .read_entry(entry, self.backend.as_ref(), self.read_limit)
                .map_err(|e| {
                    if !e.is_not_found() {
                        warn!(entry = %entry, error = %e, "failed to read archive entry for preview");
                    }
                    e.to_string()
                }),
        }
    }

    /// Directory and archive summaries need no I/O.
    fn summary(&self, node: &TreeNodeData) -> Preview {
        let label_style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
        let kind = match node.target_kind() {
            TargetKind::Archive => "Archive",
            _ => "Directory",
        };
        let mut lines = vec![
            Line::from(""),
            Line::from(vec![
                Span::styled("  Name: ", label_style),
                Span::raw(node.label().to_string()),
            ]),
            Line::from(vec![
                Span::styled("  Type: ", label_style),
                Span::raw(kind),
            ]),
            Line::from(vec![
                Span::styled("  Path: ", label_style),
                Span::raw(node.path().to_string()),
            ]),
        ];
        if let VfsPath::Fs(archive) = node.path() {
            if let Some(handle) = self.archives.handle(archive) {
                lines.push(Line::from(vec![
                    Span::styled("  Entries: ", label_style),
                    Span::raw(handle.len().to_string()),
                ]));
            }
        }
        Preview {
            title: node.label().to_string(),
            lines,
        }
    }
}

impl PreviewProvider for DefaultPreviewProvider {
    fn get_preview(&self, node: &TreeNodeData) -> Result<Preview, String> {
        if node.target_kind().is_directory_like() {
            return Ok(self.summary(node));
        }
        let head = self.read_head(node.path())?;
        let kind = ContentKind::detect(node.label(), &head.bytes);
        let renderer = self
            .renderers
            .find(&kind)
            .ok_or_else(|| format!("no renderer for {}", node.label()))?;
        trace!(
            path = %node.path(),
            renderer = renderer.name(),
            truncated = head.is_truncated(),
            "rendering preview"
        );
        let lines = renderer.render(&kind, &head.bytes)?;
        Ok(Preview {
            title: format!("{} ({})", node.label(), format_size(head.total_len)),
            lines,
        })
    }
}

/// Debounced, superseding preview requests on the task loader.
///
/// Each request cancels the one before it, so only the latest selection is
/// ever delivered.
pub struct AsyncPreviewProvider<S> {
    provider: Arc<dyn PreviewProvider>,
    loader: TaskLoader<S>,
    delay: Duration,
    current: Option<TaskHandle>,
}

impl<S: 'static> AsyncPreviewProvider<S> {
    pub fn new(provider: Arc<dyn PreviewProvider>, loader: TaskLoader<S>, delay: Duration) -> Self {
        Self {
            provider,
            loader,
            delay,
            current: None,
        }
    }

    pub fn update_preview<OnOk, OnErr>(&mut self, node: TreeNodeData, on_complete: OnOk, on_fail: OnErr) -> TaskHandle
    where
        OnOk: FnOnce(&mut S, Preview) + Send + 'static,
        OnErr: FnOnce(&mut S, String) + Send + 'static,
    {
        self.cancel();
        debug!(path = %node.path(), "preview requested");
        let provider = Arc::clone(&self.provider);
        let delay = (!self.delay.is_zero()).then_some(self.delay);
        let handle = self
            .loader
            .submit(delay, move || provider.get_preview(&node), on_complete, on_fail);
        self.current = Some(handle.clone());
        handle
    }

    /// Cancel the pending request, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::archive::DEFAULT_CACHE_PREFIX;
    use crate::fs::backend::LocalBackend;
    use crate::fs::path::{ArchiveEntryPath, FsPath};
    use crate::fs::zip_reader::test_support::{zip_bytes, zip_claiming_size};
    use crate::loader::task_loader;
    use crate::providers::render::DEFAULT_MAX_PREVIEW_BYTES;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn provider_with_limit(max_bytes: usize) -> (Arc<ArchiveStore>, DefaultPreviewProvider) {
        let archives = Arc::new(ArchiveStore::new(DEFAULT_CACHE_PREFIX).unwrap());
        let provider = DefaultPreviewProvider::new(
            Arc::new(LocalBackend),
            Arc::clone(&archives),
            RendererRegistry::with_defaults(None, max_bytes),
            max_bytes,
        );
        (archives, provider)
    }

    fn provider() -> (Arc<ArchiveStore>, DefaultPreviewProvider) {
        provider_with_limit(DEFAULT_MAX_PREVIEW_BYTES)
    }

    #[test]
    fn previews_local_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "first\nsecond\n").unwrap();
        let (_archives, provider) = provider();

        let node = TreeNodeData::from_path(FsPath::from_local(&path, false));
        let preview = provider.get_preview(&node).unwrap();
        assert_eq!(preview.title, "notes.txt (13 B)");
        assert_eq!(preview.plain_lines(), vec!["1 │ first", "2 │ second"]);
    }

    #[test]
    fn previews_archive_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.zip");
        fs::write(&path, zip_bytes(&[("c.txt", b"hello")])).unwrap();
        let (archives, provider) = provider();
        let archive = FsPath::from_local(&path, false);
        archives.open_or_get(&archive, &LocalBackend).unwrap();

        let entry = ArchiveEntryPath::from_entry(archive, "c.txt", TargetKind::File);
        let preview = provider.get_preview(&TreeNodeData::from_path(entry)).unwrap();
        assert_eq!(preview.plain_lines(), vec!["1 │ hello"]);
    }

    #[test]
    fn large_file_is_fetched_only_up_to_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.log");
        fs::write(&path, "line\n".repeat(400)).unwrap();
        let (_archives, provider) = provider_with_limit(10);

        let node = TreeNodeData::from_path(FsPath::from_local(&path, false));
        let preview = provider.get_preview(&node).unwrap();
        assert_eq!(preview.title, "big.log (1.95 KB)");
        let lines = preview.plain_lines();
        assert_eq!(&lines[..2], &["1 │ line", "2 │ line"]);
        assert!(lines.last().unwrap().contains("truncated"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn entry_with_lying_size_previews_real_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("liar.zip");
        fs::write(&path, zip_claiming_size("big.txt", b"hi", 1 << 42)).unwrap();
        let (archives, provider) = provider();
        let archive = FsPath::from_local(&path, false);
        archives.open_or_get(&archive, &LocalBackend).unwrap();

        let entry = ArchiveEntryPath::from_entry(archive, "big.txt", TargetKind::File);
        let preview = provider.get_preview(&TreeNodeData::from_path(entry)).unwrap();
        assert_eq!(preview.title, "big.txt (2 B)");
        assert_eq!(preview.plain_lines(), vec!["1 │ hi"]);
    }

    #[test]
    fn directory_summary_needs_no_io() {
        let (_archives, provider) = provider();
        let node = TreeNodeData::from_path(FsPath::new("/does/not/exist", true, "exist"));
        let preview = provider.get_preview(&node).unwrap();
        assert!(preview.plain_lines().iter().any(|l| l.contains("Directory")));
    }

    #[test]
    fn opened_archive_summary_counts_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.zip");
        fs::write(&path, zip_bytes(&[("x.txt", b"x"), ("y.txt", b"y")])).unwrap();
        let (archives, provider) = provider();
        let archive = FsPath::from_local(&path, false);
        archives.open_or_get(&archive, &LocalBackend).unwrap();

        let preview = provider.get_preview(&TreeNodeData::from_path(archive)).unwrap();
        let lines = preview.plain_lines();
        assert!(lines.iter().any(|l| l.contains("Archive")));
        assert!(lines.iter().any(|l| l.ends_with("Entries: 2")));
    }

    #[test]
    fn missing_file_fails_with_reason() {
        let (_archives, provider) = provider();
        let node = TreeNodeData::from_path(FsPath::new("/definitely/missing.txt", false, "missing.txt"));
        let reason = provider.get_preview(&node).unwrap_err();
        assert!(reason.starts_with("not found"));
    }

    /// Records which nodes were actually fetched.
    struct RecordingProvider {
        fetched: Mutex<Vec<String>>,
    }

    impl PreviewProvider for RecordingProvider {
        fn get_preview(&self, node: &TreeNodeData) -> Result<Preview, String> {
            self.fetched.lock().unwrap().push(node.label().to_string());
            Ok(Preview {
                title: node.label().to_string(),
                lines: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn newer_selection_supersedes_pending_one() {
        let recorder = Arc::new(RecordingProvider {
            fetched: Mutex::new(Vec::new()),
        });
        let (loader, mut queue) = task_loader::<Vec<String>>(2);
        let mut previews = AsyncPreviewProvider::new(
            Arc::clone(&recorder) as Arc<dyn PreviewProvider>,
            loader,
            Duration::from_millis(50),
        );

        let node = |name: &str| TreeNodeData::from_path(FsPath::new(format!("/{name}"), false, name));
        let first = previews.update_preview(
            node("a.txt"),
            |shown: &mut Vec<String>, p| shown.push(p.title),
            |_: &mut Vec<String>, _| {},
        );
        previews.update_preview(
            node("b.txt"),
            |shown: &mut Vec<String>, p| shown.push(p.title),
            |_: &mut Vec<String>, _| {},
        );
        assert!(first.is_cancelled());

        let mut shown = Vec::new();
        queue.run_until_idle(&mut shown).await;
        assert_eq!(shown, vec!["b.txt"]);
        assert_eq!(*recorder.fetched.lock().unwrap(), vec!["b.txt"]);
    }

    #[tokio::test]
    async fn cancel_drops_pending_preview() {
        let recorder = Arc::new(RecordingProvider {
            fetched: Mutex::new(Vec::new()),
        });
        let (loader, mut queue) = task_loader::<Vec<String>>(1);
        let mut previews = AsyncPreviewProvider::new(recorder, loader, Duration::from_millis(20));
        previews.update_preview(
            TreeNodeData::from_path(FsPath::new("/a", false, "a")),
            |shown: &mut Vec<String>, p| shown.push(p.title),
            |_: &mut Vec<String>, _| {},
        );
        previews.cancel();

        let mut shown = Vec::new();
        queue.run_until_idle(&mut shown).await;
        assert!(shown.is_empty());
    }
}
