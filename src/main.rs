mod app;
mod commands;
mod config;
mod error;
mod fs;
mod loader;
mod logging;
mod outline;
mod providers;
mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::app::Explorer;
use crate::commands::{label_path, Command};
use crate::config::{AppConfig, GeneralConfig, PreviewConfig};
use crate::error::AppError;
use crate::fs::archive::ArchiveStore;
use crate::fs::backend::{Backend, LocalBackend};
use crate::fs::path::FsPath;
use crate::fs::tree::NodeId;
use crate::loader::{task_loader, CompletionQueue};
use crate::providers::preview::DefaultPreviewProvider;
use crate::providers::render::RendererRegistry;
use crate::providers::tree_data::{FsDataProvider, ListingOptions};

/// Browse a directory, zip archives included, as a lazily loaded tree.
#[derive(Parser, Debug)]
#[command(name = "fsx", version, about)]
struct Cli {
    /// Directory or archive to explore (defaults to the configured path, then ".")
    path: Option<PathBuf>,

    /// Levels to expand below the top node
    #[arg(long, default_value_t = 1)]
    depth: usize,

    /// Preview the node at this slash-separated label path, e.g. `a.zip/dir/c.txt`
    #[arg(long, value_name = "REL/PATH")]
    preview: Option<String>,

    /// Config file to load on top of the discovered ones
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show dot-files
    #[arg(long)]
    show_hidden: bool,

    /// Disable previews
    #[arg(long)]
    no_preview: bool,

    /// Read commands (`expand`, `select`, `reload`, ...) from stdin after printing
    #[arg(short, long)]
    interactive: bool,
}

impl Cli {
    fn overrides(&self) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                show_hidden: self.show_hidden.then_some(true),
                ..Default::default()
            },
            preview: PreviewConfig {
                enabled: self.no_preview.then_some(false),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();
    let (config, warnings) = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()))?;
    let _log_guard = logging::init(config.log_level(), config.log_file())?;
    for warning in &warnings {
        warn!("{warning}");
    }

    let requested = cli
        .path
        .clone()
        .or_else(|| config.general.default_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let path = requested
        .canonicalize()
        .map_err(|_| AppError::Path(format!("{} does not exist", requested.display())))?;
    let top_dir = FsPath::from_local(&path, path.is_dir());

    let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new());
    let archives = Arc::new(ArchiveStore::new(config.cache_prefix())?);
    let (loader, mut queue) = task_loader::<Explorer>(config.workers());
    let mut explorer = Explorer::new(loader, Arc::clone(&archives));

    if config.preview_enabled() {
        let renderers = RendererRegistry::with_defaults(Some(config.syntax_theme_name()), config.max_preview_bytes());
        explorer.set_preview_provider(
            Arc::new(DefaultPreviewProvider::new(
                Arc::clone(&backend),
                Arc::clone(&archives),
                renderers,
                config.max_preview_bytes(),
            )),
            Duration::from_millis(config.debounce_ms()),
        );
    }

    let provider = FsDataProvider::new(
        top_dir,
        backend,
        archives,
        ListingOptions {
            dirs_first: config.dirs_first(),
            show_hidden: config.show_hidden(),
        },
    );
    info!(
        path = %path.display(),
        workers = config.workers(),
        cache_dir = %explorer.archives().cache_dir().display(),
        "starting explorer"
    );

    let result = match explorer.reset_data_provider(Arc::new(provider)) {
        Some(top) => run(&mut explorer, &mut queue, top, &cli, config.preview_enabled()).await,
        None => Err(AppError::InternalState("tree has no root".into())),
    };
    explorer.dispose();
    result
}

async fn run(
    explorer: &mut Explorer,
    queue: &mut CompletionQueue<Explorer>,
    top: NodeId,
    cli: &Cli,
    preview_enabled: bool,
) -> error::Result<()> {
    explorer.expand_to_depth(queue, top, cli.depth).await;
    print_tree(explorer);
    report_status(explorer);

    if let Some(target) = cli.preview.as_deref() {
        if !preview_enabled {
            return Err(AppError::InternalState("previews are disabled".into()));
        }
        let node = find(explorer, queue, top, &label_path(target)).await?;
        select(explorer, queue, node).await;
        report_status(explorer);
    }
    if cli.interactive {
        interactive(explorer, queue, top).await?;
    }
    Ok(())
}

async fn interactive(explorer: &mut Explorer, queue: &mut CompletionQueue<Explorer>, top: NodeId) -> error::Result<()> {
    eprintln!("type `help` for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match command {
            Command::Quit => break,
            Command::Help => println!("{}", commands::HELP),
            Command::Tree => print_tree(explorer),
            Command::Expand(labels) => match find(explorer, queue, top, &labels).await {
                Ok(node) => {
                    if explorer.handle_expansion(node) {
                        queue.run_until_idle(explorer).await;
                    }
                    print_tree(explorer);
                }
                Err(e) => eprintln!("{e}"),
            },
            Command::Select(labels) => match find(explorer, queue, top, &labels).await {
                Ok(node) => select(explorer, queue, node).await,
                Err(e) => eprintln!("{e}"),
            },
            Command::Reload => reload(explorer, queue).await,
        }
        report_status(explorer);
    }
    Ok(())
}

async fn find(
    explorer: &mut Explorer,
    queue: &mut CompletionQueue<Explorer>,
    top: NodeId,
    labels: &[String],
) -> error::Result<NodeId> {
    let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
    explorer
        .reveal(queue, top, &labels)
        .await
        .ok_or_else(|| AppError::Path(format!("{} not found", labels.join("/"))))
}

/// Select `node` and print its preview once it has loaded.
async fn select(explorer: &mut Explorer, queue: &mut CompletionQueue<Explorer>, node: NodeId) {
    explorer.handle_selection(node);
    queue.run_until_idle(explorer).await;
    if !explorer.status().is_error() {
        print_preview(explorer);
    }
}

async fn reload(explorer: &mut Explorer, queue: &mut CompletionQueue<Explorer>) {
    let Some(id) = explorer.last_selected() else {
        eprintln!("nothing selected");
        return;
    };
    let Some(data) = explorer.model().ext_data(id).and_then(|ext| ext.node_data()).cloned() else {
        eprintln!("selection is gone");
        return;
    };
    if !explorer.reload_last_selected() {
        eprintln!("cannot reload {} while it loads", data.label());
        return;
    }
    queue.run_until_idle(explorer).await;
    if explorer.status().is_error() {
        return;
    }
    if data.target_kind().is_directory_like() {
        print_tree(explorer);
    } else {
        print_preview(explorer);
    }
    explorer.status_mut().set_message(format!("reloaded {}", data.label()));
}

fn print_tree(explorer: &Explorer) {
    for line in outline::render_lines(&explorer.model().flatten()) {
        println!("{line}");
    }
}

fn print_preview(explorer: &Explorer) {
    if let Some(preview) = explorer.preview() {
        println!();
        println!("── {} ──", preview.title);
        for line in preview.plain_lines() {
            println!("{line}");
        }
    }
}

fn report_status(explorer: &mut Explorer) {
    let status = explorer.status();
    if let Some(text) = status.text() {
        if status.is_error() {
            eprintln!("error: {text}");
        } else {
            eprintln!("{text}");
        }
    }
    explorer.status_mut().clear();
}
