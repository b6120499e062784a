//! Application configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--show-hidden`, `--no-preview`, ...)
//! 2. Explicit `--config FILE`
//! 3. `$FSX_CONFIG` environment variable (path to config file)
//! 4. Project-local `.fsx.toml` in the current working directory
//! 5. Global `~/.config/fsx/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::fs::archive::DEFAULT_CACHE_PREFIX;
use crate::loader::DEFAULT_WORKERS;
use crate::providers::render::{DEFAULT_MAX_PREVIEW_BYTES, DEFAULT_THEME};

// ── Section configs ──────────────────────────────────────────────────────────

/// General application settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Starting directory (overridden by CLI positional arg).
    pub default_path: Option<String>,
    /// Show hidden files by default.
    pub show_hidden: Option<bool>,
}

/// Tree panel settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeConfig {
    /// Directories and archives listed before files.
    pub dirs_first: Option<bool>,
}

/// Background loader settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum number of list/read operations running at once.
    pub workers: Option<usize>,
}

/// Preview panel settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: Option<bool>,
    /// Delay before a preview request starts, in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Bytes rendered before a text preview is cut off.
    pub max_preview_bytes: Option<usize>,
    /// Syntax highlighting theme (syntect theme name).
    pub syntax_theme: Option<String>,
}

/// Archive cache settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Name prefix of the scratch directory created under the system temp dir.
    pub cache_prefix: Option<String>,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `"info"` or `"fs_explorer=debug"`.
    pub level: Option<String>,
    /// Write logs to this file instead of stderr.
    pub file: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub tree: TreeConfig,
    pub loader: LoaderConfig,
    pub preview: PreviewConfig,
    pub archive: ArchiveConfig,
    pub logging: LoggingConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

/// Default preview debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;
/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "FSX_CONFIG";

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// The explicit `--config` path is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".fsx.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("fsx").join("config.toml"));
    }

    paths
}

/// Read and parse a TOML config file. `Ok(None)` if the file doesn't exist.
fn load_file(path: &Path) -> Result<Option<AppConfig>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AppError::Config(format!("{}: {}", path.display(), e))),
    };
    toml::from_str::<AppConfig>(&content)
        .map(Some)
        .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `Some` values in `other` win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                default_path: other
                    .general
                    .default_path
                    .clone()
                    .or(self.general.default_path),
                show_hidden: other.general.show_hidden.or(self.general.show_hidden),
            },
            tree: TreeConfig {
                dirs_first: other.tree.dirs_first.or(self.tree.dirs_first),
            },
            loader: LoaderConfig {
                workers: other.loader.workers.or(self.loader.workers),
            },
            preview: PreviewConfig {
                enabled: other.preview.enabled.or(self.preview.enabled),
                debounce_ms: other.preview.debounce_ms.or(self.preview.debounce_ms),
                max_preview_bytes: other
                    .preview
                    .max_preview_bytes
                    .or(self.preview.max_preview_bytes),
                syntax_theme: other
                    .preview
                    .syntax_theme
                    .clone()
                    .or(self.preview.syntax_theme),
            },
            archive: ArchiveConfig {
                cache_prefix: other
                    .archive
                    .cache_prefix
                    .clone()
                    .or(self.archive.cache_prefix),
            },
            logging: LoggingConfig {
                level: other.logging.level.clone().or(self.logging.level),
                file: other.logging.file.clone().or(self.logging.file),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`; it
    /// must exist and parse. Broken candidate files are skipped and reported
    /// in the returned warnings, since logging is not set up yet.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> Result<(AppConfig, Vec<String>)> {
        let mut config = AppConfig::default();
        let mut warnings = Vec::new();

        // Lowest priority first so higher overwrites.
        for path in candidate_paths().iter().rev() {
            match load_file(path) {
                Ok(Some(file_cfg)) => config = config.merge(&file_cfg),
                Ok(None) => {}
                Err(e) => warnings.push(format!("ignoring config file: {e}")),
            }
        }

        if let Some(cli_path) = cli_config_path {
            match load_file(cli_path)? {
                Some(file_cfg) => config = config.merge(&file_cfg),
                None => {
                    return Err(AppError::Config(format!(
                        "{} does not exist",
                        cli_path.display()
                    )))
                }
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        Ok((config, warnings))
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn show_hidden(&self) -> bool {
        self.general.show_hidden.unwrap_or(false)
    }

    pub fn dirs_first(&self) -> bool {
        self.tree.dirs_first.unwrap_or(true)
    }

    /// Worker-pool bound; never below one.
    pub fn workers(&self) -> usize {
        self.loader.workers.unwrap_or(DEFAULT_WORKERS).max(1)
    }

    pub fn preview_enabled(&self) -> bool {
        self.preview.enabled.unwrap_or(true)
    }

    pub fn debounce_ms(&self) -> u64 {
        self.preview.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    pub fn max_preview_bytes(&self) -> usize {
        self.preview
            .max_preview_bytes
            .unwrap_or(DEFAULT_MAX_PREVIEW_BYTES)
    }

    pub fn syntax_theme_name(&self) -> &str {
        self.preview.syntax_theme.as_deref().unwrap_or(DEFAULT_THEME)
    }

    pub fn cache_prefix(&self) -> &str {
        self.archive
            .cache_prefix
            .as_deref()
            .unwrap_or(DEFAULT_CACHE_PREFIX)
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.logging.file.as_deref().map(Path::new)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = AppConfig::default();
        assert!(!cfg.show_hidden());
        assert!(cfg.dirs_first());
        assert_eq!(cfg.workers(), 4);
        assert!(cfg.preview_enabled());
        assert_eq!(cfg.debounce_ms(), 100);
        assert_eq!(cfg.max_preview_bytes(), 1_048_576);
        assert_eq!(cfg.syntax_theme_name(), "base16-ocean.dark");
        assert_eq!(cfg.cache_prefix(), "ArchiveCache");
        assert_eq!(cfg.log_level(), "info");
        assert!(cfg.log_file().is_none());
    }

    #[test]
    fn test_toml_parsing_full() {
        let toml = r#"
[general]
default_path = "/srv/data"
show_hidden = true

[tree]
dirs_first = false

[loader]
workers = 8

[preview]
enabled = false
debounce_ms = 250
max_preview_bytes = 4096
syntax_theme = "Solarized (dark)"

[archive]
cache_prefix = "FsxCache"

[logging]
level = "fs_explorer=debug"
file = "/tmp/fsx.log"
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.general.default_path.as_deref(), Some("/srv/data"));
        assert!(cfg.show_hidden());
        assert!(!cfg.dirs_first());
        assert_eq!(cfg.workers(), 8);
        assert!(!cfg.preview_enabled());
        assert_eq!(cfg.debounce_ms(), 250);
        assert_eq!(cfg.max_preview_bytes(), 4096);
        assert_eq!(cfg.syntax_theme_name(), "Solarized (dark)");
        assert_eq!(cfg.cache_prefix(), "FsxCache");
        assert_eq!(cfg.log_level(), "fs_explorer=debug");
        assert_eq!(cfg.log_file(), Some(Path::new("/tmp/fsx.log")));
    }

    #[test]
    fn test_toml_parsing_partial() {
        let toml = r#"
[general]
show_hidden = true
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert!(cfg.show_hidden());
        assert!(cfg.dirs_first());
        assert_eq!(cfg.debounce_ms(), 100);
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let cfg: AppConfig = toml::from_str("[loader]\nworkers = 0\n").expect("parse failed");
        assert_eq!(cfg.workers(), 1);
    }

    #[test]
    fn test_merge_overrides() {
        let base = AppConfig {
            general: GeneralConfig {
                show_hidden: Some(false),
                ..Default::default()
            },
            preview: PreviewConfig {
                debounce_ms: Some(50),
                max_preview_bytes: Some(10),
                ..Default::default()
            },
            ..Default::default()
        };

        let over = AppConfig {
            general: GeneralConfig {
                show_hidden: Some(true),
                ..Default::default()
            },
            preview: PreviewConfig {
                debounce_ms: Some(500),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert!(merged.show_hidden());
        assert_eq!(merged.debounce_ms(), 500);
        assert_eq!(merged.max_preview_bytes(), 10);
    }

    #[test]
    fn test_merge_none_does_not_clear_some() {
        let base = AppConfig {
            logging: LoggingConfig {
                level: Some("warn".into()),
                file: Some("/tmp/x.log".into()),
            },
            ..Default::default()
        };
        let merged = base.merge(&AppConfig::default());
        assert_eq!(merged.log_level(), "warn");
        assert_eq!(merged.log_file(), Some(Path::new("/tmp/x.log")));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("test-config.toml");
        let mut f = std::fs::File::create(&cfg_path).expect("create");
        writeln!(
            f,
            r#"
[loader]
workers = 2

[archive]
cache_prefix = "Scratch"
"#
        )
        .expect("write");

        let cfg = load_file(&cfg_path).expect("load").expect("present");
        assert_eq!(cfg.workers(), 2);
        assert_eq!(cfg.cache_prefix(), "Scratch");
        assert_eq!(cfg.debounce_ms(), 100);
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let result = load_file(Path::new("/nonexistent/config.toml")).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "this is { not valid toml").expect("write");
        assert!(matches!(load_file(&cfg_path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_load_with_cli_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
[general]
show_hidden = true

[preview]
debounce_ms = 75
"#,
        )
        .expect("write");

        let cli_overrides = AppConfig {
            preview: PreviewConfig {
                debounce_ms: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };

        let (cfg, _) = AppConfig::load(Some(&cfg_path), Some(&cli_overrides)).expect("load");
        assert_eq!(cfg.debounce_ms(), 0);
        assert!(cfg.show_hidden());
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/fsx.toml")), None);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
