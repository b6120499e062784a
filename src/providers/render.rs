use std::fmt::Write as _;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;

/// Default number of bytes rendered before a preview is cut off (1 MB).
pub const DEFAULT_MAX_PREVIEW_BYTES: usize = 1_048_576;
/// Theme used when the configured one is unknown.
pub const DEFAULT_THEME: &str = "base16-ocean.dark";
/// Bytes inspected when sniffing for binary content.
const SNIFF_BYTES: usize = 8192;
/// Bytes shown in a binary hex dump.
const HEX_DUMP_BYTES: usize = 256;

/// Known binary file extensions.
const BINARY_EXTENSIONS: &[&str] = &[
    "pt", "pth", "h5", "hdf5", "pkl", "pickle", "onnx", "zip", "jar", "tar", "gz", "bz2", "xz",
    "so", "dylib", "exe", "bin", "img", "iso", "png", "jpg", "jpeg", "gif", "class", "pdf",
];

/// What kind of content a file holds, as far as previewing is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// Text to highlight with the named syntax.
    Text { syntax: &'static str },
    Binary,
}

impl ContentKind {
    /// Classify a file by its name and its first bytes.
    ///
    /// Known binary extensions win; otherwise a NUL byte in the first 8 KiB
    /// marks the content as binary.
    pub fn detect(file_name: &str, bytes: &[u8]) -> Self {
        let ext = extension(file_name);
        if let Some(ext) = ext {
            if BINARY_EXTENSIONS.iter().any(|b| b.eq_ignore_ascii_case(ext)) {
                return ContentKind::Binary;
            }
        }
        let head = &bytes[..bytes.len().min(SNIFF_BYTES)];
        if head.contains(&0) {
            return ContentKind::Binary;
        }
        let syntax = match ext {
            Some(ext) => detect_syntax_name(ext),
            None => detect_from_shebang(head),
        };
        ContentKind::Text { syntax }
    }
}

fn extension(file_name: &str) -> Option<&str> {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Syntax name for a file extension.
pub fn detect_syntax_name(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "py" | "ipynb" => "Python",
        "rs" => "Rust",
        "yaml" | "yml" => "YAML",
        "json" => "JSON",
        "toml" => "TOML",
        "sh" | "bash" | "zsh" => "Bash",
        "sql" => "SQL",
        "md" | "markdown" => "Markdown",
        "html" | "htm" => "HTML",
        "css" => "CSS",
        "js" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "c" | "h" => "C",
        "cpp" | "hpp" | "cc" => "C++",
        "java" => "Java",
        "xml" | "pom" => "XML",
        "go" => "Go",
        "rb" => "Ruby",
        _ => "Plain Text",
    }
}

/// Syntax from a shebang line, for extensionless files.
fn detect_from_shebang(head: &[u8]) -> &'static str {
    let first_line = head.split(|b| *b == b'\n').next().unwrap_or_default();
    if !first_line.starts_with(b"#!") {
        return "Plain Text";
    }
    let line = String::from_utf8_lossy(first_line).to_lowercase();
    if line.contains("python") {
        "Python"
    } else if line.contains("bash") || line.contains("/sh") {
        "Bash"
    } else if line.contains("ruby") {
        "Ruby"
    } else if line.contains("node") || line.contains("deno") {
        "JavaScript"
    } else if line.contains("perl") {
        "Perl"
    } else {
        "Plain Text"
    }
}

/// Load a theme from the built-in theme set by name, with fallback.
pub fn load_theme(theme_name: Option<&str>) -> Theme {
    let mut themes = ThemeSet::load_defaults().themes;
    let name = theme_name.unwrap_or(DEFAULT_THEME);
    match themes.remove(name) {
        Some(theme) => theme,
        None => themes.remove(DEFAULT_THEME).unwrap_or_default(),
    }
}

fn syntect_color_to_ratatui(c: syntect::highlighting::Color) -> Color {
    Color::Rgb(c.r, c.g, c.b)
}

/// Format bytes into human-readable size string.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Turns the raw bytes of one content kind into display lines.
pub trait PreviewRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, kind: &ContentKind) -> bool;

    fn render(&self, kind: &ContentKind, bytes: &[u8]) -> Result<Vec<Line<'static>>, String>;
}

/// Syntax-highlighted text with line numbers.
pub struct TextRenderer {
    syntaxes: SyntaxSet,
    theme: Theme,
    max_bytes: usize,
}

impl TextRenderer {
    pub fn new(theme_name: Option<&str>, max_bytes: usize) -> Self {
        Self {
            syntaxes: SyntaxSet::load_defaults_nonewlines(),
            theme: load_theme(theme_name),
            max_bytes,
        }
    }
}

impl PreviewRenderer for TextRenderer {
    fn name(&self) -> &'static str {
        "text"
    }

    fn can_handle(&self, kind: &ContentKind) -> bool {
        matches!(kind, ContentKind::Text { .. })
    }

    fn render(&self, kind: &ContentKind, bytes: &[u8]) -> Result<Vec<Line<'static>>, String> {
        let syntax_name = match kind {
            ContentKind::Text { syntax } => *syntax,
            ContentKind::Binary => return Err("binary content passed to text renderer".into()),
        };
        let truncated = bytes.len() > self.max_bytes;
        let content = String::from_utf8_lossy(&bytes[..bytes.len().min(self.max_bytes)]);

        let syntax = self
            .syntaxes
            .find_syntax_by_name(syntax_name)
            .unwrap_or_else(|| self.syntaxes.find_syntax_plain_text());
        let mut highlighter = HighlightLines::new(syntax, &self.theme);

        let lines_text: Vec<&str> = content.lines().collect();
        let line_num_width = lines_text.len().max(1).to_string().len();
        let mut result_lines = Vec::with_capacity(lines_text.len() + 1);
        for (i, line_str) in lines_text.iter().enumerate() {
            let mut spans: Vec<Span<'static>> = Vec::new();
            let num = format!("{:>width$} │ ", i + 1, width = line_num_width);
            spans.push(Span::styled(num, Style::default().fg(Color::DarkGray)));

            match highlighter.highlight_line(line_str, &self.syntaxes) {
                Ok(ranges) => {
                    for (style, text) in ranges {
                        let fg = syntect_color_to_ratatui(style.foreground);
                        spans.push(Span::styled(text.to_string(), Style::default().fg(fg)));
                    }
                }
                Err(_) => spans.push(Span::raw(line_str.to_string())),
            }
            result_lines.push(Line::from(spans));
        }

        if result_lines.is_empty() {
            result_lines.push(Line::from(Span::styled(
                "(empty file)",
                Style::default().fg(Color::DarkGray),
            )));
        }
        if truncated {
            result_lines.push(Line::from(Span::styled(
                format!("  ──── truncated at {} ────", format_size(self.max_bytes as u64)),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::DIM),
            )));
        }
        Ok(result_lines)
    }
}

/// Hex dump of the first bytes.
pub struct BinaryRenderer {
    dump_bytes: usize,
}

impl Default for BinaryRenderer {
    fn default() -> Self {
        Self {
            dump_bytes: HEX_DUMP_BYTES,
        }
    }
}

impl PreviewRenderer for BinaryRenderer {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn can_handle(&self, kind: &ContentKind) -> bool {
        *kind == ContentKind::Binary
    }

    fn render(&self, _kind: &ContentKind, bytes: &[u8]) -> Result<Vec<Line<'static>>, String> {
        let dim_style = Style::default().fg(Color::DarkGray);

        let mut lines = Vec::new();
        for (row, chunk) in bytes[..bytes.len().min(self.dump_bytes)].chunks(16).enumerate() {
            lines.push(Line::from(vec![
                Span::styled(format!("  {:08x}  ", row * 16), dim_style),
                Span::raw(hex_row(chunk)),
            ]));
        }
        if bytes.len() > self.dump_bytes {
            lines.push(Line::from(Span::styled("  …", dim_style)));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("  [Binary file]", dim_style)));
        Ok(lines)
    }
}

/// `48 65 6c 6c 6f ...  |Hello...|`
fn hex_row(chunk: &[u8]) -> String {
    let mut out = String::with_capacity(16 * 4 + 4);
    for i in 0..16 {
        match chunk.get(i) {
            Some(b) => {
                let _ = write!(out, "{b:02x} ");
            }
            None => out.push_str("   "),
        }
    }
    out.push_str(" |");
    out.extend(chunk.iter().map(|b| {
        if b.is_ascii_graphic() || *b == b' ' {
            *b as char
        } else {
            '.'
        }
    }));
    out.push('|');
    out
}

/// Ordered set of renderers; the first one accepting a content kind wins.
#[derive(Default)]
pub struct RendererRegistry {
    renderers: Vec<Box<dyn PreviewRenderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text and binary renderers.
    pub fn with_defaults(theme_name: Option<&str>, max_bytes: usize) -> Self {
        let mut registry = Self::new();
        registry.register(Box::<BinaryRenderer>::default());
        registry.register(Box::new(TextRenderer::new(theme_name, max_bytes)));
        registry
    }

    /// Add a renderer ahead of those already registered.
    pub fn register(&mut self, renderer: Box<dyn PreviewRenderer>) {
        self.renderers.insert(0, renderer);
    }

    pub fn find(&self, kind: &ContentKind) -> Option<&dyn PreviewRenderer> {
        self.renderers
            .iter()
            .find(|r| r.can_handle(kind))
            .map(|r| r.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn detect_syntax_by_extension() {
        assert_eq!(detect_syntax_name("rs"), "Rust");
        assert_eq!(detect_syntax_name("py"), "Python");
        assert_eq!(detect_syntax_name("yml"), "YAML");
        assert_eq!(detect_syntax_name("TOML"), "TOML");
        assert_eq!(detect_syntax_name("xyz"), "Plain Text");
    }

    #[test]
    fn detect_text_and_binary() {
        assert_eq!(
            ContentKind::detect("main.rs", b"fn main() {}"),
            ContentKind::Text { syntax: "Rust" }
        );
        assert_eq!(ContentKind::detect("model.onnx", b"plain"), ContentKind::Binary);
        assert_eq!(ContentKind::detect("data.txt", b"ab\0cd"), ContentKind::Binary);
    }

    #[test]
    fn nul_after_sniff_window_is_still_text() {
        let mut bytes = vec![b'a'; SNIFF_BYTES];
        bytes.push(0);
        assert_eq!(
            ContentKind::detect("big.txt", &bytes),
            ContentKind::Text { syntax: "Plain Text" }
        );
    }

    #[test]
    fn detect_shebang() {
        assert_eq!(
            ContentKind::detect("run", b"#!/usr/bin/env python3\nprint(1)\n"),
            ContentKind::Text { syntax: "Python" }
        );
        assert_eq!(
            ContentKind::detect("build", b"#!/bin/sh\necho hi\n"),
            ContentKind::Text { syntax: "Bash" }
        );
        assert_eq!(
            ContentKind::detect("notes", b"just some text"),
            ContentKind::Text { syntax: "Plain Text" }
        );
    }

    #[test]
    fn load_theme_invalid_falls_back() {
        let theme = load_theme(Some("nonexistent-theme"));
        assert!(!theme.scopes.is_empty() || theme.settings.background.is_some());
    }

    #[test]
    fn text_renderer_numbers_lines() {
        let renderer = TextRenderer::new(None, DEFAULT_MAX_PREVIEW_BYTES);
        let kind = ContentKind::Text { syntax: "Rust" };
        let lines = renderer
            .render(&kind, b"fn main() {\n    println!(\"hi\");\n}\n")
            .unwrap();
        assert_eq!(lines.len(), 3);
        assert!(line_text(&lines[0]).starts_with("1 │ fn main"));
        assert!(line_text(&lines[1]).contains("println!"));
    }

    #[test]
    fn text_renderer_truncates() {
        let renderer = TextRenderer::new(None, 8);
        let kind = ContentKind::Text { syntax: "Plain Text" };
        let lines = renderer.render(&kind, b"line one\nline two\nline three\n").unwrap();
        assert!(line_text(&lines[0]).ends_with("line one"));
        assert!(line_text(lines.last().unwrap()).contains("truncated"));
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn text_renderer_empty_file() {
        let renderer = TextRenderer::new(None, DEFAULT_MAX_PREVIEW_BYTES);
        let lines = renderer
            .render(&ContentKind::Text { syntax: "Plain Text" }, b"")
            .unwrap();
        assert_eq!(line_text(&lines[0]), "(empty file)");
    }

    #[test]
    fn binary_renderer_dumps_hex() {
        let lines = BinaryRenderer::default()
            .render(&ContentKind::Binary, b"Hello\0")
            .unwrap();
        let dump = line_text(&lines[0]);
        assert!(dump.contains("48 65 6c 6c 6f 00"));
        assert!(dump.ends_with("|Hello.|"));
    }

    #[test]
    fn registry_picks_first_match() {
        struct Loud;
        impl PreviewRenderer for Loud {
            fn name(&self) -> &'static str {
                "loud"
            }
            fn can_handle(&self, kind: &ContentKind) -> bool {
                matches!(kind, ContentKind::Text { .. })
            }
            fn render(&self, _: &ContentKind, _: &[u8]) -> Result<Vec<Line<'static>>, String> {
                Ok(vec![Line::from("LOUD")])
            }
        }

        let mut registry = RendererRegistry::with_defaults(None, 64);
        let text = ContentKind::Text { syntax: "Plain Text" };
        assert_eq!(registry.find(&text).unwrap().name(), "text");
        assert_eq!(registry.find(&ContentKind::Binary).unwrap().name(), "binary");

        registry.register(Box::new(Loud));
        assert_eq!(registry.find(&text).unwrap().name(), "loud");
        assert_eq!(registry.find(&ContentKind::Binary).unwrap().name(), "binary");
    }

    #[test]
    fn empty_registry_finds_nothing() {
        assert!(RendererRegistry::new().find(&ContentKind::Binary).is_none());
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1_048_576), "1.00 MB");
    }
}
