//! Line commands understood by `fsx --interactive`.

use thiserror::Error;

pub const HELP: &str = "\
commands:
  tree               print the loaded tree
  expand [PATH]      load the children of a node (default: the top node)
  select PATH        preview a node
  reload             list or preview the last selected node again
  help               show this text
  quit               leave";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tree,
    Expand(Vec<String>),
    Select(Vec<String>),
    Reload,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("`{0}` needs a path")]
    MissingPath(&'static str),
}

/// Split a slash-separated label path such as `a.zip/dir/c.txt`.
///
/// Empty components are ignored, so `""` and `"/"` name the top node.
pub fn label_path(raw: &str) -> Vec<String> {
    raw.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Parse one line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word {
        "tree" | "ls" => Command::Tree,
        "expand" | "open" => Command::Expand(label_path(rest)),
        "select" | "show" => {
            if rest.is_empty() {
                return Err(CommandError::MissingPath("select"));
            }
            Command::Select(label_path(rest))
        }
        "reload" | "r" => Command::Reload,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}
