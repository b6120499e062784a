//! Plain-text rendering of the tree for the headless binary.

use crate::fs::path::TargetKind;
use crate::fs::tree::{FlatItem, NodeStatus};

/// Build the prefix string for tree indentation using box-drawing characters.
///
/// Depth 0 has no connector; deeper rows draw a continuation bar for every
/// ancestor that still has siblings below it.
fn build_prefix(item: &FlatItem, items: &[FlatItem], item_index: usize) -> String {
    if item.depth == 0 {
        return String::new();
    }

    let mut parts: Vec<&str> = Vec::new();
    for d in 1..item.depth {
        let mut ancestor_is_last = false;
        for j in (0..item_index).rev() {
            if items[j].depth == d {
                ancestor_is_last = items[j].is_last_sibling;
                break;
            }
            if items[j].depth < d {
                break;
            }
        }
        parts.push(if ancestor_is_last { "    " } else { "│   " });
    }
    parts.push(if item.is_last_sibling { "└── " } else { "├── " });
    parts.concat()
}

fn item_indicator(item: &FlatItem) -> &'static str {
    match item.target {
        Some(TargetKind::Directory) => "[D] ",
        Some(TargetKind::Archive) => "[A] ",
        Some(TargetKind::File) => "[F] ",
        None => "",
    }
}

/// One line per visible row. Directory-like nodes not yet loaded get a `…`.
pub fn render_lines(items: &[FlatItem]) -> Vec<String> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let pending = match (item.target, item.status) {
                (Some(kind), NodeStatus::Null) if kind.is_directory_like() => " …",
                (_, NodeStatus::Loading) => " (loading)",
                _ => "",
            };
            format!(
                "{}{}{}{}",
                build_prefix(item, items, i),
                item_indicator(item),
                item.label,
                pending
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::path::{FsPath, VfsPath};
    use crate::fs::tree::{DirTreeModel, NodeStatus, EMPTY_LABEL};
    use crate::providers::tree_data::TreeNodeData;

    fn dir(label: &str) -> TreeNodeData {
        TreeNodeData::new(label, VfsPath::Fs(FsPath::new(format!("/{label}"), true, label)))
    }

    fn file(label: &str) -> TreeNodeData {
        TreeNodeData::new(label, VfsPath::Fs(FsPath::new(format!("/{label}"), false, label)))
    }

    #[test]
    fn draws_connectors() {
        let mut model = DirTreeModel::new();
        let root = model.root();
        let top = model.add_null_dir_child(root, dir("top")).unwrap();
        model.remove_all_children(top);
        model.set_status(top, NodeStatus::Loaded);
        let a = model.add_null_dir_child(top, dir("a")).unwrap();
        model.add_file_child(top, file("b.zip")).unwrap();
        model.remove_all_children(a);
        model.set_status(a, NodeStatus::Loaded);
        model.add_fake_child(a, EMPTY_LABEL).unwrap();

        let lines = render_lines(&model.flatten());
        assert_eq!(
            lines,
            vec![
                "[D] top",
                "├── [D] a",
                "│   └── <empty>",
                "└── [A] b.zip",
            ]
        );
    }

    #[test]
    fn marks_unloaded_directories() {
        let mut model = DirTreeModel::new();
        let root = model.root();
        model.add_null_dir_child(root, dir("top")).unwrap();
        assert_eq!(render_lines(&model.flatten()), vec!["[D] top …"]);
    }
}
