// quarksave Terminal Rendering
// Plain-text views of traversals and directory indexes for the CLI

use std::fmt::Write;

use crate::providers::{DirectoryEntry, FileRecord};
use crate::traversal::TreeNode;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Longest name shown in the file table before it is cut
const NAME_WIDTH: usize = 48;

/// Human-readable size with two decimals; `0` renders as `-` because empty
/// files and directories both report zero
pub fn format_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "-".to_string();
    }
    let mut size = size_bytes as f64;
    for unit in SIZE_UNITS {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} PB", size)
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() <= NAME_WIDTH {
        return name.to_string();
    }
    let cut: String = name.chars().take(NAME_WIDTH - 2).collect();
    format!("{}..", cut)
}

/// Box-drawing tree. The unnamed root is not printed itself; folders left
/// unexpanded by the depth bound are marked with `…`.
pub fn render_tree(root: &TreeNode) -> String {
    let mut out = String::new();
    let children = root.children();
    for (i, child) in children.iter().enumerate() {
        render_node(child, "", i + 1 == children.len(), &mut out);
    }
    out
}

fn render_node(node: &TreeNode, indent: &str, is_last: bool, out: &mut String) {
    let branch = if is_last { "└─ " } else { "├─ " };
    match node {
        TreeNode::File { name, size_label, .. } => {
            let _ = writeln!(out, "{}{}{} ({})", indent, branch, name, size_label);
        }
        TreeNode::Folder { name, size, expanded, children, .. } => {
            let marker = if *expanded { "" } else { " …" };
            let _ = writeln!(out, "{}{}{}/ ({}){}", indent, branch, name, format_size(*size), marker);
            let child_indent = format!("{}{}", indent, if is_last { "   " } else { "│  " });
            for (i, child) in children.iter().enumerate() {
                render_node(child, &child_indent, i + 1 == children.len(), out);
            }
        }
    }
}

/// Numbered listing; the numbers are the positions selection expressions use
pub fn render_file_table(files: &[FileRecord]) -> String {
    if files.is_empty() {
        return "(no files)\n".to_string();
    }
    let rule = "=".repeat(80);
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "{:<6} {:<48} {:>15}", "#", "Name", "Size");
    let _ = writeln!(out, "{}", rule);
    for (i, file) in files.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<6} {:<48} {:>15}",
            format!("[{}]", i + 1),
            truncate_name(&file.name),
            format_size(file.size_bytes)
        );
    }
    let _ = writeln!(out, "{}", rule);
    let total: u64 = files.iter().map(|f| f.size_bytes).sum();
    let _ = writeln!(out, "{} files, {}", files.len(), format_size(total));
    out
}

pub fn render_directory_index(entries: &[DirectoryEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<24} /", "0");
    for entry in entries {
        let _ = writeln!(out, "{:<24} {}", entry.id, entry.path);
    }
    out
}
