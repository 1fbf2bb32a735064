#![allow(clippy::module_name_repetitions)]
//! Small utilities: shell quoting for command previews, value screening, path arithmetic.

pub mod exec;

use std::path::{Component, Path, PathBuf};

/// Reject strings containing newline, carriage return, or NUL before they become a command argument.
///
/// Keep error text stable (tests/UX depend on it).
pub fn reject_newlines(s: &str, what: &str) -> Result<(), String> {
    if s.contains('\n') || s.contains('\r') || s.contains('\0') {
        Err(format!("refusing to use {what}: contains newline or NUL"))
    } else {
        Ok(())
    }
}

pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=./:@,".contains(c))
    {
        s.to_string()
    } else {
        let escaped = s.replace('\'', "'\"'\"'");
        format!("'{}'", escaped)
    }
}

/// Join `base` with the part of `full` below `prefix` (`base + (full - prefix)`).
///
/// Returns None when `prefix` is not a component-wise prefix of `full`.
pub fn rebase_path(full: &Path, prefix: &Path, base: &Path) -> Option<PathBuf> {
    let rest = full.strip_prefix(prefix).ok()?;
    let mut out = base.to_path_buf();
    for c in rest.components() {
        if let Component::Normal(part) = c {
            out.push(part);
        }
    }
    Some(out)
}
