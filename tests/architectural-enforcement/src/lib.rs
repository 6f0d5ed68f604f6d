//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code, except the session frame clock
//! - No blocking I/O inside async functions
//!
//! The helpers here are line-based heuristics shared by those tests. They
//! read source files as text; nothing is compiled or parsed.

use std::fs;
use std::path::{Path, PathBuf};

/// Crate source trees that count as production code
pub const PRODUCTION_DIRS: &[&str] = &["server/core/src", "server/daemon/src", "viewer/src"];

/// Root of the workspace this package lives in
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files below `dir` (relative to the workspace root)
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// A source file split into lines
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,
    /// Every line of the file
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Read a file, or `None` if it cannot be read
    pub fn read(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            lines: content.lines().map(str::to_string).collect(),
        })
    }

    /// Build from literal lines, for checking the detectors themselves
    pub fn from_lines(path: &str, lines: &[&str]) -> Self {
        Self {
            path: PathBuf::from(path),
            lines: lines.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    /// Lines before the first `#[cfg(test)]`
    pub fn production_lines(&self) -> &[String] {
        let end = self
            .lines
            .iter()
            .position(|l| l.trim_start().starts_with("#[cfg(test)]"))
            .unwrap_or(self.lines.len());
        &self.lines[..end]
    }

    /// `path:line - text` for a violation report
    pub fn describe(&self, idx: usize, what: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.path.display(),
            idx + 1,
            what,
            self.lines[idx].trim()
        )
    }
}

/// The part of a line before any `//` comment
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function a line belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnKind {
    /// `fn`
    Sync,
    /// `async fn`
    Async,
}

/// Recognize a function signature line, with or without visibility
pub fn fn_signature(line: &str) -> Option<FnKind> {
    let mut rest = line.trim_start();
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    for prefix in ["const ", "unsafe "] {
        rest = rest.strip_prefix(prefix).unwrap_or(rest);
    }

    if rest.starts_with("async fn ") {
        Some(FnKind::Async)
    } else if rest.starts_with("fn ") {
        Some(FnKind::Sync)
    } else {
        None
    }
}

/// The function enclosing line `idx`, or `None` at module level
///
/// Scans backwards to the nearest signature. A closing brace in column
/// zero means an item ended between the signature and the line, so the
/// line sits at module level.
pub fn enclosing_fn(lines: &[String], idx: usize) -> Option<FnKind> {
    for i in (0..=idx).rev() {
        let line = &lines[i];
        if let Some(kind) = fn_signature(line) {
            return Some(kind);
        }
        if i < idx && line.starts_with('}') {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|l| (*l).to_string()).collect()
    }

    #[test]
    fn test_fn_signature_variants() {
        assert_eq!(fn_signature("fn main() {"), Some(FnKind::Sync));
        assert_eq!(fn_signature("    pub fn new() -> Self {"), Some(FnKind::Sync));
        assert_eq!(
            fn_signature("    pub(crate) async fn run(&self) {"),
            Some(FnKind::Async)
        );
        assert_eq!(fn_signature("pub const fn rgb() {"), Some(FnKind::Sync));
        assert_eq!(fn_signature("    let f = || {"), None);
        assert_eq!(fn_signature("// fn commented() {"), None);
    }

    #[test]
    fn test_enclosing_fn() {
        let src = lines(&[
            "use std::fs;",
            "async fn load() {",
            "    read();",
            "}",
            "",
            "const X: u8 = 1;",
            "impl Thing {",
            "    fn helper(&self) {",
            "        write();",
            "    }",
            "}",
        ]);

        assert_eq!(enclosing_fn(&src, 0), None);
        assert_eq!(enclosing_fn(&src, 2), Some(FnKind::Async));
        assert_eq!(enclosing_fn(&src, 5), None);
        assert_eq!(enclosing_fn(&src, 8), Some(FnKind::Sync));
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let file = SourceFile::from_lines(
            "x.rs",
            &["fn a() {}", "", "#[cfg(test)]", "mod tests {", "}"],
        );
        assert_eq!(file.production_lines().len(), 2);
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // sleep(1)"), "let x = 1; ");
        assert_eq!(code_part("/// docs"), "");
    }

    #[test]
    fn test_workspace_has_sources() {
        let total: usize = PRODUCTION_DIRS.iter().map(|d| rust_files(d).len()).sum();
        assert!(total > 0, "no production sources found from {:?}", workspace_root());
    }
}
