//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async production code MUST NOT use blocking I/O.
//! **Required**: Use `tokio::fs`, `tokio::net`, `tokio::process`, not `std::fs`, `std::net`, `std::process`
//!
//! Plain functions may block. Config is read, logging is set up, and the
//! terminal is prepared before or outside the async paths.

use architectural_enforcement::{
    code_part, enclosing_fn, rust_files, FnKind, SourceFile, PRODUCTION_DIRS,
};

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN blocking I/O:");
        eprintln!("  - std::fs::read(), std::fs::write(), std::fs::File");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener, std::net::UdpSocket");
        eprintln!("  - std::process::Command::output()");
        eprintln!("  - io::stdin() / io::stdout() inside async functions");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read().await, tokio::fs::read_dir().await");
        eprintln!("  - tokio::net::TcpStream::connect().await");
        eprintln!("  - tokio::io::AsyncRead, tokio::io::AsyncWrite");
        eprintln!("\n✅ ACCEPTABLE blocking I/O:");
        eprintln!("  - Non-async functions (before tokio runtime starts)");
        eprintln!("  - Test code");
        eprintln!("  - Plain value types such as std::net::SocketAddr");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all blocking I/O calls in production code
fn find_blocking_io_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_files(dir) {
            if let Some(file) = SourceFile::read(&path) {
                check_file(&file, &mut violations);
            }
        }
    }

    violations
}

fn check_file(file: &SourceFile, violations: &mut Vec<String>) {
    let lines = file.production_lines();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        let context = enclosing_fn(lines, idx);

        // Blocking is fine in plain functions
        if context == Some(FnKind::Sync) {
            continue;
        }

        if code.contains("std::fs::") || code.contains("use std::fs") {
            violations.push(file.describe(idx, "Blocking file I/O"));
        }

        if ["TcpStream", "TcpListener", "UdpSocket"]
            .iter()
            .any(|ty| code.contains(&format!("std::net::{ty}")))
            || (code.contains("use std::net::{") && code.contains("Tcp"))
        {
            violations.push(file.describe(idx, "Blocking network I/O"));
        }

        if code.contains("std::process::Command") {
            violations.push(file.describe(idx, "Blocking process I/O"));
        }

        if context == Some(FnKind::Async) && is_blocking_stdio(code) {
            violations.push(file.describe(idx, "Blocking stdin/stdout in async"));
        }
    }
}

/// `io::stdin()` or `io::stdout()`, but not tokio's
fn is_blocking_stdio(code: &str) -> bool {
    ["io::stdin()", "io::stdout()"].iter().any(|call| {
        code.match_indices(call)
            .any(|(pos, _)| !code[..pos].ends_with("tokio::"))
    })
}

fn check(path: &str, src: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    check_file(&SourceFile::from_lines(path, src), &mut violations);
    violations
}

#[test]
fn test_blocking_io_detection() {
    let violations = check(
        "server/core/src/assets.rs",
        &[
            "async fn load_frames() {",
            "    let contents = std::fs::read_to_string(\"frame.txt\")?;",
            "}",
        ],
    );
    assert_eq!(violations.len(), 1);
}

#[test]
fn test_non_async_function_is_allowed() {
    let violations = check(
        "server/core/src/config/mod.rs",
        &[
            "pub fn load_config() {",
            "    let contents = std::fs::read_to_string(\"partty.toml\")?;",
            "}",
        ],
    );
    assert!(violations.is_empty());
}

#[test]
fn test_module_level_fs_import_is_flagged() {
    let violations = check("viewer/src/app.rs", &["use std::fs;", "", "fn a() {}"]);
    assert_eq!(violations.len(), 1);
}

#[test]
fn test_socket_addr_is_allowed() {
    let violations = check(
        "server/daemon/src/server.rs",
        &["use std::net::SocketAddr;", "use std::net::TcpListener;"],
    );
    assert_eq!(violations.len(), 1);
}

#[test]
fn test_stdout_in_async() {
    let violations = check(
        "viewer/src/main.rs",
        &[
            "async fn draw() {",
            "    let out = std::io::stdout();",
            "    let ok = tokio::io::stdout();",
            "}",
            "",
            "fn setup() {",
            "    let out = io::stdout();",
            "}",
        ],
    );
    assert_eq!(violations.len(), 1);
}
