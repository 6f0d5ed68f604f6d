//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Sessions wake on
//! their tick deadline, input, or shutdown; nothing waits by sleeping.
//! **Exceptions**: The per-session frame clock, periodic tasks driven by
//! `tokio::time::interval()`, test code

use architectural_enforcement::{code_part, rust_files, SourceFile, PRODUCTION_DIRS};

/// Files whose sleeps are frame clocks
const FRAME_CLOCK_FILES: &[&str] = &["server/core/src/runtime.rs"];

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - The session frame clock (a pinned tokio::time::sleep re-armed each tick)");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("  - Test code (after #[cfg(test)])");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep to 'wait' for events (use channels and select!)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all sleep() calls in production code
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_files(dir) {
            if let Some(file) = SourceFile::read(&path) {
                let frame_clock = FRAME_CLOCK_FILES.iter().any(|f| path.ends_with(f));
                check_file(&file, frame_clock, &mut violations);
            }
        }
    }

    violations
}

fn check_file(file: &SourceFile, frame_clock: bool, violations: &mut Vec<String>) {
    let lines = file.production_lines();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if !(code.contains("::sleep(") || code.contains(".sleep(")) {
            continue;
        }

        if frame_clock && is_frame_clock_context(lines, idx) {
            continue;
        }

        if is_interval_pattern(lines, idx) {
            continue;
        }

        violations.push(file.describe(idx, "sleep"));
    }
}

/// Check if sleep drives frame timing
fn is_frame_clock_context(lines: &[String], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(10)..std::cmp::min(current_idx + 5, lines.len());

    lines[context_range].iter().any(|line| {
        let line = line.to_lowercase();
        line.contains("frame") || line.contains("fps") || line.contains("tick_period")
    })
}

/// Check if this is tokio::time::interval pattern (acceptable for periodic tasks)
fn is_interval_pattern(lines: &[String], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(20)..std::cmp::min(current_idx + 5, lines.len());

    lines[context_range]
        .iter()
        .any(|line| line.contains(".tick()") || line.contains("tokio::time::interval"))
}

#[test]
fn test_sleep_violation_detection() {
    let file = SourceFile::from_lines(
        "server/daemon/src/server.rs",
        &[
            "async fn wait_for_clients() {",
            "    loop {",
            "        tokio::time::sleep(Duration::from_millis(10)).await;",
            "    }",
            "}",
        ],
    );

    let mut violations = Vec::new();
    check_file(&file, false, &mut violations);
    assert_eq!(violations.len(), 1);
}

#[test]
fn test_frame_clock_detection() {
    let lines: Vec<String> = [
        "*frames_written += 1;",
        "",
        "let tick = tokio::time::sleep(program.tick_period());",
        "tokio::pin!(tick);",
    ]
    .iter()
    .map(|l| (*l).to_string())
    .collect();

    assert!(
        is_frame_clock_context(&lines, 2),
        "Should detect the frame clock"
    );
}

#[test]
fn test_frame_clock_only_in_listed_files() {
    let file = SourceFile::from_lines(
        "viewer/src/app.rs",
        &[
            "async fn redraw() {",
            "    let frame_duration = Duration::from_millis(100);",
            "    tokio::time::sleep(frame_duration).await;",
            "}",
        ],
    );

    let mut violations = Vec::new();
    check_file(&file, false, &mut violations);
    assert_eq!(violations.len(), 1);
}

#[test]
fn test_sleep_in_test_module_is_ignored() {
    let file = SourceFile::from_lines(
        "server/core/src/runtime.rs",
        &[
            "fn real() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    async fn slow() { tokio::time::sleep(D).await; }",
            "}",
        ],
    );

    let mut violations = Vec::new();
    check_file(&file, false, &mut violations);
    assert!(violations.is_empty());
}
