//! Blocking I/O Prohibition
//!
//! **Policy**: `async fn` bodies in the relay crates MUST NOT block the
//! runtime with `std::fs`, `std::net` sockets, `std::process` or
//! `reqwest::blocking`. Synchronous startup code (config loading) is exempt.

use architectural_enforcement::{blocking_io_in_async, scan};

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan(blocking_io_in_async);

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking I/O found in async code:\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use tokio::fs, tokio::net, tokio::process or async reqwest");

        panic!("Found {} blocking I/O violation(s)", violations.len());
    }
}

#[test]
fn test_production_dirs_exist() {
    let root = architectural_enforcement::workspace_root();
    for dir in architectural_enforcement::PRODUCTION_DIRS {
        assert!(root.join(dir).is_dir(), "missing source directory {dir}");
    }
}
