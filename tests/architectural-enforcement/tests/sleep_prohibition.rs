//! Sleep Prohibition
//!
//! **Policy**: Production code in the relay crates MUST NOT sleep. Delivery
//! waits on queue notifications, cancellation and transport readiness;
//! keep-alives are driven by the SSE layer's interval.

use architectural_enforcement::{scan, sleep_call};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(sleep_call);

    if !violations.is_empty() {
        eprintln!("\n❌ Sleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Wait on I/O instead:");
        eprintln!("  - tokio::sync::Notify / watch for wake-ups");
        eprintln!("  - tokio::time::interval() for periodic work");
        eprintln!("  - tokio::time::timeout() around a real future");

        panic!("Found {} sleep violation(s) in production code", violations.len());
    }
}
