//! Architectural Enforcement
//!
//! Source scanners shared by the enforcement tests in `tests/`. They walk the
//! production crates of the workspace and report lines that break a rule:
//! - No sleeping in production code (wait on I/O or notifications instead)
//! - No blocking I/O inside `async fn`
//!
//! Scanning is line-based. Everything after a file's `#[cfg(test)]` marker is
//! treated as test code and skipped, as are `//` comments.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["relay/core/src", "relay/daemon/src"];

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// One line of production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    /// 1-based line number
    pub number: usize,
    /// The line with any trailing `//` comment removed
    pub code: String,
    /// Whether the nearest enclosing `fn` is `async`
    pub in_async_fn: bool,
}

/// A rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What was found
    pub reason: &'static str,
    /// The offending code
    pub code: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.reason,
            self.code.trim()
        )
    }
}

/// Split file contents into production code lines
#[must_use]
pub fn production_lines(content: &str) -> Vec<CodeLine> {
    let mut lines = Vec::new();
    let mut in_async_fn = false;

    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim_start();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }

        let code = raw.split("//").next().unwrap_or(raw).to_string();
        if let Some(is_async) = fn_signature(&code) {
            in_async_fn = is_async;
        }

        lines.push(CodeLine {
            number: idx + 1,
            code,
            in_async_fn,
        });
    }

    lines
}

/// `Some(is_async)` when the line opens a function
fn fn_signature(code: &str) -> Option<bool> {
    let trimmed = code.trim_start();
    let words: Vec<&str> = trimmed
        .split_whitespace()
        .take_while(|w| *w != "fn")
        .collect();
    let opens_fn = trimmed.contains("fn ")
        && words.iter().all(|w| {
            matches!(
                *w,
                "pub" | "pub(crate)" | "pub(super)" | "async" | "const" | "unsafe" | "extern"
            )
        });
    opens_fn.then(|| words.contains(&"async"))
}

/// Every `.rs` file under `dir`
#[must_use]
pub fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Apply `check` to every production line under [`PRODUCTION_DIRS`]
pub fn scan<F>(check: F) -> Vec<Violation>
where
    F: Fn(&CodeLine) -> Option<&'static str>,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_sources(&root.join(dir)) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for line in production_lines(&content) {
                if let Some(reason) = check(&line) {
                    violations.push(Violation {
                        path: path.clone(),
                        line: line.number,
                        reason,
                        code: line.code,
                    });
                }
            }
        }
    }

    violations
}

/// Sleep calls of any flavour
#[must_use]
pub fn sleep_call(line: &CodeLine) -> Option<&'static str> {
    (line.code.contains("::sleep(") || line.code.contains(".sleep(")).then_some("sleep call")
}

/// Blocking I/O inside an async function
#[must_use]
pub fn blocking_io_in_async(line: &CodeLine) -> Option<&'static str> {
    if !line.in_async_fn {
        return None;
    }
    let code = line.code.as_str();
    if code.contains("std::fs::") {
        Some("blocking file I/O")
    } else if ["std::net::TcpStream", "std::net::TcpListener", "std::net::UdpSocket"]
        .iter()
        .any(|p| code.contains(p))
    {
        Some("blocking network I/O")
    } else if code.contains("reqwest::blocking") {
        Some("blocking HTTP client")
    } else if code.contains("std::process::Command") {
        Some("blocking process I/O")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_module_is_skipped() {
        let src = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { std::thread::sleep(d); }\n}\n";
        let lines = production_lines(src);
        assert_eq!(lines.len(), 1);
        assert!(lines.iter().all(|l| sleep_call(l).is_none()));
    }

    #[test]
    fn test_comments_are_ignored() {
        let src = "fn a() {\n    // tokio::time::sleep(d).await;\n    let x = 1; // .sleep(\n}\n";
        assert!(production_lines(src).iter().all(|l| sleep_call(l).is_none()));
    }

    #[test]
    fn test_sleep_detected() {
        let src = "async fn poll() {\n    tokio::time::sleep(Duration::from_millis(10)).await;\n}\n";
        let hits: Vec<_> = production_lines(src)
            .iter()
            .filter_map(sleep_call)
            .collect();
        assert_eq!(hits, vec!["sleep call"]);
    }

    #[test]
    fn test_async_context_tracking() {
        let src = "\
pub fn load() {
    let s = std::fs::read_to_string(p);
}

pub(crate) async fn serve() {
    let s = std::fs::read_to_string(p);
}
";
        let lines = production_lines(src);
        let hits: Vec<usize> = lines
            .iter()
            .filter(|l| blocking_io_in_async(l).is_some())
            .map(|l| l.number)
            .collect();
        assert_eq!(hits, vec![6]);
    }

    #[test]
    fn test_fn_pointer_types_do_not_open_functions() {
        assert_eq!(fn_signature("    let f: fn(u8) -> u8 = id;"), None);
        assert_eq!(fn_signature("    async fn send(&mut self)"), Some(true));
        assert_eq!(fn_signature("fn main() {"), Some(false));
    }
}
