//! Sync progress reporting.
//!
//! Reports observable progress while a sync runs so users see what is being
//! scanned and which store phase is executing. Progress goes to **stderr** so
//! stdout stays parseable for scripts.

use std::io::Write;

/// A single progress event for one sync run.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// Vault walk started.
    Scanning { vault: String },
    /// Scan finished: how many files changed out of all scanned.
    Scanned { changed: u64, total: u64 },
    /// Extraction finished across all changed files.
    Parsed { notes: u64, files: u64 },
    /// One store phase is about to run with this many items.
    Phase { name: &'static str, count: u64 },
    /// Files rewritten with id changes.
    Rewritten { files: u64 },
}

/// Reports sync progress. Implementations write to stderr.
pub trait ProgressReporter {
    fn report(&self, event: SyncEvent);
}

/// Human-friendly progress lines: "sync vault  adding  12 notes".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: SyncEvent) {
        let line = match &event {
            SyncEvent::Scanning { vault } => format!("sync {}  scanning...\n", vault),
            SyncEvent::Scanned { changed, total } => format!(
                "sync  {} / {} files changed\n",
                format_number(*changed),
                format_number(*total)
            ),
            SyncEvent::Parsed { notes, files } => format!(
                "sync  parsed {} notes from {} files\n",
                format_number(*notes),
                format_number(*files)
            ),
            SyncEvent::Phase { name, count } => {
                format!("sync  {}  {} items\n", name, format_number(*count))
            }
            SyncEvent::Rewritten { files } => {
                format!("sync  rewrote {} files\n", format_number(*files))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }
}

/// Swallows all events; used by tests and `--quiet` style callers.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn report(&self, _event: SyncEvent) {}
}

/// Format 1234567 as "1,234,567".
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
