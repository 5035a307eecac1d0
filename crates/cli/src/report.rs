//! Cargo-style status output for bisync
//!
//! ```text
//!    Uploaded x.txt
//!  Downloaded docs/readme.md
//!     Scanned 2 uploaded, 1 downloaded in 12ms
//!    Watching ./local_root <-> ./uploads
//! ```

use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use bisync_core::ScanReport;
use bisync_core::snapshot::SnapshotMap;

/// Status verbs (right-aligned to 12 chars)
struct Status;

impl Status {
    const UPLOADED: &str = "Uploaded";
    const DOWNLOADED: &str = "Downloaded";
    const RECONCILED: &str = "Reconciled";
    const SKIPPED: &str = "Skipped";
    const SCANNED: &str = "Scanned";
    const WATCHING: &str = "Watching";
    const STOPPED: &str = "Stopped";
}

/// Print a cargo-style status line
fn print_status(status: &str, message: &str) {
    print_styled(console::Style::new().green().bold(), status, message);
}

fn print_warning(status: &str, message: &str) {
    print_styled(console::Style::new().yellow().bold(), status, message);
}

fn print_styled(style: console::Style, status: &str, message: &str) {
    let mut term = console::Term::stderr();
    let _ = writeln!(term, "{:>12} {}", style.apply_to(status), message);
}

/// Human-friendly elapsed time
fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}

/// Per-path lines plus a one-line summary of the initial scan
pub fn scan_finished(report: &ScanReport, elapsed: Duration) {
    for rel in &report.uploaded {
        print_status(Status::UPLOADED, rel);
    }
    for rel in &report.downloaded {
        print_status(Status::DOWNLOADED, rel);
    }
    for rel in &report.reconciled {
        print_status(Status::RECONCILED, rel);
    }
    for rel in &report.skipped {
        print_warning(Status::SKIPPED, rel);
    }
    print_status(Status::SCANNED, &scan_summary(report, elapsed));
}

fn scan_summary(report: &ScanReport, elapsed: Duration) -> String {
    if report.is_noop() && report.skipped.is_empty() {
        return format!("already in sync in {}", format_elapsed(elapsed));
    }
    let mut summary = format!(
        "{} uploaded, {} downloaded",
        report.uploaded.len(),
        report.downloaded.len()
    );
    if !report.reconciled.is_empty() {
        summary.push_str(&format!(", {} reconciled", report.reconciled.len()));
    }
    if !report.skipped.is_empty() {
        summary.push_str(&format!(", {} skipped", report.skipped.len()));
    }
    summary.push_str(&format!(" in {}", format_elapsed(elapsed)));
    summary
}

pub fn watching(local: &Path, remote: &Path) {
    print_status(
        Status::WATCHING,
        &format!("{} <-> {} (Ctrl+C to stop)", local.display(), remote.display()),
    );
}

pub fn stopped(handled: u64) {
    print_status(Status::STOPPED, &format!("after {handled} events"));
}

/// Summary of a snapshot for `bisync status`
pub fn snapshot_summary(snapshot: &Path, entries: &SnapshotMap) -> String {
    use std::fmt::Write as _;

    let total_size: u64 = entries.values().map(|e| e.size).sum();
    let mut out = format!(
        "Snapshot: {}\nFiles: {}\nTotal size: {total_size} bytes\n",
        snapshot.display(),
        entries.len()
    );
    if entries.len() <= 20 {
        for (rel, entry) in entries {
            let _ = writeln!(out, "  {rel} ({} bytes, {})", entry.size, entry.hash);
        }
    }
    out
}
