//! CLI command implementations.

pub mod actors;
pub mod init;
pub mod network;
pub mod series;
pub mod windows;

use infoflow_engine::{RunReport, WindowOutcome};

/// Print the per-window outcome of a run.
pub(crate) fn print_report(report: &RunReport) {
    println!();
    for entry in &report.windows {
        match &entry.outcome {
            WindowOutcome::Completed { summary, path } => println!(
                "   ✓ {}  {} rows, {}/{} active actors, {} ms → {}",
                entry.window,
                summary.rows,
                summary.active_actors,
                summary.actors,
                summary.duration_ms,
                path.display()
            ),
            WindowOutcome::Skipped { reason } => println!("   - {}  skipped: {}", entry.window, reason),
            WindowOutcome::Failed { reason } => println!("   ✗ {}  failed: {}", entry.window, reason),
        }
    }
    println!();
    println!(
        "📊 {} actors, {} completed, {} skipped, {} failed",
        report.actors,
        report.completed(),
        report.skipped(),
        report.failed()
    );
}
