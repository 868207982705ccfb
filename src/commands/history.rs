//! History - recent convergence runs

use anyhow::Result;
use colored::Colorize;

use crate::cli::HistoryArgs;
use crate::history::RunHistory;
use crate::ui;

pub fn run(args: &HistoryArgs) -> Result<()> {
    let history = RunHistory::load()?;
    let recent = history.recent(args.limit);

    if recent.is_empty() {
        ui::info("No runs recorded yet");
        return Ok(());
    }

    ui::header("Recent runs");
    // Newest first
    for record in recent.iter().rev() {
        let summary = &record.summary;
        let status = if summary.failed == 0 {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {} {}",
            status,
            record.finished.format("%Y-%m-%d %H:%M UTC"),
            record.recipe.bold()
        );
        ui::dim(&format!(
            "      {} converged, {} unchanged, {} failed, {} skipped in {:.1}s",
            summary.converged,
            summary.unchanged,
            summary.failed,
            summary.skipped,
            record.duration_secs
        ));
    }
    Ok(())
}
