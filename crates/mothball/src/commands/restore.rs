use crate::render;
use colored::Colorize;
use mothball_core::{RestoreOptions, RunEngine, StateStore, TrickRegistry};
use std::path::Path;

pub async fn handle(
    registry: &TrickRegistry,
    state_dir: &Path,
    dry_run: bool,
) -> anyhow::Result<bool> {
    if dry_run {
        println!(
            "{}",
            "Dry-run: planned actions are reported, nothing is mutated".yellow()
        );
    }
    println!("{}", "Restoring...".yellow());
    println!();

    let engine = RunEngine::new(registry, StateStore::new(state_dir));
    let summary = engine.restore(RestoreOptions { dry_run }).await?;

    render::print_report(&summary.report);
    println!();

    if summary.is_success() {
        println!(
            "{}",
            format!("✓ Processed {} conserved entries", summary.entries)
                .green()
                .bold()
        );
    } else {
        println!(
            "{}",
            format!(
                "⚠ {} operation(s) failed; state was kept for retry",
                summary.report.failure_count()
            )
            .red()
            .bold()
        );
    }

    Ok(summary.is_success())
}
