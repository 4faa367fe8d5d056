use crate::render;
use colored::Colorize;
use mothball_core::{ConserveOptions, RunEngine, StateStore, TagFilter, TrickRegistry};
use std::path::Path;

pub async fn handle(
    registry: &TrickRegistry,
    state_dir: &Path,
    dry_run: bool,
    only: Vec<String>,
    skip: Vec<String>,
    tags: Vec<String>,
) -> anyhow::Result<bool> {
    let tags = TagFilter::parse(&tags)?;

    if dry_run {
        println!(
            "{}",
            "Dry-run: planned actions are reported, nothing is mutated".yellow()
        );
    }
    println!("{}", "Conserving...".yellow());
    println!();

    let engine = RunEngine::new(registry, StateStore::new(state_dir));
    let summary = engine
        .conserve(ConserveOptions {
            dry_run,
            tags,
            only,
            skip,
        })
        .await?;

    render::print_report(&summary.report);
    println!();

    if summary.is_success() {
        println!(
            "{}",
            format!("✓ Conserved state for {} trick(s)", summary.entries)
                .green()
                .bold()
        );
        if !dry_run {
            println!(
                "{}",
                "  Run `mothball restore` to bring everything back".dimmed()
            );
        }
    } else {
        println!(
            "{}",
            format!(
                "⚠ {} operation(s) failed; captured state was still saved",
                summary.report.failure_count()
            )
            .red()
            .bold()
        );
    }

    Ok(summary.is_success())
}
