//! Show resource status from a snapshot file

use crate::util::{format_absolute_time, format_relative_time, plural};
use anyhow::{Context, Result};
use filewatch_core::FileWatch;
use filewatch_store::read_snapshot;
use owo_colors::OwoColorize;
use std::path::Path;

/// Files listed per batch before eliding the rest
const MAX_FILES_SHOWN: usize = 5;

pub async fn run(snapshot_path: &Path, json: bool) -> Result<()> {
    let resources = read_snapshot(snapshot_path)?;

    if json {
        let out = serde_json::to_string_pretty(&resources).context("Failed to serialize status")?;
        println!("{out}");
        return Ok(());
    }

    println!("{}", "Watch Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if resources.is_empty() {
        println!("  {}", "No resources in snapshot".dimmed());
        return Ok(());
    }

    for fw in &resources {
        print_resource(fw);
        println!();
    }

    Ok(())
}

fn print_resource(fw: &FileWatch) {
    let status = &fw.status;
    println!("{}", fw.key().to_string().cyan().bold());

    let disabled = status.disable_status.as_ref().filter(|d| d.disabled);
    print!("  State:       ");
    match (disabled, status.monitor_start_time) {
        (Some(d), _) => println!("{} ({})", "Disabled".yellow(), d.reason),
        (None, Some(start)) => println!(
            "{} since {} ({})",
            "Watching ✓".green(),
            format_absolute_time(start),
            format_relative_time(start).dimmed()
        ),
        (None, None) => println!("{}", "Not started".red()),
    }

    println!("  Paths:       {}", plural(fw.spec.watched_paths.len(), "root"));
    for path in &fw.spec.watched_paths {
        println!("    - {}", path.display());
    }

    if let Some(error) = &status.error {
        println!("  Error:       {}", error.red());
    }

    match status.last_event_time {
        Some(ts) => println!(
            "  Last event:  {} ({})",
            format_relative_time(ts),
            format_absolute_time(ts).dimmed()
        ),
        None => println!("  Last event:  {}", "none yet".dimmed()),
    }

    if let Some(batch) = status.file_events.latest() {
        println!(
            "  Latest batch ({}, {} in history):",
            plural(batch.seen_files.len(), "file"),
            status.file_events.len()
        );
        for path in batch.seen_files.iter().take(MAX_FILES_SHOWN) {
            println!("    - {}", path.display());
        }
        if batch.seen_files.len() > MAX_FILES_SHOWN {
            println!("    ... and {} more", batch.seen_files.len() - MAX_FILES_SHOWN);
        }
    }
}
