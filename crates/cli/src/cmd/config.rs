//! Configuration command
//!
//! Shows the effective configuration and where it came from.

use crate::config::{self, DaemonConfig};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

/// Print the effective configuration, annotated or as plain TOML
pub async fn run(config_path: Option<&Path>, as_toml: bool) -> Result<()> {
    let (config, source) = config::load(config_path)?;

    if as_toml {
        print!("{}", config::to_toml(&config)?);
        return Ok(());
    }

    println!("{}", "Configuration".bold());
    match &source {
        Some(path) => println!("{}: {}\n", "Location".dimmed(), path.display().dimmed()),
        None => {
            let hint = config::default_config_path()
                .map(|p| format!(" (create {} to override)", p.display()))
                .unwrap_or_default();
            println!("{}: built-in defaults{}\n", "Location".dimmed(), hint.dimmed());
        }
    }

    print_config(&config);

    println!("\n{}", "Valid Ranges:".bold());
    println!("  requeue_interval_secs: 1-3600");
    println!("  retry_max_secs: >= retry_base_ms");
    println!("  snapshot_interval_secs: >= 1");

    Ok(())
}

/// Print a commented example file
pub async fn run_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

fn print_config(config: &DaemonConfig) {
    println!("{}", "[log]".yellow());
    println!("  {} = {:?}", "level".cyan(), config.log.level);
    match &config.log.file {
        Some(file) => println!("  {} = {:?}", "file".cyan(), file.display().to_string()),
        None => println!("  {} = {}", "file".cyan(), "(stderr only)".dimmed()),
    }

    let c = &config.controller;
    println!("\n{}", "[controller]".yellow());
    println!(
        "  {} = {} {}",
        "requeue_interval_secs".cyan(),
        c.requeue_interval_secs,
        format!("({}s)", c.requeue_interval_secs).dimmed()
    );
    println!("  {} = {}", "retry_base_ms".cyan(), c.retry_base_ms);
    println!("  {} = {}", "retry_max_secs".cyan(), c.retry_max_secs);
    match &c.snapshot_path {
        Some(path) => println!("  {} = {:?}", "snapshot_path".cyan(), path.display().to_string()),
        None => println!("  {} = {}", "snapshot_path".cyan(), "(snapshots disabled)".dimmed()),
    }
    println!("  {} = {}", "snapshot_interval_secs".cyan(), c.snapshot_interval_secs);
}
