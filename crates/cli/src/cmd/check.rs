//! Validate a manifest without starting anything

use crate::manifest;
use crate::util::plural;
use anyhow::Result;
use filewatch::IgnoreMatcher;
use filewatch_core::DisableSource;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(manifest_path: &Path) -> Result<()> {
    let loaded = manifest::load(manifest_path)?;
    let manifest = &loaded.manifest;
    let mut problems = 0;

    println!("{}", "Manifest".bold());
    println!("{}: {}\n", "Location".dimmed(), manifest_path.display().dimmed());

    for entry in &manifest.watch {
        let spec = entry.spec(&loaded.base_dir);
        println!("{} {}", "watch".yellow(), entry.key().to_string().cyan());

        for path in &spec.watched_paths {
            if path.exists() {
                println!("  {} {}", "path".dimmed(), path.display());
            } else {
                println!(
                    "  {} {} {}",
                    "path".dimmed(),
                    path.display(),
                    "(does not exist yet)".yellow()
                );
            }
        }

        let (_, errors) = IgnoreMatcher::compile(&spec.ignores);
        println!("  {} {}", "ignores".dimmed(), plural(spec.ignores.len(), "rule"));
        for err in &errors {
            println!("  {} {}", "✗".red(), err);
            problems += 1;
        }

        if let Some(DisableSource::ConfigMap(cm)) = &spec.disable_source {
            let declared = manifest.config_map.iter().any(|c| c.name == cm.name);
            println!(
                "  {} ConfigMap {:?} key {:?}{}",
                "gate".dimmed(),
                cm.name,
                cm.key,
                if declared {
                    String::new()
                } else {
                    " (not declared, watch stays enabled)".yellow().to_string()
                }
            );
        }
        println!();
    }

    println!(
        "{} {}, {}",
        "Summary:".bold(),
        plural(manifest.watch.len(), "resource"),
        plural(manifest.config_map.len(), "config map")
    );

    if problems > 0 {
        anyhow::bail!("{} found", plural(problems, "problem"));
    }

    println!("{} Manifest is valid", "✓".green());
    Ok(())
}
