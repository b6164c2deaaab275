//! Status snapshots on disk
//!
//! The daemon periodically dumps every FileWatch (spec + status) as JSON so
//! that read-only commands can inspect it without talking to the process.

use anyhow::{Context, Result};
use filewatch_core::FileWatch;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomic write helper
///
/// Writes data to a temporary file in the target's directory, fsyncs it,
/// then renames it over the target path.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir).context("Failed to create temp file")?;
    tmp.write_all(data).context("Failed to write temp file")?;
    tmp.as_file().sync_all().context("Failed to sync temp file")?;
    tmp.persist(target)
        .with_context(|| format!("Failed to rename snapshot into {}", target.display()))?;
    Ok(())
}

/// Write all resources as pretty-printed JSON
pub fn write_snapshot(target: &Path, resources: &[FileWatch]) -> Result<()> {
    let json = serde_json::to_vec_pretty(resources).context("Failed to serialize snapshot")?;
    atomic_write(target, &json)?;
    tracing::debug!(path = %target.display(), count = resources.len(), "wrote status snapshot");
    Ok(())
}

/// Read a snapshot written by `write_snapshot`
pub fn read_snapshot(path: &Path) -> Result<Vec<FileWatch>> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filewatch_core::{FileEventBatch, FileWatchSpec, ResourceKey};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_preserves_status() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state/status.json");

        let mut fw = FileWatch::new(
            ResourceKey::new("default", "web"),
            FileWatchSpec {
                watched_paths: vec![PathBuf::from("/src")],
                ..Default::default()
            },
        );
        fw.status.record_batch(FileEventBatch {
            time: chrono::Utc::now(),
            seen_files: vec![PathBuf::from("/src/lib.rs")],
        });
        fw.status.error = Some("short read".to_string());

        write_snapshot(&path, &[fw.clone()]).unwrap();
        let loaded = read_snapshot(&path).unwrap();

        assert_eq!(loaded, vec![fw]);
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        // Only the target remains, no stray temp files
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_missing_snapshot_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_snapshot(&temp_dir.path().join("nope.json")).is_err());
    }
}
