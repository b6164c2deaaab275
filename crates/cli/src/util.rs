//! Shared utilities for CLI commands

use chrono::{DateTime, Local, Utc};

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    format_relative_to(ts, Utc::now())
}

fn format_relative_to(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = match (now - ts).num_seconds() {
        s if s < 0 => return "in the future".to_string(),
        s => s,
    };

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format timestamp as local absolute time ("2024-01-03 14:30:00")
pub fn format_absolute_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Pluralize a count ("1 file", "3 files")
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
