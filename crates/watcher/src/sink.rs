//! Human-readable side channel for watcher errors
//!
//! Errors are always recorded in the resource's status; the sink turns
//! them into log lines as well.

use filewatch_core::ResourceKey;
use parking_lot::Mutex;
use std::sync::Arc;

pub trait LogSink: Send + Sync {
    fn log(&self, key: &ResourceKey, line: &str);
}

/// Forwards lines to `tracing` at warn level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, key: &ResourceKey, line: &str) {
        tracing::warn!(key = %key, "{line}");
    }
}

/// Keeps every line in memory
#[derive(Debug, Clone, Default)]
pub struct BufferLogSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything logged so far, one line per entry
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Everything logged so far as one newline-separated string
    pub fn contents(&self) -> String {
        self.lines.lock().join("\n")
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

impl LogSink for BufferLogSink {
    fn log(&self, key: &ResourceKey, line: &str) {
        self.lines.lock().push(format!("[{key}] {line}"));
    }
}
