//! Bounded file event history

use crate::filewatch::FileEventBatch;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of batches kept in a resource's status
pub const MAX_FILE_EVENT_HISTORY: usize = 20;

/// Oldest-first FIFO of flushed batches, capped at `MAX_FILE_EVENT_HISTORY`
///
/// When full, pushing evicts the oldest batch, never the newest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventHistory {
    batches: VecDeque<FileEventBatch>,
}

impl EventHistory {
    /// Append a batch, evicting from the front while over capacity
    pub fn push(&mut self, batch: FileEventBatch) {
        self.batches.push_back(batch);
        while self.batches.len() > MAX_FILE_EVENT_HISTORY {
            self.batches.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Batch at `index`, 0 being the oldest
    pub fn get(&self, index: usize) -> Option<&FileEventBatch> {
        self.batches.get(index)
    }

    /// Most recent batch
    pub fn latest(&self) -> Option<&FileEventBatch> {
        self.batches.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEventBatch> {
        self.batches.iter()
    }
}

impl<'a> IntoIterator for &'a EventHistory {
    type Item = &'a FileEventBatch;
    type IntoIter = std::collections::vec_deque::Iter<'a, FileEventBatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn batch(name: &str) -> FileEventBatch {
        FileEventBatch {
            time: Utc::now(),
            seen_files: vec![PathBuf::from(name)],
        }
    }

    #[test]
    fn test_history_evicts_oldest() {
        const OVERFLOW: usize = 5;
        let mut history = EventHistory::default();

        for i in 0..MAX_FILE_EVENT_HISTORY + OVERFLOW {
            history.push(batch(&i.to_string()));
        }

        assert_eq!(history.len(), MAX_FILE_EVENT_HISTORY);
        for (i, entry) in history.iter().enumerate() {
            assert_eq!(entry.seen_files, vec![PathBuf::from((i + OVERFLOW).to_string())]);
        }
    }

    #[test]
    fn test_history_latest() {
        let mut history = EventHistory::default();
        assert!(history.latest().is_none());

        history.push(batch("a"));
        history.push(batch("b"));

        assert_eq!(history.latest().unwrap().seen_files, vec![PathBuf::from("b")]);
        assert_eq!(history.get(0).unwrap().seen_files, vec![PathBuf::from("a")]);
    }

    #[test]
    fn test_history_serializes_as_list() {
        let mut history = EventHistory::default();
        history.push(batch("/x"));

        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 1);
    }
}
