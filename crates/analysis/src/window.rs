//! Temporal event window
//!
//! A bounded FIFO of recent per-frame detection/classification results,
//! consumed by event detection to infer actions spanning multiple frames.
//! Implemented as a mutex-guarded ring buffer so concurrent frame workers
//! never observe interleaved partial entries; a frame's own entry is visible
//! to its own event-detection call because `append` completes before the
//! snapshot is taken.

use serde::Serialize;
use std::sync::Mutex;

use framesight_common::{ObjectDetectionResult, SceneClassification};

/// Default capacity, approximating one second of history at the extraction
/// sampling rate
pub const DEFAULT_WINDOW_CAPACITY: usize = 30;

/// One frame's stage-1/stage-2 results as seen by event detection
#[derive(Debug, Clone, Serialize)]
pub struct WindowEntry {
    pub frame_index: u32,
    pub timestamp: f64,
    pub objects: ObjectDetectionResult,
    pub scene: SceneClassification,
}

struct Ring {
    slots: Vec<Option<WindowEntry>>,
    head: usize,
    len: usize,
}

/// Per-video sliding window. Never persisted; reset between videos.
pub struct TemporalWindow {
    inner: Mutex<Ring>,
}

impl TemporalWindow {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                len: 0,
            }),
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn append(&self, entry: WindowEntry) {
        let mut ring = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let capacity = ring.slots.len();
        if ring.len == capacity {
            let head = ring.head;
            ring.slots[head] = Some(entry);
            ring.head = (head + 1) % capacity;
        } else {
            let tail = (ring.head + ring.len) % capacity;
            ring.slots[tail] = Some(entry);
            ring.len += 1;
        }
    }

    /// Entries oldest-first. This full snapshot (not a summary) is the
    /// context handed to event detection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<WindowEntry> {
        let ring = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let capacity = ring.slots.len();
        (0..ring.len)
            .filter_map(|i| ring.slots[(ring.head + i) % capacity].clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .slots
            .len()
    }
}

impl Default for TemporalWindow {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesight_common::SceneAttributes;

    fn entry(frame_index: u32) -> WindowEntry {
        WindowEntry {
            frame_index,
            timestamp: f64::from(frame_index),
            objects: ObjectDetectionResult::default(),
            scene: SceneClassification {
                label: "test".to_string(),
                confidence: 1.0,
                attributes: SceneAttributes::default(),
            },
        }
    }

    #[test]
    fn test_append_and_snapshot_order() {
        let window = TemporalWindow::with_capacity(4);
        for i in 1..=3 {
            window.append(entry(i));
        }
        let indices: Vec<u32> = window.snapshot().iter().map(|e| e.frame_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_full_window_evicts_oldest() {
        let window = TemporalWindow::with_capacity(3);
        for i in 1..=5 {
            window.append(entry(i));
        }
        let indices: Vec<u32> = window.snapshot().iter().map(|e| e.frame_index).collect();
        assert_eq!(indices, vec![3, 4, 5]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_own_entry_visible_after_append() {
        let window = TemporalWindow::with_capacity(8);
        window.append(entry(7));
        assert!(window
            .snapshot()
            .iter()
            .any(|e| e.frame_index == 7));
    }

    #[test]
    fn test_concurrent_appends_never_exceed_capacity() {
        let window = std::sync::Arc::new(TemporalWindow::with_capacity(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let window = window.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        window.append(entry(t * 100 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(window.len(), 16);
        assert_eq!(window.snapshot().len(), 16);
    }
}
