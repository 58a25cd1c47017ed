//! Per-player FIFO of opened sources.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::source::Source;

/// Ordered sequence of sources awaiting playback. Insertion order is playback order.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    sources: VecDeque<Source>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Source) {
        self.sources.push_back(source);
    }

    /// Take the next source to play.
    pub fn pop(&mut self) -> Option<Source> {
        self.sources.pop_front()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Drop every queued source, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.sources.len();
        self.sources.clear();
        n
    }

    /// Paths of the queued sources, in playback order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.sources.iter().map(|s| s.path().to_path_buf()).collect()
    }
}
