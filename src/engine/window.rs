//! Bounded execution window.
//!
//! A FIFO of the most recent processed-block records, kept for lookback
//! diagnostics. One record is created per block; the oldest is evicted
//! once the window exceeds its bound.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default number of block records retained.
pub const DEFAULT_WINDOW_BLOCKS: usize = 10;

/// Metadata for one processed block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockRecord {
    /// Controller-assigned block index.
    pub index: u64,
    /// Wall-clock time the block entered processing.
    pub received_at: DateTime<Utc>,
}

/// FIFO of the N most recent block records.
#[derive(Debug)]
pub struct ExecutionWindow {
    records: VecDeque<BlockRecord>,
    bound: usize,
}

impl ExecutionWindow {
    pub fn new(bound: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(bound + 1),
            bound,
        }
    }

    /// Record a block, evicting the oldest entry beyond the bound.
    pub fn push(&mut self, index: u64) {
        self.records.push_back(BlockRecord {
            index,
            received_at: Utc::now(),
        });
        while self.records.len() > self.bound {
            self.records.pop_front();
        }
    }

    /// Records from oldest to newest.
    pub fn records(&self) -> impl Iterator<Item = &BlockRecord> {
        self.records.iter()
    }

    /// The most recent record, if any block was processed.
    pub fn latest(&self) -> Option<&BlockRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for ExecutionWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_BLOCKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_holds_at_most_its_bound() {
        let mut window = ExecutionWindow::new(3);
        for i in 0..5 {
            window.push(i);
        }
        assert_eq!(window.len(), 3);
        let indices: Vec<u64> = window.records().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
        assert_eq!(window.latest().unwrap().index, 4);
    }

    #[test]
    fn clear_empties_the_window() {
        let mut window = ExecutionWindow::default();
        window.push(0);
        window.clear();
        assert!(window.is_empty());
        assert!(window.latest().is_none());
    }
}
