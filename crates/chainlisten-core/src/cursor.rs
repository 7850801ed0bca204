//! Channel cursor: the last block known to be fully processed on a channel.

use serde::{Deserialize, Serialize};

/// A channel's current position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCursor {
    pub channel_id: String,
    /// Last block number that was fully extracted and published.
    pub block_number: u64,
}

impl ChannelCursor {
    pub fn new(channel_id: impl Into<String>, block_number: u64) -> Self {
        Self {
            channel_id: channel_id.into(),
            block_number,
        }
    }

    /// Move the cursor forward. Returns `false` (and leaves the cursor
    /// untouched) if `block_number` is behind the current position.
    pub fn advance(&mut self, block_number: u64) -> bool {
        if block_number < self.block_number {
            return false;
        }
        self.block_number = block_number;
        true
    }

    /// Merge a persisted position: the cursor never moves backwards.
    pub fn merge(&mut self, persisted: u64) {
        self.block_number = self.block_number.max(persisted);
    }

    /// Returns the next block to subscribe from (cursor + 1).
    pub fn next_block(&self) -> u64 {
        self.block_number.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advance() {
        let mut cursor = ChannelCursor::new("mychannel", 100);
        assert!(cursor.advance(101));
        assert_eq!(cursor.block_number, 101);
        assert!(!cursor.advance(99));
        assert_eq!(cursor.block_number, 101);
    }

    #[test]
    fn cursor_merge_takes_max() {
        let mut cursor = ChannelCursor::new("chan1", 10);
        cursor.merge(25);
        assert_eq!(cursor.block_number, 25);
        cursor.merge(7);
        assert_eq!(cursor.block_number, 25);
    }

    #[test]
    fn cursor_next_block() {
        let cursor = ChannelCursor::new("chan1", 500);
        assert_eq!(cursor.next_block(), 501);
        assert_eq!(ChannelCursor::new("c", u64::MAX).next_block(), u64::MAX);
    }
}
