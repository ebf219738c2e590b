use crate::store::SyncCursor;

/// Inclusive block range scanned for one contract in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// Range following `cursor` up to `head`: starts at genesis when the
    /// contract was never synced.
    pub fn after(cursor: Option<&SyncCursor>, head: u64) -> Self {
        let from = cursor.map_or(0, |c| c.last_block_number.saturating_add(1));
        Self { from, to: head }
    }

    /// Nothing new since the last pass.
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }
}
