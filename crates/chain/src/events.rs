//! The downstream head-update stream.
//!
//! When the head changes, consumers (mempool, execution) receive the
//! orphaned and adopted blocks, each list ordered parent-to-child. The
//! core defines the content and order of this stream only; delivery is
//! the embedder's concern.

use animica_types::BlockHash;

/// One head change, as seen by downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadUpdate {
    /// Blocks that left the canonical chain, parent-to-child.
    pub removed: Vec<BlockHash>,
    /// Blocks that joined the canonical chain, parent-to-child.
    pub added: Vec<BlockHash>,
}

impl HeadUpdate {
    /// A plain head extension: nothing removed, one block added.
    pub fn extension(added: BlockHash) -> Self {
        Self {
            removed: Vec::new(),
            added: vec![added],
        }
    }
}
