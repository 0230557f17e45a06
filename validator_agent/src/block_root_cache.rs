use parking_lot::Mutex;
use std::collections::HashMap;
use types::{Hash256, Slot};

/// Hands the head beacon block root for a slot from the messenger to the
/// aggregator.
///
/// Take-once semantics: a read removes the entry, so a late aggregate cannot
/// observe a stale root and the map never grows past in-flight slots.
#[derive(Default)]
pub struct BlockRootCache {
    roots: Mutex<HashMap<Slot, Hash256>>,
}

impl BlockRootCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the beacon block root used for the given slot.
    pub fn set(&self, slot: Slot, root: Hash256) {
        self.roots.lock().insert(slot, root);
    }

    /// Removes and returns the root for the given slot.
    pub fn take(&self, slot: Slot) -> Option<Hash256> {
        self.roots.lock().remove(&slot)
    }

    pub fn len(&self) -> usize {
        self.roots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
