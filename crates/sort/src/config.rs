use gsplat_common::FULL_KEY_MASK;
use serde::{Deserialize, Serialize};

/// Sort pass configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Key bits that take part in the sort. Digits with no bit set are skipped.
    ///
    /// Only the full mask keeps culled keys behind every visible key. Under a
    /// partial mask the leading `valid_count` entries are not guaranteed to be
    /// the visible set.
    pub key_mask: u32,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            key_mask: FULL_KEY_MASK,
        }
    }
}

impl SortConfig {
    /// Whether the sorted order puts every visible particle ahead of every culled one.
    pub fn orders_visible_prefix(&self) -> bool {
        self.key_mask == FULL_KEY_MASK
    }

    /// Digit passes this configuration runs per sort.
    pub fn pass_count(&self) -> usize {
        crate::radix_passes(self.key_mask).len()
    }
}
