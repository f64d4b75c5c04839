//! Bounded cache of skipped message keys.
//!
//! Keys are indexed by `(ratchet public key, counter)` and removed when
//! consumed. Enforces a capacity limit with oldest-first eviction so a peer
//! cannot grow local memory without bound by opening counter gaps.

use std::collections::{HashMap, VecDeque};

use super::chain::MessageKey;
use crate::keys::PublicKey;

type SlotId = (PublicKey, u32);

/// Skipped message keys in insertion order.
#[derive(Clone)]
pub(crate) struct SkippedKeys {
    /// Message keys indexed by slot.
    keys: HashMap<SlotId, MessageKey>,
    /// Insertion order, oldest at front.
    order: VecDeque<SlotId>,
    /// Maximum number of cached keys.
    capacity: usize,
}

impl SkippedKeys {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { keys: HashMap::new(), order: VecDeque::new(), capacity }
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    /// Cache a key, evicting the oldest entries beyond capacity.
    ///
    /// Returns the number of evicted entries.
    pub(crate) fn insert(&mut self, ratchet_key: PublicKey, message_key: MessageKey) -> usize {
        let slot = (ratchet_key, message_key.counter());
        if self.keys.insert(slot, message_key).is_some() {
            self.order.retain(|existing| *existing != slot);
        }
        self.order.push_back(slot);

        let mut evicted = 0;
        while self.keys.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.keys.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    /// Remove and return the key for a slot. One-time use.
    pub(crate) fn take(&mut self, ratchet_key: &PublicKey, counter: u32) -> Option<MessageKey> {
        let slot = (*ratchet_key, counter);
        let key = self.keys.remove(&slot)?;
        self.order.retain(|existing| *existing != slot);
        Some(key)
    }

    /// Whether any key from the chain of `ratchet_key` is still cached.
    pub(crate) fn contains_chain(&self, ratchet_key: &PublicKey) -> bool {
        self.order.iter().any(|(key, _)| key == ratchet_key)
    }

    /// Cached entries, oldest first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&PublicKey, &MessageKey)> {
        self.order
            .iter()
            .filter_map(|slot| self.keys.get(slot).map(|message_key| (&slot.0, message_key)))
    }
}
