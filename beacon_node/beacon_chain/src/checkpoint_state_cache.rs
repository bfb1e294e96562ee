//! A cache of checkpoint states: epoch-boundary states keyed by `(block_root, epoch)`.
//!
//! The index is epoch-major so that whole epochs can be pruned cheaply and so that
//! `get_latest` can scan epochs in descending order.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use types::{BeaconState, Checkpoint, Epoch, EthSpec, Hash256};

pub struct CheckpointStateCache<E: EthSpec> {
    max_epochs: usize,
    cache: RwLock<BTreeMap<Epoch, HashMap<Hash256, BeaconState<E>>>>,
}

impl<E: EthSpec> CheckpointStateCache<E> {
    pub fn new(max_epochs: usize) -> Self {
        Self {
            max_epochs,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, checkpoint: &Checkpoint) -> Option<BeaconState<E>> {
        self.cache
            .read()
            .get(&checkpoint.epoch)
            .and_then(|roots| roots.get(&checkpoint.root))
            .cloned()
    }

    pub fn contains(&self, checkpoint: &Checkpoint) -> bool {
        self.cache
            .read()
            .get(&checkpoint.epoch)
            .map_or(false, |roots| roots.contains_key(&checkpoint.root))
    }

    /// Adds a state under `checkpoint`. A checkpoint's state is immutable once computed, so
    /// adding to an occupied key leaves the existing entry in place.
    pub fn add(&self, checkpoint: &Checkpoint, state: &BeaconState<E>) {
        self.cache
            .write()
            .entry(checkpoint.epoch)
            .or_default()
            .entry(checkpoint.root)
            .or_insert_with(|| state.clone());
    }

    /// Returns the state of the most recent cached checkpoint with the given root and an epoch
    /// no later than `max_epoch`.
    pub fn get_latest(&self, block_root: Hash256, max_epoch: Epoch) -> Option<BeaconState<E>> {
        let cache = self.cache.read();
        cache
            .range(..=max_epoch)
            .rev()
            .find_map(|(_, roots)| roots.get(&block_root))
            .cloned()
    }

    /// Drops every epoch strictly before the finalized epoch.
    pub fn prune_finalized(&self, finalized_epoch: Epoch) {
        self.cache.write().retain(|epoch, _| *epoch >= finalized_epoch);
    }

    /// Caps the cache to its maximum epoch count, evicting the oldest epochs first but never
    /// the finalized or justified epoch.
    pub fn prune(&self, finalized_epoch: Epoch, justified_epoch: Epoch) {
        let mut cache = self.cache.write();
        while cache.len() > self.max_epochs {
            let victim = cache
                .keys()
                .find(|epoch| **epoch != finalized_epoch && **epoch != justified_epoch)
                .copied();
            match victim {
                Some(epoch) => {
                    cache.remove(&epoch);
                }
                None => break,
            }
        }
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Total number of cached states across all epochs.
    pub fn len(&self) -> usize {
        self.cache.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn epochs(&self) -> Vec<Epoch> {
        self.cache.read().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{MinimalEthSpec, Slot, Validator};

    type E = MinimalEthSpec;

    fn state_at_slot(slot: u64) -> BeaconState<E> {
        let mut state = BeaconState::genesis(0, vec![Validator::default(); 4]);
        state.slot = Slot::new(slot);
        state
    }

    fn checkpoint(epoch: u64, root_byte: u8) -> Checkpoint {
        Checkpoint {
            epoch: Epoch::new(epoch),
            root: Hash256::repeat_byte(root_byte),
        }
    }

    #[test]
    fn add_is_idempotent() {
        let cache = CheckpointStateCache::<E>::new(4);
        let cp = checkpoint(1, 1);

        cache.add(&cp, &state_at_slot(8));
        cache.add(&cp, &state_at_slot(9));

        assert_eq!(cache.len(), 1);
        // First write wins.
        assert_eq!(cache.get(&cp).unwrap().slot, Slot::new(8));
    }

    #[test]
    fn get_latest_picks_greatest_epoch_within_bound() {
        let cache = CheckpointStateCache::<E>::new(8);
        let root = Hash256::repeat_byte(1);
        for epoch in [1u64, 3, 5] {
            cache.add(
                &Checkpoint {
                    epoch: Epoch::new(epoch),
                    root,
                },
                &state_at_slot(epoch * 8),
            );
        }

        let hit = cache.get_latest(root, Epoch::new(4)).unwrap();
        assert_eq!(hit.slot, Slot::new(24));

        let hit = cache.get_latest(root, Epoch::new(5)).unwrap();
        assert_eq!(hit.slot, Slot::new(40));

        assert!(cache.get_latest(root, Epoch::new(0)).is_none());
        assert!(cache
            .get_latest(Hash256::repeat_byte(9), Epoch::new(5))
            .is_none());
    }

    #[test]
    fn prune_finalized_drops_older_epochs_only() {
        let cache = CheckpointStateCache::<E>::new(8);
        for epoch in 0..4u64 {
            cache.add(&checkpoint(epoch, epoch as u8), &state_at_slot(epoch * 8));
        }

        cache.prune_finalized(Epoch::new(2));

        assert_eq!(cache.epochs(), vec![Epoch::new(2), Epoch::new(3)]);
    }

    #[test]
    fn prune_caps_epochs_but_protects_finalized_and_justified() {
        let cache = CheckpointStateCache::<E>::new(3);
        for epoch in 0..5u64 {
            cache.add(&checkpoint(epoch, epoch as u8), &state_at_slot(epoch * 8));
        }

        cache.prune(Epoch::new(0), Epoch::new(1));

        // Epochs 2 and 3 are the oldest unprotected ones; they go first.
        assert_eq!(
            cache.epochs(),
            vec![Epoch::new(0), Epoch::new(1), Epoch::new(4)]
        );
    }
}
