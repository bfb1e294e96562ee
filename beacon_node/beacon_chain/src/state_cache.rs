//! A bounded cache of recent states, keyed by state root.
//!
//! Eviction is by insertion order rather than access order: the oldest entry goes first,
//! except that the head state is never evicted. States are cloned on the way in and on the way
//! out, so callers can mutate what they get back without corrupting the cache.

use parking_lot::RwLock;
use types::{BeaconState, EthSpec, Hash256, Slot};

struct Inner<E: EthSpec> {
    max_states: usize,
    head_state_root: Hash256,
    /// Insertion order, oldest first.
    states: Vec<(Hash256, BeaconState<E>)>,
}

pub struct StateCache<E: EthSpec> {
    inner: RwLock<Inner<E>>,
}

impl<E: EthSpec> StateCache<E> {
    pub fn new(max_states: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                max_states,
                head_state_root: Hash256::zero(),
                states: Vec::new(),
            }),
        }
    }

    pub fn get(&self, state_root: &Hash256) -> Option<BeaconState<E>> {
        self.inner
            .read()
            .states
            .iter()
            .find(|(root, _)| root == state_root)
            .map(|(_, state)| state.clone())
    }

    pub fn contains(&self, state_root: &Hash256) -> bool {
        self.inner
            .read()
            .states
            .iter()
            .any(|(root, _)| root == state_root)
    }

    /// Adds a state, evicting the oldest non-head entry if the cache is full. Adding a state
    /// already present is a no-op.
    pub fn add(&self, state_root: Hash256, state: &BeaconState<E>) {
        let mut inner = self.inner.write();
        if inner.states.iter().any(|(root, _)| *root == state_root) {
            return;
        }
        inner.states.push((state_root, state.clone()));
        prune_to_capacity(&mut inner);
    }

    /// Marks the state that must never be evicted.
    pub fn update_head(&self, head_state_root: Hash256) {
        self.inner.write().head_state_root = head_state_root;
    }

    pub fn delete_state(&self, state_root: &Hash256) {
        self.inner
            .write()
            .states
            .retain(|(root, _)| root != state_root);
    }

    /// Drops all states older than the finalized slot, head excepted.
    pub fn prune_finalized(&self, finalized_slot: Slot) {
        let mut inner = self.inner.write();
        let head_state_root = inner.head_state_root;
        inner
            .states
            .retain(|(root, state)| *root == head_state_root || state.slot >= finalized_slot);
    }

    pub fn clear(&self) {
        self.inner.write().states.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune_to_capacity<E: EthSpec>(inner: &mut Inner<E>) {
    while inner.states.len() > inner.max_states {
        let head_state_root = inner.head_state_root;
        let oldest_non_head = inner
            .states
            .iter()
            .position(|(root, _)| *root != head_state_root);
        match oldest_non_head {
            Some(i) => {
                inner.states.remove(i);
            }
            None => break,
        }
    }
}
