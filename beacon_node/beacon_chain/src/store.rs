use parking_lot::RwLock;
use std::collections::HashMap;
use types::{Hash256, SignedBeaconBlock};

#[derive(Debug)]
pub enum StoreError {
    DBError(String),
}

/// Durable block storage.
///
/// States are never persisted by the pipeline; only blocks are, so any state can be rebuilt by
/// replaying blocks over a cached ancestor state.
pub trait BlockStore: Send + Sync + 'static {
    fn put_block(&self, block_root: Hash256, block: SignedBeaconBlock) -> Result<(), StoreError>;

    fn get_block(&self, block_root: &Hash256) -> Result<Option<SignedBeaconBlock>, StoreError>;

    fn block_exists(&self, block_root: &Hash256) -> Result<bool, StoreError> {
        Ok(self.get_block(block_root)?.is_some())
    }
}

/// A block store backed by a `HashMap`, for testing and ephemeral chains.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<Hash256, SignedBeaconBlock>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete_block(&self, block_root: &Hash256) {
        self.blocks.write().remove(block_root);
    }
}

impl BlockStore for MemoryStore {
    fn put_block(&self, block_root: Hash256, block: SignedBeaconBlock) -> Result<(), StoreError> {
        self.blocks.write().insert(block_root, block);
        Ok(())
    }

    fn get_block(&self, block_root: &Hash256) -> Result<Option<SignedBeaconBlock>, StoreError> {
        Ok(self.blocks.read().get(block_root).cloned())
    }
}
