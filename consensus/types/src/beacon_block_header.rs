use crate::{Hash256, Slot};
use ethereum_hashing::hash;
use ssz::Encode;
use ssz_derive::{Decode, Encode};

/// A header of a `BeaconBlock`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash, Encode, Decode)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body_root: Hash256,
}

impl BeaconBlockHeader {
    /// Returns the root of the header, which doubles as the block root of the block it
    /// describes.
    pub fn canonical_root(&self) -> Hash256 {
        Hash256::from_slice(&hash(&self.as_ssz_bytes()))
    }
}
