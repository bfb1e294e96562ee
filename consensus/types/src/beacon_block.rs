use crate::{Attestation, BeaconBlockHeader, ExecutionPayload, Hash256, Signature, Slot};
use ethereum_hashing::hash;
use ssz::Encode;
use ssz_derive::{Decode, Encode};

/// The body of a `BeaconBlock`.
///
/// Operations other than attestations (deposits, exits, slashings) are outside the scope of this
/// pipeline and are not modelled. `execution_payload` is `None` for pre-merge blocks.
#[derive(Debug, Clone, PartialEq, Default, Encode, Decode)]
pub struct BeaconBlockBody {
    pub attestations: Vec<Attestation>,
    pub execution_payload: Option<ExecutionPayload>,
}

impl BeaconBlockBody {
    pub fn canonical_root(&self) -> Hash256 {
        Hash256::from_slice(&hash(&self.as_ssz_bytes()))
    }
}

/// A block of the `BeaconChain`.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct BeaconBlock {
    pub slot: Slot,
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body: BeaconBlockBody,
}

impl BeaconBlock {
    /// Returns an "empty" block at `slot`, with all roots zeroed. Primarily for testing.
    pub fn empty(slot: Slot) -> Self {
        Self {
            slot,
            proposer_index: 0,
            parent_root: Hash256::zero(),
            state_root: Hash256::zero(),
            body: BeaconBlockBody::default(),
        }
    }

    /// Returns the header corresponding to this block.
    pub fn block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.canonical_root(),
        }
    }

    /// Returns the header with the state root zeroed, for insertion into a state whose own root
    /// is not yet known.
    pub fn temporary_block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            state_root: Hash256::zero(),
            ..self.block_header()
        }
    }

    /// The block root, defined as the root of the block's header.
    pub fn canonical_root(&self) -> Hash256 {
        self.block_header().canonical_root()
    }
}

/// A `BeaconBlock` and the proposer signature over its root.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: Signature,
}

impl SignedBeaconBlock {
    pub fn slot(&self) -> Slot {
        self.message.slot
    }

    pub fn parent_root(&self) -> Hash256 {
        self.message.parent_root
    }

    pub fn state_root(&self) -> Hash256 {
        self.message.state_root
    }

    /// The block root. Identical to the root of `self.message` since the signature is not part
    /// of the block identity.
    pub fn canonical_root(&self) -> Hash256 {
        self.message.canonical_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_ignores_signature() {
        let block = BeaconBlock::empty(Slot::new(4));
        let a = SignedBeaconBlock {
            message: block.clone(),
            signature: Signature::empty(),
        };
        let b = SignedBeaconBlock {
            message: block,
            signature: Signature::from_bytes([7; 96]),
        };
        assert_eq!(a.canonical_root(), b.canonical_root());
    }

    #[test]
    fn root_commits_to_body() {
        let mut block = BeaconBlock::empty(Slot::new(4));
        let root_a = block.canonical_root();
        block.body.execution_payload = Some(ExecutionPayload::default());
        assert_ne!(root_a, block.canonical_root());
    }
}
