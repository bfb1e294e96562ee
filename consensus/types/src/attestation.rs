use crate::{Checkpoint, Hash256, Signature, Slot};
use ethereum_hashing::hash;
use ssz::Encode;
use ssz_derive::{Decode, Encode};

/// The data upon which an attestation is based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Encode, Decode)]
pub struct AttestationData {
    pub slot: Slot,
    pub index: u64,
    /// LMD-GHOST vote.
    pub beacon_block_root: Hash256,
    /// FFG source checkpoint.
    pub source: Checkpoint,
    /// FFG target checkpoint.
    pub target: Checkpoint,
}

impl AttestationData {
    pub fn canonical_root(&self) -> Hash256 {
        Hash256::from_slice(&hash(&self.as_ssz_bytes()))
    }
}

/// Details of an attestation that can be slashable.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Attestation {
    /// One bit per member of the committee for `(data.slot, data.index)`.
    pub aggregation_bits: Vec<bool>,
    pub data: AttestationData,
    pub signature: Signature,
}

/// Details an attestation that can be slashable.
///
/// To be included in an `AttesterSlashing`.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct IndexedAttestation {
    /// The indices of attesting validators, sorted ascending.
    pub attesting_indices: Vec<u64>,
    pub data: AttestationData,
    pub signature: Signature,
}
