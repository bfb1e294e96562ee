use crate::{Hash256, Slot};
use ethereum_hashing::hash32_concat;

/// Signature domains, mixed into signing roots so that a signature over one kind of message can
/// never be replayed as another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    BeaconProposer,
    BeaconAttester,
}

impl Domain {
    fn as_u32(self) -> u32 {
        match self {
            Domain::BeaconProposer => 0,
            Domain::BeaconAttester => 1,
        }
    }
}

/// Returns the root that is actually signed: the object root mixed with the signature domain.
pub fn compute_signing_root(object_root: Hash256, domain: Domain) -> Hash256 {
    let mut domain_bytes = [0u8; 32];
    domain_bytes[0..4].copy_from_slice(&domain.as_u32().to_le_bytes());
    Hash256::from(hash32_concat(object_root.as_bytes(), &domain_bytes))
}

/// Runtime parameters of the chain, as opposed to the compile-time `EthSpec` preset constants.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    pub genesis_slot: Slot,
    pub seconds_per_slot: u64,
    /// A block whose payload the execution engine reports as `SYNCING` may only be imported
    /// optimistically if its slot is at least this far behind the wall-clock slot (or the
    /// justified checkpoint already has execution enabled).
    pub safe_slots_to_import_optimistically: u64,
}

impl ChainSpec {
    pub fn mainnet() -> Self {
        Self {
            genesis_slot: Slot::new(0),
            seconds_per_slot: 12,
            safe_slots_to_import_optimistically: 128,
        }
    }

    pub fn minimal() -> Self {
        Self {
            seconds_per_slot: 6,
            ..Self::mainnet()
        }
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_separate_signing_roots() {
        let root = Hash256::repeat_byte(42);
        assert_ne!(
            compute_signing_root(root, Domain::BeaconProposer),
            compute_signing_root(root, Domain::BeaconAttester)
        );
    }
}
