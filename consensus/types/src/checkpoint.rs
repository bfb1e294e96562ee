use crate::{Epoch, Hash256};
use ssz_derive::{Decode, Encode};

/// Casper FFG checkpoint, identifying the block that is first-in-epoch for `epoch`.
///
/// Two checkpoints are equal iff both fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Encode, Decode)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash256,
}
