use crate::Hash256;
use ssz_derive::{Decode, Encode};
use std::fmt;

/// Hash of an execution-layer block. Distinct from `Hash256` to prevent mixing consensus block
/// roots with execution block hashes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Encode, Decode)]
#[ssz(struct_behaviour = "transparent")]
pub struct ExecutionBlockHash(pub Hash256);

impl ExecutionBlockHash {
    pub fn zero() -> Self {
        Self(Hash256::zero())
    }

    pub fn into_root(self) -> Hash256 {
        self.0
    }
}

impl fmt::Debug for ExecutionBlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for ExecutionBlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// The execution-layer payload carried by a post-merge block.
///
/// Only the fields this pipeline inspects are modelled; the payload body is validated by the
/// external execution engine, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ExecutionPayload {
    pub parent_hash: ExecutionBlockHash,
    pub block_hash: ExecutionBlockHash,
    pub block_number: u64,
    pub timestamp: u64,
}
