//! The interface between the import pipeline and the fork-choice rule.
//!
//! The pipeline does not implement fork choice itself; it feeds blocks and attestations into an
//! implementation of the `ForkChoice` trait and reads back block summaries, checkpoints and the
//! head. Each known block is summarised as a `ProtoBlock`.

use strum::IntoStaticStr;
use types::{
    BeaconState, Checkpoint, EthSpec, ExecutionBlockHash, Hash256, IndexedAttestation,
    SignedBeaconBlock, Slot,
};

/// The execution-layer verification status of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The execution engine verified the block's payload.
    Valid,
    /// The payload could not be verified yet; the block was imported optimistically.
    Syncing,
    /// The execution engine deemed the payload (or an ancestor's payload) invalid.
    Invalid,
    /// The block predates the merge and carries no payload.
    PreMerge,
}

impl ExecutionStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ExecutionStatus::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ExecutionStatus::Invalid)
    }

    pub fn is_pre_merge(&self) -> bool {
        matches!(self, ExecutionStatus::PreMerge)
    }
}

/// A summary of a block kept by fork choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoBlock {
    pub slot: Slot,
    pub block_root: Hash256,
    pub parent_root: Hash256,
    /// Root of the block's post-state.
    pub state_root: Hash256,
    pub execution_status: ExecutionStatus,
    pub execution_block_hash: Option<ExecutionBlockHash>,
}

/// Data the import pipeline computed anyway and passes into `on_block` so fork choice does not
/// have to recompute it.
#[derive(Debug, Clone)]
pub struct OnBlockPrecachedData {
    pub execution_status: ExecutionStatus,
    /// Effective-balance increments at the block's justified checkpoint, with inactive and
    /// slashed validators zeroed. Only supplied when the justified checkpoint advances.
    pub justified_balances: Option<Vec<u64>>,
}

#[derive(Debug, PartialEq, Eq, IntoStaticStr)]
pub enum InvalidAttestationError {
    EmptyAggregationBitfield,
    UnknownHeadBlock { beacon_block_root: Hash256 },
    UnknownTargetRoot(Hash256),
    AttestsToFutureBlock { block: Slot, attestation: Slot },
}

#[derive(Debug)]
pub enum ForkChoiceError {
    MissingProtoBlock(Hash256),
    InvalidAttestation(InvalidAttestationError),
}

/// The fork-choice rule, from the import pipeline's point of view.
///
/// Implementations are driven under an external lock; methods are synchronous and must not
/// block.
pub trait ForkChoice<E: EthSpec>: Send + Sync + 'static {
    fn contains_block(&self, block_root: &Hash256) -> bool;

    fn get_block(&self, block_root: &Hash256) -> Option<ProtoBlock>;

    /// Finds the block whose post-state has the given root.
    fn find_block_by_state_root(&self, state_root: &Hash256) -> Option<ProtoBlock>;

    /// Iterates the chain from `block_root` (inclusive) towards genesis.
    fn iter_ancestors(&self, block_root: Hash256) -> Box<dyn Iterator<Item = ProtoBlock> + '_>;

    /// Returns `true` if `ancestor_root` lies on the chain of `descendant_root` (a block is its
    /// own ancestor).
    fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool;

    /// Number of slots between `old_head` and its closest common ancestor with `new_head`, or
    /// `None` if the two share no ancestor.
    fn common_ancestor_depth(&self, old_head: &ProtoBlock, new_head: &ProtoBlock) -> Option<u64>;

    fn justified_checkpoint(&self) -> Checkpoint;

    fn finalized_checkpoint(&self) -> Checkpoint;

    fn justified_block(&self) -> Option<ProtoBlock>;

    fn on_block(
        &mut self,
        block: &SignedBeaconBlock,
        block_root: Hash256,
        state: &BeaconState<E>,
        precached: OnBlockPrecachedData,
    ) -> Result<(), ForkChoiceError>;

    fn on_attestation(&mut self, attestation: &IndexedAttestation) -> Result<(), ForkChoiceError>;

    /// The head as of the last `update_head` call.
    fn get_head(&self) -> ProtoBlock;

    /// Recomputes and returns the head.
    fn update_head(&mut self) -> ProtoBlock;

    /// The execution engine vouched for `latest_valid_hash`: it and its ancestors are valid.
    fn on_valid_execution_payload(&mut self, latest_valid_hash: ExecutionBlockHash);

    /// The execution engine rejected a payload. When `invalidate_from` is given, that block and
    /// all its descendants must be marked invalid.
    fn on_invalid_execution_payload(
        &mut self,
        latest_valid_hash: Option<ExecutionBlockHash>,
        invalidate_from: Option<Hash256>,
    );
}
