//! Full verification of a block prior to import.
//!
//! Verification proceeds through sanity checks against fork choice and the clock, pre-state
//! regeneration, the state transition (with signature verification deferred and batched), the
//! execution-payload check, and finally the state-root check. A block that survives becomes a
//! `FullyVerifiedBlock`, the only type `import_block` accepts.

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::errors::BeaconChainError;
use crate::execution_payload::notify_new_payload;
use crate::fork_choice::{ExecutionStatus, ForkChoice, ProtoBlock};
use crate::regen::QueuedRegenError;
use crate::signature_verifier::SignatureVerifier;
use state_processing::{
    block_signature_sets, block_signature_sets_except_proposer, complete_state_advance,
    per_block_processing, BlockProcessingError,
};
use std::sync::Arc;
use types::{BeaconState, EthSpec, ExecutionBlockHash, Hash256, SignedBeaconBlock, Slot};

/// A block awaiting import, together with what is already known about its signatures.
///
/// The flags let gossip-verified blocks skip re-verifying the proposer signature, and backfill
/// imports of finalized chain segments skip signature verification entirely.
#[derive(Debug, Clone)]
pub struct PartiallyVerifiedBlock {
    pub block: Arc<SignedBeaconBlock>,
    /// The proposer signature has already been verified (e.g. at gossip).
    pub valid_proposer_signature: bool,
    /// Every signature in the block has already been verified.
    pub valid_signatures: bool,
    /// Do not feed the block's attestations into fork choice after import.
    pub skip_importing_attestations: bool,
}

impl PartiallyVerifiedBlock {
    pub fn new(block: Arc<SignedBeaconBlock>) -> Self {
        Self {
            block,
            valid_proposer_signature: false,
            valid_signatures: false,
            skip_importing_attestations: false,
        }
    }
}

/// A block that has passed every verification step and may be imported.
pub struct FullyVerifiedBlock<E: EthSpec> {
    pub block: Arc<SignedBeaconBlock>,
    pub block_root: Hash256,
    pub post_state: BeaconState<E>,
    pub parent_block: ProtoBlock,
    pub execution_status: ExecutionStatus,
    pub skip_importing_attestations: bool,
}

/// Reasons a block was not imported.
#[derive(Debug)]
pub enum BlockError<E: EthSpec> {
    /// The genesis block cannot be (re-)imported.
    GenesisBlock,
    /// The block conflicts with finality; importing it would revert a finalized slot.
    WouldRevertFinalizedSlot {
        block_slot: Slot,
        finalized_slot: Slot,
    },
    ParentUnknown { parent_root: Hash256 },
    FutureSlot {
        present_slot: Slot,
        block_slot: Slot,
    },
    BlockIsAlreadyKnown,
    /// The pre-state could not be regenerated.
    PrestateMissing(QueuedRegenError),
    /// The state transition rejected the block.
    PerBlockProcessingError(BlockProcessingError),
    /// At least one of the block's signatures is invalid. Carries the post-state so callers
    /// can diagnose which signature set failed.
    InvalidSignature { post_state: Box<BeaconState<E>> },
    /// The block's declared state root does not match the computed post-state root.
    StateRootMismatch { block: Hash256, local: Hash256 },
    /// The execution engine rejected the block's payload.
    ExecutionPayloadInvalid {
        latest_valid_hash: Option<ExecutionBlockHash>,
        validation_error: Option<String>,
    },
    /// The execution engine could not verify the payload and optimistic import was not safe.
    ExecutionEngineError {
        status: &'static str,
        message: String,
    },
    BeaconChainError(BeaconChainError),
}

impl<E: EthSpec> BlockError<E> {
    /// A stable short code for logs and error events.
    pub fn code(&self) -> &'static str {
        match self {
            BlockError::GenesisBlock => "GENESIS_BLOCK",
            BlockError::WouldRevertFinalizedSlot { .. } => "WOULD_REVERT_FINALIZED_SLOT",
            BlockError::ParentUnknown { .. } => "PARENT_UNKNOWN",
            BlockError::FutureSlot { .. } => "FUTURE_SLOT",
            BlockError::BlockIsAlreadyKnown => "ALREADY_KNOWN",
            BlockError::PrestateMissing(_) => "PRESTATE_MISSING",
            // The transition error detail stays on the variant; the code is the catch-all.
            BlockError::PerBlockProcessingError(_) => "BEACON_CHAIN_ERROR",
            BlockError::InvalidSignature { .. } => "INVALID_SIGNATURE",
            BlockError::StateRootMismatch { .. } => "INVALID_STATE_ROOT",
            BlockError::ExecutionPayloadInvalid { .. } => "EXECUTION_PAYLOAD_NOT_VALID",
            BlockError::ExecutionEngineError { .. } => "EXECUTION_ENGINE_ERROR",
            BlockError::BeaconChainError(_) => "BEACON_CHAIN_ERROR",
        }
    }
}

impl<E: EthSpec> From<BeaconChainError> for BlockError<E> {
    fn from(e: BeaconChainError) -> Self {
        BlockError::BeaconChainError(e)
    }
}

/// Cheap checks against fork choice and the clock that reject blocks which could never import.
/// Returns the parent's fork-choice summary on success.
pub fn check_block_relevancy<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    block: &SignedBeaconBlock,
    block_root: Hash256,
) -> Result<ProtoBlock, BlockError<T::EthSpec>> {
    if block.slot() <= chain.spec.genesis_slot {
        return Err(BlockError::GenesisBlock);
    }

    let fork_choice = chain.fork_choice.read();

    let finalized_slot = fork_choice
        .finalized_checkpoint()
        .epoch
        .start_slot(T::EthSpec::slots_per_epoch());
    if block.slot() <= finalized_slot {
        return Err(BlockError::WouldRevertFinalizedSlot {
            block_slot: block.slot(),
            finalized_slot,
        });
    }

    let parent_block = fork_choice
        .get_block(&block.parent_root())
        .ok_or(BlockError::ParentUnknown {
            parent_root: block.parent_root(),
        })?;

    let present_slot = chain.slot()?;
    if block.slot() > present_slot {
        return Err(BlockError::FutureSlot {
            present_slot,
            block_slot: block.slot(),
        });
    }

    if fork_choice.contains_block(&block_root) {
        return Err(BlockError::BlockIsAlreadyKnown);
    }

    Ok(parent_block)
}

/// Runs every verification step against a block.
pub async fn verify_block<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    partially_verified: PartiallyVerifiedBlock,
    block_root: Hash256,
) -> Result<FullyVerifiedBlock<T::EthSpec>, BlockError<T::EthSpec>> {
    let PartiallyVerifiedBlock {
        block,
        valid_proposer_signature,
        valid_signatures,
        skip_importing_attestations,
    } = partially_verified;

    let parent_block = check_block_relevancy(chain, &block, block_root)?;

    let mut state = chain
        .regen
        .get_pre_state(&block.message)
        .await
        .map_err(BlockError::PrestateMissing)?;

    // The regenerated pre-state is at most an intra-epoch distance behind the block.
    complete_state_advance(&mut state, None, block.slot())
        .map_err(|e| BlockError::BeaconChainError(e.into()))?;

    per_block_processing(&mut state, &block).map_err(BlockError::PerBlockProcessingError)?;

    if !valid_signatures {
        let sets = if valid_proposer_signature {
            block_signature_sets_except_proposer(&state, &block)
        } else {
            block_signature_sets(&state, &block, Some(block_root))
        }
        .map_err(|e| BlockError::BeaconChainError(e.into()))?;

        let valid = if sets.is_empty() {
            true
        } else if chain.config.disable_bls_batch_verify {
            let mut all_valid = true;
            for set in sets {
                if !chain
                    .signature_verifier
                    .verify_signature_sets(vec![set])
                    .await
                {
                    all_valid = false;
                    break;
                }
            }
            all_valid
        } else {
            chain.signature_verifier.verify_signature_sets(sets).await
        };

        if !valid {
            return Err(BlockError::InvalidSignature {
                post_state: Box::new(state),
            });
        }
    }

    let execution_status = notify_new_payload(chain, &block, &parent_block).await?;

    let local_root = state.canonical_root();
    if block.state_root() != local_root {
        return Err(BlockError::StateRootMismatch {
            block: block.state_root(),
            local: local_root,
        });
    }

    Ok(FullyVerifiedBlock {
        block,
        block_root,
        post_state: state,
        parent_block,
        execution_status,
        skip_importing_attestations,
    })
}
