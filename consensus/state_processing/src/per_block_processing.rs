use types::{
    Attestation, BeaconState, BeaconStateError, Checkpoint, EthSpec, ExecutionBlockHash, Hash256,
    SignedBeaconBlock, Slot,
};

#[derive(Debug, PartialEq)]
pub enum HeaderInvalid {
    StateSlotMismatch { block_slot: Slot, state_slot: Slot },
    OlderThanLatestBlockHeader { block_slot: Slot, header_slot: Slot },
    ParentBlockRootMismatch { state: Hash256, block: Hash256 },
    ProposerIndexMismatch { block_proposer_index: u64, state_proposer_index: u64 },
    ProposerSlashed(u64),
}

#[derive(Debug, PartialEq)]
pub enum AttestationInvalid {
    /// The attestation targets an epoch that is neither the state's current nor previous epoch.
    BadTargetEpoch,
    /// The attestation's FFG source does not match the state's justified checkpoint.
    WrongJustifiedCheckpoint { state: Checkpoint, attestation: Checkpoint },
    /// The attestation references a slot that has not happened yet.
    IncludedEarlierThanSlot { state_slot: Slot, attestation_slot: Slot },
}

#[derive(Debug, PartialEq)]
pub enum BlockProcessingError {
    HeaderInvalid(HeaderInvalid),
    AttestationInvalid { index: usize, reason: AttestationInvalid },
    /// The execution payload does not link to the previous payload.
    ExecutionHashChainIncontiguous {
        expected: ExecutionBlockHash,
        found: ExecutionBlockHash,
    },
    BeaconStateError(BeaconStateError),
}

impl From<BeaconStateError> for BlockProcessingError {
    fn from(e: BeaconStateError) -> Self {
        BlockProcessingError::BeaconStateError(e)
    }
}

impl From<HeaderInvalid> for BlockProcessingError {
    fn from(e: HeaderInvalid) -> Self {
        BlockProcessingError::HeaderInvalid(e)
    }
}

/// Updates the state for a new block, whilst validating everything *except* signatures and the
/// block's state root (both are verified by the caller: signatures through the external batch
/// verifier, the state root after the transition completes).
///
/// The state must already have been advanced to the block's slot via `per_slot_processing`.
pub fn per_block_processing<E: EthSpec>(
    state: &mut BeaconState<E>,
    signed_block: &SignedBeaconBlock,
) -> Result<(), BlockProcessingError> {
    let block = &signed_block.message;

    state.build_epoch_context()?;

    process_block_header(state, signed_block)?;

    for (index, attestation) in block.body.attestations.iter().enumerate() {
        process_attestation(state, attestation)
            .map_err(|reason| BlockProcessingError::AttestationInvalid { index, reason })?;
    }

    if let Some(payload) = &block.body.execution_payload {
        process_execution_payload(state, payload)?;
    }

    // The state root of the new header is zeroed; it is backfilled by the next
    // `per_slot_processing` once this state's own root is known.
    state.latest_block_header = block.temporary_block_header();

    Ok(())
}

fn process_block_header<E: EthSpec>(
    state: &mut BeaconState<E>,
    signed_block: &SignedBeaconBlock,
) -> Result<(), BlockProcessingError> {
    let block = &signed_block.message;

    if block.slot != state.slot {
        return Err(HeaderInvalid::StateSlotMismatch {
            block_slot: block.slot,
            state_slot: state.slot,
        }
        .into());
    }

    if block.slot <= state.latest_block_header.slot {
        return Err(HeaderInvalid::OlderThanLatestBlockHeader {
            block_slot: block.slot,
            header_slot: state.latest_block_header.slot,
        }
        .into());
    }

    let expected_parent_root = state.latest_block_header_root();
    if block.parent_root != expected_parent_root {
        return Err(HeaderInvalid::ParentBlockRootMismatch {
            state: expected_parent_root,
            block: block.parent_root,
        }
        .into());
    }

    let state_proposer_index = state.get_beacon_proposer_index(block.slot)?;
    if block.proposer_index != state_proposer_index {
        return Err(HeaderInvalid::ProposerIndexMismatch {
            block_proposer_index: block.proposer_index,
            state_proposer_index,
        }
        .into());
    }

    let proposer = state
        .validators
        .get(block.proposer_index as usize)
        .ok_or(BeaconStateError::UnknownValidator(block.proposer_index))?;
    if proposer.slashed {
        return Err(HeaderInvalid::ProposerSlashed(block.proposer_index).into());
    }

    Ok(())
}

/// Registers an attestation's target vote in the participation tracking used by the epoch
/// transition's justification machinery.
fn process_attestation<E: EthSpec>(
    state: &mut BeaconState<E>,
    attestation: &Attestation,
) -> Result<(), AttestationInvalid> {
    let data = &attestation.data;
    let current_epoch = state.current_epoch();
    let previous_epoch = state.previous_epoch();

    if data.slot >= state.slot {
        return Err(AttestationInvalid::IncludedEarlierThanSlot {
            state_slot: state.slot,
            attestation_slot: data.slot,
        });
    }

    if data.target.epoch != current_epoch && data.target.epoch != previous_epoch {
        return Err(AttestationInvalid::BadTargetEpoch);
    }

    let justified_checkpoint = if data.target.epoch == current_epoch {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    if data.source != justified_checkpoint {
        return Err(AttestationInvalid::WrongJustifiedCheckpoint {
            state: justified_checkpoint,
            attestation: data.source,
        });
    }

    // Only a target vote for the actual epoch-boundary block counts towards justification.
    let expected_target_root = state.get_block_root_at_epoch_start(data.target.epoch);
    let target_matches = matches!(expected_target_root, Ok(root) if root == data.target.root);

    if target_matches {
        if let Ok(indexed) = state.get_indexed_attestation(attestation) {
            for validator_index in &indexed.attesting_indices {
                let i = *validator_index as usize;
                if data.target.epoch == current_epoch {
                    if let Some(bit) = state.current_epoch_participation.get_mut(i) {
                        *bit = true;
                    }
                } else if let Some(bit) = state.previous_epoch_participation.get_mut(i) {
                    *bit = true;
                }
            }
        }
    }

    Ok(())
}

/// Verifies that the payload hash-chain is contiguous with the previous payload (when one
/// exists) and records the new payload hash in the state.
fn process_execution_payload<E: EthSpec>(
    state: &mut BeaconState<E>,
    payload: &types::ExecutionPayload,
) -> Result<(), BlockProcessingError> {
    let is_merge_transition = state.latest_execution_block_hash == ExecutionBlockHash::zero();
    if !is_merge_transition && payload.parent_hash != state.latest_execution_block_hash {
        return Err(BlockProcessingError::ExecutionHashChainIncontiguous {
            expected: state.latest_execution_block_hash,
            found: payload.parent_hash,
        });
    }

    state.latest_execution_block_hash = payload.block_hash;
    Ok(())
}
