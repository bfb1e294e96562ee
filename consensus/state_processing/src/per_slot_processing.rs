use crate::per_epoch_processing::{per_epoch_processing, EpochProcessingError};
use safe_arith::{ArithError, SafeArith};
use types::{BeaconState, BeaconStateError, EthSpec, Hash256};

#[derive(Debug, PartialEq)]
pub enum SlotProcessingError {
    BeaconStateError(BeaconStateError),
    EpochProcessingError(EpochProcessingError),
    ArithError(ArithError),
}

impl From<BeaconStateError> for SlotProcessingError {
    fn from(e: BeaconStateError) -> Self {
        SlotProcessingError::BeaconStateError(e)
    }
}

impl From<EpochProcessingError> for SlotProcessingError {
    fn from(e: EpochProcessingError) -> Self {
        SlotProcessingError::EpochProcessingError(e)
    }
}

impl From<ArithError> for SlotProcessingError {
    fn from(e: ArithError) -> Self {
        SlotProcessingError::ArithError(e)
    }
}

/// Advances a state forward by one slot, performing per-epoch processing if required.
///
/// If the root of the supplied `state` is known, then it can be passed as `state_root` to avoid
/// re-hashing the state.
pub fn per_slot_processing<E: EthSpec>(
    state: &mut BeaconState<E>,
    state_root: Option<Hash256>,
) -> Result<(), SlotProcessingError> {
    cache_state(state, state_root);

    if state.slot.as_u64().safe_add(1)?.safe_rem(E::slots_per_epoch())? == 0 {
        per_epoch_processing(state)?;
    }

    state.slot += 1;

    // Rebuild the epoch context whenever a new epoch is entered, so it can never be stale
    // relative to the state's slot.
    if state.slot.is_epoch_start(E::slots_per_epoch()) {
        state.build_epoch_context()?;
    }

    Ok(())
}

/// Backfill the zeroed `state_root` of the latest block header (it could not be known at block
/// processing time) and record the header's root in the block-roots ring buffer.
fn cache_state<E: EthSpec>(state: &mut BeaconState<E>, state_root: Option<Hash256>) {
    let previous_state_root = state_root.unwrap_or_else(|| state.canonical_root());

    if state.latest_block_header.state_root.is_zero() {
        state.latest_block_header.state_root = previous_state_root;
    }

    let latest_block_root = state.latest_block_header.canonical_root();
    state.set_block_root_at_slot(state.slot, latest_block_root);
}
