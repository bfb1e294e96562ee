use std::mem;
use types::{BeaconState, BeaconStateError, Checkpoint, Epoch, EthSpec};

#[derive(Debug, PartialEq)]
pub enum EpochProcessingError {
    BeaconStateError(BeaconStateError),
}

impl From<BeaconStateError> for EpochProcessingError {
    fn from(e: BeaconStateError) -> Self {
        EpochProcessingError::BeaconStateError(e)
    }
}

/// Performs per-epoch processing on a state at the last slot of an epoch (i.e. prior to the slot
/// increment into the next epoch).
pub fn per_epoch_processing<E: EthSpec>(
    state: &mut BeaconState<E>,
) -> Result<(), EpochProcessingError> {
    // The context of the epoch that is ending is required for the total active balance.
    state.build_epoch_context()?;

    process_justification_and_finalization(state)?;

    // Rotate participation: the current epoch becomes the previous one.
    let validator_count = state.validators.len();
    state.previous_epoch_participation = mem::replace(
        &mut state.current_epoch_participation,
        vec![false; validator_count],
    );

    Ok(())
}

/// Casper FFG: justify epochs whose target attestations reached a 2/3 supermajority of the
/// active balance, and finalize justified epochs per the consensus-spec "k-finality" rules.
fn process_justification_and_finalization<E: EthSpec>(
    state: &mut BeaconState<E>,
) -> Result<(), EpochProcessingError> {
    let current_epoch = state.current_epoch();
    if current_epoch <= Epoch::new(1) {
        return Ok(());
    }

    let previous_epoch = state.previous_epoch();
    let total_active_balance = state.epoch_context()?.total_active_balance;
    let previous_target_balance = unslashed_participating_balance(state, false);
    let current_target_balance = unslashed_participating_balance(state, true);

    let old_previous_justified = state.previous_justified_checkpoint;
    let old_current_justified = state.current_justified_checkpoint;

    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    state.justification_bits = (state.justification_bits << 1) & 0b1111;

    if previous_target_balance.saturating_mul(3) >= total_active_balance.saturating_mul(2) {
        state.current_justified_checkpoint = Checkpoint {
            epoch: previous_epoch,
            root: state.get_block_root_at_epoch_start(previous_epoch)?,
        };
        state.justification_bits |= 0b0010;
    }
    if current_target_balance.saturating_mul(3) >= total_active_balance.saturating_mul(2) {
        state.current_justified_checkpoint = Checkpoint {
            epoch: current_epoch,
            root: state.get_block_root_at_epoch_start(current_epoch)?,
        };
        state.justification_bits |= 0b0001;
    }

    let bits = state.justification_bits;

    // The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source.
    if bits & 0b1110 == 0b1110 && old_previous_justified.epoch + 3 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    // The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source.
    if bits & 0b0110 == 0b0110 && old_previous_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    // The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source.
    if bits & 0b0111 == 0b0111 && old_current_justified.epoch + 3 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }
    // The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source.
    if bits & 0b0011 == 0b0011 && old_current_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }

    Ok(())
}

/// Sum of effective balances of unslashed validators with a target vote in the given epoch.
fn unslashed_participating_balance<E: EthSpec>(
    state: &BeaconState<E>,
    current_epoch: bool,
) -> u64 {
    let participation = if current_epoch {
        &state.current_epoch_participation
    } else {
        &state.previous_epoch_participation
    };

    state
        .validators
        .iter()
        .zip(participation)
        .filter(|(validator, &participated)| participated && !validator.slashed)
        .map(|(validator, _)| validator.effective_balance)
        .sum()
}
