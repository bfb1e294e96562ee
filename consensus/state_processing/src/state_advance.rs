//! Advances a state to a target slot by processing the intervening empty slots.

use crate::per_slot_processing::{per_slot_processing, SlotProcessingError};
use types::{BeaconState, EthSpec, Hash256, Slot};

#[derive(Debug, PartialEq)]
pub enum StateAdvanceError {
    BadTargetSlot { target_slot: Slot, state_slot: Slot },
    SlotProcessingError(SlotProcessingError),
}

impl From<SlotProcessingError> for StateAdvanceError {
    fn from(e: SlotProcessingError) -> Self {
        StateAdvanceError::SlotProcessingError(e)
    }
}

/// Advances `state` to `target_slot`, slot by slot.
///
/// If `state_root` is supplied it is taken as the root of `state` at its current slot, saving
/// one state hash. Returns an error if `state.slot > target_slot` (advancing never moves
/// backwards in time).
pub fn complete_state_advance<E: EthSpec>(
    state: &mut BeaconState<E>,
    mut state_root: Option<Hash256>,
    target_slot: Slot,
) -> Result<(), StateAdvanceError> {
    if state.slot > target_slot {
        return Err(StateAdvanceError::BadTargetSlot {
            target_slot,
            state_slot: state.slot,
        });
    }

    while state.slot < target_slot {
        // Only the first iteration can use the known root; later roots must be computed.
        per_slot_processing(state, state_root.take())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{MinimalEthSpec, Validator};

    type E = MinimalEthSpec;

    #[test]
    fn advances_across_epoch_boundaries() {
        let mut state = BeaconState::<E>::genesis(0, vec![Validator::default(); 4]);

        complete_state_advance(&mut state, None, Slot::new(17)).unwrap();

        assert_eq!(state.slot, Slot::new(17));
        assert_eq!(state.current_epoch(), types::Epoch::new(2));
    }

    #[test]
    fn refuses_to_rewind() {
        let mut state = BeaconState::<E>::genesis(0, vec![Validator::default(); 4]);
        state.slot = Slot::new(5);

        assert_eq!(
            complete_state_advance(&mut state, None, Slot::new(3)),
            Err(StateAdvanceError::BadTargetSlot {
                target_slot: Slot::new(3),
                state_slot: Slot::new(5),
            })
        );
    }

    #[test]
    fn advancing_to_the_current_slot_is_a_no_op() {
        let mut state = BeaconState::<E>::genesis(0, vec![Validator::default(); 4]);
        let root_before = state.canonical_root();

        complete_state_advance(&mut state, None, Slot::new(0)).unwrap();

        assert_eq!(state.canonical_root(), root_before);
    }
}
