//! The deterministic state-transition functions mapping `(pre-state, block)` to a post-state.
//!
//! Signature verification is deliberately absent from the transition itself: callers collect
//! signature sets via the `signature_sets` module and verify them through an external batchable
//! verifier, either individually or batched across a whole block.

pub mod per_block_processing;
pub mod per_epoch_processing;
pub mod per_slot_processing;
pub mod signature_sets;
pub mod state_advance;

pub use per_block_processing::{
    per_block_processing, AttestationInvalid, BlockProcessingError, HeaderInvalid,
};
pub use per_epoch_processing::{per_epoch_processing, EpochProcessingError};
pub use per_slot_processing::{per_slot_processing, SlotProcessingError};
pub use signature_sets::{
    block_signature_sets, block_signature_sets_except_proposer, SignatureSet, SignatureSetError,
};
pub use state_advance::{complete_state_advance, StateAdvanceError};
