//! The block verification and import pipeline of a beacon node.
//!
//! Blocks enter through [`BeaconChain::process_block`] (or
//! [`BeaconChain::process_chain_segment`]), are fully verified by
//! [`block_verification::verify_block`] and imported by [`block_importer::import_block`], all
//! behind a serializing job queue. State lookups that miss the caches are answered by the
//! [`regen`] module, which replays stored blocks over cached ancestor states.

pub mod beacon_chain;
pub mod block_importer;
pub mod block_verification;
pub mod chain_config;
pub mod checkpoint_state_cache;
pub mod errors;
pub mod events;
pub mod execution_engine;
pub mod execution_payload;
pub mod fork_choice;
pub mod job_queue;
pub mod regen;
pub mod signature_verifier;
pub mod state_cache;
pub mod store;
pub mod test_utils;

pub use crate::beacon_chain::{
    BeaconChain, BeaconChainTypes, ChainSegmentOpts, ChainSegmentResult,
};
pub use block_verification::{BlockError, FullyVerifiedBlock, PartiallyVerifiedBlock};
pub use chain_config::ChainConfig;
pub use checkpoint_state_cache::CheckpointStateCache;
pub use errors::BeaconChainError;
pub use events::{ChainEvent, ChainEventHandler};
pub use execution_engine::{ExecutionEngine, PayloadStatus};
pub use fork_choice::{
    ExecutionStatus, ForkChoice, ForkChoiceError, InvalidAttestationError, OnBlockPrecachedData,
    ProtoBlock,
};
pub use job_queue::{JobQueue, QueueError};
pub use regen::{QueuedRegenError, QueuedStateRegenerator, RegenError, StateRegenerator};
pub use signature_verifier::SignatureVerifier;
pub use state_cache::StateCache;
pub use store::{BlockStore, MemoryStore, StoreError};
