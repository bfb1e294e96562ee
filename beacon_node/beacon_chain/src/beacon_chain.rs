//! The `BeaconChain`: ties the caches, regenerator, fork choice, execution engine and store
//! together behind a serializing block-import queue.

use crate::block_importer::import_block;
use crate::block_verification::{verify_block, BlockError, PartiallyVerifiedBlock};
use crate::chain_config::ChainConfig;
use crate::checkpoint_state_cache::CheckpointStateCache;
use crate::errors::BeaconChainError;
use crate::events::{ChainEvent, ChainEventHandler};
use crate::execution_engine::ExecutionEngine;
use crate::fork_choice::{ForkChoice, ProtoBlock};
use crate::job_queue::JobQueue;
use crate::regen::{QueuedStateRegenerator, StateRegenerator};
use crate::signature_verifier::SignatureVerifier;
use crate::state_cache::StateCache;
use crate::store::BlockStore;
use futures::FutureExt;
use parking_lot::RwLock;
use slog::{debug, Logger};
use slot_clock::SlotClock;
use std::sync::Arc;
use tokio::sync::watch;
use types::{ChainSpec, EthSpec, Hash256, SignedBeaconBlock, Slot};

/// The collection of concrete component types a `BeaconChain` is instantiated over.
pub trait BeaconChainTypes: Send + Sync + 'static {
    type EthSpec: EthSpec;
    type SlotClock: SlotClock + 'static;
    type ForkChoice: ForkChoice<Self::EthSpec>;
    type ExecutionEngine: ExecutionEngine;
    type SignatureVerifier: SignatureVerifier;
    type Store: BlockStore;
}

pub struct BeaconChain<T: BeaconChainTypes> {
    pub spec: ChainSpec,
    pub config: ChainConfig,
    pub genesis_block_root: Hash256,
    pub slot_clock: T::SlotClock,
    pub fork_choice: Arc<RwLock<T::ForkChoice>>,
    pub execution_engine: Arc<T::ExecutionEngine>,
    pub signature_verifier: Arc<T::SignatureVerifier>,
    pub store: Arc<T::Store>,
    pub state_cache: Arc<StateCache<T::EthSpec>>,
    pub checkpoint_state_cache: Arc<CheckpointStateCache<T::EthSpec>>,
    pub regen: QueuedStateRegenerator<T>,
    pub event_handler: Arc<ChainEventHandler<T::EthSpec>>,
    block_queue: JobQueue<Result<Hash256, BlockError<T::EthSpec>>>,
    pub log: Logger,
}

/// Options for `process_chain_segment`.
#[derive(Debug, Clone)]
pub struct ChainSegmentOpts {
    /// Skip over blocks that are already imported (or are the genesis block) instead of
    /// failing the segment.
    pub ignore_if_known: bool,
    /// Skip over blocks at or before the finalized slot instead of failing the segment.
    pub ignore_if_finalized: bool,
}

impl Default for ChainSegmentOpts {
    fn default() -> Self {
        Self {
            ignore_if_known: true,
            ignore_if_finalized: true,
        }
    }
}

/// The outcome of importing a segment of consecutive blocks.
pub enum ChainSegmentResult<E: EthSpec> {
    Successful {
        imported_blocks: usize,
    },
    Failed {
        imported_blocks: usize,
        error: BlockError<E>,
    },
}

impl<T: BeaconChainTypes> BeaconChain<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spec: ChainSpec,
        config: ChainConfig,
        genesis_block_root: Hash256,
        slot_clock: T::SlotClock,
        fork_choice: T::ForkChoice,
        execution_engine: T::ExecutionEngine,
        signature_verifier: T::SignatureVerifier,
        store: T::Store,
        shutdown: watch::Receiver<bool>,
        log: Logger,
    ) -> Arc<Self> {
        let fork_choice = Arc::new(RwLock::new(fork_choice));
        let store = Arc::new(store);
        let state_cache = Arc::new(StateCache::new(config.state_cache_size));
        let checkpoint_state_cache = Arc::new(CheckpointStateCache::new(
            config.checkpoint_state_cache_max_epochs,
        ));
        let event_handler = Arc::new(ChainEventHandler::new(log.clone()));

        let regenerator = StateRegenerator::<T>::new(
            fork_choice.clone(),
            state_cache.clone(),
            checkpoint_state_cache.clone(),
            store.clone(),
            event_handler.clone(),
            config.clone(),
            log.clone(),
        );
        let regen =
            QueuedStateRegenerator::new(regenerator, &config, shutdown.clone(), log.clone());

        let block_queue = JobQueue::spawn(
            "block_processor",
            config.block_queue_max_length,
            shutdown,
            log.clone(),
        );

        Arc::new(Self {
            spec,
            config,
            genesis_block_root,
            slot_clock,
            fork_choice,
            execution_engine: Arc::new(execution_engine),
            signature_verifier: Arc::new(signature_verifier),
            store,
            state_cache,
            checkpoint_state_cache,
            regen,
            event_handler,
            block_queue,
            log,
        })
    }

    /// Reads the current wall-clock slot.
    pub fn slot(&self) -> Result<Slot, BeaconChainError> {
        self.slot_clock
            .now()
            .ok_or(BeaconChainError::UnableToReadSlot)
    }

    /// The current head block, per fork choice.
    pub fn head(&self) -> ProtoBlock {
        self.fork_choice.read().get_head()
    }

    /// Verifies and imports a block. Blocks are processed strictly one at a time, in the order
    /// the calls arrive; the returned future resolves once this block's turn has come and its
    /// import finished.
    pub async fn process_block(
        self: &Arc<Self>,
        partially_verified: PartiallyVerifiedBlock,
    ) -> Result<Hash256, BlockError<T::EthSpec>> {
        let chain = self.clone();
        let work = async move { chain.verify_and_import(partially_verified).await }.boxed();
        match self.block_queue.push(work).await {
            Ok(result) => result,
            Err(e) => Err(BlockError::BeaconChainError(BeaconChainError::QueueError(e))),
        }
    }

    async fn verify_and_import(
        self: Arc<Self>,
        partially_verified: PartiallyVerifiedBlock,
    ) -> Result<Hash256, BlockError<T::EthSpec>> {
        let block_root = partially_verified.block.canonical_root();
        let slot = partially_verified.block.slot();

        let result = async {
            let fully_verified = verify_block(&self, partially_verified, block_root).await?;
            import_block(&self, fully_verified)
                .await
                .map_err(BlockError::BeaconChainError)
        }
        .await;

        if let Err(e) = &result {
            debug!(
                self.log,
                "Block rejected";
                "block_root" => ?block_root,
                "slot" => %slot,
                "code" => e.code(),
            );
            self.event_handler.register(ChainEvent::ErrorBlock {
                block_root,
                error_code: e.code(),
            });
        }

        result
    }

    /// Imports a segment of consecutive blocks in order, stopping at the first failure that the
    /// options do not permit skipping.
    pub async fn process_chain_segment(
        self: &Arc<Self>,
        blocks: Vec<Arc<SignedBeaconBlock>>,
        opts: ChainSegmentOpts,
    ) -> ChainSegmentResult<T::EthSpec> {
        let mut imported_blocks = 0;
        for block in blocks {
            match self.process_block(PartiallyVerifiedBlock::new(block)).await {
                Ok(_) => imported_blocks += 1,
                Err(BlockError::BlockIsAlreadyKnown) | Err(BlockError::GenesisBlock)
                    if opts.ignore_if_known => {}
                Err(BlockError::WouldRevertFinalizedSlot { .. }) if opts.ignore_if_finalized => {}
                Err(error) => {
                    return ChainSegmentResult::Failed {
                        imported_blocks,
                        error,
                    }
                }
            }
        }
        ChainSegmentResult::Successful { imported_blocks }
    }
}
