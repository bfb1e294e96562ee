//! State regeneration: producing the state for an arbitrary `(block_root, slot)` pair from the
//! caches, replaying stored blocks over a cached ancestor state when necessary.
//!
//! Regeneration requests are CPU-heavy, so callers go through `QueuedStateRegenerator`, which
//! serializes them behind a bounded FIFO queue and answers cache hits without queueing at all.

use crate::chain_config::ChainConfig;
use crate::checkpoint_state_cache::CheckpointStateCache;
use crate::events::{ChainEvent, ChainEventHandler};
use crate::fork_choice::ForkChoice;
use crate::job_queue::{JobQueue, QueueError};
use crate::state_cache::StateCache;
use crate::store::BlockStore;
use crate::BeaconChainTypes;
use futures::FutureExt;
use parking_lot::RwLock;
use slog::{debug, Logger};
use state_processing::{
    complete_state_advance, per_block_processing, BlockProcessingError, StateAdvanceError,
};
use std::sync::Arc;
use tokio::sync::watch;
use types::{BeaconBlock, BeaconState, Checkpoint, EthSpec, Hash256, Slot};

#[derive(Debug)]
pub enum StateTransitionError {
    SlotProcessing(StateAdvanceError),
    BlockProcessing(BlockProcessingError),
}

impl From<StateAdvanceError> for StateTransitionError {
    fn from(e: StateAdvanceError) -> Self {
        StateTransitionError::SlotProcessing(e)
    }
}

impl From<BlockProcessingError> for StateTransitionError {
    fn from(e: BlockProcessingError) -> Self {
        StateTransitionError::BlockProcessing(e)
    }
}

#[derive(Debug)]
pub enum RegenError {
    BlockNotInForkChoice(Hash256),
    StateNotInForkChoice(Hash256),
    /// A state was requested for a slot earlier than its block.
    SlotBeforeBlockSlot { slot: Slot, block_slot: Slot },
    /// No cached state was found anywhere on the ancestor chain to replay from.
    NoSeedState,
    /// Reaching a cached ancestor state would require replaying more blocks than permitted.
    TooManyBlocksProcessed { state_root: Hash256 },
    BlockNotInDb(Hash256),
    StateTransitionError(StateTransitionError),
}

/// A regeneration request that failed either in the queue or during regeneration proper.
#[derive(Debug)]
pub enum QueuedRegenError {
    Queue(QueueError),
    Regen(RegenError),
}

/// Rebuilds states from the caches and the block store.
pub struct StateRegenerator<T: BeaconChainTypes> {
    fork_choice: Arc<RwLock<T::ForkChoice>>,
    state_cache: Arc<StateCache<T::EthSpec>>,
    checkpoint_state_cache: Arc<CheckpointStateCache<T::EthSpec>>,
    store: Arc<T::Store>,
    event_handler: Arc<ChainEventHandler<T::EthSpec>>,
    config: ChainConfig,
    log: Logger,
}

impl<T: BeaconChainTypes> Clone for StateRegenerator<T> {
    fn clone(&self) -> Self {
        Self {
            fork_choice: self.fork_choice.clone(),
            state_cache: self.state_cache.clone(),
            checkpoint_state_cache: self.checkpoint_state_cache.clone(),
            store: self.store.clone(),
            event_handler: self.event_handler.clone(),
            config: self.config.clone(),
            log: self.log.clone(),
        }
    }
}

impl<T: BeaconChainTypes> StateRegenerator<T> {
    pub fn new(
        fork_choice: Arc<RwLock<T::ForkChoice>>,
        state_cache: Arc<StateCache<T::EthSpec>>,
        checkpoint_state_cache: Arc<CheckpointStateCache<T::EthSpec>>,
        store: Arc<T::Store>,
        event_handler: Arc<ChainEventHandler<T::EthSpec>>,
        config: ChainConfig,
        log: Logger,
    ) -> Self {
        Self {
            fork_choice,
            state_cache,
            checkpoint_state_cache,
            store,
            event_handler,
            config,
            log,
        }
    }

    /// The state a block must be processed against: its parent's state, dialed forward to the
    /// start of the block's epoch when the block is the first of a new epoch.
    pub async fn get_pre_state(
        &self,
        block: &BeaconBlock,
    ) -> Result<BeaconState<T::EthSpec>, RegenError> {
        let parent = self
            .fork_choice
            .read()
            .get_block(&block.parent_root)
            .ok_or(RegenError::BlockNotInForkChoice(block.parent_root))?;

        let slots_per_epoch = T::EthSpec::slots_per_epoch();
        let block_epoch = block.slot.epoch(slots_per_epoch);

        if parent.slot.epoch(slots_per_epoch) < block_epoch {
            // Dial to the epoch boundary so the checkpoint state gets cached; the caller
            // advances over the remaining intra-epoch slots.
            self.get_checkpoint_state(&Checkpoint {
                epoch: block_epoch,
                root: block.parent_root,
            })
            .await
        } else {
            self.get_state(parent.state_root).await
        }
    }

    /// Cache-only variant of `get_pre_state`, for answering without occupying the queue.
    pub fn get_pre_state_cached(&self, block: &BeaconBlock) -> Option<BeaconState<T::EthSpec>> {
        let parent = self.fork_choice.read().get_block(&block.parent_root)?;

        let slots_per_epoch = T::EthSpec::slots_per_epoch();
        let block_epoch = block.slot.epoch(slots_per_epoch);

        if parent.slot.epoch(slots_per_epoch) < block_epoch {
            self.checkpoint_state_cache.get(&Checkpoint {
                epoch: block_epoch,
                root: block.parent_root,
            })
        } else {
            self.state_cache.get(&parent.state_root)
        }
    }

    /// The state at `checkpoint`: the state of the checkpoint's block dialed forward to the
    /// first slot of the checkpoint's epoch.
    pub async fn get_checkpoint_state(
        &self,
        checkpoint: &Checkpoint,
    ) -> Result<BeaconState<T::EthSpec>, RegenError> {
        if let Some(state) = self.checkpoint_state_cache.get(checkpoint) {
            return Ok(state);
        }
        self.get_block_slot_state(
            checkpoint.root,
            checkpoint.epoch.start_slot(T::EthSpec::slots_per_epoch()),
        )
        .await
    }

    /// The state of `block_root`'s block dialed forward to `slot` with empty-slot processing.
    pub async fn get_block_slot_state(
        &self,
        block_root: Hash256,
        slot: Slot,
    ) -> Result<BeaconState<T::EthSpec>, RegenError> {
        let block = self
            .fork_choice
            .read()
            .get_block(&block_root)
            .ok_or(RegenError::BlockNotInForkChoice(block_root))?;

        if slot < block.slot {
            return Err(RegenError::SlotBeforeBlockSlot {
                slot,
                block_slot: block.slot,
            });
        }

        let state = match self
            .checkpoint_state_cache
            .get_latest(block_root, slot.epoch(T::EthSpec::slots_per_epoch()))
        {
            Some(state) => state,
            None => self.get_state(block.state_root).await?,
        };

        self.process_slots(state, slot).await
    }

    /// The state with the given root exactly: from the cache if possible, otherwise rebuilt by
    /// replaying stored blocks over the nearest cached ancestor state.
    pub async fn get_state(
        &self,
        state_root: Hash256,
    ) -> Result<BeaconState<T::EthSpec>, RegenError> {
        if let Some(state) = self.state_cache.get(&state_root) {
            return Ok(state);
        }

        let max_replay_blocks =
            (self.config.max_replay_epochs * T::EthSpec::slots_per_epoch()) as usize;

        // Walk the ancestor chain under the fork-choice lock, collecting the blocks that must
        // be replayed until a cached state is found.
        let (seed, blocks_to_replay) = {
            let fork_choice = self.fork_choice.read();
            let target_block = fork_choice
                .find_block_by_state_root(&state_root)
                .ok_or(RegenError::StateNotInForkChoice(state_root))?;

            let mut blocks_to_replay = vec![target_block.clone()];
            let mut seed = None;

            for ancestor in fork_choice.iter_ancestors(target_block.parent_root) {
                if let Some(state) = self.state_cache.get(&ancestor.state_root) {
                    seed = Some(state);
                    break;
                }
                // A checkpoint state of this ancestor works as a seed provided it does not
                // overshoot the next block to be replayed.
                let child_epoch = blocks_to_replay
                    .last()
                    .map_or(target_block.slot, |block| block.slot)
                    .epoch(T::EthSpec::slots_per_epoch());
                if let Some(state) = self
                    .checkpoint_state_cache
                    .get_latest(ancestor.block_root, child_epoch)
                {
                    seed = Some(state);
                    break;
                }
                if blocks_to_replay.len() >= max_replay_blocks {
                    return Err(RegenError::TooManyBlocksProcessed { state_root });
                }
                blocks_to_replay.push(ancestor);
            }

            (seed, blocks_to_replay)
        };

        let mut state = seed.ok_or(RegenError::NoSeedState)?;

        debug!(
            self.log,
            "Replaying blocks to regenerate state";
            "state_root" => ?state_root,
            "blocks" => blocks_to_replay.len(),
            "from_slot" => %state.slot,
        );

        for proto_block in blocks_to_replay.iter().rev() {
            let block = self
                .store
                .get_block(&proto_block.block_root)
                .map_err(|_| RegenError::BlockNotInDb(proto_block.block_root))?
                .ok_or(RegenError::BlockNotInDb(proto_block.block_root))?;

            state = self.process_slots(state, block.slot()).await?;
            per_block_processing(&mut state, &block)
                .map_err(|e| RegenError::StateTransitionError(e.into()))?;

            // Replays can be long; yield between blocks so other tasks are not starved.
            tokio::task::yield_now().await;
        }

        Ok(state)
    }

    /// Advances `state` to `target_slot`, caching (and announcing) the checkpoint state at
    /// every epoch boundary crossed along the way so later regenerations can start there.
    async fn process_slots(
        &self,
        mut state: BeaconState<T::EthSpec>,
        target_slot: Slot,
    ) -> Result<BeaconState<T::EthSpec>, RegenError> {
        let slots_per_epoch = T::EthSpec::slots_per_epoch();

        let mut next_boundary = (state.current_epoch() + 1).start_slot(slots_per_epoch);
        while next_boundary <= target_slot {
            complete_state_advance(&mut state, None, next_boundary)
                .map_err(|e| RegenError::StateTransitionError(e.into()))?;

            let checkpoint = Checkpoint {
                epoch: state.current_epoch(),
                root: state.latest_block_header_root(),
            };
            self.checkpoint_state_cache.add(&checkpoint, &state);
            self.event_handler.register(ChainEvent::Checkpoint {
                checkpoint,
                state: Arc::new(state.clone()),
            });

            tokio::task::yield_now().await;
            next_boundary = next_boundary + slots_per_epoch;
        }

        complete_state_advance(&mut state, None, target_slot)
            .map_err(|e| RegenError::StateTransitionError(e.into()))?;

        Ok(state)
    }
}

/// A `StateRegenerator` behind a serializing job queue.
pub struct QueuedStateRegenerator<T: BeaconChainTypes> {
    regen: StateRegenerator<T>,
    queue: JobQueue<Result<BeaconState<T::EthSpec>, RegenError>>,
    work_threshold: usize,
}

impl<T: BeaconChainTypes> QueuedStateRegenerator<T> {
    pub fn new(
        regen: StateRegenerator<T>,
        config: &ChainConfig,
        shutdown: watch::Receiver<bool>,
        log: Logger,
    ) -> Self {
        Self {
            regen,
            queue: JobQueue::spawn("state_regen", config.regen_queue_max_length, shutdown, log),
            work_threshold: config.regen_work_threshold,
        }
    }

    /// Whether the queue is idle enough to accept non-essential work.
    pub fn can_accept_work(&self) -> bool {
        self.queue.len() <= self.work_threshold
    }

    pub async fn get_pre_state(
        &self,
        block: &BeaconBlock,
    ) -> Result<BeaconState<T::EthSpec>, QueuedRegenError> {
        if let Some(state) = self.regen.get_pre_state_cached(block) {
            return Ok(state);
        }
        let regen = self.regen.clone();
        let block = block.clone();
        self.push(async move { regen.get_pre_state(&block).await }.boxed())
            .await
    }

    pub async fn get_checkpoint_state(
        &self,
        checkpoint: Checkpoint,
    ) -> Result<BeaconState<T::EthSpec>, QueuedRegenError> {
        if let Some(state) = self.regen.checkpoint_state_cache.get(&checkpoint) {
            return Ok(state);
        }
        let regen = self.regen.clone();
        self.push(async move { regen.get_checkpoint_state(&checkpoint).await }.boxed())
            .await
    }

    pub async fn get_block_slot_state(
        &self,
        block_root: Hash256,
        slot: Slot,
    ) -> Result<BeaconState<T::EthSpec>, QueuedRegenError> {
        let regen = self.regen.clone();
        self.push(async move { regen.get_block_slot_state(block_root, slot).await }.boxed())
            .await
    }

    pub async fn get_state(
        &self,
        state_root: Hash256,
    ) -> Result<BeaconState<T::EthSpec>, QueuedRegenError> {
        if let Some(state) = self.regen.state_cache.get(&state_root) {
            return Ok(state);
        }
        let regen = self.regen.clone();
        self.push(async move { regen.get_state(state_root).await }.boxed())
            .await
    }

    async fn push(
        &self,
        work: futures::future::BoxFuture<'static, Result<BeaconState<T::EthSpec>, RegenError>>,
    ) -> Result<BeaconState<T::EthSpec>, QueuedRegenError> {
        self.queue
            .push(work)
            .await
            .map_err(QueuedRegenError::Queue)?
            .map_err(QueuedRegenError::Regen)
    }
}
