//! Chain events, delivered over per-kind broadcast channels.
//!
//! Block import buffers its events in a `PendingEvents` and flushes them only after every side
//! effect of the import has been committed, so subscribers never observe an event for a block
//! that subsequently failed to import.

use crate::fork_choice::ProtoBlock;
use slog::{trace, Logger};
use std::sync::Arc;
use tokio::sync::broadcast;
use types::{BeaconState, Checkpoint, EthSpec, Hash256, SignedBeaconBlock};

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub enum ChainEvent<E: EthSpec> {
    Block {
        block_root: Hash256,
        block: Arc<SignedBeaconBlock>,
    },
    Checkpoint {
        checkpoint: Checkpoint,
        state: Arc<BeaconState<E>>,
    },
    Head {
        head: ProtoBlock,
    },
    Reorg {
        depth: u64,
        old_head: ProtoBlock,
        new_head: ProtoBlock,
    },
    ErrorBlock {
        block_root: Hash256,
        error_code: &'static str,
    },
}

pub struct ChainEventHandler<E: EthSpec> {
    block_tx: broadcast::Sender<ChainEvent<E>>,
    checkpoint_tx: broadcast::Sender<ChainEvent<E>>,
    head_tx: broadcast::Sender<ChainEvent<E>>,
    reorg_tx: broadcast::Sender<ChainEvent<E>>,
    error_block_tx: broadcast::Sender<ChainEvent<E>>,
    log: Logger,
}

impl<E: EthSpec> ChainEventHandler<E> {
    pub fn new(log: Logger) -> Self {
        Self::new_with_capacity(DEFAULT_CHANNEL_CAPACITY, log)
    }

    pub fn new_with_capacity(capacity: usize, log: Logger) -> Self {
        let (block_tx, _) = broadcast::channel(capacity);
        let (checkpoint_tx, _) = broadcast::channel(capacity);
        let (head_tx, _) = broadcast::channel(capacity);
        let (reorg_tx, _) = broadcast::channel(capacity);
        let (error_block_tx, _) = broadcast::channel(capacity);
        Self {
            block_tx,
            checkpoint_tx,
            head_tx,
            reorg_tx,
            error_block_tx,
            log,
        }
    }

    pub fn register(&self, event: ChainEvent<E>) {
        let result = match &event {
            ChainEvent::Block { .. } => self.block_tx.send(event),
            ChainEvent::Checkpoint { .. } => self.checkpoint_tx.send(event),
            ChainEvent::Head { .. } => self.head_tx.send(event),
            ChainEvent::Reorg { .. } => self.reorg_tx.send(event),
            ChainEvent::ErrorBlock { .. } => self.error_block_tx.send(event),
        };
        if result.is_err() {
            // Normal when nothing is subscribed to this kind of event.
            trace!(self.log, "Chain event dropped without subscribers");
        }
    }

    pub fn subscribe_block(&self) -> broadcast::Receiver<ChainEvent<E>> {
        self.block_tx.subscribe()
    }

    pub fn subscribe_checkpoint(&self) -> broadcast::Receiver<ChainEvent<E>> {
        self.checkpoint_tx.subscribe()
    }

    pub fn subscribe_head(&self) -> broadcast::Receiver<ChainEvent<E>> {
        self.head_tx.subscribe()
    }

    pub fn subscribe_reorg(&self) -> broadcast::Receiver<ChainEvent<E>> {
        self.reorg_tx.subscribe()
    }

    pub fn subscribe_error_block(&self) -> broadcast::Receiver<ChainEvent<E>> {
        self.error_block_tx.subscribe()
    }
}

/// Events buffered during block import and flushed once the import has committed.
#[derive(Default)]
pub struct PendingEvents<E: EthSpec> {
    events: Vec<ChainEvent<E>>,
}

impl<E: EthSpec> PendingEvents<E> {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: ChainEvent<E>) {
        self.events.push(event);
    }

    /// Emits the buffered events in the order they were pushed.
    pub fn emit(self, handler: &ChainEventHandler<E>) {
        for event in self.events {
            handler.register(event);
        }
    }
}
