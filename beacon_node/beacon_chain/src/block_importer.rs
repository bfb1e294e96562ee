//! Import of a fully-verified block: fork-choice registration, cache updates, head update and
//! persistence, with events buffered until everything has committed.

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::block_verification::FullyVerifiedBlock;
use crate::errors::BeaconChainError;
use crate::events::{ChainEvent, PendingEvents};
use crate::fork_choice::{ForkChoice, ForkChoiceError, OnBlockPrecachedData};
use crate::store::BlockStore;
use itertools::Itertools;
use slog::{debug, warn};
use std::sync::Arc;
use types::{Checkpoint, EthSpec, Hash256};

/// Imports a verified block, applying its side effects in a fixed order:
///
/// 1. register the block with fork choice (with justified balances precached when the block
///    advances the justified checkpoint),
/// 2. feed the block's attestations into fork choice,
/// 3. cache the post-state as a checkpoint state if the block starts an epoch,
/// 4. recompute the head, detecting reorgs,
/// 5. prune the caches if finalization advanced,
/// 6. persist the block and cache the post-state,
/// 7. flush the buffered events, ending with the block event itself.
pub async fn import_block<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    verified_block: FullyVerifiedBlock<T::EthSpec>,
) -> Result<Hash256, BeaconChainError> {
    let FullyVerifiedBlock {
        block,
        block_root,
        post_state,
        parent_block: _,
        execution_status,
        skip_importing_attestations,
    } = verified_block;

    let slots_per_epoch = T::EthSpec::slots_per_epoch();
    let mut pending_events = PendingEvents::new();

    let mut precached = OnBlockPrecachedData {
        execution_status,
        justified_balances: None,
    };
    let prev_finalized_epoch;
    {
        let fork_choice = chain.fork_choice.read();
        prev_finalized_epoch = fork_choice.finalized_checkpoint().epoch;

        // Fork choice needs the balances at the new justified checkpoint to weigh votes; hand
        // them over from the checkpoint-state cache while the state is still warm.
        let new_justified = post_state.current_justified_checkpoint;
        if new_justified.epoch > fork_choice.justified_checkpoint().epoch {
            match chain.checkpoint_state_cache.get(&new_justified) {
                Some(justified_state) => {
                    precached.justified_balances =
                        Some(justified_state.effective_balance_increments_zero_inactive());
                }
                None => warn!(
                    chain.log,
                    "Justified state missing from checkpoint cache";
                    "epoch" => %new_justified.epoch,
                    "root" => ?new_justified.root,
                ),
            }
        }
    }

    chain
        .fork_choice
        .write()
        .on_block(&block, block_root, &post_state, precached)?;

    if !skip_importing_attestations {
        let mut invalid_codes: Vec<&'static str> = vec![];
        {
            let mut fork_choice = chain.fork_choice.write();
            for attestation in &block.message.body.attestations {
                let indexed = match post_state.get_indexed_attestation(attestation) {
                    Ok(indexed) => indexed,
                    Err(e) => {
                        debug!(
                            chain.log,
                            "Could not index block attestation";
                            "block_root" => ?block_root,
                            "error" => ?e,
                        );
                        continue;
                    }
                };
                match fork_choice.on_attestation(&indexed) {
                    Ok(()) => {}
                    Err(ForkChoiceError::InvalidAttestation(reason)) => {
                        invalid_codes.push(reason.into());
                    }
                    Err(e) => warn!(
                        chain.log,
                        "Error importing block attestation";
                        "block_root" => ?block_root,
                        "error" => ?e,
                    ),
                }
            }
        }
        // One log line per failure reason, not per attestation.
        for (code, count) in invalid_codes.into_iter().counts() {
            debug!(
                chain.log,
                "Invalid attestations in block";
                "block_root" => ?block_root,
                "reason" => code,
                "count" => count,
            );
        }
    }

    if block.slot().is_epoch_start(slots_per_epoch) {
        let checkpoint = Checkpoint {
            epoch: block.slot().epoch(slots_per_epoch),
            root: block_root,
        };
        chain.checkpoint_state_cache.add(&checkpoint, &post_state);
        pending_events.push(ChainEvent::Checkpoint {
            checkpoint,
            state: Arc::new(post_state.clone()),
        });
    }

    let (old_head, new_head) = {
        let mut fork_choice = chain.fork_choice.write();
        let old_head = fork_choice.get_head();
        let new_head = fork_choice.update_head();
        (old_head, new_head)
    };
    if new_head.block_root != old_head.block_root {
        chain.state_cache.update_head(new_head.state_root);
        pending_events.push(ChainEvent::Head {
            head: new_head.clone(),
        });

        let fork_choice = chain.fork_choice.read();
        if !fork_choice.is_descendant(old_head.block_root, new_head.block_root) {
            match fork_choice.common_ancestor_depth(&old_head, &new_head) {
                Some(depth) => {
                    warn!(
                        chain.log,
                        "Chain reorganisation";
                        "old_head" => ?old_head.block_root,
                        "new_head" => ?new_head.block_root,
                        "depth" => depth,
                    );
                    pending_events.push(ChainEvent::Reorg {
                        depth,
                        old_head: old_head.clone(),
                        new_head: new_head.clone(),
                    });
                }
                None => warn!(
                    chain.log,
                    "Reorg between unrelated heads";
                    "old_head" => ?old_head.block_root,
                    "new_head" => ?new_head.block_root,
                ),
            }
        }
    }

    let new_finalized_epoch = chain.fork_choice.read().finalized_checkpoint().epoch;
    if new_finalized_epoch > prev_finalized_epoch {
        chain.checkpoint_state_cache.prune_finalized(new_finalized_epoch);
        chain
            .state_cache
            .prune_finalized(new_finalized_epoch.start_slot(slots_per_epoch));
        debug!(
            chain.log,
            "Pruned state caches on finalization";
            "finalized_epoch" => %new_finalized_epoch,
        );
    }
    let justified_epoch = chain.fork_choice.read().justified_checkpoint().epoch;
    chain
        .checkpoint_state_cache
        .prune(new_finalized_epoch, justified_epoch);

    chain.state_cache.add(block.state_root(), &post_state);
    chain.store.put_block(block_root, (*block).clone())?;

    pending_events.push(ChainEvent::Block {
        block_root,
        block: block.clone(),
    });
    pending_events.emit(&chain.event_handler);

    debug!(
        chain.log,
        "Block imported";
        "block_root" => ?block_root,
        "slot" => %block.slot(),
    );

    Ok(block_root)
}
