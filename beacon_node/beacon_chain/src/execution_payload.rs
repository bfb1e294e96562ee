//! Verification of a block's execution payload via the execution engine, including the
//! optimistic-import rules for a syncing engine.

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::block_verification::BlockError;
use crate::execution_engine::{ExecutionEngine, PayloadStatus};
use crate::fork_choice::{ExecutionStatus, ForkChoice, ProtoBlock};
use slog::{debug, warn};
use types::SignedBeaconBlock;

/// Sends the block's payload (if any) to the execution engine and translates the verdict into
/// an `ExecutionStatus` for fork choice.
///
/// A `SYNCING`/`ACCEPTED` verdict leads to an *optimistic* import only when that is safe: either
/// the justified checkpoint already has execution enabled, or the block is old enough that an
/// invalid payload would be caught long before the block could be justified.
pub async fn notify_new_payload<T: BeaconChainTypes>(
    chain: &BeaconChain<T>,
    block: &SignedBeaconBlock,
    parent_block: &ProtoBlock,
) -> Result<ExecutionStatus, BlockError<T::EthSpec>> {
    let payload = match &block.message.body.execution_payload {
        Some(payload) => payload,
        None => return Ok(ExecutionStatus::PreMerge),
    };

    match chain.execution_engine.notify_new_payload(payload).await {
        PayloadStatus::Valid { .. } => {
            // A valid payload vouches for its whole ancestry; promote any optimistically
            // imported ancestors. The block itself reaches fork choice at import.
            chain
                .fork_choice
                .write()
                .on_valid_execution_payload(payload.parent_hash);
            Ok(ExecutionStatus::Valid)
        }
        PayloadStatus::Invalid {
            latest_valid_hash,
            validation_error,
        } => {
            // When the engine identifies a valid ancestor that is not this block's parent, the
            // parent's branch is invalid too and must be removed from fork choice.
            let invalidate_from = if parent_block.execution_block_hash != latest_valid_hash {
                Some(parent_block.block_root)
            } else {
                None
            };
            warn!(
                chain.log,
                "Execution engine rejected payload";
                "block_root" => ?block.canonical_root(),
                "latest_valid_hash" => ?latest_valid_hash,
                "invalidating_parent_branch" => invalidate_from.is_some(),
            );
            chain
                .fork_choice
                .write()
                .on_invalid_execution_payload(latest_valid_hash, invalidate_from);
            Err(BlockError::ExecutionPayloadInvalid {
                latest_valid_hash,
                validation_error,
            })
        }
        PayloadStatus::Syncing | PayloadStatus::Accepted => {
            let justified_has_execution = chain
                .fork_choice
                .read()
                .justified_block()
                .map_or(false, |block| !block.execution_status.is_pre_merge());

            let old_enough = {
                let present_slot = chain.slot()?;
                block.slot() + chain.spec.safe_slots_to_import_optimistically <= present_slot
            };

            if justified_has_execution || old_enough {
                debug!(
                    chain.log,
                    "Importing block optimistically";
                    "block_root" => ?block.canonical_root(),
                    "slot" => %block.slot(),
                );
                Ok(ExecutionStatus::Syncing)
            } else {
                Err(BlockError::ExecutionEngineError {
                    status: "SYNCING",
                    message: "payload verification unavailable and block too recent for \
                              optimistic import"
                        .into(),
                })
            }
        }
        PayloadStatus::ElError { message } => Err(BlockError::ExecutionEngineError {
            status: "ELERROR",
            message,
        }),
        PayloadStatus::Unavailable => Err(BlockError::ExecutionEngineError {
            status: "UNAVAILABLE",
            message: "execution engine unreachable".into(),
        }),
    }
}
