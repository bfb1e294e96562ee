use beacon_chain::test_utils::BeaconChainHarness;
use beacon_chain::{ChainConfig, QueuedRegenError, RegenError};
use types::{Checkpoint, Epoch, Hash256, MinimalEthSpec, Slot};

type E = MinimalEthSpec;

const VALIDATOR_COUNT: usize = 16;

#[tokio::test]
async fn cached_states_are_returned_without_replay() {
    let harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);

    let state = harness
        .chain
        .regen
        .get_state(harness.genesis_state_root)
        .await
        .unwrap();
    assert_eq!(state.slot, Slot::new(0));

    let state = harness
        .chain
        .regen
        .get_checkpoint_state(Checkpoint {
            epoch: Epoch::new(0),
            root: harness.genesis_block_root,
        })
        .await
        .unwrap();
    assert_eq!(state.slot, Slot::new(0));

    assert!(harness.chain.regen.can_accept_work());
}

#[tokio::test]
async fn replay_rebuilds_an_evicted_state() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let b1 = harness.add_block(genesis_root, Slot::new(1)).await.unwrap();
    let b2 = harness.add_block(b1, Slot::new(2)).await.unwrap();
    let b3 = harness.add_block(b2, Slot::new(3)).await.unwrap();

    let b2_state_root = harness.post_state(&b2).unwrap().canonical_root();
    let b3_state_root = harness.post_state(&b3).unwrap().canonical_root();

    // Evict the two newest states so a lookup must replay blocks over the state of `b1`.
    harness.chain.state_cache.delete_state(&b2_state_root);
    harness.chain.state_cache.delete_state(&b3_state_root);

    let state = harness.chain.regen.get_state(b3_state_root).await.unwrap();
    assert_eq!(state.slot, Slot::new(3));
    assert_eq!(state.canonical_root(), b3_state_root);
}

#[tokio::test]
async fn rejects_slot_earlier_than_the_block() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);

    let head_root = harness.extend_chain(3).await;

    let result = harness
        .chain
        .regen
        .get_block_slot_state(head_root, Slot::new(1))
        .await;

    assert!(matches!(
        result,
        Err(QueuedRegenError::Regen(RegenError::SlotBeforeBlockSlot {
            slot,
            block_slot,
        })) if slot == Slot::new(1) && block_slot == Slot::new(3)
    ));
}

#[tokio::test]
async fn skipped_slot_advance_caches_the_crossed_checkpoint() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);

    let head_root = harness.extend_chain(4).await;

    let state = harness
        .chain
        .regen
        .get_block_slot_state(head_root, Slot::new(8))
        .await
        .unwrap();
    assert_eq!(state.slot, Slot::new(8));

    // Crossing into epoch 1 with empty slots cached the boundary state under the head block.
    assert!(harness.chain.checkpoint_state_cache.contains(&Checkpoint {
        epoch: Epoch::new(1),
        root: head_root,
    }));
}

#[tokio::test]
async fn replay_distance_is_bounded() {
    let config = ChainConfig {
        max_replay_epochs: 1,
        ..ChainConfig::default()
    };
    let mut harness = BeaconChainHarness::<E>::new_with_config(VALIDATOR_COUNT, config);
    let genesis_root = harness.genesis_block_root;

    let mut parent_root = genesis_root;
    let mut block_roots = vec![];
    for slot in 1..=20u64 {
        parent_root = harness.add_block(parent_root, Slot::new(slot)).await.unwrap();
        block_roots.push(parent_root);
    }
    let head_state_root = harness
        .post_state(&parent_root)
        .unwrap()
        .canonical_root();

    // Strip every cached state between genesis and the head, then drop the checkpoint
    // states, leaving genesis as the only possible seed, 20 blocks away.
    for root in &block_roots {
        let state_root = harness.post_state(root).unwrap().canonical_root();
        harness.chain.state_cache.delete_state(&state_root);
    }
    harness
        .chain
        .checkpoint_state_cache
        .prune_finalized(Epoch::new(1000));

    let result = harness.chain.regen.get_state(head_state_root).await;
    assert!(matches!(
        result,
        Err(QueuedRegenError::Regen(
            RegenError::TooManyBlocksProcessed { state_root }
        )) if state_root == head_state_root
    ));
}

#[tokio::test]
async fn fails_when_no_seed_state_remains() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let mut parent_root = genesis_root;
    for slot in 1..=3u64 {
        parent_root = harness.add_block(parent_root, Slot::new(slot)).await.unwrap();
    }
    let head_state_root = harness
        .post_state(&parent_root)
        .unwrap()
        .canonical_root();

    harness.chain.state_cache.clear();
    harness.chain.checkpoint_state_cache.clear();

    assert!(matches!(
        harness.chain.regen.get_state(head_state_root).await,
        Err(QueuedRegenError::Regen(RegenError::NoSeedState))
    ));
}

#[tokio::test]
async fn rejects_unknown_state_root() {
    let harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);

    assert!(matches!(
        harness.chain.regen.get_state(Hash256::repeat_byte(7)).await,
        Err(QueuedRegenError::Regen(RegenError::StateNotInForkChoice(
            root
        ))) if root == Hash256::repeat_byte(7)
    ));
}

#[tokio::test]
async fn cross_epoch_import_caches_parent_checkpoint_state() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let mut parent_root = genesis_root;
    for slot in 1..=7u64 {
        parent_root = harness.add_block(parent_root, Slot::new(slot)).await.unwrap();
    }

    // Skip slot 8: the first block of epoch 1 lands at slot 9, so the pre-state is the
    // parent's state dialed to the epoch boundary.
    let b9 = harness.add_block(parent_root, Slot::new(9)).await.unwrap();
    assert_eq!(harness.chain.head().block_root, b9);

    assert!(harness.chain.checkpoint_state_cache.contains(&Checkpoint {
        epoch: Epoch::new(1),
        root: parent_root,
    }));
    // The slot 9 block does not start the epoch, so it is no checkpoint.
    assert!(!harness.chain.checkpoint_state_cache.contains(&Checkpoint {
        epoch: Epoch::new(1),
        root: b9,
    }));
}
