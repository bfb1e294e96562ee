use beacon_chain::test_utils::BeaconChainHarness;
use beacon_chain::{
    BlockError, BlockStore, ChainEvent, ChainSegmentOpts, ChainSegmentResult, ForkChoice,
    PartiallyVerifiedBlock,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use types::{Checkpoint, Epoch, MinimalEthSpec, Signature, SignedBeaconBlock, Slot};

type E = MinimalEthSpec;

const VALIDATOR_COUNT: usize = 16;

#[tokio::test]
async fn mid_epoch_import_populates_state_cache_only() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    // Only the genesis checkpoint state is cached at startup.
    assert_eq!(harness.chain.checkpoint_state_cache.len(), 1);

    let (block, post_state) = harness.make_block(genesis_root, Slot::new(1));
    harness.process_block(block.clone()).await.unwrap();

    assert!(harness.chain.state_cache.contains(&block.state_root()));
    assert_eq!(harness.chain.checkpoint_state_cache.len(), 1);
    assert!(harness
        .chain
        .store
        .get_block(&block.canonical_root())
        .unwrap()
        .is_some());
    assert_eq!(post_state.slot, Slot::new(1));
}

#[tokio::test]
async fn epoch_boundary_import_caches_checkpoint_state() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);

    let head_root = harness.extend_chain(8).await;
    assert_eq!(harness.chain.head().slot, Slot::new(8));

    let checkpoint = Checkpoint {
        epoch: Epoch::new(1),
        root: head_root,
    };
    let state = harness
        .chain
        .checkpoint_state_cache
        .get(&checkpoint)
        .expect("block starting epoch 1 should be cached as a checkpoint state");
    assert_eq!(state.slot, Slot::new(8));
}

#[tokio::test]
async fn import_emits_block_and_head_events() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let mut block_rx = harness.chain.event_handler.subscribe_block();
    let mut head_rx = harness.chain.event_handler.subscribe_head();

    let imported_root = harness.add_block(genesis_root, Slot::new(1)).await.unwrap();

    match block_rx.recv().await.unwrap() {
        ChainEvent::Block { block_root, block } => {
            assert_eq!(block_root, imported_root);
            assert_eq!(block.slot(), Slot::new(1));
        }
        other => panic!("expected block event, got {:?}", other),
    }
    match head_rx.recv().await.unwrap() {
        ChainEvent::Head { head } => assert_eq!(head.block_root, imported_root),
        other => panic!("expected head event, got {:?}", other),
    }
}

#[tokio::test]
async fn checkpoint_events_at_epoch_start() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let mut checkpoint_rx = harness.chain.event_handler.subscribe_checkpoint();

    let mut parent_root = genesis_root;
    let mut block_roots = vec![];
    for slot in 1..=8u64 {
        parent_root = harness.add_block(parent_root, Slot::new(slot)).await.unwrap();
        block_roots.push(parent_root);
    }

    // Regenerating block 8's pre-state dials its parent across the boundary, announcing
    // checkpoint (1, block 7); importing block 8 itself announces checkpoint (1, block 8).
    for expected_root in [block_roots[6], block_roots[7]] {
        match checkpoint_rx.recv().await.unwrap() {
            ChainEvent::Checkpoint { checkpoint, state } => {
                assert_eq!(checkpoint.epoch, Epoch::new(1));
                assert_eq!(checkpoint.root, expected_root);
                assert_eq!(state.slot, Slot::new(8));
            }
            other => panic!("expected checkpoint event, got {:?}", other),
        }
    }
    // Mid-epoch blocks produced no checkpoint events.
    assert!(matches!(
        checkpoint_rx.try_recv(),
        Err(TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn rejected_block_emits_error_event() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let mut error_rx = harness.chain.event_handler.subscribe_error_block();

    let (block, _) = harness.make_block(genesis_root, Slot::new(1));
    let block = Arc::new(SignedBeaconBlock {
        message: block.message.clone(),
        signature: Signature::from_bytes([0xaa; 96]),
    });
    let bad_root = block.canonical_root();

    harness.process_block(block).await.unwrap_err();

    match error_rx.recv().await.unwrap() {
        ChainEvent::ErrorBlock {
            block_root,
            error_code,
        } => {
            assert_eq!(block_root, bad_root);
            assert_eq!(error_code, "INVALID_SIGNATURE");
        }
        other => panic!("expected error event, got {:?}", other),
    }
}

#[tokio::test]
async fn fork_switch_emits_a_single_reorg_event() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let mut reorg_rx = harness.chain.event_handler.subscribe_reorg();

    // Canonical chain to slot 3.
    let a1 = harness.add_block(genesis_root, Slot::new(1)).await.unwrap();
    let a2 = harness.add_block(a1, Slot::new(2)).await.unwrap();
    let a3 = harness.add_block(a2, Slot::new(3)).await.unwrap();
    assert_eq!(harness.chain.head().block_root, a3);

    // A competing branch from slot 1, made distinct by carrying no attestations, that
    // eventually outgrows the canonical chain.
    let (b2, _) = harness.make_block_ext(a1, Slot::new(2), false, None);
    let b2_root = harness.process_block(b2).await.unwrap();
    let (b3, _) = harness.make_block_ext(b2_root, Slot::new(3), false, None);
    let b3_root = harness.process_block(b3).await.unwrap();
    let (b4, _) = harness.make_block_ext(b3_root, Slot::new(4), false, None);
    let b4_root = harness.process_block(b4).await.unwrap();

    assert_eq!(harness.chain.head().block_root, b4_root);

    // The head moved across branches exactly once. Whether that happened at slot 3 (tie
    // broken toward the fork) or slot 4, the fork point is slot 1 and the departed branch
    // had two blocks past it.
    match reorg_rx.recv().await.unwrap() {
        ChainEvent::Reorg {
            depth,
            old_head,
            new_head,
        } => {
            assert_eq!(depth, 2);
            assert!(old_head.block_root == a3 || old_head.block_root == a2);
            assert!(new_head.block_root == b3_root || new_head.block_root == b4_root);
        }
        other => panic!("expected reorg event, got {:?}", other),
    }
    assert!(matches!(reorg_rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn finalization_prunes_state_caches() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);

    harness.extend_chain(40).await;

    let finalized = harness.chain.fork_choice.read().finalized_checkpoint();
    assert!(finalized.epoch >= Epoch::new(2));

    // Checkpoint states at or past finality survive; everything older is gone.
    let epochs = harness.chain.checkpoint_state_cache.epochs();
    assert!(!epochs.is_empty());
    assert!(epochs.iter().all(|epoch| *epoch >= finalized.epoch));

    // The genesis state predates the finalized slot and is not the head.
    assert!(!harness.chain.state_cache.contains(&harness.genesis_state_root));
}

#[tokio::test]
async fn justified_balances_reach_fork_choice() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);

    harness.extend_chain(40).await;

    let fork_choice = harness.chain.fork_choice.read();
    assert!(fork_choice.justified_checkpoint().epoch >= Epoch::new(2));

    let balances = &fork_choice.justified_balances;
    assert_eq!(balances.len(), VALIDATOR_COUNT);
    // All harness validators are active with a 32 ETH effective balance.
    assert!(balances.iter().all(|&increments| increments == 32));
}

#[tokio::test]
async fn chain_segment_skips_already_known_blocks() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let mut blocks = vec![];
    let mut parent_root = genesis_root;
    for slot in 1..=5u64 {
        let (block, _) = harness.make_block(parent_root, Slot::new(slot));
        parent_root = block.canonical_root();
        blocks.push(block);
    }
    harness.set_current_slot(Slot::new(5));

    let result = harness
        .chain
        .process_chain_segment(blocks[..4].to_vec(), ChainSegmentOpts::default())
        .await;
    assert!(matches!(
        result,
        ChainSegmentResult::Successful { imported_blocks: 4 }
    ));

    // Re-sending a segment that overlaps what is already imported only imports the new tail.
    let result = harness
        .chain
        .process_chain_segment(blocks[2..].to_vec(), ChainSegmentOpts::default())
        .await;
    assert!(matches!(
        result,
        ChainSegmentResult::Successful { imported_blocks: 1 }
    ));
    assert_eq!(harness.chain.head().slot, Slot::new(5));
}

#[tokio::test]
async fn chain_segment_skips_the_genesis_block() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    // A backfilled segment may begin at the anchor itself; genesis counts as known.
    let genesis_block = Arc::new(
        harness
            .chain
            .store
            .get_block(&genesis_root)
            .unwrap()
            .unwrap(),
    );

    let mut blocks = vec![genesis_block];
    let mut parent_root = genesis_root;
    for slot in 1..=2u64 {
        let (block, _) = harness.make_block(parent_root, Slot::new(slot));
        parent_root = block.canonical_root();
        blocks.push(block);
    }
    harness.set_current_slot(Slot::new(2));

    let result = harness
        .chain
        .process_chain_segment(blocks, ChainSegmentOpts::default())
        .await;
    assert!(matches!(
        result,
        ChainSegmentResult::Successful { imported_blocks: 2 }
    ));
    assert_eq!(harness.chain.head().slot, Slot::new(2));

    // With the permissive flag off, the genesis block fails the segment outright.
    let harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_block = Arc::new(
        harness
            .chain
            .store
            .get_block(&harness.genesis_block_root)
            .unwrap()
            .unwrap(),
    );
    let result = harness
        .chain
        .process_chain_segment(
            vec![genesis_block],
            ChainSegmentOpts {
                ignore_if_known: false,
                ignore_if_finalized: false,
            },
        )
        .await;
    assert!(matches!(
        result,
        ChainSegmentResult::Failed {
            imported_blocks: 0,
            error: BlockError::GenesisBlock,
        }
    ));
}

#[tokio::test]
async fn concurrent_submissions_import_in_order() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let mut blocks = vec![];
    let mut parent_root = genesis_root;
    for slot in 1..=4u64 {
        let (block, _) = harness.make_block(parent_root, Slot::new(slot));
        parent_root = block.canonical_root();
        blocks.push(block);
    }
    harness.set_current_slot(Slot::new(4));

    let results = join_all(blocks.iter().map(|block| {
        harness
            .chain
            .process_block(PartiallyVerifiedBlock::new(block.clone()))
    }))
    .await;

    for (result, block) in results.iter().zip(&blocks) {
        assert_eq!(result.as_ref().unwrap(), &block.canonical_root());
    }
    assert_eq!(harness.chain.head().slot, Slot::new(4));
}
