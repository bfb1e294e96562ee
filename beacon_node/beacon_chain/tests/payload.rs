use beacon_chain::test_utils::BeaconChainHarness;
use beacon_chain::{BlockError, ChainEvent, ExecutionStatus, ForkChoice, PayloadStatus};
use types::{ExecutionBlockHash, Hash256, MinimalEthSpec, Slot};

type E = MinimalEthSpec;

const VALIDATOR_COUNT: usize = 16;

#[tokio::test]
async fn pre_merge_block_never_reaches_the_engine() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let imported = harness.add_block(genesis_root, Slot::new(1)).await.unwrap();

    assert!(harness.chain.execution_engine.notified_payloads().is_empty());
    let block = harness.chain.fork_choice.read().get_block(&imported).unwrap();
    assert_eq!(block.execution_status, ExecutionStatus::PreMerge);
}

#[tokio::test]
async fn valid_payload_imports_as_valid() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let payload = harness.make_payload(&genesis_root, Slot::new(1));
    let payload_hash = payload.block_hash;
    let (block, _) = harness.make_block_ext(genesis_root, Slot::new(1), true, Some(payload));

    let imported = harness.process_block(block).await.unwrap();

    assert_eq!(
        harness.chain.execution_engine.notified_payloads(),
        vec![payload_hash]
    );
    let block = harness.chain.fork_choice.read().get_block(&imported).unwrap();
    assert_eq!(block.execution_status, ExecutionStatus::Valid);
    assert_eq!(block.execution_block_hash, Some(payload_hash));
}

#[tokio::test]
async fn syncing_engine_rejects_a_recent_block() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    harness.chain.execution_engine.set_status(PayloadStatus::Syncing);

    let payload = harness.make_payload(&genesis_root, Slot::new(1));
    let (block, _) = harness.make_block_ext(genesis_root, Slot::new(1), true, Some(payload));

    // The justified checkpoint is pre-merge and the block is recent, so an optimistic
    // import is not safe.
    assert!(matches!(
        harness.process_block(block).await,
        Err(BlockError::ExecutionEngineError {
            status: "SYNCING",
            ..
        })
    ));
}

#[tokio::test]
async fn syncing_engine_imports_an_old_block_optimistically() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    harness.chain.execution_engine.set_status(PayloadStatus::Syncing);

    let payload = harness.make_payload(&genesis_root, Slot::new(1));
    let (block, _) = harness.make_block_ext(genesis_root, Slot::new(1), true, Some(payload));

    // Make the block older than the optimistic-import safety margin.
    harness.set_current_slot(Slot::new(129));
    let imported = harness.process_block(block).await.unwrap();

    let block = harness.chain.fork_choice.read().get_block(&imported).unwrap();
    assert_eq!(block.execution_status, ExecutionStatus::Syncing);
    assert_eq!(harness.chain.head().block_root, imported);
}

#[tokio::test]
async fn invalid_payload_fails_import_and_can_invalidate_the_parent() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let mut error_rx = harness.chain.event_handler.subscribe_error_block();

    let a1_payload = harness.make_payload(&genesis_root, Slot::new(1));
    let a1_hash = a1_payload.block_hash;
    let (a1, _) = harness.make_block_ext(genesis_root, Slot::new(1), true, Some(a1_payload));
    let a1_root = harness.process_block(a1).await.unwrap();

    // The engine blames only the new payload: the parent stays valid.
    harness.chain.execution_engine.set_status(PayloadStatus::Invalid {
        latest_valid_hash: Some(a1_hash),
        validation_error: None,
    });
    let b2_payload = harness.make_payload(&a1_root, Slot::new(2));
    let (b2, _) = harness.make_block_ext(a1_root, Slot::new(2), false, Some(b2_payload));
    let b2_root = b2.canonical_root();
    assert!(matches!(
        harness.process_block(b2).await,
        Err(BlockError::ExecutionPayloadInvalid { .. })
    ));
    match error_rx.recv().await.unwrap() {
        ChainEvent::ErrorBlock {
            block_root,
            error_code,
        } => {
            assert_eq!(block_root, b2_root);
            assert_eq!(error_code, "EXECUTION_PAYLOAD_NOT_VALID");
        }
        other => panic!("expected error event, got {:?}", other),
    }
    let a1_status = harness
        .chain
        .fork_choice
        .read()
        .get_block(&a1_root)
        .unwrap()
        .execution_status;
    assert_eq!(a1_status, ExecutionStatus::Valid);

    // The engine points at an older valid ancestor: the parent branch is invalid too.
    harness.chain.execution_engine.set_status(PayloadStatus::Invalid {
        latest_valid_hash: Some(ExecutionBlockHash(Hash256::repeat_byte(0xee))),
        validation_error: Some("bad state root".into()),
    });
    let c2_payload = harness.make_payload(&a1_root, Slot::new(2));
    let (c2, _) = harness.make_block_ext(a1_root, Slot::new(2), true, Some(c2_payload));
    assert!(matches!(
        harness.process_block(c2).await,
        Err(BlockError::ExecutionPayloadInvalid { .. })
    ));
    let a1_status = harness
        .chain
        .fork_choice
        .read()
        .get_block(&a1_root)
        .unwrap()
        .execution_status;
    assert_eq!(a1_status, ExecutionStatus::Invalid);
}

#[tokio::test]
async fn valid_payload_promotes_optimistic_ancestors() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    // Import the first block optimistically while the engine is syncing.
    harness.chain.execution_engine.set_status(PayloadStatus::Syncing);
    let a1_payload = harness.make_payload(&genesis_root, Slot::new(1));
    let (a1, _) = harness.make_block_ext(genesis_root, Slot::new(1), true, Some(a1_payload));
    harness.set_current_slot(Slot::new(129));
    let a1_root = harness.process_block(a1).await.unwrap();

    // The engine catches up and validates the child, vouching for the ancestor chain.
    harness.chain.execution_engine.set_status(PayloadStatus::Valid {
        latest_valid_hash: None,
    });
    let a2_payload = harness.make_payload(&a1_root, Slot::new(2));
    let (a2, _) = harness.make_block_ext(a1_root, Slot::new(2), true, Some(a2_payload));
    let a2_root = harness.process_block(a2).await.unwrap();

    let fork_choice = harness.chain.fork_choice.read();
    assert_eq!(
        fork_choice.get_block(&a1_root).unwrap().execution_status,
        ExecutionStatus::Valid
    );
    assert_eq!(
        fork_choice.get_block(&a2_root).unwrap().execution_status,
        ExecutionStatus::Valid
    );
}
