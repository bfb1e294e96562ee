use beacon_chain::test_utils::BeaconChainHarness;
use beacon_chain::{BlockError, ForkChoice, PartiallyVerifiedBlock};
use std::sync::Arc;
use types::{BeaconBlock, Hash256, MinimalEthSpec, Signature, SignedBeaconBlock, Slot};

type E = MinimalEthSpec;

const VALIDATOR_COUNT: usize = 16;

#[tokio::test]
async fn rejects_genesis_block() {
    let harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);

    let block = Arc::new(SignedBeaconBlock {
        message: BeaconBlock::empty(Slot::new(0)),
        signature: Signature::empty(),
    });

    assert!(matches!(
        harness.process_block(block).await,
        Err(BlockError::GenesisBlock)
    ));
}

#[tokio::test]
async fn rejects_block_from_future_slot() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let (block, _) = harness.make_block(genesis_root, Slot::new(2));
    harness.set_current_slot(Slot::new(1));

    // Bypass the harness helper; it would move the clock to the block's slot.
    let result = harness
        .chain
        .process_block(PartiallyVerifiedBlock::new(block))
        .await;

    assert!(matches!(
        result,
        Err(BlockError::FutureSlot {
            present_slot,
            block_slot,
        }) if present_slot == Slot::new(1) && block_slot == Slot::new(2)
    ));
}

#[tokio::test]
async fn rejects_block_with_unknown_parent() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let (block, _) = harness.make_block(genesis_root, Slot::new(1));
    let mut message = block.message.clone();
    message.parent_root = Hash256::repeat_byte(42);
    let block = Arc::new(harness.sign_block(message));

    assert!(matches!(
        harness.process_block(block).await,
        Err(BlockError::ParentUnknown { parent_root }) if parent_root == Hash256::repeat_byte(42)
    ));
}

#[tokio::test]
async fn rejects_block_that_is_already_known() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let (block, _) = harness.make_block(genesis_root, Slot::new(1));
    harness.process_block(block.clone()).await.unwrap();

    assert!(matches!(
        harness.process_block(block).await,
        Err(BlockError::BlockIsAlreadyKnown)
    ));
}

#[tokio::test]
async fn rejects_block_with_invalid_proposer_signature() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let (block, _) = harness.make_block(genesis_root, Slot::new(1));
    let block = Arc::new(SignedBeaconBlock {
        message: block.message.clone(),
        signature: Signature::from_bytes([0xaa; 96]),
    });

    let result = harness.process_block(block).await;
    assert!(matches!(result, Err(BlockError::InvalidSignature { .. })));
    // The post-state is attached for diagnostics.
    if let Err(BlockError::InvalidSignature { post_state }) = result {
        assert_eq!(post_state.slot, Slot::new(1));
    }
}

#[tokio::test]
async fn valid_signatures_flag_skips_signature_verification() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let (block, _) = harness.make_block(genesis_root, Slot::new(1));
    let block = Arc::new(SignedBeaconBlock {
        message: block.message.clone(),
        signature: Signature::from_bytes([0xaa; 96]),
    });

    harness.set_current_slot(Slot::new(1));
    let result = harness
        .chain
        .process_block(PartiallyVerifiedBlock {
            block,
            valid_proposer_signature: false,
            valid_signatures: true,
            skip_importing_attestations: false,
        })
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn rejects_block_with_wrong_state_root() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);
    let genesis_root = harness.genesis_block_root;

    let (block, _) = harness.make_block(genesis_root, Slot::new(1));
    let mut message = block.message.clone();
    message.state_root = Hash256::repeat_byte(9);
    // Re-sign so the state-root check is reached rather than the signature check.
    let block = Arc::new(harness.sign_block(message));

    assert!(matches!(
        harness.process_block(block).await,
        Err(BlockError::StateRootMismatch { block, .. }) if block == Hash256::repeat_byte(9)
    ));
}

#[tokio::test]
async fn rejects_block_at_or_before_finalized_slot() {
    let mut harness = BeaconChainHarness::<E>::new(VALIDATOR_COUNT);

    // Five epochs with full attestation coverage advances finality.
    harness.extend_chain(40).await;
    let finalized = harness.chain.fork_choice.read().finalized_checkpoint();
    assert!(finalized.epoch >= types::Epoch::new(1));

    let block = Arc::new(SignedBeaconBlock {
        message: BeaconBlock::empty(Slot::new(1)),
        signature: Signature::empty(),
    });

    assert!(matches!(
        harness.process_block(block).await,
        Err(BlockError::WouldRevertFinalizedSlot { .. })
    ));
}
