//! Utilities for testing the import pipeline: an in-memory fork choice, a scriptable execution
//! engine, a keyed-hash signature scheme and a harness that produces valid chains of blocks.

use crate::beacon_chain::{BeaconChain, BeaconChainTypes};
use crate::block_verification::{BlockError, PartiallyVerifiedBlock};
use crate::chain_config::ChainConfig;
use crate::execution_engine::{ExecutionEngine, PayloadStatus};
use crate::fork_choice::{
    ExecutionStatus, ForkChoice, ForkChoiceError, InvalidAttestationError, OnBlockPrecachedData,
    ProtoBlock,
};
use crate::signature_verifier::SignatureVerifier;
use crate::store::{BlockStore, MemoryStore};
use async_trait::async_trait;
use ethereum_hashing::hash;
use parking_lot::Mutex;
use slog::Logger;
use sloggers::null::NullLoggerBuilder;
use sloggers::Build;
use slot_clock::{ManualSlotClock, SlotClock};
use state_processing::{complete_state_advance, per_block_processing};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use types::{
    compute_signing_root, Attestation, AttestationData, BeaconBlock, BeaconBlockBody, BeaconState,
    ChainSpec, Checkpoint, Domain, Epoch, EthSpec, ExecutionBlockHash, ExecutionPayload, Hash256,
    PublicKey, Signature, SignedBeaconBlock, Slot, Validator,
};

pub const HARNESS_GENESIS_TIME: u64 = 1_606_824_023;

/// Signs `message` under the testing scheme: the "signature" is the hash of the message and the
/// signer pubkeys, repeated to signature length. Deterministic and unforgeable enough for tests.
pub fn keyed_hash_sign(message: Hash256, pubkeys: &[PublicKey]) -> Signature {
    let mut preimage = message.as_bytes().to_vec();
    for pubkey in pubkeys {
        preimage.extend_from_slice(pubkey.as_bytes());
    }
    let digest = hash(&preimage);

    let mut bytes = [0u8; 96];
    for chunk in bytes.chunks_mut(32) {
        chunk.copy_from_slice(&digest);
    }
    Signature::from_bytes(bytes)
}

pub fn generate_deterministic_validators(count: usize) -> Vec<Validator> {
    (0..count)
        .map(|i| {
            let mut bytes = [0u8; 48];
            bytes[0] = i as u8;
            bytes[1] = (i >> 8) as u8;
            bytes[47] = 0xff;
            Validator {
                pubkey: PublicKey::from_bytes(bytes),
                ..Validator::default()
            }
        })
        .collect()
}

/// Verifier for signatures produced by `keyed_hash_sign`.
#[derive(Debug, Default)]
pub struct TestingSignatureVerifier;

#[async_trait]
impl SignatureVerifier for TestingSignatureVerifier {
    async fn verify_signature_sets(&self, sets: Vec<state_processing::SignatureSet>) -> bool {
        sets.iter()
            .all(|set| keyed_hash_sign(set.message, &set.pubkeys) == set.signature)
    }
}

/// An execution engine that returns a scripted status and records the payloads it sees.
#[derive(Debug)]
pub struct MockExecutionEngine {
    status: Mutex<PayloadStatus>,
    notified_payloads: Mutex<Vec<ExecutionBlockHash>>,
}

impl Default for MockExecutionEngine {
    fn default() -> Self {
        Self {
            status: Mutex::new(PayloadStatus::Valid {
                latest_valid_hash: None,
            }),
            notified_payloads: Mutex::new(vec![]),
        }
    }
}

impl MockExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: PayloadStatus) {
        *self.status.lock() = status;
    }

    pub fn notified_payloads(&self) -> Vec<ExecutionBlockHash> {
        self.notified_payloads.lock().clone()
    }
}

#[async_trait]
impl ExecutionEngine for MockExecutionEngine {
    async fn notify_new_payload(&self, payload: &ExecutionPayload) -> PayloadStatus {
        self.notified_payloads.lock().push(payload.block_hash);
        self.status.lock().clone()
    }
}

/// A fork choice over an in-memory block table.
///
/// The head rule is deliberately simple: the non-invalid block with the highest slot wins, ties
/// broken by block root. Enough to exercise head updates and reorgs deterministically.
pub struct MemoryForkChoice<E: EthSpec> {
    blocks: HashMap<Hash256, ProtoBlock>,
    head: ProtoBlock,
    justified: Checkpoint,
    finalized: Checkpoint,
    pub justified_balances: Vec<u64>,
    latest_messages: HashMap<u64, Epoch>,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> MemoryForkChoice<E> {
    pub fn new(genesis_block: ProtoBlock) -> Self {
        let genesis_checkpoint = Checkpoint {
            epoch: Epoch::new(0),
            root: genesis_block.block_root,
        };
        let mut blocks = HashMap::new();
        blocks.insert(genesis_block.block_root, genesis_block.clone());
        Self {
            blocks,
            head: genesis_block,
            justified: genesis_checkpoint,
            finalized: genesis_checkpoint,
            justified_balances: vec![],
            latest_messages: HashMap::new(),
            _phantom: PhantomData,
        }
    }

    fn ancestor_roots(&self, block_root: Hash256) -> HashSet<Hash256> {
        self.iter_ancestors(block_root)
            .map(|block| block.block_root)
            .collect()
    }

    fn mark_valid_through(&mut self, latest_valid_hash: ExecutionBlockHash) {
        let start = self
            .blocks
            .values()
            .find(|block| block.execution_block_hash == Some(latest_valid_hash))
            .map(|block| block.block_root);
        let to_validate: Vec<Hash256> = match start {
            Some(root) => self
                .iter_ancestors(root)
                .filter(|block| block.execution_status == ExecutionStatus::Syncing)
                .map(|block| block.block_root)
                .collect(),
            None => return,
        };
        for root in to_validate {
            if let Some(block) = self.blocks.get_mut(&root) {
                block.execution_status = ExecutionStatus::Valid;
            }
        }
    }
}

impl<E: EthSpec> ForkChoice<E> for MemoryForkChoice<E> {
    fn contains_block(&self, block_root: &Hash256) -> bool {
        self.blocks.contains_key(block_root)
    }

    fn get_block(&self, block_root: &Hash256) -> Option<ProtoBlock> {
        self.blocks.get(block_root).cloned()
    }

    fn find_block_by_state_root(&self, state_root: &Hash256) -> Option<ProtoBlock> {
        self.blocks
            .values()
            .find(|block| block.state_root == *state_root)
            .cloned()
    }

    fn iter_ancestors(&self, block_root: Hash256) -> Box<dyn Iterator<Item = ProtoBlock> + '_> {
        let first = self.blocks.get(&block_root).cloned();
        Box::new(std::iter::successors(first, move |block| {
            self.blocks.get(&block.parent_root).cloned()
        }))
    }

    fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool {
        self.iter_ancestors(descendant_root)
            .any(|block| block.block_root == ancestor_root)
    }

    fn common_ancestor_depth(&self, old_head: &ProtoBlock, new_head: &ProtoBlock) -> Option<u64> {
        let new_head_ancestors = self.ancestor_roots(new_head.block_root);
        self.iter_ancestors(old_head.block_root)
            .find(|block| new_head_ancestors.contains(&block.block_root))
            .map(|ancestor| old_head.slot.as_u64().saturating_sub(ancestor.slot.as_u64()))
    }

    fn justified_checkpoint(&self) -> Checkpoint {
        self.justified
    }

    fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized
    }

    fn justified_block(&self) -> Option<ProtoBlock> {
        self.blocks.get(&self.justified.root).cloned()
    }

    fn on_block(
        &mut self,
        block: &SignedBeaconBlock,
        block_root: Hash256,
        state: &BeaconState<E>,
        precached: OnBlockPrecachedData,
    ) -> Result<(), ForkChoiceError> {
        if !self.blocks.contains_key(&block.parent_root()) {
            return Err(ForkChoiceError::MissingProtoBlock(block.parent_root()));
        }

        self.blocks.insert(
            block_root,
            ProtoBlock {
                slot: block.slot(),
                block_root,
                parent_root: block.parent_root(),
                state_root: block.state_root(),
                execution_status: precached.execution_status,
                execution_block_hash: block
                    .message
                    .body
                    .execution_payload
                    .as_ref()
                    .map(|payload| payload.block_hash),
            },
        );

        if state.current_justified_checkpoint.epoch > self.justified.epoch {
            self.justified = state.current_justified_checkpoint;
            if let Some(balances) = precached.justified_balances {
                self.justified_balances = balances;
            }
        }
        if state.finalized_checkpoint.epoch > self.finalized.epoch {
            self.finalized = state.finalized_checkpoint;
        }

        Ok(())
    }

    fn on_attestation(
        &mut self,
        attestation: &types::IndexedAttestation,
    ) -> Result<(), ForkChoiceError> {
        let data = &attestation.data;

        if attestation.attesting_indices.is_empty() {
            return Err(ForkChoiceError::InvalidAttestation(
                InvalidAttestationError::EmptyAggregationBitfield,
            ));
        }
        let block = self.blocks.get(&data.beacon_block_root).ok_or(
            ForkChoiceError::InvalidAttestation(InvalidAttestationError::UnknownHeadBlock {
                beacon_block_root: data.beacon_block_root,
            }),
        )?;
        if !self.blocks.contains_key(&data.target.root) {
            return Err(ForkChoiceError::InvalidAttestation(
                InvalidAttestationError::UnknownTargetRoot(data.target.root),
            ));
        }
        if block.slot > data.slot {
            return Err(ForkChoiceError::InvalidAttestation(
                InvalidAttestationError::AttestsToFutureBlock {
                    block: block.slot,
                    attestation: data.slot,
                },
            ));
        }

        for validator_index in &attestation.attesting_indices {
            let entry = self.latest_messages.entry(*validator_index).or_default();
            if data.target.epoch > *entry {
                *entry = data.target.epoch;
            }
        }
        Ok(())
    }

    fn get_head(&self) -> ProtoBlock {
        self.head.clone()
    }

    fn update_head(&mut self) -> ProtoBlock {
        if let Some(best) = self
            .blocks
            .values()
            .filter(|block| !block.execution_status.is_invalid())
            .max_by_key(|block| (block.slot, block.block_root))
        {
            self.head = best.clone();
        }
        self.head.clone()
    }

    fn on_valid_execution_payload(&mut self, latest_valid_hash: ExecutionBlockHash) {
        self.mark_valid_through(latest_valid_hash);
    }

    fn on_invalid_execution_payload(
        &mut self,
        latest_valid_hash: Option<ExecutionBlockHash>,
        invalidate_from: Option<Hash256>,
    ) {
        if let Some(root) = invalidate_from {
            let invalid: Vec<Hash256> = self
                .blocks
                .keys()
                .copied()
                .filter(|candidate| self.is_descendant(root, *candidate))
                .collect();
            for root in invalid {
                if let Some(block) = self.blocks.get_mut(&root) {
                    block.execution_status = ExecutionStatus::Invalid;
                }
            }
        }
        if let Some(hash) = latest_valid_hash {
            self.mark_valid_through(hash);
        }
    }
}

/// `BeaconChainTypes` for ephemeral, fully in-memory test chains.
#[derive(Debug, Clone, Default)]
pub struct EphemeralHarnessType<E: EthSpec>(PhantomData<E>);

impl<E: EthSpec> BeaconChainTypes for EphemeralHarnessType<E> {
    type EthSpec = E;
    type SlotClock = ManualSlotClock;
    type ForkChoice = MemoryForkChoice<E>;
    type ExecutionEngine = MockExecutionEngine;
    type SignatureVerifier = TestingSignatureVerifier;
    type Store = MemoryStore;
}

pub fn null_logger() -> Logger {
    NullLoggerBuilder.build().expect("logger should build")
}

/// A testing harness that drives a `BeaconChain` with deterministically produced blocks.
pub struct BeaconChainHarness<E: EthSpec> {
    pub chain: Arc<BeaconChain<EphemeralHarnessType<E>>>,
    pub validators: Vec<Validator>,
    pub genesis_block_root: Hash256,
    pub genesis_state_root: Hash256,
    pub shutdown_tx: watch::Sender<bool>,
    /// Post-state of each block the harness produced, by block root.
    states: HashMap<Hash256, BeaconState<E>>,
}

impl<E: EthSpec> BeaconChainHarness<E> {
    pub fn new(validator_count: usize) -> Self {
        Self::new_with_config(validator_count, ChainConfig::default())
    }

    pub fn new_with_config(validator_count: usize, config: ChainConfig) -> Self {
        let spec = ChainSpec::mainnet();
        let log = null_logger();

        let validators = generate_deterministic_validators(validator_count);
        let mut genesis_state: BeaconState<E> =
            BeaconState::genesis(HARNESS_GENESIS_TIME, validators.clone());
        genesis_state.latest_block_header =
            BeaconBlock::empty(spec.genesis_slot).temporary_block_header();
        let genesis_state_root = genesis_state.canonical_root();

        let mut genesis_block = BeaconBlock::empty(spec.genesis_slot);
        genesis_block.state_root = genesis_state_root;
        let genesis_block_root = genesis_block.canonical_root();

        let genesis_proto_block = ProtoBlock {
            slot: spec.genesis_slot,
            block_root: genesis_block_root,
            parent_root: Hash256::zero(),
            state_root: genesis_state_root,
            execution_status: ExecutionStatus::PreMerge,
            execution_block_hash: None,
        };

        let slot_clock = ManualSlotClock::new(
            spec.genesis_slot,
            Duration::from_secs(0),
            Duration::from_secs(spec.seconds_per_slot),
        );

        let store = MemoryStore::new();
        store
            .put_block(
                genesis_block_root,
                SignedBeaconBlock {
                    message: genesis_block,
                    signature: Signature::empty(),
                },
            )
            .expect("memory store should not fail");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let chain = BeaconChain::new(
            spec,
            config,
            genesis_block_root,
            slot_clock,
            MemoryForkChoice::new(genesis_proto_block),
            MockExecutionEngine::new(),
            TestingSignatureVerifier,
            store,
            shutdown_rx,
            log,
        );

        chain.state_cache.add(genesis_state_root, &genesis_state);
        chain.checkpoint_state_cache.add(
            &Checkpoint {
                epoch: Epoch::new(0),
                root: genesis_block_root,
            },
            &genesis_state,
        );

        let mut states = HashMap::new();
        states.insert(genesis_block_root, genesis_state);

        Self {
            chain,
            validators,
            genesis_block_root,
            genesis_state_root,
            shutdown_tx,
            states,
        }
    }

    /// The post-state the harness computed for one of its own blocks.
    pub fn post_state(&self, block_root: &Hash256) -> Option<&BeaconState<E>> {
        self.states.get(block_root)
    }

    /// Moves the clock forward to `slot` if it is behind.
    pub fn set_current_slot(&self, slot: Slot) {
        let now = self
            .chain
            .slot_clock
            .now()
            .expect("harness clock should read");
        if now < slot {
            self.chain.slot_clock.set_slot(slot.as_u64());
        }
    }

    /// Signs `block` with the proposer's key under the testing scheme.
    pub fn sign_block(&self, block: BeaconBlock) -> SignedBeaconBlock {
        let pubkey = self.validators[block.proposer_index as usize].pubkey;
        let message = compute_signing_root(block.canonical_root(), Domain::BeaconProposer);
        let signature = keyed_hash_sign(message, &[pubkey]);
        SignedBeaconBlock {
            message: block,
            signature,
        }
    }

    /// A full-committee attestation for `attestation_slot`, voting for `head_root` as head,
    /// built against (and therefore consistent with) `state`.
    fn make_attestation(
        &self,
        state: &BeaconState<E>,
        head_root: Hash256,
        attestation_slot: Slot,
    ) -> Option<Attestation> {
        let target_epoch = attestation_slot.epoch(E::slots_per_epoch());
        let target_root = state.get_block_root_at_epoch_start(target_epoch).ok()?;
        let source = if target_epoch == state.current_epoch() {
            state.current_justified_checkpoint
        } else {
            state.previous_justified_checkpoint
        };

        let data = AttestationData {
            slot: attestation_slot,
            index: 0,
            beacon_block_root: head_root,
            source,
            target: Checkpoint {
                epoch: target_epoch,
                root: target_root,
            },
        };

        let mut committee = state.get_beacon_committee(attestation_slot).ok()?;
        committee.sort_unstable();
        let pubkeys: Vec<PublicKey> = committee
            .iter()
            .map(|&index| self.validators[index].pubkey)
            .collect();

        let message = compute_signing_root(data.canonical_root(), Domain::BeaconAttester);
        Some(Attestation {
            aggregation_bits: vec![true; committee.len()],
            data,
            signature: keyed_hash_sign(message, &pubkeys),
        })
    }

    /// Produces a valid block on top of `parent_root` at `slot`, returning it with its
    /// post-state. The block carries a full-committee attestation for the previous slot unless
    /// `attest` is false.
    pub fn make_block_ext(
        &mut self,
        parent_root: Hash256,
        slot: Slot,
        attest: bool,
        execution_payload: Option<ExecutionPayload>,
    ) -> (Arc<SignedBeaconBlock>, BeaconState<E>) {
        let mut state = self
            .states
            .get(&parent_root)
            .expect("parent block must have been produced by this harness")
            .clone();

        complete_state_advance(&mut state, None, slot).expect("state advance should succeed");
        state
            .build_epoch_context()
            .expect("context should build for test state");

        let attestations = if attest {
            self.make_attestation(&state, parent_root, slot - 1)
                .into_iter()
                .collect()
        } else {
            vec![]
        };

        let mut block = BeaconBlock {
            slot,
            proposer_index: state
                .get_beacon_proposer_index(slot)
                .expect("proposer should be known"),
            parent_root: state.latest_block_header_root(),
            state_root: Hash256::zero(),
            body: BeaconBlockBody {
                attestations,
                execution_payload,
            },
        };

        let mut post_state = state;
        per_block_processing(
            &mut post_state,
            &SignedBeaconBlock {
                message: block.clone(),
                signature: Signature::empty(),
            },
        )
        .expect("harness should produce valid blocks");
        block.state_root = post_state.canonical_root();

        let signed = Arc::new(self.sign_block(block));
        self.states
            .insert(signed.canonical_root(), post_state.clone());
        (signed, post_state)
    }

    pub fn make_block(
        &mut self,
        parent_root: Hash256,
        slot: Slot,
    ) -> (Arc<SignedBeaconBlock>, BeaconState<E>) {
        self.make_block_ext(parent_root, slot, true, None)
    }

    /// A payload that extends the execution chain of `pre_state`, with a block hash derived
    /// from `slot`.
    pub fn make_payload(&self, parent_root: &Hash256, slot: Slot) -> ExecutionPayload {
        let parent_state = self
            .states
            .get(parent_root)
            .expect("parent block must have been produced by this harness");
        ExecutionPayload {
            parent_hash: parent_state.latest_execution_block_hash,
            block_hash: ExecutionBlockHash(Hash256::from_low_u64_be(slot.as_u64() + 1)),
            block_number: slot.as_u64(),
            timestamp: HARNESS_GENESIS_TIME + slot.as_u64() * 12,
        }
    }

    /// Produces a block on `parent_root` at `slot` and runs it through the import pipeline.
    pub async fn add_block(
        &mut self,
        parent_root: Hash256,
        slot: Slot,
    ) -> Result<Hash256, BlockError<E>> {
        let (block, _) = self.make_block(parent_root, slot);
        self.process_block(block).await
    }

    /// Runs an already-produced block through the import pipeline, advancing the clock so the
    /// block is not from the future.
    pub async fn process_block(
        &self,
        block: Arc<SignedBeaconBlock>,
    ) -> Result<Hash256, BlockError<E>> {
        self.set_current_slot(block.slot());
        self.chain
            .process_block(PartiallyVerifiedBlock::new(block))
            .await
    }

    /// Extends the canonical chain by `count` blocks, one per slot, and returns the new head
    /// block root.
    pub async fn extend_chain(&mut self, count: usize) -> Hash256 {
        let mut head_root = self.chain.head().block_root;
        for _ in 0..count {
            let head_slot = self.chain.head().slot;
            head_root = self
                .add_block(head_root, head_slot + 1)
                .await
                .expect("harness blocks should import");
        }
        head_root
    }
}
