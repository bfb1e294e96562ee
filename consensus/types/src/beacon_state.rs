use crate::{
    Attestation, BeaconBlockHeader, Checkpoint, Epoch, EthSpec, ExecutionBlockHash, Hash256,
    IndexedAttestation, Slot, Validator,
};
use ethereum_hashing::{hash, hash32_concat};
use safe_arith::ArithError;
use ssz::Encode;
use std::marker::PhantomData;

pub const EFFECTIVE_BALANCE_INCREMENT: u64 = 1_000_000_000;

#[derive(Debug, PartialEq, Clone)]
pub enum BeaconStateError {
    /// The epoch context has not been built, or was built for a different epoch than the
    /// state's current epoch.
    EpochContextUninitialized,
    EpochContextOutOfDate {
        context_epoch: Epoch,
        state_epoch: Epoch,
    },
    /// A slot was out of the range covered by the `block_roots` ring buffer.
    SlotOutOfBounds {
        slot: Slot,
        state_slot: Slot,
    },
    UnknownValidator(u64),
    NoActiveValidators,
    /// Only a single committee per slot is modelled.
    InvalidCommitteeIndex(u64),
    /// An attestation's aggregation bits did not match its committee size.
    InvalidBitfieldLength {
        bits: usize,
        committee_len: usize,
    },
    ArithError(ArithError),
}

impl From<ArithError> for BeaconStateError {
    fn from(e: ArithError) -> Self {
        BeaconStateError::ArithError(e)
    }
}

/// Precomputed per-epoch data: active-validator shuffling, per-slot proposers and committees,
/// and the total active balance.
///
/// Expensive to derive, so it is carried inside the state and rebuilt exactly when the state
/// crosses an epoch boundary. It must never be stale relative to `state.slot`.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochContext {
    pub epoch: Epoch,
    pub active_validator_indices: Vec<usize>,
    pub total_active_balance: u64,
    /// Proposer index for each slot of `epoch`.
    proposers: Vec<usize>,
    /// One committee per slot of `epoch`.
    committees: Vec<Vec<usize>>,
}

/// The state of the `BeaconChain` at some slot, plus its embedded epoch context.
///
/// The epoch context is excluded from the state's content identity (`canonical_root`), since it
/// is derivable from the rest of the state.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconState<E: EthSpec> {
    pub genesis_time: u64,
    pub genesis_validators_root: Hash256,
    pub slot: Slot,
    pub latest_block_header: BeaconBlockHeader,
    /// Ring buffer of the most recent block roots, one per slot.
    pub block_roots: Vec<Hash256>,
    pub validators: Vec<Validator>,
    pub balances: Vec<u64>,
    /// Whether each validator made a timely target vote in the previous/current epoch.
    pub previous_epoch_participation: Vec<bool>,
    pub current_epoch_participation: Vec<bool>,
    /// Bit `n` set means epoch `current - n - 1` was justified (low 4 bits used).
    pub justification_bits: u8,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    /// Block hash of the most recent execution payload, zero before the merge.
    pub latest_execution_block_hash: ExecutionBlockHash,
    /// Built on demand; never encoded.
    pub epoch_context: Option<EpochContext>,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> BeaconState<E> {
    /// Produce the genesis state for the given validator set.
    pub fn genesis(genesis_time: u64, validators: Vec<Validator>) -> Self {
        let genesis_validators_root = {
            let mut buf = vec![];
            for validator in &validators {
                buf.extend_from_slice(validator.pubkey.as_bytes());
            }
            Hash256::from_slice(&hash(&buf))
        };
        let balances = validators.iter().map(|v| v.effective_balance).collect();
        let validator_count = validators.len();

        Self {
            genesis_time,
            genesis_validators_root,
            slot: Slot::new(0),
            latest_block_header: BeaconBlockHeader::default(),
            block_roots: vec![Hash256::zero(); E::slots_per_historical_root()],
            validators,
            balances,
            previous_epoch_participation: vec![false; validator_count],
            current_epoch_participation: vec![false; validator_count],
            justification_bits: 0,
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
            latest_execution_block_hash: ExecutionBlockHash::zero(),
            epoch_context: None,
            _phantom: PhantomData,
        }
    }

    /// The epoch corresponding to `self.slot`.
    pub fn current_epoch(&self) -> Epoch {
        self.slot.epoch(E::slots_per_epoch())
    }

    /// The epoch prior to `self.current_epoch()`, saturating at zero.
    pub fn previous_epoch(&self) -> Epoch {
        let current_epoch = self.current_epoch();
        if current_epoch > Epoch::new(0) {
            current_epoch - 1
        } else {
            current_epoch
        }
    }

    /// The state's content identity: the hash of its encoded consensus fields.
    ///
    /// The epoch context is excluded; two states with equal consensus content have equal roots
    /// regardless of which caches are built.
    pub fn canonical_root(&self) -> Hash256 {
        let mut buf = vec![];
        buf.extend_from_slice(&self.genesis_time.as_ssz_bytes());
        buf.extend_from_slice(self.genesis_validators_root.as_bytes());
        buf.extend_from_slice(&self.slot.as_ssz_bytes());
        buf.extend_from_slice(&self.latest_block_header.as_ssz_bytes());
        buf.extend_from_slice(&self.block_roots.as_ssz_bytes());
        buf.extend_from_slice(&self.validators.as_ssz_bytes());
        buf.extend_from_slice(&self.balances.as_ssz_bytes());
        buf.extend_from_slice(&self.previous_epoch_participation.as_ssz_bytes());
        buf.extend_from_slice(&self.current_epoch_participation.as_ssz_bytes());
        buf.push(self.justification_bits);
        buf.extend_from_slice(&self.previous_justified_checkpoint.as_ssz_bytes());
        buf.extend_from_slice(&self.current_justified_checkpoint.as_ssz_bytes());
        buf.extend_from_slice(&self.finalized_checkpoint.as_ssz_bytes());
        buf.extend_from_slice(&self.latest_execution_block_hash.as_ssz_bytes());
        Hash256::from_slice(&hash(&buf))
    }

    /// Returns the block root at `slot`, if `slot` is within the ring buffer's range
    /// `state.slot - slots_per_historical_root < slot < state.slot`.
    pub fn get_block_root_at_slot(&self, slot: Slot) -> Result<Hash256, BeaconStateError> {
        if slot < self.slot && self.slot <= slot + E::slots_per_historical_root() as u64 {
            Ok(self.block_roots[slot.as_usize() % E::slots_per_historical_root()])
        } else {
            Err(BeaconStateError::SlotOutOfBounds {
                slot,
                state_slot: self.slot,
            })
        }
    }

    pub fn set_block_root_at_slot(&mut self, slot: Slot, block_root: Hash256) {
        let i = slot.as_usize() % E::slots_per_historical_root();
        self.block_roots[i] = block_root;
    }

    /// The block root of the first slot of `epoch`, used as the FFG target root.
    pub fn get_block_root_at_epoch_start(&self, epoch: Epoch) -> Result<Hash256, BeaconStateError> {
        let slot = epoch.start_slot(E::slots_per_epoch());
        if slot == self.slot {
            // The block at the current slot is not yet in `block_roots`; its header is the
            // latest block header.
            Ok(self.latest_block_header_root())
        } else {
            self.get_block_root_at_slot(slot)
        }
    }

    /// Root of `latest_block_header`, assuming its `state_root` has been backfilled.
    pub fn latest_block_header_root(&self) -> Hash256 {
        self.latest_block_header.canonical_root()
    }

    pub fn get_active_validator_indices(&self, epoch: Epoch) -> Vec<usize> {
        self.validators
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_active_at(epoch))
            .map(|(i, _)| i)
            .collect()
    }

    /// Build the epoch context for the state's current epoch, replacing any stale context.
    pub fn build_epoch_context(&mut self) -> Result<(), BeaconStateError> {
        let epoch = self.current_epoch();
        if self
            .epoch_context
            .as_ref()
            .map_or(false, |ctx| ctx.epoch == epoch)
        {
            return Ok(());
        }

        let active_validator_indices = self.get_active_validator_indices(epoch);
        if active_validator_indices.is_empty() {
            return Err(BeaconStateError::NoActiveValidators);
        }

        let total_active_balance = active_validator_indices
            .iter()
            .map(|&i| self.validators[i].effective_balance)
            .sum();

        let seed = self.shuffling_seed(epoch);
        let shuffled = shuffle_indices(&active_validator_indices, &seed);

        let slots_per_epoch = E::slots_per_epoch() as usize;
        let committees = (0..slots_per_epoch)
            .map(|position| {
                let start = position * shuffled.len() / slots_per_epoch;
                let end = (position + 1) * shuffled.len() / slots_per_epoch;
                shuffled[start..end].to_vec()
            })
            .collect();

        let start_slot = epoch.start_slot(E::slots_per_epoch());
        let proposers = (0..E::slots_per_epoch())
            .map(|i| {
                let slot = start_slot + i;
                let digest = hash32_concat(seed.as_bytes(), &slot.as_u64().to_le_bytes());
                let mut prefix = [0u8; 8];
                prefix.copy_from_slice(&digest[0..8]);
                let offset = u64::from_le_bytes(prefix) as usize;
                shuffled[offset % shuffled.len()]
            })
            .collect();

        self.epoch_context = Some(EpochContext {
            epoch,
            active_validator_indices,
            total_active_balance,
            proposers,
            committees,
        });

        Ok(())
    }

    /// Returns the epoch context, requiring it to match the state's current epoch.
    pub fn epoch_context(&self) -> Result<&EpochContext, BeaconStateError> {
        let ctx = self
            .epoch_context
            .as_ref()
            .ok_or(BeaconStateError::EpochContextUninitialized)?;
        if ctx.epoch != self.current_epoch() {
            return Err(BeaconStateError::EpochContextOutOfDate {
                context_epoch: ctx.epoch,
                state_epoch: self.current_epoch(),
            });
        }
        Ok(ctx)
    }

    /// Returns the proposer index for `slot`, which must lie in the state's current epoch.
    pub fn get_beacon_proposer_index(&self, slot: Slot) -> Result<u64, BeaconStateError> {
        let ctx = self.epoch_context()?;
        let position = slot.as_u64() % E::slots_per_epoch();
        Ok(ctx.proposers[position as usize] as u64)
    }

    /// Returns the committee assigned to `slot`. Committees for epochs other than the context's
    /// are computed on the fly (attestations may reference the previous epoch).
    pub fn get_beacon_committee(&self, slot: Slot) -> Result<Vec<usize>, BeaconStateError> {
        let epoch = slot.epoch(E::slots_per_epoch());
        let position = (slot.as_u64() % E::slots_per_epoch()) as usize;

        if let Ok(ctx) = self.epoch_context() {
            if ctx.epoch == epoch {
                return Ok(ctx.committees[position].clone());
            }
        }

        let active = self.get_active_validator_indices(epoch);
        if active.is_empty() {
            return Err(BeaconStateError::NoActiveValidators);
        }
        let shuffled = shuffle_indices(&active, &self.shuffling_seed(epoch));
        let slots_per_epoch = E::slots_per_epoch() as usize;
        let start = position * shuffled.len() / slots_per_epoch;
        let end = (position + 1) * shuffled.len() / slots_per_epoch;
        Ok(shuffled[start..end].to_vec())
    }

    /// Convert an aggregate attestation into its indexed form using the committee shuffling.
    pub fn get_indexed_attestation(
        &self,
        attestation: &Attestation,
    ) -> Result<IndexedAttestation, BeaconStateError> {
        if attestation.data.index != 0 {
            return Err(BeaconStateError::InvalidCommitteeIndex(
                attestation.data.index,
            ));
        }

        let committee = self.get_beacon_committee(attestation.data.slot)?;
        if attestation.aggregation_bits.len() != committee.len() {
            return Err(BeaconStateError::InvalidBitfieldLength {
                bits: attestation.aggregation_bits.len(),
                committee_len: committee.len(),
            });
        }

        let mut attesting_indices: Vec<u64> = committee
            .iter()
            .zip(&attestation.aggregation_bits)
            .filter(|(_, bit)| **bit)
            .map(|(&index, _)| index as u64)
            .collect();
        attesting_indices.sort_unstable();

        Ok(IndexedAttestation {
            attesting_indices,
            data: attestation.data,
            signature: attestation.signature,
        })
    }

    /// Effective balance increments with inactive (and slashed) validators zeroed, the form
    /// fork choice expects for justified-checkpoint balances.
    pub fn effective_balance_increments_zero_inactive(&self) -> Vec<u64> {
        let epoch = self.current_epoch();
        self.validators
            .iter()
            .map(|v| {
                if v.is_active_at(epoch) && !v.slashed {
                    v.effective_balance / EFFECTIVE_BALANCE_INCREMENT
                } else {
                    0
                }
            })
            .collect()
    }

    fn shuffling_seed(&self, epoch: Epoch) -> Hash256 {
        let mut epoch_bytes = [0u8; 32];
        epoch_bytes[0..8].copy_from_slice(&epoch.as_u64().to_le_bytes());
        Hash256::from(hash32_concat(
            self.genesis_validators_root.as_bytes(),
            &epoch_bytes,
        ))
    }
}

/// Deterministic permutation of `indices` keyed by `seed`: stable sort by per-index digest.
fn shuffle_indices(indices: &[usize], seed: &Hash256) -> Vec<usize> {
    let mut keyed: Vec<([u8; 32], usize)> = indices
        .iter()
        .map(|&i| {
            (
                hash32_concat(seed.as_bytes(), &(i as u64).to_le_bytes()),
                i,
            )
        })
        .collect();
    keyed.sort();
    keyed.into_iter().map(|(_, i)| i).collect()
}
