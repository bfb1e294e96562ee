//! Collection of the signature sets a block requires, for batch verification by an external
//! verifier.
//!
//! A `SignatureSet` is one aggregate-verification unit: `signature` must be a valid (aggregate)
//! signature by `pubkeys` over `message`. All sets of a block are collected up front so the
//! verifier can check them in a single batch, which is the dominant CPU cost of block import.

use smallvec::{smallvec, SmallVec};
use types::{
    compute_signing_root, Attestation, BeaconState, BeaconStateError, Domain, EthSpec, Hash256,
    PublicKey, Signature, SignedBeaconBlock,
};

#[derive(Debug, PartialEq)]
pub enum SignatureSetError {
    /// A signature set referenced a validator index that does not exist.
    UnknownValidator(u64),
    BeaconStateError(BeaconStateError),
}

impl From<BeaconStateError> for SignatureSetError {
    fn from(e: BeaconStateError) -> Self {
        SignatureSetError::BeaconStateError(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureSet {
    pub pubkeys: SmallVec<[PublicKey; 1]>,
    pub message: Hash256,
    pub signature: Signature,
}

/// The proposer's signature over the block root.
pub fn block_proposal_signature_set<E: EthSpec>(
    state: &BeaconState<E>,
    signed_block: &SignedBeaconBlock,
    block_root: Option<Hash256>,
) -> Result<SignatureSet, SignatureSetError> {
    let proposer_index = signed_block.message.proposer_index;
    let pubkey = state
        .validators
        .get(proposer_index as usize)
        .ok_or(SignatureSetError::UnknownValidator(proposer_index))?
        .pubkey;

    let block_root = block_root.unwrap_or_else(|| signed_block.canonical_root());

    Ok(SignatureSet {
        pubkeys: smallvec![pubkey],
        message: compute_signing_root(block_root, Domain::BeaconProposer),
        signature: signed_block.signature,
    })
}

/// The aggregate signature of one attestation's committee members.
pub fn indexed_attestation_signature_set<E: EthSpec>(
    state: &BeaconState<E>,
    attestation: &Attestation,
) -> Result<SignatureSet, SignatureSetError> {
    let indexed = state.get_indexed_attestation(attestation)?;

    let mut pubkeys = SmallVec::with_capacity(indexed.attesting_indices.len());
    for &validator_index in &indexed.attesting_indices {
        pubkeys.push(
            state
                .validators
                .get(validator_index as usize)
                .ok_or(SignatureSetError::UnknownValidator(validator_index))?
                .pubkey,
        );
    }

    Ok(SignatureSet {
        pubkeys,
        message: compute_signing_root(attestation.data.canonical_root(), Domain::BeaconAttester),
        signature: attestation.signature,
    })
}

/// Every signature set the block requires: the proposer's plus one per attestation.
pub fn block_signature_sets<E: EthSpec>(
    state: &BeaconState<E>,
    signed_block: &SignedBeaconBlock,
    block_root: Option<Hash256>,
) -> Result<Vec<SignatureSet>, SignatureSetError> {
    let mut sets = Vec::with_capacity(1 + signed_block.message.body.attestations.len());
    sets.push(block_proposal_signature_set(state, signed_block, block_root)?);
    sets.extend(block_signature_sets_except_proposer(state, signed_block)?);
    Ok(sets)
}

/// Every signature set except the proposer's, for blocks whose proposal signature was already
/// verified upstream (e.g. at gossip).
pub fn block_signature_sets_except_proposer<E: EthSpec>(
    state: &BeaconState<E>,
    signed_block: &SignedBeaconBlock,
) -> Result<Vec<SignatureSet>, SignatureSetError> {
    signed_block
        .message
        .body
        .attestations
        .iter()
        .map(|attestation| indexed_attestation_signature_set(state, attestation))
        .collect()
}
