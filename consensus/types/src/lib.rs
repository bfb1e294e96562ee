//! Types used by the beacon chain block-import pipeline.
//!
//! The `BeaconState` carries an embedded epoch context (shuffling, proposers,
//! effective balances) which must always be consistent with the state's slot.

pub mod attestation;
pub mod beacon_block;
pub mod beacon_block_header;
pub mod beacon_state;
pub mod chain_spec;
pub mod checkpoint;
pub mod eth_spec;
pub mod execution_payload;
pub mod signature;
pub mod slot_epoch;
pub mod validator;

pub use attestation::{Attestation, AttestationData, IndexedAttestation};
pub use beacon_block::{BeaconBlock, BeaconBlockBody, SignedBeaconBlock};
pub use beacon_block_header::BeaconBlockHeader;
pub use beacon_state::{BeaconState, BeaconStateError, EpochContext};
pub use chain_spec::{compute_signing_root, ChainSpec, Domain};
pub use checkpoint::Checkpoint;
pub use eth_spec::{EthSpec, MainnetEthSpec, MinimalEthSpec};
pub use execution_payload::{ExecutionBlockHash, ExecutionPayload};
pub use signature::{PublicKey, Signature};
pub use slot_epoch::{Epoch, Slot};
pub use validator::Validator;

pub use ethereum_types::H256 as Hash256;
