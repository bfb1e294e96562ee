use crate::{Epoch, PublicKey};
use ssz_derive::{Decode, Encode};

/// Information about a `BeaconChain` validator.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Validator {
    pub pubkey: PublicKey,
    pub effective_balance: u64,
    pub slashed: bool,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
}

impl Validator {
    /// Returns `true` if the validator is considered active at some epoch.
    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }
}

impl Default for Validator {
    /// Yields a "default" `Validator`. Primarily used for testing.
    fn default() -> Self {
        Self {
            pubkey: PublicKey::default(),
            effective_balance: 32_000_000_000,
            slashed: false,
            activation_epoch: Epoch::new(0),
            exit_epoch: Epoch::new(u64::MAX),
        }
    }
}
