use std::fmt::Debug;

/// Compile-time constants which differ between presets of the consensus spec.
pub trait EthSpec: 'static + Default + Sync + Send + Clone + Debug + PartialEq + Eq {
    /// Returns the number of slots per epoch.
    fn slots_per_epoch() -> u64;

    /// Returns the length of the `block_roots` ring buffer.
    fn slots_per_historical_root() -> usize;

    /// Returns the number of epochs per `block_roots` ring buffer.
    fn epochs_per_historical_root() -> u64 {
        Self::slots_per_historical_root() as u64 / Self::slots_per_epoch()
    }
}

/// Ethereum Foundation mainnet specification.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MainnetEthSpec;

impl EthSpec for MainnetEthSpec {
    fn slots_per_epoch() -> u64 {
        32
    }

    fn slots_per_historical_root() -> usize {
        8_192
    }
}

/// Ethereum Foundation minimal specification, as defined in the consensus-spec presets.
///
/// Primarily useful for testing: epoch transitions arrive four times as often as mainnet.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MinimalEthSpec;

impl EthSpec for MinimalEthSpec {
    fn slots_per_epoch() -> u64 {
        8
    }

    fn slots_per_historical_root() -> usize {
        64
    }
}
