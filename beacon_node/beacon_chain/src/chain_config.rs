pub const DEFAULT_STATE_CACHE_SIZE: usize = 96;
pub const DEFAULT_CHECKPOINT_STATE_CACHE_MAX_EPOCHS: usize = 10;

/// Tunable parameters of the block-import pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Maximum number of states held by the hot-state cache.
    pub state_cache_size: usize,
    /// Maximum number of distinct epochs held by the checkpoint-state cache.
    pub checkpoint_state_cache_max_epochs: usize,
    /// Maximum distance (in epochs) a state regeneration is willing to replay blocks over
    /// before giving up.
    pub max_replay_epochs: u64,
    /// Maximum number of queued state-regeneration jobs.
    pub regen_queue_max_length: usize,
    /// The regeneration queue reports itself too busy for speculative work above this length.
    pub regen_work_threshold: usize,
    /// Maximum number of queued block-import jobs.
    pub block_queue_max_length: usize,
    /// Verify each signature set individually rather than as a single batch. Slower, but
    /// identifies precisely which set is invalid.
    pub disable_bls_batch_verify: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            state_cache_size: DEFAULT_STATE_CACHE_SIZE,
            checkpoint_state_cache_max_epochs: DEFAULT_CHECKPOINT_STATE_CACHE_MAX_EPOCHS,
            max_replay_epochs: 5,
            regen_queue_max_length: 256,
            regen_work_threshold: 16,
            block_queue_max_length: 64,
            disable_bls_batch_verify: false,
        }
    }
}
