use async_trait::async_trait;
use state_processing::SignatureSet;

/// Verifier for the (aggregate) signature sets a block carries.
///
/// Verification is batched: a block's proposer signature and all attestation signatures are
/// checked together where possible. The whole batch fails if any set is invalid, so callers
/// wanting to identify the offending set must verify sets one at a time.
#[async_trait]
pub trait SignatureVerifier: Send + Sync + 'static {
    /// Returns `true` only if every set verifies.
    async fn verify_signature_sets(&self, sets: Vec<SignatureSet>) -> bool;
}
