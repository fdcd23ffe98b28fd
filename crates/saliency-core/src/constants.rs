//! Default values shared by the core and the orchestration crate.

/// Default deterministic seed for key derivation.
pub const DEFAULT_SEED: u64 = 42;

/// Default number of independent samples drawn per batch.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default batch budget: roughly 10k samples at the default batch size.
pub const DEFAULT_MAX_BATCHES: usize = 10_000 / DEFAULT_BATCH_SIZE;

/// Default convergence threshold on the monitored absolute delta.
pub const DEFAULT_MIN_CHANGE: f32 = 1e-2;

/// Golden-ratio increment used by the counter-based seed mixer.
pub(crate) const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;
