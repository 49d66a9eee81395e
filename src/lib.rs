//! `uniq-sketch` is a Rust crate providing a family of sketches estimating the number of distinct
//! elements in a stream or dataset within bounded memory.
//!
//! Four sketches trade accuracy, memory and speed differently:
//! - [`HyperLogLog`]: classic HyperLogLog over a 32-bit hash with small and large range corrections.
//! - [`HyperLogLogPlus`]: HyperLogLog over a 64-bit hash with empirical bias correction.
//! - [`HybridEstimator`]: exact hash set promoted to HyperLogLog once it holds 8192 hashes.
//! - [`ThinningCounter`]: hash set thinned by powers of two to stay under 512 KiB.
//!
//! Sketches of the same kind and configuration built independently, e.g. one per shard or
//! thread, can be merged into a sketch of the union of their inputs.
mod bias;
mod bias_data;
mod error;
pub mod estimator;
mod hash;
mod hash_table;
pub mod hybrid;
pub mod hyperloglog;
pub mod hyperloglog_plus;
mod registers;
#[cfg(feature = "with_serde")]
mod serde;
pub mod thinning;

pub use error::SketchError;
pub use estimator::{CardinalityEstimatorTrait, Estimator, EstimatorKind};
pub use hybrid::HybridEstimator;
pub use hyperloglog::HyperLogLog;
pub use hyperloglog_plus::HyperLogLogPlus;
pub use thinning::ThinningCounter;

#[cfg(test)]
mod test_util {
    /// SplitMix64 mixer, turns a counter into well distributed test hashes.
    pub(crate) fn splitmix64(x: u64) -> u64 {
        let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }
}
