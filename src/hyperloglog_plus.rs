//! ## Bias-corrected HyperLogLog
//! HyperLogLog with a 64-bit hash and the empirical bias correction of
//! [HyperLogLog in Practice](https://static.googleusercontent.com/media/research.google.com/en//pubs/archive/40671.pdf),
//! without the sparse representation.
//!
//! The bucket index is taken from the top `P` bits of the hash, the rank is the number of
//! leading zeros of the remaining `64 - P` bits plus one.
//!
//! For raw estimates up to `5 * M` the empirical bias is subtracted. Linear counting is used
//! instead while its estimate is below a per-precision threshold (`P <= 18`), or while the raw
//! estimate is below `5 * M` (`P > 18`, where no bias data exists).

use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasherDefault, Hash, Hasher};

use wyhash::WyHash;

use crate::bias;
use crate::error::SketchError;
use crate::estimator::CardinalityEstimatorTrait;
use crate::hash::{hash_bytes, hash_item, hash_u64};
use crate::registers::Registers;

/// Bias-corrected HyperLogLog over the full 64-bit hash, named `hllnobias{P}`.
pub struct HyperLogLogPlus<H: Hasher + Default = WyHash> {
    registers: Registers,
    build_hasher: BuildHasherDefault<H>,
}

impl<H: Hasher + Default> HyperLogLogPlus<H> {
    /// Create new `HyperLogLogPlus` with precision `P` in `[7, 31)`.
    pub fn new(precision: u8) -> Result<Self, SketchError> {
        Registers::validate_precision(precision)?;
        Ok(Self {
            registers: Registers::new(precision),
            build_hasher: BuildHasherDefault::default(),
        })
    }

    /// Precision `P`
    #[inline]
    pub fn precision(&self) -> u8 {
        self.registers.precision()
    }

    /// Raw register values, one byte per register
    #[inline]
    pub fn registers(&self) -> &[u8] {
        self.registers.as_bytes()
    }

    /// Insert a hashable item
    #[inline]
    pub fn insert<T: Hash + ?Sized>(&mut self, item: &T) {
        self.insert_hash(hash_item(&self.build_hasher, item));
    }

    /// Merge `rhs` into `self`. Both sketches must have the same precision.
    pub fn merge(&mut self, rhs: &Self) -> Result<(), SketchError> {
        if self.precision() != rhs.precision() {
            return Err(SketchError::incompatible(self.name(), rhs.name()));
        }
        self.registers.merge(&rhs.registers);
        Ok(())
    }

    /// Return bucket index and rank of 64-bit hash. Bit `P - 1` is forced set after shifting
    /// out the index, which bounds the rank by `64 - P + 1`.
    #[inline]
    fn index_and_rank(hash: u64, precision: u8) -> (usize, u8) {
        let idx = hash >> (64 - precision);
        let rank = ((hash << precision) | (1 << (precision - 1))).leading_zeros() as u8 + 1;
        (idx as usize, rank)
    }

    /// Largest rank a register may hold at `precision`
    fn max_rank(precision: u8) -> u8 {
        64 - precision + 1
    }

    fn from_registers(registers: Registers) -> Self {
        Self {
            registers,
            build_hasher: BuildHasherDefault::default(),
        }
    }

    /// Rebuild sketch from raw register bytes
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn from_bytes(precision: u8, data: Vec<u8>) -> Result<Self, SketchError> {
        Registers::validate_precision(precision)
            .map_err(|_| SketchError::InvalidData("register precision out of range"))?;
        let registers = Registers::from_bytes(precision, data, Self::max_rank(precision))?;
        Ok(Self::from_registers(registers))
    }

    /// Bias-corrected estimate
    fn estimate(&self) -> f64 {
        let p = self.precision();
        let m = self.registers.len() as f64;
        let e = self.registers.raw_estimate();
        let e_prime = if e <= 5.0 * m {
            e - bias::estimate_bias(e, p)
        } else {
            e
        };

        let h = self.registers.linear_counting().unwrap_or(e_prime);
        let use_linear_counting = match bias::threshold(p) {
            Some(threshold) => h < threshold,
            None => e <= 5.0 * m,
        };

        if use_linear_counting {
            h
        } else {
            e_prime
        }
    }
}

impl<H: Hasher + Default> CardinalityEstimatorTrait for HyperLogLogPlus<H> {
    #[inline]
    fn insert_hash(&mut self, hash: u64) {
        let (idx, rank) = Self::index_and_rank(hash, self.precision());
        self.registers.update(idx, rank);
    }

    #[inline]
    fn insert_bytes(&mut self, bytes: &[u8]) {
        self.insert_hash(hash_bytes(&self.build_hasher, bytes));
    }

    #[inline]
    fn insert_u64(&mut self, value: u64) {
        self.insert_hash(hash_u64(&self.build_hasher, value));
    }

    fn cardinality(&self) -> u64 {
        // bias may exceed tiny raw estimates
        self.estimate().max(0.0).round() as u64
    }

    fn memory_footprint(&self) -> usize {
        self.registers.size_of()
    }

    fn name(&self) -> String {
        format!("hllnobias{}", self.precision())
    }
}

impl<H: Hasher + Default> Clone for HyperLogLogPlus<H> {
    fn clone(&self) -> Self {
        Self::from_registers(self.registers.clone())
    }
}

impl<H: Hasher + Default> PartialEq for HyperLogLogPlus<H> {
    fn eq(&self, rhs: &Self) -> bool {
        self.registers == rhs.registers
    }
}

impl<H: Hasher + Default> Debug for HyperLogLogPlus<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::splitmix64;
    use test_case::test_case;

    #[test_case(6 => false)]
    #[test_case(7 => true)]
    #[test_case(30 => true)]
    #[test_case(31 => false)]
    fn test_precision_validation(p: u8) -> bool {
        HyperLogLogPlus::<WyHash>::new(p).is_ok()
    }

    #[test_case(0, 14 => (0, 51); "zero hash")]
    #[test_case(u64::MAX, 14 => (0x3fff, 1); "all bits set")]
    #[test_case(0x0004_0000_0000_0000, 14 => (1, 51); "only index bit set")]
    #[test_case(0x0002_0000_0000_0000, 14 => (0, 1); "first rank bit set")]
    #[test_case(0x0000_0000_0000_0001, 7 => (0, 57); "lowest hash bit")]
    #[test_case(0x0000_0000_0000_0001, 30 => (0, 34); "p = 30")]
    fn test_index_and_rank(hash: u64, p: u8) -> (usize, u8) {
        HyperLogLogPlus::<WyHash>::index_and_rank(hash, p)
    }

    #[test]
    fn test_empty() {
        let hll = HyperLogLogPlus::<WyHash>::new(14).unwrap();
        assert_eq!(hll.cardinality(), 0);
        assert_eq!(hll.memory_footprint(), 16384);
        assert_eq!(hll.name(), "hllnobias14");
    }

    #[test_case(12, 100 => "{ name: hllnobias12, estimate: 97, size: 4096 }")]
    #[test_case(12, 5_000 => "{ name: hllnobias12, estimate: 5035, size: 4096 }")]
    #[test_case(12, 15_000 => "{ name: hllnobias12, estimate: 15026, size: 4096 }")]
    #[test_case(12, 100_000 => "{ name: hllnobias12, estimate: 101737, size: 4096 }")]
    #[test_case(20, 100_000 => "{ name: hllnobias20, estimate: 100091, size: 1048576 }")]
    fn test_estimate_of_hashes(p: u8, n: u64) -> String {
        let mut hll = HyperLogLogPlus::<WyHash>::new(p).unwrap();
        for i in 0..n {
            hll.insert_hash(splitmix64(i));
        }
        format!("{:?}", hll)
    }

    #[test_case(7, 20_000)]
    #[test_case(12, 1_000)]
    #[test_case(12, 10_000)]
    #[test_case(14, 50_000)]
    #[test_case(19, 100_000)]
    fn test_relative_error(p: u8, n: u64) {
        let mut hll = HyperLogLogPlus::<WyHash>::new(p).unwrap();
        for i in 0..n {
            hll.insert_u64(i);
        }
        let tolerance = 5.0 * 1.04 / ((1u64 << p) as f64).sqrt();
        let error = (hll.cardinality() as f64 - n as f64).abs() / n as f64;
        assert!(error < tolerance, "relative error {error} for p = {p}, n = {n}");
    }

    #[test]
    fn test_merge() {
        let mut lhs = HyperLogLogPlus::<WyHash>::new(12).unwrap();
        let mut rhs = HyperLogLogPlus::<WyHash>::new(12).unwrap();
        for i in 0..5_000 {
            lhs.insert_u64(i);
            rhs.insert_u64(i + 2_500);
        }

        let mut merged = lhs.clone();
        merged.merge(&rhs).unwrap();
        let estimate = merged.cardinality() as f64;
        assert!((estimate - 7_500.0).abs() / 7_500.0 < 0.1, "estimate {estimate}");

        // merge is commutative
        let mut reversed = rhs.clone();
        reversed.merge(&lhs).unwrap();
        assert_eq!(merged, reversed);

        assert!(lhs.merge(&HyperLogLogPlus::new(13).unwrap()).is_err());
    }
}
