//! ## Classic HyperLogLog
//! HyperLogLog as described in the
//! [original paper](http://algo.inria.fr/flajolet/Publications/FlFuGaMe07.pdf), using a
//! 32-bit hash and precision `P` in `[7, 31)`.
//!
//! Differences from the paper:
//! - every register takes a byte instead of 5 bits;
//! - bucket index and rank are taken from the least-significant bits of the hash.
//!
//! Expected error is `1.04 / sqrt(2^P)`, e.g. 1.62% for P = 12 and 0.81% for P = 14.

use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasherDefault, Hash, Hasher};

use wyhash::WyHash;

use crate::error::SketchError;
use crate::estimator::CardinalityEstimatorTrait;
use crate::hash::{hash_bytes, hash_item, hash_u64};
use crate::registers::Registers;

/// `2^32` as `f64`
pub(crate) const TWO_TO_THE_32: f64 = 4_294_967_296.0;
/// Estimates above this value get the large range correction
const LARGE_RANGE_THRESHOLD: f64 = TWO_TO_THE_32 / 30.0;

/// Classic HyperLogLog over the low 32 bits of the hash, named `hllraw{P}`.
pub struct HyperLogLog<H: Hasher + Default = WyHash> {
    registers: Registers,
    build_hasher: BuildHasherDefault<H>,
}

impl<H: Hasher + Default> HyperLogLog<H> {
    /// Create new `HyperLogLog` with precision `P` in `[7, 31)`.
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

    /// Return bucket index and rank of 32-bit hash: index is taken from the lowest `P` bits,
    /// rank is the position of the lowest set bit among the remaining ones.
    #[inline]
    fn index_and_rank(hash: u32, precision: u8) -> (usize, u8) {
        let idx = hash & ((1 << precision) - 1);
        let rest = hash >> precision;
        let rank = if rest == 0 {
            32 - precision + 1
        } else {
            rest.trailing_zeros() as u8 + 1
        };
        (idx as usize, rank)
    }

    /// Largest rank a register may hold at `precision`
    fn max_rank(precision: u8) -> u8 {
        32 - precision + 1
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
}

impl<H: Hasher + Default> CardinalityEstimatorTrait for HyperLogLog<H> {
    #[inline]
    fn insert_hash(&mut self, hash: u64) {
        let (idx, rank) = Self::index_and_rank(hash as u32, self.precision());
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
        let estimate = estimate_with_range_correction(&self.registers);
        estimate.round() as u64
    }

    fn memory_footprint(&self) -> usize {
        self.registers.size_of()
    }

    fn name(&self) -> String {
        format!("hllraw{}", self.precision())
    }
}

/// Harmonic mean estimate with small range (linear counting) and
/// large range (32-bit hash space saturation) corrections.
pub(crate) fn estimate_with_range_correction(registers: &Registers) -> f64 {
    let m = registers.len() as f64;
    let e = registers.raw_estimate();

    if e <= 2.5 * m {
        return registers.linear_counting().unwrap_or(e);
    }

    if e > LARGE_RANGE_THRESHOLD {
        let fill = 1.0 - e / TWO_TO_THE_32;
        // saturated hash space, correction is undefined
        if fill <= 0.0 {
            return e;
        }
        return -TWO_TO_THE_32 * fill.ln();
    }

    e
}

impl<H: Hasher + Default> Clone for HyperLogLog<H> {
    fn clone(&self) -> Self {
        Self::from_registers(self.registers.clone())
    }
}

impl<H: Hasher + Default> PartialEq for HyperLogLog<H> {
    fn eq(&self, rhs: &Self) -> bool {
        self.registers == rhs.registers
    }
}

impl<H: Hasher + Default> Debug for HyperLogLog<H> {
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
        HyperLogLog::<WyHash>::new(p).is_ok()
    }

    #[test_case(0x0000_0000, 12 => (0, 21); "zero hash")]
    #[test_case(0x0000_1fff, 12 => (0xfff, 1); "lowest rest bit set")]
    #[test_case(0x0000_2123, 12 => (0x123, 2); "rest ends with zero")]
    #[test_case(0x8000_0007, 12 => (7, 20); "only top bit set")]
    #[test_case(0x0000_0080, 7 => (0, 1); "p = 7")]
    #[test_case(0xc000_0001, 30 => (1, 1); "p = 30")]
    fn test_index_and_rank(hash: u32, p: u8) -> (usize, u8) {
        HyperLogLog::<WyHash>::index_and_rank(hash, p)
    }

    #[test]
    fn test_empty() {
        let hll = HyperLogLog::<WyHash>::new(12).unwrap();
        assert_eq!(hll.cardinality(), 0);
        assert_eq!(hll.memory_footprint(), 4096);
        assert_eq!(hll.name(), "hllraw12");
    }

    #[test]
    fn test_insert() {
        let mut hll = HyperLogLog::<WyHash>::new(12).unwrap();

        hll.insert("test item 1");
        assert_eq!(hll.cardinality(), 1);

        // Re-insert the same item, estimate should remain the same.
        hll.insert("test item 1");
        assert_eq!(hll.cardinality(), 1);

        let mut other = HyperLogLog::<WyHash>::new(12).unwrap();
        other.insert_hash(1);
        other.insert_hash(2);
        other.insert_hash(1 | (1 << 40));
        assert_eq!(other.cardinality(), 2);
    }

    #[test_case(12, 100 => "{ name: hllraw12, estimate: 100, size: 4096 }")]
    #[test_case(12, 1000 => "{ name: hllraw12, estimate: 1009, size: 4096 }")]
    #[test_case(12, 10_000 => "{ name: hllraw12, estimate: 10352, size: 4096 }")]
    #[test_case(12, 100_000 => "{ name: hllraw12, estimate: 101256, size: 4096 }")]
    #[test_case(14, 100_000 => "{ name: hllraw14, estimate: 100771, size: 16384 }")]
    fn test_estimate_of_hashes(p: u8, n: u64) -> String {
        let mut hll = HyperLogLog::<WyHash>::new(p).unwrap();
        for i in 0..n {
            hll.insert_hash(splitmix64(i));
        }
        format!("{:?}", hll)
    }

    #[test_case(10_000)]
    #[test_case(100_000)]
    fn test_relative_error(n: u64) {
        let mut hll = HyperLogLog::<WyHash>::new(14).unwrap();
        for i in 0..n {
            hll.insert_u64(i);
        }
        let error = (hll.cardinality() as f64 - n as f64).abs() / n as f64;
        assert!(error < 0.05, "relative error {error} for n = {n}");
    }

    #[test]
    fn test_merge_disjoint_ranges() {
        let mut lhs = HyperLogLog::<WyHash>::new(12).unwrap();
        let mut rhs = HyperLogLog::<WyHash>::new(12).unwrap();
        for i in 0..5_000 {
            lhs.insert_u64(i);
            rhs.insert_u64(5_000 + i);
        }

        lhs.merge(&rhs).unwrap();
        let estimate = lhs.cardinality() as f64;
        assert!((estimate - 10_000.0).abs() / 10_000.0 < 0.1, "estimate {estimate}");
    }

    #[test]
    fn test_merge_rejects_different_precision() {
        let mut lhs = HyperLogLog::<WyHash>::new(12).unwrap();
        let rhs = HyperLogLog::<WyHash>::new(13).unwrap();
        lhs.insert_u64(1);
        let before = lhs.clone();

        assert_eq!(
            lhs.merge(&rhs),
            Err(SketchError::IncompatibleMerge {
                lhs: "hllraw12".into(),
                rhs: "hllraw13".into(),
            })
        );
        assert_eq!(lhs, before);
    }

    #[test]
    fn test_registers_never_decrease() {
        let mut hll = HyperLogLog::<WyHash>::new(8).unwrap();
        let mut previous = hll.registers().to_vec();
        for i in 0..5_000 {
            hll.insert_hash(splitmix64(i));
            let current = hll.registers();
            assert!(previous.iter().zip(current).all(|(p, c)| p <= c));
            previous = current.to_vec();
        }
    }

    #[test]
    fn test_large_range_correction() {
        let mut registers = Registers::new(7);
        for idx in 0..128 {
            registers.update(idx, 24);
        }
        // raw estimate alpha * 128 * 2^24 is above 2^32 / 30
        let e = registers.raw_estimate();
        assert!(e > LARGE_RANGE_THRESHOLD);
        let corrected = estimate_with_range_correction(&registers);
        assert!(corrected > e);

        // fully saturated registers do not produce NaN
        for idx in 0..128 {
            registers.update(idx, HyperLogLog::<WyHash>::max_rank(7));
        }
        assert!(estimate_with_range_correction(&registers).is_finite());
    }
}
