//! ## Hybrid exact/HyperLogLog estimator
//! Counts exactly while cardinality is small and switches to HyperLogLog once it is not.
//!
//! Two representations are used:
//! - `Exact`: open-addressed set of 32-bit hashes, doubling whenever more than half full.
//!   Holds at most `TO_HLL_THRESHOLD` (8192) distinct hashes, i.e. up to 64 KiB of slots.
//! - `Approximate`: HyperLogLog with precision 16 (65536 one-byte registers). Bucket index
//!   is taken from the top 16 bits of the hash, the rank from the leading zeros of the
//!   remaining 16 bits.
//!
//! Inserting a new distinct hash into a full `Exact` set promotes it to `Approximate` by
//! replaying every stored hash into the registers. Promotion is irreversible and merging
//! never brings an `Approximate` estimator back to `Exact`.

use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasherDefault, Hash, Hasher};

use tracing::{debug, trace};
use wyhash::WyHash;

use crate::error::SketchError;
use crate::estimator::CardinalityEstimatorTrait;
use crate::hash::{hash_bytes, hash_item, hash_u64};
use crate::hash_table::HashTable;
use crate::hyperloglog::estimate_with_range_correction;
use crate::registers::Registers;

/// Number of distinct hashes the exact set holds before promotion
pub(crate) const TO_HLL_THRESHOLD: usize = 1 << 13;
/// Precision of the approximate representation
pub(crate) const HLL_PRECISION: u8 = 16;
/// Largest rank stored in the approximate representation
pub(crate) const HLL_MAX_RANK: u8 = 17;
/// Initial exact set size, 16 slots
const INITIAL_SIZE_DEGREE: u8 = 4;

/// Representation types supported by `HybridEstimator`
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum Representation {
    Exact(HashTable<0>),
    Approximate(Registers),
}

impl Debug for Representation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Representation::Exact(_) => f.write_str("Exact"),
            Representation::Approximate(_) => f.write_str("Approximate"),
        }
    }
}

/// Exact hash set promoted to a precision 16 HyperLogLog past 8192 hashes, named `combined`.
pub struct HybridEstimator<H: Hasher + Default = WyHash> {
    representation: Representation,
    build_hasher: BuildHasherDefault<H>,
}

impl<H: Hasher + Default> HybridEstimator<H> {
    /// Create new empty `HybridEstimator` in exact representation
    pub fn new() -> Self {
        Self::from_representation(Representation::Exact(HashTable::with_size_degree(
            INITIAL_SIZE_DEGREE,
        )))
    }

    fn from_representation(representation: Representation) -> Self {
        Self {
            representation,
            build_hasher: BuildHasherDefault::default(),
        }
    }

    /// Rebuild exact estimator from its slots
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn from_slots(has_zero: bool, slots: &[u32]) -> Result<Self, SketchError> {
        if !(1usize << INITIAL_SIZE_DEGREE..=2 * TO_HLL_THRESHOLD).contains(&slots.len()) {
            return Err(SketchError::InvalidData("slot count out of range"));
        }
        let table = HashTable::from_slots(has_zero, slots)?;
        if table.len() > TO_HLL_THRESHOLD {
            return Err(SketchError::InvalidData("exact set exceeds promotion threshold"));
        }
        Ok(Self::from_representation(Representation::Exact(table)))
    }

    /// Rebuild approximate estimator from register bytes
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn from_bytes(data: Vec<u8>) -> Result<Self, SketchError> {
        let registers = Registers::from_bytes(HLL_PRECISION, data, HLL_MAX_RANK)?;
        Ok(Self::from_representation(Representation::Approximate(registers)))
    }

    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn representation(&self) -> &Representation {
        &self.representation
    }

    /// Return whether values are still counted exactly
    #[inline]
    pub fn is_exact(&self) -> bool {
        matches!(self.representation, Representation::Exact(_))
    }

    /// Insert a hashable item
    #[inline]
    pub fn insert<T: Hash + ?Sized>(&mut self, item: &T) {
        self.insert_hash(hash_item(&self.build_hasher, item));
    }

    /// Merge `rhs` into `self`.
    ///
    /// The result takes the most advanced representation of the two: an exact `self` is
    /// promoted first when `rhs` is approximate, an exact `rhs` is drained into `self`
    /// hash by hash (which may promote `self` on the way).
    pub fn merge(&mut self, rhs: &Self) {
        match &rhs.representation {
            Representation::Exact(table) => {
                for h in table.items() {
                    self.insert_encoded_hash(h);
                }
                if table.has_zero() {
                    self.insert_encoded_hash(0);
                }
            }
            Representation::Approximate(rhs_registers) => {
                self.promote();
                if let Representation::Approximate(registers) = &mut self.representation {
                    registers.merge(rhs_registers);
                }
            }
        }
    }

    /// Insert 32-bit hash, promoting the exact set when it is full
    #[inline]
    fn insert_encoded_hash(&mut self, h: u32) {
        if let Representation::Exact(table) = &mut self.representation {
            if table.len() < TO_HLL_THRESHOLD || table.contains(h) {
                if table.insert(h) && table.is_over_half_full() {
                    table.grow();
                    trace!(size_degree = table.size_degree(), "grew exact set");
                }
                return;
            }
            self.promote();
        }

        if let Representation::Approximate(registers) = &mut self.representation {
            let (idx, rank) = index_and_rank(h);
            registers.update(idx, rank);
        }
    }

    /// Convert exact representation into approximate one, no-op if already approximate
    fn promote(&mut self) {
        let Representation::Exact(table) = &self.representation else {
            return;
        };

        let mut registers = Registers::new(HLL_PRECISION);
        for h in table.items() {
            let (idx, rank) = index_and_rank(h);
            registers.update(idx, rank);
        }
        if table.has_zero() {
            let (idx, rank) = index_and_rank(0);
            registers.update(idx, rank);
        }
        debug!(count = table.len(), "promoting exact set to HyperLogLog");

        self.representation = Representation::Approximate(registers);
    }
}

/// Return bucket index (top 16 bits) and rank (leading zeros of the low 16 bits plus one)
#[inline]
fn index_and_rank(h: u32) -> (usize, u8) {
    let idx = h >> HLL_PRECISION;
    let rank = ((h << HLL_PRECISION) | 0x8000).leading_zeros() as u8 + 1;
    (idx as usize, rank)
}

impl<H: Hasher + Default> CardinalityEstimatorTrait for HybridEstimator<H> {
    #[inline]
    fn insert_hash(&mut self, hash: u64) {
        self.insert_encoded_hash(hash as u32);
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
        match &self.representation {
            Representation::Exact(table) => table.len() as u64,
            Representation::Approximate(registers) => {
                estimate_with_range_correction(registers).round() as u64
            }
        }
    }

    fn memory_footprint(&self) -> usize {
        match &self.representation {
            Representation::Exact(table) => table.size_of(),
            Representation::Approximate(registers) => registers.size_of(),
        }
    }

    fn name(&self) -> String {
        "combined".to_string()
    }
}

impl<H: Hasher + Default> Default for HybridEstimator<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hasher + Default> Clone for HybridEstimator<H> {
    fn clone(&self) -> Self {
        Self::from_representation(self.representation.clone())
    }
}

impl<H: Hasher + Default> PartialEq for HybridEstimator<H> {
    fn eq(&self, rhs: &Self) -> bool {
        self.representation == rhs.representation
    }
}

impl<H: Hasher + Default> Debug for HybridEstimator<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ representation: {:?}, estimate: {}, size: {} }}",
            self.representation,
            self.cardinality(),
            self.memory_footprint()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::splitmix64;
    use test_case::test_case;

    fn estimator_of(hashes: impl IntoIterator<Item = u64>) -> HybridEstimator {
        let mut e = HybridEstimator::new();
        for h in hashes {
            e.insert_hash(h);
        }
        e
    }

    #[test_case(0 => "{ representation: Exact, estimate: 0, size: 64 }")]
    #[test_case(1 => "{ representation: Exact, estimate: 1, size: 64 }")]
    #[test_case(8 => "{ representation: Exact, estimate: 8, size: 64 }")]
    #[test_case(9 => "{ representation: Exact, estimate: 9, size: 128 }")]
    #[test_case(100 => "{ representation: Exact, estimate: 100, size: 1024 }")]
    #[test_case(4096 => "{ representation: Exact, estimate: 4096, size: 32768 }")]
    #[test_case(4097 => "{ representation: Exact, estimate: 4097, size: 65536 }")]
    #[test_case(8192 => "{ representation: Exact, estimate: 8192, size: 65536 }")]
    #[test_case(8193 => "{ representation: Approximate, estimate: 8173, size: 65536 }")]
    #[test_case(100_000 => "{ representation: Approximate, estimate: 100339, size: 65536 }")]
    fn test_estimator(n: u64) -> String {
        format!("{:?}", estimator_of((0..n).map(splitmix64)))
    }

    #[test]
    fn test_promotion_threshold() {
        let mut e = estimator_of(0..8192);
        assert!(e.is_exact());
        assert_eq!(e.cardinality(), 8192);

        // duplicates keep a full exact set exact
        e.insert_hash(0);
        e.insert_hash(8191);
        assert!(e.is_exact());

        e.insert_hash(8192);
        assert!(!e.is_exact());

        for h in 0..100 {
            e.insert_hash(h);
        }
        assert!(!e.is_exact());
        assert_eq!(e.memory_footprint(), 65536);
    }

    #[test_case(0x0000_0000 => (0, 17); "zero hash")]
    #[test_case(0xffff_0000 => (0xffff, 17); "only index bits")]
    #[test_case(0x0001_8000 => (1, 1); "top rank bit")]
    #[test_case(0x0000_0001 => (0, 16); "lowest rank bit")]
    fn test_index_and_rank(h: u32) -> (usize, u8) {
        index_and_rank(h)
    }

    #[test]
    fn test_zero_hash_counted_once() {
        let mut e = HybridEstimator::<WyHash>::new();
        e.insert_hash(0);
        e.insert_hash(0);
        e.insert_hash(1 << 32);
        assert_eq!(e.cardinality(), 1);
    }

    #[test_case(10, 20 => "{ representation: Exact, estimate: 25, size: 256 }"; "both small")]
    #[test_case(5000, 5000 => "{ representation: Exact, estimate: 5005, size: 65536 }"; "union stays exact")]
    #[test_case(8192, 8192 => "{ representation: Approximate, estimate: 8178, size: 65536 }"; "union promotes")]
    #[test_case(20_000, 10 => "{ representation: Approximate, estimate: 20013, size: 65536 }"; "lhs approximate")]
    #[test_case(10, 20_000 => "{ representation: Approximate, estimate: 20020, size: 65536 }"; "rhs approximate")]
    #[test_case(20_000, 30_000 => "{ representation: Approximate, estimate: 29983, size: 65536 }"; "both approximate")]
    fn test_merge(lhs_n: u64, rhs_n: u64) -> String {
        // ranges overlap on [5, min(lhs_n, rhs_n + 5))
        let mut lhs = estimator_of((0..lhs_n).map(splitmix64));
        let rhs = estimator_of((5..rhs_n + 5).map(splitmix64));
        lhs.merge(&rhs);
        format!("{:?}", lhs)
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = estimator_of((0..3000).map(splitmix64));
        let b = estimator_of((3000..6000).map(splitmix64));
        let c = estimator_of((6000..9000).map(splitmix64));

        let mut ab_c = a.clone();
        ab_c.merge(&b);
        ab_c.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut a_bc = a.clone();
        a_bc.merge(&bc);

        let mut c_ba = c.clone();
        c_ba.merge(&b);
        c_ba.merge(&a);

        assert!(!ab_c.is_exact());
        assert_eq!(ab_c, a_bc);
        assert_eq!(ab_c, c_ba);
    }

    #[test]
    fn test_merge_with_itself() {
        for n in [100, 8192, 20_000] {
            let mut e = estimator_of((0..n).map(splitmix64));
            let copy = e.clone();
            e.merge(&copy);
            assert_eq!(e, copy);
            assert_eq!(e.cardinality(), copy.cardinality());
            assert_eq!(e.memory_footprint(), copy.memory_footprint());
        }
    }
}
