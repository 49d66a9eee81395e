//! ## Adaptive thinning counter
//! Exact set of 32-bit hashes with a hard memory bound, trading precision for memory
//! once the bound is reached.
//!
//! While at most `MAX_SIZE` hashes are stored the counter is exact and its slot table
//! doubles whenever more than half full. Above `MAX_SIZE` the table stops growing: the skip
//! degree `s` is incremented and every hash not divisible by `2^s` is evicted, until the
//! survivors fit again. From then on only hashes divisible by `2^s` are accepted, so the set
//! is a uniform `1 / 2^s` sample of the input.
//!
//! Slot of a hash is taken from its high-order bits, since the low `s` bits of every stored
//! hash are zero.
//!
//! Estimate is `count * 2^s` plus a pseudo-random remainder in `[0, 2^s)` derived from the
//! CRC-32 of `count`, corrected for collisions of distinct values in the 32-bit hash space.

use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasherDefault, Hash, Hasher};

use tracing::{debug, trace};
use wyhash::WyHash;

use crate::error::SketchError;
use crate::estimator::CardinalityEstimatorTrait;
use crate::hash::{hash_bytes, hash_item, hash_u64};
use crate::hash_table::HashTable;
use crate::hyperloglog::TWO_TO_THE_32;

/// Initial slot table size, 16 slots
const INITIAL_SIZE_DEGREE: u8 = 4;
/// Largest slot table size, 131072 slots
const MAX_SIZE_DEGREE: u8 = 17;
/// Largest number of stored hashes
const MAX_SIZE: usize = 1 << (MAX_SIZE_DEGREE - 1);
/// Number of low-order hash bits reserved for thinning, remaining bits select the slot
const BITS_FOR_SKIP: u32 = 32 - MAX_SIZE_DEGREE as u32;
/// Largest skip degree, at which only the zero hash is accepted
const MAX_SKIP_DEGREE: u8 = 32;

/// Upper bound of `memory_footprint` of any `ThinningCounter`
pub const MAX_MEMORY_FOOTPRINT: usize = 4 << MAX_SIZE_DEGREE;

/// Hash set thinned by powers of two to stay under `MAX_MEMORY_FOOTPRINT`, named `uniq`.
pub struct ThinningCounter<H: Hasher + Default = WyHash> {
    table: HashTable<BITS_FOR_SKIP>,
    skip_degree: u8,
    build_hasher: BuildHasherDefault<H>,
}

impl<H: Hasher + Default> ThinningCounter<H> {
    /// Create new empty `ThinningCounter`
    pub fn new() -> Self {
        Self::from_parts(HashTable::with_size_degree(INITIAL_SIZE_DEGREE), 0)
    }

    fn from_parts(table: HashTable<BITS_FOR_SKIP>, skip_degree: u8) -> Self {
        Self {
            table,
            skip_degree,
            build_hasher: BuildHasherDefault::default(),
        }
    }

    /// Rebuild counter from its serialized state, validating every invariant.
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn from_slots(
        size_degree: u8,
        skip_degree: u8,
        has_zero: bool,
        slots: &[u32],
    ) -> Result<Self, SketchError> {
        if !(INITIAL_SIZE_DEGREE..=MAX_SIZE_DEGREE).contains(&size_degree) {
            return Err(SketchError::InvalidData("size degree out of range"));
        }
        if slots.len() != 1 << size_degree {
            return Err(SketchError::InvalidData("slot count does not match size degree"));
        }
        if skip_degree > MAX_SKIP_DEGREE {
            return Err(SketchError::InvalidData("skip degree out of range"));
        }
        if slots.iter().any(|&h| !is_good(h, skip_degree)) {
            return Err(SketchError::InvalidData("hash not divisible by skip degree"));
        }
        let table = HashTable::from_slots(has_zero, slots)?;
        Ok(Self::from_parts(table, skip_degree))
    }

    /// Current skip degree `s`, only hashes divisible by `2^s` are kept.
    #[inline]
    pub fn skip_degree(&self) -> u8 {
        self.skip_degree
    }

    #[inline]
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn size_degree(&self) -> u8 {
        self.table.size_degree()
    }

    #[inline]
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn has_zero(&self) -> bool {
        self.table.has_zero()
    }

    #[inline]
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn slots(&self) -> &[u32] {
        self.table.slots()
    }

    /// Insert a hashable item
    #[inline]
    pub fn insert<T: Hash + ?Sized>(&mut self, item: &T) {
        self.insert_hash(hash_item(&self.build_hasher, item));
    }

    /// Merge `rhs` into `self`. The result is thinned at least as much as the more thinned
    /// of the two counters.
    pub fn merge(&mut self, rhs: &Self) {
        if self.skip_degree < rhs.skip_degree {
            self.skip_degree = rhs.skip_degree;
            self.thin();
        }

        if rhs.table.has_zero() && self.table.insert(0) {
            self.shrink_if_needed();
        }

        for h in rhs.table.items() {
            self.insert_encoded_hash(h);
        }
    }

    #[inline]
    fn insert_encoded_hash(&mut self, h: u32) {
        if is_good(h, self.skip_degree) && self.table.insert(h) {
            self.shrink_if_needed();
        }
    }

    /// Grow the slot table when more than half full, or thin it out once it holds more than
    /// `MAX_SIZE` hashes.
    fn shrink_if_needed(&mut self) {
        if !self.table.is_over_half_full() {
            return;
        }
        if self.table.len() <= MAX_SIZE {
            self.table.grow();
            trace!(size_degree = self.table.size_degree(), "grew thinning counter");
            return;
        }
        while self.table.len() > MAX_SIZE {
            self.skip_degree += 1;
            self.thin();
        }
        debug!(
            skip_degree = self.skip_degree,
            count = self.table.len(),
            "raised thinning counter skip degree"
        );
    }

    /// Evict every hash not divisible by `2^skip_degree`
    fn thin(&mut self) {
        let skip_degree = self.skip_degree;
        self.table.retain(|h| is_good(h, skip_degree));
    }
}

/// Return whether `h` is divisible by `2^skip_degree`
#[inline]
fn is_good(h: u32, skip_degree: u8) -> bool {
    h.trailing_zeros() >= u32::from(skip_degree)
}

impl<H: Hasher + Default> CardinalityEstimatorTrait for ThinningCounter<H> {
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
        let count = self.table.len() as u64;
        if self.skip_degree == 0 {
            return count;
        }

        let low_bits = (1u64 << self.skip_degree) - 1;
        let remainder = u64::from(crc32fast::hash(&count.to_le_bytes())) & low_bits;
        let res = (count << self.skip_degree) + remainder;

        // correction is undefined once every 32-bit hash value is taken
        if res >= 1 << 32 {
            return res;
        }
        let n = TWO_TO_THE_32 * (TWO_TO_THE_32.ln() - (TWO_TO_THE_32 - res as f64).ln());
        n.round() as u64
    }

    fn memory_footprint(&self) -> usize {
        self.table.size_of()
    }

    fn name(&self) -> String {
        "uniq".to_string()
    }
}

impl<H: Hasher + Default> Default for ThinningCounter<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hasher + Default> Clone for ThinningCounter<H> {
    fn clone(&self) -> Self {
        Self::from_parts(self.table.clone(), self.skip_degree)
    }
}

impl<H: Hasher + Default> PartialEq for ThinningCounter<H> {
    fn eq(&self, rhs: &Self) -> bool {
        self.skip_degree == rhs.skip_degree && self.table == rhs.table
    }
}

impl<H: Hasher + Default> Debug for ThinningCounter<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}
