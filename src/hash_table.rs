//! ## Open-addressed hash set of 32-bit hashes
//! Used by the exact phase of `HybridEstimator` and by `ThinningCounter`.
//!
//! - Backing array length is always a power of two (`2^size_degree`).
//! - Slot value `0` marks an empty slot, so the hash `0` itself is tracked by the
//!   separate `has_zero` flag.
//! - Collisions are resolved by linear probing with wraparound.
//! - Slot of a hash is `(hash >> SHIFT) & mask`: `SHIFT = 0` selects the lowest bits,
//!   larger shifts select higher bits for sets whose low bits become constant.
//!
//! The table never grows by itself: owners check `is_over_half_full` after insertion
//! and decide between `grow` and `retain`.

use std::mem::size_of;

use crate::error::SketchError;

#[derive(Clone, Debug)]
pub(crate) struct HashTable<const SHIFT: u32> {
    /// Number of distinct hashes stored, including zero
    count: usize,
    size_degree: u8,
    has_zero: bool,
    buf: Vec<u32>,
}

impl<const SHIFT: u32> HashTable<SHIFT> {
    /// Create empty table with `2^size_degree` slots
    pub(crate) fn with_size_degree(size_degree: u8) -> Self {
        Self {
            count: 0,
            size_degree,
            has_zero: false,
            buf: vec![0; 1 << size_degree],
        }
    }

    /// Rebuild table from its slots, validating that they form a well-formed set.
    pub(crate) fn from_slots(has_zero: bool, slots: &[u32]) -> Result<Self, SketchError> {
        if !slots.len().is_power_of_two() || slots.len() < 2 {
            return Err(SketchError::InvalidData("slot count is not a power of two"));
        }
        let mut table = Self::with_size_degree(slots.len().trailing_zeros() as u8);
        if has_zero {
            table.insert(0);
        }
        for &h in slots.iter().filter(|&&h| h != 0) {
            if !table.insert(h) {
                return Err(SketchError::InvalidData("duplicate hash in slots"));
            }
        }
        if table.is_over_half_full() {
            return Err(SketchError::InvalidData("slots are more than half full"));
        }
        Ok(table)
    }

    /// Number of distinct hashes stored, including zero
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub(crate) fn has_zero(&self) -> bool {
        self.has_zero
    }

    #[inline]
    pub(crate) fn size_degree(&self) -> u8 {
        self.size_degree
    }

    /// Backing slots, `0` being empty
    #[inline]
    pub(crate) fn slots(&self) -> &[u32] {
        &self.buf
    }

    /// Return stored non-zero hashes
    #[inline]
    pub(crate) fn items(&self) -> impl Iterator<Item = u32> + '_ {
        self.buf.iter().copied().filter(|&h| h != 0)
    }

    /// Return memory size of backing slots
    #[inline]
    pub(crate) fn size_of(&self) -> usize {
        self.buf.len() * size_of::<u32>()
    }

    #[inline]
    pub(crate) fn is_over_half_full(&self) -> bool {
        self.count > self.buf.len() >> 1
    }

    /// Return whether hash is stored in the set
    #[inline]
    pub(crate) fn contains(&self, h: u32) -> bool {
        if h == 0 {
            return self.has_zero;
        }
        let mask = self.mask();
        let mut idx = self.place(h);
        while self.buf[idx] != 0 {
            if self.buf[idx] == h {
                return true;
            }
            idx = (idx + 1) & mask;
        }
        false
    }

    /// Insert hash into the set.
    /// Returns true if the hash was not present before, false otherwise.
    #[inline]
    pub(crate) fn insert(&mut self, h: u32) -> bool {
        if h == 0 {
            if self.has_zero {
                return false;
            }
            self.has_zero = true;
            self.count += 1;
            return true;
        }

        let mask = self.mask();
        let mut idx = self.place(h);
        while self.buf[idx] != 0 && self.buf[idx] != h {
            idx = (idx + 1) & mask;
        }
        if self.buf[idx] == h {
            return false;
        }
        self.buf[idx] = h;
        self.count += 1;
        true
    }

    /// Double the number of slots and re-insert every stored hash.
    pub(crate) fn grow(&mut self) {
        let old_buf = std::mem::replace(&mut self.buf, vec![0; 2 << self.size_degree]);
        self.size_degree += 1;
        for h in old_buf.into_iter().filter(|&h| h != 0) {
            let idx = self.free_slot(h);
            self.buf[idx] = h;
        }
    }

    /// Remove every hash not satisfying `keep`, then move survivors back towards their
    /// canonical slots without reallocating the slots.
    pub(crate) fn retain(&mut self, keep: impl Fn(u32) -> bool) {
        // chains never wrap across a slot that was empty before eviction,
        // so compaction walks the table starting right after such a slot
        let Some(start) = self.buf.iter().position(|&h| h == 0) else {
            return self.retain_by_rebuild(keep);
        };

        if self.has_zero && !keep(0) {
            self.has_zero = false;
            self.count -= 1;
        }
        for slot in self.buf.iter_mut() {
            if *slot != 0 && !keep(*slot) {
                *slot = 0;
                self.count -= 1;
            }
        }

        let mask = self.mask();
        for offset in 1..=self.buf.len() {
            let i = (start + offset) & mask;
            let h = self.buf[i];
            if h == 0 || self.place(h) == i {
                continue;
            }
            self.buf[i] = 0;
            let idx = self.free_slot(h);
            self.buf[idx] = h;
        }
    }

    /// Fallback of `retain` for a table without empty slots.
    fn retain_by_rebuild(&mut self, keep: impl Fn(u32) -> bool) {
        let old_buf = std::mem::replace(&mut self.buf, vec![0; 1 << self.size_degree]);
        self.count = usize::from(self.has_zero && keep(0));
        self.has_zero = self.count == 1;
        for h in old_buf.into_iter().filter(|&h| h != 0 && keep(h)) {
            let idx = self.free_slot(h);
            self.buf[idx] = h;
            self.count += 1;
        }
    }

    #[inline]
    fn mask(&self) -> usize {
        self.buf.len() - 1
    }

    /// Canonical slot of hash
    #[inline]
    fn place(&self, h: u32) -> usize {
        (h >> SHIFT) as usize & self.mask()
    }

    /// First empty slot on the probe sequence of `h`
    #[inline]
    fn free_slot(&self, h: u32) -> usize {
        let mask = self.mask();
        let mut idx = self.place(h);
        while self.buf[idx] != 0 {
            idx = (idx + 1) & mask;
        }
        idx
    }
}

impl<const SHIFT: u32> PartialEq for HashTable<SHIFT> {
    /// Compare stored sets and table sizes, ignoring slot layout which depends on insertion order
    fn eq(&self, rhs: &Self) -> bool {
        self.count == rhs.count
            && self.has_zero == rhs.has_zero
            && self.size_degree == rhs.size_degree
            && self.items().all(|h| rhs.contains(h))
    }
}

impl<const SHIFT: u32> Eq for HashTable<SHIFT> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::splitmix64;

    #[test]
    fn test_insert_deduplicates() {
        let mut table = HashTable::<0>::with_size_degree(4);
        assert!(table.insert(5));
        assert!(!table.insert(5));
        assert!(table.insert(0));
        assert!(!table.insert(0));
        assert!(table.has_zero());
        assert_eq!(table.len(), 2);
        assert_eq!(table.items().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_colliding_hashes_probe_linearly() {
        let mut table = HashTable::<0>::with_size_degree(4);
        // all map to slot 15 and wrap around
        for h in [15, 31, 47] {
            assert!(table.insert(h));
        }
        assert_eq!(&table.slots()[..2], &[31, 47]);
        assert_eq!(table.slots()[15], 15);
        assert!(table.contains(47));
    }

    #[test]
    fn test_grow_keeps_items() {
        let mut table = HashTable::<0>::with_size_degree(4);
        for i in 0..9 {
            table.insert(splitmix64(i) as u32);
        }
        assert!(table.is_over_half_full());
        table.grow();
        assert_eq!(table.size_degree(), 5);
        assert_eq!(table.size_of(), 128);
        assert!(!table.is_over_half_full());
        for i in 0..9 {
            assert!(table.contains(splitmix64(i) as u32));
        }
    }

    #[test]
    fn test_retain_compacts_wrapped_chains() {
        let mut table = HashTable::<4>::with_size_degree(4);
        // slots of (h >> 4) & 15: 0xf0 -> 15, 0xf1 -> 15 (wraps to 0), 0x01 -> 0 (moves to 1)
        for h in [0xf0, 0xf1, 0x01, 0x22] {
            table.insert(h);
        }
        assert_eq!(table.slots()[0], 0xf1);
        assert_eq!(table.slots()[1], 0x01);

        table.retain(|h| h & 1 == 0);
        assert_eq!(table.len(), 2);
        for h in [0xf0, 0x22] {
            assert!(table.contains(h));
        }
        for h in [0xf1, 0x01] {
            assert!(!table.contains(h));
        }

        table.retain(|h| h != 0xf0);
        assert_eq!(table.len(), 1);
        assert!(table.contains(0x22));
        assert_eq!(table.slots()[2], 0x22);
    }

    #[test]
    fn test_retain_many() {
        let mut table = HashTable::<3>::with_size_degree(8);
        let hashes: Vec<u32> = (0..128).map(|i| splitmix64(i) as u32).collect();
        for &h in &hashes {
            table.insert(h);
        }
        table.retain(|h| h % 4 == 0);

        let kept: Vec<u32> = hashes.iter().copied().filter(|h| h % 4 == 0).collect();
        assert_eq!(table.len(), kept.len());
        for h in kept {
            assert!(table.contains(h));
        }
    }

    #[test]
    fn test_from_slots() {
        let mut table = HashTable::<0>::with_size_degree(4);
        for h in [0, 3, 19, 7] {
            table.insert(h);
        }
        let rebuilt = HashTable::<0>::from_slots(true, table.slots()).unwrap();
        assert_eq!(rebuilt, table);

        assert!(HashTable::<0>::from_slots(false, &[1, 2, 3]).is_err());
        assert!(HashTable::<0>::from_slots(false, &[1, 0, 1, 0]).is_err());
        assert!(HashTable::<0>::from_slots(false, &[1, 2, 3, 0]).is_err());
    }
}
