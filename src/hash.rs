//! Hashing of raw input into the 64-bit hashes consumed by every sketch.
//!
//! Sketches are generic over `H: Hasher + Default` (`WyHash` by default) and never look at
//! input values directly. 32-bit sketches use the low 32 bits of the 64-bit hash.

use std::hash::{BuildHasher, BuildHasherDefault, Hash, Hasher};

/// Hash raw bytes without any length prefix
#[inline]
pub(crate) fn hash_bytes<H: Hasher + Default>(
    build_hasher: &BuildHasherDefault<H>,
    bytes: &[u8],
) -> u64 {
    let mut hasher = build_hasher.build_hasher();
    hasher.write(bytes);
    hasher.finish()
}

/// Hash an integer value
#[inline]
pub(crate) fn hash_u64<H: Hasher + Default>(
    build_hasher: &BuildHasherDefault<H>,
    value: u64,
) -> u64 {
    let mut hasher = build_hasher.build_hasher();
    hasher.write_u64(value);
    hasher.finish()
}

/// Hash any hashable item
#[inline]
pub(crate) fn hash_item<H: Hasher + Default, T: Hash + ?Sized>(
    build_hasher: &BuildHasherDefault<H>,
    item: &T,
) -> u64 {
    let mut hasher = build_hasher.build_hasher();
    item.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wyhash::WyHash;

    #[test]
    fn test_hashing_is_deterministic() {
        let bh = BuildHasherDefault::<WyHash>::default();
        assert_eq!(hash_bytes(&bh, b"item"), hash_bytes(&bh, b"item"));
        assert_ne!(hash_bytes(&bh, b"item1"), hash_bytes(&bh, b"item2"));
        assert_eq!(hash_u64(&bh, 42), hash_u64(&bh, 42));
        assert_ne!(hash_u64(&bh, 42), hash_u64(&bh, 43));
    }
}
