//! ## Register store
//! Physical substrate shared by every HyperLogLog-family sketch: `M = 2^P` registers,
//! each holding the maximum rank observed for its bucket.
//!
//! Every register takes a whole byte although ranks only need 5 or 6 bits. Next to the
//! registers the store keeps the number of zero registers and the harmonic sum
//! `sum(2^-register[i])`, both updated as registers grow, so estimating never has to walk
//! the registers. The harmonic sum is kept as an exact fixed-point integer scaled by
//! `2^64`, which makes it independent of the order in which registers were raised.

use std::mem::size_of;

use crate::error::SketchError;

/// Smallest supported precision
pub(crate) const MIN_PRECISION: u8 = 7;
/// Exclusive upper bound of supported precisions
pub(crate) const MAX_PRECISION: u8 = 31;
/// Fixed-point scale of the harmonic sum, also the largest storable rank.
const SUM_SCALE: u32 = 64;

#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Registers {
    precision: u8,
    /// Number of registers set to 0
    zeros: usize,
    /// Harmonic sum of registers multiplied by `2^SUM_SCALE`
    sum: u128,
    data: Vec<u8>,
}

impl Registers {
    /// Check that `precision` is within `[MIN_PRECISION, MAX_PRECISION)`.
    #[inline]
    pub(crate) fn validate_precision(precision: u8) -> Result<(), SketchError> {
        if (MIN_PRECISION..MAX_PRECISION).contains(&precision) {
            Ok(())
        } else {
            Err(SketchError::InvalidConfiguration { precision })
        }
    }

    /// Create empty register store. `precision` must have been validated by the caller.
    pub(crate) fn new(precision: u8) -> Self {
        let m = 1usize << precision;
        Self {
            precision,
            zeros: m,
            sum: (m as u128) << SUM_SCALE,
            data: vec![0; m],
        }
    }

    /// Rebuild register store from raw register bytes, recomputing zeros and harmonic sum.
    pub(crate) fn from_bytes(
        precision: u8,
        data: Vec<u8>,
        max_rank: u8,
    ) -> Result<Self, SketchError> {
        Self::validate_precision(precision)
            .map_err(|_| SketchError::InvalidData("register precision out of range"))?;
        if data.len() != 1 << precision {
            return Err(SketchError::InvalidData("register count does not match precision"));
        }
        if data.iter().any(|&rank| rank > max_rank) {
            return Err(SketchError::InvalidData("register rank out of range"));
        }

        let zeros = data.iter().filter(|&&rank| rank == 0).count();
        let sum = data.iter().map(|&rank| Self::term(rank)).sum();
        Ok(Self {
            precision,
            zeros,
            sum,
            data,
        })
    }

    /// Precision `P`
    #[inline]
    pub(crate) fn precision(&self) -> u8 {
        self.precision
    }

    /// Number of registers `M`
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Number of registers still set to 0
    #[inline]
    pub(crate) fn zeros(&self) -> usize {
        self.zeros
    }

    /// Raw register bytes
    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raise `idx` register to `new_rank` unless it already holds a larger rank.
    #[inline]
    pub(crate) fn update(&mut self, idx: usize, new_rank: u8) {
        let old_rank = self.data[idx];
        if new_rank > old_rank {
            self.set(idx, old_rank, new_rank);
        }
    }

    /// Merge `rhs` registers into `self` by taking register-wise maximum.
    /// Both stores must share the same precision.
    pub(crate) fn merge(&mut self, rhs: &Registers) {
        debug_assert_eq!(self.precision, rhs.precision);
        for (idx, &rhs_rank) in rhs.data.iter().enumerate() {
            let lhs_rank = self.data[idx];
            if rhs_rank > lhs_rank {
                self.set(idx, lhs_rank, rhs_rank);
            }
        }
    }

    /// Harmonic mean estimate `alpha(M) * M^2 / sum(2^-register[i])`
    pub(crate) fn raw_estimate(&self) -> f64 {
        let m = self.len() as f64;
        let sum = self.sum as f64 / (1u128 << SUM_SCALE) as f64;
        alpha(m) * m * m / sum
    }

    /// Linear counting estimate `M * ln(M / zeros)`, if any register is still zero.
    pub(crate) fn linear_counting(&self) -> Option<f64> {
        if self.zeros == 0 {
            return None;
        }
        let m = self.len() as f64;
        Some(m * (m / self.zeros as f64).ln())
    }

    /// Return memory size of register bytes
    #[inline]
    pub(crate) fn size_of(&self) -> usize {
        self.data.len() * size_of::<u8>()
    }

    #[inline]
    fn set(&mut self, idx: usize, old_rank: u8, new_rank: u8) {
        debug_assert!(u32::from(new_rank) <= SUM_SCALE);
        self.data[idx] = new_rank;
        self.zeros -= usize::from(old_rank == 0);
        self.sum = self.sum - Self::term(old_rank) + Self::term(new_rank);
    }

    /// `2^-rank` scaled by `2^SUM_SCALE`
    #[inline]
    fn term(rank: u8) -> u128 {
        1u128 << (SUM_SCALE - u32::from(rank))
    }
}

/// Parameter for bias correction
#[inline]
fn alpha(m: f64) -> f64 {
    0.7213 / (1.0 + 1.079 / m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(6 => false)]
    #[test_case(7 => true)]
    #[test_case(16 => true)]
    #[test_case(30 => true)]
    #[test_case(31 => false)]
    fn test_validate_precision(p: u8) -> bool {
        Registers::validate_precision(p).is_ok()
    }

    #[test]
    fn test_update_tracks_zeros_and_sum() {
        let mut r = Registers::new(7);
        assert_eq!(r.zeros(), 128);
        assert_eq!(r.linear_counting(), Some(0.0));

        r.update(3, 2);
        r.update(3, 1);
        assert_eq!(r.as_bytes()[3], 2);
        assert_eq!(r.zeros(), 127);

        r.update(3, 5);
        assert_eq!(r.as_bytes()[3], 5);
        assert_eq!(r.zeros(), 127);

        let rebuilt = Registers::from_bytes(7, r.as_bytes().to_vec(), 26).unwrap();
        assert!(rebuilt == r);
    }

    #[test]
    fn test_merge_is_register_wise_max() {
        let mut lhs = Registers::new(7);
        let mut rhs = Registers::new(7);
        lhs.update(0, 3);
        lhs.update(1, 1);
        rhs.update(0, 2);
        rhs.update(1, 4);
        rhs.update(2, 1);

        lhs.merge(&rhs);
        assert_eq!(&lhs.as_bytes()[..4], &[3, 4, 1, 0]);
        assert_eq!(lhs.zeros(), 125);
    }

    #[test]
    fn test_raw_estimate_of_empty_store() {
        let r = Registers::new(10);
        let m = 1024.0;
        assert!((r.raw_estimate() - alpha(m) * m).abs() < 1e-9);
    }

    #[test_case(8, vec![0; 128], 26; "wrong length")]
    #[test_case(7, vec![27; 128], 26; "rank too large")]
    #[test_case(31, vec![], 26; "precision out of range")]
    fn test_from_bytes_rejects(precision: u8, data: Vec<u8>, max_rank: u8) {
        assert!(Registers::from_bytes(precision, data, max_rank).is_err());
    }
}
