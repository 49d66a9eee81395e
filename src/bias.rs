//! ## Bias correction table
//! Empirical bias of the raw HyperLogLog estimate for precisions in `[7..18]`, as described in
//! [HyperLogLog in Practice](https://static.googleusercontent.com/media/research.google.com/en//pubs/archive/40671.pdf).
//!
//! For each precision the table holds ~200 `(raw estimate, bias)` samples from the paper's
//! appendix, covering raw estimates in `[0.7 * M, 5 * M]`, plus the cardinality below which
//! linear counting beats the bias-corrected estimate. The curves are plain `const` data,
//! shared read-only by all sketches.

use crate::bias_data::{BIAS_DATA, RAW_ESTIMATE_DATA};

/// Smallest precision with a bias curve
const MIN_TABLE_PRECISION: u8 = 7;
/// Largest precision with a bias curve
pub(crate) const MAX_TABLE_PRECISION: u8 = 18;
/// Number of nearest samples averaged by `estimate_bias`
const NEIGHBORS: usize = 6;

/// Cardinality thresholds for switching from linear counting to the bias-corrected
/// estimate, indexed by `p - 7`.
const THRESHOLD_DATA: [f64; 12] = [
    80.0,     // precision 7
    220.0,    // precision 8
    400.0,    // precision 9
    900.0,    // precision 10
    1800.0,   // precision 11
    3100.0,   // precision 12
    6500.0,   // precision 13
    11500.0,  // precision 14
    20000.0,  // precision 15
    50000.0,  // precision 16
    120000.0, // precision 17
    350000.0, // precision 18
];

/// Small-range threshold for precision `p`, `None` above `MAX_TABLE_PRECISION`.
#[inline]
pub(crate) fn threshold(p: u8) -> Option<f64> {
    table_index(p).map(|idx| THRESHOLD_DATA[idx])
}

/// Bias of raw `estimate` at precision `p`: mean bias of the `NEIGHBORS` samples whose raw
/// estimates are closest to `estimate`. Precisions without a curve have no bias.
pub(crate) fn estimate_bias(estimate: f64, p: u8) -> f64 {
    let Some(idx) = table_index(p) else {
        return 0.0;
    };
    let estimates = RAW_ESTIMATE_DATA[idx];
    let biases = BIAS_DATA[idx];

    // grow window [lo, hi) around the insertion point towards the closer sample
    let mut hi = estimates.partition_point(|&e| e < estimate);
    let mut lo = hi;
    while hi - lo < NEIGHBORS.min(estimates.len()) {
        let take_left = match (lo.checked_sub(1), estimates.get(hi)) {
            (Some(left), Some(&right)) => estimate - estimates[left] <= right - estimate,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if take_left {
            lo -= 1;
        } else {
            hi += 1;
        }
    }

    biases[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
}

#[inline]
fn table_index(p: u8) -> Option<usize> {
    (MIN_TABLE_PRECISION..=MAX_TABLE_PRECISION)
        .contains(&p)
        .then(|| usize::from(p - MIN_TABLE_PRECISION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_table_shape() {
        for p in MIN_TABLE_PRECISION..=MAX_TABLE_PRECISION {
            let idx = table_index(p).unwrap();
            let estimates = RAW_ESTIMATE_DATA[idx];
            assert_eq!(estimates.len(), BIAS_DATA[idx].len());
            assert!(estimates.len() >= NEIGHBORS);
            assert!(
                estimates.windows(2).all(|w| w[0] <= w[1]),
                "raw estimates of p = {p} must be sorted"
            );
        }
    }

    #[test_case(7 => (92.0, 91.0, 638.6102))]
    #[test_case(8 => (184.2152, 183.2152, 1274.5192))]
    #[test_case(9 => (369.0, 368.0, 2553.768))]
    #[test_case(10 => (738.1256, 737.1256, 5084.1828))]
    #[test_case(11 => (1477.0, 1476.0, 10229.9176))]
    #[test_case(12 => (2954.0, 2953.0, 20463.22))]
    #[test_case(13 => (5908.5052, 5907.5052, 40717.2424))]
    #[test_case(14 => (11817.475, 11816.475, 81876.3884))]
    #[test_case(15 => (23635.0036, 23634.0036, 163729.2842))]
    #[test_case(16 => (47271.0, 47270.0, 325847.1542))]
    #[test_case(17 => (94542.0, 94541.0, 654941.845))]
    #[test_case(18 => (189084.0, 189083.0, 1303455.691))]
    fn test_reference_samples(p: u8) -> (f64, f64, f64) {
        let idx = table_index(p).unwrap();
        let estimates = RAW_ESTIMATE_DATA[idx];
        (estimates[0], BIAS_DATA[idx][0], estimates[estimates.len() - 1])
    }

    #[test_case(12, 18432.0 => -5.8)]
    #[test_case(14, 49152.0 => 493.1)]
    #[test_case(14, 73728.0 => -15.1)]
    #[test_case(18, 786432.0 => 7918.8)]
    #[test_case(18, 1179648.0 => -222.0)]
    fn test_reference_bias(p: u8, estimate: f64) -> f64 {
        (estimate_bias(estimate, p) * 10.0).round() / 10.0
    }

    #[test_case(7 => Some(80.0))]
    #[test_case(14 => Some(11500.0))]
    #[test_case(18 => Some(350000.0))]
    #[test_case(19 => None)]
    fn test_threshold(p: u8) -> Option<f64> {
        threshold(p)
    }

    #[test]
    fn test_bias_is_mean_of_nearest_samples() {
        let idx = table_index(12).unwrap();
        let estimates = RAW_ESTIMATE_DATA[idx];
        let biases = BIAS_DATA[idx];

        // below the first sample the window is the first NEIGHBORS samples
        let expected = biases[..NEIGHBORS].iter().sum::<f64>() / NEIGHBORS as f64;
        assert!((estimate_bias(0.0, 12) - expected).abs() < 1e-9);

        // above the last sample the window is the last NEIGHBORS samples
        let n = biases.len();
        let expected = biases[n - NEIGHBORS..].iter().sum::<f64>() / NEIGHBORS as f64;
        assert!((estimate_bias(estimates[n - 1] * 2.0, 12) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_bias_shrinks_with_estimate() {
        let m = 4096.0;
        assert!(estimate_bias(0.75 * m, 12) > estimate_bias(2.0 * m, 12));
        assert!(estimate_bias(5.0 * m, 12).abs() < 0.05 * m);
    }

    #[test_case(19)]
    #[test_case(30)]
    fn test_no_bias_above_table(p: u8) {
        assert_eq!(estimate_bias(1000.0, p), 0.0);
    }
}
