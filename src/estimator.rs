//! Common interface of every distinct-count sketch and a sum type over all of them.
//!
//! Four sketches are available, each identified by its name:
//!
//! | Sketch             | Name           | Memory                        |
//! |--------------------|----------------|-------------------------------|
//! | `HyperLogLog`      | `hllraw{P}`    | `2^P` bytes                   |
//! | `HyperLogLogPlus`  | `hllnobias{P}` | `2^P` bytes                   |
//! | `HybridEstimator`  | `combined`     | 64 bytes up to 64 KiB         |
//! | `ThinningCounter`  | `uniq`         | 64 bytes up to 512 KiB        |
//!
//! `Estimator` wraps any of them when the sketch kind is only known at runtime, e.g. when it
//! is configured by name:
//!
//! ```
//! use uniq_sketch::{CardinalityEstimatorTrait, Estimator};
//!
//! let mut lhs = Estimator::from_name("hllnobias12").unwrap();
//! let mut rhs = Estimator::from_name("hllnobias12").unwrap();
//! for i in 0..1000 {
//!     lhs.insert_u64(i);
//!     rhs.insert_u64(i + 500);
//! }
//! lhs.merge(&rhs).unwrap();
//! assert!(lhs.cardinality().abs_diff(1500) < 100);
//! ```

use std::fmt::{Display, Formatter};
use std::hash::Hash;
use std::str::FromStr;

use enum_dispatch::enum_dispatch;

use crate::error::SketchError;
use crate::hybrid::HybridEstimator;
use crate::hyperloglog::HyperLogLog;
use crate::hyperloglog_plus::HyperLogLogPlus;
use crate::thinning::ThinningCounter;

/// Precision used when a name omits it
pub const DEFAULT_PRECISION: u8 = 14;

/// Sketches supported by `Estimator`
#[derive(Clone, PartialEq, Debug)]
#[enum_dispatch]
pub enum Estimator {
    HyperLogLog(HyperLogLog),
    HyperLogLogPlus(HyperLogLogPlus),
    HybridEstimator(HybridEstimator),
    ThinningCounter(ThinningCounter),
}

/// Capability shared by all sketches.
#[enum_dispatch(Estimator)]
pub trait CardinalityEstimatorTrait {
    /// Insert precomputed 64-bit hash. Sketches working with 32-bit hashes use its low 32 bits.
    fn insert_hash(&mut self, hash: u64);
    /// Hash and insert raw bytes
    fn insert_bytes(&mut self, bytes: &[u8]);
    /// Hash and insert integer
    fn insert_u64(&mut self, value: u64);
    /// Estimated number of distinct inserted values
    fn cardinality(&self) -> u64;
    /// Bytes used by registers or hash slots
    fn memory_footprint(&self) -> usize;
    /// Sketch identifier, e.g. `hllraw14` or `uniq`
    fn name(&self) -> String;
    /// Name, estimate and footprint of the sketch
    fn describe(&self) -> String {
        format!(
            "{{ name: {}, estimate: {}, size: {} }}",
            self.name(),
            self.cardinality(),
            self.memory_footprint()
        )
    }
}

impl Estimator {
    /// Create new empty sketch of the given kind
    pub fn new(kind: EstimatorKind) -> Result<Self, SketchError> {
        Ok(match kind {
            EstimatorKind::HyperLogLog { precision } => {
                Estimator::HyperLogLog(HyperLogLog::new(precision)?)
            }
            EstimatorKind::HyperLogLogPlus { precision } => {
                Estimator::HyperLogLogPlus(HyperLogLogPlus::new(precision)?)
            }
            EstimatorKind::Hybrid => Estimator::HybridEstimator(HybridEstimator::new()),
            EstimatorKind::Thinning => Estimator::ThinningCounter(ThinningCounter::new()),
        })
    }

    /// Create new empty sketch from its name, e.g. `hllraw12`, `hllnobias`, `combined`.
    pub fn from_name(name: &str) -> Result<Self, SketchError> {
        Self::new(name.parse()?)
    }

    /// Kind of the wrapped sketch
    pub fn kind(&self) -> EstimatorKind {
        match self {
            Estimator::HyperLogLog(hll) => EstimatorKind::HyperLogLog {
                precision: hll.precision(),
            },
            Estimator::HyperLogLogPlus(hll) => EstimatorKind::HyperLogLogPlus {
                precision: hll.precision(),
            },
            Estimator::HybridEstimator(_) => EstimatorKind::Hybrid,
            Estimator::ThinningCounter(_) => EstimatorKind::Thinning,
        }
    }

    /// Insert a hashable item
    #[inline]
    pub fn insert<T: Hash + ?Sized>(&mut self, item: &T) {
        match self {
            Estimator::HyperLogLog(hll) => hll.insert(item),
            Estimator::HyperLogLogPlus(hll) => hll.insert(item),
            Estimator::HybridEstimator(hybrid) => hybrid.insert(item),
            Estimator::ThinningCounter(counter) => counter.insert(item),
        }
    }

    /// Merge `rhs` into `self`. Both sketches must be of the same kind, `self` is left
    /// untouched otherwise.
    pub fn merge(&mut self, rhs: &Estimator) -> Result<(), SketchError> {
        match (self, rhs) {
            (Estimator::HyperLogLog(lhs), Estimator::HyperLogLog(rhs)) => lhs.merge(rhs),
            (Estimator::HyperLogLogPlus(lhs), Estimator::HyperLogLogPlus(rhs)) => lhs.merge(rhs),
            (Estimator::HybridEstimator(lhs), Estimator::HybridEstimator(rhs)) => {
                lhs.merge(rhs);
                Ok(())
            }
            (Estimator::ThinningCounter(lhs), Estimator::ThinningCounter(rhs)) => {
                lhs.merge(rhs);
                Ok(())
            }
            (lhs, rhs) => Err(SketchError::incompatible(lhs.name(), rhs.name())),
        }
    }
}

/// Sketch configuration, parsed from and displayed as the sketch name.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EstimatorKind {
    /// `hllraw{P}`
    HyperLogLog { precision: u8 },
    /// `hllnobias{P}`
    HyperLogLogPlus { precision: u8 },
    /// `combined`
    Hybrid,
    /// `uniq`
    Thinning,
}

impl FromStr for EstimatorKind {
    type Err = SketchError;

    /// Parse sketch name. Precision defaults to `DEFAULT_PRECISION` when omitted and is only
    /// validated when the sketch is created.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || SketchError::UnknownVariant(name.to_string());
        let precision = |suffix: &str| -> Result<u8, SketchError> {
            if suffix.is_empty() {
                return Ok(DEFAULT_PRECISION);
            }
            if !suffix.bytes().all(|b| b.is_ascii_digit()) {
                return Err(unknown());
            }
            suffix.parse().map_err(|_| unknown())
        };

        match name {
            "combined" => Ok(EstimatorKind::Hybrid),
            "uniq" => Ok(EstimatorKind::Thinning),
            _ => {
                if let Some(suffix) = name.strip_prefix("hllraw") {
                    Ok(EstimatorKind::HyperLogLog {
                        precision: precision(suffix)?,
                    })
                } else if let Some(suffix) = name.strip_prefix("hllnobias") {
                    Ok(EstimatorKind::HyperLogLogPlus {
                        precision: precision(suffix)?,
                    })
                } else {
                    Err(unknown())
                }
            }
        }
    }
}

impl Display for EstimatorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimatorKind::HyperLogLog { precision } => write!(f, "hllraw{precision}"),
            EstimatorKind::HyperLogLogPlus { precision } => write!(f, "hllnobias{precision}"),
            EstimatorKind::Hybrid => f.write_str("combined"),
            EstimatorKind::Thinning => f.write_str("uniq"),
        }
    }
}
