//! # Serde module for sketches
//!
//! Every sketch is serialized into a tuple holding the minimal state needed to rebuild it:
//! - `HyperLogLog`, `HyperLogLogPlus`: `(precision, registers)`
//! - `HybridEstimator`: `(0, (has_zero, slots))` while exact, `(1, registers)` once approximate
//! - `ThinningCounter`: `(size_degree, skip_degree, has_zero, slots)`
//! - `Estimator`: `(name, sketch)`
//!
//! Derived state (number of zero registers, harmonic sum, number of stored hashes) is not
//! serialized and is recomputed during deserialization, which also rejects any state a sketch
//! could not have reached by itself.
//!
//! Refer to the serde documentation for more details on custom serialization and deserialization:
//! - [Serialization](https://serde.rs/impl-serialize.html)
//! - [Deserialization](https://serde.rs/impl-deserialize.html)
use std::fmt::Formatter;
use std::hash::Hasher;
use std::marker::PhantomData;

use serde::de::{self, Error, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::estimator::{CardinalityEstimatorTrait, Estimator, EstimatorKind};
use crate::hybrid::{HybridEstimator, Representation};
use crate::hyperloglog::HyperLogLog;
use crate::hyperloglog_plus::HyperLogLogPlus;
use crate::thinning::ThinningCounter;

/// Hybrid estimator tag of exact representation
const EXACT_TAG: u8 = 0;
/// Hybrid estimator tag of approximate representation
const APPROXIMATE_TAG: u8 = 1;

impl<H: Hasher + Default> Serialize for HyperLogLog<H> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.precision())?;
        tup.serialize_element(self.registers())?;
        tup.end()
    }
}

impl<'de, H: Hasher + Default> Deserialize<'de> for HyperLogLog<H> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (precision, registers): (u8, Vec<u8>) = Deserialize::deserialize(deserializer)?;
        HyperLogLog::from_bytes(precision, registers).map_err(Error::custom)
    }
}

impl<H: Hasher + Default> Serialize for HyperLogLogPlus<H> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.precision())?;
        tup.serialize_element(self.registers())?;
        tup.end()
    }
}

impl<'de, H: Hasher + Default> Deserialize<'de> for HyperLogLogPlus<H> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (precision, registers): (u8, Vec<u8>) = Deserialize::deserialize(deserializer)?;
        HyperLogLogPlus::from_bytes(precision, registers).map_err(Error::custom)
    }
}

impl<H: Hasher + Default> Serialize for HybridEstimator<H> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        match self.representation() {
            Representation::Exact(table) => {
                tup.serialize_element(&EXACT_TAG)?;
                tup.serialize_element(&(table.has_zero(), table.slots()))?;
            }
            Representation::Approximate(registers) => {
                tup.serialize_element(&APPROXIMATE_TAG)?;
                tup.serialize_element(registers.as_bytes())?;
            }
        }
        tup.end()
    }
}

impl<'de, H: Hasher + Default> Deserialize<'de> for HybridEstimator<H> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HybridVisitor<H>(PhantomData<H>);

        impl<'de, H: Hasher + Default> Visitor<'de> for HybridVisitor<H> {
            type Value = HybridEstimator<H>;

            fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
                formatter.write_str("a tuple of representation tag and its state")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let tag: u8 = seq
                    .next_element()?
                    .ok_or_else(|| A::Error::invalid_length(0, &self))?;
                let estimator = match tag {
                    EXACT_TAG => {
                        let (has_zero, slots): (bool, Vec<u32>) = seq
                            .next_element()?
                            .ok_or_else(|| A::Error::invalid_length(1, &self))?;
                        HybridEstimator::from_slots(has_zero, &slots)
                    }
                    APPROXIMATE_TAG => {
                        let registers: Vec<u8> = seq
                            .next_element()?
                            .ok_or_else(|| A::Error::invalid_length(1, &self))?;
                        HybridEstimator::from_bytes(registers)
                    }
                    _ => {
                        return Err(Error::invalid_value(
                            de::Unexpected::Unsigned(u64::from(tag)),
                            &"representation tag 0 or 1",
                        ))
                    }
                };
                estimator.map_err(Error::custom)
            }
        }

        deserializer.deserialize_tuple(2, HybridVisitor(PhantomData))
    }
}

impl<H: Hasher + Default> Serialize for ThinningCounter<H> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(4)?;
        tup.serialize_element(&self.size_degree())?;
        tup.serialize_element(&self.skip_degree())?;
        tup.serialize_element(&self.has_zero())?;
        tup.serialize_element(self.slots())?;
        tup.end()
    }
}

impl<'de, H: Hasher + Default> Deserialize<'de> for ThinningCounter<H> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (size_degree, skip_degree, has_zero, slots): (u8, u8, bool, Vec<u32>) =
            Deserialize::deserialize(deserializer)?;
        ThinningCounter::from_slots(size_degree, skip_degree, has_zero, &slots)
            .map_err(Error::custom)
    }
}

impl Serialize for Estimator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.name())?;
        match self {
            Estimator::HyperLogLog(hll) => tup.serialize_element(hll)?,
            Estimator::HyperLogLogPlus(hll) => tup.serialize_element(hll)?,
            Estimator::HybridEstimator(hybrid) => tup.serialize_element(hybrid)?,
            Estimator::ThinningCounter(counter) => tup.serialize_element(counter)?,
        }
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Estimator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EstimatorVisitor;

        impl<'de> Visitor<'de> for EstimatorVisitor {
            type Value = Estimator;

            fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
                formatter.write_str("a tuple of estimator name and its state")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let name: String = seq
                    .next_element()?
                    .ok_or_else(|| A::Error::invalid_length(0, &self))?;
                let kind: EstimatorKind = name.parse().map_err(A::Error::custom)?;
                let missing = || A::Error::invalid_length(1, &self);

                let estimator = match kind {
                    EstimatorKind::HyperLogLog { .. } => {
                        Estimator::HyperLogLog(seq.next_element()?.ok_or_else(missing)?)
                    }
                    EstimatorKind::HyperLogLogPlus { .. } => {
                        Estimator::HyperLogLogPlus(seq.next_element()?.ok_or_else(missing)?)
                    }
                    EstimatorKind::Hybrid => {
                        Estimator::HybridEstimator(seq.next_element()?.ok_or_else(missing)?)
                    }
                    EstimatorKind::Thinning => {
                        Estimator::ThinningCounter(seq.next_element()?.ok_or_else(missing)?)
                    }
                };

                // precision of the name must match precision of the registers
                if estimator.kind() != kind {
                    return Err(Error::custom(format!(
                        "estimator name {name} does not match its state {}",
                        estimator.name()
                    )));
                }
                Ok(estimator)
            }
        }

        deserializer.deserialize_tuple(2, EstimatorVisitor)
    }
}
