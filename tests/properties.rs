use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use test_case::test_case;
use uniq_sketch::{CardinalityEstimatorTrait, Estimator, SketchError};

const NAMES: [&str; 6] = [
    "hllraw12",
    "hllraw16",
    "hllnobias12",
    "hllnobias20",
    "combined",
    "uniq",
];

fn estimator_of(name: &str, values: impl IntoIterator<Item = u64>) -> Estimator {
    let mut estimator = Estimator::from_name(name).unwrap();
    for value in values {
        estimator.insert_u64(value);
    }
    estimator
}

fn random_values(seed: u64, n: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen()).collect()
}

#[test]
fn test_empty() {
    for name in NAMES {
        let estimator = Estimator::from_name(name).unwrap();
        assert_eq!(estimator.cardinality(), 0, "{name}");
        assert_eq!(estimator.name(), name);
    }
}

#[test]
fn test_single_zero_hash() {
    for name in NAMES {
        let mut estimator = Estimator::from_name(name).unwrap();
        estimator.insert_hash(0);
        estimator.insert_hash(0);
        assert_eq!(estimator.cardinality(), 1, "{name}");
    }
}

#[test]
fn test_duplicates_are_ignored() {
    for name in NAMES {
        let values = random_values(1, 3_000);
        let once = estimator_of(name, values.iter().copied());
        let twice = estimator_of(name, values.iter().chain(&values).copied());
        assert_eq!(once, twice, "{name}");
    }
}

#[test]
fn test_cardinality_is_repeatable() {
    for name in NAMES {
        for n in [0, 100, 10_000, 100_000] {
            let estimator = estimator_of(name, random_values(4, n));
            let snapshot = estimator.clone();
            let first = estimator.cardinality();
            for _ in 0..3 {
                assert_eq!(estimator.cardinality(), first, "{name}, n = {n}");
            }
            assert_eq!(estimator, snapshot, "{name}, n = {n}");
        }
    }
}

#[test]
fn test_merge_is_idempotent() {
    for name in NAMES {
        for n in [10, 5_000, 50_000] {
            let mut estimator = estimator_of(name, random_values(2, n));
            let copy = estimator.clone();
            estimator.merge(&copy).unwrap();
            assert_eq!(estimator.cardinality(), copy.cardinality(), "{name}, n = {n}");
        }
    }
}

#[test]
fn test_merge_with_empty() {
    for name in NAMES {
        let mut estimator = estimator_of(name, random_values(3, 20_000));
        let expected = estimator.cardinality();
        estimator.merge(&Estimator::from_name(name).unwrap()).unwrap();
        assert_eq!(estimator.cardinality(), expected, "{name}");

        let mut empty = Estimator::from_name(name).unwrap();
        empty.merge(&estimator).unwrap();
        assert_eq!(empty.cardinality(), expected, "{name}");
    }
}

#[test]
fn test_merge_is_commutative_and_associative() {
    let shards: Vec<Vec<u64>> = (0..3).map(|seed| random_values(10 + seed, 4_000)).collect();
    for name in NAMES {
        let [a, b, c] = [0, 1, 2].map(|i| estimator_of(name, shards[i].iter().copied()));

        let mut ab_c = a.clone();
        ab_c.merge(&b).unwrap();
        ab_c.merge(&c).unwrap();

        let mut bc = b.clone();
        bc.merge(&c).unwrap();
        let mut a_bc = a.clone();
        a_bc.merge(&bc).unwrap();

        let mut cb_a = c.clone();
        cb_a.merge(&b).unwrap();
        cb_a.merge(&a).unwrap();

        assert_eq!(ab_c.cardinality(), a_bc.cardinality(), "{name}");
        assert_eq!(ab_c.cardinality(), cb_a.cardinality(), "{name}");
    }
}

#[test_case("hllraw12", 0.1)]
#[test_case("hllnobias12", 0.1)]
#[test_case("combined", 0.05)]
#[test_case("uniq", 0.05)]
fn test_merge_of_disjoint_shards(name: &str, tolerance: f64) {
    let mut merged = Estimator::from_name(name).unwrap();
    for shard in 0..8u64 {
        let shard_estimator = estimator_of(name, (0..25_000).map(|i| (shard << 32) | i));
        merged.merge(&shard_estimator).unwrap();
    }
    let error = (merged.cardinality() as f64 - 200_000.0).abs() / 200_000.0;
    assert!(error < tolerance, "{name}: relative error {error}");
}

#[test_case("hllraw", 4_000)]
#[test_case("hllnobias", 4_000)]
#[test_case("hllnobias", 300_000)]
#[test_case("combined", 8_000)]
#[test_case("combined", 300_000)]
#[test_case("uniq", 60_000)]
#[test_case("uniq", 300_000)]
fn test_relative_error(name: &str, n: usize) {
    let estimator = estimator_of(name, random_values(42, n));
    let error = (estimator.cardinality() as f64 - n as f64).abs() / n as f64;
    assert!(error < 0.05, "{name}: relative error {error} for n = {n}");
}

#[test]
fn test_small_sets_are_exact() {
    for name in ["combined", "uniq"] {
        for n in [1, 100, 4_096] {
            let estimator = estimator_of(name, random_values(7, n));
            assert_eq!(estimator.cardinality(), n as u64, "{name}");
        }
    }
}

#[test]
fn test_memory_footprint() {
    let mut combined = Estimator::from_name("combined").unwrap();
    let mut uniq = Estimator::from_name("uniq").unwrap();
    assert_eq!(combined.memory_footprint(), 64);
    assert_eq!(uniq.memory_footprint(), 64);

    for value in random_values(5, 1_000_000) {
        combined.insert_u64(value);
        uniq.insert_u64(value);
    }
    assert_eq!(combined.memory_footprint(), 1 << 16);
    assert_eq!(uniq.memory_footprint(), uniq_sketch::thinning::MAX_MEMORY_FOOTPRINT);
    assert_eq!(Estimator::from_name("hllraw10").unwrap().memory_footprint(), 1024);
}

#[test_case("hllraw6" => Err(SketchError::InvalidConfiguration { precision: 6 }))]
#[test_case("hllraw7" => Ok(()))]
#[test_case("hllnobias20" => Ok(()))]
#[test_case("hllnobias31" => Err(SketchError::InvalidConfiguration { precision: 31 }))]
#[test_case("hllnobias0" => Err(SketchError::InvalidConfiguration { precision: 0 }))]
#[test_case("hyperloglog" => Err(SketchError::UnknownVariant("hyperloglog".to_string())))]
fn test_configuration(name: &str) -> Result<(), SketchError> {
    Estimator::from_name(name).map(|_| ())
}
