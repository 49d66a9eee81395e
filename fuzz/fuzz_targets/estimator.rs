#![no_main]

use libfuzzer_sys::fuzz_target;
use uniq_sketch::{CardinalityEstimatorTrait, Estimator};
use wyhash::wyhash;

const NAMES: [&str; 4] = ["hllraw8", "hllnobias8", "combined", "uniq"];

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let name = NAMES[usize::from(data[0]) % NAMES.len()];
    let split_index = wyhash(data, 0) as usize % data.len();
    let (first_half, second_half) = data.split_at(split_index);

    let mut estimator1 = Estimator::from_name(name).unwrap();
    for chunk in first_half.chunks(4) {
        estimator1.insert_bytes(chunk);
        assert!(estimator1.cardinality() > 0);
        assert!(estimator1.memory_footprint() > 0);
    }

    let mut estimator2 = Estimator::from_name(name).unwrap();
    for chunk in second_half.chunks(4) {
        estimator2.insert_bytes(chunk);
        assert!(estimator2.cardinality() > 0);
        assert!(estimator2.memory_footprint() > 0);
    }

    let mut merged = estimator1.clone();
    merged.merge(&estimator2).unwrap();
    let mut reversed = estimator2.clone();
    reversed.merge(&estimator1).unwrap();
    assert_eq!(merged.cardinality(), reversed.cardinality());

    let mut twice = merged.clone();
    twice.merge(&merged).unwrap();
    assert_eq!(twice.cardinality(), merged.cardinality());
});
