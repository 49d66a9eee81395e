#![no_main]

use libfuzzer_sys::fuzz_target;
use uniq_sketch::{CardinalityEstimatorTrait, Estimator};

fuzz_target!(|data: &[u8]| {
    if let Ok(mut estimator) = serde_json::from_slice::<Estimator>(data) {
        let serialized = serde_json::to_vec(&estimator).unwrap();
        let deserialized: Estimator = serde_json::from_slice(&serialized).unwrap();
        assert_eq!(deserialized, estimator);

        estimator.insert(&1);
        let copy = estimator.clone();
        estimator.merge(&copy).unwrap();
        assert_eq!(estimator.cardinality(), copy.cardinality());
    }
});
