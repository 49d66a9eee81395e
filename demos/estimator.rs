use uniq_sketch::{CardinalityEstimatorTrait, Estimator};

fn main() {
    for name in ["hllraw14", "hllnobias14", "combined", "uniq"] {
        // one sketch per shard, each shard sees a partially overlapping range
        let shards: Vec<Estimator> = (0..4u64)
            .map(|shard| {
                let mut estimator = Estimator::from_name(name).unwrap();
                for i in shard * 50_000..(shard + 2) * 50_000 {
                    estimator.insert(&i);
                }
                estimator
            })
            .collect();

        let mut merged = Estimator::from_name(name).unwrap();
        for (shard, estimator) in shards.iter().enumerate() {
            println!("{name} shard {shard}: {:?}", estimator);
            merged.merge(estimator).unwrap();
        }
        println!("{name} merged estimate = {} (actual 250000)", merged.cardinality());
    }
}
