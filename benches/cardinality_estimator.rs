#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::hash::BuildHasherDefault;

use criterion::measurement::WallTime;
use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion, Throughput,
};
use hyperloglogplus::HyperLogLog as HyperLogLogPlusTrait;
use pprof::criterion::{Output, PProfProfiler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tabled::settings::{Settings, Style};
use tabled::{Table, Tabled};
use uniq_sketch::{
    CardinalityEstimatorTrait, HybridEstimator, HyperLogLog, HyperLogLogPlus, ThinningCounter,
};
use wyhash::WyHash;

/// Insert and estimate operations are benchmarked against cardinalities ranging from 0 to
/// `DEFAULT_MAX_CARDINALITY` or environment variable `N` (if defined) with cardinality doubled
/// with every iteration as [0, 1, 2, ..., N].
const DEFAULT_MAX_CARDINALITY: usize = 1 << 14;
/// Precision of every HyperLogLog-based sketch
const PRECISION: u8 = 14;

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Protobuf));
    targets = benchmark
}
criterion_main!(benches);

fn benchmark(c: &mut Criterion) {
    let bench_results_path =
        std::env::var("BENCH_RESULTS_PATH").unwrap_or_else(|_| "target".to_string());
    let max_cardinality = std::env::var("N")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_CARDINALITY);

    let cardinalities: Vec<usize> = std::iter::once(0)
        .chain((0..).map(|c| 1 << c))
        .take_while(|&c| c <= max_cardinality)
        .collect();

    let mut group = c.benchmark_group("insert");
    for &cardinality in &cardinalities {
        group.throughput(Throughput::Elements(cardinality.max(1) as u64));
        bench_insert::<HllRaw>(&mut group, cardinality);
        bench_insert::<HllNoBias>(&mut group, cardinality);
        bench_insert::<Combined>(&mut group, cardinality);
        bench_insert::<Uniq>(&mut group, cardinality);
        bench_insert::<HyperLogLogCrate>(&mut group, cardinality);
        bench_insert::<HyperLogLogPlusCrate>(&mut group, cardinality);
    }
    group.finish();

    let mut group = c.benchmark_group("estimate");
    group.throughput(Throughput::Elements(1));
    for &cardinality in &cardinalities {
        bench_estimate::<HllRaw>(&mut group, cardinality);
        bench_estimate::<HllNoBias>(&mut group, cardinality);
        bench_estimate::<Combined>(&mut group, cardinality);
        bench_estimate::<Uniq>(&mut group, cardinality);
        bench_estimate::<HyperLogLogCrate>(&mut group, cardinality);
        bench_estimate::<HyperLogLogPlusCrate>(&mut group, cardinality);
    }
    group.finish();

    let results: Vec<StatRecord> = cardinalities
        .iter()
        .map(|&cardinality| StatRecord {
            cardinality,
            hllraw: measure_allocations::<HllRaw>(cardinality),
            hllnobias: measure_allocations::<HllNoBias>(cardinality),
            combined: measure_allocations::<Combined>(cardinality),
            uniq: measure_allocations::<Uniq>(cardinality),
            hyperloglog: measure_allocations::<HyperLogLogCrate>(cardinality),
            hyperloglogplus: measure_allocations::<HyperLogLogPlusCrate>(cardinality),
        })
        .collect();

    let table_config = Settings::default().with(Style::markdown());
    std::fs::write(
        format!("{}/memory_usage.md", bench_results_path),
        Table::new(results).with(table_config).to_string(),
    )
    .unwrap();

    let results: Vec<StatRecord> = cardinalities
        .iter()
        .map(|&cardinality| StatRecord {
            cardinality,
            hllraw: measure_error::<HllRaw>(cardinality),
            hllnobias: measure_error::<HllNoBias>(cardinality),
            combined: measure_error::<Combined>(cardinality),
            uniq: measure_error::<Uniq>(cardinality),
            hyperloglog: measure_error::<HyperLogLogCrate>(cardinality),
            hyperloglogplus: measure_error::<HyperLogLogPlusCrate>(cardinality),
        })
        .collect();

    let table_config = Settings::default().with(Style::markdown());
    std::fs::write(
        format!("{}/relative_error.md", bench_results_path),
        Table::new(results).with(table_config).to_string(),
    )
    .unwrap();
}

/// Operations shared by every benchmarked estimator.
trait BenchEstimator {
    fn new() -> Self;
    fn insert(&mut self, item: &usize);
    fn estimate(&mut self) -> usize;
    fn name() -> String;
}

fn bench_insert<E: BenchEstimator>(group: &mut BenchmarkGroup<WallTime>, cardinality: usize) {
    group.bench_with_input(
        BenchmarkId::new(E::name(), cardinality),
        &cardinality,
        |b, &cardinality| {
            b.iter(|| {
                let mut estimator = E::new();
                for i in 0..black_box(cardinality) {
                    estimator.insert(black_box(&i));
                }
            });
        },
    );
}

fn bench_estimate<E: BenchEstimator>(group: &mut BenchmarkGroup<WallTime>, cardinality: usize) {
    group.bench_with_input(
        BenchmarkId::new(E::name(), cardinality),
        &cardinality,
        |b, &cardinality| {
            let mut estimator = E::new();
            for i in 0..black_box(cardinality) {
                estimator.insert(black_box(&i));
            }
            b.iter(|| estimator.estimate());
        },
    );
}

fn measure_allocations<E: BenchEstimator>(cardinality: usize) -> String {
    let _profiler = dhat::Profiler::builder().testing().build();
    let mut estimator = E::new();
    for i in 0..cardinality {
        estimator.insert(&i);
    }
    let stats = dhat::HeapStats::get();
    format!(
        "{} / {} / {}",
        std::mem::size_of::<E>(),
        stats.total_bytes,
        stats.total_blocks,
    )
}

fn measure_error<E: BenchEstimator>(cardinality: usize) -> String {
    let n = 100;
    let mut total_relative_error: f64 = 0.0;
    let mut rng = StdRng::seed_from_u64(12345);
    for _ in 0..n {
        let mut estimator = E::new();
        for _ in 0..cardinality {
            estimator.insert(&rng.gen());
        }
        let relative_error = if cardinality == 0 {
            0.0
        } else {
            (estimator.estimate() as f64 - cardinality as f64).abs() / cardinality as f64
        };
        total_relative_error += relative_error;
    }
    let avg_relative_error = total_relative_error / (n as f64);

    if avg_relative_error < 1.0 {
        format!("{:.4}", avg_relative_error)
    } else {
        format!("{:.2e}", avg_relative_error)
    }
}

#[derive(Tabled)]
struct StatRecord {
    cardinality: usize,
    hllraw: String,
    hllnobias: String,
    combined: String,
    uniq: String,
    hyperloglog: String,
    hyperloglogplus: String,
}

struct HllRaw(HyperLogLog);

impl BenchEstimator for HllRaw {
    fn new() -> Self {
        Self(HyperLogLog::new(PRECISION).unwrap())
    }

    fn insert(&mut self, item: &usize) {
        self.0.insert(item);
    }

    fn estimate(&mut self) -> usize {
        self.0.cardinality() as usize
    }

    fn name() -> String {
        format!("hllraw{PRECISION}")
    }
}

struct HllNoBias(HyperLogLogPlus);

impl BenchEstimator for HllNoBias {
    fn new() -> Self {
        Self(HyperLogLogPlus::new(PRECISION).unwrap())
    }

    fn insert(&mut self, item: &usize) {
        self.0.insert(item);
    }

    fn estimate(&mut self) -> usize {
        self.0.cardinality() as usize
    }

    fn name() -> String {
        format!("hllnobias{PRECISION}")
    }
}

struct Combined(HybridEstimator);

impl BenchEstimator for Combined {
    fn new() -> Self {
        Self(HybridEstimator::new())
    }

    fn insert(&mut self, item: &usize) {
        self.0.insert(item);
    }

    fn estimate(&mut self) -> usize {
        self.0.cardinality() as usize
    }

    fn name() -> String {
        "combined".to_string()
    }
}

struct Uniq(ThinningCounter);

impl BenchEstimator for Uniq {
    fn new() -> Self {
        Self(ThinningCounter::new())
    }

    fn insert(&mut self, item: &usize) {
        self.0.insert(item);
    }

    fn estimate(&mut self) -> usize {
        self.0.cardinality() as usize
    }

    fn name() -> String {
        "uniq".to_string()
    }
}

struct HyperLogLogCrate(hyperloglog::HyperLogLog);

impl BenchEstimator for HyperLogLogCrate {
    fn new() -> Self {
        Self(hyperloglog::HyperLogLog::new(0.008))
    }

    fn insert(&mut self, item: &usize) {
        self.0.insert(item);
    }

    fn estimate(&mut self) -> usize {
        self.0.len() as usize
    }

    fn name() -> String {
        "hyperloglog".to_string()
    }
}

struct HyperLogLogPlusCrate(hyperloglogplus::HyperLogLogPlus<usize, BuildHasherDefault<WyHash>>);

impl BenchEstimator for HyperLogLogPlusCrate {
    fn new() -> Self {
        Self(
            hyperloglogplus::HyperLogLogPlus::new(
                PRECISION,
                BuildHasherDefault::<WyHash>::default(),
            )
            .unwrap(),
        )
    }

    fn insert(&mut self, item: &usize) {
        self.0.insert(item);
    }

    fn estimate(&mut self) -> usize {
        self.0.count() as usize
    }

    fn name() -> String {
        "hyperloglogplus".to_string()
    }
}
