//! Criterion benchmarks for the cortex tick.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cortex2d::prelude::*;

fn make_pair(width: CortexSize, height: CortexSize, radius: NhRadius, tier: ExecutionTier) -> (CortexPair, Input2d) {
    let cfg = CortexConfig::with_radius(radius)
        .with_seed(42)
        .with_evol_step(0x01)
        .with_pulse_mapping(PulseMapping::RoundedProportional);
    let mut cortex = Cortex::with_config(width, height, cfg).unwrap();
    cortex.set_execution_tier(tier);

    let input_width = width.min(32);
    let x0 = width / 2 - input_width / 2;
    let mut input = Input2d::new(
        x0,
        0,
        x0 + input_width,
        1,
        DEFAULT_EXC_VALUE * 2,
        PulseMapping::FlooredProportional,
    )
    .unwrap();
    input.set_values(cortex.config().sample_window - 1);

    (CortexPair::new(cortex), input)
}

/// Benchmark a tick with varying cortex sizes.
fn bench_tick_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_size");

    for &(w, h) in [(64u32, 32u32), (128, 64), (256, 128), (512, 256)].iter() {
        group.throughput(Throughput::Elements(u64::from(w) * u64::from(h)));

        group.bench_with_input(BenchmarkId::new("scalar", w * h), &(w, h), |b, &(w, h)| {
            let (mut pair, input) = make_pair(w, h, 2, ExecutionTier::Scalar);
            b.iter(|| {
                pair.step(Some(&input));
                black_box(pair.ticks())
            });
        });
    }

    group.finish();
}

/// Benchmark a tick comparing execution tiers at a fixed size.
fn bench_tick_tiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_tier");
    group.throughput(Throughput::Elements(512 * 256));

    group.bench_function("scalar_512x256", |b| {
        let (mut pair, input) = make_pair(512, 256, 2, ExecutionTier::Scalar);
        b.iter(|| {
            pair.step(Some(&input));
            black_box(pair.ticks())
        });
    });

    // Parallel (falls back to scalar if feature not enabled)
    group.bench_function("parallel_512x256", |b| {
        let (mut pair, input) = make_pair(512, 256, 2, ExecutionTier::Parallel);
        b.iter(|| {
            pair.step(Some(&input));
            black_box(pair.ticks())
        });
    });

    group.finish();
}

/// Benchmark the neighborhood radius, which sets the slots visited per cell.
fn bench_tick_radius(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_radius");

    for radius in [1u8, 2, 3].iter() {
        group.bench_with_input(BenchmarkId::new("scalar_256x128", radius), radius, |b, &radius| {
            let (mut pair, input) = make_pair(256, 128, radius, ExecutionTier::Scalar);

            // Warm up: let synapses grow.
            pair.run(200, Some(&input));

            b.iter(|| {
                pair.step(Some(&input));
                black_box(pair.ticks())
            });
        });
    }

    group.finish();
}

/// Benchmark image save and load.
fn bench_images(c: &mut Criterion) {
    let mut group = c.benchmark_group("image");

    let (mut pair, input) = make_pair(256, 128, 2, ExecutionTier::Scalar);
    pair.run(200, Some(&input));
    let cortex = pair.into_current();

    group.bench_function("save_256x128", |b| {
        let mut buf = Vec::with_capacity(64 * 1024);
        b.iter(|| {
            buf.clear();
            cortex.save_image_to(&mut buf).unwrap();
            black_box(buf.len())
        });
    });

    group.bench_function("load_256x128", |b| {
        let buf = cortex.save_image_bytes().unwrap();
        b.iter(|| {
            let loaded = Cortex::load_image_bytes(&buf).unwrap();
            black_box(loaded.ticks_count())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_tick_sizes,
    bench_tick_tiers,
    bench_tick_radius,
    bench_images
);
criterion_main!(benches);
