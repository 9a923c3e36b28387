use biomass_core::Mask;
use biomass_estimate::{BiomassEstimator, ShapeMeasurer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn rotated_bar(size: usize, len: f64, dep: f64, deg: f64) -> Mask {
    let (s, c) = deg.to_radians().sin_cos();
    let mid = size as f64 / 2.0;
    let mut mask = Mask::new(size, size);
    for y in 0..size {
        for x in 0..size {
            let dx = x as f64 + 0.5 - mid;
            let dy = y as f64 + 0.5 - mid;
            if (c * dx + s * dy).abs() <= len / 2.0 && (-s * dx + c * dy).abs() <= dep / 2.0 {
                mask.set(x, y, true);
            }
        }
    }
    mask
}

fn bench_measure(c: &mut Criterion) {
    let measurer = ShapeMeasurer::default();
    let axis = Mask::with_rect(640, 480, 120, 200, 400, 80);
    let tilted = rotated_bar(512, 380.0, 90.0, 27.0);

    c.bench_function("measure_axis_aligned_640x480", |b| {
        b.iter(|| measurer.measure(black_box(&axis), 0.5, 10.0))
    });
    c.bench_function("measure_rotated_512", |b| {
        b.iter(|| measurer.measure(black_box(&tilted), 0.5, 10.0))
    });

    let estimator = BiomassEstimator::default();
    c.bench_function("estimate_individual_two_pass", |b| {
        b.iter(|| estimator.estimate_individual(black_box(&tilted), "Rohu", None, &[], 10.0))
    });
}

criterion_group!(benches, bench_measure);
criterion_main!(benches);
