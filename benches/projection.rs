use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use netgrad::gradient::{GradientStepSpec, VectorState};
use netgrad::project::Projection;
use netgrad::rng::RandomStream;

fn input(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = RandomStream::new(seed);
    (0..n).map(|_| 20.0 * rng.uniform() - 5.0).collect()
}

fn bench_projections(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection");
    for n in [4usize, 32, 256] {
        let x = input(n, n as u64);
        let regions = [
            ("box", Projection::bounded(0.0, 1.0).unwrap()),
            ("simplex", Projection::simplex(10.0, 0.0).unwrap()),
            ("simplex_reg", Projection::simplex(10.0, 0.05).unwrap()),
            ("capacity", Projection::capacity(n as f64, vec![0.01; n]).unwrap()),
        ];
        for (name, region) in regions {
            group.bench_with_input(BenchmarkId::new(name, n), &x, |b, x| {
                b.iter(|| {
                    let mut y = x.clone();
                    region.apply(black_box(&mut y));
                    y
                })
            });
        }
    }
    group.finish();
}

fn bench_vector_step(c: &mut Criterion) {
    let spec = GradientStepSpec::new(0.05).unwrap().with_momentum(0.5).with_noise(0.1);
    let region = Projection::simplex(1.0, 0.05).unwrap();
    let gradient = input(16, 7);

    c.bench_function("vector_step_16", |b| {
        let mut state = VectorState::new(vec![1.0 / 16.0; 16]);
        let mut rng = RandomStream::new(1);
        b.iter(|| {
            state
                .advance(black_box(&gradient), &spec, &region, &mut rng)
                .map(|v| v[0])
        })
    });
}

criterion_group!(benches, bench_projections, bench_vector_step);
criterion_main!(benches);
