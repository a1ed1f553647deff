use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use membrane_excitability::{
    integrator::{Method, SolverOptions},
    registry::VariantId,
    simulation::{ModelConfig, SimulationDriver},
};


fn config(id: VariantId, method: Method) -> ModelConfig {
    ModelConfig {
        t_end: 50.,
        samples: 501,
        solver: SolverOptions { method, ..SolverOptions::default() },
        ..ModelConfig::from_variant(id)
    }
}

fn bench_methods(c: &mut Criterion) {
    let driver = SimulationDriver::new();
    let mut group = c.benchmark_group("hh_classic_50ms");

    for method in [Method::ExponentialMidpoint, Method::DormandPrince, Method::Auto] {
        let config = config(VariantId::HhClassic, method);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", method)), &config, |b, config| {
            b.iter(|| driver.simulate(black_box(config)).map(|trajectory| trajectory.len()))
        });
    }

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let driver = SimulationDriver::new();
    let configs: Vec<ModelConfig> = VariantId::ALL.iter()
        .map(|id| config(*id, Method::ExponentialMidpoint))
        .collect();

    c.bench_function("all_variants_batch", |b| {
        b.iter(|| driver.simulate_batch(black_box(&configs)).len())
    });

    c.bench_function("all_variants_sequential", |b| {
        b.iter(|| {
            black_box(&configs).iter()
                .map(|config| driver.simulate(config).is_ok())
                .count()
        })
    });
}

criterion_group!(benches, bench_methods, bench_batch);
criterion_main!(benches);
