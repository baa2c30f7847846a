use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sim_core::{
    CapitalControls, PlayerId, PlayerResources, PolicyChoices, ResolutionInput, ResolutionMode,
    ScoringWeights,
};

fn inputs(n: usize) -> Vec<ResolutionInput> {
    (0..n)
        .map(|i| {
            let tilt = i as f64 / n as f64;
            ResolutionInput {
                player_id: PlayerId(i as i64 + 1),
                resources: PlayerResources {
                    gdp: 1.5e12 + tilt * 1e12,
                    inflation: 1.0 + tilt * 4.0,
                    exchange_rate: 0.8 + tilt * 0.4,
                    ..PlayerResources::default()
                },
                policies: PolicyChoices {
                    capital_controls: if i % 3 == 0 {
                        CapitalControls::Strict
                    } else {
                        CapitalControls::Open
                    },
                    tariff_rate: (i % 10) as f64,
                    ..PolicyChoices::default()
                },
                starting_resources: PlayerResources::default(),
                quarters_played: 4,
                rng_seed: sim_econ::pass_seed(42, 4, i as i64),
            }
        })
        .collect()
}

fn bench_quarter(c: &mut Criterion) {
    let weights = ScoringWeights::default();
    let mut group = c.benchmark_group("resolve_quarter");
    for n in [2usize, 10, 100] {
        let batch = inputs(n);
        group.bench_with_input(BenchmarkId::new("lagged", n), &batch, |b, batch| {
            b.iter(|| sim_runtime::run_pass(batch, ResolutionMode::Lagged, &weights))
        });
        group.bench_with_input(BenchmarkId::new("equilibrium", n), &batch, |b, batch| {
            b.iter(|| sim_runtime::run_pass(batch, ResolutionMode::Equilibrium, &weights))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_quarter);
criterion_main!(benches);
