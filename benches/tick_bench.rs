//! Per-tick throughput benchmark, covering the nine-stage pipeline
//! under a moderate two-player economy/combat load.

use criterion::{criterion_group, criterion_main, Criterion};
use frontline_core::{Action, SimWorld};

fn setup_world(unit_count: usize) -> SimWorld {
    let mut sim = SimWorld::new();
    let (blue, _) = sim.add_player("blue", false, 400.0, 400.0);
    let (red, _) = sim.add_player("red", true, 3600.0, 3600.0);
    sim.spawn_well(2000.0, 2000.0);

    for i in 0..unit_count {
        let player = if i % 2 == 0 { blue } else { red };
        sim.step(Action::StartBuild {
            player,
            category: frontline_core::ruleset::BuildCategory::Infantry,
            key: "rifleman".to_string(),
        });
    }
    sim
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_tick");
    for &unit_count in &[10usize, 100, 500] {
        group.bench_function(format!("units_{unit_count}"), |b| {
            b.iter_batched(
                || setup_world(unit_count),
                |mut sim| {
                    for _ in 0..60 {
                        sim.step(Action::Tick);
                    }
                    sim
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
