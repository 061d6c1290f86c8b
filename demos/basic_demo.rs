//! Basic demonstration of the frontline_core simulation.
//!
//! Run with: cargo run --example basic_demo

use frontline_core::{Action, SimWorld};

fn main() {
    println!("=== Frontline Core - Simulation Demo ===\n");

    let mut sim = SimWorld::new();
    let (blue, _blue_conyard) = sim.add_player("blue", false, 200.0, 200.0);
    let (red, _red_conyard) = sim.add_player("red", true, 3800.0, 3800.0);
    sim.spawn_well(2000.0, 2000.0);

    println!("Initial snapshot:");
    println!("{}\n", sim.snapshot_json());

    println!("--- Queueing a refinery and a rifleman for blue ---\n");
    sim.step(Action::StartBuild {
        player: blue,
        category: frontline_core::ruleset::BuildCategory::Building,
        key: "refinery".to_string(),
    });

    println!("Running 600 ticks...\n");
    for tick in 0..600 {
        let events = sim.step(Action::Tick);
        for event in &events {
            println!("tick {}: {:?}", tick, event);
        }
        if !sim.is_running() {
            println!("match ended at tick {}", tick);
            break;
        }
    }

    let snapshot = sim.snapshot();
    println!(
        "\nFinal: tick={} units={} buildings={} red_eliminated={}",
        snapshot.tick,
        snapshot.units.len(),
        snapshot.buildings.len(),
        snapshot.players.iter().find(|p| p.player == red.0).map(|p| p.eliminated).unwrap_or(false),
    );
}
