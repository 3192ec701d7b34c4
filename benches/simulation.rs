//! Simulation benchmarks for the Frontier world server
//!
//! Measures the per-tick cost of the enemy, bot, and effects systems at
//! various population sizes.
//!
//! Run with: cargo bench --bench simulation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use uuid::Uuid;

use frontier_world_server::util::vec2::Vec2;
use frontier_world_server::world::constants::tick::DT;
use frontier_world_server::world::population;
use frontier_world_server::world::state::{
    Combatant, CombatantClass, Controller, World,
};
use frontier_world_server::world::systems::bots::BotState;
use frontier_world_server::world::systems::{bots, effects, enemies};

/// Populate a world: players spread over a grid of regions, enemies
/// generated by the population controller itself.
fn build_world(players: usize, regions: i32) -> World {
    let mut world = World::new(1234);
    let mut events = Vec::new();

    for i in 0..players {
        let id = Uuid::new_v4();
        let mut combatant = Combatant::new(
            id,
            format!("Player{}", i),
            CombatantClass::Ranger,
            Controller::Human { session: Uuid::new_v4() },
        );
        combatant.position = Vec2::new((i as f32) * 97.0, (i as f32) * 53.0);
        combatant.spawn_protection = 0.0;
        world.combatants.insert(id, combatant);
    }

    for cx in 0..regions {
        for cy in 0..regions {
            population::enter_region(&mut world, &mut events, (cx, cy), players, 0.0);
        }
    }

    world
}

fn bench_enemy_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("enemy_step");
    group.sample_size(50);

    for &region_side in &[1i32, 2, 3] {
        let world = build_world(4, region_side);
        let count = world.enemies.len();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(count),
            &region_side,
            |b, &side| {
                b.iter_batched(
                    || build_world(4, side),
                    |mut world| {
                        let mut events = Vec::new();
                        let moved = enemies::step(&mut world, &mut events, DT, 0.1);
                        black_box((moved, events));
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_bot_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("bot_step");
    group.sample_size(50);

    for &bot_count in &[4usize, 16, 64] {
        group.throughput(Throughput::Elements(bot_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(bot_count),
            &bot_count,
            |b, &count| {
                b.iter_batched(
                    || {
                        let mut world = build_world(1, 2);
                        for i in 0..count {
                            let id = Uuid::new_v4();
                            let anchor = Vec2::new((i as f32) * 151.0, 0.0);
                            let mut bot = Combatant::new(
                                id,
                                format!("Bot{}", i),
                                CombatantClass::Warden,
                                Controller::Bot(BotState::new(anchor)),
                            );
                            bot.position = anchor;
                            bot.spawn_protection = 0.0;
                            world.combatants.insert(id, bot);
                        }
                        world
                    },
                    |mut world| {
                        let mut events = Vec::new();
                        bots::step(&mut world, &mut events, DT, 0.1);
                        black_box(events);
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_effects_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("effects_step");
    group.sample_size(50);

    group.bench_function("bleed_heavy", |b| {
        b.iter_batched(
            || {
                let mut world = build_world(4, 2);
                let now = 0.0;
                for enemy in world.enemies.values_mut() {
                    enemy.bleed.add_stacks(3, now, 4.0, 5);
                    enemy.bleed.next_tick_at = 0.0;
                }
                world
            },
            |mut world| {
                let mut events = Vec::new();
                let moved = effects::step(&mut world, &mut events, DT, 0.1);
                black_box((moved, events));
            },
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_enemy_step, bench_bot_step, bench_effects_step);
criterion_main!(benches);
