//! Performance benchmarks for the replication core

use server::config::BroadcastPolicy;
use server::registry::Registry;
use server::scheduler::TickScheduler;
use shared::{simulate, Direction, Frame, ParticipantState, Position, World};
use std::time::Instant;
use tokio::sync::mpsc;

/// Benchmarks the motion integrator
#[test]
fn benchmark_simulate() {
    let world = World::default();
    let mut position = Position::new(400.0, 300.0);

    let iterations = 1_000_000;
    let start = Instant::now();

    for i in 0..iterations {
        let mask = (i % 16) as u8;
        position = simulate(&world, position, mask, 1.0 / 60.0);
    }

    let duration = start.elapsed();
    println!(
        "Simulate: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(world.contains(position));
    // Should complete in under 1 second for 1M iterations
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks encoding and decoding a full batch snapshot
#[test]
fn benchmark_batch_codec() {
    let records: Vec<ParticipantState> = (0..1000)
        .map(|id| ParticipantState {
            id,
            x: id as f32 * 0.7,
            y: id as f32 * 0.3,
            hue: (id % 256) as u8,
            mask: Direction::Left.bit(),
        })
        .collect();
    let frame = Frame::Batch(records);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = frame.encode().unwrap();
        let decoded = Frame::decode_client_bound(&bytes).unwrap();
        assert_eq!(decoded.kind(), frame.kind());
    }

    let duration = start.elapsed();
    println!(
        "Batch codec (1000 records): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks small frame codec throughput
#[test]
fn benchmark_intent_codec() {
    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let frame = Frame::MovementIntent {
            mask: (i % 16) as u8,
        };
        let bytes = frame.encode().unwrap();
        let _ = Frame::decode_server_bound(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Intent codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks full tick cycles with many moving participants
#[test]
fn benchmark_scheduler_cycle() {
    let participants = 200;
    let mut registry = Registry::seeded(World::default(), 1);
    let mut receivers = Vec::with_capacity(participants);
    for _ in 0..participants {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.accept(tx);
        receivers.push(rx);
    }

    let mut scheduler = TickScheduler::new(BroadcastPolicy::EveryTick);
    // Welcome cycle: hello and roster for everyone.
    scheduler.run_cycle(&mut registry, 0.0);
    for rx in &mut receivers {
        while rx.try_recv().is_ok() {}
    }

    let iterations = 100;
    let start = Instant::now();

    for i in 0..iterations {
        for id in registry.snapshot() {
            registry.apply_intent(id, Direction::ALL[(id as usize + i) % 4].bit());
        }
        let report = scheduler.run_cycle(&mut registry, 1.0 / 30.0);
        assert_eq!(report.movers, participants);

        for rx in &mut receivers {
            while rx.try_recv().is_ok() {}
        }
    }

    let duration = start.elapsed();
    println!(
        "Scheduler cycle ({} participants): {} iterations in {:?} ({:.2} μs/iter)",
        participants,
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    for participant in registry.iter() {
        assert!(registry.world().contains(participant.position));
    }
    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}
