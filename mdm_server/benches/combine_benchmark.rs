//! Hot-path benchmarks: recombination, clamp and geometry mapping

use criterion::{Criterion, criterion_group, criterion_main};
use mdm_common::consts::{DM_ACTUATORS, DM_VIRTUAL_ACTUATORS};
use mdm_server::ChannelManager;
use mdm_server::combine::{Combiner, combine_into};
use mdm_server::geometry::map_into;
use std::hint::black_box;

/// Benchmark the pure sum + clamp over 4 channels
fn bench_combine_into(c: &mut Criterion) {
    let channels: Vec<Vec<f64>> = (0..4)
        .map(|k| (0..DM_VIRTUAL_ACTUATORS).map(|i| (i + k) as f64 / 300.0).collect())
        .collect();
    let mut out = vec![0.0; DM_VIRTUAL_ACTUATORS];

    c.bench_function("combine_into_4_channels", |b| {
        b.iter(|| {
            combine_into(channels.iter().map(Vec::as_slice), black_box(&mut out));
            black_box(out[0]);
        });
    });
}

/// Benchmark the geometry mapping
fn bench_map_into(c: &mut Criterion) {
    let map: Vec<f64> = (0..DM_VIRTUAL_ACTUATORS).map(|i| i as f64).collect();
    let mut command = vec![0.0; DM_ACTUATORS];

    c.bench_function("map_into_140", |b| {
        b.iter(|| {
            map_into(black_box(&map), &mut command);
            black_box(command[0]);
        });
    });
}

/// Benchmark one control-loop cycle: idle poll and poll with an update
fn bench_poll_and_combine(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = ChannelManager::new(dir.path());
    manager.configure(1, 4).unwrap();
    let set = manager.set(1).unwrap();
    let mut combiner = Combiner::baseline(set);
    let frame = vec![0.1; DM_VIRTUAL_ACTUATORS];

    c.bench_function("poll_idle", |b| {
        b.iter(|| black_box(combiner.poll_and_combine(set).unwrap().is_none()));
    });

    c.bench_function("poll_update_4_channels", |b| {
        b.iter(|| {
            set.channels()[0].publish(&frame).unwrap();
            let grid = combiner.poll_and_combine(set).unwrap();
            black_box(grid.map(|g| g[0]));
        });
    });
}

criterion_group!(benches, bench_combine_into, bench_map_into, bench_poll_and_combine);
criterion_main!(benches);
