// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for ray casts and point hit tests over a grid of entities.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::DVec3;
use kurbo::Rect;
use understory_partition::{
    Box3, ContainerProps, PartitionId, PartitionTree, Traversable,
};
use understory_pick::PickGroup;

const CELL: f64 = 12.0;

/// A `side` by `side` grid of entities, alternating solids and quads.
fn grid(side: u32) -> (PartitionTree, PartitionId) {
    let mut tree = PartitionTree::new();
    let root = tree.create_container(ContainerProps::default());
    for row in 0..side {
        for col in 0..side {
            let (x, y) = (f64::from(col) * CELL, f64::from(row) * CELL);
            let content = if (row + col) % 2 == 0 {
                Traversable::Solid(Box3::new(DVec3::ZERO, DVec3::splat(10.0)))
            } else {
                Traversable::Quad(Rect::new(0.0, 0.0, 10.0, 10.0))
            };
            let entity = tree.create_entity(ContainerProps::at(x, y, 0.0), vec![content]);
            tree.add_child(root, entity).unwrap();
        }
    }
    let view = tree.create_view();
    let root = tree.node(view, root).unwrap();
    let partition = tree.partition_of(root).unwrap();
    (tree, partition)
}

fn probes(side: u32) -> Vec<(f64, f64)> {
    (0..64_u32)
        .map(|i| {
            let col = (i * 7) % side;
            let row = (i * 13) % side;
            (f64::from(col) * CELL + 5.0, f64::from(row) * CELL + 5.0)
        })
        .collect()
}

fn bench_picking(c: &mut Criterion) {
    let mut group = c.benchmark_group("understory_pick");
    group.sample_size(30);

    for &side in &[8_u32, 24, 48] {
        let points = probes(side);
        group.throughput(Throughput::Elements(points.len() as u64));

        for shape in [false, true] {
            let name = if shape { "raycast_shape" } else { "raycast_bounds" };
            group.bench_function(BenchmarkId::new(name, side), |b| {
                let (mut tree, partition) = grid(side);
                let mut picks = PickGroup::new();
                b.iter(|| {
                    let mut hits = 0_usize;
                    for &(x, y) in &points {
                        let origin = DVec3::new(x, y, -10.0);
                        if picks
                            .get_collision(&mut tree, partition, origin, DVec3::Z, shape, None)
                            .is_some()
                        {
                            hits += 1;
                        }
                    }
                    black_box(hits)
                });
            });
        }

        group.bench_function(BenchmarkId::new("hit_test_point", side), |b| {
            let (mut tree, partition) = grid(side);
            let mut picks = PickGroup::new();
            b.iter(|| {
                let mut hits = 0_usize;
                for &(x, y) in &points {
                    if picks.hit_test_point(&mut tree, partition, x, y, true) {
                        hits += 1;
                    }
                }
                black_box(hits)
            });
        });

        group.bench_function(BenchmarkId::new("cached_box_bounds", side), |b| {
            let (mut tree, partition) = grid(side);
            let mut picks = PickGroup::new();
            b.iter(|| black_box(picks.box_bounds(&mut tree, partition, None, false, false)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_picking);
criterion_main!(benches);
