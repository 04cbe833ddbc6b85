// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for hierarchical invalidation and world matrix refresh.

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use glam::DVec3;
use understory_partition::{
    ContainerId, ContainerProps, HierarchicalProperty, NodeId, PartitionTree,
};

/// Builds a tree `depth` levels deep with `fanout` children per container.
///
/// Returns the tree, the root node, and every leaf node.
fn build(depth: u32, fanout: u32) -> (PartitionTree, NodeId, Vec<NodeId>) {
    let mut tree = PartitionTree::new();
    let root = tree.create_container(ContainerProps::default());
    let mut level: Vec<ContainerId> = vec![root];
    for _ in 0..depth {
        let mut next = Vec::with_capacity(level.len() * fanout as usize);
        for &parent in &level {
            for i in 0..fanout {
                let child = tree.create_container(ContainerProps::at(f64::from(i), 1.0, 0.0));
                tree.add_child(parent, child).unwrap();
                next.push(child);
            }
        }
        level = next;
    }
    let view = tree.create_view();
    let root_node = tree.node(view, root).unwrap();
    let leaves: Vec<NodeId> = level
        .iter()
        .filter_map(|&c| tree.existing_node(view, c))
        .collect();
    (tree, root_node, leaves)
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("understory_partition");
    group.sample_size(50);

    for &(depth, fanout) in &[(4_u32, 4_u32), (6, 3), (12, 1)] {
        let label = format!("d{depth}_f{fanout}");

        group.bench_function(BenchmarkId::new("invalidate_transform", &label), |b| {
            b.iter_batched(
                || build(depth, fanout),
                |(mut tree, root, leaves)| {
                    for &leaf in &leaves {
                        tree.matrix3d(leaf);
                    }
                    tree.invalidate_hierarchical_property(
                        root,
                        HierarchicalProperty::SCENE_TRANSFORM,
                    );
                    black_box(tree.stats().propagation_visits);
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_function(BenchmarkId::new("refresh_leaf_matrices", &label), |b| {
            b.iter_batched(
                || build(depth, fanout),
                |(mut tree, root, leaves)| {
                    tree.invalidate_hierarchical_property(
                        root,
                        HierarchicalProperty::SCENE_TRANSFORM,
                    );
                    let mut sum = DVec3::ZERO;
                    for &leaf in &leaves {
                        sum += tree.position(leaf);
                    }
                    black_box(sum);
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_function(BenchmarkId::new("cached_leaf_matrices", &label), |b| {
            let (mut tree, _, leaves) = build(depth, fanout);
            for &leaf in &leaves {
                tree.matrix3d(leaf);
            }
            b.iter(|| {
                let mut sum = DVec3::ZERO;
                for &leaf in &leaves {
                    sum += tree.position(leaf);
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition);
criterion_main!(benches);
