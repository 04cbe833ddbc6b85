// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Pick: picking over [`understory_partition`] scenes.
//!
//! A [`PickGroup`] owns three kinds of pickers, each created on demand for the
//! partition it is asked about:
//!
//! - [`RaycastPicker`]: casts scene-space rays front to back, with a bounds
//!   broad phase and an optional shape narrow phase.
//! - [`BoundsPicker`]: bounding volumes of whole partitions, point and overlap
//!   tests, and size getters and setters.
//! - [`TabPicker`]: tab order over focusable entities.
//!
//! Entity nodes get a [`PickEntity`] holding their [`Pickable`]s, built from
//! the container content by a [`PickableRegistry`], along with cached bounds
//! and the [`PickingCollision`] of the latest cast.
//!
//! Nested partitions are handed to their own pickers, and masks are tested
//! through the pickers of the mask partitions, so a single query may touch
//! many pickers. All of them live in the group; every query takes the
//! [`PartitionTree`](understory_partition::PartitionTree) explicitly.
//!
//! Bounding volumes are cached per owner, volume type and target node, and
//! checked against generation counters of the partition tree, so edits never
//! need to notify the pickers.
//!
//! ## Example
//!
//! ```rust
//! use understory_partition::glam::DVec3;
//! use understory_partition::{Box3, ContainerProps, PartitionTree, Traversable};
//! use understory_pick::PickGroup;
//!
//! let mut tree = PartitionTree::new();
//! let root = tree.create_container(ContainerProps::default());
//! let cube = tree.create_entity(
//!     ContainerProps::default(),
//!     vec![Traversable::Solid(Box3::new(DVec3::ZERO, DVec3::splat(10.0)))],
//! );
//! tree.add_child(root, cube).unwrap();
//! let view = tree.create_view();
//! let root_node = tree.node(view, root).unwrap();
//! let partition = tree.partition_of(root_node).unwrap();
//!
//! let mut picks = PickGroup::new();
//! let hit = picks
//!     .get_collision(&mut tree, partition, DVec3::new(5.0, 5.0, -10.0), DVec3::Z, false, None)
//!     .unwrap();
//! assert_eq!(hit.container, cube);
//! assert_eq!(hit.position, DVec3::new(5.0, 5.0, 0.0));
//!
//! assert!(picks.hit_test_point(&mut tree, partition, 5.0, 5.0, true));
//! assert_eq!(picks.width(&mut tree, partition), 10.0);
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod bounds;
mod collision;
mod entity;
mod group;
mod pickable;
mod raycast;
mod tab;
mod volume;

pub use bounds::{BoundsChild, BoundsPicker};
pub use collision::PickingCollision;
pub use entity::PickEntity;
pub use group::{PickConfig, PickGroup};
pub use pickable::{
    Pickable, PickableFactory, PickableRegistry, QuadPickable, ShapePickable, SolidPickable,
};
pub use raycast::{RaycastPicker, Unproject};
pub use tab::TabPicker;
pub use volume::BoundingVolume;
