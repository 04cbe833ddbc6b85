// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Partition: scene containers, per-view node pools, and nested partitions.
//!
//! The crate keeps two layers apart:
//!
//! - Containers are the scene: a hierarchy of plain records with transforms,
//!   visibility, color, masking and optional entity content. They are edited
//!   through [`PartitionTree`] setters.
//! - Nodes are per-view abstractions of containers. Every view owns a pool of
//!   nodes, at most one per container, created on demand by
//!   [`PartitionTree::node`]. Nodes cache hierarchical state (world matrix,
//!   concatenated color transform, inherited visibility, mask ids, mask owner
//!   chains) and recompute it lazily.
//!
//! Container edits fan out to every node of the container as invalidations of
//! [`HierarchicalProperty`] bits. A bit propagates down only while it is newly
//! dirty, so repeated invalidations of the same subtree are cheap.
//!
//! ## Partitions
//!
//! Nodes are grouped into partitions. A view root starts a partition, and so
//! does any container with [`ContainerProps::partition_kind`] set; everything
//! else shares its parent's partition. Partitions nest, and invalidating one
//! marks every enclosing partition invalid and bumps its
//! [generation](PartitionTree::partition_generation). Entity nodes wait in
//! their partition's update queue until a traversal flushes it.
//!
//! Traversal is visitor based: implement [`PartitionTraverser`] and hand it to
//! [`PartitionTree::traverse`]. Crossing into a nested partition asks the
//! traverser whether to continue or delegate.
//!
//! ## Example
//!
//! ```rust
//! use understory_partition::{ContainerProps, HierarchicalProperty, PartitionTree};
//!
//! let mut tree = PartitionTree::new();
//! let root = tree.create_container(ContainerProps::default());
//! let child = tree.create_container(ContainerProps::default());
//! tree.add_child(root, child).unwrap();
//!
//! let view = tree.create_view();
//! let root_node = tree.node(view, root).unwrap();
//! let child_node = tree.existing_node(view, child).unwrap();
//!
//! tree.set_visible(root, false);
//! assert!(tree.is_invisible(child_node));
//!
//! // Queries clean the bits they read; further invalidations only touch
//! // nodes whose bits were clean.
//! assert!(!tree.dirty(child_node).contains(HierarchicalProperty::VISIBLE));
//! let before = tree.stats().propagation_visits;
//! tree.invalidate_hierarchical_property(root_node, HierarchicalProperty::VISIBLE);
//! tree.invalidate_hierarchical_property(root_node, HierarchicalProperty::VISIBLE);
//! assert_eq!(tree.stats().propagation_visits, before + 2);
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod color;
mod error;
mod events;
mod flags;
mod geom;
mod id;
mod node;
mod partition;
mod props;
mod slab;
mod traverse;
mod tree;

pub use color::ColorTransform;
pub use error::SceneError;
pub use events::{NodeEvent, PartitionStats};
pub use flags::HierarchicalProperty;
pub use geom::{Box3, Plane3D, PlaneClassification, RayHit, Sphere};
pub use id::{ContainerId, NodeId, PartitionId, ViewId};
pub use node::{EntityNode, MaskOwners};
pub use props::{
    AlignmentMode, AssetType, BlendMode, BoundingVolumeType, ContainerController,
    ContainerProps, EntityContent, OrientationMode, PartitionKind, Traversable, TraversableKind,
    VolumeShape,
};
pub use traverse::{NodeRef, PartitionTraverser, TraversalOrder};
pub use tree::{PartitionConfig, PartitionTree};

pub use glam;
pub use kurbo;
