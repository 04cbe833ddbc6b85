// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounds of whole partitions: volumes, point and overlap tests, and sizes.

use alloc::vec::Vec;

use glam::{DMat4, DVec3};
use hashbrown::HashMap;
use kurbo::Point;
use understory_partition::{
    BoundingVolumeType, Box3, NodeId, NodeRef, PartitionId, PartitionTraverser, PartitionTree,
    Plane3D, Sphere, VolumeShape,
};

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::group::{transform_stamp, volume_matrix};
use crate::volume::{VolumePool, VolumeStamp};
use crate::{BoundingVolume, PickGroup};

/// Something a partition's bounds are made of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundsChild {
    /// A nested partition, bounded by its own picker.
    Partition(PartitionId),
    /// An entity node.
    Entity(NodeId),
}

/// Bounds state of one partition.
///
/// The child list is rebuilt by traversal whenever the partition generation
/// moves on.
#[derive(Debug)]
pub struct BoundsPicker {
    partition: PartitionId,
    root: NodeId,
    children: Vec<BoundsChild>,
    traversed: Option<u64>,
    volumes: HashMap<BoundingVolumeType, VolumePool>,
}

impl BoundsPicker {
    pub(crate) fn new(partition: PartitionId, root: NodeId) -> Self {
        Self {
            partition,
            root,
            children: Vec::new(),
            traversed: None,
            volumes: HashMap::new(),
        }
    }

    /// The partition this picker bounds.
    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Root node of the partition.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Entities and nested partitions found by the last traversal.
    pub fn children(&self) -> &[BoundsChild] {
        &self.children
    }

    pub(crate) fn reset(&mut self) {
        self.traversed = None;
        self.volumes.clear();
    }
}

struct BoundsPass {
    partition: PartitionId,
    children: Vec<BoundsChild>,
}

impl PartitionTraverser for BoundsPass {
    fn partition(&self) -> PartitionId {
        self.partition
    }

    fn enter_partition(&mut self, _: &mut PartitionTree, partition: PartitionId) -> bool {
        self.children.push(BoundsChild::Partition(partition));
        false
    }

    fn enter_node(&mut self, _: &mut PartitionTree, _: NodeRef) -> bool {
        true
    }

    fn apply_entity(&mut self, _: &mut PartitionTree, node: NodeId) {
        self.children.push(BoundsChild::Entity(node));
    }
}

/// `matrix` extended by `node`'s transform relative to `root`.
fn child_matrix(
    tree: &mut PartitionTree,
    root: NodeId,
    node: NodeId,
    matrix: Option<DMat4>,
) -> Option<DMat4> {
    if node == root {
        return matrix;
    }
    // A clean world matrix lets later edits above the child invalidate it.
    tree.matrix3d(node);
    let relative = volume_matrix(tree, node, root).unwrap_or(DMat4::IDENTITY);
    Some(match matrix {
        Some(m) => m * relative,
        None => relative,
    })
}

impl PickGroup {
    /// Traverses the partition again if it changed since the last traversal.
    fn ensure_bounds(&mut self, tree: &mut PartitionTree, partition: PartitionId) -> Option<NodeId> {
        let picker = self.bounds_picker(tree, partition)?;
        let generation = tree.partition_generation(partition);
        if picker.traversed == Some(generation) && !tree.is_partition_invalid(partition) {
            return Some(picker.root);
        }
        let mut pass = BoundsPass {
            partition,
            children: Vec::new(),
        };
        tree.traverse(partition, &mut pass);
        log::trace!(
            "bounds of {partition:?} rebuilt from {} children",
            pass.children.len()
        );
        picker.children = pass.children;
        picker.traversed = Some(tree.partition_generation(partition));
        Some(picker.root)
    }

    fn bounds_children(&self, partition: PartitionId) -> Vec<BoundsChild> {
        self.bounds
            .get(&partition)
            .map(|p| p.children.clone())
            .unwrap_or_default()
    }

    fn bounds_box_internal(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        matrix: Option<DMat4>,
        stroke: bool,
        fast: bool,
    ) -> Option<Box3> {
        let root = self.ensure_bounds(tree, partition)?;
        let mut out = None;
        for child in self.bounds_children(partition) {
            let b = match child {
                BoundsChild::Entity(node) => {
                    let m = child_matrix(tree, root, node, matrix);
                    if !self.ensure_entity(tree, node) {
                        continue;
                    }
                    self.entities
                        .get_mut(&node)
                        .and_then(|e| e.box_bounds_internal(m.as_ref(), stroke, fast))
                }
                BoundsChild::Partition(nested) => {
                    let Some(nested_root) = tree.partition_root(nested) else {
                        continue;
                    };
                    let m = child_matrix(tree, root, nested_root, matrix);
                    self.bounds_box_internal(tree, nested, m, stroke, fast)
                }
            };
            out = Box3::union_opt(out, b);
        }
        out
    }

    fn bounds_sphere_internal(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        center: Option<DVec3>,
        matrix: Option<DMat4>,
        stroke: bool,
        fast: bool,
    ) -> Option<Sphere> {
        let center = match center {
            Some(c) => c,
            None => self
                .bounds_box_internal(tree, partition, matrix, stroke, fast)?
                .center(),
        };
        let root = self.ensure_bounds(tree, partition)?;
        let mut out: Option<Sphere> = None;
        for child in self.bounds_children(partition) {
            let s = match child {
                BoundsChild::Entity(node) => {
                    let m = child_matrix(tree, root, node, matrix);
                    if !self.ensure_entity(tree, node) {
                        continue;
                    }
                    self.entities.get_mut(&node).and_then(|e| {
                        e.sphere_bounds_internal(Some(center), m.as_ref(), stroke, fast)
                    })
                }
                BoundsChild::Partition(nested) => {
                    let Some(nested_root) = tree.partition_root(nested) else {
                        continue;
                    };
                    let m = child_matrix(tree, root, nested_root, matrix);
                    self.bounds_sphere_internal(tree, nested, Some(center), m, stroke, fast)
                }
            };
            out = match (out, s) {
                (Some(a), Some(b)) => Some(a.union(&b)),
                (a, b) => a.or(b),
            };
        }
        out
    }

    /// Bounding volume of a whole partition in `target`'s space.
    ///
    /// `target` defaults to the partition root and `volume_type` to the root
    /// container's default bounding volume. Volumes are cached per target until
    /// the partition generation or a relevant transform generation moves.
    pub fn bounding_volume(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        target: Option<NodeId>,
        volume_type: Option<BoundingVolumeType>,
    ) -> BoundingVolume {
        let Some(root) = self.ensure_bounds(tree, partition) else {
            return BoundingVolume::empty(volume_type.unwrap_or_default());
        };
        let volume_type = volume_type
            .or_else(|| tree.node_props(root).map(|p| p.default_bounding_volume))
            .unwrap_or_default();
        if volume_type == BoundingVolumeType::Null {
            return BoundingVolume::Null;
        }
        let target = target.unwrap_or(root);
        let stamp = VolumeStamp {
            bounds: tree.partition_generation(partition),
            transforms: transform_stamp(tree, root, target),
        };
        let capacity = self.config.volume_cache_capacity;
        let cached = self.bounds.get_mut(&partition).and_then(|p| {
            p.volumes
                .entry(volume_type)
                .or_insert_with(|| VolumePool::new(capacity))
                .lookup(target, stamp)
        });
        if let Some(volume) = cached {
            return volume;
        }
        let matrix = volume_matrix(tree, root, target);
        let (stroke, fast) = (volume_type.stroke_flag(), volume_type.fast_flag());
        let volume = match volume_type.shape() {
            VolumeShape::Box => {
                BoundingVolume::Box(self.bounds_box_internal(tree, partition, matrix, stroke, fast))
            }
            VolumeShape::Sphere => BoundingVolume::Sphere(
                self.bounds_sphere_internal(tree, partition, None, matrix, stroke, fast),
            ),
            VolumeShape::Null => BoundingVolume::Null,
        };
        if let Some(pool) = self
            .bounds
            .get_mut(&partition)
            .and_then(|p| p.volumes.get_mut(&volume_type))
        {
            pool.store(target, stamp, volume);
        }
        volume
    }

    /// Box of the partition in `target`'s space.
    pub fn box_bounds(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        target: Option<NodeId>,
        stroke: bool,
        fast: bool,
    ) -> Option<Box3> {
        let volume_type = BoundingVolumeType::box_for(stroke, fast);
        self.bounding_volume(tree, partition, target, Some(volume_type))
            .as_box()
    }

    /// Sphere of the partition in `target`'s space.
    pub fn sphere_bounds(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        target: Option<NodeId>,
        stroke: bool,
        fast: bool,
    ) -> Option<Sphere> {
        let volume_type = BoundingVolumeType::sphere_for(stroke, fast);
        self.bounding_volume(tree, partition, target, Some(volume_type))
            .as_sphere()
    }

    /// Returns `true` if the partition's own volume is inside every plane.
    pub fn is_in_frustum(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        planes: &[Plane3D],
    ) -> bool {
        self.bounding_volume(tree, partition, None, None)
            .is_in_frustum(planes)
    }

    /// Tests the scene point `(x, y)` against the partition.
    ///
    /// Without `shape_flag` the partition box decides; with it, some entity
    /// below must hit with its pickables.
    ///
    /// Both modes are gated by masks: a point inside the box still misses
    /// when the root's mask owners do not cover it, so a masked root is never
    /// reported as hit outside its masks even in box mode.
    pub fn hit_test_point(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        x: f64,
        y: f64,
        shape_flag: bool,
    ) -> bool {
        let Some(root) = tree.partition_root(partition) else {
            return false;
        };
        self.bounds_hit_test_internal(tree, partition, root, x, y, shape_flag, false)
    }

    pub(crate) fn bounds_hit_test_internal(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        root: NodeId,
        x: f64,
        y: f64,
        shape_flag: bool,
        mask_flag: bool,
    ) -> bool {
        let Some(node) = self.ensure_bounds(tree, partition) else {
            return false;
        };
        if tree.mask_id(node).is_some() && (!mask_flag || !shape_flag) {
            return false;
        }
        let local = tree.global_to_local(node, Point::new(x, y));
        let Some(bounds) = self.box_bounds(tree, partition, None, false, true) else {
            return false;
        };
        if !bounds.contains(local.x, local.y, 0.0) {
            return false;
        }
        let always_box = tree
            .node_props(node)
            .is_some_and(|p| p.asset_type.is_always_box());
        if !shape_flag || always_box {
            return self.masks_allow_point(tree, node, root, x, y);
        }
        for child in self.bounds_children(partition) {
            let hit = match child {
                BoundsChild::Entity(e) => {
                    self.entity_hit_test_internal(tree, e, root, x, y, shape_flag, mask_flag)
                }
                BoundsChild::Partition(nested) => self
                    .bounds_hit_test_internal(tree, nested, root, x, y, shape_flag, mask_flag),
            };
            if hit {
                return true;
            }
        }
        false
    }

    /// Returns `true` if the stroke-inclusive boxes of both partitions overlap.
    ///
    /// Cached boxes are compared first; exact boxes only when those overlap.
    pub fn hit_test_object(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        other: PartitionId,
    ) -> bool {
        let Some(root) = self.ensure_bounds(tree, partition) else {
            return false;
        };
        let overlap = |group: &mut Self, tree: &mut PartitionTree, fast: bool| {
            let own = group.box_bounds(tree, partition, None, true, fast);
            let theirs = group.box_bounds(tree, other, Some(root), true, fast);
            matches!((own, theirs), (Some(a), Some(b)) if a.intersects(&b))
        };
        overlap(self, tree, true) && overlap(self, tree, false)
    }

    /// Box of the partition in its root's parent space.
    fn parent_space_box(&mut self, tree: &mut PartitionTree, partition: PartitionId) -> Option<Box3> {
        let root = tree.partition_root(partition)?;
        let own = self.box_bounds(tree, partition, None, false, false)?;
        Some(own.transform(&tree.local_matrix(root)))
    }

    /// Width of the partition in its root's parent space.
    pub fn width(&mut self, tree: &mut PartitionTree, partition: PartitionId) -> f64 {
        self.parent_space_box(tree, partition)
            .map_or(0.0, |b| b.size().x)
    }

    /// Height of the partition in its root's parent space.
    pub fn height(&mut self, tree: &mut PartitionTree, partition: PartitionId) -> f64 {
        self.parent_space_box(tree, partition)
            .map_or(0.0, |b| b.size().y)
    }

    /// Depth of the partition in its root's parent space.
    pub fn depth(&mut self, tree: &mut PartitionTree, partition: PartitionId) -> f64 {
        self.parent_space_box(tree, partition)
            .map_or(0.0, |b| b.size().z)
    }

    /// Scales the root container so the partition is `width` wide.
    pub fn set_width(&mut self, tree: &mut PartitionTree, partition: PartitionId, width: f64) {
        self.set_extent(tree, partition, 0, width);
    }

    /// Scales the root container so the partition is `height` high.
    pub fn set_height(&mut self, tree: &mut PartitionTree, partition: PartitionId, height: f64) {
        self.set_extent(tree, partition, 1, height);
    }

    /// Scales the root container so the partition is `depth` deep.
    pub fn set_depth(&mut self, tree: &mut PartitionTree, partition: PartitionId, depth: f64) {
        self.set_extent(tree, partition, 2, depth);
    }

    fn set_extent(&mut self, tree: &mut PartitionTree, partition: PartitionId, axis: usize, value: f64) {
        let Some(root) = tree.partition_root(partition) else {
            return;
        };
        let (Some(container), Some(current)) = (
            tree.node_container(root),
            self.parent_space_box(tree, partition).map(|b| b.size()[axis]),
        ) else {
            return;
        };
        if current == 0.0 {
            log::debug!("cannot resize flat axis {axis} of {partition:?}");
            return;
        }
        let Some(transform) = tree.container_props(container).map(|p| p.transform) else {
            return;
        };
        let minimal = self.config.minimal_scale;
        let factor = value / current;
        let (scale, rotation, translation) = transform.to_scale_rotation_translation();
        let unrotated = (rotation.w.abs() - 1.0).abs() < 1e-12;
        let scale = if unrotated {
            let mut s = scale;
            s[axis] *= factor;
            if s[axis] == 0.0 {
                s[axis] = minimal;
            }
            s
        } else {
            let mut f = DVec3::ONE;
            f[axis] = if factor == 0.0 { minimal } else { factor };
            (DMat4::from_scale(f) * transform)
                .to_scale_rotation_translation()
                .0
        };
        tree.set_transform(
            container,
            DMat4::from_scale_rotation_translation(scale, rotation, translation),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Rect;
    use understory_partition::{ContainerId, ContainerProps, PartitionKind, Traversable};

    fn quad(tree: &mut PartitionTree, x: f64, y: f64, size: f64) -> ContainerId {
        tree.create_entity(
            ContainerProps::at(x, y, 0.0),
            alloc::vec![Traversable::Quad(Rect::new(0.0, 0.0, size, size))],
        )
    }

    fn scene(tree: &mut PartitionTree, children: &[ContainerId]) -> (ContainerId, PartitionId) {
        let root = tree.create_container(ContainerProps::default());
        for &c in children {
            tree.add_child(root, c).unwrap();
        }
        let view = tree.create_view();
        let rn = tree.node(view, root).unwrap();
        (root, tree.partition_of(rn).unwrap())
    }

    #[test]
    fn partition_box_unions_children() {
        let mut tree = PartitionTree::new();
        let a = quad(&mut tree, 0.0, 0.0, 10.0);
        let b = quad(&mut tree, 20.0, 5.0, 10.0);
        let (_, p) = scene(&mut tree, &[a, b]);
        let mut group = PickGroup::new();
        let bounds = group.box_bounds(&mut tree, p, None, false, false).unwrap();
        assert_eq!(bounds.min, DVec3::ZERO);
        assert_eq!(bounds.max, DVec3::new(30.0, 15.0, 0.0));
        assert_eq!(group.box_bounds(&mut tree, p, None, false, true), Some(bounds));
    }

    #[test]
    fn moving_a_child_refreshes_the_cached_box() {
        let mut tree = PartitionTree::new();
        let a = quad(&mut tree, 0.0, 0.0, 10.0);
        let (_, p) = scene(&mut tree, &[a]);
        let mut group = PickGroup::new();
        assert_eq!(group.width(&mut tree, p), 10.0);
        tree.set_transform(a, DMat4::from_translation(DVec3::new(5.0, 0.0, 0.0)));
        let bounds = group.box_bounds(&mut tree, p, None, false, false).unwrap();
        assert_eq!(bounds.min.x, 5.0);
    }

    #[test]
    fn nested_partitions_contribute() {
        let mut tree = PartitionTree::new();
        let inner = tree.create_container(ContainerProps {
            partition_kind: Some(PartitionKind::Basic),
            ..ContainerProps::at(100.0, 0.0, 0.0)
        });
        let leaf = quad(&mut tree, 0.0, 0.0, 10.0);
        tree.add_child(inner, leaf).unwrap();
        let (_, p) = scene(&mut tree, &[inner]);
        let mut group = PickGroup::new();
        let bounds = group.box_bounds(&mut tree, p, None, false, false).unwrap();
        assert_eq!(bounds.min.x, 100.0);
        assert_eq!(bounds.max.x, 110.0);
        assert!(group
            .bounds_picker(&tree, p)
            .unwrap()
            .children()
            .iter()
            .any(|c| matches!(c, BoundsChild::Partition(_))));
    }

    #[test]
    fn point_tests_with_and_without_shapes() {
        let mut tree = PartitionTree::new();
        let mut ring = kurbo::BezPath::new();
        ring.move_to((0.0, 0.0));
        ring.line_to((10.0, 0.0));
        ring.line_to((10.0, 10.0));
        ring.line_to((0.0, 10.0));
        ring.close_path();
        let outline = tree.create_entity(
            ContainerProps::default(),
            alloc::vec![Traversable::Shape {
                path: ring,
                fill: false,
                stroke_width: 2.0,
            }],
        );
        let (_, p) = scene(&mut tree, &[outline]);
        let mut group = PickGroup::new();
        assert!(group.hit_test_point(&mut tree, p, 5.0, 5.0, false));
        assert!(!group.hit_test_point(&mut tree, p, 5.0, 5.0, true));
        assert!(group.hit_test_point(&mut tree, p, 0.5, 5.0, true));
        assert!(!group.hit_test_point(&mut tree, p, 50.0, 5.0, false));
    }

    #[test]
    fn overlapping_partitions() {
        let mut tree = PartitionTree::new();
        let kind = ContainerProps {
            partition_kind: Some(PartitionKind::Basic),
            ..ContainerProps::default()
        };
        let a = tree.create_container(kind.clone());
        let b = tree.create_container(kind);
        let qa = quad(&mut tree, 0.0, 0.0, 10.0);
        let qb = quad(&mut tree, 5.0, 5.0, 10.0);
        tree.add_child(a, qa).unwrap();
        tree.add_child(b, qb).unwrap();
        let (_, root_p) = scene(&mut tree, &[a, b]);
        let view = tree.node_view(tree.partition_root(root_p).unwrap()).unwrap();
        let pa = tree.partition_of(tree.existing_node(view, a).unwrap()).unwrap();
        let pb = tree.partition_of(tree.existing_node(view, b).unwrap()).unwrap();
        let mut group = PickGroup::new();
        assert!(group.hit_test_object(&mut tree, pa, pb));
        tree.set_transform(b, DMat4::from_translation(DVec3::new(50.0, 0.0, 0.0)));
        assert!(!group.hit_test_object(&mut tree, pa, pb));
    }

    #[test]
    fn resizing_scales_the_root() {
        let mut tree = PartitionTree::new();
        let holder = tree.create_container(ContainerProps::default());
        let q = quad(&mut tree, 0.0, 0.0, 10.0);
        tree.add_child(holder, q).unwrap();
        let view = tree.create_view();
        let hn = tree.node(view, holder).unwrap();
        let p = tree.partition_of(hn).unwrap();
        let mut group = PickGroup::new();
        group.set_width(&mut tree, p, 40.0);
        assert!((group.width(&mut tree, p) - 40.0).abs() < 1e-9);
        assert!((group.height(&mut tree, p) - 10.0).abs() < 1e-9);

        group.set_height(&mut tree, p, 0.0);
        let scale = tree
            .container_props(holder)
            .unwrap()
            .transform
            .to_scale_rotation_translation()
            .0;
        assert!((scale.y - 0.00001).abs() < 1e-12);
        // Flat content has no depth to scale.
        group.set_depth(&mut tree, p, 5.0);
        assert_eq!(group.depth(&mut tree, p), 0.0);
    }

    #[test]
    fn frustum_and_sphere() {
        let mut tree = PartitionTree::new();
        let a = quad(&mut tree, 0.0, 0.0, 10.0);
        let (_, p) = scene(&mut tree, &[a]);
        let mut group = PickGroup::new();
        let s = group.sphere_bounds(&mut tree, p, None, false, false).unwrap();
        assert_eq!(s.center, DVec3::new(5.0, 5.0, 0.0));
        let ahead = Plane3D::new(0.0, 0.0, 1.0, -1.0);
        let behind = Plane3D::new(0.0, 0.0, 1.0, 1.0);
        assert!(group.is_in_frustum(&mut tree, p, &[ahead]));
        assert!(!group.is_in_frustum(&mut tree, p, &[behind]));
    }
}
