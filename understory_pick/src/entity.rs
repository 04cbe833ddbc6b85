// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pick entities: per-entity pickables, bounds and ray state.

use alloc::boxed::Box;

use glam::{DMat4, DVec3};
use hashbrown::HashMap;
use kurbo::Point;
use smallvec::SmallVec;
use understory_partition::{
    BoundingVolumeType, Box3, ContainerId, NodeId, PartitionTree, Plane3D, Sphere, VolumeShape,
};

use crate::group::{is_within, transform_stamp, volume_matrix};
use crate::volume::{VolumePool, VolumeStamp};
use crate::{BoundingVolume, PickGroup, Pickable, PickableRegistry, PickingCollision};

/// Picking state of one entity node.
///
/// Pickables are built from the container's content through the group's
/// [`PickableRegistry`] and rebuilt whenever the content generation moves.
#[derive(Debug)]
pub struct PickEntity {
    node: NodeId,
    container: ContainerId,
    /// Narrow-phase ray casts against this entity even when the picker does not ask for them.
    pub shape_flag: bool,
    pub(crate) collision: PickingCollision,
    content_generation: Option<u64>,
    pickables: SmallVec<[Box<dyn Pickable>; 2]>,
    oriented_boxes: [Option<Option<Box3>>; 2],
    oriented_spheres: [Option<Option<Sphere>>; 2],
    volumes: HashMap<BoundingVolumeType, VolumePool>,
    capacity: usize,
}

impl PickEntity {
    pub(crate) fn new(node: NodeId, container: ContainerId, capacity: usize) -> Self {
        Self {
            node,
            container,
            shape_flag: false,
            collision: PickingCollision::new(node, container),
            content_generation: None,
            pickables: SmallVec::new(),
            oriented_boxes: [None; 2],
            oriented_spheres: [None; 2],
            volumes: HashMap::new(),
            capacity,
        }
    }

    /// The entity node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The container behind the node.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// The collision record of the most recent ray cast.
    pub fn collision(&self) -> &PickingCollision {
        &self.collision
    }

    /// Number of pickables built from the content.
    pub fn pickable_count(&self) -> usize {
        self.pickables.len()
    }

    /// Forgets pickables and cached bounds.
    pub(crate) fn reset(&mut self) {
        self.content_generation = None;
        self.pickables.clear();
        self.oriented_boxes = [None; 2];
        self.oriented_spheres = [None; 2];
        self.volumes.clear();
    }

    pub(crate) fn refresh(&mut self, tree: &PartitionTree, registry: &PickableRegistry) {
        let generation = tree.content_generation(self.container);
        if self.content_generation == Some(generation) {
            return;
        }
        self.reset();
        self.content_generation = Some(generation);
        if let Some(content) = tree.content(self.container) {
            self.pickables = content.iter().filter_map(|t| registry.create(t)).collect();
        }
    }

    fn oriented_box(&mut self, stroke: bool) -> Option<Box3> {
        let slot = usize::from(stroke);
        if let Some(cached) = self.oriented_boxes[slot] {
            return cached;
        }
        let b = self.box_bounds_internal(None, stroke, false);
        self.oriented_boxes[slot] = Some(b);
        b
    }

    fn oriented_sphere(&mut self, stroke: bool) -> Option<Sphere> {
        let slot = usize::from(stroke);
        if let Some(cached) = self.oriented_spheres[slot] {
            return cached;
        }
        let s = self.sphere_bounds_internal(None, None, stroke, false);
        self.oriented_spheres[slot] = Some(s);
        s
    }

    /// Box of every pickable under `matrix`.
    ///
    /// The fast path transforms the cached local box instead of each pickable.
    pub(crate) fn box_bounds_internal(
        &mut self,
        matrix: Option<&DMat4>,
        stroke: bool,
        fast: bool,
    ) -> Option<Box3> {
        if fast {
            let local = self.oriented_box(stroke)?;
            return Some(match matrix {
                Some(m) => local.transform(m),
                None => local,
            });
        }
        self.pickables
            .iter()
            .fold(None, |acc, p| Box3::union_opt(acc, p.box_bounds(matrix, stroke)))
    }

    /// Sphere of every pickable under `matrix`, around `center` or the box center.
    pub(crate) fn sphere_bounds_internal(
        &mut self,
        center: Option<DVec3>,
        matrix: Option<&DMat4>,
        stroke: bool,
        fast: bool,
    ) -> Option<Sphere> {
        if fast {
            let local = self.oriented_sphere(stroke)?;
            return Some(match matrix {
                Some(m) => local.transform(m),
                None => local,
            });
        }
        let center = match center {
            Some(c) => c,
            None => self.box_bounds_internal(matrix, stroke, false)?.center(),
        };
        self.pickables
            .iter()
            .filter_map(|p| p.sphere_bounds(center, matrix, stroke))
            .reduce(|a, b| a.union(&b))
    }

    /// Narrow-phase test of the stored local ray against every pickable.
    ///
    /// Stops at the first hit unless `find_closest` is set.
    pub(crate) fn is_intersecting_shape(&mut self, find_closest: bool) -> bool {
        let mut hit = false;
        for (i, pickable) in self.pickables.iter().enumerate() {
            if pickable.test_collision(&mut self.collision, find_closest) {
                self.collision.element_index = Some(i);
                hit = true;
                if !find_closest {
                    break;
                }
            }
        }
        hit
    }

    fn hit_test_local(&self, local: Point) -> bool {
        self.pickables
            .iter()
            .any(|p| p.hit_test_point(local.x, local.y, 0.0))
    }
}

impl PickGroup {
    /// Bounding volume of an entity in `target`'s space.
    ///
    /// `target` defaults to the entity itself and `volume_type` to its
    /// container's default bounding volume. Volumes are cached until the
    /// content or a relevant transform changes.
    pub fn entity_volume(
        &mut self,
        tree: &mut PartitionTree,
        node: NodeId,
        target: Option<NodeId>,
        volume_type: Option<BoundingVolumeType>,
    ) -> BoundingVolume {
        let volume_type = volume_type
            .or_else(|| tree.node_props(node).map(|p| p.default_bounding_volume))
            .unwrap_or_default();
        if !self.ensure_entity(tree, node) || volume_type == BoundingVolumeType::Null {
            return BoundingVolume::empty(volume_type);
        }
        let target = target.unwrap_or(node);
        let Some(container) = tree.node_container(node) else {
            return BoundingVolume::empty(volume_type);
        };
        let stamp = VolumeStamp {
            bounds: tree.content_generation(container),
            transforms: transform_stamp(tree, node, target),
        };
        let Some(entity) = self.entities.get_mut(&node) else {
            return BoundingVolume::empty(volume_type);
        };
        let capacity = entity.capacity;
        if let Some(volume) = entity
            .volumes
            .entry(volume_type)
            .or_insert_with(|| VolumePool::new(capacity))
            .lookup(target, stamp)
        {
            return volume;
        }
        let matrix = volume_matrix(tree, node, target);
        let (stroke, fast) = (volume_type.stroke_flag(), volume_type.fast_flag());
        let volume = match volume_type.shape() {
            VolumeShape::Box => {
                BoundingVolume::Box(entity.box_bounds_internal(matrix.as_ref(), stroke, fast))
            }
            VolumeShape::Sphere => BoundingVolume::Sphere(entity.sphere_bounds_internal(
                None,
                matrix.as_ref(),
                stroke,
                fast,
            )),
            VolumeShape::Null => BoundingVolume::Null,
        };
        if let Some(pool) = entity.volumes.get_mut(&volume_type) {
            pool.store(target, stamp, volume);
        }
        volume
    }

    /// Box of the entity in `target`'s space.
    pub fn entity_box_bounds(
        &mut self,
        tree: &mut PartitionTree,
        node: NodeId,
        target: Option<NodeId>,
        stroke: bool,
        fast: bool,
    ) -> Option<Box3> {
        self.entity_volume(tree, node, target, Some(BoundingVolumeType::box_for(stroke, fast)))
            .as_box()
    }

    /// Sphere of the entity in `target`'s space.
    pub fn entity_sphere_bounds(
        &mut self,
        tree: &mut PartitionTree,
        node: NodeId,
        target: Option<NodeId>,
        stroke: bool,
        fast: bool,
    ) -> Option<Sphere> {
        let volume_type = BoundingVolumeType::sphere_for(stroke, fast);
        self.entity_volume(tree, node, target, Some(volume_type))
            .as_sphere()
    }

    /// Returns `true` if the entity's own volume is inside every plane.
    pub fn entity_is_in_frustum(
        &mut self,
        tree: &mut PartitionTree,
        node: NodeId,
        planes: &[Plane3D],
    ) -> bool {
        self.entity_volume(tree, node, None, None)
            .is_in_frustum(planes)
    }

    /// Point test of an entity against the scene point `(x, y)`.
    ///
    /// Without `shape_flag` the entity's box decides. With it, the point must
    /// also hit a pickable. Masked nodes are only tested as masks.
    pub fn entity_hit_test_point(
        &mut self,
        tree: &mut PartitionTree,
        node: NodeId,
        x: f64,
        y: f64,
        shape_flag: bool,
    ) -> bool {
        self.entity_hit_test_internal(tree, node, node, x, y, shape_flag, false)
    }

    pub(crate) fn entity_hit_test_internal(
        &mut self,
        tree: &mut PartitionTree,
        node: NodeId,
        root: NodeId,
        x: f64,
        y: f64,
        shape_flag: bool,
        mask_flag: bool,
    ) -> bool {
        if tree.mask_id(node).is_some() && (!mask_flag || !shape_flag) {
            return false;
        }
        if !self.ensure_entity(tree, node) {
            return false;
        }
        let local = tree.global_to_local(node, Point::new(x, y));
        let Some(bounds) = self.entity_box_bounds(tree, node, None, false, true) else {
            return false;
        };
        if !bounds.contains(local.x, local.y, 0.0) {
            return false;
        }
        let always_box = tree
            .node_props(node)
            .is_some_and(|p| p.asset_type.is_always_box());
        if shape_flag && !always_box {
            let hit = self
                .entities
                .get(&node)
                .is_some_and(|e| e.hit_test_local(local));
            if !hit {
                return false;
            }
        }
        self.masks_allow_point(tree, node, root, x, y)
    }

    /// Every mask owner of `node` within `root` must have a mask under the point.
    pub(crate) fn masks_allow_point(
        &mut self,
        tree: &mut PartitionTree,
        node: NodeId,
        root: NodeId,
        x: f64,
        y: f64,
    ) -> bool {
        let Some(owners) = tree.mask_owners(node) else {
            return true;
        };
        for owner in owners {
            if !is_within(tree, owner, root) {
                continue;
            }
            let mut covered = false;
            for mask in tree.masks(owner) {
                if !is_within(tree, mask, root) {
                    continue;
                }
                let Some(partition) = tree.partition_of(mask) else {
                    continue;
                };
                if self.bounds_hit_test_internal(tree, partition, root, x, y, true, true) {
                    covered = true;
                    break;
                }
            }
            if !covered {
                return false;
            }
        }
        true
    }

    /// Broad-phase ray test of an entity against a scene-space ray.
    ///
    /// Stores the local ray and entry distance in the entity's collision
    /// record. Mask owners within `root` must also be hit by the ray.
    pub(crate) fn entity_intersects_ray(
        &mut self,
        tree: &mut PartitionTree,
        node: NodeId,
        root: NodeId,
        origin: DVec3,
        direction: DVec3,
    ) -> bool {
        if !self.ensure_entity(tree, node) {
            return false;
        }
        let inverse = tree.inverse_matrix3d(node);
        let local_origin = inverse.transform_point3(origin);
        let local_direction = inverse.transform_vector3(direction);
        let Some(hit) = self
            .entity_volume(tree, node, None, None)
            .ray_intersection(local_origin, local_direction)
        else {
            return false;
        };
        if !self.masks_allow_ray(tree, node, root, origin, direction) {
            return false;
        }
        let Some(entity) = self.entities.get_mut(&node) else {
            return false;
        };
        let c = &mut entity.collision;
        c.ray_position = local_origin;
        c.ray_direction = local_direction;
        c.global_ray_position = origin;
        c.global_ray_direction = direction;
        c.normal = hit.normal;
        c.uv = None;
        c.element_index = None;
        c.ray_entry_distance = hit.distance;
        c.ray_origin_is_inside_bounds = hit.distance == 0.0;
        true
    }

    fn masks_allow_ray(
        &mut self,
        tree: &mut PartitionTree,
        node: NodeId,
        root: NodeId,
        origin: DVec3,
        direction: DVec3,
    ) -> bool {
        let Some(owners) = tree.mask_owners(node) else {
            return true;
        };
        for owner in owners {
            if !is_within(tree, owner, root) {
                continue;
            }
            let mut covered = false;
            for mask in tree.masks(owner) {
                if !is_within(tree, mask, root) {
                    continue;
                }
                let Some(partition) = tree.partition_of(mask) else {
                    continue;
                };
                if self
                    .mask_collision(tree, partition, origin, direction)
                    .is_some()
                {
                    covered = true;
                    break;
                }
            }
            if !covered {
                return false;
            }
        }
        true
    }
}
