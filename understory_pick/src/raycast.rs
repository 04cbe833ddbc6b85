// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ray casts through partitions.
//!
//! A cast runs in two phases. The broad phase traverses the partition front to
//! back, testing each entity's bounding volume and handing nested partitions
//! to their own pickers. The narrow phase sorts the surviving entities by
//! bounds entry distance and, where shape picking is on, tests their
//! pickables.

use alloc::vec::Vec;

use glam::DVec3;
use hashbrown::HashSet;
use understory_partition::{
    ContainerId, NodeId, NodeRef, PartitionId, PartitionTraverser, PartitionTree, TraversalOrder,
};

use crate::{PickGroup, PickingCollision};

/// Maps view coordinates to scene space.
///
/// `z` is a normalized depth: `0.0` on the near plane, `1.0` on the far plane.
pub trait Unproject {
    /// Scene-space point under the view point `(x, y)` at depth `z`.
    fn unproject(&self, x: f64, y: f64, z: f64) -> DVec3;
}

impl<F: Fn(f64, f64, f64) -> DVec3> Unproject for F {
    fn unproject(&self, x: f64, y: f64, z: f64) -> DVec3 {
        self(x, y, z)
    }
}

/// Ray cast state of one partition.
#[derive(Clone, Debug)]
pub struct RaycastPicker {
    partition: PartitionId,
    root: NodeId,
    /// Narrow-phase test every candidate, not only entities with their own shape flag.
    pub shape_flag: bool,
    /// Test every pickable of a candidate instead of stopping at the first hit.
    pub find_closest_collision: bool,
    drag_node: Option<NodeId>,
    ignored: HashSet<ContainerId>,
    effective_shape_flag: bool,
    entities: Vec<NodeId>,
    pickers: Vec<PartitionId>,
}

impl RaycastPicker {
    pub(crate) fn new(partition: PartitionId, root: NodeId, find_closest: bool) -> Self {
        Self {
            partition,
            root,
            shape_flag: false,
            find_closest_collision: find_closest,
            drag_node: None,
            ignored: HashSet::new(),
            effective_shape_flag: false,
            entities: Vec::new(),
            pickers: Vec::new(),
        }
    }

    /// The partition this picker casts through.
    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Root node of the partition.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node currently being dragged, if any.
    pub fn drag_node(&self) -> Option<NodeId> {
        self.drag_node
    }

    /// Entities whose containers are skipped by every cast.
    pub fn ignored(&self) -> &HashSet<ContainerId> {
        &self.ignored
    }

    /// Replaces the ignore list.
    pub fn set_ignore_list(&mut self, containers: impl IntoIterator<Item = ContainerId>) {
        self.ignored = containers.into_iter().collect();
    }

    /// Entity nodes the last broad phase collected in this partition.
    pub fn candidates(&self) -> &[NodeId] {
        &self.entities
    }

    /// Nested partitions the last broad phase reported hits in.
    pub fn nested_hits(&self) -> &[PartitionId] {
        &self.pickers
    }
}

/// One broad-phase traversal.
struct RayPass<'a> {
    group: &'a mut PickGroup,
    partition: PartitionId,
    root: NodeId,
    origin: DVec3,
    direction: DVec3,
    shape_flag: bool,
    ignored: &'a HashSet<ContainerId>,
    entities: Vec<NodeId>,
    pickers: Vec<PartitionId>,
}

impl PartitionTraverser for RayPass<'_> {
    fn partition(&self) -> PartitionId {
        self.partition
    }

    fn enter_partition(&mut self, tree: &mut PartitionTree, partition: PartitionId) -> bool {
        let Some(nested_root) = tree.partition_root(partition) else {
            return true;
        };
        if tree.is_mouse_disabled(nested_root) && !tree.is_drag_entity(nested_root) {
            return true;
        }
        if self.group.cast(
            tree,
            partition,
            self.root,
            self.origin,
            self.direction,
            self.shape_flag,
        ) {
            self.pickers.push(partition);
        }
        false
    }

    fn enter_node(&mut self, tree: &mut PartitionTree, node: NodeRef) -> bool {
        let n = node.node();
        if tree.is_invisible(n) || tree.mask_id(n) != tree.mask_id(self.root) {
            return false;
        }
        match node {
            NodeRef::Container(_) => {
                if let Some(pick_object) = tree.pick_object_node(n) {
                    if let Some(partition) = tree.partition_of(pick_object) {
                        tree.traverse(partition, self);
                    }
                    return false;
                }
                true
            }
            NodeRef::Entity(_) => {
                self.group
                    .entity_intersects_ray(tree, n, self.root, self.origin, self.direction)
            }
        }
    }

    fn apply_entity(&mut self, tree: &mut PartitionTree, node: NodeId) {
        let ignored = tree
            .node_container(node)
            .is_some_and(|c| self.ignored.contains(&c));
        if !ignored {
            self.entities.push(node);
        }
    }

    fn order(&self) -> TraversalOrder {
        TraversalOrder::FrontToBack
    }
}

impl PickGroup {
    /// Broad phase for `partition`, testing masks against `root`.
    ///
    /// Returns `true` if any entity or nested partition was hit.
    pub(crate) fn cast(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        root: NodeId,
        origin: DVec3,
        direction: DVec3,
        shape_flag: bool,
    ) -> bool {
        let Some(mut picker) = self.take_raycast(tree, partition) else {
            return false;
        };
        let shape_flag = picker.shape_flag || shape_flag;
        let mut pass = RayPass {
            group: self,
            partition,
            root,
            origin,
            direction,
            shape_flag,
            ignored: &picker.ignored,
            entities: Vec::new(),
            pickers: Vec::new(),
        };
        tree.traverse(partition, &mut pass);
        let (entities, pickers) = (pass.entities, pass.pickers);
        picker.entities = entities;
        picker.pickers = pickers;
        picker.effective_shape_flag = shape_flag;
        let hit = !(picker.entities.is_empty() && picker.pickers.is_empty());
        self.put_raycast(picker);
        hit
    }

    /// Casts the scene-space ray `origin + t * direction` through `partition`.
    ///
    /// Candidates are ordered by bounds entry distance. Without shape picking
    /// the nearest candidate whose bounds do not contain the ray origin wins.
    /// With it, candidates are tested against their pickables until the next
    /// candidate's bounds start beyond the best hit so far. `starting` seeds
    /// the best hit, for casts continuing from another scene. A ray that misses
    /// every bound in `partition` yields `None`, seed or not.
    pub fn get_collision(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        origin: DVec3,
        direction: DVec3,
        shape_flag: bool,
        starting: Option<PickingCollision>,
    ) -> Option<PickingCollision> {
        let root = tree.partition_root(partition)?;
        if !self.cast(tree, partition, root, origin, direction, shape_flag) {
            return None;
        }
        let drag = self.raycast.get(&partition).and_then(|p| p.drag_node);
        let mut candidates = Vec::new();
        self.collect_entities(partition, drag, &mut candidates);
        self.nearest_collision(partition, candidates, starting)
    }

    /// Casts through `partition` from the view point `(x, y)`.
    ///
    /// The ray runs from the near plane to the far plane under the point.
    pub fn get_view_collision(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        view: &impl Unproject,
        x: f64,
        y: f64,
        shape_flag: bool,
        starting: Option<PickingCollision>,
    ) -> Option<PickingCollision> {
        let near = view.unproject(x, y, 0.0);
        let far = view.unproject(x, y, 1.0);
        self.get_collision(tree, partition, near, far - near, shape_flag, starting)
    }

    /// Containers of every entity whose pickables the ray hits, front to back.
    pub fn get_objects_under_point(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        origin: DVec3,
        direction: DVec3,
    ) -> Vec<ContainerId> {
        let Some(root) = tree.partition_root(partition) else {
            return Vec::new();
        };
        if !self.cast(tree, partition, root, origin, direction, true) {
            return Vec::new();
        }
        let drag = self.raycast.get(&partition).and_then(|p| p.drag_node);
        let mut candidates = Vec::new();
        self.collect_entities(partition, drag, &mut candidates);
        let mut out = Vec::new();
        for node in candidates {
            let Some(entity) = self.entities.get_mut(&node) else {
                continue;
            };
            entity.collision.ray_entry_distance = f64::MAX;
            if entity.is_intersecting_shape(false) {
                out.push(entity.container());
            }
        }
        out
    }

    /// Shape cast used to decide whether a mask covers a ray.
    pub(crate) fn mask_collision(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        origin: DVec3,
        direction: DVec3,
    ) -> Option<PickingCollision> {
        self.get_collision(tree, partition, origin, direction, true, None)
    }

    /// Sets the node being dragged through `partition`.
    ///
    /// The dragged node's partition is skipped when collecting hits, so the
    /// cast reports what lies beneath it.
    pub fn set_drag_node(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        node: Option<NodeId>,
    ) {
        let Some(picker) = self.raycast_picker(tree, partition) else {
            return;
        };
        let old = picker.drag_node;
        if old == node {
            return;
        }
        picker.drag_node = node;
        if let Some(old) = old {
            tree.stop_drag(old);
        }
        if let Some(new) = node {
            tree.start_drag(new);
        }
    }

    /// Gathers hit entities of `partition` and its nested hits, skipping the
    /// partition rooted at `drag`.
    fn collect_entities(
        &mut self,
        partition: PartitionId,
        drag: Option<NodeId>,
        out: &mut Vec<NodeId>,
    ) {
        let Some(picker) = self.raycast.get(&partition) else {
            return;
        };
        let root = picker.root;
        let nested = picker.pickers.clone();
        let entities = picker.entities.clone();
        for p in nested {
            let nested_root = self.raycast.get(&p).map(|n| n.root);
            if nested_root.is_some() && nested_root != drag {
                self.collect_entities(p, drag, out);
            }
        }
        for node in entities {
            if let Some(entity) = self.entities.get_mut(&node) {
                entity.collision.root_node = Some(root);
                out.push(node);
            }
        }
    }

    fn nearest_collision(
        &mut self,
        partition: PartitionId,
        candidates: Vec<NodeId>,
        starting: Option<PickingCollision>,
    ) -> Option<PickingCollision> {
        let (shape_flag, find_closest) = self
            .raycast
            .get(&partition)
            .map_or((false, false), |p| {
                (p.effective_shape_flag, p.find_closest_collision)
            });
        let mut ordered: Vec<(f64, NodeId)> = candidates
            .into_iter()
            .filter_map(|n| {
                let e = self.entities.get(&n)?;
                Some((e.collision.ray_entry_distance, n))
            })
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut best = starting;
        for (distance, node) in ordered {
            if best
                .as_ref()
                .is_some_and(|b| distance >= b.ray_entry_distance)
            {
                break;
            }
            let Some(entity) = self.entities.get_mut(&node) else {
                continue;
            };
            if shape_flag || entity.shape_flag {
                entity.collision.ray_entry_distance = f64::MAX;
                if entity.is_intersecting_shape(find_closest) {
                    best = Some(entity.collision.clone());
                }
            } else if !entity.collision.ray_origin_is_inside_bounds {
                best = Some(entity.collision.clone());
                break;
            }
        }
        if let Some(best) = &mut best {
            best.update_position();
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Rect;
    use understory_partition::{Box3, ContainerProps, Traversable};

    fn cube(tree: &mut PartitionTree, at: DVec3) -> ContainerId {
        tree.create_entity(
            ContainerProps::at(at.x, at.y, at.z),
            alloc::vec![Traversable::Solid(Box3::new(DVec3::ZERO, DVec3::splat(10.0)))],
        )
    }

    fn scene(children: &[ContainerId], tree: &mut PartitionTree) -> (NodeId, PartitionId) {
        let root = tree.create_container(ContainerProps::default());
        for &c in children {
            tree.add_child(root, c).unwrap();
        }
        let view = tree.create_view();
        let rn = tree.node(view, root).unwrap();
        (rn, tree.partition_of(rn).unwrap())
    }

    #[test]
    fn nearest_bounds_win() {
        let mut tree = PartitionTree::new();
        let far = cube(&mut tree, DVec3::new(0.0, 0.0, 50.0));
        let near = cube(&mut tree, DVec3::ZERO);
        let (_, p) = scene(&[far, near], &mut tree);
        let mut group = PickGroup::new();
        let hit = group
            .get_collision(&mut tree, p, DVec3::new(5.0, 5.0, -10.0), DVec3::Z, false, None)
            .unwrap();
        assert_eq!(hit.container, near);
        assert_eq!(hit.ray_entry_distance, 10.0);
        assert_eq!(hit.position, DVec3::new(5.0, 5.0, 0.0));
    }

    #[test]
    fn origin_inside_bounds_is_skipped_without_shapes() {
        let mut tree = PartitionTree::new();
        let around = cube(&mut tree, DVec3::new(0.0, 0.0, -15.0));
        let ahead = cube(&mut tree, DVec3::ZERO);
        let (_, p) = scene(&[around, ahead], &mut tree);
        let mut group = PickGroup::new();
        let hit = group
            .get_collision(&mut tree, p, DVec3::new(5.0, 5.0, -10.0), DVec3::Z, false, None)
            .unwrap();
        assert_eq!(hit.container, ahead);
    }

    #[test]
    fn shape_casts_see_through_empty_bounds() {
        let mut tree = PartitionTree::new();
        // Bounds of a hollow outline cover the ray, but its stroke does not.
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
                stroke_width: 1.0,
            }],
        );
        let behind = tree.create_entity(
            ContainerProps::at(0.0, 0.0, 5.0),
            alloc::vec![Traversable::Quad(Rect::new(0.0, 0.0, 10.0, 10.0))],
        );
        let (_, p) = scene(&[behind, outline], &mut tree);
        let mut group = PickGroup::new();
        let origin = DVec3::new(5.0, 5.0, -10.0);
        let bounds_hit = group
            .get_collision(&mut tree, p, origin, DVec3::Z, false, None)
            .unwrap();
        assert_eq!(bounds_hit.container, outline);
        let shape_hit = group
            .get_collision(&mut tree, p, origin, DVec3::Z, true, None)
            .unwrap();
        assert_eq!(shape_hit.container, behind);
        assert_eq!(shape_hit.ray_entry_distance, 15.0);
    }

    #[test]
    fn ignored_and_invisible_entities_are_skipped() {
        let mut tree = PartitionTree::new();
        let a = cube(&mut tree, DVec3::ZERO);
        let b = cube(&mut tree, DVec3::new(0.0, 0.0, 20.0));
        let c = cube(&mut tree, DVec3::new(0.0, 0.0, 40.0));
        let (_, p) = scene(&[c, b, a], &mut tree);
        let mut group = PickGroup::new();
        group
            .raycast_picker(&tree, p)
            .unwrap()
            .set_ignore_list([a]);
        tree.set_visible(b, false);
        let hit = group
            .get_collision(&mut tree, p, DVec3::new(5.0, 5.0, -10.0), DVec3::Z, false, None)
            .unwrap();
        assert_eq!(hit.container, c);
    }

    #[test]
    fn starting_collision_is_kept_when_nothing_is_closer() {
        let mut tree = PartitionTree::new();
        let a = cube(&mut tree, DVec3::new(0.0, 0.0, 20.0));
        let (_, p) = scene(&[a], &mut tree);
        let mut group = PickGroup::new();
        let origin = DVec3::new(5.0, 5.0, -10.0);
        let mut seed = group
            .get_collision(&mut tree, p, origin, DVec3::Z, false, None)
            .unwrap();
        assert_eq!(seed.ray_entry_distance, 30.0);
        seed.ray_entry_distance = 1.0;
        let kept = group
            .get_collision(&mut tree, p, origin, DVec3::Z, false, Some(seed.clone()))
            .unwrap();
        assert_eq!(kept.ray_entry_distance, 1.0);
    }

    #[test]
    fn seed_is_dropped_when_the_ray_misses_every_bound() {
        let mut tree = PartitionTree::new();
        let a = cube(&mut tree, DVec3::ZERO);
        let (_, p) = scene(&[a], &mut tree);
        let mut group = PickGroup::new();
        let seed = group
            .get_collision(&mut tree, p, DVec3::new(5.0, 5.0, -10.0), DVec3::Z, false, None)
            .unwrap();
        let missed = group.get_collision(
            &mut tree,
            p,
            DVec3::new(500.0, 5.0, -10.0),
            DVec3::Z,
            false,
            Some(seed),
        );
        assert!(missed.is_none());
    }

    #[test]
    fn view_collision_unprojects_near_and_far() {
        let mut tree = PartitionTree::new();
        let a = cube(&mut tree, DVec3::ZERO);
        let (_, p) = scene(&[a], &mut tree);
        let mut group = PickGroup::new();
        let view = |x: f64, y: f64, z: f64| DVec3::new(x, y, -100.0 + 200.0 * z);
        let hit = group
            .get_view_collision(&mut tree, p, &view, 5.0, 5.0, false, None)
            .unwrap();
        assert_eq!(hit.container, a);
        assert_eq!(hit.position, DVec3::new(5.0, 5.0, 0.0));
        assert!(group
            .get_view_collision(&mut tree, p, &view, 50.0, 5.0, false, None)
            .is_none());
    }
}
