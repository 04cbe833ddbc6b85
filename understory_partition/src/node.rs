// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Container nodes and their lazily computed hierarchical state.

use alloc::vec::Vec;

use glam::{DMat4, DVec3};
use kurbo::{Point, Rect};
use smallvec::SmallVec;

use crate::color::ColorTransform;
use crate::events::NodeEvent;
use crate::flags::HierarchicalProperty;
use crate::props::{AlignmentMode, BlendMode, OrientationMode};
use crate::tree::PartitionTree;
use crate::{ContainerId, NodeId, PartitionId, ViewId};

/// Mask owner chain of a node: the nearest ancestors-or-self that carry masks.
pub type MaskOwners = SmallVec<[NodeId; 4]>;

/// Entity side of a container node, present while its container is an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityNode {
    pub(crate) partition: PartitionId,
    pub(crate) bounds_primitive: Option<NodeId>,
    pub(crate) bounds_primitive_dirty: bool,
}

impl EntityNode {
    pub(crate) fn new(partition: PartitionId) -> Self {
        Self {
            partition,
            bounds_primitive: None,
            bounds_primitive_dirty: true,
        }
    }

    /// Partition whose update queue owns this entity.
    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Node displaying the entity's bounds, if one was attached.
    pub fn bounds_primitive(&self) -> Option<NodeId> {
        self.bounds_primitive
    }

    /// Whether the bounds primitive must be rebuilt.
    pub fn is_bounds_primitive_dirty(&self) -> bool {
        self.bounds_primitive_dirty
    }
}

#[derive(Debug)]
pub(crate) struct ContainerNode {
    pub(crate) container: ContainerId,
    pub(crate) view: ViewId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) partition: PartitionId,
    pub(crate) own_partition: Option<PartitionId>,
    pub(crate) dirty: HierarchicalProperty,
    pub(crate) transform_disabled: bool,
    pub(crate) transform_generation: u64,
    matrix: DMat4,
    inverse: DMat4,
    pub(crate) inverse_dirty: bool,
    position: DVec3,
    pub(crate) position_dirty: bool,
    color_transform: ColorTransform,
    invisible: bool,
    mouse_children_disabled: bool,
    mask_id: Option<u32>,
    masks: SmallVec<[NodeId; 2]>,
    mask_owners: Option<MaskOwners>,
    scale9_container: Option<ContainerId>,
    pub(crate) entity: Option<EntityNode>,
    pub(crate) pick_object: Option<ContainerId>,
    pub(crate) pick_object_node: Option<NodeId>,
    pub(crate) scroll_rect: Option<Rect>,
    pub(crate) scroll_rect_node: Option<NodeId>,
    render_to_image: bool,
    drag: bool,
}

impl ContainerNode {
    pub(crate) fn new(container: ContainerId, view: ViewId) -> Self {
        Self {
            container,
            view,
            parent: None,
            children: Vec::new(),
            // Assigned by the first partition refresh.
            partition: PartitionId::new(u32::MAX, 0),
            own_partition: None,
            dirty: HierarchicalProperty::ALL,
            transform_disabled: false,
            transform_generation: 0,
            matrix: DMat4::IDENTITY,
            inverse: DMat4::IDENTITY,
            inverse_dirty: true,
            position: DVec3::ZERO,
            position_dirty: true,
            color_transform: ColorTransform::IDENTITY,
            invisible: false,
            mouse_children_disabled: false,
            mask_id: None,
            masks: SmallVec::new(),
            mask_owners: None,
            scale9_container: None,
            entity: None,
            pick_object: None,
            pick_object_node: None,
            scroll_rect: None,
            scroll_rect_node: None,
            render_to_image: false,
            drag: false,
        }
    }
}

impl PartitionTree {
    /// Marks `property` dirty on `node` and every node below it.
    ///
    /// The walk continues below a node only if some bit was newly dirtied
    /// there; a node whose bits are already all set stops it. A newly dirty scene transform also dirties the
    /// cached position and inverse, bumps the transform generation, raises
    /// [`NodeEvent::InvalidateMatrix3D`] and re-queues the node's entity.
    pub fn invalidate_hierarchical_property(
        &mut self,
        node: NodeId,
        property: HierarchicalProperty,
    ) {
        if property.contains(HierarchicalProperty::COLOR_TRANSFORM) && self.nodes.contains(node) {
            self.emit(NodeEvent::InvalidateColorTransform(node));
        }
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        let delta = (n.dirty ^ property) & property;
        if delta.is_empty() {
            return;
        }
        n.dirty |= delta;
        let moved = delta.contains(HierarchicalProperty::SCENE_TRANSFORM);
        if moved {
            n.position_dirty = true;
            n.inverse_dirty = true;
            n.transform_generation += 1;
        }
        self.stats.propagation_visits += 1;

        // Dependents get the full set: a child may have cleaned a bit its
        // parent still carries, for example a mask id of its own.
        for dep in self.dependents(node) {
            self.invalidate_hierarchical_property(dep, property);
        }

        if moved {
            self.emit(NodeEvent::InvalidateMatrix3D(node));
            if self.is_entity_container(node) {
                self.invalidate_entity(node);
            }
        }
    }

    /// Currently dirty hierarchical bits of the node.
    pub fn dirty(&self, node: NodeId) -> HierarchicalProperty {
        self.nodes
            .get(node)
            .map_or(HierarchicalProperty::empty(), |n| n.dirty)
    }

    /// Counter bumped whenever the node's world matrix may have changed.
    pub fn transform_generation(&self, node: NodeId) -> u64 {
        self.nodes.get(node).map_or(0, |n| n.transform_generation)
    }

    /// Returns the entity sub-node, if the node's container is an entity.
    pub fn entity(&self, node: NodeId) -> Option<&EntityNode> {
        self.nodes.get(node).and_then(|n| n.entity.as_ref())
    }

    /// Attaches (or detaches) the node displaying the entity's bounds.
    pub fn set_bounds_primitive(&mut self, node: NodeId, primitive: Option<NodeId>) {
        if let Some(e) = self.nodes.get_mut(node).and_then(|n| n.entity.as_mut()) {
            e.bounds_primitive = primitive;
            e.bounds_primitive_dirty = false;
        }
    }

    // --- transforms -------------------------------------------------------

    /// The node's contribution to its world matrix.
    ///
    /// This is the active local transform (identity while transforms are
    /// disabled) with the registration matrix and scroll offset applied.
    pub fn local_matrix(&self, node: NodeId) -> DMat4 {
        let Some(n) = self.nodes.get(node) else {
            return DMat4::IDENTITY;
        };
        let Some(props) = self.containers.get(n.container).map(|c| &c.props) else {
            return DMat4::IDENTITY;
        };
        let active = if n.transform_disabled {
            DMat4::IDENTITY
        } else {
            props.transform
        };
        let mut m = active;
        if let Some(reg) = props.registration {
            m *= reg;
            if props.alignment != AlignmentMode::RegistrationPoint {
                let (scale, _, _) = active.to_scale_rotation_translation();
                m = DMat4::from_translation(-reg.w_axis.truncate() * scale) * m;
            }
        }
        if let Some(rect) = props.scroll_rect {
            let sign = if props.mask_mode { 1.0 } else { -1.0 };
            m *= DMat4::from_translation(DVec3::new(sign * rect.x0, sign * rect.y0, 0.0));
        }
        m
    }

    /// World matrix of the node, recomputed only if its transform bit is dirty.
    pub fn matrix3d(&mut self, node: NodeId) -> DMat4 {
        let Some(n) = self.nodes.get(node) else {
            return DMat4::IDENTITY;
        };
        if !n.dirty.contains(HierarchicalProperty::SCENE_TRANSFORM) {
            return n.matrix;
        }
        let parent = n.parent;
        let container = n.container;
        let local = self.local_matrix(node);
        let world = match parent {
            Some(p) => self.matrix3d(p) * local,
            None => local,
        };
        if let Some(n) = self.nodes.get_mut(node) {
            n.matrix = world;
            n.dirty.remove(HierarchicalProperty::SCENE_TRANSFORM);
        }
        self.stats.matrix_recomputes += 1;
        if let Some(controller) = self
            .containers
            .get_mut(container)
            .and_then(|c| c.controller.as_mut())
        {
            controller.update_controller(&world);
        }
        world
    }

    /// Inverse of [`matrix3d`](Self::matrix3d).
    pub fn inverse_matrix3d(&mut self, node: NodeId) -> DMat4 {
        let world = self.matrix3d(node);
        let Some(n) = self.nodes.get_mut(node) else {
            return DMat4::IDENTITY;
        };
        if n.inverse_dirty {
            n.inverse = world.inverse();
            n.inverse_dirty = false;
        }
        n.inverse
    }

    /// Product of local contributions from `node` up to, but excluding, `ancestor`.
    ///
    /// Returns `None` if `ancestor` is not on the node's parent chain.
    pub fn relative_matrix(&self, node: NodeId, ancestor: NodeId) -> Option<DMat4> {
        let mut m = DMat4::IDENTITY;
        let mut cur = node;
        while cur != ancestor {
            m = self.local_matrix(cur) * m;
            cur = self.parent(cur)?;
        }
        Some(m)
    }

    /// World position of the node's registration origin.
    pub fn position(&mut self, node: NodeId) -> DVec3 {
        let dirty = self.nodes.get(node).is_some_and(|n| n.position_dirty);
        if !dirty {
            return self.nodes.get(node).map_or(DVec3::ZERO, |n| n.position);
        }
        let world = self.matrix3d(node);
        let reg = self
            .node_props(node)
            .filter(|p| p.alignment == AlignmentMode::RegistrationPoint)
            .and_then(|p| p.registration);
        let position = match reg {
            Some(reg) => world.transform_point3(-reg.w_axis.truncate()),
            None => world.w_axis.truncate(),
        };
        if let Some(n) = self.nodes.get_mut(node) {
            n.position = position;
            n.position_dirty = false;
        }
        position
    }

    /// Matrix used for rendering with the given camera transform.
    ///
    /// Camera-plane nodes keep their own scale and position but take the
    /// camera's rotation.
    pub fn render_matrix3d(&mut self, node: NodeId, camera: &DMat4) -> DMat4 {
        let Some(props) = self.node_props(node) else {
            return DMat4::IDENTITY;
        };
        if props.orientation != OrientationMode::CameraPlane {
            return self.matrix3d(node);
        }
        let registration = props.registration;
        let alignment = props.alignment;
        let disabled = self.is_transform_disabled(node);
        let active = if disabled {
            DMat4::IDENTITY
        } else {
            props.transform
        };
        let (scale, _, _) = active.to_scale_rotation_translation();
        let (_, rotation, _) = camera.to_scale_rotation_translation();
        let position = self.position(node);
        let mut m = DMat4::from_scale_rotation_translation(scale, rotation, position);
        if let Some(reg) = registration {
            m *= reg;
            if alignment != AlignmentMode::RegistrationPoint {
                m = DMat4::from_translation(-reg.w_axis.truncate() * scale) * m;
            }
        }
        m
    }

    /// Maps a point from world space into the node's local XY plane.
    pub fn global_to_local(&mut self, node: NodeId, point: Point) -> Point {
        let p = self.global_to_local_3d(node, DVec3::new(point.x, point.y, 0.0));
        Point::new(p.x, p.y)
    }

    /// Maps a point from the node's local XY plane into world space.
    pub fn local_to_global(&mut self, node: NodeId, point: Point) -> Point {
        let p = self.local_to_global_3d(node, DVec3::new(point.x, point.y, 0.0));
        Point::new(p.x, p.y)
    }

    /// Maps a point from world space into node space.
    pub fn global_to_local_3d(&mut self, node: NodeId, point: DVec3) -> DVec3 {
        self.inverse_matrix3d(node).transform_point3(point)
    }

    /// Maps a point from node space into world space.
    pub fn local_to_global_3d(&mut self, node: NodeId, point: DVec3) -> DVec3 {
        self.matrix3d(node).transform_point3(point)
    }

    /// Disables or enables the node's own transform, as used for local nodes.
    ///
    /// A disabled node renders as if its transform were identity and ignores
    /// inherited visibility, color and masking.
    pub fn set_transform_disabled(&mut self, node: NodeId, disabled: bool) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        if n.transform_disabled == disabled {
            return;
        }
        n.transform_disabled = disabled;
        n.transform_generation += 1;
        self.invalidate_hierarchical_property(node, HierarchicalProperty::ALL);
    }

    /// Whether the node's own transform is disabled.
    pub fn is_transform_disabled(&self, node: NodeId) -> bool {
        self.nodes.get(node).is_some_and(|n| n.transform_disabled)
    }

    // --- inherited state ----------------------------------------------------

    /// Concatenated color transform.
    pub fn color_transform(&mut self, node: NodeId) -> ColorTransform {
        let Some(n) = self.nodes.get(node) else {
            return ColorTransform::IDENTITY;
        };
        if n.transform_disabled {
            return ColorTransform::IDENTITY;
        }
        if !n.dirty.contains(HierarchicalProperty::COLOR_TRANSFORM) {
            return n.color_transform;
        }
        let parent = n.parent;
        let Some(props) = self.node_props(node) else {
            return ColorTransform::IDENTITY;
        };
        let own = props.color_transform;
        let overlay = props.blend_mode == BlendMode::Overlay;
        let mut ct = match parent {
            Some(p) => self.color_transform(p),
            None => ColorTransform::IDENTITY,
        };
        ct.prepend(&own);
        if overlay {
            ct.alpha_multiplier *= 0.5;
        }
        if let Some(n) = self.nodes.get_mut(node) {
            n.color_transform = ct;
            n.dirty.remove(HierarchicalProperty::COLOR_TRANSFORM);
        }
        ct
    }

    /// Whether the node or any ancestor is hidden.
    pub fn is_invisible(&mut self, node: NodeId) -> bool {
        let Some(n) = self.nodes.get(node) else {
            return true;
        };
        if n.transform_disabled {
            return false;
        }
        if !n.dirty.contains(HierarchicalProperty::VISIBLE) {
            return n.invisible;
        }
        let parent = n.parent;
        let own = self.node_props(node).is_some_and(|p| !p.visible);
        let invisible = own || parent.is_some_and(|p| self.is_invisible(p));
        if let Some(n) = self.nodes.get_mut(node) {
            n.invisible = invisible;
            n.dirty.remove(HierarchicalProperty::VISIBLE);
        }
        invisible
    }

    /// Whether the node or any ancestor disables mouse input for descendants.
    pub fn is_mouse_children_disabled(&mut self, node: NodeId) -> bool {
        let Some(n) = self.nodes.get(node) else {
            return true;
        };
        if !n.dirty.contains(HierarchicalProperty::MOUSE_ENABLED) {
            return n.mouse_children_disabled;
        }
        let parent = n.parent;
        let own = self.node_props(node).is_some_and(|p| !p.mouse_children);
        let disabled = own || parent.is_some_and(|p| self.is_mouse_children_disabled(p));
        if let Some(n) = self.nodes.get_mut(node) {
            n.mouse_children_disabled = disabled;
            n.dirty.remove(HierarchicalProperty::MOUSE_ENABLED);
        }
        disabled
    }

    /// Whether the node ignores mouse input.
    pub fn is_mouse_disabled(&mut self, node: NodeId) -> bool {
        if self.is_invisible(node) {
            return true;
        }
        if self.node_props(node).is_none_or(|p| !p.mouse_enabled) {
            return true;
        }
        match self.parent(node) {
            Some(p) => self.is_mouse_children_disabled(p),
            None => false,
        }
    }

    /// Own mask id, else the nearest ancestor's.
    pub fn mask_id(&mut self, node: NodeId) -> Option<u32> {
        let n = self.nodes.get(node)?;
        if !n.dirty.contains(HierarchicalProperty::MASK_ID) {
            return n.mask_id;
        }
        let parent = n.parent;
        let own = self.node_props(node).and_then(|p| p.mask_id);
        let mask_id = own.or_else(|| parent.and_then(|p| self.mask_id(p)));
        if let Some(n) = self.nodes.get_mut(node) {
            n.mask_id = mask_id;
            n.dirty.remove(HierarchicalProperty::MASK_ID);
        }
        mask_id
    }

    fn refresh_masks(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        let view = n.view;
        let mask_containers = self
            .containers
            .get(n.container)
            .map(|c| c.masks.clone())
            .unwrap_or_default();
        let mut masks: SmallVec<[NodeId; 2]> = SmallVec::new();
        for mask in mask_containers {
            let Some(mask_node) = self.node(view, mask) else {
                continue;
            };
            let root = self
                .partition_of(mask_node)
                .and_then(|p| self.partition_root(p))
                .unwrap_or(mask_node);
            masks.push(root);
        }
        if let Some(scroll) = self.scroll_rect_node(node) {
            masks.push(scroll);
        }
        if let Some(n) = self.nodes.get_mut(node) {
            n.masks = masks;
        }
    }

    /// Partition roots of the node's masks, including the scroll-rect clip.
    pub fn masks(&mut self, node: NodeId) -> SmallVec<[NodeId; 2]> {
        let Some(n) = self.nodes.get(node) else {
            return SmallVec::new();
        };
        if n.dirty.contains(HierarchicalProperty::MASKS) {
            if n.transform_disabled {
                self.refresh_masks(node);
            } else {
                self.mask_owners(node);
            }
        }
        self.nodes
            .get(node)
            .map(|n| n.masks.clone())
            .unwrap_or_default()
    }

    /// Ancestors-or-self whose masks clip this node, outermost first.
    ///
    /// The chain restarts at a node with its own mask id, and is `None` for
    /// nodes with transforms disabled.
    pub fn mask_owners(&mut self, node: NodeId) -> Option<MaskOwners> {
        let n = self.nodes.get(node)?;
        if n.transform_disabled {
            return None;
        }
        if !n.dirty.contains(HierarchicalProperty::MASKS) {
            return n.mask_owners.clone();
        }
        let parent = n.parent;
        self.refresh_masks(node);
        let has_masks = self.nodes.get(node).is_some_and(|n| !n.masks.is_empty());
        let parent_owners = parent.and_then(|p| self.mask_owners(p));
        let own_mask_id = self.node_props(node).and_then(|p| p.mask_id);
        let owners = match parent_owners {
            Some(mut owners) if own_mask_id.is_none() => {
                if has_masks {
                    owners.push(node);
                }
                Some(owners)
            }
            _ if has_masks => Some(smallvec::smallvec![node]),
            _ => None,
        };
        if let Some(n) = self.nodes.get_mut(node) {
            n.mask_owners = owners.clone();
            n.dirty.remove(HierarchicalProperty::MASKS);
        }
        owners
    }

    /// Nearest ancestor-or-self container carrying a scale9 grid.
    pub fn scale9_container(&mut self, node: NodeId) -> Option<ContainerId> {
        let n = self.nodes.get(node)?;
        if !n.dirty.contains(HierarchicalProperty::SCALE9) {
            return n.scale9_container;
        }
        let parent = n.parent;
        let container = n.container;
        let own = self
            .node_props(node)
            .is_some_and(|p| p.scale9_grid.is_some());
        let found = if own {
            Some(container)
        } else {
            parent.and_then(|p| self.scale9_container(p))
        };
        if let Some(n) = self.nodes.get_mut(node) {
            n.scale9_container = found;
            n.dirty.remove(HierarchicalProperty::SCALE9);
        }
        found
    }

    /// Whether the node produces visible output (masks always do).
    pub fn is_renderable(&mut self, node: NodeId) -> bool {
        if self.mask_id(node).is_some() {
            return true;
        }
        !self.is_invisible(node) && self.color_transform(node).is_renderable()
    }

    /// Whether the node must be rendered through an offscreen image.
    ///
    /// Turning this off drops the local node of the node's partition.
    pub fn render_to_image(&mut self, node: NodeId) -> bool {
        let wants = self.is_renderable(node)
            && self.node_props(node).is_some_and(|p| {
                p.cache_as_bitmap || p.has_filters || p.blend_mode.needs_image()
            });
        let Some(n) = self.nodes.get_mut(node) else {
            return false;
        };
        let was = core::mem::replace(&mut n.render_to_image, wants);
        if was && !wants {
            let partition = n.partition;
            self.clear_local_node(partition);
        }
        wants
    }

    // --- relations ----------------------------------------------------------

    /// Returns `true` if `ancestor` is a strict ancestor of `node`.
    pub fn is_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cur = self.parent(node);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    /// Returns `true` if `node` is a strict ancestor of `descendant`.
    pub fn is_ancestor(&self, node: NodeId, descendant: NodeId) -> bool {
        self.is_descendant(descendant, node)
    }

    /// Marks the node as being dragged; pickers skip it.
    pub fn start_drag(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.drag = true;
        }
    }

    /// Clears the drag mark.
    pub fn stop_drag(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.drag = false;
        }
    }

    /// Whether the node is being dragged.
    pub fn is_drag_entity(&self, node: NodeId) -> bool {
        self.nodes.get(node).is_some_and(|n| n.drag)
    }

    /// Node standing in for this one during picking, resolved from the
    /// container's pick object.
    pub fn pick_object_node(&mut self, node: NodeId) -> Option<NodeId> {
        let n = self.nodes.get(node)?;
        let view = n.view;
        let want = self.containers.get(n.container).and_then(|c| c.pick_object);
        if n.pick_object == want && (want.is_none() || n.pick_object_node.is_some()) {
            return n.pick_object_node;
        }
        let old = n.pick_object_node;
        if let Some(n) = self.nodes.get_mut(node) {
            n.pick_object = want;
            n.pick_object_node = None;
        }
        if let Some(old) = old {
            if self.parent(old) == Some(node) {
                self.set_parent(old, None);
            }
        }
        let pick_node = want.and_then(|po| self.node(view, po))?;
        let from_timeline = self
            .node_props(pick_node)
            .is_some_and(|p| p.pick_object_from_timeline);
        if let Some(n) = self.nodes.get_mut(node) {
            n.pick_object_node = Some(pick_node);
        }
        if from_timeline && self.parent(pick_node).is_none() && pick_node != node {
            self.set_parent(pick_node, Some(node));
        }
        Some(pick_node)
    }

    /// Companion node clipping the node to its scroll rectangle.
    ///
    /// The companion is parented to the node without being one of its children.
    pub fn scroll_rect_node(&mut self, node: NodeId) -> Option<NodeId> {
        let n = self.nodes.get(node)?;
        let view = n.view;
        let rec = self.containers.get(n.container)?;
        if rec.props.mask_mode {
            return None;
        }
        let want = rec.props.scroll_rect;
        let companion = rec.scroll_companion;
        if n.scroll_rect == want {
            return n.scroll_rect_node;
        }
        let old = n.scroll_rect_node;
        if let Some(n) = self.nodes.get_mut(node) {
            n.scroll_rect = want;
            n.scroll_rect_node = None;
        }
        if let Some(old) = old {
            self.set_parent(old, None);
        }
        if want.is_none() {
            return None;
        }
        let scroll_node = self.node(view, companion?)?;
        if let Some(n) = self.nodes.get_mut(node) {
            n.scroll_rect_node = Some(scroll_node);
        }
        self.set_parent(scroll_node, Some(node));
        Some(scroll_node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContainerProps;

    fn chain(tree: &mut PartitionTree) -> (ContainerId, ContainerId, ContainerId) {
        let a = tree.create_container(ContainerProps::at(1.0, 0.0, 0.0));
        let b = tree.create_container(ContainerProps::at(0.0, 2.0, 0.0));
        let c = tree.create_container(ContainerProps::at(0.0, 0.0, 3.0));
        tree.add_child(a, b).unwrap();
        tree.add_child(b, c).unwrap();
        (a, b, c)
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut tree = PartitionTree::new();
        let (a, _, c) = chain(&mut tree);
        let view = tree.create_view();
        tree.node(view, a).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        assert_eq!(tree.position(cn), DVec3::new(1.0, 2.0, 3.0));
        let local = tree.global_to_local_3d(cn, DVec3::new(1.0, 2.0, 3.0));
        assert!(local.abs_diff_eq(DVec3::ZERO, 1e-12));
    }

    #[test]
    fn matrix_is_cached_until_invalidated() {
        let mut tree = PartitionTree::new();
        let (a, _, c) = chain(&mut tree);
        let view = tree.create_view();
        tree.node(view, a).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        tree.matrix3d(cn);
        assert_eq!(tree.stats().matrix_recomputes, 3);
        tree.matrix3d(cn);
        assert_eq!(tree.stats().matrix_recomputes, 3);

        tree.set_transform(a, DMat4::from_translation(DVec3::new(5.0, 0.0, 0.0)));
        assert_eq!(tree.position(cn), DVec3::new(5.0, 2.0, 3.0));
        assert_eq!(tree.stats().matrix_recomputes, 6);
    }

    #[test]
    fn relative_matrix_stops_at_ancestor() {
        let mut tree = PartitionTree::new();
        let (a, b, c) = chain(&mut tree);
        let view = tree.create_view();
        let an = tree.node(view, a).unwrap();
        let bn = tree.existing_node(view, b).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        let m = tree.relative_matrix(cn, an).unwrap();
        assert_eq!(m.transform_point3(DVec3::ZERO), DVec3::new(0.0, 2.0, 3.0));
        assert_eq!(tree.relative_matrix(cn, cn), Some(DMat4::IDENTITY));
        assert_eq!(tree.relative_matrix(bn, cn), None);
    }

    #[test]
    fn registration_shifts_position() {
        let mut tree = PartitionTree::new();
        let a = tree.create_container(ContainerProps {
            registration: Some(DMat4::from_translation(DVec3::new(-4.0, 0.0, 0.0))),
            ..ContainerProps::default()
        });
        let view = tree.create_view();
        let an = tree.node(view, a).unwrap();
        // Local origin maps to the registration offset; the position reports
        // the registration point itself.
        assert_eq!(
            tree.local_to_global_3d(an, DVec3::ZERO),
            DVec3::new(-4.0, 0.0, 0.0)
        );
        assert_eq!(tree.position(an), DVec3::ZERO);
    }

    #[test]
    fn inherited_visibility_and_mouse_state() {
        let mut tree = PartitionTree::new();
        let (a, b, c) = chain(&mut tree);
        let view = tree.create_view();
        tree.node(view, a).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        assert!(!tree.is_invisible(cn));
        tree.set_visible(b, false);
        assert!(tree.is_invisible(cn));
        assert!(!tree.is_renderable(cn));
        tree.set_visible(b, true);
        assert!(!tree.is_invisible(cn));

        assert!(!tree.is_mouse_disabled(cn));
        tree.set_mouse_children(a, false);
        assert!(tree.is_mouse_disabled(cn));
    }

    #[test]
    fn color_transform_concatenates() {
        let mut tree = PartitionTree::new();
        let (a, b, c) = chain(&mut tree);
        tree.set_color_transform(a, ColorTransform::with_alpha(0.5));
        tree.set_color_transform(b, ColorTransform::with_alpha(0.5));
        let view = tree.create_view();
        tree.node(view, a).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        assert_eq!(tree.color_transform(cn).alpha_multiplier, 0.25);
        tree.set_color_transform(a, ColorTransform::with_alpha(0.0));
        assert!(!tree.is_renderable(cn));
    }

    #[test]
    fn mask_id_is_inherited() {
        let mut tree = PartitionTree::new();
        let (a, b, c) = chain(&mut tree);
        let view = tree.create_view();
        tree.node(view, a).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        assert_eq!(tree.mask_id(cn), None);
        tree.set_mask_id(b, Some(7));
        assert_eq!(tree.mask_id(cn), Some(7));
        // Masks stay renderable even when hidden.
        tree.set_visible(b, false);
        assert!(tree.is_renderable(cn));
    }

    #[test]
    fn explicit_mask_id_overrides_parent() {
        let mut tree = PartitionTree::new();
        let (a, b, c) = chain(&mut tree);
        let view = tree.create_view();
        tree.node(view, a).unwrap();
        let bn = tree.existing_node(view, b).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        tree.set_mask_id(b, Some(7));
        tree.set_mask_id(c, Some(9));
        assert_eq!(tree.mask_id(bn), Some(7));
        assert_eq!(tree.mask_id(cn), Some(9));
        tree.set_mask_id(c, None);
        assert_eq!(tree.mask_id(cn), Some(7));
    }

    #[test]
    fn children_receive_bits_the_parent_already_carries() {
        let mut tree = PartitionTree::new();
        let (a, _, c) = chain(&mut tree);
        tree.set_mask_id(c, Some(9));
        let view = tree.create_view();
        let an = tree.node(view, a).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        assert!(!tree.is_invisible(cn));
        assert_eq!(tree.mask_id(cn), Some(9));
        assert!(tree.dirty(an).contains(HierarchicalProperty::MASK_ID));
        assert!(!tree.dirty(cn).contains(HierarchicalProperty::MASK_ID));

        tree.invalidate_hierarchical_property(
            an,
            HierarchicalProperty::MASK_ID | HierarchicalProperty::VISIBLE,
        );
        assert!(tree.dirty(cn).contains(HierarchicalProperty::MASK_ID));
        assert!(tree.dirty(cn).contains(HierarchicalProperty::VISIBLE));
        assert_eq!(tree.mask_id(cn), Some(9));
    }

    #[test]
    fn mask_owners_accumulate() {
        let mut tree = PartitionTree::new();
        let (a, b, c) = chain(&mut tree);
        let mask = tree.create_entity(ContainerProps::default(), alloc::vec![]);
        let inner_mask = tree.create_entity(ContainerProps::default(), alloc::vec![]);
        tree.set_masks(a, &[mask]);
        tree.set_masks(c, &[inner_mask]);
        assert!(tree.container_props(mask).unwrap().mask_id.is_some());

        let view = tree.create_view();
        let an = tree.node(view, a).unwrap();
        let bn = tree.existing_node(view, b).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        assert_eq!(tree.mask_owners(bn).as_deref(), Some(&[an][..]));
        assert_eq!(tree.mask_owners(cn).as_deref(), Some(&[an, cn][..]));
        let mask_node = tree.existing_node(view, mask).unwrap();
        assert_eq!(tree.masks(an).as_slice(), &[mask_node]);

        tree.set_transform_disabled(cn, true);
        assert_eq!(tree.mask_owners(cn), None);
    }

    #[test]
    fn scroll_rect_offsets_and_clips() {
        let mut tree = PartitionTree::new();
        let a = tree.create_container(ContainerProps::default());
        tree.set_scroll_rect(a, Some(Rect::new(10.0, 20.0, 110.0, 70.0)));
        let view = tree.create_view();
        let an = tree.node(view, a).unwrap();
        assert_eq!(
            tree.local_to_global_3d(an, DVec3::new(10.0, 20.0, 0.0)),
            DVec3::ZERO
        );
        let masks = tree.masks(an);
        assert_eq!(masks.len(), 1);
        let clip = masks[0];
        assert_eq!(tree.parent(clip), Some(an));
        assert!(tree.children(an).is_empty());
        assert_eq!(tree.local_to_global_3d(clip, DVec3::ZERO), DVec3::ZERO);
        assert!(tree.mask_id(clip).is_some());
    }

    #[test]
    fn scale9_container_is_nearest() {
        let mut tree = PartitionTree::new();
        let (a, b, c) = chain(&mut tree);
        tree.set_scale9_grid(b, Some(Rect::new(0.0, 0.0, 1.0, 1.0)));
        let view = tree.create_view();
        tree.node(view, a).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        assert_eq!(tree.scale9_container(cn), Some(b));
    }

    #[test]
    fn descendant_relations_are_strict() {
        let mut tree = PartitionTree::new();
        let (a, _, c) = chain(&mut tree);
        let view = tree.create_view();
        let an = tree.node(view, a).unwrap();
        let cn = tree.existing_node(view, c).unwrap();
        assert!(tree.is_descendant(cn, an));
        assert!(tree.is_ancestor(an, cn));
        assert!(!tree.is_descendant(cn, cn));
    }

    #[test]
    fn pick_object_from_timeline_is_parented() {
        let mut tree = PartitionTree::new();
        let a = tree.create_container(ContainerProps::at(3.0, 0.0, 0.0));
        let hit = tree.create_entity(
            ContainerProps {
                pick_object_from_timeline: true,
                ..ContainerProps::default()
            },
            alloc::vec![],
        );
        tree.set_pick_object(a, Some(hit));
        assert_eq!(
            tree.container_props(hit).unwrap().partition_kind,
            Some(crate::PartitionKind::Basic)
        );
        let view = tree.create_view();
        let an = tree.node(view, a).unwrap();
        let pn = tree.pick_object_node(an).unwrap();
        assert_eq!(tree.parent(pn), Some(an));
        assert_eq!(tree.position(pn), DVec3::new(3.0, 0.0, 0.0));
        assert_ne!(tree.partition_of(pn), tree.partition_of(an));
    }
}
