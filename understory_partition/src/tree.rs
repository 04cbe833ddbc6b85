// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The partition tree: scene containers, views, and the node arena.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;
use kurbo::Rect;
use smallvec::SmallVec;

use crate::error::SceneError;
use crate::events::{NodeEvent, PartitionStats};
use crate::flags::HierarchicalProperty;
use crate::node::ContainerNode;
use crate::partition::Partition;
use crate::props::{
    AssetType, ContainerController, ContainerProps, EntityContent, PartitionKind, Traversable,
};
use crate::slab::Slab;
use crate::{ContainerId, NodeId, PartitionId, ViewId};

/// Construction-time settings of a [`PartitionTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionConfig {
    /// Partition kind used for view roots and detached nodes.
    pub default_partition: PartitionKind,
    /// Record [`NodeEvent`]s for [`PartitionTree::drain_events`].
    pub record_events: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            default_partition: PartitionKind::Basic,
            record_events: false,
        }
    }
}

/// Scene-side record of one container.
pub(crate) struct Container {
    pub(crate) props: ContainerProps,
    pub(crate) content: Option<EntityContent>,
    pub(crate) content_generation: u64,
    pub(crate) parent: Option<ContainerId>,
    pub(crate) children: Vec<ContainerId>,
    pub(crate) masks: SmallVec<[ContainerId; 2]>,
    pub(crate) pick_object: Option<ContainerId>,
    /// Mask-mode companion carrying the scroll rect, created on demand.
    pub(crate) scroll_companion: Option<ContainerId>,
    pub(crate) controller: Option<Box<dyn ContainerController>>,
    /// Nodes representing this container, at most one per view.
    pub(crate) abstractions: SmallVec<[NodeId; 2]>,
}

impl Container {
    fn new(props: ContainerProps, content: Option<EntityContent>) -> Self {
        Self {
            props,
            content,
            content_generation: 0,
            parent: None,
            children: Vec::new(),
            masks: SmallVec::new(),
            pick_object: None,
            scroll_companion: None,
            controller: None,
            abstractions: SmallVec::new(),
        }
    }
}

/// A node pool.
#[derive(Debug)]
pub(crate) struct View {
    pub(crate) kind: PartitionKind,
    pub(crate) nodes: HashMap<ContainerId, NodeId>,
}

/// Scene containers, their per-view node abstractions, and the partitions
/// those nodes are grouped into.
///
/// The tree plays both sides of the scene contract: container setters stand in
/// for the scene's change notifications and fan out to every node of the
/// container, while node queries answer with lazily cached hierarchical state.
///
/// ## Example
///
/// ```rust
/// use glam::DVec3;
/// use understory_partition::{ContainerProps, PartitionTree};
///
/// let mut tree = PartitionTree::new();
/// let root = tree.create_container(ContainerProps::default());
/// let child = tree.create_container(ContainerProps::at(10.0, 0.0, 0.0));
/// tree.add_child(root, child).unwrap();
///
/// let view = tree.create_view();
/// let root_node = tree.node(view, root).unwrap();
/// let child_node = tree.existing_node(view, child).unwrap();
/// assert_eq!(tree.parent(child_node), Some(root_node));
///
/// let p = tree.local_to_global_3d(child_node, DVec3::ZERO);
/// assert_eq!(p, DVec3::new(10.0, 0.0, 0.0));
/// ```
pub struct PartitionTree {
    pub(crate) config: PartitionConfig,
    pub(crate) containers: Slab<ContainerId, Container>,
    pub(crate) views: Slab<ViewId, View>,
    pub(crate) nodes: Slab<NodeId, ContainerNode>,
    pub(crate) partitions: Slab<PartitionId, Partition>,
    next_mask_id: u32,
    pub(crate) events: Vec<NodeEvent>,
    pub(crate) stats: PartitionStats,
}

impl fmt::Debug for PartitionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionTree")
            .field("config", &self.config)
            .field("containers", &self.containers.len())
            .field("views", &self.views.len())
            .field("nodes", &self.nodes.len())
            .field("partitions", &self.partitions.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for PartitionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionTree {
    /// Creates an empty tree with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PartitionConfig::default())
    }

    /// Creates an empty tree.
    pub fn with_config(config: PartitionConfig) -> Self {
        Self {
            config,
            containers: Slab::default(),
            views: Slab::default(),
            nodes: Slab::default(),
            partitions: Slab::default(),
            next_mask_id: 1,
            events: Vec::new(),
            stats: PartitionStats::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Returns the work counters.
    pub fn stats(&self) -> PartitionStats {
        self.stats
    }

    /// Zeroes the work counters.
    pub fn reset_stats(&mut self) {
        self.stats = PartitionStats::default();
    }

    /// Takes the recorded node events, oldest first.
    pub fn drain_events(&mut self) -> alloc::vec::Drain<'_, NodeEvent> {
        self.events.drain(..)
    }

    pub(crate) fn emit(&mut self, event: NodeEvent) {
        if self.config.record_events {
            self.events.push(event);
        }
    }

    // --- containers -----------------------------------------------------

    /// Creates a container that is not an entity.
    pub fn create_container(&mut self, props: ContainerProps) -> ContainerId {
        self.containers.insert(Container::new(props, None))
    }

    /// Creates an entity container with the given traversables.
    pub fn create_entity(&mut self, props: ContainerProps, content: EntityContent) -> ContainerId {
        self.containers.insert(Container::new(props, Some(content)))
    }

    /// Returns `true` if the container handle is live.
    pub fn is_container_alive(&self, container: ContainerId) -> bool {
        self.containers.contains(container)
    }

    /// Returns the container's props.
    pub fn container_props(&self, container: ContainerId) -> Option<&ContainerProps> {
        self.containers.get(container).map(|c| &c.props)
    }

    /// Returns the container's parent.
    pub fn container_parent(&self, container: ContainerId) -> Option<ContainerId> {
        self.containers.get(container).and_then(|c| c.parent)
    }

    /// Returns the container's children in order.
    pub fn container_children(&self, container: ContainerId) -> &[ContainerId] {
        self.containers
            .get(container)
            .map(|c| c.children.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the entity content, or `None` if the container is not an entity.
    pub fn content(&self, container: ContainerId) -> Option<&[Traversable]> {
        self.containers
            .get(container)
            .and_then(|c| c.content.as_deref())
    }

    /// Counter bumped whenever the container's entity content changes.
    pub fn content_generation(&self, container: ContainerId) -> u64 {
        self.containers
            .get(container)
            .map_or(0, |c| c.content_generation)
    }

    /// Returns the masks assigned to the container.
    pub fn container_masks(&self, container: ContainerId) -> &[ContainerId] {
        self.containers
            .get(container)
            .map(|c| c.masks.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the pick object assigned to the container.
    pub fn container_pick_object(&self, container: ContainerId) -> Option<ContainerId> {
        self.containers.get(container).and_then(|c| c.pick_object)
    }

    /// Returns the nodes representing this container, one per view.
    pub fn abstractions(&self, container: ContainerId) -> &[NodeId] {
        self.containers
            .get(container)
            .map(|c| c.abstractions.as_slice())
            .unwrap_or(&[])
    }

    /// Returns `true` if `ancestor` is a strict ancestor of `container`.
    pub fn container_is_descendant(&self, container: ContainerId, ancestor: ContainerId) -> bool {
        let mut cur = self.container_parent(container);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.container_parent(c);
        }
        false
    }

    /// Appends `child` to `parent`'s children.
    pub fn add_child(&mut self, parent: ContainerId, child: ContainerId) -> Result<(), SceneError> {
        let len = self
            .containers
            .get(parent)
            .ok_or(SceneError::StaleContainer(parent))?
            .children
            .iter()
            .filter(|&&c| c != child)
            .count();
        self.add_child_at(parent, child, len)
    }

    /// Inserts `child` into `parent`'s children at `index`.
    ///
    /// A child that already has a parent is removed from it first. Every node of
    /// `parent` gains a node for `child` in the same view.
    pub fn add_child_at(
        &mut self,
        parent: ContainerId,
        child: ContainerId,
        index: usize,
    ) -> Result<(), SceneError> {
        let siblings = self
            .containers
            .get(parent)
            .ok_or(SceneError::StaleContainer(parent))?
            .children
            .iter()
            .filter(|&&c| c != child)
            .count();
        let old_parent = self
            .containers
            .get(child)
            .ok_or(SceneError::StaleContainer(child))?
            .parent;
        if child == parent || self.container_is_descendant(parent, child) {
            return Err(SceneError::Cycle { parent, child });
        }
        if index > siblings {
            return Err(SceneError::IndexOutOfBounds {
                index,
                len: siblings,
            });
        }
        if let Some(old) = old_parent {
            self.remove_child(old, child)?;
        }

        if let Some(rec) = self.containers.get_mut(parent) {
            rec.children.insert(index, child);
        }
        if let Some(rec) = self.containers.get_mut(child) {
            rec.parent = Some(parent);
        }
        for parent_node in self.abstractions(parent).to_vec() {
            let Some(view) = self.nodes.get(parent_node).map(|n| n.view) else {
                continue;
            };
            let Some(child_node) = self.node(view, child) else {
                continue;
            };
            if let Some(n) = self.nodes.get_mut(parent_node) {
                let at = index.min(n.children.len());
                n.children.insert(at, child_node);
            }
            self.set_parent(child_node, Some(parent_node));
        }
        Ok(())
    }

    /// Removes and returns the child of `parent` at `index`.
    ///
    /// The child's nodes stay alive as detached roots of their own partitions.
    pub fn remove_child_at(
        &mut self,
        parent: ContainerId,
        index: usize,
    ) -> Result<ContainerId, SceneError> {
        let rec = self
            .containers
            .get_mut(parent)
            .ok_or(SceneError::StaleContainer(parent))?;
        if index >= rec.children.len() {
            return Err(SceneError::IndexOutOfBounds {
                index,
                len: rec.children.len(),
            });
        }
        let child = rec.children.remove(index);
        if let Some(c) = self.containers.get_mut(child) {
            c.parent = None;
        }
        for parent_node in self.abstractions(parent).to_vec() {
            let Some(n) = self.nodes.get(parent_node) else {
                continue;
            };
            let pos = n
                .children
                .iter()
                .position(|&cn| self.nodes.get(cn).is_some_and(|x| x.container == child));
            if let Some(pos) = pos {
                let child_node = self.nodes.get_mut(parent_node).map(|n| n.children.remove(pos));
                if let Some(child_node) = child_node {
                    self.set_parent(child_node, None);
                }
            }
        }
        Ok(child)
    }

    /// Removes `child` from `parent`.
    pub fn remove_child(&mut self, parent: ContainerId, child: ContainerId) -> Result<(), SceneError> {
        let index = self
            .containers
            .get(parent)
            .ok_or(SceneError::StaleContainer(parent))?
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(SceneError::StaleContainer(child))?;
        self.remove_child_at(parent, index).map(|_| ())
    }

    /// Destroys a container and every node representing it.
    ///
    /// The container is removed from its parent first. Its children become
    /// parentless containers and their nodes are cleared with it.
    pub fn dispose_container(&mut self, container: ContainerId) -> Result<(), SceneError> {
        let rec = self
            .containers
            .get(container)
            .ok_or(SceneError::StaleContainer(container))?;
        let parent = rec.parent;
        let companion = rec.scroll_companion;
        if let Some(parent) = parent {
            self.remove_child(parent, container)?;
        }
        for node in self.abstractions(container).to_vec() {
            self.clear_node(node);
        }
        if let Some(rec) = self.containers.remove(container) {
            for child in rec.children {
                if let Some(c) = self.containers.get_mut(child) {
                    c.parent = None;
                }
            }
        }
        if let Some(companion) = companion {
            self.dispose_container(companion)?;
        }
        log::debug!("disposed container {container:?}");
        Ok(())
    }

    /// Applies `edit` to the container's props and invalidates `property` on
    /// every node of the container if `edit` reports a change.
    fn edit_props(
        &mut self,
        container: ContainerId,
        property: HierarchicalProperty,
        edit: impl FnOnce(&mut ContainerProps) -> bool,
    ) -> bool {
        let Some(rec) = self.containers.get_mut(container) else {
            log::warn!("ignoring edit of stale container {container:?}");
            return false;
        };
        if !edit(&mut rec.props) {
            return false;
        }
        self.invalidate_property(container, property);
        true
    }

    /// Invalidates `property` on every node of the container.
    pub fn invalidate_property(&mut self, container: ContainerId, property: HierarchicalProperty) {
        if property.is_empty() {
            return;
        }
        for node in self.abstractions(container).to_vec() {
            self.invalidate_hierarchical_property(node, property);
        }
    }

    /// Replaces the container's props wholesale, invalidating everything.
    pub fn set_props(&mut self, container: ContainerId, props: ContainerProps) {
        let kind_changed = self
            .containers
            .get(container)
            .is_some_and(|c| c.props.partition_kind != props.partition_kind);
        self.edit_props(container, HierarchicalProperty::ALL, |p| {
            *p = props;
            true
        });
        self.bump_transform_generations(container);
        if kind_changed {
            self.refresh_container_partitions(container);
        }
    }

    /// Sets the local transform.
    pub fn set_transform(&mut self, container: ContainerId, transform: glam::DMat4) {
        if self.edit_props(container, HierarchicalProperty::SCENE_TRANSFORM, |p| {
            let changed = p.transform != transform;
            p.transform = transform;
            changed
        }) {
            self.bump_transform_generations(container);
        }
    }

    /// Sets the registration matrix.
    pub fn set_registration(&mut self, container: ContainerId, registration: Option<glam::DMat4>) {
        if self.edit_props(container, HierarchicalProperty::SCENE_TRANSFORM, |p| {
            let changed = p.registration != registration;
            p.registration = registration;
            changed
        }) {
            self.bump_transform_generations(container);
        }
    }

    /// Sets the registration alignment mode.
    pub fn set_alignment(&mut self, container: ContainerId, alignment: crate::AlignmentMode) {
        if self.edit_props(container, HierarchicalProperty::SCENE_TRANSFORM, |p| {
            let changed = p.alignment != alignment;
            p.alignment = alignment;
            changed
        }) {
            self.bump_transform_generations(container);
        }
    }

    /// Sets the render orientation.
    pub fn set_orientation(&mut self, container: ContainerId, orientation: crate::OrientationMode) {
        self.edit_props(container, HierarchicalProperty::empty(), |p| {
            p.orientation = orientation;
            true
        });
    }

    /// Sets the local color transform.
    pub fn set_color_transform(&mut self, container: ContainerId, ct: crate::ColorTransform) {
        self.edit_props(container, HierarchicalProperty::COLOR_TRANSFORM, |p| {
            p.color_transform = ct;
            true
        });
    }

    /// Sets the own visibility flag.
    pub fn set_visible(&mut self, container: ContainerId, visible: bool) {
        self.edit_props(container, HierarchicalProperty::VISIBLE, |p| {
            let changed = p.visible != visible;
            p.visible = visible;
            changed
        });
    }

    /// Sets whether the container itself receives mouse input.
    pub fn set_mouse_enabled(&mut self, container: ContainerId, enabled: bool) {
        self.edit_props(container, HierarchicalProperty::MOUSE_ENABLED, |p| {
            let changed = p.mouse_enabled != enabled;
            p.mouse_enabled = enabled;
            changed
        });
    }

    /// Sets whether descendants receive mouse input.
    pub fn set_mouse_children(&mut self, container: ContainerId, enabled: bool) {
        self.edit_props(container, HierarchicalProperty::MOUSE_ENABLED, |p| {
            let changed = p.mouse_children != enabled;
            p.mouse_children = enabled;
            changed
        });
    }

    /// Sets the explicit mask id.
    pub fn set_mask_id(&mut self, container: ContainerId, mask_id: Option<u32>) {
        self.edit_props(
            container,
            HierarchicalProperty::MASK_ID | HierarchicalProperty::MASKS,
            |p| {
                let changed = p.mask_id != mask_id;
                p.mask_id = mask_id;
                changed
            },
        );
    }

    /// Returns a mask id no container has been assigned by the tree yet.
    pub fn allocate_mask_id(&mut self) -> u32 {
        let id = self.next_mask_id;
        self.next_mask_id += 1;
        id
    }

    /// Sets the containers masking this one.
    ///
    /// Masks without an explicit mask id are assigned a fresh one, which keeps
    /// them out of ordinary picking. Masks also root their own basic partition
    /// unless they already have a partition kind.
    pub fn set_masks(&mut self, container: ContainerId, masks: &[ContainerId]) {
        let Some(rec) = self.containers.get_mut(container) else {
            log::warn!("ignoring masks for stale container {container:?}");
            return;
        };
        rec.masks = masks.iter().copied().collect();
        for &mask in masks {
            let Some(props) = self.containers.get(mask).map(|m| &m.props) else {
                continue;
            };
            let (needs_id, needs_kind) = (props.mask_id.is_none(), props.partition_kind.is_none());
            if needs_id {
                let id = self.allocate_mask_id();
                self.set_mask_id(mask, Some(id));
            }
            if needs_kind {
                self.set_partition_kind(mask, Some(PartitionKind::Basic));
            }
        }
        self.invalidate_property(container, HierarchicalProperty::MASKS);
    }

    /// Sets mask mode.
    pub fn set_mask_mode(&mut self, container: ContainerId, mask_mode: bool) {
        self.edit_props(container, HierarchicalProperty::SCENE_TRANSFORM, |p| {
            let changed = p.mask_mode != mask_mode;
            p.mask_mode = mask_mode;
            changed
        });
    }

    /// Sets the scroll rectangle.
    ///
    /// Content is offset by the rectangle origin and clipped to its size through
    /// a mask-mode companion container.
    pub fn set_scroll_rect(&mut self, container: ContainerId, rect: Option<Rect>) {
        let changed = self.edit_props(
            container,
            HierarchicalProperty::SCENE_TRANSFORM | HierarchicalProperty::MASKS,
            |p| {
                let changed = p.scroll_rect != rect;
                p.scroll_rect = rect;
                changed
            },
        );
        if !changed {
            return;
        }
        self.bump_transform_generations(container);
        let Some(rect) = rect else {
            return;
        };
        let quad = Rect::new(0.0, 0.0, rect.width(), rect.height());
        let companion = self.containers.get(container).and_then(|c| c.scroll_companion);
        match companion {
            Some(companion) => {
                self.edit_props(companion, HierarchicalProperty::SCENE_TRANSFORM, |p| {
                    p.scroll_rect = Some(rect);
                    true
                });
                self.bump_transform_generations(companion);
                self.set_content(companion, Some(alloc::vec![Traversable::Quad(quad)]));
            }
            None => {
                let mask_id = self.allocate_mask_id();
                let props = ContainerProps {
                    mask_mode: true,
                    mask_id: Some(mask_id),
                    scroll_rect: Some(rect),
                    partition_kind: Some(PartitionKind::Basic),
                    asset_type: AssetType::Shape,
                    ..ContainerProps::default()
                };
                let companion =
                    self.create_entity(props, alloc::vec![Traversable::Quad(quad)]);
                if let Some(c) = self.containers.get_mut(container) {
                    c.scroll_companion = Some(companion);
                }
            }
        }
    }

    /// Sets the scale9 grid.
    pub fn set_scale9_grid(&mut self, container: ContainerId, grid: Option<Rect>) {
        self.edit_props(container, HierarchicalProperty::SCALE9, |p| {
            let changed = p.scale9_grid != grid;
            p.scale9_grid = grid;
            changed
        });
    }

    /// Sets the blend mode.
    pub fn set_blend_mode(&mut self, container: ContainerId, blend_mode: crate::BlendMode) {
        self.edit_props(container, HierarchicalProperty::COLOR_TRANSFORM, |p| {
            let changed = p.blend_mode != blend_mode;
            p.blend_mode = blend_mode;
            changed
        });
    }

    /// Sets cache-as-bitmap.
    pub fn set_cache_as_bitmap(&mut self, container: ContainerId, cache: bool) {
        self.edit_props(container, HierarchicalProperty::empty(), |p| {
            p.cache_as_bitmap = cache;
            true
        });
    }

    /// Sets whether filters are applied.
    pub fn set_has_filters(&mut self, container: ContainerId, has_filters: bool) {
        self.edit_props(container, HierarchicalProperty::empty(), |p| {
            p.has_filters = has_filters;
            true
        });
    }

    /// Sets the partition kind this container roots, or `None` to share its parent's.
    pub fn set_partition_kind(&mut self, container: ContainerId, kind: Option<PartitionKind>) {
        let changed = self.edit_props(container, HierarchicalProperty::empty(), |p| {
            let changed = p.partition_kind != kind;
            p.partition_kind = kind;
            changed
        });
        if changed {
            self.refresh_container_partitions(container);
        }
    }

    /// Sets the default bounding volume type.
    pub fn set_default_bounding_volume(
        &mut self,
        container: ContainerId,
        volume: crate::BoundingVolumeType,
    ) {
        self.edit_props(container, HierarchicalProperty::empty(), |p| {
            p.default_bounding_volume = volume;
            true
        });
        self.invalidate_content(container);
    }

    /// Sets tab navigation state.
    pub fn set_tab(&mut self, container: ContainerId, enabled: bool, index: Option<u32>) {
        self.edit_props(container, HierarchicalProperty::empty(), |p| {
            p.tab_enabled = enabled;
            p.tab_index = index;
            true
        });
        self.invalidate_content(container);
    }

    /// Sets whether a bounds primitive is shown.
    pub fn set_bounds_visible(&mut self, container: ContainerId, visible: bool) {
        self.edit_props(container, HierarchicalProperty::empty(), |p| {
            p.bounds_visible = visible;
            true
        });
    }

    /// Sets whether the container, when used as a pick object, is parented to its owner.
    pub fn set_pick_object_from_timeline(&mut self, container: ContainerId, from_timeline: bool) {
        self.edit_props(container, HierarchicalProperty::empty(), |p| {
            p.pick_object_from_timeline = from_timeline;
            true
        });
    }

    /// Sets the pick object: a container whose content replaces this one's for picking.
    ///
    /// The pick object is given its own basic partition unless it already
    /// roots one.
    pub fn set_pick_object(&mut self, container: ContainerId, pick_object: Option<ContainerId>) {
        let Some(rec) = self.containers.get_mut(container) else {
            log::warn!("ignoring pick object for stale container {container:?}");
            return;
        };
        rec.pick_object = pick_object;
        if let Some(po) = pick_object {
            let needs_kind = self
                .containers
                .get(po)
                .is_some_and(|c| c.props.partition_kind.is_none());
            if needs_kind {
                self.set_partition_kind(po, Some(PartitionKind::Basic));
            }
        }
        for node in self.abstractions(container).to_vec() {
            self.pick_object_node(node);
        }
    }

    /// Sets or clears the entity content.
    ///
    /// `Some` makes the container an entity (registering or re-queueing its
    /// entity nodes); `None` clears them.
    pub fn set_content(&mut self, container: ContainerId, content: Option<EntityContent>) {
        let Some(rec) = self.containers.get_mut(container) else {
            log::warn!("ignoring content for stale container {container:?}");
            return;
        };
        let clearing = content.is_none();
        rec.content = content;
        rec.content_generation += 1;
        for node in self.abstractions(container).to_vec() {
            if clearing {
                self.clear_entity(node);
            } else {
                self.invalidate_entity(node);
            }
        }
    }

    /// Marks the container's content as changed without replacing it.
    ///
    /// Partitions rooted at its nodes are invalidated and entity nodes re-queued.
    pub fn invalidate_content(&mut self, container: ContainerId) {
        let Some(rec) = self.containers.get_mut(container) else {
            return;
        };
        rec.content_generation += 1;
        for node in self.abstractions(container).to_vec() {
            self.on_invalidate(node);
        }
    }

    /// Installs or removes the container's controller.
    pub fn set_controller(
        &mut self,
        container: ContainerId,
        controller: Option<Box<dyn ContainerController>>,
    ) {
        if let Some(rec) = self.containers.get_mut(container) {
            rec.controller = controller;
        }
    }

    fn bump_transform_generations(&mut self, container: ContainerId) {
        for node in self.abstractions(container).to_vec() {
            if let Some(n) = self.nodes.get_mut(node) {
                n.transform_generation += 1;
            }
        }
    }

    fn refresh_container_partitions(&mut self, container: ContainerId) {
        for node in self.abstractions(container).to_vec() {
            self.refresh_partition(node);
        }
    }

    // --- views ----------------------------------------------------------

    /// Creates a view using the configured default partition kind.
    pub fn create_view(&mut self) -> ViewId {
        self.create_view_with(self.config.default_partition)
    }

    /// Creates a view whose root partitions are of `kind`.
    pub fn create_view_with(&mut self, kind: PartitionKind) -> ViewId {
        self.views.insert(View {
            kind,
            nodes: HashMap::new(),
        })
    }

    /// Returns `true` if the view handle is live.
    pub fn is_view_alive(&self, view: ViewId) -> bool {
        self.views.contains(view)
    }

    /// Destroys a view and all of its nodes.
    pub fn remove_view(&mut self, view: ViewId) {
        let Some(v) = self.views.get(view) else {
            return;
        };
        let mut roots: Vec<NodeId> = v
            .nodes
            .values()
            .copied()
            .filter(|&n| self.nodes.get(n).is_some_and(|n| n.parent.is_none()))
            .collect();
        roots.sort();
        for root in roots {
            self.clear_node(root);
        }
        if let Some(v) = self.views.get(view) {
            let mut rest: Vec<NodeId> = v.nodes.values().copied().collect();
            rest.sort();
            for node in rest {
                self.clear_node(node);
            }
        }
        self.views.remove(view);
        log::debug!("removed view {view:?}");
    }

    /// Returns the node for `container` in `view`, creating it (and nodes for the
    /// container's descendants) if needed.
    pub fn node(&mut self, view: ViewId, container: ContainerId) -> Option<NodeId> {
        if let Some(&node) = self.views.get(view)?.nodes.get(&container) {
            return Some(node);
        }
        let rec = self.containers.get(container)?;
        let children = rec.children.clone();
        let is_entity = rec.content.is_some();

        let id = self.nodes.insert(ContainerNode::new(container, view));
        self.views.get_mut(view)?.nodes.insert(container, id);
        if let Some(rec) = self.containers.get_mut(container) {
            rec.abstractions.push(id);
        }
        self.refresh_partition(id);
        for child in children {
            if let Some(child_node) = self.node(view, child) {
                if let Some(n) = self.nodes.get_mut(id) {
                    n.children.push(child_node);
                }
                self.set_parent(child_node, Some(id));
            }
        }
        if is_entity {
            self.invalidate_entity(id);
        }
        log::trace!("created node {id:?} for {container:?} in {view:?}");
        Some(id)
    }

    /// Returns the node for `container` in `view` without creating it.
    pub fn existing_node(&self, view: ViewId, container: ContainerId) -> Option<NodeId> {
        self.views.get(view)?.nodes.get(&container).copied()
    }

    // --- node structure ---------------------------------------------------

    /// Returns `true` if the node handle is live.
    pub fn is_node_alive(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Returns the container the node represents.
    pub fn node_container(&self, node: NodeId) -> Option<ContainerId> {
        self.nodes.get(node).map(|n| n.container)
    }

    /// Returns the view owning the node.
    pub fn node_view(&self, node: NodeId) -> Option<ViewId> {
        self.nodes.get(node).map(|n| n.view)
    }

    /// Returns the props of the node's container.
    pub fn node_props(&self, node: NodeId) -> Option<&ContainerProps> {
        self.container_props(self.node_container(node)?)
    }

    /// Returns the node's parent.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    /// Returns the node's children in order.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the partition the node belongs to.
    pub fn partition_of(&self, node: NodeId) -> Option<PartitionId> {
        self.nodes.get(node).map(|n| n.partition)
    }

    /// Number of live nodes across all views.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_entity_container(&self, node: NodeId) -> bool {
        self.nodes
            .get(node)
            .and_then(|n| self.containers.get(n.container))
            .is_some_and(|c| c.content.is_some())
    }

    /// Nodes wired below `node`: children, a parented pick-object node and the
    /// scroll-rect companion.
    pub(crate) fn dependents(&self, node: NodeId) -> SmallVec<[NodeId; 8]> {
        let Some(n) = self.nodes.get(node) else {
            return SmallVec::new();
        };
        let mut out: SmallVec<[NodeId; 8]> = n.children.iter().copied().collect();
        if let Some(po) = n.pick_object_node {
            out.push(po);
        }
        if let Some(sr) = n.scroll_rect_node {
            out.push(sr);
        }
        out
    }

    /// Re-parents a node, relinking partitions and invalidating everything.
    ///
    /// Callers keep the children lists in sync.
    pub(crate) fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) {
        assert!(parent != Some(node), "node {node:?} cannot be its own parent");
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.parent = parent;
        self.refresh_partition(node);
        if parent.is_some() && self.is_entity_container(node) {
            self.invalidate_entity(node);
        }
        self.invalidate_hierarchical_property(node, HierarchicalProperty::ALL);
    }

    /// Recomputes which partition `node` belongs to, creating or dropping the
    /// partition it roots and relinking nested partitions below it.
    pub(crate) fn refresh_partition(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        assert!(n.parent != Some(node), "node {node:?} resolves itself as parent");
        let kind = self
            .containers
            .get(n.container)
            .and_then(|c| c.props.partition_kind);
        let parent_partition = n
            .parent
            .and_then(|p| self.nodes.get(p))
            .map(|p| p.partition);
        let old_partition = n.partition;
        let own = n.own_partition;
        let view_kind = self.views.get(n.view).map_or(self.config.default_partition, |v| v.kind);

        let new_partition = match (kind, parent_partition) {
            (None, Some(shared)) => {
                if let Some(own) = own {
                    if let Some(n) = self.nodes.get_mut(node) {
                        n.own_partition = None;
                    }
                    self.drop_partition(own);
                }
                shared
            }
            (kind, parent_partition) => {
                let kind = kind.unwrap_or(view_kind);
                let own = match own.filter(|&p| self.partitions.contains(p)) {
                    Some(p) => {
                        if let Some(part) = self.partitions.get_mut(p) {
                            part.kind = kind;
                        }
                        p
                    }
                    None => {
                        let p = self.partitions.insert(Partition::new(node, kind));
                        log::debug!("partition {p:?} ({kind:?}) rooted at {node:?}");
                        p
                    }
                };
                if let Some(n) = self.nodes.get_mut(node) {
                    n.own_partition = Some(own);
                }
                let pinned = self.partitions.get(own).is_some_and(|p| p.pinned_parent);
                if !pinned {
                    self.link_partition(own, parent_partition);
                }
                own
            }
        };

        if let Some(n) = self.nodes.get_mut(node) {
            n.partition = new_partition;
        }
        if old_partition != new_partition {
            let had_entity = self
                .nodes
                .get_mut(node)
                .and_then(|n| n.entity.as_mut())
                .map(|e| core::mem::replace(&mut e.partition, new_partition));
            if let Some(old) = had_entity {
                self.dequeue_entity(old, node);
                self.invalidate_entity(node);
            }
            for dep in self.dependents(node) {
                self.refresh_partition(dep);
            }
        } else {
            // Nested roots below still need their parent link checked.
            for dep in self.dependents(node) {
                let nested = self.nodes.get(dep).is_some_and(|d| d.own_partition.is_some());
                if nested {
                    self.refresh_partition(dep);
                }
            }
        }
    }

    /// Destroys a node, its entity sub-node and its descendants.
    pub(crate) fn clear_node(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        let children = n.children.clone();
        let parent = n.parent;
        let pick_object_node = n.pick_object_node;
        let scroll_rect_node = n.scroll_rect_node;
        let container = n.container;
        let view = n.view;

        self.clear_entity(node);
        for child in children {
            self.clear_node(child);
        }
        if let Some(po) = pick_object_node {
            if self.parent(po) == Some(node) {
                self.set_parent(po, None);
            }
        }
        if let Some(sr) = scroll_rect_node {
            self.clear_node(sr);
        }
        if let Some(own) = self.nodes.get(node).and_then(|n| n.own_partition) {
            self.drop_partition(own);
        }
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|&c| c != node);
                if p.pick_object_node == Some(node) {
                    p.pick_object_node = None;
                    p.pick_object = None;
                }
                if p.scroll_rect_node == Some(node) {
                    p.scroll_rect_node = None;
                    p.scroll_rect = None;
                }
            }
        }
        if let Some(v) = self.views.get_mut(view) {
            v.nodes.remove(&container);
        }
        if let Some(rec) = self.containers.get_mut(container) {
            rec.abstractions.retain(|a| *a != node);
        }
        self.nodes.remove(node);
        log::trace!("cleared node {node:?}");
    }
}
