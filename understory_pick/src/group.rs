// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The picking context: pickers per partition and pick entities per node.

use glam::DMat4;
use hashbrown::HashMap;
use understory_partition::{NodeId, PartitionId, PartitionTree};

use crate::{BoundsPicker, PickEntity, PickableRegistry, RaycastPicker, TabPicker};

/// Tunables shared by every picker of a [`PickGroup`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickConfig {
    /// Targets remembered per volume type and owner.
    pub volume_cache_capacity: usize,
    /// Height of the rows tab order groups entities into.
    pub tab_row_spacing: f64,
    /// Scale used instead of zero when a size setter would collapse an axis.
    pub minimal_scale: f64,
    /// Initial `find_closest_collision` of new raycast pickers.
    pub find_closest_collision: bool,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            volume_cache_capacity: 8,
            tab_row_spacing: 10.0,
            minimal_scale: 0.00001,
            find_closest_collision: false,
        }
    }
}

/// Pickers and pick entities for one scene.
///
/// Every query takes the [`PartitionTree`] it runs against. Pickers are
/// created on first use for the partition they are asked about and live until
/// [`clear_all`](Self::clear_all) or [`prune`](Self::prune).
#[derive(Debug, Default)]
pub struct PickGroup {
    pub(crate) config: PickConfig,
    pub(crate) registry: PickableRegistry,
    pub(crate) raycast: HashMap<PartitionId, RaycastPicker>,
    pub(crate) bounds: HashMap<PartitionId, BoundsPicker>,
    pub(crate) tabs: HashMap<PartitionId, TabPicker>,
    pub(crate) entities: HashMap<NodeId, PickEntity>,
}

impl PickGroup {
    /// Creates a group with the default configuration and pickables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a group with `config`.
    pub fn with_config(config: PickConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PickConfig {
        &self.config
    }

    /// Returns the pickable factories.
    pub fn registry(&self) -> &PickableRegistry {
        &self.registry
    }

    /// Replaces the pickable factories. Every entity rebuilds its pickables.
    pub fn set_registry(&mut self, registry: PickableRegistry) {
        self.registry = registry;
        for entity in self.entities.values_mut() {
            entity.reset();
        }
        for picker in self.bounds.values_mut() {
            picker.reset();
        }
    }

    /// The raycast picker for `partition`, created on first use.
    pub fn raycast_picker(
        &mut self,
        tree: &PartitionTree,
        partition: PartitionId,
    ) -> Option<&mut RaycastPicker> {
        let root = live_root(tree, partition)?;
        let find_closest = self.config.find_closest_collision;
        Some(
            self.raycast
                .entry(partition)
                .or_insert_with(|| RaycastPicker::new(partition, root, find_closest)),
        )
    }

    /// The bounds picker for `partition`, created on first use.
    pub fn bounds_picker(
        &mut self,
        tree: &PartitionTree,
        partition: PartitionId,
    ) -> Option<&mut BoundsPicker> {
        let root = live_root(tree, partition)?;
        Some(
            self.bounds
                .entry(partition)
                .or_insert_with(|| BoundsPicker::new(partition, root)),
        )
    }

    /// The tab picker for `partition`, created on first use.
    pub fn tab_picker(
        &mut self,
        tree: &PartitionTree,
        partition: PartitionId,
    ) -> Option<&mut TabPicker> {
        let root = live_root(tree, partition)?;
        Some(
            self.tabs
                .entry(partition)
                .or_insert_with(|| TabPicker::new(partition, root)),
        )
    }

    /// The pick entity for an entity node, created on first use.
    pub fn pick_entity(&mut self, tree: &PartitionTree, node: NodeId) -> Option<&mut PickEntity> {
        if !self.ensure_entity(tree, node) {
            return None;
        }
        self.entities.get_mut(&node)
    }

    /// Number of pickers of every kind.
    pub fn picker_count(&self) -> usize {
        self.raycast.len() + self.bounds.len() + self.tabs.len()
    }

    /// Number of pick entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Drops every picker and pick entity.
    pub fn clear_all(&mut self) {
        self.raycast.clear();
        self.bounds.clear();
        self.tabs.clear();
        self.entities.clear();
    }

    /// Drops pickers of dead partitions and entities of dead or non-entity nodes.
    pub fn prune(&mut self, tree: &PartitionTree) {
        let before = self.picker_count() + self.entity_count();
        self.raycast.retain(|&p, _| tree.is_partition_alive(p));
        self.bounds.retain(|&p, _| tree.is_partition_alive(p));
        self.tabs.retain(|&p, _| tree.is_partition_alive(p));
        self.entities.retain(|&n, _| tree.entity(n).is_some());
        let dropped = before - self.picker_count() - self.entity_count();
        if dropped > 0 {
            log::debug!("pruned {dropped} pickers and pick entities");
        }
    }

    /// Takes the raycast picker out of the group so it can traverse while the
    /// group stays borrowable. Pair with [`put_raycast`](Self::put_raycast).
    pub(crate) fn take_raycast(
        &mut self,
        tree: &PartitionTree,
        partition: PartitionId,
    ) -> Option<RaycastPicker> {
        if let Some(picker) = self.raycast.remove(&partition) {
            return Some(picker);
        }
        let root = live_root(tree, partition)?;
        log::trace!("new raycast picker for {partition:?}");
        Some(RaycastPicker::new(
            partition,
            root,
            self.config.find_closest_collision,
        ))
    }

    pub(crate) fn put_raycast(&mut self, picker: RaycastPicker) {
        self.raycast.insert(picker.partition(), picker);
    }

    /// Makes sure a pick entity exists for `node` and matches its content.
    pub(crate) fn ensure_entity(&mut self, tree: &PartitionTree, node: NodeId) -> bool {
        let container = match (tree.entity(node), tree.node_container(node)) {
            (Some(_), Some(container)) => container,
            _ => {
                self.entities.remove(&node);
                return false;
            }
        };
        let capacity = self.config.volume_cache_capacity;
        let entity = self
            .entities
            .entry(node)
            .or_insert_with(|| PickEntity::new(node, container, capacity));
        entity.refresh(tree, &self.registry);
        true
    }
}

fn live_root(tree: &PartitionTree, partition: PartitionId) -> Option<NodeId> {
    let root = tree.partition_root(partition);
    if root.is_none() {
        log::warn!("no picker for stale partition {partition:?}");
    }
    root
}

/// Transform generations a volume of `owner` in `target` space depends on.
///
/// Both world matrices are brought up to date first, so later edits above
/// either node bump their generations.
pub(crate) fn transform_stamp(
    tree: &mut PartitionTree,
    owner: NodeId,
    target: NodeId,
) -> Option<(u64, u64)> {
    if owner == target {
        return None;
    }
    tree.matrix3d(owner);
    tree.matrix3d(target);
    Some((
        tree.transform_generation(owner),
        tree.transform_generation(target),
    ))
}

/// Matrix taking `owner`'s local space into `target`'s, or `None` when they match.
pub(crate) fn volume_matrix(
    tree: &mut PartitionTree,
    owner: NodeId,
    target: NodeId,
) -> Option<DMat4> {
    if owner == target {
        return None;
    }
    if let Some(m) = tree.relative_matrix(owner, target) {
        return Some(m);
    }
    Some(tree.inverse_matrix3d(target) * tree.matrix3d(owner))
}

/// `node` is `root` or lies below it.
pub(crate) fn is_within(tree: &PartitionTree, node: NodeId, root: NodeId) -> bool {
    node == root || tree.is_descendant(node, root)
}
