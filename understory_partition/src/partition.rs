// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Partitions: groups of nodes sharing an entity update queue.

use alloc::vec::Vec;

use hashbrown::HashSet;

use crate::flags::HierarchicalProperty;
use crate::props::PartitionKind;
use crate::tree::{PartitionTree, View};
use crate::{NodeId, PartitionId};

#[derive(Debug)]
pub(crate) struct Partition {
    pub(crate) root: NodeId,
    pub(crate) kind: PartitionKind,
    pub(crate) parent: Option<PartitionId>,
    pub(crate) children: Vec<PartitionId>,
    pub(crate) invalid: bool,
    pub(crate) generation: u64,
    queue: Vec<NodeId>,
    queued: HashSet<NodeId>,
    pub(crate) local_node: Option<NodeId>,
    /// Set on local-node partitions, whose parent link is not derived from
    /// their root's parent.
    pub(crate) pinned_parent: bool,
}

impl Partition {
    pub(crate) fn new(root: NodeId, kind: PartitionKind) -> Self {
        Self {
            root,
            kind,
            parent: None,
            children: Vec::new(),
            invalid: true,
            generation: 0,
            queue: Vec::new(),
            queued: HashSet::new(),
            local_node: None,
            pinned_parent: false,
        }
    }
}

impl PartitionTree {
    /// Returns `true` if the partition handle is live.
    pub fn is_partition_alive(&self, partition: PartitionId) -> bool {
        self.partitions.contains(partition)
    }

    /// Node at the root of the partition.
    pub fn partition_root(&self, partition: PartitionId) -> Option<NodeId> {
        self.partitions.get(partition).map(|p| p.root)
    }

    /// Kind of the partition.
    pub fn partition_kind(&self, partition: PartitionId) -> Option<PartitionKind> {
        self.partitions.get(partition).map(|p| p.kind)
    }

    /// Enclosing partition.
    pub fn partition_parent(&self, partition: PartitionId) -> Option<PartitionId> {
        self.partitions.get(partition).and_then(|p| p.parent)
    }

    /// Partitions nested directly inside this one.
    pub fn partition_children(&self, partition: PartitionId) -> &[PartitionId] {
        self.partitions
            .get(partition)
            .map(|p| p.children.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the partition changed since its queue was last flushed.
    pub fn is_partition_invalid(&self, partition: PartitionId) -> bool {
        self.partitions.get(partition).is_some_and(|p| p.invalid)
    }

    /// Counter bumped each time the partition goes from valid to invalid.
    ///
    /// Pickers compare it to decide whether cached results are stale.
    pub fn partition_generation(&self, partition: PartitionId) -> u64 {
        self.partitions.get(partition).map_or(0, |p| p.generation)
    }

    /// Entity nodes waiting in the partition's update queue.
    pub fn pending_entities(&self, partition: PartitionId) -> &[NodeId] {
        self.partitions
            .get(partition)
            .map(|p| p.queue.as_slice())
            .unwrap_or(&[])
    }

    /// Marks the partition and every enclosing partition invalid.
    pub fn invalidate_partition(&mut self, partition: PartitionId) {
        let mut cur = Some(partition);
        while let Some(id) = cur {
            let Some(p) = self.partitions.get_mut(id) else {
                return;
            };
            if !p.invalid {
                p.invalid = true;
                p.generation += 1;
            }
            cur = p.parent;
        }
    }

    /// Flushes the partition's update queue.
    ///
    /// Each queued entity's controller gets its internal update, and the
    /// hierarchical properties it reports are invalidated on the entity node.
    pub fn update_entities(&mut self, partition: PartitionId) {
        let Some(p) = self.partitions.get_mut(partition) else {
            return;
        };
        p.invalid = false;
        if p.queue.is_empty() {
            return;
        }
        let queue = core::mem::take(&mut p.queue);
        p.queued.clear();
        for node in queue {
            let Some(container) = self.node_container(node) else {
                continue;
            };
            let changed = self
                .containers
                .get_mut(container)
                .and_then(|c| {
                    let controller = c.controller.as_mut()?;
                    Some(controller.internal_update(&mut c.props))
                })
                .unwrap_or(HierarchicalProperty::empty());
            self.invalidate_hierarchical_property(node, changed);
            self.stats.entity_updates += 1;
        }
    }

    /// Makes sure the node has an entity sub-node and queues it on its partition.
    pub(crate) fn invalidate_entity(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        let partition = n.partition;
        match n.entity.as_mut() {
            Some(entity) => entity.bounds_primitive_dirty = true,
            None => n.entity = Some(crate::EntityNode::new(partition)),
        }
        let Some(p) = self.partitions.get_mut(partition) else {
            return;
        };
        if p.queued.insert(node) {
            p.queue.push(node);
        }
        self.invalidate_partition(partition);
    }

    /// Drops the node's entity sub-node, leaving its partition's queue.
    pub(crate) fn clear_entity(&mut self, node: NodeId) {
        let Some(entity) = self.nodes.get_mut(node).and_then(|n| n.entity.take()) else {
            return;
        };
        self.dequeue_entity(entity.partition, node);
        self.invalidate_partition(entity.partition);
    }

    pub(crate) fn dequeue_entity(&mut self, partition: PartitionId, node: NodeId) {
        if let Some(p) = self.partitions.get_mut(partition) {
            if p.queued.remove(&node) {
                p.queue.retain(|&n| n != node);
            }
        }
    }

    /// Content-level invalidation of one node.
    pub(crate) fn on_invalidate(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        if let Some(own) = n.own_partition {
            self.invalidate_partition(own);
        }
        if self.is_entity_container(node) {
            self.invalidate_entity(node);
        }
    }

    /// Moves `child` under `parent` in the partition tree, invalidating the
    /// partitions gaining or losing it.
    pub(crate) fn link_partition(&mut self, child: PartitionId, parent: Option<PartitionId>) {
        let Some(c) = self.partitions.get(child) else {
            return;
        };
        let old = c.parent;
        if old == parent {
            return;
        }
        assert!(parent != Some(child), "partition {child:?} cannot nest in itself");
        if let Some(old) = old {
            if let Some(p) = self.partitions.get_mut(old) {
                p.children.retain(|&c| c != child);
            }
            self.invalidate_partition(old);
        }
        if let Some(c) = self.partitions.get_mut(child) {
            c.parent = parent;
        }
        if let Some(parent) = parent {
            if let Some(p) = self.partitions.get_mut(parent) {
                p.children.push(child);
            }
            self.invalidate_partition(parent);
        }
    }

    /// Destroys a partition. Partitions nested in it are orphaned until their
    /// roots are refreshed.
    pub(crate) fn drop_partition(&mut self, partition: PartitionId) {
        self.clear_local_node(partition);
        self.link_partition(partition, None);
        let Some(p) = self.partitions.remove(partition) else {
            return;
        };
        for child in p.children {
            if let Some(c) = self.partitions.get_mut(child) {
                c.parent = None;
            }
        }
        log::debug!("dropped partition {partition:?}");
    }

    /// Local node of the partition, created on first use.
    ///
    /// The local node is a transform-disabled copy of the partition root in a
    /// private view, nested as a child partition. Offscreen rendering uses it
    /// to draw the subtree in its own coordinate space.
    pub fn local_node(&mut self, partition: PartitionId) -> Option<NodeId> {
        let p = self.partitions.get(partition)?;
        if let Some(local) = p.local_node {
            return Some(local);
        }
        let container = self.node_container(p.root)?;
        let kind = p.kind;
        let view = self.views.insert(View {
            kind,
            nodes: hashbrown::HashMap::new(),
        });
        let local = self.node(view, container)?;
        self.set_transform_disabled(local, true);
        let local_partition = self.partition_of(local)?;
        if let Some(lp) = self.partitions.get_mut(local_partition) {
            lp.pinned_parent = true;
        }
        self.link_partition(local_partition, Some(partition));
        if let Some(p) = self.partitions.get_mut(partition) {
            p.local_node = Some(local);
        }
        log::debug!("created local node {local:?} for {partition:?}");
        Some(local)
    }

    /// Drops the partition's local node and its private view.
    pub fn clear_local_node(&mut self, partition: PartitionId) {
        let Some(local) = self
            .partitions
            .get_mut(partition)
            .and_then(|p| p.local_node.take())
        else {
            return;
        };
        if let Some(view) = self.node_view(local) {
            self.remove_view(view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContainerController, ContainerProps, HierarchicalProperty};
    use alloc::boxed::Box;
    use alloc::vec;

    #[test]
    fn invalidation_bumps_generation_once() {
        let mut tree = PartitionTree::new();
        let root = tree.create_container(ContainerProps::default());
        let view = tree.create_view();
        let rn = tree.node(view, root).unwrap();
        let p = tree.partition_of(rn).unwrap();
        tree.update_entities(p);
        assert!(!tree.is_partition_invalid(p));
        let generation = tree.partition_generation(p);

        tree.invalidate_partition(p);
        tree.invalidate_partition(p);
        assert!(tree.is_partition_invalid(p));
        assert_eq!(tree.partition_generation(p), generation + 1);
    }

    #[test]
    fn invalidation_reaches_enclosing_partitions() {
        let mut tree = PartitionTree::new();
        let root = tree.create_container(ContainerProps::default());
        let nested = tree.create_container(ContainerProps {
            partition_kind: Some(PartitionKind::Basic),
            ..ContainerProps::default()
        });
        tree.add_child(root, nested).unwrap();
        let view = tree.create_view();
        let rn = tree.node(view, root).unwrap();
        let nn = tree.existing_node(view, nested).unwrap();
        let rp = tree.partition_of(rn).unwrap();
        let np = tree.partition_of(nn).unwrap();
        tree.update_entities(rp);
        tree.update_entities(np);

        tree.invalidate_content(nested);
        assert!(tree.is_partition_invalid(np));
        assert!(tree.is_partition_invalid(rp));
    }

    struct Spin;

    impl ContainerController for Spin {
        fn internal_update(&mut self, props: &mut ContainerProps) -> HierarchicalProperty {
            props.visible = false;
            HierarchicalProperty::VISIBLE
        }
    }

    #[test]
    fn update_entities_runs_controllers_once() {
        let mut tree = PartitionTree::new();
        let e = tree.create_entity(ContainerProps::default(), vec![]);
        tree.set_controller(e, Some(Box::new(Spin)));
        let view = tree.create_view();
        let en = tree.node(view, e).unwrap();
        let p = tree.partition_of(en).unwrap();
        assert_eq!(tree.pending_entities(p), &[en]);
        assert!(!tree.is_invisible(en));

        tree.update_entities(p);
        assert!(tree.pending_entities(p).is_empty());
        assert_eq!(tree.stats().entity_updates, 1);
        assert!(tree.is_invisible(en));

        tree.update_entities(p);
        assert_eq!(tree.stats().entity_updates, 1);
    }

    #[test]
    fn entities_without_controllers_flush_cleanly() {
        let mut tree = PartitionTree::new();
        let e = tree.create_entity(ContainerProps::default(), vec![]);
        let view = tree.create_view();
        let en = tree.node(view, e).unwrap();
        let p = tree.partition_of(en).unwrap();
        assert!(!tree.is_invisible(en));
        let dirty = tree.dirty(en);

        tree.update_entities(p);
        assert!(tree.pending_entities(p).is_empty());
        assert_eq!(tree.stats().entity_updates, 1);
        assert_eq!(tree.dirty(en), dirty);
        assert!(!tree.is_partition_invalid(p));
    }

    #[test]
    fn moving_an_entity_requeues_it() {
        let mut tree = PartitionTree::new();
        let root = tree.create_container(ContainerProps::default());
        let e = tree.create_entity(ContainerProps::default(), vec![]);
        tree.add_child(root, e).unwrap();
        let view = tree.create_view();
        let rn = tree.node(view, root).unwrap();
        let en = tree.existing_node(view, e).unwrap();
        let p = tree.partition_of(rn).unwrap();
        tree.update_entities(p);
        tree.matrix3d(en);

        tree.set_transform(root, glam::DMat4::from_translation(glam::DVec3::X));
        assert_eq!(tree.pending_entities(p), &[en]);
        assert!(tree.is_partition_invalid(p));
    }

    #[test]
    fn local_node_is_transform_disabled_child_partition() {
        let mut tree = PartitionTree::new();
        let root = tree.create_container(ContainerProps::at(5.0, 5.0, 0.0));
        let child = tree.create_container(ContainerProps::at(1.0, 0.0, 0.0));
        tree.add_child(root, child).unwrap();
        tree.set_visible(root, false);
        let view = tree.create_view();
        let rn = tree.node(view, root).unwrap();
        let p = tree.partition_of(rn).unwrap();

        let local = tree.local_node(p).unwrap();
        assert_eq!(tree.local_node(p), Some(local));
        assert!(tree.is_transform_disabled(local));
        assert!(!tree.is_invisible(local));
        let lp = tree.partition_of(local).unwrap();
        assert_eq!(tree.partition_parent(lp), Some(p));
        assert_eq!(tree.partition_children(p), &[lp]);

        let local_child = tree.children(local)[0];
        assert_eq!(
            tree.position(local_child),
            glam::DVec3::new(1.0, 0.0, 0.0)
        );

        tree.clear_local_node(p);
        assert!(!tree.is_node_alive(local));
        assert!(tree.partition_children(p).is_empty());
    }
}
