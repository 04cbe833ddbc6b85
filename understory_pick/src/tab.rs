// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tab order over the focusable entities of a partition.
//!
//! Entities with an explicit tab index are grouped by index and visited in
//! ascending index order; entities without one are then left out. When none
//! has an index, entities are ordered in reading order: rows of
//! [`PickConfig::tab_row_spacing`](crate::PickConfig) height top to bottom,
//! left to right within a row.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use understory_partition::{
    AssetType, NodeId, NodeRef, PartitionId, PartitionTraverser, PartitionTree,
};

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::PickGroup;

/// Tab order state of one partition.
#[derive(Clone, Debug)]
pub struct TabPicker {
    partition: PartitionId,
    root: NodeId,
    order: Vec<NodeId>,
    traversed: Option<u64>,
}

impl TabPicker {
    pub(crate) fn new(partition: PartitionId, root: NodeId) -> Self {
        Self {
            partition,
            root,
            order: Vec::new(),
            traversed: None,
        }
    }

    /// The partition this picker orders.
    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Root node of the partition.
    pub fn root(&self) -> NodeId {
        self.root
    }
}

struct TabPass {
    partition: PartitionId,
    unindexed: Vec<NodeId>,
    indexed: BTreeMap<u32, Vec<NodeId>>,
}

impl PartitionTraverser for TabPass {
    fn partition(&self) -> PartitionId {
        self.partition
    }

    fn enter_partition(&mut self, _: &mut PartitionTree, _: PartitionId) -> bool {
        true
    }

    fn enter_node(&mut self, tree: &mut PartitionTree, node: NodeRef) -> bool {
        !tree.is_invisible(node.node())
    }

    fn apply_entity(&mut self, tree: &mut PartitionTree, node: NodeId) {
        let Some(props) = tree.node_props(node) else {
            return;
        };
        let focusable = props.tab_enabled
            && (!props.asset_type.is_text() || props.asset_type == AssetType::InputTextField);
        if !focusable {
            return;
        }
        match props.tab_index {
            Some(index) => self.indexed.entry(index).or_default().push(node),
            None => self.unindexed.push(node),
        }
    }
}

impl TabPass {
    fn into_order(self, tree: &mut PartitionTree, row_spacing: f64) -> Vec<NodeId> {
        if !self.indexed.is_empty() {
            // Within an index, later entries in traversal order come first.
            return self
                .indexed
                .into_values()
                .flat_map(|bucket| bucket.into_iter().rev())
                .collect();
        }
        let spacing = if row_spacing > 0.0 { row_spacing } else { 1.0 };
        let mut rows: BTreeMap<i64, Vec<(f64, NodeId)>> = BTreeMap::new();
        for node in self.unindexed {
            let position = tree.matrix3d(node).w_axis;
            #[expect(
                clippy::cast_possible_truncation,
                reason = "row numbers of on-screen content fit easily"
            )]
            let row = (position.y / spacing).floor() as i64;
            rows.entry(row).or_default().push((position.x, node));
        }
        rows.into_values()
            .flat_map(|mut row| {
                row.sort_by(|a, b| a.0.total_cmp(&b.0));
                row.into_iter().map(|(_, node)| node)
            })
            .collect()
    }
}

impl PickGroup {
    /// Focusable entities of `partition` in tab order.
    pub fn tab_order(&mut self, tree: &mut PartitionTree, partition: PartitionId) -> Vec<NodeId> {
        if !self.ensure_tab_order(tree, partition) {
            return Vec::new();
        }
        self.tabs
            .get(&partition)
            .map(|t| t.order.clone())
            .unwrap_or_default()
    }

    /// The entity after `current` in tab order, wrapping around.
    ///
    /// Starts over at the first entity when `current` is `None` or not
    /// focusable, and returns `current` when nothing is.
    pub fn next_tab_entity(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        current: Option<NodeId>,
    ) -> Option<NodeId> {
        self.step_tab(tree, partition, current, true)
    }

    /// The entity before `current` in tab order, wrapping around.
    ///
    /// Starts over at the first entity when `current` is `None` or not
    /// focusable, and returns `current` when nothing is.
    pub fn prev_tab_entity(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        current: Option<NodeId>,
    ) -> Option<NodeId> {
        self.step_tab(tree, partition, current, false)
    }

    fn step_tab(
        &mut self,
        tree: &mut PartitionTree,
        partition: PartitionId,
        current: Option<NodeId>,
        forward: bool,
    ) -> Option<NodeId> {
        if !self.ensure_tab_order(tree, partition) {
            return current;
        }
        let order = &self.tabs.get(&partition)?.order;
        if order.is_empty() {
            return current;
        }
        let Some(at) = current.and_then(|c| order.iter().position(|&n| n == c)) else {
            return order.first().copied();
        };
        let len = order.len();
        let next = if forward {
            (at + 1) % len
        } else {
            (at + len - 1) % len
        };
        Some(order[next])
    }

    fn ensure_tab_order(&mut self, tree: &mut PartitionTree, partition: PartitionId) -> bool {
        let spacing = self.config.tab_row_spacing;
        let Some(picker) = self.tab_picker(tree, partition) else {
            return false;
        };
        let generation = tree.partition_generation(partition);
        if picker.traversed == Some(generation) && !tree.is_partition_invalid(partition) {
            return true;
        }
        let mut pass = TabPass {
            partition,
            unindexed: Vec::new(),
            indexed: BTreeMap::new(),
        };
        tree.traverse(partition, &mut pass);
        picker.order = pass.into_order(tree, spacing);
        picker.traversed = Some(tree.partition_generation(partition));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Rect;
    use understory_partition::{ContainerId, ContainerProps, Traversable};

    fn field(tree: &mut PartitionTree, x: f64, y: f64, index: Option<u32>) -> ContainerId {
        let c = tree.create_entity(
            ContainerProps::at(x, y, 0.0),
            alloc::vec![Traversable::Quad(Rect::new(0.0, 0.0, 5.0, 5.0))],
        );
        tree.set_tab(c, true, index);
        c
    }

    fn scene(tree: &mut PartitionTree, children: &[ContainerId]) -> PartitionId {
        let root = tree.create_container(ContainerProps::default());
        for &c in children {
            tree.add_child(root, c).unwrap();
        }
        let view = tree.create_view();
        let rn = tree.node(view, root).unwrap();
        tree.partition_of(rn).unwrap()
    }

    fn containers(tree: &PartitionTree, nodes: &[NodeId]) -> Vec<ContainerId> {
        nodes.iter().filter_map(|&n| tree.node_container(n)).collect()
    }

    #[test]
    fn reading_order_by_rows() {
        let mut tree = PartitionTree::new();
        let b = field(&mut tree, 50.0, 2.0, None);
        let a = field(&mut tree, 10.0, 8.0, None);
        let c = field(&mut tree, 0.0, 30.0, None);
        let p = scene(&mut tree, &[c, b, a]);
        let mut group = PickGroup::new();
        let order = group.tab_order(&mut tree, p);
        assert_eq!(containers(&tree, &order), [a, b, c]);
    }

    #[test]
    fn explicit_indices_take_over() {
        let mut tree = PartitionTree::new();
        let late = field(&mut tree, 0.0, 0.0, Some(2));
        let early = field(&mut tree, 100.0, 100.0, Some(1));
        let plain = field(&mut tree, 0.0, 50.0, None);
        let p = scene(&mut tree, &[late, early, plain]);
        let mut group = PickGroup::new();
        let order = group.tab_order(&mut tree, p);
        assert_eq!(containers(&tree, &order), [early, late]);
    }

    #[test]
    fn stepping_wraps_both_ways() {
        let mut tree = PartitionTree::new();
        let a = field(&mut tree, 0.0, 0.0, None);
        let b = field(&mut tree, 20.0, 0.0, None);
        let p = scene(&mut tree, &[a, b]);
        let mut group = PickGroup::new();
        let order = group.tab_order(&mut tree, p);
        let (na, nb) = (order[0], order[1]);
        assert_eq!(group.next_tab_entity(&mut tree, p, None), Some(na));
        assert_eq!(group.next_tab_entity(&mut tree, p, Some(na)), Some(nb));
        assert_eq!(group.next_tab_entity(&mut tree, p, Some(nb)), Some(na));
        assert_eq!(group.prev_tab_entity(&mut tree, p, Some(na)), Some(nb));
    }

    #[test]
    fn hidden_and_static_text_are_skipped() {
        let mut tree = PartitionTree::new();
        let hidden = field(&mut tree, 0.0, 0.0, None);
        let label = tree.create_entity(
            ContainerProps::default().with_asset_type(AssetType::TextField),
            alloc::vec![Traversable::Quad(Rect::new(0.0, 0.0, 5.0, 5.0))],
        );
        tree.set_tab(label, true, None);
        let input = tree.create_entity(
            ContainerProps::default().with_asset_type(AssetType::InputTextField),
            alloc::vec![Traversable::Quad(Rect::new(0.0, 0.0, 5.0, 5.0))],
        );
        tree.set_tab(input, true, None);
        let p = scene(&mut tree, &[hidden, label, input]);
        tree.set_visible(hidden, false);
        let mut group = PickGroup::new();
        let order = group.tab_order(&mut tree, p);
        assert_eq!(containers(&tree, &order), [input]);
    }

    #[test]
    fn empty_order_keeps_current() {
        let mut tree = PartitionTree::new();
        let p = scene(&mut tree, &[]);
        let mut group = PickGroup::new();
        assert_eq!(group.next_tab_entity(&mut tree, p, None), None);
    }
}
