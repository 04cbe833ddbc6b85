// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visitor-style traversal of a partition's nodes.

use smallvec::SmallVec;

use crate::tree::PartitionTree;
use crate::{NodeId, PartitionId};

/// A node as offered to a traverser: either the container side or the
/// entity side of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// The container node.
    Container(NodeId),
    /// The entity sub-node of a container node.
    Entity(NodeId),
}

impl NodeRef {
    /// The node, regardless of side.
    pub fn node(self) -> NodeId {
        match self {
            Self::Container(n) | Self::Entity(n) => n,
        }
    }
}

/// Order in which siblings and entities are visited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Entity before children, children in index order.
    #[default]
    BackToFront,
    /// Children in reverse index order, entity last.
    FrontToBack,
}

/// Visitor driven by [`PartitionTree::traverse`].
pub trait PartitionTraverser {
    /// Partition the traverser was created for.
    fn partition(&self) -> PartitionId;

    /// Called when traversal crosses into a nested partition.
    ///
    /// Returning `false` skips the nested partition's subtree, typically after
    /// delegating it to another traverser.
    fn enter_partition(&mut self, tree: &mut PartitionTree, partition: PartitionId) -> bool;

    /// Called for every node. Returning `false` prunes the node (and, for a
    /// container, its descendants).
    fn enter_node(&mut self, tree: &mut PartitionTree, node: NodeRef) -> bool;

    /// Called for every entity that was entered.
    fn apply_entity(&mut self, tree: &mut PartitionTree, node: NodeId);

    /// Visiting order.
    fn order(&self) -> TraversalOrder {
        TraversalOrder::BackToFront
    }
}

impl PartitionTree {
    /// Walks `partition` from its root with `traverser`.
    pub fn traverse<T: PartitionTraverser + ?Sized>(
        &mut self,
        partition: PartitionId,
        traverser: &mut T,
    ) {
        if let Some(root) = self.partition_root(partition) {
            self.accept_traverser(root, traverser);
        }
    }

    /// Walks the subtree at `node` with `traverser`.
    ///
    /// A node rooting its partition flushes that partition's update queue
    /// first.
    pub fn accept_traverser<T: PartitionTraverser + ?Sized>(
        &mut self,
        node: NodeId,
        traverser: &mut T,
    ) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        let partition = n.partition;
        if n.own_partition == Some(partition) {
            self.update_entities(partition);
        }
        if partition != traverser.partition() && !traverser.enter_partition(self, partition) {
            return;
        }
        if !traverser.enter_node(self, NodeRef::Container(node)) {
            return;
        }
        self.scroll_rect_node(node);

        let children: SmallVec<[NodeId; 16]> = self.children(node).iter().copied().collect();
        match traverser.order() {
            TraversalOrder::BackToFront => {
                self.visit_entity(node, traverser);
                for child in children {
                    self.accept_traverser(child, traverser);
                }
            }
            TraversalOrder::FrontToBack => {
                for child in children.into_iter().rev() {
                    self.accept_traverser(child, traverser);
                }
                self.visit_entity(node, traverser);
            }
        }
    }

    fn visit_entity<T: PartitionTraverser + ?Sized>(&mut self, node: NodeId, traverser: &mut T) {
        if self.entity(node).is_none() {
            return;
        }
        if traverser.enter_node(self, NodeRef::Entity(node)) {
            traverser.apply_entity(self, node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContainerProps, PartitionKind};
    use alloc::vec;
    use alloc::vec::Vec;

    struct Recorder {
        partition: PartitionId,
        order: TraversalOrder,
        enter_nested: bool,
        entered: Vec<NodeRef>,
        applied: Vec<NodeId>,
        nested: Vec<PartitionId>,
    }

    impl Recorder {
        fn new(partition: PartitionId, order: TraversalOrder) -> Self {
            Self {
                partition,
                order,
                enter_nested: true,
                entered: Vec::new(),
                applied: Vec::new(),
                nested: Vec::new(),
            }
        }
    }

    impl PartitionTraverser for Recorder {
        fn partition(&self) -> PartitionId {
            self.partition
        }

        fn enter_partition(&mut self, _: &mut PartitionTree, partition: PartitionId) -> bool {
            self.nested.push(partition);
            self.enter_nested
        }

        fn enter_node(&mut self, _: &mut PartitionTree, node: NodeRef) -> bool {
            self.entered.push(node);
            true
        }

        fn apply_entity(&mut self, _: &mut PartitionTree, node: NodeId) {
            self.applied.push(node);
        }

        fn order(&self) -> TraversalOrder {
            self.order
        }
    }

    fn scene() -> (PartitionTree, NodeId, NodeId, NodeId, PartitionId) {
        let mut tree = PartitionTree::new();
        let root = tree.create_entity(ContainerProps::default(), vec![]);
        let a = tree.create_entity(ContainerProps::default(), vec![]);
        let b = tree.create_entity(
            ContainerProps {
                partition_kind: Some(PartitionKind::Basic),
                ..ContainerProps::default()
            },
            vec![],
        );
        tree.add_child(root, a).unwrap();
        tree.add_child(root, b).unwrap();
        let view = tree.create_view();
        let rn = tree.node(view, root).unwrap();
        let an = tree.existing_node(view, a).unwrap();
        let bn = tree.existing_node(view, b).unwrap();
        let p = tree.partition_of(rn).unwrap();
        (tree, rn, an, bn, p)
    }

    #[test]
    fn back_to_front_visits_entity_then_children() {
        let (mut tree, rn, an, bn, p) = scene();
        let mut rec = Recorder::new(p, TraversalOrder::BackToFront);
        tree.traverse(p, &mut rec);
        assert_eq!(rec.applied, vec![rn, an, bn]);
        assert_eq!(rec.nested, vec![tree.partition_of(bn).unwrap()]);
        assert!(tree.pending_entities(p).is_empty());
    }

    #[test]
    fn front_to_back_reverses_children() {
        let (mut tree, rn, an, bn, p) = scene();
        let mut rec = Recorder::new(p, TraversalOrder::FrontToBack);
        tree.traverse(p, &mut rec);
        assert_eq!(rec.applied, vec![bn, an, rn]);
    }

    #[test]
    fn declined_partitions_are_skipped() {
        let (mut tree, rn, an, bn, p) = scene();
        let mut rec = Recorder::new(p, TraversalOrder::BackToFront);
        rec.enter_nested = false;
        tree.traverse(p, &mut rec);
        assert_eq!(rec.applied, vec![rn, an]);
        assert!(!rec.entered.contains(&NodeRef::Container(bn)));
        // The nested partition still flushed its queue on the way in.
        assert!(tree.pending_entities(tree.partition_of(bn).unwrap()).is_empty());
    }
}
