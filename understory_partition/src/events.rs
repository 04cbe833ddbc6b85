// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Notifications raised by nodes, and counters for observing the tree's work.

use crate::NodeId;

/// A notification raised by a node when a cached value it exposes goes stale.
///
/// Events are only recorded when
/// [`PartitionConfig::record_events`](crate::PartitionConfig::record_events) is
/// set; collect them with [`PartitionTree::drain_events`](crate::PartitionTree::drain_events).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeEvent {
    /// The node's world matrix became dirty.
    InvalidateMatrix3D(NodeId),
    /// The node's color transform was invalidated.
    ///
    /// Raised on every color transform invalidation, even when the bit was
    /// already dirty.
    InvalidateColorTransform(NodeId),
}

/// Work counters. Reset with [`PartitionTree::reset_stats`](crate::PartitionTree::reset_stats).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitionStats {
    /// Nodes that received at least one newly dirty hierarchical bit.
    pub propagation_visits: u64,
    /// World matrix recomputations.
    pub matrix_recomputes: u64,
    /// Entities flushed from partition update queues.
    pub entity_updates: u64,
}
