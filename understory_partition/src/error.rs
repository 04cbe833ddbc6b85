// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors returned by structural scene operations.

use core::fmt;

use crate::{ContainerId, NodeId};

/// Error returned by structural edits of the container hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneError {
    /// The container handle is stale or was never issued.
    StaleContainer(ContainerId),
    /// The node handle is stale or was never issued.
    StaleNode(NodeId),
    /// A child index was outside `0..=len` (insert) or `0..len` (remove).
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Number of children.
        len: usize,
    },
    /// Adding the child would make a container its own ancestor.
    Cycle {
        /// Prospective parent.
        parent: ContainerId,
        /// Prospective child.
        child: ContainerId,
    },
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleContainer(id) => write!(f, "container {id:?} is not alive"),
            Self::StaleNode(id) => write!(f, "node {id:?} is not alive"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "child index {index} out of bounds for {len} children")
            }
            Self::Cycle { parent, child } => write!(
                f,
                "adding {child:?} under {parent:?} would create a cycle"
            ),
        }
    }
}

impl core::error::Error for SceneError {}
