// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generational handles for containers, nodes, partitions and views.
//!
//! Every handle is a slot index plus a generation counter. A freed slot bumps
//! its generation when reused, so a stale handle never aliases a different
//! live object.

macro_rules! generational_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(pub(crate) u32, pub(crate) u32);

        impl $name {
            pub(crate) const fn new(idx: u32, generation: u32) -> Self {
                Self(idx, generation)
            }

            pub(crate) const fn idx(self) -> usize {
                self.0 as usize
            }

            /// Returns the generation of the slot this handle refers to.
            pub const fn generation(self) -> u32 {
                self.1
            }
        }

        impl crate::slab::SlotId for $name {
            fn from_parts(idx: u32, generation: u32) -> Self {
                Self::new(idx, generation)
            }

            fn idx(self) -> usize {
                $name::idx(self)
            }

            fn generation(self) -> u32 {
                self.1
            }
        }
    };
}

generational_id! {
    /// Identifier of a scene container record.
    ///
    /// Containers are the scene-side objects a view builds [`NodeId`]s for.
    /// One container has at most one node per view.
    ContainerId
}

generational_id! {
    /// Identifier of a container node: the abstraction of one container in one view.
    ///
    /// The node also identifies its entity sub-node, if the container is an entity.
    NodeId
}

generational_id! {
    /// Identifier of a partition.
    PartitionId
}

generational_id! {
    /// Identifier of a view, the pool that owns a set of container nodes.
    ViewId
}
