// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The vocabulary of "what changed" used by hierarchical invalidation.

bitflags::bitflags! {
    /// Hierarchical properties a node caches and inherits from its parent.
    ///
    /// A set bit in a node's dirty mask means the cached value it guards must be
    /// recomputed before it is read. Invalidating a property marks it dirty on a
    /// node and on its whole subtree; a node where the bit is already dirty stops
    /// the walk.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HierarchicalProperty: u32 {
        /// Inherited mouse-children state.
        const MOUSE_ENABLED   = 0b0000_0001;
        /// Inherited visibility.
        const VISIBLE         = 0b0000_0010;
        /// Effective mask id.
        const MASK_ID         = 0b0000_0100;
        /// Mask list and mask-owner chain.
        const MASKS           = 0b0000_1000;
        /// Concatenated color transform.
        const COLOR_TRANSFORM = 0b0001_0000;
        /// World matrix, its inverse and the derived position.
        const SCENE_TRANSFORM = 0b0010_0000;
        /// Nearest container with a scale9 grid.
        const SCALE9          = 0b0100_0000;
        /// Every hierarchical property.
        const ALL             = 0b0111_1111;
    }
}

#[cfg(test)]
mod tests {
    use super::HierarchicalProperty as P;

    #[test]
    fn delta_only_contains_clean_bits() {
        let dirty = P::VISIBLE | P::MASK_ID;
        let requested = P::VISIBLE | P::SCENE_TRANSFORM;
        let delta = (dirty ^ requested) & requested;
        assert_eq!(delta, P::SCENE_TRANSFORM);
        assert!(P::ALL.contains(P::SCALE9 | P::MOUSE_ENABLED));
    }
}
