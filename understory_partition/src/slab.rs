// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generational slot storage backing every arena in the tree.

use alloc::vec::Vec;
use core::marker::PhantomData;

pub(crate) trait SlotId: Copy {
    fn from_parts(idx: u32, generation: u32) -> Self;
    fn idx(self) -> usize;
    fn generation(self) -> u32;
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slots with free-list reuse. Generations start at 1 and bump on reuse.
#[derive(Debug)]
pub(crate) struct Slab<I, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    _id: PhantomData<I>,
}

impl<I: SlotId, T> Default for Slab<I, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            _id: PhantomData,
        }
    }
}

impl<I: SlotId, T> Slab<I, T> {
    pub(crate) fn insert(&mut self, value: T) -> I {
        self.live += 1;
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            return I::from_parts(idx, slot.generation);
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "slot counts beyond u32::MAX are not supported"
        )]
        let idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        I::from_parts(idx, 1)
    }

    pub(crate) fn get(&self, id: I) -> Option<&T> {
        self.slots
            .get(id.idx())
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots
            .get_mut(id.idx())
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.value.as_mut())
    }

    pub(crate) fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn remove(&mut self, id: I) -> Option<T> {
        let slot = self.slots.get_mut(id.idx())?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.value.take()?;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "indices were created from u32 values"
        )]
        let idx = id.idx() as u32;
        self.free.push(idx);
        self.live -= 1;
        Some(value)
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, s)| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "indices were created from u32 values"
            )]
            let idx = idx as u32;
            s.value.as_ref().map(|v| (I::from_parts(idx, s.generation), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeId;

    #[test]
    fn stale_handles_do_not_alias() {
        let mut slab: Slab<NodeId, &str> = Slab::default();
        let a = slab.insert("a");
        assert_eq!(slab.remove(a), Some("a"));
        let b = slab.insert("b");
        assert_eq!(a.idx(), b.idx(), "slot should be reused");
        assert_ne!(a, b);
        assert!(slab.get(a).is_none());
        assert_eq!(slab.get(b), Some(&"b"));
        assert_eq!(slab.len(), 1);
    }
}
