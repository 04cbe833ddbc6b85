// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounding volumes and the per-owner pools that cache them.
//!
//! A volume bounds one owner (a partition picker or a pick entity) in the
//! coordinate space of a target node. Pools keep the most recently used
//! volumes per target and drop them once their stamp no longer matches the
//! owner's bounds generation or the transform generations of the nodes in
//! between.

use glam::DVec3;
use understory_lru::LruCache;
use understory_partition::{
    Box3, BoundingVolumeType, NodeId, Plane3D, PlaneClassification, RayHit, Sphere, VolumeShape,
};

/// A cached bounding volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundingVolume {
    /// Axis-aligned box; `None` when the owner has nothing to bound.
    Box(Option<Box3>),
    /// Sphere; `None` when the owner has nothing to bound.
    Sphere(Option<Sphere>),
    /// Never intersects anything.
    Null,
}

impl BoundingVolume {
    /// An empty volume of the shape `volume_type` produces.
    pub fn empty(volume_type: BoundingVolumeType) -> Self {
        match volume_type.shape() {
            VolumeShape::Box => Self::Box(None),
            VolumeShape::Sphere => Self::Sphere(None),
            VolumeShape::Null => Self::Null,
        }
    }

    /// The box, if this is a non-empty box volume.
    pub fn as_box(&self) -> Option<Box3> {
        match self {
            Self::Box(b) => *b,
            _ => None,
        }
    }

    /// The sphere, if this is a non-empty sphere volume.
    pub fn as_sphere(&self) -> Option<Sphere> {
        match self {
            Self::Sphere(s) => *s,
            _ => None,
        }
    }

    /// Returns `true` if nothing is bounded.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Box(None) | Self::Sphere(None) | Self::Null)
    }

    /// Collapses the volume to a zero-sized one at the origin.
    pub fn nullify(&mut self) {
        match self {
            Self::Box(b) => *b = Some(Box3::new(DVec3::ZERO, DVec3::ZERO)),
            Self::Sphere(s) => *s = Some(Sphere::new(DVec3::ZERO, 0.0)),
            Self::Null => {}
        }
    }

    /// Ray test in the volume's space.
    ///
    /// The hit distance is `0.0` when the origin is inside.
    pub fn ray_intersection(&self, origin: DVec3, direction: DVec3) -> Option<RayHit> {
        match self {
            Self::Box(b) => b.as_ref()?.ray_intersection(origin, direction),
            Self::Sphere(s) => s.as_ref()?.ray_intersection(origin, direction),
            Self::Null => None,
        }
    }

    /// Returns `false` if the volume is empty or lies behind any plane.
    pub fn is_in_frustum(&self, planes: &[Plane3D]) -> bool {
        match self {
            Self::Box(Some(b)) => b.is_in_frustum(planes),
            Self::Sphere(Some(s)) => s.is_in_frustum(planes),
            _ => false,
        }
    }

    /// Classifies the volume against `plane`; `None` for empty volumes.
    pub fn classify_to_plane(&self, plane: &Plane3D) -> Option<PlaneClassification> {
        match self {
            Self::Box(Some(b)) => Some(b.classify_to_plane(plane)),
            Self::Sphere(Some(s)) => Some(s.classify_to_plane(plane)),
            _ => None,
        }
    }
}

/// What a cached volume was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct VolumeStamp {
    /// Partition generation for pickers, content generation for entities.
    pub(crate) bounds: u64,
    /// Transform generations of owner and target when they differ.
    pub(crate) transforms: Option<(u64, u64)>,
}

/// Most recently used volumes of one type for one owner, keyed by target.
#[derive(Debug)]
pub(crate) struct VolumePool {
    cache: LruCache<NodeId, (VolumeStamp, BoundingVolume)>,
}

impl VolumePool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Returns the cached volume for `target` if its stamp still matches.
    pub(crate) fn lookup(&mut self, target: NodeId, stamp: VolumeStamp) -> Option<BoundingVolume> {
        let (cached, volume) = *self.cache.get(&target)?;
        if cached == stamp {
            Some(volume)
        } else {
            self.cache.remove(&target);
            None
        }
    }

    pub(crate) fn store(&mut self, target: NodeId, stamp: VolumeStamp, volume: BoundingVolume) {
        if let Some((evicted, _)) = self.cache.insert(target, (stamp, volume)) {
            log::trace!("evicted bounding volume for {evicted:?}");
        }
    }

    pub(crate) fn clear(&mut self) {
        self.cache.clear();
    }
}
