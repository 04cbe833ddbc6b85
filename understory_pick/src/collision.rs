// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The record a ray cast fills in for one entity.

use glam::DVec3;
use kurbo::Point;
use understory_partition::{ContainerId, NodeId};

/// Ray and hit data for one picked entity.
///
/// Pickers keep one of these per entity node and overwrite it on every cast.
/// [`RaycastPicker`](crate::RaycastPicker) queries return a copy of the
/// winning entity's record.
#[derive(Clone, Debug, PartialEq)]
pub struct PickingCollision {
    /// The entity node that was hit.
    pub entity: NodeId,
    /// Container behind [`entity`](Self::entity).
    pub container: ContainerId,
    /// Root node of the partition whose picker reported the entity.
    pub root_node: Option<NodeId>,
    /// Hit position in the entity's local space.
    pub position: DVec3,
    /// Local-space surface normal at the hit.
    pub normal: DVec3,
    /// Texture coordinate at the hit, when the pickable reports one.
    pub uv: Option<Point>,
    /// Index of the pickable or element that was hit.
    pub element_index: Option<usize>,
    /// Ray origin in the entity's local space.
    pub ray_position: DVec3,
    /// Ray direction in the entity's local space.
    pub ray_direction: DVec3,
    /// Ray origin in scene space.
    pub global_ray_position: DVec3,
    /// Ray direction in scene space.
    pub global_ray_direction: DVec3,
    /// Whether the ray starts inside the entity's bounding volume.
    pub ray_origin_is_inside_bounds: bool,
    /// Ray parameter of the bounds entry, or of the shape hit once narrowed.
    pub ray_entry_distance: f64,
}

impl PickingCollision {
    /// Creates an empty record for `entity`.
    pub fn new(entity: NodeId, container: ContainerId) -> Self {
        Self {
            entity,
            container,
            root_node: None,
            position: DVec3::ZERO,
            normal: DVec3::ZERO,
            uv: None,
            element_index: None,
            ray_position: DVec3::ZERO,
            ray_direction: DVec3::ZERO,
            global_ray_position: DVec3::ZERO,
            global_ray_direction: DVec3::ZERO,
            ray_origin_is_inside_bounds: false,
            ray_entry_distance: f64::MAX,
        }
    }

    /// Recomputes [`position`](Self::position) from the local ray and entry distance.
    pub fn update_position(&mut self) {
        self.position = self.ray_position + self.ray_direction * self.ray_entry_distance;
    }

    /// Hit position along the scene-space ray.
    pub fn global_position(&self) -> DVec3 {
        self.global_ray_position + self.global_ray_direction * self.ray_entry_distance
    }
}
