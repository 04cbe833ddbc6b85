// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene-side container state: the contract the partition tree consumes.

use alloc::vec::Vec;

use glam::DMat4;
use kurbo::{BezPath, Rect};

use crate::color::ColorTransform;
use crate::geom::Box3;
use crate::flags::HierarchicalProperty;

/// How a registration matrix is applied to a container's transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AlignmentMode {
    /// The registration point is the origin the container is positioned by.
    #[default]
    RegistrationPoint,
    /// The transform point stays put and the registration offset is scaled away.
    TransformPoint,
}

/// How a container is oriented when rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrientationMode {
    /// Use the world matrix as is.
    #[default]
    Default,
    /// Face the camera plane (billboarding), keeping position and scale.
    CameraPlane,
}

/// Compositing mode of a container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Source over.
    #[default]
    Normal,
    /// Group the subtree before compositing normally.
    Layer,
    /// Multiply.
    Multiply,
    /// Screen.
    Screen,
    /// Lighten.
    Lighten,
    /// Darken.
    Darken,
    /// Difference.
    Difference,
    /// Add.
    Add,
    /// Subtract.
    Subtract,
    /// Invert.
    Invert,
    /// Alpha.
    Alpha,
    /// Erase.
    Erase,
    /// Overlay. Approximated by halving alpha.
    Overlay,
    /// Hard light.
    HardLight,
}

impl BlendMode {
    /// Returns `true` if content must be rendered into an isolated image first.
    pub fn needs_image(self) -> bool {
        !matches!(self, Self::Normal | Self::Layer)
    }
}

/// Kind of partition a container roots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    /// Plain partition: one root node and its subtree.
    #[default]
    Basic,
    /// Partition that mirrors the scene graph one node per container.
    SceneGraph,
}

/// Shape and precision of a bounding volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BoundingVolumeType {
    /// Exact axis-aligned box of the fill geometry.
    #[default]
    Box,
    /// Box from cached oriented bounds.
    BoxFast,
    /// Exact box including strokes.
    BoxBounds,
    /// Cached box including strokes.
    BoxBoundsFast,
    /// Exact sphere of the fill geometry.
    Sphere,
    /// Sphere from cached oriented bounds.
    SphereFast,
    /// Exact sphere including strokes.
    SphereBounds,
    /// Cached sphere including strokes.
    SphereBoundsFast,
    /// Empty volume that never intersects anything.
    Null,
}

/// The concrete shape a [`BoundingVolumeType`] produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VolumeShape {
    /// Axis-aligned box.
    Box,
    /// Sphere.
    Sphere,
    /// Never hit.
    Null,
}

impl BoundingVolumeType {
    /// Whether stroke-inclusive geometry is bounded.
    pub const fn stroke_flag(self) -> bool {
        matches!(
            self,
            Self::BoxBounds | Self::BoxBoundsFast | Self::SphereBounds | Self::SphereBoundsFast
        )
    }

    /// Whether cached oriented bounds are reused instead of exact geometry.
    pub const fn fast_flag(self) -> bool {
        matches!(
            self,
            Self::BoxFast | Self::BoxBoundsFast | Self::SphereFast | Self::SphereBoundsFast
        )
    }

    /// The shape of volume this type produces.
    pub const fn shape(self) -> VolumeShape {
        match self {
            Self::Box | Self::BoxFast | Self::BoxBounds | Self::BoxBoundsFast => VolumeShape::Box,
            Self::Sphere | Self::SphereFast | Self::SphereBounds | Self::SphereBoundsFast => {
                VolumeShape::Sphere
            }
            Self::Null => VolumeShape::Null,
        }
    }

    /// The box type matching the given flags.
    pub const fn box_for(stroke: bool, fast: bool) -> Self {
        match (stroke, fast) {
            (false, false) => Self::Box,
            (false, true) => Self::BoxFast,
            (true, false) => Self::BoxBounds,
            (true, true) => Self::BoxBoundsFast,
        }
    }

    /// The sphere type matching the given flags.
    pub const fn sphere_for(stroke: bool, fast: bool) -> Self {
        match (stroke, fast) {
            (false, false) => Self::Sphere,
            (false, true) => Self::SphereFast,
            (true, false) => Self::SphereBounds,
            (true, true) => Self::SphereBoundsFast,
        }
    }
}

/// Asset category of a container, as far as picking cares.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AssetType {
    /// A plain container.
    #[default]
    Container,
    /// A sprite or mesh.
    Sprite,
    /// Vector shape content.
    Shape,
    /// A camera facing quad.
    Billboard,
    /// Static or dynamic text.
    TextField,
    /// Editable text.
    InputTextField,
}

impl AssetType {
    /// Text and billboards are always picked by their bounds.
    pub fn is_always_box(self) -> bool {
        matches!(self, Self::Billboard | Self::TextField | Self::InputTextField)
    }

    /// Returns `true` for any text field.
    pub fn is_text(self) -> bool {
        matches!(self, Self::TextField | Self::InputTextField)
    }
}

/// One renderable sub-asset of an entity, as seen by pickers.
#[derive(Clone, Debug, PartialEq)]
pub enum Traversable {
    /// Solid geometry bounded by a local-space box.
    Solid(Box3),
    /// Vector path in the local XY plane.
    Shape {
        /// Outline.
        path: BezPath,
        /// Whether the interior is filled.
        fill: bool,
        /// Stroke width; `0.0` for no stroke.
        stroke_width: f64,
    },
    /// Rectangle in the local XY plane picked by its bounds.
    Quad(Rect),
}

/// Discriminant of a [`Traversable`], used to look up pickable factories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraversableKind {
    /// [`Traversable::Solid`].
    Solid,
    /// [`Traversable::Shape`].
    Shape,
    /// [`Traversable::Quad`].
    Quad,
}

impl Traversable {
    /// Returns the discriminant.
    pub fn kind(&self) -> TraversableKind {
        match self {
            Self::Solid(_) => TraversableKind::Solid,
            Self::Shape { .. } => TraversableKind::Shape,
            Self::Quad(_) => TraversableKind::Quad,
        }
    }
}

/// Plain per-container state.
///
/// Containers referencing other containers (masks, pick objects) and entity
/// content are set through dedicated [`PartitionTree`](crate::PartitionTree)
/// methods instead.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerProps {
    /// Local transform relative to the parent.
    pub transform: DMat4,
    /// Optional registration matrix prepended to the local transform.
    pub registration: Option<DMat4>,
    /// How `registration` is applied.
    pub alignment: AlignmentMode,
    /// Render orientation.
    pub orientation: OrientationMode,
    /// Local color transform.
    pub color_transform: ColorTransform,
    /// Own visibility flag.
    pub visible: bool,
    /// Whether this container receives mouse input.
    pub mouse_enabled: bool,
    /// Whether descendants receive mouse input.
    pub mouse_children: bool,
    /// Explicit mask id; set on containers used as masks.
    pub mask_id: Option<u32>,
    /// Whether this container renders as a mask.
    pub mask_mode: bool,
    /// Scroll rectangle clipping and offsetting the content.
    pub scroll_rect: Option<Rect>,
    /// Scale9 grid.
    pub scale9_grid: Option<Rect>,
    /// Compositing mode.
    pub blend_mode: BlendMode,
    /// Whether the container is cached as a bitmap.
    pub cache_as_bitmap: bool,
    /// Whether filters are applied.
    pub has_filters: bool,
    /// When set, the container roots a partition of this kind.
    pub partition_kind: Option<PartitionKind>,
    /// Volume type pickers use when none is requested.
    pub default_bounding_volume: BoundingVolumeType,
    /// When this container serves as a pick object, parent its node to the owner.
    pub pick_object_from_timeline: bool,
    /// Whether the container takes part in tab navigation.
    pub tab_enabled: bool,
    /// Explicit tab index.
    pub tab_index: Option<u32>,
    /// Asset category.
    pub asset_type: AssetType,
    /// Whether a bounds primitive is shown for this entity.
    pub bounds_visible: bool,
}

impl Default for ContainerProps {
    fn default() -> Self {
        Self {
            transform: DMat4::IDENTITY,
            registration: None,
            alignment: AlignmentMode::default(),
            orientation: OrientationMode::default(),
            color_transform: ColorTransform::IDENTITY,
            visible: true,
            mouse_enabled: true,
            mouse_children: true,
            mask_id: None,
            mask_mode: false,
            scroll_rect: None,
            scale9_grid: None,
            blend_mode: BlendMode::default(),
            cache_as_bitmap: false,
            has_filters: false,
            partition_kind: None,
            default_bounding_volume: BoundingVolumeType::default(),
            pick_object_from_timeline: false,
            tab_enabled: false,
            tab_index: None,
            asset_type: AssetType::default(),
            bounds_visible: false,
        }
    }
}

impl ContainerProps {
    /// Props of a plain container translated by `(x, y, z)`.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            transform: DMat4::from_translation(glam::DVec3::new(x, y, z)),
            ..Self::default()
        }
    }

    /// Sets the asset type.
    #[must_use]
    pub fn with_asset_type(mut self, asset_type: AssetType) -> Self {
        self.asset_type = asset_type;
        self
    }
}

/// Hooks a scene object can attach to its container.
///
/// Both methods have empty defaults.
pub trait ContainerController {
    /// Called once per traversal for queued entities, before any query reads
    /// node state. Returns the hierarchical properties it changed.
    fn internal_update(&mut self, props: &mut ContainerProps) -> HierarchicalProperty {
        let _ = props;
        HierarchicalProperty::empty()
    }

    /// Called after a node of this container recomputed its world matrix.
    fn update_controller(&mut self, world: &DMat4) {
        let _ = world;
    }
}

/// Entity content: the traversables of a container that is an entity.
pub type EntityContent = Vec<Traversable>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_type_tables() {
        use BoundingVolumeType as T;
        let stroke: [bool; 9] = [
            T::Box, T::BoxFast, T::BoxBounds, T::BoxBoundsFast, T::Sphere, T::SphereFast,
            T::SphereBounds, T::SphereBoundsFast, T::Null,
        ]
        .map(T::stroke_flag);
        assert_eq!(stroke, [false, false, true, true, false, false, true, true, false]);
        assert!(T::SphereFast.fast_flag());
        assert!(!T::Null.fast_flag());
        assert_eq!(T::BoxBoundsFast.shape(), VolumeShape::Box);
        assert_eq!(T::Null.shape(), VolumeShape::Null);
        for stroke in [false, true] {
            for fast in [false, true] {
                assert_eq!(T::box_for(stroke, fast).stroke_flag(), stroke);
                assert_eq!(T::sphere_for(stroke, fast).fast_flag(), fast);
            }
        }
    }

    #[test]
    fn only_some_blend_modes_need_images() {
        assert!(!BlendMode::Normal.needs_image());
        assert!(!BlendMode::Layer.needs_image());
        assert!(BlendMode::Multiply.needs_image());
    }
}
