// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pickables: per-traversable hit testers, and the registry that builds them.
//!
//! An entity's content is a list of [`Traversable`]s. For picking, each one is
//! turned into a [`Pickable`] by the factory registered for its
//! [`TraversableKind`]. Pickables work in the entity's local space.

use alloc::boxed::Box;
use core::fmt;

use glam::{DMat4, DVec3};
use hashbrown::HashMap;
use kurbo::{BezPath, ParamCurveNearest, Point, Rect, Shape};
use understory_partition::{Box3, Sphere, Traversable, TraversableKind};

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::PickingCollision;

/// Hit tester for one traversable.
pub trait Pickable: fmt::Debug {
    /// Returns `true` if the local point lies on the geometry.
    fn hit_test_point(&self, x: f64, y: f64, z: f64) -> bool;

    /// Local box, transformed by `matrix` when given.
    ///
    /// `stroke` includes stroke geometry. `None` means nothing to bound.
    fn box_bounds(&self, matrix: Option<&DMat4>, stroke: bool) -> Option<Box3>;

    /// Sphere around `center` enclosing the geometry under `matrix`.
    fn sphere_bounds(&self, center: DVec3, matrix: Option<&DMat4>, stroke: bool) -> Option<Sphere> {
        self.box_bounds(matrix, stroke)
            .map(|b| Sphere::around_box(center, &b))
    }

    /// Narrow-phase ray test against the local ray stored in `collision`.
    ///
    /// A hit closer than `collision.ray_entry_distance` overwrites the
    /// distance, normal and element fields and returns `true`.
    fn test_collision(&self, collision: &mut PickingCollision, find_closest: bool) -> bool;
}

/// Builds a pickable for a traversable, or `None` if it cannot be picked.
pub type PickableFactory = fn(&Traversable) -> Option<Box<dyn Pickable>>;

/// Factories keyed by traversable kind.
#[derive(Clone)]
pub struct PickableRegistry {
    factories: HashMap<TraversableKind, PickableFactory>,
}

impl fmt::Debug for PickableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickableRegistry")
            .field("kinds", &self.factories.keys().collect::<alloc::vec::Vec<_>>())
            .finish()
    }
}

impl Default for PickableRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(TraversableKind::Solid, solid_pickable);
        registry.register(TraversableKind::Shape, shape_pickable);
        registry.register(TraversableKind::Quad, quad_pickable);
        registry
    }
}

fn solid_pickable(t: &Traversable) -> Option<Box<dyn Pickable>> {
    match t {
        Traversable::Solid(bounds) => Some(Box::new(SolidPickable { bounds: *bounds })),
        _ => None,
    }
}

fn shape_pickable(t: &Traversable) -> Option<Box<dyn Pickable>> {
    match t {
        Traversable::Shape {
            path,
            fill,
            stroke_width,
        } => Some(Box::new(ShapePickable {
            path: path.clone(),
            fill: *fill,
            stroke_width: *stroke_width,
        })),
        _ => None,
    }
}

fn quad_pickable(t: &Traversable) -> Option<Box<dyn Pickable>> {
    match t {
        Traversable::Quad(rect) => Some(Box::new(QuadPickable { rect: *rect })),
        _ => None,
    }
}

impl PickableRegistry {
    /// A registry with no factories; nothing is pickable.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Installs `factory` for `kind`, replacing any earlier one.
    pub fn register(&mut self, kind: TraversableKind, factory: PickableFactory) {
        self.factories.insert(kind, factory);
    }

    /// Removes the factory for `kind`.
    pub fn unregister(&mut self, kind: TraversableKind) {
        self.factories.remove(&kind);
    }

    /// Builds a pickable for `traversable`.
    pub fn create(&self, traversable: &Traversable) -> Option<Box<dyn Pickable>> {
        let factory = self.factories.get(&traversable.kind())?;
        let pickable = factory(traversable);
        if pickable.is_none() {
            log::debug!("no pickable for {:?}", traversable.kind());
        }
        pickable
    }
}

fn transformed(b: Box3, matrix: Option<&DMat4>) -> Box3 {
    match matrix {
        Some(m) => b.transform(m),
        None => b,
    }
}

/// Ray parameter where the local ray crosses `z = 0`.
fn plane_crossing(collision: &PickingCollision) -> Option<(f64, DVec3)> {
    let (origin, dir) = (collision.ray_position, collision.ray_direction);
    if dir.z == 0.0 {
        return None;
    }
    let t = -origin.z / dir.z;
    if t < 0.0 {
        return None;
    }
    Some((t, origin + dir * t))
}

fn record_plane_hit(collision: &mut PickingCollision, t: f64) -> bool {
    if t >= collision.ray_entry_distance {
        return false;
    }
    let facing = if collision.ray_direction.z > 0.0 { -1.0 } else { 1.0 };
    collision.ray_entry_distance = t;
    collision.normal = DVec3::new(0.0, 0.0, facing);
    collision.element_index = Some(0);
    true
}

/// Solid geometry picked by its box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolidPickable {
    /// Local bounds.
    pub bounds: Box3,
}

impl Pickable for SolidPickable {
    fn hit_test_point(&self, x: f64, y: f64, z: f64) -> bool {
        self.bounds.contains(x, y, z)
    }

    fn box_bounds(&self, matrix: Option<&DMat4>, _stroke: bool) -> Option<Box3> {
        Some(transformed(self.bounds, matrix))
    }

    fn test_collision(&self, collision: &mut PickingCollision, _find_closest: bool) -> bool {
        let Some(hit) = self
            .bounds
            .ray_intersection(collision.ray_position, collision.ray_direction)
        else {
            return false;
        };
        if hit.distance >= collision.ray_entry_distance {
            return false;
        }
        collision.ray_entry_distance = hit.distance;
        collision.normal = hit.normal;
        collision.element_index = Some(0);
        true
    }
}

/// A vector path in the local XY plane.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapePickable {
    /// Outline; subpaths are treated as closed for filling.
    pub path: BezPath,
    /// Whether the nonzero interior is hit.
    pub fill: bool,
    /// Stroke width; `0.0` for none.
    pub stroke_width: f64,
}

impl ShapePickable {
    fn hits_stroke(&self, pt: Point) -> bool {
        if self.stroke_width <= 0.0 {
            return false;
        }
        let half = self.stroke_width * 0.5;
        self.path
            .segments()
            .any(|seg| seg.nearest(pt, 1e-6).distance_sq.sqrt() <= half)
    }
}

impl Pickable for ShapePickable {
    fn hit_test_point(&self, x: f64, y: f64, _z: f64) -> bool {
        let pt = Point::new(x, y);
        (self.fill && self.path.winding(pt) != 0) || self.hits_stroke(pt)
    }

    fn box_bounds(&self, matrix: Option<&DMat4>, stroke: bool) -> Option<Box3> {
        if self.path.elements().is_empty() {
            return None;
        }
        let mut b = Box3::from_rect(self.path.bounding_box());
        if stroke && self.stroke_width > 0.0 {
            b = b.inflate_xy(self.stroke_width * 0.5);
        }
        Some(transformed(b, matrix))
    }

    fn test_collision(&self, collision: &mut PickingCollision, _find_closest: bool) -> bool {
        let Some((t, p)) = plane_crossing(collision) else {
            return false;
        };
        self.hit_test_point(p.x, p.y, 0.0) && record_plane_hit(collision, t)
    }
}

/// An axis-aligned rectangle in the local XY plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadPickable {
    /// The rectangle.
    pub rect: Rect,
}

impl Pickable for QuadPickable {
    fn hit_test_point(&self, x: f64, y: f64, _z: f64) -> bool {
        Box3::from_rect(self.rect).contains(x, y, 0.0)
    }

    fn box_bounds(&self, matrix: Option<&DMat4>, _stroke: bool) -> Option<Box3> {
        Some(transformed(Box3::from_rect(self.rect), matrix))
    }

    fn test_collision(&self, collision: &mut PickingCollision, _find_closest: bool) -> bool {
        let Some((t, p)) = plane_crossing(collision) else {
            return false;
        };
        self.hit_test_point(p.x, p.y, 0.0) && record_plane_hit(collision, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use understory_partition::{ContainerProps, PartitionTree};

    fn collision(origin: DVec3, dir: DVec3) -> PickingCollision {
        let mut tree = PartitionTree::new();
        let container = tree.create_entity(ContainerProps::default(), alloc::vec![]);
        let view = tree.create_view();
        let node = tree.node(view, container).unwrap();
        let mut c = PickingCollision::new(node, container);
        c.ray_position = origin;
        c.ray_direction = dir;
        c
    }

    fn square(size: f64) -> BezPath {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((size, 0.0));
        path.line_to((size, size));
        path.line_to((0.0, size));
        path.close_path();
        path
    }

    #[test]
    fn registry_builds_each_kind() {
        let registry = PickableRegistry::default();
        let quad = registry.create(&Traversable::Quad(Rect::new(0.0, 0.0, 1.0, 1.0)));
        assert!(quad.is_some_and(|p| p.hit_test_point(0.5, 0.5, 0.0)));
        assert!(PickableRegistry::empty()
            .create(&Traversable::Quad(Rect::ZERO))
            .is_none());
    }

    #[test]
    fn registry_overrides_replace_factories() {
        let mut registry = PickableRegistry::default();
        registry.register(TraversableKind::Quad, |_| None);
        assert!(registry
            .create(&Traversable::Quad(Rect::new(0.0, 0.0, 1.0, 1.0)))
            .is_none());
    }

    #[test]
    fn shape_fill_and_stroke() {
        let filled = ShapePickable {
            path: square(10.0),
            fill: true,
            stroke_width: 0.0,
        };
        assert!(filled.hit_test_point(5.0, 5.0, 0.0));
        assert!(!filled.hit_test_point(11.0, 5.0, 0.0));

        let outline = ShapePickable {
            path: square(10.0),
            fill: false,
            stroke_width: 2.0,
        };
        assert!(!outline.hit_test_point(5.0, 5.0, 0.0));
        assert!(outline.hit_test_point(10.5, 5.0, 0.0));
        assert!(!outline.hit_test_point(11.5, 5.0, 0.0));

        let plain = outline.box_bounds(None, false).unwrap();
        let stroked = outline.box_bounds(None, true).unwrap();
        assert_eq!(plain.max.x, 10.0);
        assert_eq!(stroked.max.x, 11.0);
    }

    #[test]
    fn flat_pickables_hit_the_xy_plane() {
        let quad = QuadPickable {
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
        };
        let mut c = collision(DVec3::new(5.0, 5.0, -4.0), DVec3::Z);
        assert!(quad.test_collision(&mut c, false));
        assert_eq!(c.ray_entry_distance, 4.0);
        assert_eq!(c.normal, DVec3::new(0.0, 0.0, -1.0));

        let mut away = collision(DVec3::new(5.0, 5.0, -4.0), DVec3::NEG_Z);
        assert!(!quad.test_collision(&mut away, false));
        let mut outside = collision(DVec3::new(15.0, 5.0, -4.0), DVec3::Z);
        assert!(!quad.test_collision(&mut outside, false));
    }

    #[test]
    fn solid_collision_keeps_the_closer_hit() {
        let solid = SolidPickable {
            bounds: Box3::new(DVec3::ZERO, DVec3::splat(10.0)),
        };
        let mut c = collision(DVec3::new(5.0, 5.0, -10.0), DVec3::Z);
        assert!(solid.test_collision(&mut c, true));
        assert_eq!(c.ray_entry_distance, 10.0);
        c.ray_entry_distance = 5.0;
        assert!(!solid.test_collision(&mut c, true));
    }
}
