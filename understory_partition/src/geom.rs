// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Axis-aligned boxes, spheres and planes in 3D.
//!
//! These are the shapes bounding volumes cache and the primitives pickers test
//! rays and points against. All coordinates are `f64`.

use glam::{DMat4, DVec3};
use kurbo::Rect;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

/// Result of a successful ray test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Ray parameter of the entry point, in units of the ray direction.
    ///
    /// `0.0` when the ray origin is already inside the shape.
    pub distance: f64,
    /// Outward normal of the entered face, or zero when the origin is inside.
    pub normal: DVec3,
}

/// Where a shape lies relative to a plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaneClassification {
    /// Entirely on the side the normal points to.
    Front,
    /// Entirely on the opposite side.
    Back,
    /// Straddles the plane.
    Intersect,
}

/// A plane `a*x + b*y + c*z = d`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane3D {
    /// X component of the normal.
    pub a: f64,
    /// Y component of the normal.
    pub b: f64,
    /// Z component of the normal.
    pub c: f64,
    /// Distance term.
    pub d: f64,
}

impl Plane3D {
    /// Creates a plane from its coefficients.
    pub const fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self { a, b, c, d }
    }

    /// Creates the plane through `point` with the given normal.
    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        Self::new(normal.x, normal.y, normal.z, normal.dot(point))
    }

    /// Returns the normal `(a, b, c)`.
    pub fn normal(&self) -> DVec3 {
        DVec3::new(self.a, self.b, self.c)
    }

    /// Signed distance term of `point`, scaled by the normal length.
    pub fn distance(&self, point: DVec3) -> f64 {
        self.normal().dot(point) - self.d
    }

    fn classify_extent(&self, center: DVec3, extent: DVec3) -> PlaneClassification {
        let dd = self.distance(center);
        let rr = self.a.abs() * extent.x + self.b.abs() * extent.y + self.c.abs() * extent.z;
        if dd > rr {
            PlaneClassification::Front
        } else if dd < -rr {
            PlaneClassification::Back
        } else {
            PlaneClassification::Intersect
        }
    }

    /// Distance term of the box corner furthest along the normal.
    fn furthest_projection(&self, center: DVec3, extent: DVec3) -> f64 {
        let flip = |n: f64, e: f64| if n < 0.0 { -e } else { e };
        self.a * (center.x + flip(self.a, extent.x))
            + self.b * (center.y + flip(self.b, extent.y))
            + self.c * (center.z + flip(self.c, extent.z))
            - self.d
    }
}

/// An axis-aligned box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3 {
    /// Minimum corner.
    pub min: DVec3,
    /// Maximum corner.
    pub max: DVec3,
}

impl Box3 {
    /// Creates a box from its minimum and maximum corners.
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Creates the smallest box containing both points.
    pub fn from_corners(a: DVec3, b: DVec3) -> Self {
        Self::new(a.min(b), a.max(b))
    }

    /// Creates a flat box from a rectangle in the XY plane at `z = 0`.
    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.abs();
        Self::new(
            DVec3::new(rect.x0, rect.y0, 0.0),
            DVec3::new(rect.x1, rect.y1, 0.0),
        )
    }

    /// Creates the smallest box containing every point, or `None` for no points.
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |b, p| {
            Self::new(b.min.min(p), b.max.max(p))
        }))
    }

    /// Center point.
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Half the size along each axis.
    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Width, height and depth.
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Returns `true` if the point lies inside or on the boundary.
    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        x >= self.min.x
            && x <= self.max.x
            && y >= self.min.y
            && y <= self.max.y
            && z >= self.min.z
            && z <= self.max.z
    }

    /// Returns `true` if `p` lies inside or on the boundary.
    pub fn contains_point(&self, p: DVec3) -> bool {
        self.contains(p.x, p.y, p.z)
    }

    /// Returns `true` if the boxes overlap (touching counts).
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Unions two optional boxes.
    pub fn union_opt(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, None) => a,
            (None, b) => b,
        }
    }

    /// Grows the box in X and Y by `amount` on every side.
    pub fn inflate_xy(&self, amount: f64) -> Self {
        let d = DVec3::new(amount, amount, 0.0);
        Self::new(self.min - d, self.max + d)
    }

    /// The eight corners.
    pub fn corners(&self) -> [DVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            DVec3::new(a.x, a.y, a.z),
            DVec3::new(b.x, a.y, a.z),
            DVec3::new(a.x, b.y, a.z),
            DVec3::new(b.x, b.y, a.z),
            DVec3::new(a.x, a.y, b.z),
            DVec3::new(b.x, a.y, b.z),
            DVec3::new(a.x, b.y, b.z),
            DVec3::new(b.x, b.y, b.z),
        ]
    }

    /// Axis-aligned box around this box transformed by `matrix`.
    pub fn transform(&self, matrix: &DMat4) -> Self {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        let mut out = Self::new(corners[0], corners[0]);
        for c in &corners[1..] {
            out.min = out.min.min(*c);
            out.max = out.max.max(*c);
        }
        out
    }

    /// Slab test of the ray `origin + t * direction` for `t >= 0`.
    ///
    /// The direction is not normalized, so the returned distance is in units of
    /// `direction`.
    pub fn ray_intersection(&self, origin: DVec3, direction: DVec3) -> Option<RayHit> {
        if self.contains_point(origin) {
            return Some(RayHit {
                distance: 0.0,
                normal: DVec3::ZERO,
            });
        }
        let mut t_near = f64::NEG_INFINITY;
        let mut t_far = f64::INFINITY;
        let mut normal = DVec3::ZERO;
        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d == 0.0 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let (mut t0, mut t1) = ((lo - o) / d, (hi - o) / d);
            if t0 > t1 {
                core::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_near {
                t_near = t0;
                normal = DVec3::ZERO;
                normal[axis] = if d > 0.0 { -1.0 } else { 1.0 };
            }
            t_far = t_far.min(t1);
            if t_near > t_far {
                return None;
            }
        }
        if t_near < 0.0 || !t_near.is_finite() {
            return None;
        }
        Some(RayHit {
            distance: t_near,
            normal,
        })
    }

    /// Classifies the box against `plane`.
    pub fn classify_to_plane(&self, plane: &Plane3D) -> PlaneClassification {
        plane.classify_extent(self.center(), self.half_extents())
    }

    /// Returns `false` if the box lies fully behind any of the planes.
    pub fn is_in_frustum(&self, planes: &[Plane3D]) -> bool {
        let (center, extent) = (self.center(), self.half_extents());
        planes
            .iter()
            .all(|p| p.furthest_projection(center, extent) >= 0.0)
    }
}

/// A sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    /// Center point.
    pub center: DVec3,
    /// Radius.
    pub radius: f64,
}

impl Sphere {
    /// Creates a sphere.
    pub const fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Smallest sphere around `center` containing every point of `b`.
    pub fn around_box(center: DVec3, b: &Box3) -> Self {
        let radius = b
            .corners()
            .iter()
            .map(|c| c.distance(center))
            .fold(0.0, f64::max);
        Self::new(center, radius)
    }

    /// Returns `true` if `p` lies inside or on the surface.
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.distance_squared(self.center) <= self.radius * self.radius
    }

    /// Smallest sphere enclosing both spheres.
    pub fn union(&self, other: &Self) -> Self {
        let delta = other.center - self.center;
        let dist = delta.length();
        if dist + other.radius <= self.radius {
            return *self;
        }
        if dist + self.radius <= other.radius {
            return *other;
        }
        let radius = (dist + self.radius + other.radius) * 0.5;
        let center = self.center + delta * ((radius - self.radius) / dist);
        Self::new(center, radius)
    }

    /// Transforms the sphere by `matrix`.
    ///
    /// The center is transformed exactly. The radius is scaled by the root mean
    /// square of the summed rows of the linear part, which is exact for uniform
    /// scale and an approximation otherwise.
    pub fn transform(&self, matrix: &DMat4) -> Self {
        let center = matrix.transform_point3(self.center);
        let rows =
            matrix.x_axis.truncate() + matrix.y_axis.truncate() + matrix.z_axis.truncate();
        let scale = (rows.length_squared() / 3.0).sqrt();
        Self::new(center, self.radius * scale)
    }

    /// Ray test of `origin + t * direction` for `t >= 0`.
    pub fn ray_intersection(&self, origin: DVec3, direction: DVec3) -> Option<RayHit> {
        let oc = origin - self.center;
        let c = oc.length_squared() - self.radius * self.radius;
        if c <= 0.0 {
            return Some(RayHit {
                distance: 0.0,
                normal: DVec3::ZERO,
            });
        }
        let a = direction.length_squared();
        if a == 0.0 {
            return None;
        }
        let b = 2.0 * oc.dot(direction);
        let det = b * b - 4.0 * a * c;
        if det < 0.0 {
            return None;
        }
        let t = (-b - det.sqrt()) / (2.0 * a);
        if t < 0.0 {
            return None;
        }
        let hit = origin + direction * t;
        Some(RayHit {
            distance: t,
            normal: (hit - self.center).normalize_or_zero(),
        })
    }

    /// Classifies the sphere against `plane`.
    pub fn classify_to_plane(&self, plane: &Plane3D) -> PlaneClassification {
        plane.classify_extent(self.center, DVec3::splat(self.radius))
    }

    /// Returns `false` if the sphere lies fully behind any of the planes.
    pub fn is_in_frustum(&self, planes: &[Plane3D]) -> bool {
        let extent = DVec3::splat(self.radius);
        planes
            .iter()
            .all(|p| p.furthest_projection(self.center, extent) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Box3 {
        Box3::new(DVec3::ZERO, DVec3::splat(10.0))
    }

    #[test]
    fn ray_enters_front_face() {
        let hit = unit_box()
            .ray_intersection(DVec3::new(5.0, 5.0, -10.0), DVec3::Z)
            .expect("ray should hit");
        assert_eq!(hit.distance, 10.0);
        assert_eq!(hit.normal, DVec3::NEG_Z);
    }

    #[test]
    fn ray_from_inside_reports_zero() {
        let hit = unit_box()
            .ray_intersection(DVec3::splat(5.0), DVec3::X)
            .expect("inside");
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn ray_misses_and_behind() {
        let b = unit_box();
        assert!(b.ray_intersection(DVec3::new(20.0, 5.0, -10.0), DVec3::Z).is_none());
        assert!(b.ray_intersection(DVec3::new(5.0, 5.0, -10.0), DVec3::NEG_Z).is_none());
    }

    #[test]
    fn flat_box_is_hit_face_on() {
        let flat = Box3::from_rect(Rect::new(0.0, 0.0, 4.0, 4.0));
        let hit = flat
            .ray_intersection(DVec3::new(1.0, 1.0, -3.0), DVec3::new(0.0, 0.0, 2.0))
            .expect("hit");
        assert_eq!(hit.distance, 1.5);
    }

    #[test]
    fn transform_rotated_box() {
        let m = DMat4::from_rotation_z(core::f64::consts::FRAC_PI_2);
        let b = Box3::new(DVec3::ZERO, DVec3::new(2.0, 1.0, 0.0)).transform(&m);
        assert!((b.min.x + 1.0).abs() < 1e-9);
        assert!((b.max.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn classify_and_frustum() {
        let b = unit_box();
        let ahead = Plane3D::from_point_normal(DVec3::new(0.0, 0.0, -5.0), DVec3::Z);
        let through = Plane3D::from_point_normal(DVec3::new(0.0, 0.0, 5.0), DVec3::Z);
        let past = Plane3D::from_point_normal(DVec3::new(0.0, 0.0, 20.0), DVec3::Z);
        assert_eq!(b.classify_to_plane(&ahead), PlaneClassification::Front);
        assert_eq!(b.classify_to_plane(&through), PlaneClassification::Intersect);
        assert_eq!(b.classify_to_plane(&past), PlaneClassification::Back);
        assert!(b.is_in_frustum(&[ahead, through]));
        assert!(!b.is_in_frustum(&[ahead, past]));
    }

    #[test]
    fn sphere_union_and_ray() {
        let a = Sphere::new(DVec3::ZERO, 1.0);
        let b = Sphere::new(DVec3::new(4.0, 0.0, 0.0), 1.0);
        let u = a.union(&b);
        assert!((u.radius - 3.0).abs() < 1e-9);
        assert!((u.center.x - 2.0).abs() < 1e-9);
        let hit = a
            .ray_intersection(DVec3::new(-5.0, 0.0, 0.0), DVec3::X)
            .expect("hit");
        assert!((hit.distance - 4.0).abs() < 1e-9);
        assert_eq!(hit.normal, DVec3::NEG_X);
    }

    #[test]
    fn sphere_radius_scales_uniformly() {
        let s = Sphere::new(DVec3::ZERO, 2.0).transform(&DMat4::from_scale(DVec3::splat(3.0)));
        assert!((s.radius - 6.0).abs() < 1e-9);
        let r = Sphere::new(DVec3::ZERO, 2.0)
            .transform(&DMat4::from_rotation_z(core::f64::consts::FRAC_PI_2));
        assert!((r.radius - 2.0).abs() < 1e-9);
    }
}
