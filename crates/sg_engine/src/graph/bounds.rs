//! Bounding volumes
//!
//! Drawables carry axis-aligned boxes tight around their vertex data; nodes
//! carry bounding spheres unioned from their children. Both types have an
//! explicit invalid state representing "no geometry": an invalid drawable
//! bound culls the leaf, an invalid node bound culls the subtree.

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// An inverted AABB that unions as the empty set
    pub fn empty() -> Self {
        Self {
            min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    /// True when min <= max on every axis
    pub fn valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Radius of the sphere through the corners
    pub fn radius(&self) -> f32 {
        self.extents().magnitude()
    }

    /// Grow to contain a point
    pub fn expand_by_point(&mut self, point: Vec3) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    /// Grow to contain another box
    pub fn expand_by_box(&mut self, other: &Aabb) {
        if !other.valid() {
            return;
        }
        self.expand_by_point(other.min);
        self.expand_by_point(other.max);
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Corner `i` of the box, bit 0 = x, bit 1 = y, bit 2 = z
    pub fn corner(&self, i: usize) -> Vec3 {
        Vec3::new(
            if i & 1 != 0 { self.max.x } else { self.min.x },
            if i & 2 != 0 { self.max.y } else { self.min.y },
            if i & 4 != 0 { self.max.z } else { self.min.z },
        )
    }

    /// Box containing all eight transformed corners
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        if !self.valid() {
            return *self;
        }
        let mut out = Aabb::empty();
        for i in 0..8 {
            let c = self.corner(i);
            let p = matrix.transform_point(&Point3::new(c.x, c.y, c.z));
            out.expand_by_point(p.coords);
        }
        out
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

/// Bounding sphere unioned up the node hierarchy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius; negative marks the invalid (empty) sphere
    pub radius: f32,
}

impl BoundingSphere {
    /// Create a sphere from center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// The invalid (empty) sphere
    pub fn invalid() -> Self {
        Self {
            center: Vec3::zeros(),
            radius: -1.0,
        }
    }

    /// True when the sphere contains any space
    pub fn valid(&self) -> bool {
        self.radius >= 0.0
    }

    /// Sphere through the corners of a box
    pub fn from_aabb(aabb: &Aabb) -> Self {
        if !aabb.valid() {
            return Self::invalid();
        }
        Self {
            center: aabb.center(),
            radius: aabb.radius(),
        }
    }

    /// Grow to contain another sphere
    pub fn expand_by_sphere(&mut self, other: &BoundingSphere) {
        if !other.valid() {
            return;
        }
        if !self.valid() {
            *self = *other;
            return;
        }
        let d = (other.center - self.center).magnitude();
        if d + other.radius <= self.radius {
            return; // other already inside
        }
        if d + self.radius <= other.radius {
            *self = *other; // self inside other
            return;
        }
        let new_radius = (self.radius + d + other.radius) * 0.5;
        let ratio = (new_radius - self.radius) / d;
        self.center += (other.center - self.center) * ratio;
        self.radius = new_radius;
    }

    /// Sphere containing the transformed sphere
    ///
    /// The radius scales by the largest axis scale of the matrix, which keeps
    /// the result conservative under non-uniform scaling.
    pub fn transformed(&self, matrix: &Mat4) -> BoundingSphere {
        if !self.valid() {
            return *self;
        }
        let center = matrix
            .transform_point(&Point3::new(self.center.x, self.center.y, self.center.z))
            .coords;
        let sx = matrix.fixed_view::<3, 1>(0, 0).magnitude();
        let sy = matrix.fixed_view::<3, 1>(0, 1).magnitude();
        let sz = matrix.fixed_view::<3, 1>(0, 2).magnitude();
        BoundingSphere {
            center,
            radius: self.radius * sx.max(sy).max(sz),
        }
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::invalid()
    }
}
