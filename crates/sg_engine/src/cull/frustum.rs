//! View frustum tests

use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::graph::Aabb;

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Normal vector (normalized, pointing into the accepted half-space)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a plane from coefficients (a, b, c, d) of ax + by + cz + d = 0
    ///
    /// Coefficients are normalized together so signed distances come out in
    /// world units. Degenerate coefficients produce an accept-everything
    /// plane rather than NaN distances.
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let normal = Vec3::new(a, b, c);
        let length = normal.magnitude();
        if length <= f32::EPSILON {
            return Self {
                normal: Vec3::zeros(),
                distance: 0.0,
            };
        }
        Self {
            normal: normal / length,
            distance: d / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes (left, right, bottom, top, near, far), normals inward
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction: each clip plane is a sum or difference of
    /// the matrix's fourth row with another row. Planes come out in the
    /// space the matrix maps from, i.e. world space for projection * view.
    pub fn from_matrix(view_projection: &Mat4) -> Self {
        let m = view_projection;
        let row = |i: usize| Vec3::new(m[(i, 0)], m[(i, 1)], m[(i, 2)]);
        let w = |i: usize| m[(i, 3)];

        let r0 = row(0);
        let r1 = row(1);
        let r2 = row(2);
        let r3 = row(3);

        let plane = |n: Vec3, d: f32| Plane::from_coefficients(n.x, n.y, n.z, d);
        Self {
            planes: [
                plane(r3 + r0, w(3) + w(0)), // left
                plane(r3 - r0, w(3) - w(0)), // right
                plane(r3 + r1, w(3) + w(1)), // bottom
                plane(r3 - r1, w(3) - w(1)), // top
                plane(r3 + r2, w(3) + w(2)), // near
                plane(r3 - r2, w(3) - w(2)), // far
            ],
        }
    }

    /// False only when the sphere is fully outside some plane
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        for plane in &self.planes {
            if plane.distance_to_point(center) < -radius {
                return false;
            }
        }
        true
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        // For each plane, test the corner most aligned with its normal; if
        // that corner is outside, the whole box is.
        for plane in &self.planes {
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 {
                p.x = aabb.max.x;
            }
            if plane.normal.y >= 0.0 {
                p.y = aabb.max.y;
            }
            if plane.normal.z >= 0.0 {
                p.z = aabb.max.z;
            }
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}

/// Camera pose and projection for one view
#[derive(Debug, Clone)]
pub struct Camera {
    /// World-to-eye matrix
    pub view: Mat4,
    /// Eye-to-clip matrix
    pub projection: Mat4,
}

impl Camera {
    /// Create from explicit matrices
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// Create from a look-at pose
    pub fn from_look_at(eye: Point3, target: Point3, up: Vec3, projection: Mat4) -> Self {
        Self {
            view: crate::foundation::math::look_at(eye, target, up),
            projection,
        }
    }

    /// Combined world-to-clip matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Eye position in world space
    pub fn eye(&self) -> Vec3 {
        match self.view.try_inverse() {
            Some(inverse) => inverse.transform_point(&Point3::origin()).coords,
            None => {
                log::warn!("singular view matrix; eye position falls back to origin");
                Vec3::zeros()
            }
        }
    }
}
