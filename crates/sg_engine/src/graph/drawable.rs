//! Geometry leaves
//!
//! A [`Drawable`] owns vertex data plus an optional state set and is shared
//! into render leaves by `Arc`, so a draw thread can keep drawing frame N
//! while frame N+1 restructures the graph. Its bounding box is recomputed on
//! every array mutation; it always bounds the current vertex data.

use std::sync::Arc;

use crate::foundation::math::Vec3;
use crate::state::StateSet;

use super::bounds::Aabb;

/// How the vertex array is assembled into primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    /// Independent points
    Points,
    /// Independent line segments, two vertices each
    Lines,
    /// Independent triangles, three vertices each
    Triangles,
}

/// A geometry leaf: vertex data plus optional state
#[derive(Debug, Clone)]
pub struct Drawable {
    name: Option<String>,
    vertices: Vec<Vec3>,
    indices: Option<Vec<u32>>,
    mode: PrimitiveMode,
    state_set: Option<Arc<StateSet>>,
    bound: Aabb,
}

impl Drawable {
    /// Create a drawable from a vertex array
    pub fn new(mode: PrimitiveMode, vertices: Vec<Vec3>) -> Self {
        let bound = compute_bound(&vertices);
        Self {
            name: None,
            vertices,
            indices: None,
            mode,
            state_set: None,
            bound,
        }
    }

    /// Create an indexed drawable
    pub fn with_indices(mode: PrimitiveMode, vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let bound = compute_bound(&vertices);
        Self {
            name: None,
            vertices,
            indices: Some(indices),
            mode,
            state_set: None,
            bound,
        }
    }

    /// Builder-style name assignment
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder-style state-set assignment
    pub fn with_state_set(mut self, state_set: Arc<StateSet>) -> Self {
        self.state_set = Some(state_set);
        self
    }

    /// Drawable name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Primitive assembly mode
    pub fn mode(&self) -> PrimitiveMode {
        self.mode
    }

    /// Vertex array
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Index array, if indexed
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// Replace the vertex array; the bound is recomputed immediately
    pub fn set_vertices(&mut self, vertices: Vec<Vec3>) {
        self.bound = compute_bound(&vertices);
        self.vertices = vertices;
    }

    /// Replace the index array
    pub fn set_indices(&mut self, indices: Option<Vec<u32>>) {
        self.indices = indices;
    }

    /// State set attached directly to this drawable
    pub fn state_set(&self) -> Option<&Arc<StateSet>> {
        self.state_set.as_ref()
    }

    /// Attach or clear the drawable's own state set
    pub fn set_state_set(&mut self, state_set: Option<Arc<StateSet>>) {
        self.state_set = state_set;
    }

    /// Local-space bounding box of the current vertex data
    ///
    /// Invalid when the drawable has no vertices; such drawables are skipped
    /// by the cull traversal rather than drawn or reported as errors.
    pub fn bound(&self) -> Aabb {
        self.bound
    }

    /// Number of primitives the vertex/index data assembles into
    pub fn primitive_count(&self) -> usize {
        let n = self
            .indices
            .as_ref()
            .map_or(self.vertices.len(), Vec::len);
        match self.mode {
            PrimitiveMode::Points => n,
            PrimitiveMode::Lines => n / 2,
            PrimitiveMode::Triangles => n / 3,
        }
    }
}

fn compute_bound(vertices: &[Vec3]) -> Aabb {
    let mut bound = Aabb::empty();
    for v in vertices {
        bound.expand_by_point(*v);
    }
    bound
}

/// An axis-aligned unit-ish box drawable, handy for tests and placeholders
pub fn box_drawable(center: Vec3, half_extent: f32) -> Drawable {
    let e = half_extent;
    let corners: Vec<Vec3> = (0..8)
        .map(|i| {
            center
                + Vec3::new(
                    if i & 1 != 0 { e } else { -e },
                    if i & 2 != 0 { e } else { -e },
                    if i & 4 != 0 { e } else { -e },
                )
        })
        .collect();
    // 12 triangles over the 8 corners
    let indices = vec![
        0, 1, 3, 0, 3, 2, // -z
        4, 6, 7, 4, 7, 5, // +z
        0, 4, 5, 0, 5, 1, // -y
        2, 3, 7, 2, 7, 6, // +y
        0, 2, 6, 0, 6, 4, // -x
        1, 5, 7, 1, 7, 3, // +x
    ];
    Drawable::with_indices(PrimitiveMode::Triangles, corners, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bound_tracks_vertices() {
        let mut d = Drawable::new(
            PrimitiveMode::Points,
            vec![Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 2.0, 0.0)],
        );
        assert!(d.bound().valid());
        assert_relative_eq!(d.bound().max, Vec3::new(1.0, 2.0, 0.0));

        d.set_vertices(vec![Vec3::new(5.0, 5.0, 5.0)]);
        assert_relative_eq!(d.bound().min, Vec3::new(5.0, 5.0, 5.0));
        assert_relative_eq!(d.bound().max, Vec3::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn test_empty_drawable_has_invalid_bound() {
        let d = Drawable::new(PrimitiveMode::Triangles, Vec::new());
        assert!(!d.bound().valid());
    }

    #[test]
    fn test_box_drawable_bound() {
        let d = box_drawable(Vec3::new(0.0, 0.0, 0.0), 1.0);
        let b = d.bound();
        assert_relative_eq!(b.min, Vec3::new(-1.0, -1.0, -1.0));
        assert_relative_eq!(b.max, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(d.primitive_count(), 12);
    }
}
