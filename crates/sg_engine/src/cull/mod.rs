//! Visibility and draw-structure construction
//!
//! The cull phase turns the scene graph plus one camera into the frame's
//! sorted [`RenderQueue`](crate::render::RenderQueue): frustum rejection by
//! cached bounds, LOD and switch narrowing, leaf depth computation, and
//! state/bin filing.

mod cull_visitor;
mod frustum;

pub use cull_visitor::{CullVisitor, TechniqueCull};
pub use frustum::{Camera, Frustum, Plane};
