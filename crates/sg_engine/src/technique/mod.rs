//! Plug-in rendering techniques
//!
//! Terrain pagers, particle systems, shadow passes and similar subsystems
//! manage geometry the generic traversal cannot see into. They participate in
//! the frame through this small polymorphic contract: the engine forwards
//! each phase into the technique, and the technique submits whatever
//! drawables it wants rendered through the cull hand-off it is given.

use crate::cull::TechniqueCull;
use crate::foundation::time::FrameStamp;
use crate::graph::BoundingSphere;

/// Contract for a plug-in technique hosted by a technique node
pub trait Technique: Send {
    /// Diagnostic name
    fn name(&self) -> &str {
        "technique"
    }

    /// One-time setup, called when the technique is attached to the scene
    fn init(&mut self) {}

    /// Per-frame state advance, called by the update traversal
    fn update(&mut self, stamp: &FrameStamp);

    /// Submit visible geometry for this frame
    ///
    /// Called by the cull traversal with the accumulated matrix and state of
    /// the technique's position in the graph already applied; everything
    /// submitted through `cull` inherits them.
    fn cull(&mut self, cull: &mut TechniqueCull<'_, '_>);

    /// Release any nodes the technique attached to the graph
    fn clean_scene_graph(&mut self) {}

    /// Bound of the technique's managed geometry, if it can report one
    ///
    /// An invalid bound makes the hosting node uncullable-by-bounds, which is
    /// the safe default for techniques with unbounded or varying content.
    fn bound(&self) -> BoundingSphere {
        BoundingSphere::invalid()
    }
}
