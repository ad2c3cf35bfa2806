//! Rendering state model
//!
//! A [`StateSet`] attaches GL-style mode flags and typed attribute values to a
//! node. State inherits down the graph: the cull traversal pushes each node's
//! set onto a stack, and [`MergedState`] resolves the stack into the effective
//! state at a leaf, honoring OVERRIDE and PROTECTED modifiers.
//!
//! Identity of merged state is always *value* identity. Two distinct
//! [`StateSet`] allocations with equal contents produce equal merged state,
//! which is what lets the render phase group their drawables together.

mod attribute;
mod merged;
mod stateset;

pub use attribute::{
    AttributeKind, BlendFactor, CompareFunc, CullFaceMode, Material, PolygonFill, StateAttribute,
};
pub use merged::MergedState;
pub use stateset::{AttributeEntry, BinDetails, BinOrder, Mode, RenderingHint, StateFlags, StateSet};
