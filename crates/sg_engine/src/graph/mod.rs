//! Scene graph model
//!
//! A directed acyclic graph of nodes owned by a [`Scene`] store. Groups hold
//! ordered children (a child may sit under several parents), transforms carry
//! a local matrix, geodes hold drawables, and LOD/switch nodes restrict which
//! children a traversal enters. Bounding volumes are cached per node and
//! invalidated through parent back-references on any mutation that could
//! change them.

mod bounds;
mod drawable;
mod node;
mod scene;

pub use bounds::{Aabb, BoundingSphere};
pub use drawable::{box_drawable, Drawable, PrimitiveMode};
pub use node::{
    select_lod_child, Continuation, CullCallback, DataVariance, EventCallback, LodRange, Node,
    NodeId, NodeKind, NodeMask, ReferenceFrame, TransformSpec, UpdateCallback,
};
pub use scene::{Scene, SceneError};
