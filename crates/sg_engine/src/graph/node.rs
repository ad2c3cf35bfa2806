//! Scene graph vertices
//!
//! Nodes live in the [`Scene`](super::Scene) store and refer to each other by
//! [`NodeId`]. Children are held by the owning parent edges; the `parents`
//! back-references exist only for bound invalidation and reparenting
//! bookkeeping and never keep a node alive.

use std::fmt;
use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::foundation::math::{Mat4, Trs, Vec3};
use crate::foundation::time::FrameStamp;
use crate::state::StateSet;
use crate::technique::Technique;

use super::bounds::BoundingSphere;
use super::drawable::Drawable;

new_key_type! {
    /// Stable generational key of a node in the scene store
    pub struct NodeId;
}

bitflags! {
    /// Per-node traversal filter, combined with a visitor's mask by AND
    ///
    /// Bits carry application meaning (layers, shadow casters, pick targets);
    /// the engine only ever tests `node.mask & visitor.mask == 0` to prune.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeMask: u32 {
        /// No traversal reaches the node
        const NONE = 0;
        /// Every traversal reaches the node
        const ALL = u32::MAX;
    }
}

impl Default for NodeMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Concurrency contract of a node's mutable data
///
/// Under the pipelined threading model, frame N+1's update may run while
/// frame N's cull output is still being drawn. `Static` nodes promise not to
/// change and may be read without synchronization; `Dynamic` nodes may change
/// every frame and the application must double-buffer whatever state the draw
/// phase can still observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataVariance {
    /// Structure and data never change after build
    #[default]
    Static,
    /// Mutated by update callbacks; needs double buffering under pipelining
    Dynamic,
}

/// Flow control returned by node callbacks
///
/// The traversal engine always performs the continuation into children itself
/// after the callback chain runs, unless some callback returned `Stop`. A
/// callback cannot forget to continue the traversal; it can only veto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Proceed into the node's children
    Continue,
    /// Skip the node's children this traversal
    Stop,
}

/// Per-frame application hook run during the update phase
pub trait UpdateCallback: Send {
    /// Mutate the node (or anything else in the scene) for this frame
    fn update(&mut self, scene: &mut super::Scene, node: NodeId, stamp: &FrameStamp)
        -> Continuation;
}

/// Per-event application hook run during the event phase
pub trait EventCallback: Send {
    /// Handle one event; returning `true` marks it handled
    fn event(&mut self, scene: &mut super::Scene, node: NodeId, event: &crate::events::Event)
        -> bool;
}

/// Cull-time hook; may veto traversal of the node's subtree
pub trait CullCallback: Send {
    /// Decide whether the cull traversal enters the subtree
    fn cull(&self, scene: &super::Scene, node: NodeId) -> Continuation;
}

/// Local-to-parent transform specification
#[derive(Debug, Clone, PartialEq)]
pub enum TransformSpec {
    /// Explicit matrix
    Matrix(Mat4),
    /// Position/rotation/scale/pivot composition
    Trs(Trs),
}

impl TransformSpec {
    /// The local-to-parent matrix
    pub fn local_matrix(&self) -> Mat4 {
        match self {
            Self::Matrix(m) => *m,
            Self::Trs(trs) => trs.to_matrix(),
        }
    }
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self::Matrix(Mat4::identity())
    }
}

/// How a transform composes with its ancestors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceFrame {
    /// Compose with the accumulated ancestor matrix
    #[default]
    Relative,
    /// Replace the accumulated matrix entirely
    Absolute,
}

/// One distance band of an LOD node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodRange {
    /// Nearest eye distance at which the child shows (inclusive)
    pub min: f32,
    /// Farthest eye distance (exclusive)
    pub max: f32,
}

/// Kind-specific payload of a node
pub enum NodeKind {
    /// Plain composite
    Group {
        /// Owned children, in traversal order
        children: Vec<NodeId>,
    },
    /// Composite with a local-to-parent matrix
    Transform {
        /// The local transform
        spec: TransformSpec,
        /// Relative or absolute composition
        reference_frame: ReferenceFrame,
        /// Owned children
        children: Vec<NodeId>,
    },
    /// Distance-based child selector; exactly one child traversed per cull
    Lod {
        /// Center the eye distance is measured to, in local coordinates
        center: Vec3,
        /// One range per child; a child whose range excludes the current
        /// distance is not traversed at all
        ranges: Vec<LodRange>,
        /// Owned children
        children: Vec<NodeId>,
    },
    /// Composite with per-child enable flags
    Switch {
        /// Enable flag per child
        enabled: Vec<bool>,
        /// Owned children
        children: Vec<NodeId>,
    },
    /// Geometry holder
    Geode {
        /// Drawables, shared by `Arc` into render leaves
        drawables: Vec<Arc<Drawable>>,
    },
    /// Placeholder that a background loader fills in at a frame boundary
    Paged {
        /// Path handed to the reader registry
        file_name: String,
        /// Children merged in so far; empty while the load is in flight
        children: Vec<NodeId>,
    },
    /// Plug-in subsystem managing geometry the generic traversal cannot see
    Technique(Mutex<Box<dyn Technique>>),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group { children } => f.debug_struct("Group").field("children", children).finish(),
            Self::Transform { spec, reference_frame, children } => f
                .debug_struct("Transform")
                .field("spec", spec)
                .field("reference_frame", reference_frame)
                .field("children", children)
                .finish(),
            Self::Lod { center, ranges, children } => f
                .debug_struct("Lod")
                .field("center", center)
                .field("ranges", ranges)
                .field("children", children)
                .finish(),
            Self::Switch { enabled, children } => f
                .debug_struct("Switch")
                .field("enabled", enabled)
                .field("children", children)
                .finish(),
            Self::Geode { drawables } => f
                .debug_struct("Geode")
                .field("drawables", &drawables.len())
                .finish(),
            Self::Paged { file_name, children } => f
                .debug_struct("Paged")
                .field("file_name", file_name)
                .field("children", children)
                .finish(),
            Self::Technique(_) => f.write_str("Technique"),
        }
    }
}

impl NodeKind {
    /// Children slice for composite kinds, empty for leaves
    pub fn children(&self) -> &[NodeId] {
        match self {
            Self::Group { children }
            | Self::Transform { children, .. }
            | Self::Lod { children, .. }
            | Self::Switch { children, .. }
            | Self::Paged { children, .. } => children,
            Self::Geode { .. } | Self::Technique(_) => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            Self::Group { children }
            | Self::Transform { children, .. }
            | Self::Lod { children, .. }
            | Self::Switch { children, .. }
            | Self::Paged { children, .. } => Some(children),
            Self::Geode { .. } | Self::Technique(_) => None,
        }
    }
}

/// Select the LOD child for an eye distance
///
/// Ranges are half-open `[min, max)`: a distance exactly at a breakpoint
/// selects the child whose range starts there. Returns `None` when no range
/// contains the distance.
pub fn select_lod_child(ranges: &[LodRange], distance: f32) -> Option<usize> {
    ranges
        .iter()
        .position(|r| distance >= r.min && distance < r.max)
}

/// A scene graph vertex
pub struct Node {
    /// Optional name for diagnostics and lookup
    pub(crate) name: Option<String>,
    /// Traversal filter
    pub(crate) mask: NodeMask,
    /// State attached to this node, shared by reference
    pub(crate) state_set: Option<Arc<StateSet>>,
    /// Concurrency contract
    pub(crate) data_variance: DataVariance,
    /// Ordered update hooks
    pub(crate) update_callbacks: Vec<Box<dyn UpdateCallback>>,
    /// Ordered event hooks
    pub(crate) event_callbacks: Vec<Box<dyn EventCallback>>,
    /// Ordered cull hooks
    pub(crate) cull_callbacks: Vec<Box<dyn CullCallback>>,
    /// Non-owning back-references; one entry per parent edge
    pub(crate) parents: Vec<NodeId>,
    /// Cached local bounding sphere
    pub(crate) bound: BoundingSphere,
    /// Whether `bound` needs recomputation
    pub(crate) bound_dirty: bool,
    /// Kind-specific payload
    pub(crate) kind: NodeKind,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("mask", &self.mask)
            .field("data_variance", &self.data_variance)
            .field("update_callbacks", &self.update_callbacks.len())
            .field("parents", &self.parents)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            name: None,
            mask: NodeMask::default(),
            state_set: None,
            data_variance: DataVariance::default(),
            update_callbacks: Vec::new(),
            event_callbacks: Vec::new(),
            cull_callbacks: Vec::new(),
            parents: Vec::new(),
            bound: BoundingSphere::invalid(),
            bound_dirty: true,
            kind,
        }
    }

    /// Node name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Traversal mask
    pub fn mask(&self) -> NodeMask {
        self.mask
    }

    /// Attached state set
    pub fn state_set(&self) -> Option<&Arc<StateSet>> {
        self.state_set.as_ref()
    }

    /// Concurrency contract
    pub fn data_variance(&self) -> DataVariance {
        self.data_variance
    }

    /// Parent back-references (non-owning)
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Kind payload
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Children in traversal order (empty for leaf kinds)
    pub fn children(&self) -> &[NodeId] {
        self.kind.children()
    }
}
