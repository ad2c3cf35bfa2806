//! Per-frame state graph
//!
//! The cull traversal files every render leaf under a tree keyed by the
//! state sets pushed on the way to it. Two leaves share a node exactly when
//! the full stack of sets above them is value-identical, so replay can walk
//! leaf-to-leaf emitting only the state between their tree positions.
//!
//! The whole structure is rebuilt every frame inside an arena that is reset,
//! not reallocated, between frames; nodes refer to each other by index and
//! carry no cross-frame identity.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::foundation::math::Mat4;
use crate::graph::Drawable;
use crate::state::StateSet;

/// Index of a node in the frame's state graph arena
pub type StateGraphId = usize;

/// Index of a leaf in the frame's leaf list
pub type LeafId = usize;

/// The arena slot of the root state graph node
pub const STATE_GRAPH_ROOT: StateGraphId = 0;

/// One drawable ready for replay
///
/// Ephemeral: constructed during cull, consumed during draw, discarded at the
/// frame's reset.
#[derive(Debug, Clone)]
pub struct RenderLeaf {
    /// The geometry to draw
    pub drawable: Arc<Drawable>,
    /// Accumulated model-view matrix
    pub model_view: Mat4,
    /// Distance along the view direction, for depth-sorted bins
    pub depth: f32,
    /// The state graph node the leaf is filed under
    pub state_node: StateGraphId,
}

/// Key wrapper giving `Arc<StateSet>` value semantics in child maps
///
/// Pointer equality short-circuits the common case of many nodes sharing one
/// set; distinct allocations fall back to content comparison so value-equal
/// sets land in the same child.
#[derive(Debug, Clone)]
pub(crate) struct StateKey(pub(crate) Arc<StateSet>);

impl PartialEq for StateKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl Eq for StateKey {}

impl Hash for StateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// One node of the per-frame state graph
#[derive(Debug)]
pub struct StateGraphNode {
    /// Back-reference to the parent; `None` only at the root
    pub parent: Option<StateGraphId>,
    /// Distance from the root, used by the replay LCA walk
    pub depth: usize,
    /// The distinguishing state set pushed to reach this node
    pub state: Option<Arc<StateSet>>,
    children: HashMap<StateKey, StateGraphId>,
    /// Leaves attached directly at this node, in insertion order
    pub leaves: Vec<LeafId>,
}

impl StateGraphNode {
    fn root() -> Self {
        Self {
            parent: None,
            depth: 0,
            state: None,
            children: HashMap::new(),
            leaves: Vec::new(),
        }
    }
}

/// Arena holding the frame's state graph and leaves
#[derive(Debug)]
pub struct StateGraphArena {
    nodes: Vec<StateGraphNode>,
    leaves: Vec<RenderLeaf>,
    cursor: StateGraphId,
}

impl StateGraphArena {
    /// Create an arena containing only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![StateGraphNode::root()],
            leaves: Vec::new(),
            cursor: STATE_GRAPH_ROOT,
        }
    }

    /// Discard the frame's contents, keeping the backing allocations
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.nodes.push(StateGraphNode::root());
        self.leaves.clear();
        self.cursor = STATE_GRAPH_ROOT;
    }

    /// The node the next leaf will be filed under
    pub fn cursor(&self) -> StateGraphId {
        self.cursor
    }

    /// Node accessor
    pub fn node(&self, id: StateGraphId) -> &StateGraphNode {
        &self.nodes[id]
    }

    /// Leaf accessor
    pub fn leaf(&self, id: LeafId) -> &RenderLeaf {
        &self.leaves[id]
    }

    /// Number of leaves this frame
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Number of state graph nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Descend the cursor along `set`, creating the child if new
    ///
    /// Because cull traversal is state-coherent (siblings share their prefix
    /// of pushed sets), the lookup usually hits a child created for the
    /// previous leaf and resolves by pointer comparison alone.
    pub fn push_set(&mut self, set: &Arc<StateSet>) {
        let key = StateKey(Arc::clone(set));
        if let Some(child) = self.nodes[self.cursor].children.get(&key) {
            self.cursor = *child;
            return;
        }
        let child_id = self.nodes.len();
        let depth = self.nodes[self.cursor].depth + 1;
        self.nodes.push(StateGraphNode {
            parent: Some(self.cursor),
            depth,
            state: Some(Arc::clone(set)),
            children: HashMap::new(),
            leaves: Vec::new(),
        });
        self.nodes[self.cursor].children.insert(key, child_id);
        self.cursor = child_id;
    }

    /// Move the cursor back to its parent
    pub fn pop_set(&mut self) {
        if let Some(parent) = self.nodes[self.cursor].parent {
            self.cursor = parent;
        } else {
            log::warn!("state graph pop below root ignored");
        }
    }

    /// Attach a leaf at the cursor
    ///
    /// Returns the leaf id and whether this was the first leaf at the cursor
    /// node (the signal for registering the node with the active render bin).
    pub fn add_leaf(
        &mut self,
        drawable: Arc<Drawable>,
        model_view: Mat4,
        depth: f32,
    ) -> (LeafId, bool) {
        let leaf_id = self.leaves.len();
        self.leaves.push(RenderLeaf {
            drawable,
            model_view,
            depth,
            state_node: self.cursor,
        });
        let node = &mut self.nodes[self.cursor];
        node.leaves.push(leaf_id);
        (leaf_id, node.leaves.len() == 1)
    }
}

impl Default for StateGraphArena {
    fn default() -> Self {
        Self::new()
    }
}
