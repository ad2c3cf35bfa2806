//! Traversal engine
//!
//! Visitors receive type-specific hooks (`visit_transform`, `visit_geode`,
//! ...) that default upward to `visit_node`, which continues into children.
//! A concrete visitor overrides the hooks it cares about and either calls
//! [`Traversal::traverse`] to descend or returns to prune.
//!
//! The matrix and state stacks live in the [`Traversal`] context and are
//! pushed/popped by the engine around each hook invocation. A hook that
//! returns early can therefore never unbalance them; visitors observe state
//! pushes through the `state_pushed`/`state_popped` notifications instead of
//! managing the stack themselves.

mod update;

pub use update::{deliver_event, run_update};

use std::sync::Arc;

use crate::foundation::math::Mat4;
use crate::graph::{NodeId, NodeKind, NodeMask, Scene};
use crate::state::StateSet;

/// Which children a traversal enters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Every child, regardless of switch/LOD activity
    AllChildren,
    /// Only active children: switches contribute enabled children, LOD
    /// selection is applied by cull-aware visitors
    ActiveChildren,
    /// The visitor performs its own recursion; `traverse` is a no-op
    None,
}

/// Double-dispatch visitor over node kinds
///
/// Every hook defaults upward (`visit_transform` → `visit_group` →
/// `visit_node`), so a visitor only overrides the kinds it distinguishes.
/// Node masks are tested against [`NodeVisitor::traversal_mask`] before any
/// hook runs; a zero AND prunes the subtree.
pub trait NodeVisitor: Sized {
    /// Which children [`Traversal::traverse`] enters
    fn traversal_mode(&self) -> TraversalMode {
        TraversalMode::ActiveChildren
    }

    /// Mask ANDed with each node's mask
    fn traversal_mask(&self) -> NodeMask {
        NodeMask::ALL
    }

    /// Notification that the engine pushed a node's state set
    fn state_pushed(&mut self, _set: &Arc<StateSet>) {}

    /// Notification that the engine popped a node's state set
    fn state_popped(&mut self, _set: &Arc<StateSet>) {}

    /// Fallback hook for every node kind
    fn visit_node(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        traversal.traverse(self, scene, id);
    }

    /// Hook for plain groups
    fn visit_group(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        self.visit_node(traversal, scene, id);
    }

    /// Hook for transforms; the engine has already pushed the local matrix
    fn visit_transform(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        self.visit_group(traversal, scene, id);
    }

    /// Hook for LOD selectors
    fn visit_lod(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        self.visit_group(traversal, scene, id);
    }

    /// Hook for switches
    fn visit_switch(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        self.visit_group(traversal, scene, id);
    }

    /// Hook for geometry nodes
    fn visit_geode(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        self.visit_node(traversal, scene, id);
    }

    /// Hook for paging placeholders
    fn visit_paged(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        self.visit_group(traversal, scene, id);
    }

    /// Hook for technique hosts
    fn visit_technique(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        self.visit_node(traversal, scene, id);
    }
}

/// Mutable traversal context threaded through recursion
///
/// Carries the accumulated model matrix stack and the state-set stack. Both
/// are engine-managed: [`Traversal::visit`] pushes before dispatching to the
/// visitor hook and pops after it returns.
pub struct Traversal {
    matrix_stack: Vec<Mat4>,
    state_stack: Vec<Arc<StateSet>>,
}

impl Traversal {
    /// Create a context whose accumulated matrix starts at identity
    pub fn new() -> Self {
        Self {
            matrix_stack: vec![Mat4::identity()],
            state_stack: Vec::new(),
        }
    }

    /// Accumulated local-to-world matrix at the current position
    pub fn current_matrix(&self) -> &Mat4 {
        // the stack is constructed non-empty and pops never remove the base
        &self.matrix_stack[self.matrix_stack.len() - 1]
    }

    /// The state sets pushed on the path to the current position
    pub fn state_stack(&self) -> &[Arc<StateSet>] {
        &self.state_stack
    }

    /// Dispatch a node to the visitor, with mask pruning and scoped stacks
    pub fn visit<V: NodeVisitor>(&mut self, visitor: &mut V, scene: &Scene, id: NodeId) {
        let Some(node) = scene.node(id) else {
            log::warn!("traversal reached dead node {id:?}");
            return;
        };
        if node.mask().bits() & visitor.traversal_mask().bits() == 0 {
            return;
        }

        let pushed_matrix = match node.kind() {
            NodeKind::Transform {
                spec,
                reference_frame,
                ..
            } => {
                let local = spec.local_matrix();
                let composed = match reference_frame {
                    crate::graph::ReferenceFrame::Relative => *self.current_matrix() * local,
                    crate::graph::ReferenceFrame::Absolute => local,
                };
                self.matrix_stack.push(composed);
                true
            }
            _ => false,
        };

        let pushed_state = match node.state_set() {
            Some(set) => {
                let set = Arc::clone(set);
                visitor.state_pushed(&set);
                self.state_stack.push(set);
                true
            }
            None => false,
        };

        match node.kind() {
            NodeKind::Group { .. } => visitor.visit_group(self, scene, id),
            NodeKind::Transform { .. } => visitor.visit_transform(self, scene, id),
            NodeKind::Lod { .. } => visitor.visit_lod(self, scene, id),
            NodeKind::Switch { .. } => visitor.visit_switch(self, scene, id),
            NodeKind::Geode { .. } => visitor.visit_geode(self, scene, id),
            NodeKind::Paged { .. } => visitor.visit_paged(self, scene, id),
            NodeKind::Technique(_) => visitor.visit_technique(self, scene, id),
        }

        if pushed_state {
            if let Some(set) = self.state_stack.pop() {
                visitor.state_popped(&set);
            }
        }
        if pushed_matrix {
            self.matrix_stack.pop();
        }
    }

    /// Continue into the node's children per the visitor's traversal mode
    pub fn traverse<V: NodeVisitor>(&mut self, visitor: &mut V, scene: &Scene, id: NodeId) {
        if visitor.traversal_mode() == TraversalMode::None {
            return;
        }
        let Some(node) = scene.node(id) else {
            return;
        };
        match node.kind() {
            NodeKind::Switch { enabled, children }
                if visitor.traversal_mode() == TraversalMode::ActiveChildren =>
            {
                for (index, child) in children.iter().enumerate() {
                    if enabled.get(index).copied().unwrap_or(true) {
                        self.visit(visitor, scene, *child);
                    }
                }
            }
            kind => {
                for child in kind.children() {
                    self.visit(visitor, scene, *child);
                }
            }
        }
    }
}

impl Default for Traversal {
    fn default() -> Self {
        Self::new()
    }
}
