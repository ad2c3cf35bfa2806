//! The scene store
//!
//! [`Scene`] owns every node in a slotmap keyed by [`NodeId`]. Parent-to-child
//! edges own: a node stays alive while any parent references it, and removing
//! the last parent edge releases the whole unreachable subtree. The graph is a
//! DAG; `add_child` rejects edges that would close a cycle, which is the only
//! mutation that could introduce one. Traversals rely on that precondition and
//! perform no cycle detection of their own.

use std::sync::{Arc, Mutex};

use slotmap::SlotMap;
use thiserror::Error;

use crate::foundation::math::Vec3;
use crate::state::StateSet;
use crate::technique::Technique;

use super::bounds::{Aabb, BoundingSphere};
use super::drawable::Drawable;
use super::node::{
    CullCallback, DataVariance, EventCallback, LodRange, Node, NodeId, NodeKind, NodeMask,
    ReferenceFrame, TransformSpec, UpdateCallback,
};

/// Errors from graph mutation
#[derive(Debug, Error)]
pub enum SceneError {
    /// The node id does not refer to a live node
    #[error("node {0:?} not found")]
    NodeNotFound(NodeId),

    /// The operation requires a child-holding node
    #[error("node {0:?} cannot hold children")]
    NotAComposite(NodeId),

    /// The operation requires a geometry node
    #[error("node {0:?} is not a geode")]
    NotAGeode(NodeId),

    /// The edge is not present
    #[error("node {child:?} is not a child of {parent:?}")]
    ChildNotFound {
        /// The parent of the missing edge
        parent: NodeId,
        /// The child of the missing edge
        child: NodeId,
    },

    /// Adding the edge would close a cycle
    #[error("adding {child:?} under {parent:?} would create a cycle")]
    WouldCycle {
        /// The intended parent
        parent: NodeId,
        /// The intended child
        child: NodeId,
    },

    /// The node still has owning parent edges
    #[error("node {0:?} still has parents; remove those edges first")]
    StillParented(NodeId),

    /// A per-child index was out of range
    #[error("child index {index} out of range for node {node:?}")]
    IndexOutOfRange {
        /// The indexed node
        node: NodeId,
        /// The offending index
        index: usize,
    },
}

/// Owner of all scene graph nodes
#[derive(Debug, Default)]
pub struct Scene {
    nodes: SlotMap<NodeId, Node>,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no nodes exist
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---- creation ------------------------------------------------------

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.insert(Node::new(kind))
    }

    /// Create an empty group
    pub fn create_group(&mut self) -> NodeId {
        self.insert(NodeKind::Group {
            children: Vec::new(),
        })
    }

    /// Create a transform with the given local matrix specification
    pub fn create_transform(&mut self, spec: TransformSpec) -> NodeId {
        self.insert(NodeKind::Transform {
            spec,
            reference_frame: ReferenceFrame::default(),
            children: Vec::new(),
        })
    }

    /// Create an LOD selector centered at `center` in local coordinates
    pub fn create_lod(&mut self, center: Vec3) -> NodeId {
        self.insert(NodeKind::Lod {
            center,
            ranges: Vec::new(),
            children: Vec::new(),
        })
    }

    /// Create a switch with no children
    pub fn create_switch(&mut self) -> NodeId {
        self.insert(NodeKind::Switch {
            enabled: Vec::new(),
            children: Vec::new(),
        })
    }

    /// Create an empty geometry node
    pub fn create_geode(&mut self) -> NodeId {
        self.insert(NodeKind::Geode {
            drawables: Vec::new(),
        })
    }

    /// Create a paging placeholder for the given file path
    ///
    /// The placeholder has an invalid bound until a subgraph is merged in, so
    /// cull treats it as a no-op while the load is in flight.
    pub fn create_paged(&mut self, file_name: impl Into<String>) -> NodeId {
        self.insert(NodeKind::Paged {
            file_name: file_name.into(),
            children: Vec::new(),
        })
    }

    /// Create a node hosting a plug-in technique
    pub fn create_technique(&mut self, mut technique: Box<dyn Technique>) -> NodeId {
        technique.init();
        self.insert(NodeKind::Technique(Mutex::new(technique)))
    }

    // ---- access --------------------------------------------------------

    /// Look up a node
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Look up a node mutably
    ///
    /// Structural changes made through this accessor do not invalidate cached
    /// bounds; prefer the dedicated mutators, or call
    /// [`Scene::dirty_bound`] afterwards.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// First node with the given name, in unspecified iteration order
    pub fn find_named(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name.as_deref() == Some(name))
            .map(|(id, _)| id)
    }

    /// Iterate all live nodes
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    // ---- structure -----------------------------------------------------

    /// Add an owning parent-to-child edge
    ///
    /// The same child may be added under many parents (and more than once
    /// under one parent); each edge contributes an independent traversal
    /// path. Rejects edges that would close a cycle.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        if !self.nodes.contains_key(child) {
            return Err(SceneError::NodeNotFound(child));
        }
        if !self.nodes.contains_key(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(SceneError::WouldCycle { parent, child });
        }

        let parent_node = &mut self.nodes[parent];
        let Some(children) = parent_node.kind.children_mut() else {
            return Err(SceneError::NotAComposite(parent));
        };
        children.push(child);
        if let NodeKind::Switch { enabled, children } = &mut parent_node.kind {
            // keep the enable list parallel; new children start enabled
            enabled.resize(children.len(), true);
        }
        self.nodes[child].parents.push(parent);
        self.dirty_bound(parent);
        Ok(())
    }

    /// True when `ancestor` is reachable from `node` by walking parent links
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut stack = vec![node];
        let mut seen = Vec::new();
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            if let Some(n) = self.nodes.get(current) {
                stack.extend_from_slice(&n.parents);
            }
        }
        false
    }

    /// Remove one parent-to-child edge
    ///
    /// When the last edge into `child` is removed the child and every node
    /// only reachable through it are released from the store.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or(SceneError::NodeNotFound(parent))?;
        let Some(children) = parent_node.kind.children_mut() else {
            return Err(SceneError::NotAComposite(parent));
        };
        let Some(index) = children.iter().position(|c| *c == child) else {
            return Err(SceneError::ChildNotFound { parent, child });
        };
        children.remove(index);
        if let NodeKind::Switch { enabled, .. } = &mut parent_node.kind {
            if index < enabled.len() {
                enabled.remove(index);
            }
        }

        if let Some(child_node) = self.nodes.get_mut(child) {
            if let Some(back) = child_node.parents.iter().position(|p| *p == parent) {
                child_node.parents.remove(back);
            }
            if child_node.parents.is_empty() {
                self.release(child);
            }
        }
        self.dirty_bound(parent);
        Ok(())
    }

    /// Remove a parentless node and release everything only it reaches
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), SceneError> {
        let node = self.nodes.get(id).ok_or(SceneError::NodeNotFound(id))?;
        if !node.parents.is_empty() {
            return Err(SceneError::StillParented(id));
        }
        self.release(id);
        Ok(())
    }

    fn release(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        if let NodeKind::Technique(technique) = &node.kind {
            match technique.lock() {
                Ok(mut technique) => technique.clean_scene_graph(),
                Err(_) => log::warn!("technique mutex poisoned during release"),
            }
        }
        for child in node.kind.children().to_vec() {
            if let Some(child_node) = self.nodes.get_mut(child) {
                if let Some(back) = child_node.parents.iter().position(|p| *p == id) {
                    child_node.parents.remove(back);
                }
                if child_node.parents.is_empty() {
                    self.release(child);
                }
            }
        }
    }

    // ---- node attributes ----------------------------------------------

    /// Set a node's name
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .name = Some(name.into());
        Ok(())
    }

    /// Set a node's traversal mask
    pub fn set_node_mask(&mut self, id: NodeId, mask: NodeMask) -> Result<(), SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .mask = mask;
        Ok(())
    }

    /// Attach or clear a node's state set
    pub fn set_state_set(
        &mut self,
        id: NodeId,
        state_set: Option<Arc<StateSet>>,
    ) -> Result<(), SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .state_set = state_set;
        Ok(())
    }

    /// Set a node's data variance
    pub fn set_data_variance(
        &mut self,
        id: NodeId,
        variance: DataVariance,
    ) -> Result<(), SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .data_variance = variance;
        Ok(())
    }

    /// Append an update callback to the node's chain
    pub fn add_update_callback(
        &mut self,
        id: NodeId,
        callback: Box<dyn UpdateCallback>,
    ) -> Result<(), SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .update_callbacks
            .push(callback);
        Ok(())
    }

    /// Append an event callback to the node's chain
    pub fn add_event_callback(
        &mut self,
        id: NodeId,
        callback: Box<dyn EventCallback>,
    ) -> Result<(), SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .event_callbacks
            .push(callback);
        Ok(())
    }

    /// Append a cull callback to the node's chain
    pub fn add_cull_callback(
        &mut self,
        id: NodeId,
        callback: Box<dyn CullCallback>,
    ) -> Result<(), SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .cull_callbacks
            .push(callback);
        Ok(())
    }

    // ---- kind-specific mutation ---------------------------------------

    /// Replace a transform's local matrix specification
    pub fn set_transform(&mut self, id: NodeId, spec: TransformSpec) -> Result<(), SceneError> {
        match &mut self
            .nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .kind
        {
            NodeKind::Transform { spec: slot, .. } => {
                *slot = spec;
            }
            _ => return Err(SceneError::NotAComposite(id)),
        }
        self.dirty_bound(id);
        Ok(())
    }

    /// Set a transform's reference frame
    pub fn set_reference_frame(
        &mut self,
        id: NodeId,
        frame: ReferenceFrame,
    ) -> Result<(), SceneError> {
        match &mut self
            .nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .kind
        {
            NodeKind::Transform {
                reference_frame, ..
            } => {
                *reference_frame = frame;
                Ok(())
            }
            _ => Err(SceneError::NotAComposite(id)),
        }
    }

    /// Set the distance ranges of an LOD node, one per child
    pub fn set_lod_ranges(&mut self, id: NodeId, new: Vec<LodRange>) -> Result<(), SceneError> {
        match &mut self
            .nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .kind
        {
            NodeKind::Lod { ranges, .. } => {
                *ranges = new;
                Ok(())
            }
            _ => Err(SceneError::NotAComposite(id)),
        }
    }

    /// Enable or disable one child of a switch
    pub fn set_child_enabled(
        &mut self,
        id: NodeId,
        index: usize,
        value: bool,
    ) -> Result<(), SceneError> {
        match &mut self
            .nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .kind
        {
            NodeKind::Switch { enabled, .. } => {
                let slot = enabled
                    .get_mut(index)
                    .ok_or(SceneError::IndexOutOfRange { node: id, index })?;
                *slot = value;
                Ok(())
            }
            _ => Err(SceneError::NotAComposite(id)),
        }
    }

    /// Append a drawable to a geode
    pub fn add_drawable(&mut self, id: NodeId, drawable: Arc<Drawable>) -> Result<(), SceneError> {
        match &mut self
            .nodes
            .get_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .kind
        {
            NodeKind::Geode { drawables } => {
                drawables.push(drawable);
            }
            _ => return Err(SceneError::NotAGeode(id)),
        }
        self.dirty_bound(id);
        Ok(())
    }

    /// Drawables of a geode
    pub fn drawables(&self, id: NodeId) -> Result<&[Arc<Drawable>], SceneError> {
        match &self.nodes.get(id).ok_or(SceneError::NodeNotFound(id))?.kind {
            NodeKind::Geode { drawables } => Ok(drawables),
            _ => Err(SceneError::NotAGeode(id)),
        }
    }

    // ---- bounds --------------------------------------------------------

    /// Mark a node's cached bound stale and propagate to every ancestor
    pub fn dirty_bound(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.bound_dirty {
            // ancestors are already dirty by the propagation invariant
            return;
        }
        node.bound_dirty = true;
        for parent in node.parents.clone() {
            self.dirty_bound(parent);
        }
    }

    /// Local bounding sphere of a node, from cache when clean
    ///
    /// Read-only: a dirty bound is recomputed on the fly without updating the
    /// cache. Call [`Scene::compute_bounds`] from the update phase to refresh
    /// caches ahead of concurrent cull passes.
    pub fn bound(&self, id: NodeId) -> BoundingSphere {
        let Some(node) = self.nodes.get(id) else {
            return BoundingSphere::invalid();
        };
        if !node.bound_dirty {
            return node.bound;
        }
        self.compute_bound(node)
    }

    fn compute_bound(&self, node: &Node) -> BoundingSphere {
        match &node.kind {
            NodeKind::Geode { drawables } => {
                let mut bb = Aabb::empty();
                for drawable in drawables {
                    bb.expand_by_box(&drawable.bound());
                }
                BoundingSphere::from_aabb(&bb)
            }
            NodeKind::Transform { spec, children, .. } => {
                let mut sphere = BoundingSphere::invalid();
                for child in children {
                    sphere.expand_by_sphere(&self.bound(*child));
                }
                sphere.transformed(&spec.local_matrix())
            }
            NodeKind::Technique(technique) => technique
                .lock()
                .map(|t| t.bound())
                .unwrap_or_default(),
            kind => {
                let mut sphere = BoundingSphere::invalid();
                for child in kind.children() {
                    sphere.expand_by_sphere(&self.bound(*child));
                }
                sphere
            }
        }
    }

    /// Refresh every stale cached bound under `root`
    ///
    /// Post-order walk; shared subtrees are refreshed once. Runs in the
    /// update phase where the scene is exclusively borrowed, so later cull
    /// passes can read cached bounds without synchronization.
    pub fn compute_bounds(&mut self, root: NodeId) {
        let Some(node) = self.nodes.get(root) else {
            return;
        };
        if !node.bound_dirty {
            return;
        }
        for child in node.kind.children().to_vec() {
            self.compute_bounds(child);
        }
        let node = &self.nodes[root];
        let bound = self.compute_bound(node);
        let node = &mut self.nodes[root];
        node.bound = bound;
        node.bound_dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::drawable::box_drawable;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_and_remove_child() {
        let mut scene = Scene::new();
        let root = scene.create_group();
        let child = scene.create_group();
        scene.add_child(root, child).unwrap();
        assert_eq!(scene.node(root).unwrap().children(), &[child]);
        assert_eq!(scene.node(child).unwrap().parents(), &[root]);

        scene.remove_child(root, child).unwrap();
        assert!(scene.node(root).unwrap().children().is_empty());
        // last parent edge removed: child released
        assert!(scene.node(child).is_none());
    }

    #[test]
    fn test_shared_child_survives_one_parent() {
        let mut scene = Scene::new();
        let a = scene.create_group();
        let b = scene.create_group();
        let shared = scene.create_geode();
        scene.add_child(a, shared).unwrap();
        scene.add_child(b, shared).unwrap();

        scene.remove_child(a, shared).unwrap();
        assert!(scene.node(shared).is_some());
        scene.remove_child(b, shared).unwrap();
        assert!(scene.node(shared).is_none());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut scene = Scene::new();
        let a = scene.create_group();
        let b = scene.create_group();
        let c = scene.create_group();
        scene.add_child(a, b).unwrap();
        scene.add_child(b, c).unwrap();
        assert!(matches!(
            scene.add_child(c, a),
            Err(SceneError::WouldCycle { .. })
        ));
        assert!(matches!(
            scene.add_child(a, a),
            Err(SceneError::WouldCycle { .. })
        ));
        // diamonds are fine: DAG, not tree
        scene.add_child(a, c).unwrap();
    }

    #[test]
    fn test_release_cascades() {
        let mut scene = Scene::new();
        let root = scene.create_group();
        let mid = scene.create_group();
        let leaf = scene.create_geode();
        scene.add_child(root, mid).unwrap();
        scene.add_child(mid, leaf).unwrap();

        scene.remove_child(root, mid).unwrap();
        assert!(scene.node(mid).is_none());
        assert!(scene.node(leaf).is_none());
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn test_geode_bound_from_drawables() {
        let mut scene = Scene::new();
        let geode = scene.create_geode();
        scene
            .add_drawable(geode, Arc::new(box_drawable(Vec3::zeros(), 1.0)))
            .unwrap();
        let bound = scene.bound(geode);
        assert!(bound.valid());
        assert_relative_eq!(bound.center, Vec3::zeros());
        assert_relative_eq!(bound.radius, 3.0_f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_transform_bound_includes_local_matrix() {
        let mut scene = Scene::new();
        let xform = scene.create_transform(TransformSpec::Matrix(
            crate::foundation::math::Mat4::new_translation(&Vec3::new(10.0, 0.0, 0.0)),
        ));
        let geode = scene.create_geode();
        scene
            .add_drawable(geode, Arc::new(box_drawable(Vec3::zeros(), 1.0)))
            .unwrap();
        scene.add_child(xform, geode).unwrap();

        let bound = scene.bound(xform);
        assert_relative_eq!(bound.center, Vec3::new(10.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_bound_cache_refresh_and_dirty() {
        let mut scene = Scene::new();
        let root = scene.create_group();
        let geode = scene.create_geode();
        scene.add_child(root, geode).unwrap();
        scene
            .add_drawable(geode, Arc::new(box_drawable(Vec3::zeros(), 1.0)))
            .unwrap();

        scene.compute_bounds(root);
        assert!(!scene.node(root).unwrap().bound_dirty);

        // adding a drawable dirties the geode and its ancestors
        scene
            .add_drawable(geode, Arc::new(box_drawable(Vec3::new(5.0, 0.0, 0.0), 1.0)))
            .unwrap();
        assert!(scene.node(root).unwrap().bound_dirty);
        let refreshed = scene.bound(root);
        assert!(refreshed.radius > 2.0);
    }

    #[test]
    fn test_empty_group_has_invalid_bound() {
        let mut scene = Scene::new();
        let group = scene.create_group();
        assert!(!scene.bound(group).valid());
    }
}
