//! Cull traversal
//!
//! Walks the active scene once per view, rejecting subtrees whose world
//! bounds fall outside the frustum, selecting LOD children by eye distance,
//! and filing every surviving drawable into the frame's [`RenderQueue`] under
//! its accumulated state and bin.

use std::sync::Arc;

use crate::config::CullConfig;
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::graph::{
    select_lod_child, BoundingSphere, Continuation, Drawable, Node, NodeId, NodeKind, NodeMask,
    Scene,
};
use crate::render::{BinId, RenderQueue, ROOT_BIN};
use crate::state::{BinDetails, StateSet};
use crate::visitor::{NodeVisitor, Traversal, TraversalMode};

use super::frustum::{Camera, Frustum};

/// The cull traversal for one view
pub struct CullVisitor<'q> {
    view: Mat4,
    frustum: Frustum,
    eye: Vec3,
    lod_scale: f32,
    small_feature_ratio: f32,
    mask: NodeMask,
    queue: &'q mut RenderQueue,
    bin_stack: Vec<BinId>,
}

impl<'q> CullVisitor<'q> {
    /// Create a visitor culling against `camera` into `queue`
    pub fn new(camera: &Camera, config: &CullConfig, queue: &'q mut RenderQueue) -> Self {
        Self {
            view: camera.view,
            frustum: Frustum::from_matrix(&camera.view_projection()),
            eye: camera.eye(),
            lod_scale: config.lod_scale,
            small_feature_ratio: config.small_feature_ratio,
            mask: NodeMask::ALL,
            queue,
            bin_stack: Vec::new(),
        }
    }

    /// Restrict the traversal to nodes matching `mask`
    pub fn with_mask(mut self, mask: NodeMask) -> Self {
        self.mask = mask;
        self
    }

    /// Run the traversal from `root`
    pub fn run(mut self, scene: &Scene, root: NodeId) {
        let mut traversal = Traversal::new();
        traversal.visit(&mut self, scene, root);
    }

    fn current_bin(&self) -> BinId {
        self.bin_stack.last().copied().unwrap_or(ROOT_BIN)
    }

    fn push_state(&mut self, set: &Arc<StateSet>) {
        self.queue.push_set(set);
        let bin = match set.render_bin() {
            BinDetails::Use { number, order } => {
                self.queue.find_or_insert_bin(self.current_bin(), number, order)
            }
            BinDetails::Inherit => self.current_bin(),
        };
        self.bin_stack.push(bin);
    }

    fn pop_state(&mut self) {
        self.queue.pop_set();
        self.bin_stack.pop();
    }

    /// Subtree rejection test at the current traversal position
    ///
    /// An invalid bound cannot prove the subtree outside, so it traverses;
    /// empty composites are no-ops anyway and techniques default to an
    /// invalid (uncullable) bound on purpose.
    fn subtree_culled(&self, scene: &Scene, id: NodeId, node: &Node, traversal: &Traversal) -> bool {
        for callback in &node.cull_callbacks {
            if callback.cull(scene, id) == Continuation::Stop {
                return true;
            }
        }
        let local = match node.kind() {
            // the engine already pushed the transform's local matrix, so use
            // the children's union rather than the node bound (which has the
            // local matrix folded in)
            NodeKind::Transform { children, .. } => {
                let mut sphere = BoundingSphere::invalid();
                for child in children {
                    sphere.expand_by_sphere(&scene.bound(*child));
                }
                sphere
            }
            _ => scene.bound(id),
        };
        if !local.valid() {
            return false;
        }
        let world = local.transformed(traversal.current_matrix());
        !self.frustum.contains_sphere(world.center, world.radius)
    }

    fn leaf_depth(&self, world_center: Vec3) -> f32 {
        let eye_space = self
            .view
            .transform_point(&Point3::new(world_center.x, world_center.y, world_center.z));
        -eye_space.z
    }

    /// File one drawable under the current matrix and state
    fn add_drawable(&mut self, drawable: &Arc<Drawable>, model: &Mat4) {
        let bound = drawable.bound();
        if !bound.valid() {
            log::debug!(
                "skipping drawable {:?} with empty bound",
                drawable.name().unwrap_or("unnamed")
            );
            return;
        }
        let world = bound.transformed(model);
        let sphere = BoundingSphere::from_aabb(&world);
        if !self.frustum.contains_sphere(sphere.center, sphere.radius) {
            return;
        }
        let depth = self.leaf_depth(sphere.center);
        if self.small_feature_ratio > 0.0
            && depth > 0.0
            && sphere.radius / depth < self.small_feature_ratio
        {
            return;
        }

        let model_view = self.view * model;
        let pushed = match drawable.state_set() {
            Some(set) => {
                self.push_state(set);
                true
            }
            None => false,
        };
        let bin = self.current_bin();
        self.queue
            .add_leaf(bin, Arc::clone(drawable), model_view, depth);
        if pushed {
            self.pop_state();
        }
    }
}

impl NodeVisitor for CullVisitor<'_> {
    fn traversal_mode(&self) -> TraversalMode {
        TraversalMode::ActiveChildren
    }

    fn traversal_mask(&self) -> NodeMask {
        self.mask
    }

    fn state_pushed(&mut self, set: &Arc<StateSet>) {
        self.push_state(set);
    }

    fn state_popped(&mut self, _set: &Arc<StateSet>) {
        self.pop_state();
    }

    fn visit_group(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        let Some(node) = scene.node(id) else {
            return;
        };
        if self.subtree_culled(scene, id, node, traversal) {
            return;
        }
        traversal.traverse(self, scene, id);
    }

    fn visit_lod(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        let Some(node) = scene.node(id) else {
            return;
        };
        if self.subtree_culled(scene, id, node, traversal) {
            return;
        }
        let NodeKind::Lod {
            center,
            ranges,
            children,
        } = node.kind()
        else {
            return;
        };
        let world_center = traversal
            .current_matrix()
            .transform_point(&Point3::new(center.x, center.y, center.z));
        let distance = (world_center.coords - self.eye).magnitude() * self.lod_scale;
        // exactly one child enters the traversal; the rest are skipped
        // entirely, not merely culled
        if let Some(index) = select_lod_child(ranges, distance) {
            if let Some(child) = children.get(index) {
                traversal.visit(self, scene, *child);
            }
        }
    }

    fn visit_geode(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        let Some(node) = scene.node(id) else {
            return;
        };
        if self.subtree_culled(scene, id, node, traversal) {
            return;
        }
        let NodeKind::Geode { drawables } = node.kind() else {
            return;
        };
        let model = *traversal.current_matrix();
        for drawable in drawables {
            self.add_drawable(drawable, &model);
        }
    }

    fn visit_technique(&mut self, traversal: &mut Traversal, scene: &Scene, id: NodeId) {
        let Some(node) = scene.node(id) else {
            return;
        };
        if self.subtree_culled(scene, id, node, traversal) {
            return;
        }
        let NodeKind::Technique(technique) = node.kind() else {
            return;
        };
        let model = *traversal.current_matrix();
        match technique.lock() {
            Ok(mut technique) => {
                let mut hand_off = TechniqueCull {
                    visitor: self,
                    model,
                };
                technique.cull(&mut hand_off);
            }
            Err(_) => log::warn!("technique mutex poisoned during cull; skipping"),
        }
    }
}

/// Cull hand-off given to plug-in techniques
///
/// Everything submitted inherits the accumulated matrix and state at the
/// technique's position in the graph.
pub struct TechniqueCull<'a, 'q> {
    visitor: &'a mut CullVisitor<'q>,
    model: Mat4,
}

impl TechniqueCull<'_, '_> {
    /// Accumulated model matrix at the technique node
    pub fn model_matrix(&self) -> &Mat4 {
        &self.model
    }

    /// Submit a drawable, optionally under an extra state set
    ///
    /// The drawable is frustum-tested and filed exactly like geode geometry.
    pub fn add_drawable(&mut self, drawable: &Arc<Drawable>, state: Option<&Arc<StateSet>>) {
        if let Some(set) = state {
            self.visitor.push_state(set);
        }
        let model = self.model;
        self.visitor.add_drawable(drawable, &model);
        if state.is_some() {
            self.visitor.pop_state();
        }
    }
}
