//! Top-level engine coordination
//!
//! [`Engine`] owns the scene, the event queue, the pager, and the frame
//! scheduler, and runs the per-frame sequence: consume events, merge paged
//! subgraphs, update, refresh bounds, cull, draw. Applications that embed
//! their own loop can instead drive the subsystems directly; everything the
//! engine does per frame is public API.

use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::cull::{Camera, CullVisitor};
use crate::events::EventQueue;
use crate::foundation::math::Mat4;
use crate::foundation::time::{FrameClock, FrameStamp};
use crate::frame::FrameScheduler;
use crate::graph::{NodeId, NodeMask, Scene, SceneError};
use crate::io::ReaderRegistry;
use crate::pager::{DatabasePager, PagerError};
use crate::render::{DrawStats, GraphicsContext, RenderDevice, RenderError};
use crate::visitor::{deliver_event, run_update};

/// Engine-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Graph mutation failed
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),

    /// A frame's replay failed
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// A paging request failed
    #[error("pager error: {0}")]
    Pager(#[from] PagerError),
}

/// What one frame did
#[derive(Debug, Clone, Copy)]
pub struct FrameReport {
    /// The frame's stamp
    pub stamp: FrameStamp,
    /// Paged subgraphs merged at the frame boundary
    pub merged_subgraphs: usize,
    /// Leaves that survived culling
    pub leaves: usize,
    /// Draw statistics; `None` while a pipelined draw is still in flight
    pub draw: Option<DrawStats>,
}

/// The engine: subsystem owner and frame loop
pub struct Engine {
    scene: Scene,
    root: NodeId,
    camera: Camera,
    events: EventQueue,
    pager: DatabasePager,
    scheduler: FrameScheduler,
    clock: FrameClock,
    config: EngineConfig,
    cull_mask: NodeMask,
    update_mask: NodeMask,
}

impl Engine {
    /// Create an engine with the built-in reader registry
    pub fn new(config: EngineConfig, device: Box<dyn RenderDevice>) -> Result<Self, EngineError> {
        Self::with_readers(config, device, ReaderRegistry::with_builtin_readers())
    }

    /// Create an engine with an application-supplied reader registry
    pub fn with_readers(
        config: EngineConfig,
        device: Box<dyn RenderDevice>,
        readers: ReaderRegistry,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        log::info!(
            "initializing engine ({:?}, {} reader(s))",
            config.threading,
            readers.len()
        );

        let mut scene = Scene::new();
        let root = scene.create_group();
        scene.set_name(root, "root")?;

        let pager = DatabasePager::new(Arc::new(readers), &config.pager);
        let scheduler =
            FrameScheduler::new(config.threading, GraphicsContext::new(device));

        Ok(Self {
            scene,
            root,
            camera: Camera::new(Mat4::identity(), Mat4::identity()),
            events: EventQueue::new(),
            pager,
            scheduler,
            clock: FrameClock::new(),
            config,
            cull_mask: NodeMask::ALL,
            update_mask: NodeMask::ALL,
        })
    }

    /// The scene graph
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The scene graph, mutable
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// The root group every frame starts from
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The active camera
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Replace the active camera
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    /// The event queue, for windowing glue and handler registration
    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// Restrict which nodes the cull traversal enters
    pub fn set_cull_mask(&mut self, mask: NodeMask) {
        self.cull_mask = mask;
    }

    /// Restrict which nodes the update traversal enters
    pub fn set_update_mask(&mut self, mask: NodeMask) {
        self.update_mask = mask;
    }

    /// Queue a background load under a placeholder node
    pub fn request_page(&mut self, placeholder: NodeId) -> Result<(), EngineError> {
        self.pager.request_from_node(&self.scene, placeholder)?;
        Ok(())
    }

    /// Loads requested but not yet merged
    pub fn pending_pages(&self) -> usize {
        self.pager.pending_count()
    }

    /// Run one frame: events, page merge, update, cull, draw
    pub fn frame(&mut self) -> Result<FrameReport, EngineError> {
        let stamp = self.clock.tick();

        // event phase: the queue drains exactly once per frame
        let unconsumed = self.events.dispatch_frame(&mut self.scene);
        for event in &unconsumed {
            deliver_event(&mut self.scene, self.root, event, self.update_mask);
        }

        // paged subgraphs enter the scene only here, between frames
        let merged_subgraphs = self.pager.merge_with(&mut self.scene);

        // update phase
        run_update(&mut self.scene, self.root, &stamp, self.update_mask);
        self.scene.compute_bounds(self.root);

        // cull phase
        let mut queue = self.scheduler.acquire_queue()?;
        queue.reset();
        CullVisitor::new(&self.camera, &self.config.cull, &mut queue)
            .with_mask(self.cull_mask)
            .run(&self.scene, self.root);
        let leaves = queue.leaf_count();

        // draw phase (inline or pipelined per the threading model)
        let draw = self.scheduler.dispatch(queue)?;

        Ok(FrameReport {
            stamp,
            merged_subgraphs,
            leaves,
            draw,
        })
    }

    /// Run a fixed number of frames, then wait for in-flight draws
    pub fn run_frames(&mut self, count: usize) -> Result<(), EngineError> {
        for _ in 0..count {
            self.frame()?;
        }
        self.scheduler.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{perspective, Point3, Vec3};
    use crate::graph::box_drawable;
    use crate::render::RecordingDevice;

    fn engine_with_box() -> (Engine, std::sync::Arc<std::sync::Mutex<crate::render::CommandLog>>)
    {
        let (device, log) = RecordingDevice::new();
        let mut engine = Engine::new(EngineConfig::default(), Box::new(device)).unwrap();
        engine.set_camera(Camera::from_look_at(
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            perspective(1.0, std::f32::consts::FRAC_PI_2, 0.1, 1000.0),
        ));
        let root = engine.root();
        let geode = engine.scene_mut().create_geode();
        engine
            .scene_mut()
            .add_drawable(geode, Arc::new(box_drawable(Vec3::new(10.0, 0.0, 0.0), 1.0)))
            .unwrap();
        engine.scene_mut().add_child(root, geode).unwrap();
        (engine, log)
    }

    #[test]
    fn test_frame_draws_visible_geometry() {
        let (mut engine, log) = engine_with_box();
        let report = engine.frame().unwrap();
        assert_eq!(report.leaves, 1);
        assert_eq!(report.draw.map(|d| d.leaves), Some(1));
        assert_eq!(log.lock().unwrap().draws(), 1);
    }

    #[test]
    fn test_frame_numbers_advance() {
        let (mut engine, _log) = engine_with_box();
        let first = engine.frame().unwrap();
        let second = engine.frame().unwrap();
        assert_eq!(first.stamp.frame_number + 1, second.stamp.frame_number);
    }

    #[test]
    fn test_threaded_engine_runs_frames() {
        let (device, log) = RecordingDevice::new();
        let config = EngineConfig {
            threading: crate::config::ThreadingModel::DrawThreaded,
            ..Default::default()
        };
        let mut engine = Engine::new(config, Box::new(device)).unwrap();
        engine.set_camera(Camera::from_look_at(
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            perspective(1.0, std::f32::consts::FRAC_PI_2, 0.1, 1000.0),
        ));
        let root = engine.root();
        let geode = engine.scene_mut().create_geode();
        engine
            .scene_mut()
            .add_drawable(geode, Arc::new(box_drawable(Vec3::new(10.0, 0.0, 0.0), 1.0)))
            .unwrap();
        engine.scene_mut().add_child(root, geode).unwrap();

        engine.run_frames(3).unwrap();
        assert_eq!(log.lock().unwrap().draws(), 3);
    }
}
