//! # sg_engine
//!
//! A retained-mode 3D scene graph engine with state-sorted rendering.
//!
//! ## Features
//!
//! - **Scene Graph**: reference-counted DAG of groups, transforms, LOD and
//!   switch selectors, and geometry leaves, with cached bounding volumes
//! - **Visitor Traversal**: double-dispatch traversal with engine-managed
//!   matrix and state stacks
//! - **Cull**: frustum rejection, LOD selection, and depth computation
//!   producing a state-grouped, bin-ordered draw structure
//! - **State-Sorted Replay**: minimal driver state changes via lowest
//!   common ancestor walks over the per-frame state graph
//! - **Pipelined Frames**: single-threaded or draw-threaded scheduling
//!   behind one interface
//! - **Paging**: background subgraph loading with frame-boundary commits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sg_engine::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (device, _log) = RecordingDevice::new();
//!     let mut engine = Engine::new(EngineConfig::default(), Box::new(device))?;
//!
//!     let root = engine.root();
//!     let geode = engine.scene_mut().create_geode();
//!     engine
//!         .scene_mut()
//!         .add_drawable(geode, Arc::new(box_drawable(Vec3::new(0.0, 0.0, -10.0), 1.0)))?;
//!     engine.scene_mut().add_child(root, geode)?;
//!
//!     engine.run_frames(60)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod cull;
pub mod events;
pub mod foundation;
pub mod frame;
pub mod graph;
pub mod io;
pub mod pager;
pub mod render;
pub mod state;
pub mod technique;
pub mod visitor;

mod engine;

pub use engine::{Engine, EngineError, FrameReport};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{CullConfig, EngineConfig, PagerConfig, ThreadingModel},
        cull::{Camera, CullVisitor},
        events::{Event, EventHandler, EventKind, EventQueue},
        foundation::math::{Mat4, Point3, Quat, Vec3},
        foundation::time::FrameStamp,
        graph::{
            box_drawable, Drawable, LodRange, NodeId, NodeMask, PrimitiveMode, Scene,
            TransformSpec,
        },
        io::{ReaderRegistry, SceneReader},
        render::{draw_queue, GraphicsContext, RecordingDevice, RenderDevice, RenderQueue},
        state::{Material, Mode, RenderingHint, StateAttribute, StateFlags, StateSet},
        Engine, EngineError, FrameReport,
    };
}
