//! State-sorted rendering
//!
//! The cull traversal populates a [`RenderQueue`]: a per-frame state graph
//! grouping leaves by identical merged state, partitioned into numbered
//! render bins that fix coarse draw order. [`draw_queue`] then replays the
//! sorted structure against a [`GraphicsContext`], diffing consecutive
//! leaves through their lowest common state ancestor so the device sees the
//! minimum state traffic the ordering allows.

mod applied;
mod device;
mod draw;
mod queue;
mod state_graph;

pub use device::{
    CapabilityTable, CommandLog, DeviceError, DrawCommand, GraphicsContext, RecordingDevice,
    RenderDevice,
};
pub use draw::{draw_queue, DrawStats, RenderError};
pub use queue::{BinId, RenderQueue, SortMode, ROOT_BIN};
pub use state_graph::{LeafId, RenderLeaf, StateGraphArena, StateGraphId, STATE_GRAPH_ROOT};
