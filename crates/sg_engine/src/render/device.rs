//! Graphics device abstraction
//!
//! The replay phase talks to the driver through [`RenderDevice`], a small
//! trait covering exactly what the sorted draw structure needs: toggle a
//! mode, realize an attribute, load a model-view matrix, issue a draw.
//! A [`GraphicsContext`] pairs one device with its capability table and the
//! context-local applied-state cache; one context exists per hardware
//! context, passed by reference through the draw path, and nothing about it
//! is process-global.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::foundation::math::Mat4;
use crate::graph::Drawable;
use crate::state::{AttributeKind, Mode, StateAttribute};

use super::applied::AppliedState;

/// Errors reported by a device
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device cannot realize the requested state
    #[error("unsupported by device: {0}")]
    Unsupported(String),

    /// A draw call failed at the driver level
    #[error("draw call failed: {0}")]
    DrawFailed(String),
}

/// The minimal driver surface replay emits into
pub trait RenderDevice: Send {
    /// Enable or disable a mode
    fn apply_mode(&mut self, mode: Mode, enabled: bool);

    /// Realize an attribute's parameters
    ///
    /// May fail with [`DeviceError::Unsupported`]; the caller degrades to
    /// skipping the attribute rather than aborting the frame.
    fn apply_attribute(&mut self, attribute: &StateAttribute) -> Result<(), DeviceError>;

    /// Load the model-view matrix for subsequent draws
    fn load_model_view(&mut self, matrix: &Mat4);

    /// Draw one drawable with the current state and matrix
    fn draw(&mut self, drawable: &Drawable) -> Result<(), DeviceError>;
}

/// What the attached device can realize
///
/// Checked before attribute application so unsupported state degrades to a
/// logged no-op instead of a device error mid-replay.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    /// Non-fill polygon modes are available
    pub polygon_modes: bool,
    /// Line widths other than 1.0 are available
    pub wide_lines: bool,
    /// Texture binding is available
    pub texturing: bool,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self {
            polygon_modes: true,
            wide_lines: true,
            texturing: true,
        }
    }
}

impl CapabilityTable {
    /// Whether an attribute of this kind can be realized
    pub fn supports(&self, kind: AttributeKind) -> bool {
        match kind {
            AttributeKind::PolygonMode => self.polygon_modes,
            AttributeKind::LineWidth => self.wide_lines,
            AttributeKind::TextureBinding => self.texturing,
            _ => true,
        }
    }
}

/// One hardware context: device, capabilities, and applied-state cache
///
/// The cache assumes it is the only writer of the device's state, which
/// holds as long as each hardware context has exactly one `GraphicsContext`
/// and replay for it runs on one thread at a time. Multiple windows or GPUs
/// get independent contexts and independent replay passes.
pub struct GraphicsContext {
    pub(crate) capabilities: CapabilityTable,
    pub(crate) device: Box<dyn RenderDevice>,
    pub(crate) applied: AppliedState,
}

impl GraphicsContext {
    /// Wrap a device with default capabilities
    pub fn new(device: Box<dyn RenderDevice>) -> Self {
        Self::with_capabilities(device, CapabilityTable::default())
    }

    /// Wrap a device with an explicit capability table
    pub fn with_capabilities(device: Box<dyn RenderDevice>, capabilities: CapabilityTable) -> Self {
        Self {
            capabilities,
            device,
            applied: AppliedState::new(),
        }
    }

    /// The capability table
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }
}

/// One emitted driver command, for inspection in tests and headless runs
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Mode toggled
    Mode(Mode, bool),
    /// Attribute realized
    Attribute(AttributeKind),
    /// Model-view matrix loaded
    ModelView,
    /// Drawable drawn, with its name if it had one
    Draw(Option<String>),
}

/// Command stream captured by a [`RecordingDevice`]
#[derive(Debug, Default)]
pub struct CommandLog {
    /// Every command in emission order
    pub commands: Vec<DrawCommand>,
}

impl CommandLog {
    /// Count of attribute applications
    pub fn attribute_applies(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Attribute(_)))
            .count()
    }

    /// Count of mode toggles
    pub fn mode_applies(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Mode(..)))
            .count()
    }

    /// Count of draw calls
    pub fn draws(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Draw(_)))
            .count()
    }

    /// Commands strictly between draw call `i` and draw call `i + 1`
    pub fn between_draws(&self, i: usize) -> &[DrawCommand] {
        let draws: Vec<usize> = self
            .commands
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, DrawCommand::Draw(_)))
            .map(|(index, _)| index)
            .collect();
        match (draws.get(i), draws.get(i + 1)) {
            (Some(a), Some(b)) => &self.commands[a + 1..*b],
            _ => &[],
        }
    }
}

/// Device that records its command stream instead of driving hardware
///
/// The log is shared through an `Arc` so a test can keep reading it after
/// the device moves into a context on the draw thread.
pub struct RecordingDevice {
    log: Arc<Mutex<CommandLog>>,
    /// Drawable names whose draw call should fail, for error-path tests
    pub fail_draws_named: Vec<String>,
}

impl RecordingDevice {
    /// Create a device and the shared handle to its log
    pub fn new() -> (Self, Arc<Mutex<CommandLog>>) {
        let log = Arc::new(Mutex::new(CommandLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                fail_draws_named: Vec::new(),
            },
            log,
        )
    }

    fn record(&self, command: DrawCommand) {
        if let Ok(mut log) = self.log.lock() {
            log.commands.push(command);
        }
    }
}

impl RenderDevice for RecordingDevice {
    fn apply_mode(&mut self, mode: Mode, enabled: bool) {
        self.record(DrawCommand::Mode(mode, enabled));
    }

    fn apply_attribute(&mut self, attribute: &StateAttribute) -> Result<(), DeviceError> {
        self.record(DrawCommand::Attribute(attribute.kind()));
        Ok(())
    }

    fn load_model_view(&mut self, _matrix: &Mat4) {
        self.record(DrawCommand::ModelView);
    }

    fn draw(&mut self, drawable: &Drawable) -> Result<(), DeviceError> {
        let name = drawable.name().map(str::to_owned);
        if let Some(n) = &name {
            if self.fail_draws_named.iter().any(|f| f == n) {
                return Err(DeviceError::DrawFailed(format!("injected failure for {n}")));
            }
        }
        self.record(DrawCommand::Draw(name));
        Ok(())
    }
}
