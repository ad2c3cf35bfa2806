//! Format plugin contract and reader registry
//!
//! Concrete format translators live outside the engine; they plug in through
//! [`SceneReader`]: given a byte source, produce a node prototype, report the
//! source as not-handled, or fail. The [`ReaderRegistry`] tries registered
//! readers in registration order against the file's extension and accepts
//! the first success.
//!
//! Readers run on pager worker threads, so they build [`NodePrototype`]
//! trees (plain data, no scene access); the frame loop instantiates the
//! prototype into the scene at the merge boundary.

mod ascii;

pub use ascii::PointCloudReader;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::foundation::math::Mat4;
use crate::graph::{Drawable, NodeId, Scene, TransformSpec};
use crate::state::StateSet;

/// Errors from reading a scene source
#[derive(Debug, Error)]
pub enum ReadError {
    /// The byte source could not be read
    #[error("failed to read source: {0}")]
    Io(#[from] std::io::Error),

    /// No registered reader matches the source's extension
    #[error("no reader registered for extension \"{extension}\"")]
    NoReader {
        /// The unmatched extension
        extension: String,
    },

    /// Every matching reader declined the source
    #[error("no reader accepted \"{path}\"")]
    Unhandled {
        /// The declined source path
        path: String,
    },

    /// A reader matched but the data is malformed
    #[error("malformed source: {reason}")]
    Malformed {
        /// What was wrong
        reason: String,
    },
}

/// Options passed through to readers
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Directories readers may search for referenced sub-files
    pub search_paths: Vec<PathBuf>,
}

/// A reader's verdict on a byte source
#[derive(Debug)]
pub enum ReadOutcome {
    /// Successfully translated
    Node(NodePrototype),
    /// The source is not this reader's format; try the next one
    NotHandled,
}

/// A pluggable format translator
pub trait SceneReader: Send + Sync {
    /// Diagnostic name
    fn name(&self) -> &str;

    /// Whether this reader wants sources with the given extension
    fn supports_extension(&self, extension: &str) -> bool;

    /// Translate a byte source into a node prototype
    fn try_read(&self, bytes: &[u8], options: &ReadOptions) -> Result<ReadOutcome, ReadError>;
}

/// Scene structure built off-thread, instantiated at a frame boundary
#[derive(Debug, Clone)]
pub struct NodePrototype {
    /// Optional node name
    pub name: Option<String>,
    /// Optional state set
    pub state_set: Option<Arc<StateSet>>,
    /// Structure payload
    pub kind: PrototypeKind,
}

/// Kind payload of a prototype node
#[derive(Debug, Clone)]
pub enum PrototypeKind {
    /// Plain composite
    Group(Vec<NodePrototype>),
    /// Matrix transform
    Transform {
        /// Local-to-parent matrix
        matrix: Mat4,
        /// Children
        children: Vec<NodePrototype>,
    },
    /// Geometry holder
    Geode(Vec<Arc<Drawable>>),
}

impl NodePrototype {
    /// Prototype group with children
    pub fn group(children: Vec<NodePrototype>) -> Self {
        Self {
            name: None,
            state_set: None,
            kind: PrototypeKind::Group(children),
        }
    }

    /// Prototype geode with drawables
    pub fn geode(drawables: Vec<Arc<Drawable>>) -> Self {
        Self {
            name: None,
            state_set: None,
            kind: PrototypeKind::Geode(drawables),
        }
    }
}

/// Build the prototype's structure inside a scene, returning its root
pub fn instantiate(scene: &mut Scene, prototype: &NodePrototype) -> NodeId {
    let id = match &prototype.kind {
        PrototypeKind::Group(children) => {
            let id = scene.create_group();
            for child in children {
                let child_id = instantiate(scene, child);
                if let Err(err) = scene.add_child(id, child_id) {
                    log::error!("failed to attach instantiated child: {err}");
                }
            }
            id
        }
        PrototypeKind::Transform { matrix, children } => {
            let id = scene.create_transform(TransformSpec::Matrix(*matrix));
            for child in children {
                let child_id = instantiate(scene, child);
                if let Err(err) = scene.add_child(id, child_id) {
                    log::error!("failed to attach instantiated child: {err}");
                }
            }
            id
        }
        PrototypeKind::Geode(drawables) => {
            let id = scene.create_geode();
            for drawable in drawables {
                if let Err(err) = scene.add_drawable(id, Arc::clone(drawable)) {
                    log::error!("failed to attach instantiated drawable: {err}");
                }
            }
            id
        }
    };
    if let Some(name) = &prototype.name {
        let _ = scene.set_name(id, name.clone());
    }
    if let Some(set) = &prototype.state_set {
        let _ = scene.set_state_set(id, Some(Arc::clone(set)));
    }
    id
}

/// Ordered collection of registered readers
#[derive(Default)]
pub struct ReaderRegistry {
    readers: Vec<Box<dyn SceneReader>>,
}

impl ReaderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the engine's built-in readers
    pub fn with_builtin_readers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PointCloudReader));
        registry
    }

    /// Append a reader; earlier registrations are tried first
    pub fn register(&mut self, reader: Box<dyn SceneReader>) {
        log::debug!("registered scene reader \"{}\"", reader.name());
        self.readers.push(reader);
    }

    /// Number of registered readers
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// True when no readers are registered
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Read a node prototype from a file
    ///
    /// Readers whose extension filter matches are tried in registration
    /// order; the first to return a node wins. A reader reporting
    /// `NotHandled` passes the source along; a hard error stops the search.
    pub fn read_node(&self, path: &Path) -> Result<NodePrototype, ReadError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !self.readers.iter().any(|r| r.supports_extension(&extension)) {
            return Err(ReadError::NoReader { extension });
        }
        let bytes = std::fs::read(path)?;
        let options = ReadOptions {
            search_paths: path
                .parent()
                .map(|p| vec![p.to_path_buf()])
                .unwrap_or_default(),
        };
        self.read_node_from_bytes(&bytes, &extension, &options)
            .and_then(|outcome| match outcome {
                Some(node) => Ok(node),
                None => Err(ReadError::Unhandled {
                    path: path.display().to_string(),
                }),
            })
    }

    /// Read a node prototype from bytes with an extension hint
    pub fn read_node_from_bytes(
        &self,
        bytes: &[u8],
        extension: &str,
        options: &ReadOptions,
    ) -> Result<Option<NodePrototype>, ReadError> {
        for reader in &self.readers {
            if !reader.supports_extension(extension) {
                continue;
            }
            match reader.try_read(bytes, options)? {
                ReadOutcome::Node(node) => return Ok(Some(node)),
                ReadOutcome::NotHandled => continue,
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::graph::box_drawable;

    struct DeclinedReader;

    impl SceneReader for DeclinedReader {
        fn name(&self) -> &str {
            "declined"
        }
        fn supports_extension(&self, extension: &str) -> bool {
            extension == "blob"
        }
        fn try_read(&self, _: &[u8], _: &ReadOptions) -> Result<ReadOutcome, ReadError> {
            Ok(ReadOutcome::NotHandled)
        }
    }

    struct BoxReader;

    impl SceneReader for BoxReader {
        fn name(&self) -> &str {
            "box"
        }
        fn supports_extension(&self, extension: &str) -> bool {
            extension == "blob"
        }
        fn try_read(&self, _: &[u8], _: &ReadOptions) -> Result<ReadOutcome, ReadError> {
            Ok(ReadOutcome::Node(NodePrototype::geode(vec![Arc::new(
                box_drawable(Vec3::zeros(), 1.0),
            )])))
        }
    }

    #[test]
    fn test_registration_order_first_success() {
        let mut registry = ReaderRegistry::new();
        registry.register(Box::new(DeclinedReader));
        registry.register(Box::new(BoxReader));

        let node = registry
            .read_node_from_bytes(b"whatever", "blob", &ReadOptions::default())
            .unwrap();
        assert!(node.is_some());
    }

    #[test]
    fn test_extension_mismatch_yields_no_reader() {
        let registry = ReaderRegistry::with_builtin_readers();
        let err = registry.read_node(Path::new("model.unknown")).unwrap_err();
        assert!(matches!(err, ReadError::NoReader { .. }));
    }

    #[test]
    fn test_instantiate_builds_structure() {
        let mut scene = Scene::new();
        let prototype = NodePrototype {
            name: Some("loaded".into()),
            state_set: None,
            kind: PrototypeKind::Transform {
                matrix: Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)),
                children: vec![NodePrototype::geode(vec![Arc::new(box_drawable(
                    Vec3::zeros(),
                    1.0,
                ))])],
            },
        };
        let id = instantiate(&mut scene, &prototype);
        assert_eq!(scene.node(id).unwrap().name(), Some("loaded"));
        assert_eq!(scene.node(id).unwrap().children().len(), 1);
        assert!(scene.bound(id).valid());
    }
}
