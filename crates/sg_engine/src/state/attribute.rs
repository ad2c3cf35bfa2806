//! Typed rendering attributes
//!
//! Each attribute carries the full parameter set a driver needs to realize it.
//! Attributes compare and hash by value; float fields hash through their bit
//! patterns so that equal parameters always land in the same state bucket.

use std::hash::{Hash, Hasher};

/// Discriminant identifying an attribute slot
///
/// A [`StateSet`](super::StateSet) holds at most one attribute per kind;
/// setting a second replaces the first, mirroring how a driver has a single
/// current value per state category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKind {
    /// Surface material parameters
    Material,
    /// Blend function factors
    BlendFunc,
    /// Depth test function and write mask
    Depth,
    /// Face culling mode
    CullFace,
    /// Polygon rasterization mode
    PolygonMode,
    /// Line rasterization width
    LineWidth,
    /// Bound texture object
    TextureBinding,
}

/// Blend equation factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// Factor of zero
    Zero,
    /// Factor of one
    One,
    /// Source alpha
    SrcAlpha,
    /// One minus source alpha
    OneMinusSrcAlpha,
}

/// Depth comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    /// Never passes
    Never,
    /// Passes when incoming depth is less
    Less,
    /// Passes when incoming depth is less or equal
    LessEqual,
    /// Always passes
    Always,
}

/// Which faces to cull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFaceMode {
    /// Cull front faces
    Front,
    /// Cull back faces
    Back,
    /// Cull both faces
    FrontAndBack,
}

/// Polygon rasterization fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonFill {
    /// Filled polygons
    Fill,
    /// Outlined polygons
    Line,
    /// Vertex points only
    Point,
}

/// Surface material parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Ambient reflectance RGBA
    pub ambient: [f32; 4],
    /// Diffuse reflectance RGBA
    pub diffuse: [f32; 4],
    /// Specular reflectance RGBA
    pub specular: [f32; 4],
    /// Specular exponent
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: [0.2, 0.2, 0.2, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.0, 0.0, 0.0, 1.0],
            shininess: 0.0,
        }
    }
}

impl Material {
    /// Create a material from a diffuse color with default ambient/specular
    pub fn from_diffuse(diffuse: [f32; 4]) -> Self {
        Self {
            diffuse,
            ..Default::default()
        }
    }
}

/// A rendering attribute value
///
/// Closed set of attribute types; plug-in techniques that need driver state
/// outside this set manage it themselves inside their draw implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum StateAttribute {
    /// Surface material
    Material(Material),
    /// Blend function
    BlendFunc {
        /// Source factor
        src: BlendFactor,
        /// Destination factor
        dst: BlendFactor,
    },
    /// Depth test
    Depth {
        /// Comparison function
        function: CompareFunc,
        /// Whether depth writes are enabled
        write: bool,
    },
    /// Face culling
    CullFace(CullFaceMode),
    /// Polygon mode
    PolygonMode(PolygonFill),
    /// Line width in pixels
    LineWidth(f32),
    /// Opaque handle to a texture object owned by the application
    TextureBinding(u64),
}

impl StateAttribute {
    /// The slot this attribute occupies in a state set
    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::Material(_) => AttributeKind::Material,
            Self::BlendFunc { .. } => AttributeKind::BlendFunc,
            Self::Depth { .. } => AttributeKind::Depth,
            Self::CullFace(_) => AttributeKind::CullFace,
            Self::PolygonMode(_) => AttributeKind::PolygonMode,
            Self::LineWidth(_) => AttributeKind::LineWidth,
            Self::TextureBinding(_) => AttributeKind::TextureBinding,
        }
    }
}

// Attributes are value-identity keys for state grouping. Floats hash by bit
// pattern; NaN parameters are rejected at the StateSet API boundary.
impl Eq for StateAttribute {}

fn hash_f32<H: Hasher>(state: &mut H, v: f32) {
    state.write_u32(v.to_bits());
}

fn hash_f32x4<H: Hasher>(state: &mut H, v: &[f32; 4]) {
    for c in v {
        hash_f32(state, *c);
    }
}

impl Hash for StateAttribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Self::Material(m) => {
                hash_f32x4(state, &m.ambient);
                hash_f32x4(state, &m.diffuse);
                hash_f32x4(state, &m.specular);
                hash_f32(state, m.shininess);
            }
            Self::BlendFunc { src, dst } => {
                src.hash(state);
                dst.hash(state);
            }
            Self::Depth { function, write } => {
                function.hash(state);
                write.hash(state);
            }
            Self::CullFace(mode) => mode.hash(state),
            Self::PolygonMode(fill) => fill.hash(state),
            Self::LineWidth(w) => hash_f32(state, *w),
            Self::TextureBinding(id) => id.hash(state),
        }
    }
}

/// True when any float parameter of the attribute is NaN
pub(crate) fn has_nan(attribute: &StateAttribute) -> bool {
    match attribute {
        StateAttribute::Material(m) => m
            .ambient
            .iter()
            .chain(&m.diffuse)
            .chain(&m.specular)
            .chain(std::iter::once(&m.shininess))
            .any(|v| v.is_nan()),
        StateAttribute::LineWidth(w) => w.is_nan(),
        _ => false,
    }
}
