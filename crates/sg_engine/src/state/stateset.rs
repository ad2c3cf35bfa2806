//! State sets attached to nodes and drawables

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use bitflags::bitflags;

use super::attribute::{has_nan, AttributeKind, StateAttribute};

bitflags! {
    /// Modifiers on a mode or attribute entry
    ///
    /// An entry without `ON` represents an explicit OFF; a mode absent from
    /// the map entirely is inherited from the ancestor state (INHERIT).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateFlags: u8 {
        /// Enable the mode
        const ON = 0b001;
        /// Force this value onto descendants that do not set PROTECTED
        const OVERRIDE = 0b010;
        /// Resist an ancestor's OVERRIDE
        const PROTECTED = 0b100;
    }
}

impl StateFlags {
    /// Plain enabled entry
    pub fn on() -> Self {
        Self::ON
    }

    /// Plain disabled entry
    pub fn off() -> Self {
        Self::empty()
    }
}

/// GL-style capability toggled by a state set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    /// Fixed-function lighting
    Lighting,
    /// Alpha blending
    Blend,
    /// Depth testing
    DepthTest,
    /// Face culling
    CullFace,
    /// Fog
    Fog,
    /// Automatic normal renormalization
    Normalize,
    /// 2D texturing
    Texture2D,
}

/// Ordering policy a bin applies to its leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOrder {
    /// Group by state-graph node; draw order minimizes state changes
    StateSorted,
    /// Sort by leaf depth, farthest first (transparency)
    DepthSorted,
}

/// Render-bin placement requested by a state set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinDetails {
    /// Use the bin active where this set is pushed
    Inherit,
    /// Redirect drawables under this set into the numbered bin
    Use {
        /// Bin number; negative bins draw before the default bin
        number: i32,
        /// Ordering policy for the bin
        order: BinOrder,
    },
}

/// Convenience presets for common bin placements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingHint {
    /// Inherit bin placement
    Default,
    /// Opaque geometry: bin 0, state sorted
    Opaque,
    /// Transparent geometry: bin 10, depth sorted back to front
    Transparent,
}

/// Bin number used by the [`RenderingHint::Transparent`] preset
pub(crate) const TRANSPARENT_BIN_NUMBER: i32 = 10;

/// An attribute plus its inheritance modifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeEntry {
    /// The attribute value
    pub attribute: StateAttribute,
    /// OVERRIDE/PROTECTED modifiers (the ON bit is ignored for attributes)
    pub flags: StateFlags,
}

/// A set of modes and attributes shared by reference across the graph
///
/// Many nodes typically point at one `StateSet` through an `Arc`. Equality
/// and hashing are by value, so two separately-built sets with the same
/// contents are interchangeable for state grouping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateSet {
    modes: BTreeMap<Mode, StateFlags>,
    attributes: BTreeMap<AttributeKind, AttributeEntry>,
    render_bin: BinDetails,
}

impl Default for BinDetails {
    fn default() -> Self {
        Self::Inherit
    }
}

impl StateSet {
    /// Create an empty state set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a mode entry
    pub fn set_mode(&mut self, mode: Mode, flags: StateFlags) -> &mut Self {
        self.modes.insert(mode, flags);
        self
    }

    /// Remove a mode entry, returning it to inherited
    pub fn remove_mode(&mut self, mode: Mode) -> &mut Self {
        self.modes.remove(&mode);
        self
    }

    /// Set an attribute with default (empty) modifiers
    ///
    /// Attributes with NaN parameters are rejected: they would break the
    /// value-identity contract state grouping relies on.
    pub fn set_attribute(&mut self, attribute: StateAttribute) -> &mut Self {
        self.set_attribute_with_flags(attribute, StateFlags::empty())
    }

    /// Set an attribute with explicit OVERRIDE/PROTECTED modifiers
    pub fn set_attribute_with_flags(
        &mut self,
        attribute: StateAttribute,
        flags: StateFlags,
    ) -> &mut Self {
        if has_nan(&attribute) {
            log::warn!(
                "discarding state attribute {:?} with NaN parameter",
                attribute.kind()
            );
            return self;
        }
        self.attributes
            .insert(attribute.kind(), AttributeEntry { attribute, flags });
        self
    }

    /// Remove an attribute entry
    pub fn remove_attribute(&mut self, kind: AttributeKind) -> &mut Self {
        self.attributes.remove(&kind);
        self
    }

    /// Request explicit render-bin placement
    pub fn set_render_bin_details(&mut self, number: i32, order: BinOrder) -> &mut Self {
        self.render_bin = BinDetails::Use { number, order };
        self
    }

    /// Apply a bin-placement preset
    pub fn set_rendering_hint(&mut self, hint: RenderingHint) -> &mut Self {
        self.render_bin = match hint {
            RenderingHint::Default => BinDetails::Inherit,
            RenderingHint::Opaque => BinDetails::Use {
                number: 0,
                order: BinOrder::StateSorted,
            },
            RenderingHint::Transparent => BinDetails::Use {
                number: TRANSPARENT_BIN_NUMBER,
                order: BinOrder::DepthSorted,
            },
        };
        self
    }

    /// Mode entries in deterministic order
    pub fn modes(&self) -> impl Iterator<Item = (&Mode, &StateFlags)> {
        self.modes.iter()
    }

    /// Attribute entries in deterministic order
    pub fn attributes(&self) -> impl Iterator<Item = (&AttributeKind, &AttributeEntry)> {
        self.attributes.iter()
    }

    /// Look up a mode entry
    pub fn mode(&self, mode: Mode) -> Option<StateFlags> {
        self.modes.get(&mode).copied()
    }

    /// Look up an attribute entry
    pub fn attribute(&self, kind: AttributeKind) -> Option<&AttributeEntry> {
        self.attributes.get(&kind)
    }

    /// Requested bin placement
    pub fn render_bin(&self) -> BinDetails {
        self.render_bin
    }

    /// True when the set carries no modes, attributes, or bin request
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
            && self.attributes.is_empty()
            && self.render_bin == BinDetails::Inherit
    }
}

impl Hash for StateSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // BTreeMap iteration order is deterministic, so entry-wise hashing is
        // stable across equal sets.
        state.write_usize(self.modes.len());
        for (mode, flags) in &self.modes {
            mode.hash(state);
            flags.hash(state);
        }
        state.write_usize(self.attributes.len());
        for (kind, entry) in &self.attributes {
            kind.hash(state);
            entry.hash(state);
        }
        self.render_bin.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Material;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(set: &StateSet) -> u64 {
        let mut h = DefaultHasher::new();
        set.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_value_equality_across_allocations() {
        let mut a = StateSet::new();
        a.set_mode(Mode::Lighting, StateFlags::on())
            .set_attribute(StateAttribute::Material(Material::default()));

        let mut b = StateSet::new();
        b.set_attribute(StateAttribute::Material(Material::default()))
            .set_mode(Mode::Lighting, StateFlags::on());

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_attribute_replaces_same_kind() {
        let mut set = StateSet::new();
        set.set_attribute(StateAttribute::LineWidth(1.0));
        set.set_attribute(StateAttribute::LineWidth(3.0));
        assert_eq!(
            set.attribute(AttributeKind::LineWidth).map(|e| &e.attribute),
            Some(&StateAttribute::LineWidth(3.0))
        );
    }

    #[test]
    fn test_nan_attribute_rejected() {
        let mut set = StateSet::new();
        set.set_attribute(StateAttribute::LineWidth(f32::NAN));
        assert!(set.attribute(AttributeKind::LineWidth).is_none());
    }

    #[test]
    fn test_transparent_hint_sets_depth_sorted_bin() {
        let mut set = StateSet::new();
        set.set_rendering_hint(RenderingHint::Transparent);
        assert_eq!(
            set.render_bin(),
            BinDetails::Use {
                number: TRANSPARENT_BIN_NUMBER,
                order: BinOrder::DepthSorted,
            }
        );
    }
}
