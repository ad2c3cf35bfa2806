//! Accumulation of a state-set stack into effective leaf state

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use super::attribute::{AttributeKind, StateAttribute};
use super::stateset::{AttributeEntry, BinDetails, Mode, StateFlags, StateSet};

/// Effective state at a point in the graph
///
/// Built by pushing state sets in ancestor-to-descendant order. An entry set
/// with OVERRIDE on an ancestor suppresses any descendant entry for the same
/// mode/attribute unless the descendant marked it PROTECTED; PROTECTED wins
/// against OVERRIDE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergedState {
    modes: BTreeMap<Mode, StateFlags>,
    attributes: BTreeMap<AttributeKind, AttributeEntry>,
    bin: BinDetails,
}

impl MergedState {
    /// Empty (all-inherit) state
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate the sets of a stack, outermost first
    pub fn from_stack<'a, I>(stack: I) -> Self
    where
        I: IntoIterator<Item = &'a StateSet>,
    {
        let mut merged = Self::new();
        for set in stack {
            merged.push(set);
        }
        merged
    }

    /// Accumulate one more (deeper) state set
    pub fn push(&mut self, set: &StateSet) {
        for (mode, flags) in set.modes() {
            match self.modes.get(mode) {
                Some(existing)
                    if existing.contains(StateFlags::OVERRIDE)
                        && !flags.contains(StateFlags::PROTECTED) => {}
                _ => {
                    self.modes.insert(*mode, *flags);
                }
            }
        }
        for (kind, entry) in set.attributes() {
            match self.attributes.get(kind) {
                Some(existing)
                    if existing.flags.contains(StateFlags::OVERRIDE)
                        && !entry.flags.contains(StateFlags::PROTECTED) => {}
                _ => {
                    self.attributes.insert(*kind, entry.clone());
                }
            }
        }
        if let BinDetails::Use { .. } = set.render_bin() {
            self.bin = set.render_bin();
        }
    }

    /// Whether a mode is effectively enabled
    pub fn mode_enabled(&self, mode: Mode) -> bool {
        self.modes
            .get(&mode)
            .is_some_and(|flags| flags.contains(StateFlags::ON))
    }

    /// Effective attribute for a slot, if any set in the stack provided one
    pub fn attribute(&self, kind: AttributeKind) -> Option<&StateAttribute> {
        self.attributes.get(&kind).map(|entry| &entry.attribute)
    }

    /// Effective bin placement
    pub fn bin(&self) -> BinDetails {
        self.bin
    }

    /// Mode entries in deterministic order
    pub fn modes(&self) -> impl Iterator<Item = (&Mode, &StateFlags)> {
        self.modes.iter()
    }

    /// Attribute entries in deterministic order
    pub fn attributes(&self) -> impl Iterator<Item = (&AttributeKind, &AttributeEntry)> {
        self.attributes.iter()
    }
}

impl Hash for MergedState {
    fn hash<H: Hasher>(&self, state: &mut H) {
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
        self.bin.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BinOrder, Material, RenderingHint};

    fn material(diffuse: [f32; 4]) -> StateAttribute {
        StateAttribute::Material(Material::from_diffuse(diffuse))
    }

    #[test]
    fn test_descendant_replaces_plain_ancestor() {
        let mut parent = StateSet::new();
        parent.set_attribute(material([1.0, 0.0, 0.0, 1.0]));
        let mut child = StateSet::new();
        child.set_attribute(material([0.0, 1.0, 0.0, 1.0]));

        let merged = MergedState::from_stack([&parent, &child]);
        assert_eq!(
            merged.attribute(AttributeKind::Material),
            Some(&material([0.0, 1.0, 0.0, 1.0]))
        );
    }

    #[test]
    fn test_ancestor_override_suppresses_descendant() {
        let mut parent = StateSet::new();
        parent.set_attribute_with_flags(material([1.0, 0.0, 0.0, 1.0]), StateFlags::OVERRIDE);
        let mut child = StateSet::new();
        child.set_attribute(material([0.0, 1.0, 0.0, 1.0]));

        let merged = MergedState::from_stack([&parent, &child]);
        assert_eq!(
            merged.attribute(AttributeKind::Material),
            Some(&material([1.0, 0.0, 0.0, 1.0]))
        );
    }

    #[test]
    fn test_protected_descendant_beats_override() {
        let mut parent = StateSet::new();
        parent.set_attribute_with_flags(material([1.0, 0.0, 0.0, 1.0]), StateFlags::OVERRIDE);
        let mut child = StateSet::new();
        child.set_attribute_with_flags(material([0.0, 0.0, 1.0, 1.0]), StateFlags::PROTECTED);

        let merged = MergedState::from_stack([&parent, &child]);
        assert_eq!(
            merged.attribute(AttributeKind::Material),
            Some(&material([0.0, 0.0, 1.0, 1.0]))
        );
    }

    #[test]
    fn test_override_applies_to_modes() {
        let mut parent = StateSet::new();
        parent.set_mode(Mode::Lighting, StateFlags::ON | StateFlags::OVERRIDE);
        let mut child = StateSet::new();
        child.set_mode(Mode::Lighting, StateFlags::off());

        let merged = MergedState::from_stack([&parent, &child]);
        assert!(merged.mode_enabled(Mode::Lighting));
    }

    #[test]
    fn test_empty_set_is_noop() {
        let mut parent = StateSet::new();
        parent.set_mode(Mode::Blend, StateFlags::on());
        let empty = StateSet::new();

        let with_empty = MergedState::from_stack([&parent, &empty]);
        let without = MergedState::from_stack([&parent]);
        assert_eq!(with_empty, without);
    }

    #[test]
    fn test_innermost_bin_request_wins() {
        let mut outer = StateSet::new();
        outer.set_rendering_hint(RenderingHint::Transparent);
        let mut inner = StateSet::new();
        inner.set_render_bin_details(-1, BinOrder::StateSorted);

        let merged = MergedState::from_stack([&outer, &inner]);
        assert_eq!(
            merged.bin(),
            BinDetails::Use {
                number: -1,
                order: BinOrder::StateSorted,
            }
        );
    }
}
