//! Context-local applied-state cache
//!
//! Tracks what the device currently has applied and emits only differences.
//! The replay walk pushes and pops state sets as it moves through the state
//! graph; [`AppliedState::apply`] then reconciles the merged target of the
//! current stack against the last-applied values, so the driver sees a
//! number of calls proportional to what actually changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::state::{
    AttributeKind, BlendFactor, CompareFunc, CullFaceMode, Material, MergedState, Mode,
    PolygonFill, StateAttribute, StateSet,
};

use super::device::{CapabilityTable, RenderDevice};

/// Driver default instance for an attribute slot
///
/// Applied when a slot leaves the merged state, returning the driver to its
/// startup value for that category.
fn default_attribute(kind: AttributeKind) -> StateAttribute {
    match kind {
        AttributeKind::Material => StateAttribute::Material(Material::default()),
        AttributeKind::BlendFunc => StateAttribute::BlendFunc {
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
        },
        AttributeKind::Depth => StateAttribute::Depth {
            function: CompareFunc::Less,
            write: true,
        },
        AttributeKind::CullFace => StateAttribute::CullFace(CullFaceMode::Back),
        AttributeKind::PolygonMode => StateAttribute::PolygonMode(PolygonFill::Fill),
        AttributeKind::LineWidth => StateAttribute::LineWidth(1.0),
        AttributeKind::TextureBinding => StateAttribute::TextureBinding(0),
    }
}

/// Applied-state cache, one per graphics context
#[derive(Default)]
pub(crate) struct AppliedState {
    stack: Vec<Arc<StateSet>>,
    modes: BTreeMap<Mode, bool>,
    attributes: BTreeMap<AttributeKind, StateAttribute>,
    pub(crate) mode_changes: usize,
    pub(crate) attribute_changes: usize,
}

impl AppliedState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_set(&mut self, set: Arc<StateSet>) {
        self.stack.push(set);
    }

    pub(crate) fn pop_set(&mut self) {
        if self.stack.pop().is_none() {
            log::warn!("applied-state pop below empty stack ignored");
        }
    }

    pub(crate) fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Reconcile the device with the merged state of the current stack
    pub(crate) fn apply(&mut self, capabilities: &CapabilityTable, device: &mut dyn RenderDevice) {
        let target = MergedState::from_stack(self.stack.iter().map(Arc::as_ref));

        // modes present in the target
        for (mode, flags) in target.modes() {
            let desired = flags.contains(crate::state::StateFlags::ON);
            let applied = self.modes.get(mode).copied().unwrap_or(false);
            if applied != desired {
                device.apply_mode(*mode, desired);
                self.modes.insert(*mode, desired);
                self.mode_changes += 1;
            }
        }
        // modes that left the target revert to off (the driver default)
        let stale_modes: Vec<Mode> = self
            .modes
            .iter()
            .filter(|(mode, on)| **on && !target.modes().any(|(m, _)| m == *mode))
            .map(|(mode, _)| *mode)
            .collect();
        for mode in stale_modes {
            device.apply_mode(mode, false);
            self.modes.insert(mode, false);
            self.mode_changes += 1;
        }

        // attributes present in the target
        for (kind, entry) in target.attributes() {
            if self.attributes.get(kind) == Some(&entry.attribute) {
                continue;
            }
            if !capabilities.supports(*kind) {
                log::warn!("device lacks support for {kind:?}; attribute skipped");
                // remember the request so it is not re-attempted per leaf
                self.attributes.insert(*kind, entry.attribute.clone());
                continue;
            }
            match device.apply_attribute(&entry.attribute) {
                Ok(()) => {
                    self.attributes.insert(*kind, entry.attribute.clone());
                    self.attribute_changes += 1;
                }
                Err(err) => {
                    // resource errors degrade to a missing attribute, never
                    // a lost frame
                    log::warn!("attribute {kind:?} failed to apply: {err}");
                    self.attributes.insert(*kind, entry.attribute.clone());
                }
            }
        }
        // attributes that left the target revert to their default instance
        let stale_attributes: Vec<AttributeKind> = self
            .attributes
            .keys()
            .filter(|kind| target.attribute(**kind).is_none())
            .copied()
            .collect();
        for kind in stale_attributes {
            let default = default_attribute(kind);
            if self.attributes.get(&kind) == Some(&default) {
                self.attributes.remove(&kind);
                continue;
            }
            if capabilities.supports(kind) {
                if let Err(err) = device.apply_attribute(&default) {
                    log::warn!("attribute {kind:?} failed to revert: {err}");
                } else {
                    self.attribute_changes += 1;
                }
            }
            self.attributes.remove(&kind);
        }
    }
}
