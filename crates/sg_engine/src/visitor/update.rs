//! Update and event phase passes
//!
//! These passes mutate the scene, so they walk the graph directly with
//! `&mut Scene` instead of going through the read-only [`super::Traversal`]
//! context. The callback-chain contract holds in both: the engine runs every
//! callback on a node and then performs the continuation into children
//! itself, unless some callback vetoed it. There is no continuation call for
//! a callback body to forget.

use crate::events::Event;
use crate::foundation::time::FrameStamp;
use crate::graph::{Continuation, NodeId, NodeKind, NodeMask, Scene};

/// Run the update phase over the subtree at `root`
///
/// Invokes each node's update callback chain in order, advances hosted
/// techniques, and continues into active children (switch-disabled children
/// are skipped, LOD children are all updated; selection is a cull decision).
pub fn run_update(scene: &mut Scene, root: NodeId, stamp: &FrameStamp, mask: NodeMask) {
    update_node(scene, root, stamp, mask);
}

fn update_node(scene: &mut Scene, id: NodeId, stamp: &FrameStamp, mask: NodeMask) {
    let Some(node) = scene.node(id) else {
        return;
    };
    if node.mask().bits() & mask.bits() == 0 {
        return;
    }

    // Take the chain out so callbacks can borrow the scene mutably.
    let mut callbacks = match scene.node_mut(id) {
        Some(node) => std::mem::take(&mut node.update_callbacks),
        None => return,
    };
    let mut stop = false;
    for callback in &mut callbacks {
        if callback.update(scene, id, stamp) == Continuation::Stop {
            stop = true;
        }
    }
    // Restore; callbacks registered during invocation append after the
    // originals. If a callback removed the node, the chain goes with it.
    if let Some(node) = scene.node_mut(id) {
        let mut chain = callbacks;
        chain.append(&mut node.update_callbacks);
        node.update_callbacks = chain;
    } else {
        return;
    }

    if let Some(node) = scene.node(id) {
        if let NodeKind::Technique(technique) = node.kind() {
            match technique.lock() {
                Ok(mut technique) => technique.update(stamp),
                Err(_) => log::warn!("technique mutex poisoned during update; skipping"),
            }
        }
    }

    if stop {
        return;
    }

    for child in active_children(scene, id) {
        update_node(scene, child, stamp, mask);
    }
}

/// Deliver one event to node-attached event callbacks, innermost first
///
/// The subtree is walked depth-first and callbacks run on the way back up
/// (children before their parents), so the most specific handler sees the
/// event before enclosing ones. Returns `true` as soon as any callback
/// reports the event handled; no further callbacks run.
pub fn deliver_event(scene: &mut Scene, root: NodeId, event: &Event, mask: NodeMask) -> bool {
    let Some(node) = scene.node(root) else {
        return false;
    };
    if node.mask().bits() & mask.bits() == 0 {
        return false;
    }

    for child in active_children(scene, root) {
        if deliver_event(scene, child, event, mask) {
            return true;
        }
    }

    let mut callbacks = match scene.node_mut(root) {
        Some(node) => std::mem::take(&mut node.event_callbacks),
        None => return false,
    };
    let mut handled = false;
    for callback in &mut callbacks {
        if callback.event(scene, root, event) {
            handled = true;
            break;
        }
    }
    if let Some(node) = scene.node_mut(root) {
        let mut chain = callbacks;
        chain.append(&mut node.event_callbacks);
        node.event_callbacks = chain;
    }
    handled
}

/// Children the mutating passes continue into
///
/// Disabled switch children are skipped; everything else (including all LOD
/// children) is included, since only cull narrows an LOD to one child.
fn active_children(scene: &Scene, id: NodeId) -> Vec<NodeId> {
    let Some(node) = scene.node(id) else {
        return Vec::new();
    };
    match node.kind() {
        NodeKind::Switch { enabled, children } => children
            .iter()
            .enumerate()
            .filter(|(index, _)| enabled.get(*index).copied().unwrap_or(true))
            .map(|(_, child)| *child)
            .collect(),
        kind => kind.children().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::graph::{EventCallback, UpdateCallback};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingCallback {
        count: Arc<AtomicUsize>,
        result: Continuation,
    }

    impl UpdateCallback for CountingCallback {
        fn update(
            &mut self,
            _scene: &mut Scene,
            _node: NodeId,
            _stamp: &FrameStamp,
        ) -> Continuation {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    #[test]
    fn test_continuation_performed_by_engine() {
        let mut scene = Scene::new();
        let root = scene.create_group();
        let child = scene.create_group();
        scene.add_child(root, child).unwrap();

        let root_count = Arc::new(AtomicUsize::new(0));
        let child_count = Arc::new(AtomicUsize::new(0));
        scene
            .add_update_callback(
                root,
                Box::new(CountingCallback {
                    count: Arc::clone(&root_count),
                    result: Continuation::Continue,
                }),
            )
            .unwrap();
        scene
            .add_update_callback(
                child,
                Box::new(CountingCallback {
                    count: Arc::clone(&child_count),
                    result: Continuation::Continue,
                }),
            )
            .unwrap();

        run_update(&mut scene, root, &FrameStamp::zero(), NodeMask::ALL);

        // the child callback ran without the root callback doing anything to
        // continue the traversal
        assert_eq!(root_count.load(Ordering::SeqCst), 1);
        assert_eq!(child_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_vetoes_children() {
        let mut scene = Scene::new();
        let root = scene.create_group();
        let child = scene.create_group();
        scene.add_child(root, child).unwrap();

        let child_count = Arc::new(AtomicUsize::new(0));
        scene
            .add_update_callback(
                root,
                Box::new(CountingCallback {
                    count: Arc::new(AtomicUsize::new(0)),
                    result: Continuation::Stop,
                }),
            )
            .unwrap();
        scene
            .add_update_callback(
                child,
                Box::new(CountingCallback {
                    count: Arc::clone(&child_count),
                    result: Continuation::Continue,
                }),
            )
            .unwrap();

        run_update(&mut scene, root, &FrameStamp::zero(), NodeMask::ALL);
        assert_eq!(child_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_chain_survives_invocation() {
        let mut scene = Scene::new();
        let root = scene.create_group();
        let count = Arc::new(AtomicUsize::new(0));
        scene
            .add_update_callback(
                root,
                Box::new(CountingCallback {
                    count: Arc::clone(&count),
                    result: Continuation::Continue,
                }),
            )
            .unwrap();

        run_update(&mut scene, root, &FrameStamp::zero(), NodeMask::ALL);
        run_update(&mut scene, root, &FrameStamp::zero(), NodeMask::ALL);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    struct RecordingEventCallback {
        tag: usize,
        handled: bool,
        log: Arc<std::sync::Mutex<Vec<usize>>>,
    }

    impl EventCallback for RecordingEventCallback {
        fn event(&mut self, _scene: &mut Scene, _node: NodeId, _event: &Event) -> bool {
            self.log.lock().unwrap().push(self.tag);
            self.handled
        }
    }

    #[test]
    fn test_event_innermost_first() {
        let mut scene = Scene::new();
        let root = scene.create_group();
        let inner = scene.create_group();
        scene.add_child(root, inner).unwrap();

        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        scene
            .add_event_callback(
                root,
                Box::new(RecordingEventCallback {
                    tag: 1,
                    handled: false,
                    log: Arc::clone(&log),
                }),
            )
            .unwrap();
        scene
            .add_event_callback(
                inner,
                Box::new(RecordingEventCallback {
                    tag: 2,
                    handled: false,
                    log: Arc::clone(&log),
                }),
            )
            .unwrap();

        let event = Event::new(EventKind::Push, 0.0);
        let handled = deliver_event(&mut scene, root, &event, NodeMask::ALL);
        assert!(!handled);
        // inner (deeper) callback ran first
        assert_eq!(*log.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_event_handled_stops_dispatch() {
        let mut scene = Scene::new();
        let root = scene.create_group();
        let inner = scene.create_group();
        scene.add_child(root, inner).unwrap();

        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        scene
            .add_event_callback(
                root,
                Box::new(RecordingEventCallback {
                    tag: 1,
                    handled: false,
                    log: Arc::clone(&log),
                }),
            )
            .unwrap();
        scene
            .add_event_callback(
                inner,
                Box::new(RecordingEventCallback {
                    tag: 2,
                    handled: true,
                    log: Arc::clone(&log),
                }),
            )
            .unwrap();

        let event = Event::new(EventKind::Push, 0.0);
        assert!(deliver_event(&mut scene, root, &event, NodeMask::ALL));
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }
}
