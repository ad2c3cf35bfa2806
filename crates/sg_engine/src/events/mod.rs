//! Event injection and dispatch
//!
//! Windowing glue (GLUT/Qt/SDL embeddings, test drivers) appends immutable
//! event records to the [`EventQueue`]; the engine consumes the queue exactly
//! once per frame. Each event is offered to registered handlers from highest
//! priority down; priority encodes specificity, so the innermost handler for
//! a region registers higher than a global fallback. A handler returning
//! `true` consumes the event, stopping further dispatch. Events no handler
//! consumed are then offered to node-attached event callbacks by the event
//! traversal.

use bitflags::bitflags;

use crate::graph::Scene;

bitflags! {
    /// Mouse buttons held at the time of the event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ButtonMask: u8 {
        /// Left button
        const LEFT = 0b001;
        /// Middle button
        const MIDDLE = 0b010;
        /// Right button
        const RIGHT = 0b100;
    }
}

bitflags! {
    /// Keyboard modifiers held at the time of the event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModifierMask: u8 {
        /// Shift key
        const SHIFT = 0b001;
        /// Control key
        const CTRL = 0b010;
        /// Alt key
        const ALT = 0b100;
    }
}

/// What happened
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// Mouse button pressed
    Push,
    /// Mouse button released
    Release,
    /// Mouse moved with a button held
    Drag,
    /// Mouse moved with no button held
    Move,
    /// Key pressed
    KeyDown {
        /// Platform-independent key code
        key: u32,
    },
    /// Key released
    KeyUp {
        /// Platform-independent key code
        key: u32,
    },
    /// Window resized
    Resize {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
    /// Scroll wheel moved
    Scroll {
        /// Horizontal scroll delta
        dx: f32,
        /// Vertical scroll delta
        dy: f32,
    },
    /// Window close requested
    CloseWindow,
}

/// One immutable input event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Pointer X normalized to [-1, 1] across the window
    pub x: f32,
    /// Pointer Y normalized to [-1, 1] across the window
    pub y: f32,
    /// Buttons held
    pub buttons: ButtonMask,
    /// Modifiers held
    pub modifiers: ModifierMask,
    /// Seconds since engine start
    pub time: f64,
}

impl Event {
    /// Create an event with neutral pointer and mask fields
    pub fn new(kind: EventKind, time: f64) -> Self {
        Self {
            kind,
            x: 0.0,
            y: 0.0,
            buttons: ButtonMask::empty(),
            modifiers: ModifierMask::empty(),
            time,
        }
    }

    /// Builder: pointer position
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Builder: held buttons
    pub fn with_buttons(mut self, buttons: ButtonMask) -> Self {
        self.buttons = buttons;
        self
    }

    /// Builder: held modifiers
    pub fn with_modifiers(mut self, modifiers: ModifierMask) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Handler registered with the dispatcher
///
/// Returns `true` to consume the event and stop further dispatch.
pub trait EventHandler: Send {
    /// Handle one event
    fn handle(&mut self, event: &Event, scene: &mut Scene) -> bool;
}

struct HandlerEntry {
    priority: i32,
    handler: Box<dyn EventHandler>,
}

/// Per-frame event queue plus the prioritized handler registry
#[derive(Default)]
pub struct EventQueue {
    pending: Vec<Event>,
    handlers: Vec<HandlerEntry>,
}

impl EventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event; called by the windowing glue at any time
    pub fn push(&mut self, event: Event) {
        self.pending.push(event);
    }

    /// Number of events waiting for the next frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Register a handler
    ///
    /// Higher priority dispatches first; handlers with equal priority run in
    /// registration order.
    pub fn add_handler(&mut self, priority: i32, handler: Box<dyn EventHandler>) {
        let at = self
            .handlers
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(self.handlers.len());
        self.handlers.insert(at, HandlerEntry { priority, handler });
    }

    /// Drain this frame's events, dispatching each through the handlers
    ///
    /// Returns the events no handler consumed, in arrival order, for the
    /// event traversal to offer to node callbacks.
    pub fn dispatch_frame(&mut self, scene: &mut Scene) -> Vec<Event> {
        let pending = std::mem::take(&mut self.pending);
        let mut unconsumed = Vec::new();
        for event in pending {
            let mut handled = false;
            for entry in &mut self.handlers {
                if entry.handler.handle(&event, scene) {
                    handled = true;
                    break;
                }
            }
            if !handled {
                unconsumed.push(event);
            }
        }
        unconsumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder {
        order_tag: usize,
        consume: bool,
        log: Arc<std::sync::Mutex<Vec<usize>>>,
        count: Arc<AtomicUsize>,
    }

    impl EventHandler for Recorder {
        fn handle(&mut self, _event: &Event, _scene: &mut Scene) -> bool {
            self.log.lock().unwrap().push(self.order_tag);
            self.count.fetch_add(1, Ordering::SeqCst);
            self.consume
        }
    }

    fn recorder(
        order_tag: usize,
        consume: bool,
        log: &Arc<std::sync::Mutex<Vec<usize>>>,
        count: &Arc<AtomicUsize>,
    ) -> Box<Recorder> {
        Box::new(Recorder {
            order_tag,
            consume,
            log: Arc::clone(log),
            count: Arc::clone(count),
        })
    }

    #[test]
    fn test_priority_order_and_consumption() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));
        let mut queue = EventQueue::new();
        let mut scene = Scene::new();

        // registered low-priority first; high priority must still run first
        queue.add_handler(0, recorder(1, false, &log, &count));
        queue.add_handler(10, recorder(2, true, &log, &count));

        queue.push(Event::new(EventKind::Push, 0.0));
        let unconsumed = queue.dispatch_frame(&mut scene);

        // the priority-10 handler consumed the event; the other never saw it
        assert_eq!(*log.lock().unwrap(), vec![2]);
        assert!(unconsumed.is_empty());
    }

    #[test]
    fn test_unconsumed_events_returned() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));
        let mut queue = EventQueue::new();
        let mut scene = Scene::new();
        queue.add_handler(0, recorder(1, false, &log, &count));

        queue.push(Event::new(EventKind::CloseWindow, 0.0));
        queue.push(Event::new(EventKind::Move, 0.1).at(0.5, -0.5));
        let unconsumed = queue.dispatch_frame(&mut scene);
        assert_eq!(unconsumed.len(), 2);
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn test_equal_priority_registration_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));
        let mut queue = EventQueue::new();
        let mut scene = Scene::new();
        queue.add_handler(5, recorder(1, false, &log, &count));
        queue.add_handler(5, recorder(2, false, &log, &count));

        queue.push(Event::new(EventKind::Move, 0.0));
        queue.dispatch_frame(&mut scene);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }
}
