// Engine events
//
// Platform events are translated into `Event`s and dispatched by kind.
// Callbacks run synchronously, in the order they were subscribed.

use std::collections::HashMap;
use std::fmt;

/// Tag a callback subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Quit,
    WindowResized,
}

/// Event payload handed to callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Close requested or quit key pressed
    Quit,
    /// New window size in physical pixels
    WindowResized { width: u32, height: u32 },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Quit => EventKind::Quit,
            Event::WindowResized { .. } => EventKind::WindowResized,
        }
    }
}

pub type EventCallback = Box<dyn FnMut(&Event)>;

/// Maps event kinds to the callbacks subscribed to them.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: HashMap<EventKind, Vec<EventCallback>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F)
    where
        F: FnMut(&Event) + 'static,
    {
        self.subscribers
            .entry(kind)
            .or_default()
            .push(Box::new(callback));
    }

    /// Invoke every callback subscribed to `kind`. Returns how many ran.
    pub fn dispatch(&mut self, kind: EventKind, event: &Event) -> usize {
        match self.subscribers.get_mut(&kind) {
            Some(callbacks) => {
                for callback in callbacks.iter_mut() {
                    callback(event);
                }
                callbacks.len()
            }
            None => 0,
        }
    }

    /// Dispatch under the event's own kind.
    pub fn emit(&mut self, event: &Event) -> usize {
        self.dispatch(event.kind(), event)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, callbacks) in &self.subscribers {
            map.entry(kind, &callbacks.len());
        }
        map.finish()
    }
}
