//! Typed scheduler notifications: explicit observer registration instead of
//! engine-managed listener lists. Events are queued during a tick and
//! delivered in order when the queue is processed.

use std::cell::RefCell;
use std::rc::Rc;

use poseforge_api_core::NodeId;

use crate::scheduler::SchedulerState;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SchedulerEvent {
    /// The play cursor moved.
    FrameChanged { frame: i32 },
    /// The transport state machine transitioned.
    StateChanged { state: SchedulerState },
    /// A node gained its first animation data.
    AnimationAdded { node: NodeId },
    /// A node's last animation data was removed.
    AnimationRemoved { node: NodeId },
    /// A manipulation edited a node's curves; observers should redraw.
    CurveChanged { node: NodeId },
}

pub trait SchedulerObserver {
    fn on_event(&mut self, event: &SchedulerEvent);
}

pub struct EventDispatcher {
    listeners: Vec<Box<dyn SchedulerObserver>>,
    queue: Vec<SchedulerEvent>,
    max_queue_size: usize,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            queue: Vec::new(),
            max_queue_size: 1024,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn SchedulerObserver>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Queue an event for the next `process_queue` pass. Events past the
    /// queue capacity are dropped.
    pub fn dispatch(&mut self, event: SchedulerEvent) {
        if self.queue.len() < self.max_queue_size {
            self.queue.push(event);
        }
    }

    /// Deliver all queued events to every listener, in dispatch order.
    pub fn process_queue(&mut self) {
        let events = std::mem::take(&mut self.queue);
        for event in events {
            for listener in &mut self.listeners {
                listener.on_event(&event);
            }
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer that records every delivered event; the returned handle stays
/// readable after the observer is boxed into a dispatcher.
pub struct CollectingObserver {
    events: Rc<RefCell<Vec<SchedulerEvent>>>,
}

impl CollectingObserver {
    pub fn new() -> (Self, Rc<RefCell<Vec<SchedulerEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                events: Rc::clone(&events),
            },
            events,
        )
    }
}

impl SchedulerObserver for CollectingObserver {
    fn on_event(&mut self, event: &SchedulerEvent) {
        self.events.borrow_mut().push(*event);
    }
}
