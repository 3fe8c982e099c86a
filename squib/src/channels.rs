use squib_core::EventQueue;

/// Radio task to dispatcher. The radio side never waits on it.
pub static EVENTS: EventQueue = EventQueue::new();
