//! Structured event stream. The production sink forwards to `tracing`; the
//! in-memory sink backs assertions in tests.

use parking_lot::Mutex;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug)]
pub struct Event {
    pub level: Level,
    pub kind: &'static str,
    /// Library-relative path of the entity the event is about; empty for
    /// run-level events.
    pub entity: String,
    pub message: String,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

pub struct TracingEvents;

impl EventSink for TracingEvents {
    fn emit(&self, event: Event) {
        match event.level {
            Level::Info => info!(kind = event.kind, entity = %event.entity, "{}", event.message),
            Level::Warn => warn!(kind = event.kind, entity = %event.entity, "{}", event.message),
            Level::Error => error!(kind = event.kind, entity = %event.entity, "{}", event.message),
        }
    }
}

#[derive(Default)]
pub struct MemoryEvents {
    events: Mutex<Vec<Event>>,
}

impl MemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSink for MemoryEvents {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}
