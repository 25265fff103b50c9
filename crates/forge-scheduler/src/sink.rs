//! Event sink adapters.

use forge_core::events::Event;
use forge_core::ports::EventSink;
use std::sync::Mutex;
use tracing::{debug, info};

/// Sink that forwards events to structured logging.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::RunStarted(_)
            | Event::RunCompleted(_)
            | Event::StageStarted(_)
            | Event::StageCompleted(_)
            | Event::ReleasePublished(_) => {
                info!(subject = %event.subject(), "event");
            }
            _ => {
                debug!(subject = %event.subject(), "event");
            }
        }
    }
}

/// Sink that records every event for later inspection in tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Subjects of every recorded event, in emission order.
    pub fn subjects(&self) -> Vec<String> {
        self.events().iter().map(|e| e.subject()).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
