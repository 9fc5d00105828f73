//! Outbound events from the schedulers and their non-blocking dispatch.

use crate::models::AlarmDefinition;
use crate::timer::TimerKind;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Alarm state transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmEvent {
    /// The alarm started ringing, either on schedule or after a snooze.
    Triggered { id: u32, alarm: AlarmDefinition },
    Snoozed { id: u32, duration: Duration },
    Stopped { id: u32 },
}

/// Countdown timer transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Started { kind: TimerKind, duration: Duration },
    Stopped { kind: TimerKind },
    SleepExpired,
    SnoozeExpired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Alarm(AlarmEvent),
    Timer(TimerEvent),
}

impl From<AlarmEvent> for Event {
    fn from(event: AlarmEvent) -> Self {
        Self::Alarm(event)
    }
}

impl From<TimerEvent> for Event {
    fn from(event: TimerEvent) -> Self {
        Self::Timer(event)
    }
}

/// Receives scheduler events.
///
/// Called from background threads. Events from the alarm and timer
/// schedulers may interleave in any order, so handlers must tolerate
/// duplicates and races with each other.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: Event);
}

impl EventSink for Sender<Event> {
    fn handle(&self, event: Event) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.send(event);
    }
}

/// Fans events out to sinks, each delivery on its own thread so that a
/// scheduler tick never waits on collaborator code.
#[derive(Clone, Default)]
pub struct Dispatcher {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink, builder style.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn emit(&self, event: impl Into<Event>) {
        let event = event.into();
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let event = event.clone();
            let spawned = thread::Builder::new()
                .name("event-dispatch".to_string())
                .spawn(move || sink.handle(event));
            if let Err(e) = spawned {
                warn!("failed to spawn event dispatch thread: {e}");
            }
        }
    }
}
