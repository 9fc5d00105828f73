//! Desktop notifications for alarm and timer events.

use crate::events::{AlarmEvent, Event, EventSink, TimerEvent};
use notify_rust::Notification;
use std::thread;
use tracing::warn;

/// Summary and body for an event, or None if it is not worth a popup.
pub fn describe(event: &Event) -> Option<(String, String)> {
    match event {
        Event::Alarm(AlarmEvent::Triggered { id, alarm }) => Some((
            "Alarm".to_string(),
            format!(
                "Alarm {} ({}) is ringing.\nSnooze or stop it.",
                id,
                alarm.normalized_time()
            ),
        )),
        Event::Alarm(AlarmEvent::Snoozed { id, duration }) => {
            let mins = duration.as_secs() / 60;
            let body = if mins == 1 {
                format!("Alarm {id} will ring again in 1 minute.")
            } else {
                format!("Alarm {id} will ring again in {mins} minutes.")
            };
            Some(("Snoozed".to_string(), body))
        }
        Event::Timer(TimerEvent::SleepExpired) => Some((
            "Sleep timer finished".to_string(),
            "Good night. Audio has been stopped.".to_string(),
        )),
        Event::Timer(TimerEvent::SnoozeExpired) => Some((
            "Nap over".to_string(),
            "Your snooze timer has finished.".to_string(),
        )),
        _ => None,
    }
}

/// Shows a notification on a background thread.
pub fn notify(summary: String, body: String) {
    thread::spawn(move || {
        if let Err(e) = Notification::new()
            .summary(&summary)
            .body(&body)
            .sound_name("default")
            .show()
        {
            warn!(error = %e, "Failed to show notification");
        }
    });
}

/// Event sink that turns scheduler events into desktop notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl EventSink for DesktopNotifier {
    fn handle(&self, event: Event) {
        if let Some((summary, body)) = describe(&event) {
            notify(summary, body);
        }
    }
}
