//! Sleep and snooze countdown timers.

use crate::events::{Dispatcher, TimerEvent};
use chrono::{Local, NaiveDateTime, TimeDelta};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Sleep timer lengths accepted, in minutes.
pub const SLEEP_RANGE: RangeInclusive<u32> = 5..=120;

/// Preset sleep lengths offered when cycling.
pub const SLEEP_PRESETS: [u32; 6] = [15, 30, 45, 60, 90, 120];

/// Snooze timer lengths accepted, in minutes.
pub const SNOOZE_TIMER_OPTIONS: [u32; 4] = [5, 10, 15, 30];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("{minutes} minutes is not a valid {kind} timer length")]
    InvalidDuration { kind: TimerKind, minutes: u32 },
    #[error("no {0} timer is running")]
    NotActive(TimerKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Sleep,
    Snooze,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sleep => f.write_str("sleep"),
            Self::Snooze => f.write_str("snooze"),
        }
    }
}

/// A running countdown.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerInstance {
    pub kind: TimerKind,
    pub started_at: NaiveDateTime,
    pub duration: Duration,
    pub ends_at: NaiveDateTime,
    pub active: bool,
}

pub struct TimerScheduler {
    timers: RwLock<HashMap<TimerKind, TimerInstance>>,
    dispatcher: Dispatcher,
}

impl TimerScheduler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            timers: RwLock::new(HashMap::new()),
            dispatcher,
        }
    }

    /// Starts the sleep timer, replacing a running one.
    pub fn start_sleep_timer(&self, minutes: u32) -> Result<(), TimerError> {
        self.start_sleep_timer_at(minutes, Local::now().naive_local())
    }

    pub fn start_sleep_timer_at(&self, minutes: u32, now: NaiveDateTime) -> Result<(), TimerError> {
        if !SLEEP_RANGE.contains(&minutes) {
            return Err(TimerError::InvalidDuration {
                kind: TimerKind::Sleep,
                minutes,
            });
        }
        self.start(TimerKind::Sleep, minutes, now);
        Ok(())
    }

    /// Starts the snooze timer, replacing a running one.
    pub fn start_snooze_timer(&self, minutes: u32) -> Result<(), TimerError> {
        self.start_snooze_timer_at(minutes, Local::now().naive_local())
    }

    pub fn start_snooze_timer_at(
        &self,
        minutes: u32,
        now: NaiveDateTime,
    ) -> Result<(), TimerError> {
        if !SNOOZE_TIMER_OPTIONS.contains(&minutes) {
            return Err(TimerError::InvalidDuration {
                kind: TimerKind::Snooze,
                minutes,
            });
        }
        self.start(TimerKind::Snooze, minutes, now);
        Ok(())
    }

    fn start(&self, kind: TimerKind, minutes: u32, now: NaiveDateTime) {
        let duration = Duration::from_secs(u64::from(minutes) * 60);
        let timer = TimerInstance {
            kind,
            started_at: now,
            duration,
            ends_at: now + TimeDelta::minutes(i64::from(minutes)),
            active: true,
        };

        self.timers.write().insert(kind, timer);
        info!(%kind, minutes, "timer started");
        self.dispatcher.emit(TimerEvent::Started { kind, duration });
    }

    /// Cancels a running timer.
    pub fn stop_timer(&self, kind: TimerKind) -> Result<(), TimerError> {
        let mut timers = self.timers.write();
        match timers.remove(&kind) {
            Some(timer) if timer.active => {
                info!(%kind, "timer stopped");
                self.dispatcher.emit(TimerEvent::Stopped { kind });
                Ok(())
            }
            _ => Err(TimerError::NotActive(kind)),
        }
    }

    /// Expires every timer whose end time has been reached.
    pub fn tick(&self, now: NaiveDateTime) {
        let mut timers = self.timers.write();
        let expired: Vec<TimerKind> = timers
            .values()
            .filter(|t| t.active && now >= t.ends_at)
            .map(|t| t.kind)
            .collect();

        for kind in expired {
            timers.remove(&kind);
            info!(%kind, "timer expired");
            let event = match kind {
                TimerKind::Sleep => TimerEvent::SleepExpired,
                TimerKind::Snooze => TimerEvent::SnoozeExpired,
            };
            self.dispatcher.emit(event);
        }
    }

    pub fn time_remaining(&self, kind: TimerKind) -> Duration {
        self.time_remaining_at(kind, Local::now().naive_local())
    }

    /// Remaining time, zero if the timer is not running.
    pub fn time_remaining_at(&self, kind: TimerKind, now: NaiveDateTime) -> Duration {
        self.timers
            .read()
            .get(&kind)
            .filter(|t| t.active)
            .and_then(|t| (t.ends_at - now).to_std().ok())
            .unwrap_or_default()
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.timers.read().get(&kind).is_some_and(|t| t.active)
    }

    pub fn timer(&self, kind: TimerKind) -> Option<TimerInstance> {
        self.timers.read().get(&kind).cloned()
    }
}

/// Returns the option after `current`, wrapping around. Unknown values
/// start over at the first option.
pub fn next_option(options: &[u32], current: u32) -> u32 {
    let next = options
        .iter()
        .position(|&o| o == current)
        .map_or(0, |i| (i + 1) % options.len());
    options.get(next).copied().unwrap_or(current)
}

/// Formats a remaining duration as MM:SS.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
