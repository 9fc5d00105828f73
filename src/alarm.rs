//! Alarm scheduling: matches alarm definitions against wall time and runs
//! the per-alarm ringing/snoozed state machine.

use crate::events::{AlarmEvent, Dispatcher};
use crate::models::{ActiveAlarm, AlarmState, SharedConfig, SNOOZE_OPTIONS};
use chrono::{Local, NaiveDateTime, TimeDelta};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// A ringing alarm nobody reacts to is silenced after this long.
pub const RING_TIMEOUT_MINS: i64 = 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlarmError {
    #[error("alarm {0} is not ringing")]
    NotTriggered(u32),
    #[error("alarm {0} is not active")]
    NotActive(u32),
}

pub struct AlarmScheduler {
    config: SharedConfig,
    active: RwLock<HashMap<u32, ActiveAlarm>>,
    dispatcher: Dispatcher,
}

impl AlarmScheduler {
    pub fn new(config: SharedConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            active: RwLock::new(HashMap::new()),
            dispatcher,
        }
    }

    /// Evaluates all alarms for one clock tick.
    ///
    /// Alarms are matched on the exact `HH:MM:SS` second, so a skipped
    /// tick means a skipped alarm for that day.
    pub fn tick(&self, now: NaiveDateTime) {
        let alarms = self.config.read().alarms.clone();
        let mut active = self.active.write();

        for alarm in alarms.iter().filter(|a| a.is_due(now)) {
            if active.contains_key(&alarm.id) {
                continue;
            }
            info!(alarm = alarm.id, time = %alarm.normalized_time(), "alarm triggered");
            active.insert(
                alarm.id,
                ActiveAlarm {
                    alarm_id: alarm.id,
                    state: AlarmState::Triggered,
                    started_at: now,
                    snooze_until: None,
                },
            );
            self.dispatcher.emit(AlarmEvent::Triggered {
                id: alarm.id,
                alarm: alarm.clone(),
            });
        }

        let timeout = TimeDelta::minutes(RING_TIMEOUT_MINS);
        let mut finished = Vec::new();
        for (&id, instance) in active.iter_mut() {
            match instance.state {
                AlarmState::Triggered if now - instance.started_at >= timeout => {
                    info!(alarm = id, "alarm rang for {RING_TIMEOUT_MINS} minutes, stopping");
                    finished.push(id);
                }
                AlarmState::Snoozed if instance.snooze_until.is_some_and(|until| now >= until) => {
                    let Some(alarm) = alarms.iter().find(|a| a.id == id) else {
                        debug!(alarm = id, "snoozed alarm no longer configured");
                        finished.push(id);
                        continue;
                    };
                    info!(alarm = id, "snooze over, alarm triggered again");
                    instance.state = AlarmState::Triggered;
                    instance.snooze_until = None;
                    self.dispatcher.emit(AlarmEvent::Triggered {
                        id,
                        alarm: alarm.clone(),
                    });
                }
                _ => {}
            }
        }

        for id in finished {
            active.remove(&id);
            self.dispatcher.emit(AlarmEvent::Stopped { id });
        }
    }

    /// Snoozes a ringing alarm for the configured number of minutes.
    pub fn snooze(&self, id: u32) -> Result<Duration, AlarmError> {
        self.snooze_at(id, Local::now().naive_local())
    }

    pub fn snooze_at(&self, id: u32, now: NaiveDateTime) -> Result<Duration, AlarmError> {
        let minutes = self.snooze_minutes();
        let mut active = self.active.write();

        let instance = active
            .get_mut(&id)
            .filter(|a| a.state == AlarmState::Triggered)
            .ok_or(AlarmError::NotTriggered(id))?;

        let duration = Duration::from_secs(u64::from(minutes) * 60);
        instance.state = AlarmState::Snoozed;
        instance.snooze_until = Some(now + TimeDelta::minutes(i64::from(minutes)));
        info!(alarm = id, minutes, "alarm snoozed");

        self.dispatcher.emit(AlarmEvent::Snoozed { id, duration });
        Ok(duration)
    }

    /// Stops an alarm whether it is ringing or snoozed.
    pub fn stop(&self, id: u32) -> Result<(), AlarmError> {
        let removed = self.active.write().remove(&id);
        if removed.is_none() {
            return Err(AlarmError::NotActive(id));
        }
        info!(alarm = id, "alarm stopped");
        self.dispatcher.emit(AlarmEvent::Stopped { id });
        Ok(())
    }

    /// Sets the snooze length. Values outside [`SNOOZE_OPTIONS`] are
    /// ignored; returns whether the value was applied.
    pub fn set_snooze_minutes(&self, minutes: u32) -> bool {
        if !SNOOZE_OPTIONS.contains(&minutes) {
            debug!(minutes, "ignoring unsupported snooze length");
            return false;
        }
        self.config.write().snooze_minutes = minutes;
        true
    }

    pub fn snooze_minutes(&self) -> u32 {
        self.config.read().snooze_minutes
    }

    pub fn state(&self, id: u32) -> AlarmState {
        self.active
            .read()
            .get(&id)
            .map_or(AlarmState::Off, |a| a.state)
    }

    pub fn is_active(&self, id: u32) -> bool {
        self.active.read().contains_key(&id)
    }

    /// Returns a copy of all active alarms.
    pub fn active_alarms(&self) -> HashMap<u32, ActiveAlarm> {
        self.active.read().clone()
    }

    /// Remaining snooze time, zero unless the alarm is snoozed.
    pub fn snooze_remaining_at(&self, id: u32, now: NaiveDateTime) -> Duration {
        self.active
            .read()
            .get(&id)
            .filter(|a| a.state == AlarmState::Snoozed)
            .and_then(|a| a.snooze_until)
            .and_then(|until| (until - now).to_std().ok())
            .unwrap_or_default()
    }

    pub fn snooze_remaining(&self, id: u32) -> Duration {
        self.snooze_remaining_at(id, Local::now().naive_local())
    }
}
