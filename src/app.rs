//! Application wiring: schedulers, playback and persistence.

use crate::alarm::AlarmScheduler;
use crate::clock::{self, Poller};
use crate::events::{AlarmEvent, Dispatcher, Event, EventSink, TimerEvent};
use crate::models::{AlarmDefinition, AlarmState, Config, SharedConfig, SourceKind};
use crate::notifications::DesktopNotifier;
use crate::persistence::{ConfigStore, StoreError};
use crate::playback::Player;
use crate::timer::{TimerError, TimerKind, TimerScheduler};
use parking_lot::Mutex;
use std::io;
use std::sync::{Arc, OnceLock, Weak};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error("Failed to spawn clock poller: {0}")]
    Poller(io::Error),
}

/// Persists the shared config. The config lock is released before the
/// store lock is taken.
fn persist(config: &SharedConfig, store: &Mutex<ConfigStore>) -> Result<(), StoreError> {
    let snapshot = config.read().clone();
    store.lock().save_config(&snapshot)
}

/// Reacts to scheduler events with playback changes.
///
/// Events arrive on their own threads, so a `Triggered` delivery can run
/// after the alarm was already snoozed or stopped. Playback only starts
/// while the scheduler still reports the alarm as ringing.
pub struct Reactor {
    player: Arc<Player>,
    config: SharedConfig,
    store: Arc<Mutex<ConfigStore>>,
    alarms: OnceLock<Weak<AlarmScheduler>>,
}

impl Reactor {
    fn new(player: Arc<Player>, config: SharedConfig, store: Arc<Mutex<ConfigStore>>) -> Self {
        Self {
            player,
            config,
            store,
            alarms: OnceLock::new(),
        }
    }

    /// Whether alarm `id` is still ringing. True when no scheduler is
    /// attached.
    fn is_ringing(&self, id: u32) -> bool {
        self.alarms
            .get()
            .and_then(Weak::upgrade)
            .map_or(true, |alarms| alarms.state(id) == AlarmState::Triggered)
    }

    fn on_triggered(&self, id: u32, alarm: &AlarmDefinition) {
        if !self.is_ringing(id) {
            info!(alarm = id, "Alarm no longer ringing, not playing it");
            return;
        }
        let result = self.player.play_alarm(alarm);
        if result.is_ok() && !self.is_ringing(id) {
            info!(alarm = id, "Alarm silenced while starting, stopping playback");
            self.player.stop();
            return;
        }
        let Err(e) = result else {
            return;
        };
        error!(alarm = id, error = %e, "Failed to play alarm");

        if alarm.source == SourceKind::Buzzer && alarm.source_value.is_empty() {
            return;
        }
        let fallback = AlarmDefinition {
            source: SourceKind::Buzzer,
            source_value: String::new(),
            ..alarm.clone()
        };
        match self.player.play_alarm(&fallback) {
            Ok(()) => info!(alarm = id, "Playing default buzzer instead"),
            Err(e) => error!(alarm = id, error = %e, "Fallback buzzer failed too"),
        }
    }

    fn on_sleep_expired(&self) {
        self.player.stop();
        self.config.write().sleep_timer.duration = 0;
        if let Err(e) = persist(&self.config, &self.store) {
            warn!(error = %e, "Failed to save config after sleep timer");
        }
    }
}

impl EventSink for Reactor {
    fn handle(&self, event: Event) {
        match event {
            Event::Alarm(AlarmEvent::Triggered { id, alarm }) => self.on_triggered(id, &alarm),
            Event::Alarm(AlarmEvent::Snoozed { id, duration }) => {
                info!(alarm = id, secs = duration.as_secs(), "Alarm snoozed");
                self.player.stop();
            }
            Event::Alarm(AlarmEvent::Stopped { id }) => {
                info!(alarm = id, "Alarm stopped");
                self.player.stop();
            }
            Event::Timer(TimerEvent::Started {
                kind: TimerKind::Sleep,
                duration,
            }) => {
                info!(secs = duration.as_secs(), "Sleep timer started");
                if let Err(e) = self.player.play_sleep_audio() {
                    error!(error = %e, "Failed to play sleep audio");
                }
            }
            Event::Timer(TimerEvent::Stopped {
                kind: TimerKind::Sleep,
            }) => {
                info!("Sleep timer stopped");
                self.player.stop();
            }
            Event::Timer(TimerEvent::SleepExpired) => {
                info!("Sleep timer expired, stopping audio");
                self.on_sleep_expired();
            }
            Event::Timer(TimerEvent::SnoozeExpired) => info!("Snooze timer expired"),
            Event::Timer(_) => {}
        }
    }
}

/// Main application state.
pub struct App {
    pub config: SharedConfig,
    pub alarms: Arc<AlarmScheduler>,
    pub timers: Arc<TimerScheduler>,
    pub player: Arc<Player>,
    store: Arc<Mutex<ConfigStore>>,
    pollers: Mutex<Vec<Poller>>,
}

impl App {
    /// Creates the application, playing through the default audio device.
    pub fn new(store: ConfigStore, notify: bool) -> Result<Self, AppError> {
        let mut sinks: Vec<Arc<dyn EventSink>> = Vec::new();
        if notify {
            sinks.push(Arc::new(DesktopNotifier));
        }
        Self::build(store, Player::new, sinks)
    }

    /// Creates the application with a custom player and extra event sinks.
    pub fn build<F>(
        store: ConfigStore,
        make_player: F,
        sinks: Vec<Arc<dyn EventSink>>,
    ) -> Result<Self, AppError>
    where
        F: FnOnce(SharedConfig) -> Player,
    {
        let config = store.load_or_init()?.into_shared();
        let store = Arc::new(Mutex::new(store));
        let player = Arc::new(make_player(Arc::clone(&config)));

        let reactor = Arc::new(Reactor::new(
            Arc::clone(&player),
            Arc::clone(&config),
            Arc::clone(&store),
        ));
        let dispatcher = sinks.into_iter().fold(
            Dispatcher::new().with_sink(Arc::clone(&reactor) as Arc<dyn EventSink>),
            |d, sink| d.with_sink(sink),
        );

        let alarms = Arc::new(AlarmScheduler::new(Arc::clone(&config), dispatcher.clone()));
        // Weak: the scheduler's dispatcher already holds the reactor.
        let _ = reactor.alarms.set(Arc::downgrade(&alarms));

        Ok(Self {
            alarms,
            timers: Arc::new(TimerScheduler::new(dispatcher)),
            config,
            player,
            store,
            pollers: Mutex::new(Vec::new()),
        })
    }

    /// Starts the alarm and timer pollers.
    pub fn start(&self) -> Result<(), AppError> {
        let alarms = Arc::clone(&self.alarms);
        let alarm_poller =
            clock::spawn_poller("alarm-poller", move |now| alarms.tick(now)).map_err(AppError::Poller)?;
        let timers = Arc::clone(&self.timers);
        let timer_poller =
            clock::spawn_poller("timer-poller", move |now| timers.tick(now)).map_err(AppError::Poller)?;

        let mut pollers = self.pollers.lock();
        pollers.push(alarm_poller);
        pollers.push(timer_poller);
        info!("Schedulers running");
        Ok(())
    }

    /// Stops the pollers and playback and saves the configuration.
    pub fn shutdown(&self) -> Result<(), AppError> {
        let pollers: Vec<Poller> = self.pollers.lock().drain(..).collect();
        for poller in pollers {
            poller.stop();
        }
        self.player.stop();
        self.save_config()?;
        info!("Shut down");
        Ok(())
    }

    pub fn save_config(&self) -> Result<(), AppError> {
        persist(&self.config, &self.store)?;
        Ok(())
    }

    /// Updates the configuration and saves it.
    pub fn update_config<F>(&self, updater: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut Config),
    {
        updater(&mut *self.config.write());
        self.save_config()
    }

    /// Starts the sleep timer and remembers its length.
    pub fn start_sleep_timer(&self, minutes: u32) -> Result<(), AppError> {
        self.timers.start_sleep_timer(minutes)?;
        self.update_config(|c| c.sleep_timer.duration = minutes)
    }

    pub fn stop_sleep_timer(&self) -> Result<(), AppError> {
        self.timers.stop_timer(TimerKind::Sleep)?;
        self.update_config(|c| c.sleep_timer.duration = 0)
    }
}
