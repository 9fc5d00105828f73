//! Playback sessions: external player processes and tone pattern workers.

use crate::audio::{AudioError, PcmSink, RodioSink};
use crate::engine::{CancelFlag, Executor, VolumeCell};
use crate::models::{AlarmDefinition, SharedConfig, SourceKind};
use crate::resolver::{ResolveError, ResolvedSource, Resolver};
use crate::tone::{ToneError, ToneProgram};
use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Volume used for sleep audio regardless of configuration.
pub const SLEEP_VOLUME: u8 = 50;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Pattern(#[from] ToneError),
    #[error("failed to start audio player '{command}': {source}")]
    Spawn { command: String, source: io::Error },
    #[error("failed to spawn playback thread: {0}")]
    Worker(io::Error),
}

/// Opens the device that tone patterns are rendered to.
///
/// `open` is called on the worker thread, so the returned sink need not be
/// `Send`.
pub trait AudioOutput: Send + Sync {
    fn open(&self) -> Result<Box<dyn PcmSink>, AudioError>;
}

/// The default output device via rodio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOutput;

impl AudioOutput for SystemOutput {
    fn open(&self) -> Result<Box<dyn PcmSink>, AudioError> {
        Ok(Box::new(RodioSink::open()?))
    }
}

/// Progressive volume increase for alarms with ramping enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampSchedule {
    /// Points added per step.
    pub step: u8,
    pub interval: Duration,
}

impl Default for RampSchedule {
    fn default() -> Self {
        Self {
            step: 10,
            interval: Duration::from_secs(30),
        }
    }
}

impl RampSchedule {
    /// A quarter of the target, but never silent.
    pub fn start_volume(&self, target: u8) -> u8 {
        (target / 4).max(1).min(target)
    }

    /// Every level the ramp passes through, starting volume first.
    pub fn levels(&self, target: u8) -> Vec<u8> {
        let mut level = self.start_volume(target);
        let mut levels = vec![level];
        while level < target {
            level = level.saturating_add(self.step.max(1)).min(target);
            levels.push(level);
        }
        levels
    }
}

/// Arguments for the external player.
pub fn player_args(resource: &str, volume: u8) -> Vec<String> {
    let mut args = vec![resource.to_string()];
    if (1..=100).contains(&volume) {
        args.push("--volume".to_string());
        args.push(volume.to_string());
    }
    args.push("--loop".to_string());
    args
}

/// Snapshot of the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub generation: u64,
    pub source: ResolvedSource,
    pub target_volume: u8,
    pub start_volume: u8,
    pub started_at: NaiveDateTime,
    /// Process id of the external player, if one was launched.
    pub pid: Option<u32>,
}

enum Playback {
    Process(Child),
    Worker(JoinHandle<()>),
}

struct Session {
    info: SessionInfo,
    playback: Playback,
    cancel: CancelFlag,
    volume: VolumeCell,
}

impl Session {
    fn is_live(&mut self) -> bool {
        match &mut self.playback {
            Playback::Process(child) => matches!(child.try_wait(), Ok(None)),
            Playback::Worker(handle) => !handle.is_finished(),
        }
    }

    fn teardown(mut self) {
        self.cancel.cancel();
        if let Playback::Process(child) = &mut self.playback {
            if let Err(e) = child.kill() {
                warn!(pid = child.id(), error = %e, "Failed to kill audio player");
            }
            if let Err(e) = child.wait() {
                warn!(pid = child.id(), error = %e, "Failed to reap audio player");
            }
        }
        debug!(generation = self.info.generation, "playback session ended");
    }
}

/// What a play request resolved to, before anything is started. Holds
/// everything `start` needs so no config lock is taken under the session
/// lock.
enum Prepared {
    Pattern(PathBuf, Arc<ToneProgram>),
    Media { resource: String, command: String },
}

pub struct Player {
    config: SharedConfig,
    output: Arc<dyn AudioOutput>,
    ramp: RampSchedule,
    session: Mutex<Option<Session>>,
    programs: Mutex<HashMap<PathBuf, Arc<ToneProgram>>>,
    generation: AtomicU64,
}

impl Player {
    pub fn new(config: SharedConfig) -> Self {
        Self::with_output(config, Arc::new(SystemOutput))
    }

    pub fn with_output(config: SharedConfig, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            config,
            output,
            ramp: RampSchedule::default(),
            session: Mutex::new(None),
            programs: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_ramp(mut self, ramp: RampSchedule) -> Self {
        self.ramp = ramp;
        self
    }

    /// Replaces any current playback with the alarm's sound.
    pub fn play_alarm(&self, alarm: &AlarmDefinition) -> Result<(), PlaybackError> {
        let prepared = self.prepare_alarm(alarm);
        let mut session = self.session.lock();
        if let Some(previous) = session.take() {
            previous.teardown();
        }
        let started = self.start(prepared?, alarm.volume, alarm.volume_ramp)?;
        info!(
            alarm_id = alarm.id,
            source = %alarm.source,
            generation = started.info.generation,
            "Alarm playback started"
        );
        *session = Some(started);
        Ok(())
    }

    /// Replaces any current playback with sleep audio: the last stream,
    /// else the last music file, else the first soother pattern.
    pub fn play_sleep_audio(&self) -> Result<(), PlaybackError> {
        let prepared = self.prepare_sleep();
        let mut session = self.session.lock();
        if let Some(previous) = session.take() {
            previous.teardown();
        }
        let started = self.start(prepared?, SLEEP_VOLUME, false)?;
        info!(generation = started.info.generation, "Sleep audio started");
        *session = Some(started);
        Ok(())
    }

    /// Stops playback, if any.
    pub fn stop(&self) {
        if let Some(session) = self.session.lock().take() {
            session.teardown();
            info!("Playback stopped");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session.lock().as_mut().is_some_and(Session::is_live)
    }

    /// Volume of the current session, 0 when idle.
    pub fn current_volume(&self) -> u8 {
        self.session
            .lock()
            .as_ref()
            .map_or(0, |session| session.volume.get())
    }

    /// Overrides the current volume. Tone patterns pick it up within a
    /// second; external players keep their launch volume.
    pub fn set_volume(&self, percent: u8) {
        if let Some(session) = self.session.lock().as_ref() {
            session.volume.set(percent);
        }
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.lock().as_ref().map(|s| s.info.clone())
    }

    fn prepare_alarm(&self, alarm: &AlarmDefinition) -> Result<Prepared, PlaybackError> {
        let (resolver, value, command) = {
            let config = self.config.read();
            let value = match alarm.source {
                SourceKind::Music if alarm.source_value.trim().is_empty() => {
                    config.last_music_path.clone()
                }
                SourceKind::Stream if alarm.source_value.trim().is_empty() => {
                    config.last_stream_url.clone()
                }
                _ => alarm.source_value.clone(),
            };
            (
                Resolver::from_config(&config),
                value,
                config.player_command.clone(),
            )
        };
        self.prepare(resolver.resolve(alarm.source, &value)?, command)
    }

    fn prepare_sleep(&self) -> Result<Prepared, PlaybackError> {
        let (resolver, stream, music, command) = {
            let config = self.config.read();
            (
                Resolver::from_config(&config),
                config.last_stream_url.clone(),
                config.last_music_path.clone(),
                config.player_command.clone(),
            )
        };
        let source = if !stream.is_empty() {
            ResolvedSource::Media(stream)
        } else if !music.is_empty() {
            ResolvedSource::Media(music)
        } else {
            ResolvedSource::Pattern(resolver.default_pattern(SourceKind::Soother)?)
        };
        self.prepare(source, command)
    }

    fn prepare(&self, source: ResolvedSource, command: String) -> Result<Prepared, PlaybackError> {
        match source {
            ResolvedSource::Pattern(path) => {
                let program = self.load_program(&path)?;
                Ok(Prepared::Pattern(path, program))
            }
            ResolvedSource::Media(resource) => Ok(Prepared::Media { resource, command }),
        }
    }

    /// Parses a pattern once and reuses it for later plays.
    fn load_program(&self, path: &Path) -> Result<Arc<ToneProgram>, ToneError> {
        if let Some(program) = self.programs.lock().get(path) {
            return Ok(Arc::clone(program));
        }
        let program = Arc::new(ToneProgram::load(path)?);
        self.programs
            .lock()
            .insert(path.to_path_buf(), Arc::clone(&program));
        Ok(program)
    }

    fn start(&self, prepared: Prepared, target: u8, ramp: bool) -> Result<Session, PlaybackError> {
        let start_volume = if ramp {
            self.ramp.start_volume(target)
        } else {
            target
        };
        let cancel = CancelFlag::new();
        let volume = VolumeCell::new(start_volume);

        let (source, playback, pid) = match prepared {
            Prepared::Pattern(path, program) => {
                let handle = self.spawn_tone_worker(program, volume.clone(), cancel.clone())?;
                (ResolvedSource::Pattern(path), Playback::Worker(handle), None)
            }
            Prepared::Media { resource, command } => {
                let child = spawn_player(command, &resource, start_volume)?;
                let pid = child.id();
                (ResolvedSource::Media(resource), Playback::Process(child), Some(pid))
            }
        };

        if ramp && start_volume < target {
            self.spawn_ramp(target, volume.clone(), cancel.clone());
        }

        Ok(Session {
            info: SessionInfo {
                generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
                source,
                target_volume: target,
                start_volume,
                started_at: Local::now().naive_local(),
                pid,
            },
            playback,
            cancel,
            volume,
        })
    }

    fn spawn_tone_worker(
        &self,
        program: Arc<ToneProgram>,
        volume: VolumeCell,
        cancel: CancelFlag,
    ) -> Result<JoinHandle<()>, PlaybackError> {
        let output = Arc::clone(&self.output);
        thread::Builder::new()
            .name("tone-worker".to_string())
            .spawn(move || {
                let mut sink = match output.open() {
                    Ok(sink) => sink,
                    Err(e) => {
                        warn!(error = %e, "Failed to open audio output");
                        return;
                    }
                };
                let result = Executor::new(&mut sink)
                    .with_volume(volume)
                    .with_cancel(cancel)
                    .run(&program);
                match result {
                    Ok(stats) if stats.cancelled => debug!(tones = stats.tones, "pattern cancelled"),
                    Ok(stats) => {
                        if let Err(e) = sink.finish() {
                            warn!(error = %e, "Failed to drain audio output");
                        }
                        debug!(tones = stats.tones, "pattern finished");
                    }
                    Err(e) => warn!(error = %e, "Pattern playback failed"),
                }
            })
            .map_err(PlaybackError::Worker)
    }

    fn spawn_ramp(&self, target: u8, volume: VolumeCell, cancel: CancelFlag) {
        let levels = self.ramp.levels(target);
        let interval = self.ramp.interval;
        let spawned = thread::Builder::new()
            .name("volume-ramp".to_string())
            .spawn(move || {
                for level in levels.into_iter().skip(1) {
                    thread::sleep(interval);
                    if cancel.is_cancelled() {
                        return;
                    }
                    volume.set(level);
                    debug!(volume = level, "volume ramp step");
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn volume ramp, staying at start volume");
        }
    }
}

fn spawn_player(command: String, resource: &str, volume: u8) -> Result<Child, PlaybackError> {
    Command::new(&command)
        .args(player_args(resource, volume))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| PlaybackError::Spawn { command, source })
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}
