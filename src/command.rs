//! Console command handling.

use crate::alarm::AlarmError;
use crate::app::{App, AppError};
use crate::models::AlarmState;
use crate::timer::{self, TimerError, TimerKind, SLEEP_PRESETS};
use chrono::{Local, NaiveDateTime};
use std::fmt::Write;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  status                      show alarms, timers and playback
  snooze <id>                 snooze a ringing alarm
  stop <id>                   stop an active alarm
  silence                     stop whatever is playing
  sleep <minutes>|next|off    control the sleep timer
  nap <minutes>|off           control the snooze timer
  snooze-minutes <n>          set the alarm snooze length
  quit                        exit";

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("unknown command '{0}', try 'help'")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
    #[error("{0} minutes is not a valid snooze length")]
    InvalidSnoozeMinutes(u32),
    #[error(transparent)]
    Alarm(#[from] AlarmError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    App(#[from] AppError),
}

/// Result of handling a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Command handled; print the reply.
    Reply(String),
    /// User requested quit.
    Quit,
}

fn reply(text: impl Into<String>) -> Result<CommandOutcome, CommandError> {
    Ok(CommandOutcome::Reply(text.into()))
}

fn number(arg: Option<&str>, usage: &'static str) -> Result<u32, CommandError> {
    let arg = arg.ok_or(CommandError::Usage(usage))?;
    arg.parse()
        .map_err(|_| CommandError::InvalidNumber(arg.to_string()))
}

/// Handles one input line and updates the app accordingly.
pub fn handle_command(app: &App, line: &str) -> Result<CommandOutcome, CommandError> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return reply("");
    };
    let arg = words.next();

    match command {
        "status" => reply(status_report(app, Local::now().naive_local())),
        "help" => reply(HELP),
        "snooze" => {
            let id = number(arg, "snooze <id>")?;
            let duration = app.alarms.snooze(id)?;
            reply(format!(
                "Alarm {id} snoozed for {} minutes",
                duration.as_secs() / 60
            ))
        }
        "stop" => {
            let id = number(arg, "stop <id>")?;
            app.alarms.stop(id)?;
            reply(format!("Alarm {id} stopped"))
        }
        "silence" => {
            app.player.stop();
            reply("Playback stopped")
        }
        "sleep" => handle_sleep(app, arg),
        "nap" => handle_nap(app, arg),
        "snooze-minutes" => {
            let minutes = number(arg, "snooze-minutes <n>")?;
            if !app.alarms.set_snooze_minutes(minutes) {
                return Err(CommandError::InvalidSnoozeMinutes(minutes));
            }
            app.save_config()?;
            reply(format!("Snooze length set to {minutes} minutes"))
        }
        "quit" | "exit" => Ok(CommandOutcome::Quit),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

fn handle_sleep(app: &App, arg: Option<&str>) -> Result<CommandOutcome, CommandError> {
    const USAGE: &str = "sleep <minutes>|next|off";
    let minutes = match arg {
        Some("off") => {
            app.stop_sleep_timer()?;
            return reply("Sleep timer off");
        }
        Some("next") => {
            let current = app.config.read().sleep_timer.duration;
            timer::next_option(&SLEEP_PRESETS, current)
        }
        other => number(other, USAGE)?,
    };
    app.start_sleep_timer(minutes)?;
    reply(format!("Sleep timer set for {minutes} minutes"))
}

fn handle_nap(app: &App, arg: Option<&str>) -> Result<CommandOutcome, CommandError> {
    if arg == Some("off") {
        app.timers.stop_timer(TimerKind::Snooze)?;
        return reply("Snooze timer off");
    }
    let minutes = number(arg, "nap <minutes>|off")?;
    app.timers.start_snooze_timer(minutes)?;
    reply(format!("Snooze timer set for {minutes} minutes"))
}

/// Human-readable summary of alarms, timers and playback at `now`.
pub fn status_report(app: &App, now: NaiveDateTime) -> String {
    let alarms = app.config.read().alarms.clone();
    let mut out = String::new();

    for alarm in &alarms {
        let state = app.alarms.state(alarm.id);
        let _ = write!(
            out,
            "alarm {} {} {} {} vol {}%",
            alarm.id,
            alarm.normalized_time(),
            if alarm.enabled { "on" } else { "off" },
            alarm.source,
            alarm.volume
        );
        match state {
            AlarmState::Off => {}
            AlarmState::Triggered => out.push_str(" [ringing]"),
            AlarmState::Snoozed => {
                let remaining = app.alarms.snooze_remaining_at(alarm.id, now);
                let _ = write!(out, " [snoozed {}]", timer::format_remaining(remaining));
            }
        }
        out.push('\n');
    }

    for kind in [TimerKind::Sleep, TimerKind::Snooze] {
        if app.timers.is_active(kind) {
            let remaining = app.timers.time_remaining_at(kind, now);
            let _ = writeln!(out, "{kind} timer {}", timer::format_remaining(remaining));
        } else {
            let _ = writeln!(out, "{kind} timer off");
        }
    }

    match app.player.session_info() {
        Some(info) if app.player.is_playing() => {
            let _ = write!(
                out,
                "playing {:?} at {}%",
                info.source,
                app.player.current_volume()
            );
        }
        _ => out.push_str("idle"),
    }
    out
}
