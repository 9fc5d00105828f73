//! Data models for alarms, timers and the shared configuration.

use chrono::{Datelike, NaiveDateTime};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Configuration shared between the schedulers, the player and the app.
pub type SharedConfig = Arc<RwLock<Config>>;

/// Snooze lengths the alarm scheduler accepts, in minutes.
pub const SNOOZE_OPTIONS: [u32; 9] = [5, 7, 10, 15, 30, 45, 60, 90, 120];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown source kind: {0}")]
pub struct UnknownSourceKind(pub String);

/// Where an alarm or the sleep timer gets its sound from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Tone pattern from the buzzer directory.
    Buzzer,
    /// Tone pattern from the soother directory.
    Soother,
    /// Local media file played by the external player.
    #[serde(alias = "mp3")]
    Music,
    /// Network stream played by the external player.
    #[serde(alias = "radio")]
    Stream,
}

impl SourceKind {
    /// Returns true for sources rendered by the internal tone engine.
    pub fn is_pattern(self) -> bool {
        matches!(self, Self::Buzzer | Self::Soother)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buzzer => "buzzer",
            Self::Soother => "soother",
            Self::Music => "music",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = UnknownSourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buzzer" => Ok(Self::Buzzer),
            "soother" => Ok(Self::Soother),
            "music" | "mp3" => Ok(Self::Music),
            "stream" | "radio" => Ok(Self::Stream),
            _ => Err(UnknownSourceKind(s.to_string())),
        }
    }
}

/// A configured alarm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmDefinition {
    pub id: u32,
    pub enabled: bool,
    /// Time of day as `HH:MM:SS`; the older `HH:MM` form is also accepted.
    pub time: String,
    /// Day-of-week mask, index 0 is Sunday.
    pub days: [bool; 7],
    pub source: SourceKind,
    /// Explicit pattern path, media path or stream URL. Empty means default.
    #[serde(default)]
    pub source_value: String,
    /// Volume in percent (0-100).
    pub volume: u8,
    /// Progressive volume increase after the alarm starts.
    #[serde(default)]
    pub volume_ramp: bool,
}

impl AlarmDefinition {
    /// Returns the alarm time in `HH:MM:SS` form.
    pub fn normalized_time(&self) -> String {
        let time = self.time.trim();
        if time.len() == 5 {
            format!("{time}:00")
        } else {
            time.to_string()
        }
    }

    /// Returns true if the alarm should fire at exactly this second.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        if !self.enabled {
            return false;
        }
        let weekday = now.weekday().num_days_from_sunday() as usize;
        if !self.days[weekday] {
            return false;
        }
        now.format("%H:%M:%S").to_string() == self.normalized_time()
    }
}

/// Sleep timer preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SleepTimerSettings {
    /// Duration in minutes: 0 when disabled, otherwise 5-120.
    pub duration: u32,
    pub source: SourceKind,
    pub volume: u8,
    #[serde(default)]
    pub source_value: String,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub alarms: Vec<AlarmDefinition>,
    pub sleep_timer: SleepTimerSettings,
    /// Snooze length in minutes, one of [`SNOOZE_OPTIONS`].
    pub snooze_minutes: u32,
    /// External player used for music and stream sources, e.g. `mpv`.
    pub player_command: String,
    pub last_stream_url: String,
    pub last_music_path: String,
    /// Directory containing buzzer `.tone` files.
    pub buzzer_dir: PathBuf,
    /// Directory containing soother `.tone` files.
    pub soother_dir: PathBuf,
}

const WEEKDAYS: [bool; 7] = [false, true, true, true, true, true, false];

impl Default for Config {
    fn default() -> Self {
        Self {
            alarms: vec![
                AlarmDefinition {
                    id: 1,
                    enabled: false,
                    time: "07:00:00".to_string(),
                    days: WEEKDAYS,
                    source: SourceKind::Buzzer,
                    source_value: String::new(),
                    volume: 50,
                    volume_ramp: true,
                },
                AlarmDefinition {
                    id: 2,
                    enabled: false,
                    time: "07:30:00".to_string(),
                    days: WEEKDAYS,
                    source: SourceKind::Buzzer,
                    source_value: String::new(),
                    volume: 50,
                    volume_ramp: true,
                },
            ],
            sleep_timer: SleepTimerSettings {
                duration: 60,
                source: SourceKind::Soother,
                volume: 30,
                source_value: String::new(),
            },
            snooze_minutes: 5,
            player_command: "mpv".to_string(),
            last_stream_url: String::new(),
            last_music_path: String::new(),
            buzzer_dir: PathBuf::from("include/sounds/buzzer"),
            soother_dir: PathBuf::from("include/sounds/soother"),
        }
    }
}

impl Config {
    /// Wraps the config for sharing between components.
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    /// Looks up an alarm by id.
    pub fn alarm(&self, id: u32) -> Option<&AlarmDefinition> {
        self.alarms.iter().find(|a| a.id == id)
    }
}

/// Externally visible state of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmState {
    #[default]
    Off,
    Triggered,
    Snoozed,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Off => "off",
            Self::Triggered => "ringing",
            Self::Snoozed => "snoozed",
        };
        f.write_str(label)
    }
}

/// An alarm that has fired and not yet been stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAlarm {
    pub alarm_id: u32,
    pub state: AlarmState,
    /// When the alarm first triggered. Snoozing does not move it.
    pub started_at: NaiveDateTime,
    pub snooze_until: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn weekday_alarm(time: &str) -> AlarmDefinition {
        AlarmDefinition {
            enabled: true,
            time: time.to_string(),
            ..Config::default().alarms[0].clone()
        }
    }

    #[test]
    fn test_normalized_time_appends_seconds() {
        assert_eq!(weekday_alarm("06:45").normalized_time(), "06:45:00");
        assert_eq!(weekday_alarm("06:45:30").normalized_time(), "06:45:30");
    }

    #[test]
    fn test_is_due_exact_second() {
        // 2024-01-15 is a Monday
        let alarm = weekday_alarm("07:00:00");
        assert!(alarm.is_due(at(2024, 1, 15, 7, 0, 0)));
        assert!(!alarm.is_due(at(2024, 1, 15, 7, 0, 1)));
        assert!(!alarm.is_due(at(2024, 1, 15, 6, 59, 59)));
    }

    #[test]
    fn test_is_due_respects_day_mask() {
        // 2024-01-14 is a Sunday
        let alarm = weekday_alarm("07:00");
        assert!(!alarm.is_due(at(2024, 1, 14, 7, 0, 0)));

        let mut sunday = alarm.clone();
        sunday.days[0] = true;
        assert!(sunday.is_due(at(2024, 1, 14, 7, 0, 0)));
    }

    #[test]
    fn test_is_due_disabled() {
        let mut alarm = weekday_alarm("07:00:00");
        alarm.enabled = false;
        assert!(!alarm.is_due(at(2024, 1, 15, 7, 0, 0)));
    }

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("buzzer".parse::<SourceKind>(), Ok(SourceKind::Buzzer));
        assert_eq!("Soother".parse::<SourceKind>(), Ok(SourceKind::Soother));
        assert_eq!("mp3".parse::<SourceKind>(), Ok(SourceKind::Music));
        assert_eq!("radio".parse::<SourceKind>(), Ok(SourceKind::Stream));
        assert_eq!(
            "kazoo".parse::<SourceKind>(),
            Err(UnknownSourceKind("kazoo".to_string()))
        );
    }

    #[test]
    fn test_source_kind_serde_aliases() {
        let kind: SourceKind = serde_json::from_str("\"radio\"").unwrap();
        assert_eq!(kind, SourceKind::Stream);
        assert_eq!(serde_json::to_string(&SourceKind::Music).unwrap(), "\"music\"");
        assert!(serde_json::from_str::<SourceKind>("\"kazoo\"").is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.alarms.len(), 2);
        assert_eq!(config.alarms[0].time, "07:00:00");
        assert_eq!(config.alarms[1].time, "07:30:00");
        assert!(config.alarms.iter().all(|a| !a.enabled && a.volume_ramp));
        assert_eq!(config.snooze_minutes, 5);
        assert_eq!(config.player_command, "mpv");
        assert_eq!(config.sleep_timer.volume, 30);
        assert!(SNOOZE_OPTIONS.contains(&config.snooze_minutes));
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"snooze_minutes": 10}"#).unwrap();
        assert_eq!(config.snooze_minutes, 10);
        assert_eq!(config.player_command, "mpv");
        assert_eq!(config.alarms.len(), 2);
    }

    #[test]
    fn test_config_alarm_lookup() {
        let config = Config::default();
        assert_eq!(config.alarm(2).map(|a| a.id), Some(2));
        assert!(config.alarm(9).is_none());
    }
}
