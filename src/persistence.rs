//! SQLite persistence for the alarm configuration.

use crate::models::Config;
use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to create database directory {}", .0.display())]
    DirectoryCreation(PathBuf),
}

pub struct ConfigStore {
    conn: Connection,
}

impl ConfigStore {
    /// Opens the store at the default per-user location.
    pub fn new() -> Result<Self, StoreError> {
        Self::open(&Self::default_path())
    }

    /// Opens or creates the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|_| StoreError::DirectoryCreation(parent.to_path_buf()))?;
        }

        let conn = Connection::open(path)?;
        Self::initialize_tables(&conn)?;
        debug!(path = %path.display(), "config store opened");
        Ok(Self { conn })
    }

    /// Creates an in-memory store (for testing).
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_tables(&conn)?;
        Ok(Self { conn })
    }

    fn initialize_tables(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        ProjectDirs::from("org", "reveille", "Reveille")
            .map(|dirs| dirs.data_dir().join("reveille.db"))
            .unwrap_or_else(|| PathBuf::from("reveille.db"))
    }

    /// Loads the configuration, returning defaults if none is stored. Any
    /// other database error is returned.
    ///
    /// The sleep timer never survives a restart: its duration is always
    /// reset to 0 (off).
    pub fn load_config(&self) -> Result<Config, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'config'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let mut config = match json {
            Some(j) => serde_json::from_str(&j)?,
            None => Config::default(),
        };
        config.sleep_timer.duration = 0;
        Ok(config)
    }

    /// Loads the configuration, saving defaults on first run.
    pub fn load_or_init(&self) -> Result<Config, StoreError> {
        if !self.has_config()? {
            let config = Config::default();
            self.save_config(&config)?;
            debug!("default configuration saved");
        }
        self.load_config()
    }

    pub fn save_config(&self, config: &Config) -> Result<(), StoreError> {
        let json = serde_json::to_string(config)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES ('config', ?)",
            [&json],
        )?;
        Ok(())
    }

    fn has_config(&self) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM settings WHERE key = 'config'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    #[test]
    fn test_store_creation() {
        let store = ConfigStore::new_in_memory();
        assert!(store.is_ok());
    }

    #[test]
    fn test_defaults_when_empty() {
        let store = ConfigStore::new_in_memory().unwrap();
        let config = store.load_config().unwrap();
        assert_eq!(config.alarms, Config::default().alarms);
        assert_eq!(config.sleep_timer.duration, 0);
    }

    #[test]
    fn test_config_save_and_load() {
        let store = ConfigStore::new_in_memory().unwrap();

        let mut custom = Config::default();
        custom.snooze_minutes = 15;
        custom.alarms[0].enabled = true;
        custom.alarms[0].source = SourceKind::Stream;
        custom.alarms[0].source_value = "http://radio.example/live".to_string();
        custom.last_music_path = "/music/morning.mp3".to_string();
        store.save_config(&custom).unwrap();

        let loaded = store.load_config().unwrap();
        assert_eq!(loaded.snooze_minutes, 15);
        assert_eq!(loaded.alarms[0], custom.alarms[0]);
        assert_eq!(loaded.last_music_path, "/music/morning.mp3");
    }

    #[test]
    fn test_sleep_duration_reset_on_load() {
        let store = ConfigStore::new_in_memory().unwrap();
        let mut config = Config::default();
        config.sleep_timer.duration = 45;
        config.sleep_timer.volume = 20;
        store.save_config(&config).unwrap();

        let loaded = store.load_config().unwrap();
        assert_eq!(loaded.sleep_timer.duration, 0);
        assert_eq!(loaded.sleep_timer.volume, 20);
    }

    #[test]
    fn test_config_overwrite() {
        let store = ConfigStore::new_in_memory().unwrap();

        store
            .save_config(&Config {
                snooze_minutes: 10,
                ..Config::default()
            })
            .unwrap();
        store
            .save_config(&Config {
                snooze_minutes: 30,
                ..Config::default()
            })
            .unwrap();

        assert_eq!(store.load_config().unwrap().snooze_minutes, 30);
    }

    #[test]
    fn test_load_or_init_persists_defaults() {
        let store = ConfigStore::new_in_memory().unwrap();
        assert!(!store.has_config().unwrap());
        store.load_or_init().unwrap();
        assert!(store.has_config().unwrap());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reveille.db");
        {
            let store = ConfigStore::open(&path).unwrap();
            store
                .save_config(&Config {
                    player_command: "vlc".to_string(),
                    ..Config::default()
                })
                .unwrap();
        }
        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.load_config().unwrap().player_command, "vlc");
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let store = ConfigStore::new_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO settings (key, value) VALUES ('config', 'not json')",
                [],
            )
            .unwrap();
        assert!(matches!(store.load_config(), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_database_errors_are_not_defaults() {
        let store = ConfigStore::new_in_memory().unwrap();
        store.conn.execute_batch("DROP TABLE settings").unwrap();
        assert!(matches!(store.load_config(), Err(StoreError::Sqlite(_))));
        assert!(matches!(store.load_or_init(), Err(StoreError::Sqlite(_))));
    }
}
