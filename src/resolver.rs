//! Maps a configured sound source to something playable.

use crate::models::{Config, SourceKind, UnknownSourceKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File extension of tone pattern scripts, matched case-insensitively.
pub const PATTERN_EXTENSION: &str = "tone";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no {kind} .tone files found in {}", dir.display())]
    NoPatterns { kind: SourceKind, dir: PathBuf },
    #[error("no {0} source configured")]
    EmptySource(SourceKind),
    #[error(transparent)]
    UnknownKind(#[from] UnknownSourceKind),
}

/// A concrete resource ready for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    /// A tone pattern script for the internal synthesizer.
    Pattern(PathBuf),
    /// A file path or URL handed to the external player.
    Media(String),
}

#[derive(Debug, Clone)]
pub struct Resolver {
    buzzer_dir: PathBuf,
    soother_dir: PathBuf,
}

impl Resolver {
    pub fn new(buzzer_dir: PathBuf, soother_dir: PathBuf) -> Self {
        Self {
            buzzer_dir,
            soother_dir,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.buzzer_dir.clone(), config.soother_dir.clone())
    }

    pub fn resolve(&self, kind: SourceKind, value: &str) -> Result<ResolvedSource, ResolveError> {
        let value = value.trim();
        match kind {
            SourceKind::Buzzer | SourceKind::Soother => {
                if !value.is_empty() {
                    return Ok(ResolvedSource::Pattern(PathBuf::from(value)));
                }
                self.default_pattern(kind).map(ResolvedSource::Pattern)
            }
            SourceKind::Music | SourceKind::Stream => {
                if value.is_empty() {
                    return Err(ResolveError::EmptySource(kind));
                }
                Ok(ResolvedSource::Media(value.to_string()))
            }
        }
    }

    /// Resolves a source kind given by name, e.g. from a command line.
    pub fn resolve_named(&self, kind: &str, value: &str) -> Result<ResolvedSource, ResolveError> {
        self.resolve(kind.parse()?, value)
    }

    /// First pattern file in the directory for `kind`.
    pub fn default_pattern(&self, kind: SourceKind) -> Result<PathBuf, ResolveError> {
        let dir = self.pattern_dir(kind);
        discover_patterns(dir)
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NoPatterns {
                kind,
                dir: dir.to_path_buf(),
            })
    }

    fn pattern_dir(&self, kind: SourceKind) -> &Path {
        match kind {
            SourceKind::Soother => &self.soother_dir,
            _ => &self.buzzer_dir,
        }
    }
}

/// Recursively collects pattern files under `dir`, sorted. Unreadable
/// entries are skipped and a missing directory yields an empty list.
pub fn discover_patterns(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(PATTERN_EXTENSION))
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
