//! Reveille - a headless alarm clock.
//!
//! Alarms and countdown timers are evaluated once per second against the
//! wall clock. When an alarm rings, its sound comes either from a tone
//! pattern script rendered by the built-in synthesizer or from an external
//! media player process.

pub mod alarm;
pub mod app;
pub mod audio;
pub mod clock;
pub mod command;
pub mod engine;
pub mod events;
pub mod models;
pub mod notes;
pub mod notifications;
pub mod persistence;
pub mod playback;
pub mod resolver;
pub mod timer;
pub mod tone;
