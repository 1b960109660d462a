//! Error types for the playback engine.
//!
//! Session-level failures ([`EngineError`]) abort a `start()` call and are
//! returned to the host. Per-event failures ([`ScheduleError`]) are always
//! recovered where they occur: the event is logged and dropped.

use thiserror::Error;

/// Errors surfaced to the host application.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The platform has no usable audio output.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Tempo, bar count or meter produced a non-positive loop length.
    #[error("invalid loop duration {duration}s (tempo {tempo_bpm} BPM, {bars} bars of {beats_per_bar} beats)")]
    InvalidLoopDuration {
        duration: f64,
        tempo_bpm: f64,
        bars: u32,
        beats_per_bar: f64,
    },

    /// Engine configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Reasons a single sound event was not scheduled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    /// The event carried unusable numeric fields.
    #[error("event skipped: {0}")]
    Skipped(String),

    /// The event's absolute start time has already passed.
    #[error("stale event at {start:.3}s (device clock {now:.3}s)")]
    Stale { start: f64, now: f64 },
}

/// Errors loading or validating an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for `{field}`: {value}")]
    Invalid { field: &'static str, value: f64 },
}

/// An exponential ramp cannot reach a non-positive level.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("exponential ramp needs positive levels (from {from}, to {to})")]
pub struct RampError {
    pub from: f32,
    pub to: f32,
}

/// A mixer operation referenced a voice that is no longer connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("voice {0} is not connected")]
    NotConnected(u64),
}
