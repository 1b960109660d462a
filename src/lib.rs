//! loopsynth - Looping playback of symbolic music patterns.
//!
//! This library provides the playback engine: patterns of chords, bassline,
//! melody and drum hits are looped with lookahead scheduling and rendered
//! through procedurally synthesized voices.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod playback;

// Re-export commonly used types
pub use audio::render_to_wav;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ConfigError, EngineError, ScheduleError};
pub use pattern::{
    ChordEvent, DrumHit, DrumPattern, DrumVoice, NoteEvent, Pattern, PatternFile, TempoMeter,
    TrackKind,
};
pub use playback::IterationReport;
