//! Timed events within one loop iteration.
//!
//! Timing is expressed in beats relative to the start of the loop. Missing or
//! `null` timing fields deserialize as NaN so the translator can skip the
//! single bad event instead of rejecting the whole pattern.

use serde::{Deserialize, Deserializer, Serialize};

/// Velocity used when an event does not specify one.
pub const DEFAULT_VELOCITY: u8 = 100;

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

fn missing() -> f64 {
    f64::NAN
}

/// Accepts a number or `null`; `null` becomes NaN.
fn nullable_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// A single monophonic tonal note (bassline or melody).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    /// Offset from the loop start, in beats.
    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub start_beat: f64,

    /// Length in beats.
    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub duration_beats: f64,

    /// MIDI note number (0-127).
    pub pitch: u8,

    /// Note velocity (0-127).
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

impl NoteEvent {
    /// Creates a note with the default velocity.
    pub fn new(pitch: u8, start_beat: f64, duration_beats: f64) -> Self {
        Self {
            start_beat,
            duration_beats,
            pitch,
            velocity: DEFAULT_VELOCITY,
        }
    }

    /// Sets the velocity.
    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }

    /// Returns the end of the note in beats.
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }
}

/// A group of pitches sharing one start, length and velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordEvent {
    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub start_beat: f64,

    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub duration_beats: f64,

    #[serde(default = "default_velocity")]
    pub velocity: u8,

    /// MIDI note numbers sounding together.
    pub notes: Vec<u8>,
}

impl ChordEvent {
    /// Creates a chord with the default velocity.
    pub fn new(notes: Vec<u8>, start_beat: f64, duration_beats: f64) -> Self {
        Self {
            start_beat,
            duration_beats,
            velocity: DEFAULT_VELOCITY,
            notes,
        }
    }

    /// Sets the velocity.
    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }

    /// Returns the end of the chord in beats.
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }
}

/// One strike of a drum lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrumHit {
    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub start_beat: f64,

    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub duration_beats: f64,

    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

impl DrumHit {
    /// Creates a hit with the default velocity.
    pub fn new(start_beat: f64, duration_beats: f64) -> Self {
        Self {
            start_beat,
            duration_beats,
            velocity: DEFAULT_VELOCITY,
        }
    }

    /// Sets the velocity.
    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }
}
