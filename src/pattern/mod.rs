//! Symbolic pattern data consumed by the playback engine.
//!
//! A pattern describes one loop iteration of music in beats: chords, a
//! bassline, a melody and named drum lanes. Tempo and meter live separately in
//! [`TempoMeter`] and are only used to turn beats into seconds.

mod drums;
mod event;
mod tempo;
mod track;

pub use drums::{normalize_voice_name, DrumVoice, TomRegister};
pub use event::{ChordEvent, DrumHit, NoteEvent, DEFAULT_VELOCITY};
pub use tempo::{TempoMeter, MAX_LOOP_SECONDS};
pub use track::{DrumPattern, Pattern, PatternFile, TrackKind};

/// Standard note names for log output.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Highest valid MIDI note or velocity value.
pub const MIDI_MAX: u8 = 127;

/// Converts a MIDI note number to a note name with octave, e.g. "C4".
///
/// Values above 127 are clamped.
///
/// # Examples
///
/// ```
/// use loopsynth::pattern::note_to_name;
///
/// assert_eq!(note_to_name(60), "C4");
/// assert_eq!(note_to_name(69), "A4");
/// ```
pub fn note_to_name(note: u8) -> String {
    let note = note.min(MIDI_MAX);
    let octave = (note / 12) as i8 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}

/// Returns the length of one beat in seconds.
pub fn seconds_per_beat(tempo_bpm: f64) -> f64 {
    60.0 / tempo_bpm
}

/// Converts a beat offset to seconds at the given tempo.
///
/// # Examples
///
/// ```
/// use loopsynth::pattern::beats_to_seconds;
///
/// // One beat at 120 BPM lasts half a second
/// assert_eq!(beats_to_seconds(1.0, 120.0), 0.5);
/// ```
pub fn beats_to_seconds(beats: f64, tempo_bpm: f64) -> f64 {
    beats / tempo_bpm * 60.0
}

/// Equal-tempered frequency of a MIDI note, with A4 (69) at 440 Hz.
///
/// Notes above 127 are clamped to 127.
pub fn midi_to_frequency(pitch: u8) -> f32 {
    let pitch = pitch.min(MIDI_MAX) as f32;
    440.0 * 2.0_f32.powf((pitch - 69.0) / 12.0)
}
