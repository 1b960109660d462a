//! Pattern container: the four tracks of one loop iteration.

use super::event::{ChordEvent, DrumHit, NoteEvent};
use super::tempo::TempoMeter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// The tracks a pattern can contain.
///
/// Used to restrict playback to a single track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Chords,
    Bassline,
    Melody,
    Drums,
}

impl TrackKind {
    pub const ALL: [TrackKind; 4] = [
        TrackKind::Chords,
        TrackKind::Bassline,
        TrackKind::Melody,
        TrackKind::Drums,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Chords => "chords",
            TrackKind::Bassline => "bassline",
            TrackKind::Melody => "melody",
            TrackKind::Drums => "drums",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        TrackKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown track `{s}` (expected chords, bassline, melody or drums)"))
    }
}

/// Drum lanes keyed by their free-text voice name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrumPattern(BTreeMap<String, Vec<DrumHit>>);

impl DrumPattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hit to the named lane, creating it if needed.
    pub fn add_hit(&mut self, voice: impl Into<String>, hit: DrumHit) {
        self.0.entry(voice.into()).or_default().push(hit);
    }

    /// Replaces the named lane.
    pub fn set_lane(&mut self, voice: impl Into<String>, hits: Vec<DrumHit>) {
        self.0.insert(voice.into(), hits);
    }

    /// Iterates over lanes as `(voice name, hits)`.
    pub fn lanes(&self) -> impl Iterator<Item = (&str, &[DrumHit])> {
        self.0.iter().map(|(name, hits)| (name.as_str(), hits.as_slice()))
    }

    /// Total number of hits across all lanes.
    pub fn hit_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hit_count() == 0
    }
}

/// One loop iteration of symbolic music.
///
/// All timing is in beats relative to the loop start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pattern {
    pub chords: Vec<ChordEvent>,
    pub bassline: Vec<NoteEvent>,
    pub melody: Vec<NoteEvent>,
    pub drums: DrumPattern,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no track has any events.
    pub fn is_empty(&self) -> bool {
        self.event_count() == 0
    }

    /// Number of sounding voices one iteration produces (chord pitches count
    /// individually).
    pub fn event_count(&self) -> usize {
        self.chords.iter().map(|c| c.notes.len()).sum::<usize>()
            + self.bassline.len()
            + self.melody.len()
            + self.drums.hit_count()
    }

    /// Returns true if the given track has events.
    pub fn has_track(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Chords => !self.chords.is_empty(),
            TrackKind::Bassline => !self.bassline.is_empty(),
            TrackKind::Melody => !self.melody.is_empty(),
            TrackKind::Drums => !self.drums.is_empty(),
        }
    }

    /// Parses a pattern from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes the pattern to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A pattern file as produced by the generation service, optionally carrying
/// its own tempo settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternFile {
    #[serde(flatten)]
    pub pattern: Pattern,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_meter: Option<TempoMeter>,
}

impl PatternFile {
    /// Loads a pattern file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chords": [{ "startBeat": 0, "durationBeats": 4, "notes": [60, 64, 67] }],
        "bassline": [{ "startBeat": 0, "durationBeats": 1, "pitch": 36 }],
        "drums": {
            "kick": [{ "startBeat": 0, "durationBeats": 0.5 }, { "startBeat": 2, "durationBeats": 0.5 }],
            "Closed Hi-Hat": [{ "startBeat": 1, "durationBeats": 0.25, "velocity": 70 }]
        },
        "tempoMeter": { "tempoBpm": 100, "bars": 1, "beatsPerBar": 4 }
    }"#;

    #[test]
    fn test_pattern_file_parsing() {
        let file: PatternFile = serde_json::from_str(SAMPLE).unwrap();
        let pattern = &file.pattern;
        assert_eq!(pattern.chords.len(), 1);
        assert_eq!(pattern.bassline.len(), 1);
        assert!(pattern.melody.is_empty());
        assert_eq!(pattern.drums.hit_count(), 3);
        assert_eq!(pattern.event_count(), 3 + 1 + 3);
        assert_eq!(file.tempo_meter, Some(TempoMeter::new(100.0, 1, 4.0)));
        assert!(pattern.has_track(TrackKind::Drums));
        assert!(!pattern.has_track(TrackKind::Melody));
    }

    #[test]
    fn test_pattern_json_roundtrip() {
        let mut pattern = Pattern::new();
        pattern.melody.push(NoteEvent::new(72, 0.5, 0.5));
        pattern.drums.add_hit("snare", DrumHit::new(1.0, 0.25));

        let json = pattern.to_json().unwrap();
        assert_eq!(Pattern::from_json(&json).unwrap(), pattern);
    }

    #[test]
    fn test_empty_pattern() {
        let pattern = Pattern::from_json("{}").unwrap();
        assert!(pattern.is_empty());
    }

    #[test]
    fn test_track_kind_parsing() {
        assert_eq!("Drums".parse::<TrackKind>(), Ok(TrackKind::Drums));
        assert_eq!(" melody ".parse::<TrackKind>(), Ok(TrackKind::Melody));
        assert!("vocals".parse::<TrackKind>().is_err());
    }
}
