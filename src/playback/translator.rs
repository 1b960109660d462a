//! Expansion of one loop iteration of a pattern into sound events.

use super::scheduler::SoundEvent;
use crate::audio::VoiceSpec;
use crate::pattern::{beats_to_seconds, note_to_name, DrumVoice, Pattern, TrackKind};

/// Events of one iteration, in pattern order, plus how many were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub events: Vec<SoundEvent>,
    pub skipped: usize,
}

impl Translation {
    fn push(
        &mut self,
        voice: VoiceSpec,
        start_beat: f64,
        duration_beats: f64,
        velocity: u8,
        ctx: &Context<'_>,
        label: &dyn Fn() -> String,
    ) {
        if !start_beat.is_finite() || start_beat < 0.0 {
            tracing::warn!(track = %ctx.track, event = %label(), start_beat, "Skipping event with invalid start");
            self.skipped += 1;
            return;
        }
        if !duration_beats.is_finite() || duration_beats <= 0.0 {
            tracing::warn!(track = %ctx.track, event = %label(), duration_beats, "Skipping event with invalid duration");
            self.skipped += 1;
            return;
        }

        self.events.push(SoundEvent {
            voice,
            start_time: ctx.iteration_start + beats_to_seconds(start_beat, ctx.tempo_bpm),
            duration: beats_to_seconds(duration_beats, ctx.tempo_bpm),
            velocity,
        });
    }
}

struct Context<'a> {
    track: &'a str,
    tempo_bpm: f64,
    iteration_start: f64,
}

/// Converts every event of `pattern` into a [`SoundEvent`] starting at
/// `iteration_start` plus its beat offset.
///
/// Chord pitches become independent tonal events. Drum lanes resolve through
/// the alias table once per lane. Events with missing, NaN or negative
/// timing are logged and skipped; the rest of the pattern is unaffected.
/// With a `filter`, only that track is expanded.
pub fn translate(
    pattern: &Pattern,
    tempo_bpm: f64,
    iteration_start: f64,
    filter: Option<TrackKind>,
) -> Translation {
    let mut out = Translation::default();
    let wanted = |kind: TrackKind| filter.map_or(true, |f| f == kind);

    if wanted(TrackKind::Chords) {
        let ctx = Context {
            track: "chords",
            tempo_bpm,
            iteration_start,
        };
        for chord in &pattern.chords {
            for &pitch in &chord.notes {
                out.push(
                    VoiceSpec::Tonal { pitch },
                    chord.start_beat,
                    chord.duration_beats,
                    chord.velocity,
                    &ctx,
                    &|| note_to_name(pitch),
                );
            }
        }
    }

    for (kind, notes) in [
        (TrackKind::Bassline, &pattern.bassline),
        (TrackKind::Melody, &pattern.melody),
    ] {
        if !wanted(kind) {
            continue;
        }
        let ctx = Context {
            track: kind.as_str(),
            tempo_bpm,
            iteration_start,
        };
        for note in notes {
            out.push(
                VoiceSpec::Tonal { pitch: note.pitch },
                note.start_beat,
                note.duration_beats,
                note.velocity,
                &ctx,
                &|| note_to_name(note.pitch),
            );
        }
    }

    if wanted(TrackKind::Drums) {
        for (name, hits) in pattern.drums.lanes() {
            let voice = match DrumVoice::lookup(name) {
                Some(voice) => voice,
                None => {
                    tracing::debug!(lane = name, "Unknown drum voice, using generic percussion");
                    DrumVoice::GenericPercussion
                }
            };
            let ctx = Context {
                track: "drums",
                tempo_bpm,
                iteration_start,
            };
            for hit in hits {
                out.push(
                    VoiceSpec::Drum(voice),
                    hit.start_beat,
                    hit.duration_beats,
                    hit.velocity,
                    &ctx,
                    &|| name.to_string(),
                );
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{ChordEvent, DrumHit, NoteEvent, TomRegister};

    #[test]
    fn test_chord_expands_to_tonal_events() {
        let mut pattern = Pattern::new();
        pattern.chords.push(ChordEvent::new(vec![60, 64, 67], 0.0, 1.0));

        let t = translate(&pattern, 120.0, 10.0, None);
        assert_eq!(t.events.len(), 3);
        assert_eq!(t.skipped, 0);
        let pitches: Vec<_> = t
            .events
            .iter()
            .map(|e| match e.voice {
                VoiceSpec::Tonal { pitch } => pitch,
                _ => panic!("chord produced a drum"),
            })
            .collect();
        assert_eq!(pitches, vec![60, 64, 67]);
        for e in &t.events {
            assert_eq!(e.start_time, 10.0);
            assert!((e.duration - 0.5).abs() < 1e-12);
            assert_eq!(e.velocity, 100);
        }
    }

    #[test]
    fn test_beat_offsets_become_seconds() {
        let mut pattern = Pattern::new();
        pattern.bassline.push(NoteEvent::new(36, 2.0, 1.0));
        pattern.melody.push(NoteEvent::new(72, 3.5, 0.5).with_velocity(64));

        let t = translate(&pattern, 90.0, 0.0, None);
        assert_eq!(t.events.len(), 2);
        assert!((t.events[0].start_time - 2.0 * 60.0 / 90.0).abs() < 1e-12);
        assert!((t.events[1].start_time - 3.5 * 60.0 / 90.0).abs() < 1e-12);
        assert_eq!(t.events[1].velocity, 64);
    }

    #[test]
    fn test_drum_aliases_resolve() {
        let mut pattern = Pattern::new();
        pattern.drums.add_hit("Bass Drum", DrumHit::new(0.0, 0.5));
        pattern.drums.add_hit("hand clap", DrumHit::new(1.0, 0.5));
        pattern.drums.add_hit("Low Tom", DrumHit::new(2.0, 0.5));

        let t = translate(&pattern, 120.0, 0.0, None);
        let voices: Vec<_> = t.events.iter().map(|e| e.voice).collect();
        assert!(voices.contains(&VoiceSpec::Drum(DrumVoice::Kick)));
        assert!(voices.contains(&VoiceSpec::Drum(DrumVoice::Clap)));
        assert!(voices.contains(&VoiceSpec::Drum(DrumVoice::Tom(TomRegister::Low))));
    }

    #[test]
    fn test_unknown_drum_uses_generic_percussion() {
        let mut pattern = Pattern::new();
        pattern.drums.add_hit("tabla", DrumHit::new(0.0, 0.25));

        let t = translate(&pattern, 120.0, 0.0, None);
        assert_eq!(t.events.len(), 1);
        assert_eq!(t.events[0].voice, VoiceSpec::Drum(DrumVoice::GenericPercussion));
    }

    #[test]
    fn test_malformed_events_are_skipped() {
        let mut pattern = Pattern::new();
        for i in 0..9 {
            pattern.drums.add_hit("kick", DrumHit::new(i as f64 * 0.5, 0.25));
        }
        pattern.drums.add_hit("kick", DrumHit::new(1.0, f64::NAN));
        pattern.melody.push(NoteEvent::new(60, f64::NAN, 1.0));
        pattern.melody.push(NoteEvent::new(60, -1.0, 1.0));

        let t = translate(&pattern, 120.0, 0.0, None);
        assert_eq!(t.events.len(), 9);
        assert_eq!(t.skipped, 3);
    }

    #[test]
    fn test_track_filter() {
        let mut pattern = Pattern::new();
        pattern.chords.push(ChordEvent::new(vec![60, 64], 0.0, 4.0));
        pattern.bassline.push(NoteEvent::new(36, 0.0, 1.0));
        pattern.melody.push(NoteEvent::new(72, 0.0, 1.0));
        pattern.drums.add_hit("snare", DrumHit::new(1.0, 0.25));

        assert_eq!(translate(&pattern, 120.0, 0.0, None).events.len(), 5);
        assert_eq!(
            translate(&pattern, 120.0, 0.0, Some(TrackKind::Chords)).events.len(),
            2
        );
        let drums = translate(&pattern, 120.0, 0.0, Some(TrackKind::Drums));
        assert_eq!(drums.events.len(), 1);
        assert!(drums.events[0].voice.is_drum());
        assert_eq!(
            translate(&pattern, 120.0, 0.0, Some(TrackKind::Melody)).events[0].voice,
            VoiceSpec::Tonal { pitch: 72 }
        );
    }
}
