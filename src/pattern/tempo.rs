//! Tempo and meter settings for a looping pattern.

use super::seconds_per_beat;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Longest loop the transport will schedule, in seconds.
pub const MAX_LOOP_SECONDS: f64 = 86_400.0;

/// Tempo and loop length of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoMeter {
    /// Tempo in beats per minute.
    pub tempo_bpm: f64,

    /// Number of bars in one loop iteration.
    pub bars: u32,

    /// Beats in each bar.
    pub beats_per_bar: f64,
}

impl TempoMeter {
    pub fn new(tempo_bpm: f64, bars: u32, beats_per_bar: f64) -> Self {
        Self {
            tempo_bpm,
            bars,
            beats_per_bar,
        }
    }

    /// Number of beats in one loop iteration.
    pub fn beats_per_loop(&self) -> f64 {
        self.bars as f64 * self.beats_per_bar
    }

    /// Raw loop length in seconds, without validation.
    pub fn loop_duration_seconds(&self) -> f64 {
        seconds_per_beat(self.tempo_bpm) * self.beats_per_loop()
    }

    /// Returns the loop length, or [`EngineError::InvalidLoopDuration`] if any
    /// field is non-finite or non-positive, or the loop is longer than
    /// [`MAX_LOOP_SECONDS`].
    pub fn validated_loop_duration(&self) -> Result<f64, EngineError> {
        let duration = self.loop_duration_seconds();
        let valid = self.tempo_bpm.is_finite()
            && self.tempo_bpm > 0.0
            && self.bars > 0
            && self.beats_per_bar.is_finite()
            && self.beats_per_bar > 0.0
            && duration.is_finite()
            && duration > 0.0
            && duration <= MAX_LOOP_SECONDS;

        if valid {
            Ok(duration)
        } else {
            Err(EngineError::InvalidLoopDuration {
                duration,
                tempo_bpm: self.tempo_bpm,
                bars: self.bars,
                beats_per_bar: self.beats_per_bar,
            })
        }
    }
}

impl Default for TempoMeter {
    /// 120 BPM, one bar of 4/4.
    fn default() -> Self {
        Self::new(120.0, 1, 4.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_duration() {
        let cases = [
            (120.0, 1, 4.0),
            (90.0, 2, 4.0),
            (174.0, 8, 4.0),
            (60.0, 3, 3.0),
            (133.3, 5, 7.0),
            (72.5, 4, 6.0),
        ];
        for (tempo, bars, bpb) in cases {
            let tm = TempoMeter::new(tempo, bars, bpb);
            let expected = bars as f64 * bpb * 60.0 / tempo;
            let actual = tm.validated_loop_duration().unwrap();
            assert!((actual - expected).abs() < 1e-9, "{tempo} {bars} {bpb}");
        }
    }

    #[test]
    fn test_invalid_loop_duration() {
        let bad = [
            TempoMeter::new(120.0, 0, 4.0),
            TempoMeter::new(0.0, 1, 4.0),
            TempoMeter::new(-100.0, 1, 4.0),
            TempoMeter::new(120.0, 1, 0.0),
            TempoMeter::new(f64::NAN, 1, 4.0),
            TempoMeter::new(120.0, 1, f64::INFINITY),
            TempoMeter::new(1e-18, 1, 4.0),
            TempoMeter::new(1e-300, 1, 4.0),
        ];
        for tm in bad {
            assert!(matches!(
                tm.validated_loop_duration(),
                Err(EngineError::InvalidLoopDuration { .. })
            ));
        }
    }

    #[test]
    fn test_very_slow_tempo_is_bounded() {
        // 0.01 BPM: 24000s loop, still schedulable
        let slow = TempoMeter::new(0.01, 1, 4.0);
        assert!((slow.validated_loop_duration().unwrap() - 24_000.0).abs() < 1e-6);

        // 0.001 BPM: 240000s, longer than a day
        let err = TempoMeter::new(0.001, 1, 4.0)
            .validated_loop_duration()
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidLoopDuration { duration, .. } if duration > MAX_LOOP_SECONDS
        ));
    }

    #[test]
    fn test_from_json() {
        let tm: TempoMeter =
            serde_json::from_str(r#"{ "tempoBpm": 100, "bars": 2, "beatsPerBar": 4 }"#).unwrap();
        assert_eq!(tm, TempoMeter::new(100.0, 2, 4.0));
        assert_eq!(tm.beats_per_loop(), 8.0);
    }
}
