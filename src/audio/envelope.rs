//! Time-varying curves: frequency sweeps, built-in voice decays and the
//! per-event gain envelope.

use crate::error::RampError;

/// Lowest frequency any voice may produce.
pub const MIN_FREQUENCY: f32 = 20.0;

/// Highest frequency any voice may produce.
pub const MAX_FREQUENCY: f32 = 20_000.0;

/// Substitute for a frequency that computed to NaN or infinity.
pub const FALLBACK_FREQUENCY: f32 = 440.0;

/// Clamps a frequency to the audible range, replacing non-finite values.
pub fn clamp_frequency(freq: f32) -> f32 {
    if freq.is_finite() {
        freq.clamp(MIN_FREQUENCY, MAX_FREQUENCY)
    } else {
        FALLBACK_FREQUENCY
    }
}

/// Oscillator frequency over the life of a voice.
///
/// Sweeps exponentially from `start` to `end` over `duration` seconds and
/// holds `end` afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRamp {
    start: f32,
    end: f32,
    duration: f32,
}

impl FrequencyRamp {
    /// A fixed pitch.
    pub fn constant(freq: f32) -> Self {
        let freq = clamp_frequency(freq);
        Self {
            start: freq,
            end: freq,
            duration: 0.0,
        }
    }

    /// An exponential sweep. Both ends are clamped to the audible range.
    pub fn exponential(start: f32, end: f32, duration: f32) -> Self {
        Self {
            start: clamp_frequency(start),
            end: clamp_frequency(end),
            duration: if duration.is_finite() {
                duration.max(0.0)
            } else {
                0.0
            },
        }
    }

    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn end(&self) -> f32 {
        self.end
    }

    /// Frequency `t` seconds after the voice starts.
    pub fn at(&self, t: f32) -> f32 {
        if self.duration <= 0.0 || t >= self.duration {
            return self.end;
        }
        let progress = (t / self.duration).max(0.0);
        clamp_frequency(self.start * (self.end / self.start).powf(progress))
    }
}

/// Exponential amplitude decay built into a voice, independent of the
/// outer gain envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayEnvelope {
    time_constant: f32,
}

impl DecayEnvelope {
    /// `time_constant` is the time in seconds to fall to 1/e.
    pub fn new(time_constant: f32) -> Self {
        Self {
            time_constant: time_constant.max(1e-4),
        }
    }

    pub fn time_constant(&self) -> f32 {
        self.time_constant
    }

    pub fn level(&self, t: f32) -> f32 {
        (-t.max(0.0) / self.time_constant).exp()
    }
}

/// Gain curve applied to every scheduled event.
///
/// Attack is instant; the level then releases from `peak` at `start` to the
/// floor (exponential) or to silence (linear) at `end`. Times are absolute
/// device-clock seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainEnvelope {
    Exponential {
        peak: f32,
        floor: f32,
        start: f64,
        end: f64,
    },
    Linear {
        peak: f32,
        start: f64,
        end: f64,
    },
}

impl GainEnvelope {
    /// Exponential release. Fails if either level is not strictly positive,
    /// since an exponential curve cannot reach or leave zero.
    pub fn exponential(peak: f32, floor: f32, start: f64, end: f64) -> Result<Self, RampError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(peak) || !positive(floor) {
            return Err(RampError {
                from: peak,
                to: floor,
            });
        }
        Ok(GainEnvelope::Exponential {
            peak,
            floor: floor.min(peak),
            start,
            end,
        })
    }

    /// Linear release to zero.
    pub fn linear(peak: f32, start: f64, end: f64) -> Self {
        GainEnvelope::Linear {
            peak: if peak.is_finite() { peak.max(0.0) } else { 0.0 },
            start,
            end,
        }
    }

    pub fn peak(&self) -> f32 {
        match *self {
            GainEnvelope::Exponential { peak, .. } | GainEnvelope::Linear { peak, .. } => peak,
        }
    }

    /// Gain at absolute time `time`. Zero before the start.
    pub fn level_at(&self, time: f64) -> f32 {
        match *self {
            GainEnvelope::Exponential {
                peak,
                floor,
                start,
                end,
            } => {
                if time < start {
                    0.0
                } else if time >= end {
                    floor
                } else {
                    let progress = ((time - start) / (end - start)) as f32;
                    peak * (floor / peak).powf(progress)
                }
            }
            GainEnvelope::Linear { peak, start, end } => {
                if time < start || time >= end {
                    0.0
                } else {
                    let progress = ((time - start) / (end - start)) as f32;
                    peak * (1.0 - progress)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_frequency() {
        assert_eq!(clamp_frequency(5.0), MIN_FREQUENCY);
        assert_eq!(clamp_frequency(50_000.0), MAX_FREQUENCY);
        assert_eq!(clamp_frequency(f32::NAN), FALLBACK_FREQUENCY);
        assert_eq!(clamp_frequency(f32::INFINITY), FALLBACK_FREQUENCY);
        assert_eq!(clamp_frequency(1000.0), 1000.0);
    }

    #[test]
    fn test_frequency_sweep() {
        let ramp = FrequencyRamp::exponential(150.0, 50.0, 0.12);
        assert!((ramp.at(0.0) - 150.0).abs() < 1e-3);
        let mid = ramp.at(0.06);
        assert!((mid - (150.0_f32 * 50.0).sqrt()).abs() < 0.1);
        assert_eq!(ramp.at(0.12), 50.0);
        assert_eq!(ramp.at(1.0), 50.0);
    }

    #[test]
    fn test_decay_envelope() {
        let env = DecayEnvelope::new(0.1);
        assert_eq!(env.level(0.0), 1.0);
        assert!((env.level(0.1) - (-1.0_f32).exp()).abs() < 1e-6);
        assert!(env.level(1.0) < 1e-4);
    }

    #[test]
    fn test_exponential_release() {
        let env = GainEnvelope::exponential(0.5, 0.001, 10.0, 11.0).unwrap();
        assert_eq!(env.level_at(9.9), 0.0);
        assert!((env.level_at(10.0) - 0.5).abs() < 1e-6);
        let half = env.level_at(10.5);
        assert!((half - (0.5_f32 * 0.001).sqrt()).abs() < 1e-4);
        assert_eq!(env.level_at(11.0), 0.001);
    }

    #[test]
    fn test_exponential_rejects_zero() {
        assert!(GainEnvelope::exponential(0.0, 0.001, 0.0, 1.0).is_err());
        assert!(GainEnvelope::exponential(0.5, 0.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_linear_release() {
        let env = GainEnvelope::linear(0.4, 0.0, 2.0);
        assert!((env.level_at(0.0) - 0.4).abs() < 1e-6);
        assert!((env.level_at(1.0) - 0.2).abs() < 1e-6);
        assert_eq!(env.level_at(2.0), 0.0);
    }
}
