//! Procedural voice synthesis.
//!
//! Every sound is built from scratch per event: a band-limited sawtooth for
//! tonal notes, and sine sweeps, noise bursts and sine partials for drums.
//! Construction is a pure function of the voice, its duration and the device
//! sample rate; the returned [`VoiceGraph`] carries its own render state.

use super::envelope::{clamp_frequency, DecayEnvelope, FrequencyRamp};
use crate::pattern::{midi_to_frequency, DrumVoice, MIDI_MAX};
use rand::Rng;
use std::f32::consts::TAU;

/// Longest noise buffer for snare, clap and generic percussion.
pub const SHORT_NOISE_CAP_SECS: f32 = 2.0;

/// Longest noise buffer for hats and cymbals.
pub const LONG_NOISE_CAP_SECS: f32 = 3.0;

/// What a scheduled event should sound like.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceSpec {
    /// A pitched note, by MIDI number.
    Tonal { pitch: u8 },
    /// A drum voice.
    Drum(DrumVoice),
}

impl VoiceSpec {
    pub fn is_drum(&self) -> bool {
        matches!(self, VoiceSpec::Drum(_))
    }
}

/// Oscillator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    /// PolyBLEP band-limited sawtooth.
    Saw,
}

/// A sound-generating unit.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceNode {
    Oscillator {
        waveform: Waveform,
        frequency: FrequencyRamp,
    },
    /// Pre-rendered samples at the device rate; silent once exhausted.
    Buffer(Vec<f32>),
}

/// One source with its mix level and optional built-in decay.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub source: SourceNode,
    pub gain: f32,
    pub decay: Option<DecayEnvelope>,
    phase: f32,
}

impl Layer {
    pub fn new(source: SourceNode, gain: f32) -> Self {
        Self {
            source,
            gain,
            decay: None,
            phase: 0.0,
        }
    }

    pub fn with_decay(mut self, decay: DecayEnvelope) -> Self {
        self.decay = Some(decay);
        self
    }

    fn sample(&mut self, index: u64, sample_rate: f32) -> f32 {
        let t = index as f32 / sample_rate;
        let raw = match &self.source {
            SourceNode::Oscillator {
                waveform,
                frequency,
            } => {
                let freq = frequency.at(t);
                let inc = freq / sample_rate;
                let value = match waveform {
                    Waveform::Sine => (self.phase * TAU).sin(),
                    Waveform::Saw => 2.0 * self.phase - 1.0 - poly_blep(self.phase, inc),
                };
                self.phase += inc;
                if self.phase >= 1.0 {
                    self.phase -= self.phase.floor();
                }
                value
            }
            SourceNode::Buffer(samples) => samples.get(index as usize).copied().unwrap_or(0.0),
        };
        let decay = self.decay.map_or(1.0, |d| d.level(t));
        raw * self.gain * decay
    }
}

/// PolyBLEP residual for a sawtooth discontinuity at phase 0.
fn poly_blep(phase: f32, inc: f32) -> f32 {
    if inc <= 0.0 {
        0.0
    } else if phase < inc {
        let t = phase / inc;
        t + t - t * t - 1.0
    } else if phase > 1.0 - inc {
        let t = (phase - 1.0) / inc;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

/// A complete voice: layers summed sample by sample.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceGraph {
    layers: Vec<Layer>,
    position: u64,
}

impl VoiceGraph {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self {
            layers,
            position: 0,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Renders the next sample and advances the voice.
    pub fn next_sample(&mut self, sample_rate: f32) -> f32 {
        let index = self.position;
        self.position += 1;
        self.layers
            .iter_mut()
            .map(|layer| layer.sample(index, sample_rate))
            .sum()
    }
}

/// Builds a voice for one event.
///
/// `duration` is the event length in seconds; it bounds noise buffer sizes
/// and sweep lengths.
pub fn build_voice(spec: VoiceSpec, duration: f32, sample_rate: u32) -> VoiceGraph {
    let mut rng = rand::thread_rng();
    build_voice_with(spec, duration, sample_rate, &mut rng)
}

/// [`build_voice`] with an explicit random source for the noise layers.
pub fn build_voice_with<R: Rng>(
    spec: VoiceSpec,
    duration: f32,
    sample_rate: u32,
    rng: &mut R,
) -> VoiceGraph {
    let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
    let sr = sample_rate.max(1) as f32;

    match spec {
        VoiceSpec::Tonal { pitch } => tonal(pitch),
        VoiceSpec::Drum(DrumVoice::Kick) => kick(duration),
        VoiceSpec::Drum(DrumVoice::Snare) => VoiceGraph::new(vec![Layer::new(
            SourceNode::Buffer(noise_buffer(duration, SHORT_NOISE_CAP_SECS, sr, 0.05, None, rng)),
            1.0,
        )]),
        VoiceSpec::Drum(DrumVoice::Clap) => VoiceGraph::new(vec![Layer::new(
            SourceNode::Buffer(noise_buffer(
                duration,
                SHORT_NOISE_CAP_SECS,
                sr,
                0.03,
                Some(clap_gate),
                rng,
            )),
            1.0,
        )]),
        VoiceSpec::Drum(DrumVoice::HiHat { open }) => {
            let decay = if open { 0.15 } else { 0.03 };
            metallic_noise(duration, sr, decay, &[(4000.0, 0.12), (5300.0, 0.08)], rng)
        }
        VoiceSpec::Drum(DrumVoice::Cymbal { ride: false }) => {
            metallic_noise(duration, sr, 0.4, &[(3500.0, 0.1), (4700.0, 0.08)], rng)
        }
        VoiceSpec::Drum(DrumVoice::Cymbal { ride: true }) => {
            let fundamental = 3200.0;
            metallic_noise(
                duration,
                sr,
                0.25,
                &[(fundamental, 0.12), (fundamental * 2.5, 0.1)],
                rng,
            )
        }
        VoiceSpec::Drum(DrumVoice::Tom(register)) => {
            let start = register.start_frequency();
            VoiceGraph::new(vec![Layer::new(
                SourceNode::Oscillator {
                    waveform: Waveform::Sine,
                    frequency: FrequencyRamp::exponential(start, start / 2.0, duration.min(0.3)),
                },
                1.0,
            )
            .with_decay(DecayEnvelope::new(0.15))])
        }
        VoiceSpec::Drum(DrumVoice::Metallic) => VoiceGraph::new(vec![Layer::new(
            SourceNode::Oscillator {
                waveform: Waveform::Sine,
                frequency: FrequencyRamp::constant(800.0),
            },
            1.0,
        )
        .with_decay(DecayEnvelope::new(0.1))]),
        VoiceSpec::Drum(DrumVoice::GenericPercussion) => VoiceGraph::new(vec![Layer::new(
            SourceNode::Buffer(noise_buffer(duration, SHORT_NOISE_CAP_SECS, sr, 0.04, None, rng)),
            1.0,
        )]),
    }
}

fn tonal(pitch: u8) -> VoiceGraph {
    let freq = clamp_frequency(midi_to_frequency(pitch.min(MIDI_MAX)));
    VoiceGraph::new(vec![Layer::new(
        SourceNode::Oscillator {
            waveform: Waveform::Saw,
            frequency: FrequencyRamp::constant(freq),
        },
        1.0,
    )])
}

fn kick(duration: f32) -> VoiceGraph {
    VoiceGraph::new(vec![Layer::new(
        SourceNode::Oscillator {
            waveform: Waveform::Sine,
            frequency: FrequencyRamp::exponential(150.0, 50.0, duration.min(0.12)),
        },
        1.0,
    )
    .with_decay(DecayEnvelope::new(0.08))])
}

/// Noise mixed with sine partials, all under one decay.
fn metallic_noise<R: Rng>(
    duration: f32,
    sr: f32,
    decay: f32,
    partials: &[(f32, f32)],
    rng: &mut R,
) -> VoiceGraph {
    let envelope = DecayEnvelope::new(decay);
    let mut layers = vec![Layer::new(
        SourceNode::Buffer(noise_buffer(duration, LONG_NOISE_CAP_SECS, sr, decay, None, rng)),
        0.7,
    )];
    layers.extend(partials.iter().map(|&(freq, gain)| {
        Layer::new(
            SourceNode::Oscillator {
                waveform: Waveform::Sine,
                frequency: FrequencyRamp::constant(freq),
            },
            gain,
        )
        .with_decay(envelope)
    }));
    VoiceGraph::new(layers)
}

/// Three quick bursts over the first 30ms, then the tail.
fn clap_gate(t: f32) -> f32 {
    const BURST_PERIOD: f32 = 0.01;
    if t < 3.0 * BURST_PERIOD && (t / BURST_PERIOD).fract() >= 0.5 {
        0.15
    } else {
        1.0
    }
}

/// Uniform noise in [-1, 1] shaped by `exp(-i / (sr * decay))`.
fn noise_buffer<R: Rng>(
    duration: f32,
    cap: f32,
    sr: f32,
    decay: f32,
    gate: Option<fn(f32) -> f32>,
    rng: &mut R,
) -> Vec<f32> {
    let len = (duration.min(cap) * sr) as usize;
    let decay_samples = sr * decay;
    (0..len)
        .map(|i| {
            let i = i as f32;
            let gate = gate.map_or(1.0, |g| g(i / sr));
            rng.gen_range(-1.0f32..=1.0) * (-i / decay_samples).exp() * gate
        })
        .collect()
}
