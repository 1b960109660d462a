//! Audio output and synthesis.
//!
//! This module provides the sound-producing half of the engine:
//! - An output device session over rodio, or an offline device for rendering
//! - A software mixer whose rendered frame count is the device clock
//! - Procedural voices (oscillators and noise buffers) per note or drum hit
//! - Gain envelopes and frequency sweeps
//! - WAV rendering of a looped pattern

pub mod device;
pub mod envelope;
pub mod export;
pub mod mixer;
pub mod synth;

pub use device::{
    DeviceHandle, DeviceSession, OfflineBackend, OutputBackend, OutputGuard, RodioBackend,
    SAMPLE_RATE,
};
pub use envelope::{clamp_frequency, DecayEnvelope, FrequencyRamp, GainEnvelope};
pub use export::render_to_wav;
pub use mixer::{Mixer, MixerSource, SharedMixer, VoiceId, CHANNELS};
pub use synth::{build_voice, build_voice_with, Layer, SourceNode, VoiceGraph, VoiceSpec, Waveform};
