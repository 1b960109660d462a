//! Software mixer and device clock.
//!
//! The mixer holds every voice that has been submitted to the device, each
//! with absolute start and stop frames, and sums them into the master bus
//! when the output pulls audio. The number of frames rendered is the device
//! clock. A suspended mixer outputs silence and its clock stands still.

use super::envelope::GainEnvelope;
use super::synth::VoiceGraph;
use crate::error::NodeError;
use rodio::Source;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Frames rendered per lock of the mixer from the output thread.
const BUFFER_SIZE: usize = 256;

/// Output channel count.
pub const CHANNELS: u16 = 2;

/// Global counter for voice IDs.
/// Shared across mixers so an ID from a closed device never matches a voice
/// on its replacement.
static VOICE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies a voice submitted to a mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(u64);

impl VoiceId {
    fn next() -> Self {
        Self(VOICE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A voice wired through its envelope into the master bus.
struct MixerVoice {
    id: VoiceId,
    graph: VoiceGraph,
    envelope: GainEnvelope,
    start_frame: u64,
    stop_frame: u64,
}

/// The device's master bus.
pub struct Mixer {
    sample_rate: u32,
    frames_rendered: u64,
    suspended: bool,
    closed: bool,
    master_gain: f32,
    voices: Vec<MixerVoice>,
}

impl Mixer {
    /// Creates a mixer in the suspended state.
    pub fn new(sample_rate: u32, master_gain: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            suspended: true,
            closed: false,
            master_gain,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drops every voice and marks the mixer unusable.
    pub fn close(&mut self) {
        self.closed = true;
        self.suspended = true;
        self.voices.clear();
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Number of voices still connected, finished or not.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// The gain envelope a connected voice was scheduled with.
    pub fn voice_envelope(&self, id: VoiceId) -> Option<GainEnvelope> {
        self.voices.iter().find(|v| v.id == id).map(|v| v.envelope)
    }

    fn time_to_frame(&self, time: f64) -> u64 {
        (time.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Connects a voice and schedules it to sound from `start` to `stop`
    /// (absolute seconds). A start in the past sounds immediately.
    pub fn add_voice(
        &mut self,
        graph: VoiceGraph,
        envelope: GainEnvelope,
        start: f64,
        stop: f64,
    ) -> VoiceId {
        let id = VoiceId::next();
        let start_frame = self.time_to_frame(start);
        let stop_frame = self.time_to_frame(stop).max(start_frame);
        self.voices.push(MixerVoice {
            id,
            graph,
            envelope,
            start_frame,
            stop_frame,
        });
        id
    }

    /// Moves a voice's stop time earlier. Never extends it.
    pub fn stop_voice(&mut self, id: VoiceId, when: f64) -> Result<(), NodeError> {
        let frame = self.time_to_frame(when);
        let voice = self
            .voices
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(NodeError::NotConnected(id.0))?;
        voice.stop_frame = voice.stop_frame.min(frame);
        Ok(())
    }

    /// Removes a voice from the bus.
    pub fn disconnect(&mut self, id: VoiceId) -> Result<(), NodeError> {
        let pos = self
            .voices
            .iter()
            .position(|v| v.id == id)
            .ok_or(NodeError::NotConnected(id.0))?;
        self.voices.swap_remove(pos);
        Ok(())
    }

    /// Fills `out` with interleaved frames of `channels` channels and
    /// advances the clock. Suspended or closed mixers write silence.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        if self.suspended || self.closed || channels == 0 {
            out.fill(0.0);
            return;
        }

        let sr = self.sample_rate as f32;
        for frame in out.chunks_mut(channels) {
            let frame_index = self.frames_rendered;
            let time = frame_index as f64 / self.sample_rate as f64;
            let mut sum = 0.0f32;
            for voice in &mut self.voices {
                if frame_index < voice.start_frame || frame_index >= voice.stop_frame {
                    continue;
                }
                sum += voice.graph.next_sample(sr) * voice.envelope.level_at(time);
            }
            let sample = (sum * self.master_gain).clamp(-1.0, 1.0);
            frame.fill(sample);
            self.frames_rendered += 1;
        }
    }
}

/// A mixer shared between the control side and the output thread.
pub type SharedMixer = Arc<Mutex<Mixer>>;

/// Locks a shared mixer, recovering from a poisoned lock.
///
/// A panic on the output thread must not take scheduling down with it.
pub fn lock_mixer(mixer: &SharedMixer) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Endless rodio source that pulls stereo frames from a [`SharedMixer`].
pub struct MixerSource {
    mixer: SharedMixer,
    sample_rate: u32,
    buf: Vec<f32>,
    buf_pos: usize,
}

impl MixerSource {
    pub fn new(mixer: SharedMixer) -> Self {
        let sample_rate = lock_mixer(&mixer).sample_rate();
        let len = BUFFER_SIZE * CHANNELS as usize;
        Self {
            mixer,
            sample_rate,
            buf: vec![0.0; len],
            buf_pos: len, // Start at end to trigger first render
        }
    }
}

impl Iterator for MixerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.buf_pos >= self.buf.len() {
            if let Ok(mut mixer) = self.mixer.lock() {
                mixer.render(&mut self.buf, CHANNELS as usize);
            } else {
                self.buf.fill(0.0);
            }
            self.buf_pos = 0;
        }
        let sample = self.buf[self.buf_pos];
        self.buf_pos += 1;
        Some(sample)
    }
}

impl Source for MixerSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        CHANNELS
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
