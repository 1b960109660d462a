//! Submission of single sound events to the device.

use super::registry::{ActiveSource, Registry, SourceKey, VoiceKind};
use crate::audio::{build_voice, DeviceHandle, GainEnvelope, VoiceSpec};
use crate::config::EngineConfig;
use crate::error::ScheduleError;
use crate::pattern::MIDI_MAX;

/// One sound at an absolute device time.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundEvent {
    pub voice: VoiceSpec,
    /// Absolute device-clock start, in seconds.
    pub start_time: f64,
    /// Length in seconds.
    pub duration: f64,
    pub velocity: u8,
}

impl SoundEvent {
    pub fn kind(&self) -> VoiceKind {
        if self.voice.is_drum() {
            VoiceKind::Drum
        } else {
            VoiceKind::Tonal
        }
    }
}

/// Validates an event, builds its voice and envelope, plays it on the device
/// and registers it for cleanup.
///
/// # Errors
///
/// [`ScheduleError::Skipped`] for unusable fields and
/// [`ScheduleError::Stale`] for events starting more than the configured
/// tolerance in the past. Nothing is played in either case.
pub fn schedule_event(
    event: &SoundEvent,
    device: &DeviceHandle,
    registry: &mut Registry,
    config: &EngineConfig,
) -> Result<SourceKey, ScheduleError> {
    if !event.duration.is_finite() || event.duration <= 0.0 {
        return Err(ScheduleError::Skipped(format!(
            "duration must be positive, got {}",
            event.duration
        )));
    }
    if event.velocity > MIDI_MAX {
        return Err(ScheduleError::Skipped(format!(
            "velocity {} out of range",
            event.velocity
        )));
    }
    if !event.start_time.is_finite() {
        return Err(ScheduleError::Skipped(format!(
            "start time must be finite, got {}",
            event.start_time
        )));
    }

    let now = device.current_time();
    if event.start_time < now - config.stale_tolerance_secs {
        return Err(ScheduleError::Stale {
            start: event.start_time,
            now,
        });
    }

    let kind = event.kind();
    let track_gain = match kind {
        VoiceKind::Drum => config.drum_gain,
        VoiceKind::Tonal => config.tonal_gain,
    };
    let peak = event.velocity as f32 / MIDI_MAX as f32 * track_gain;
    let start = event.start_time;
    let stop = start + event.duration;

    let envelope = release_envelope(peak, config.release_floor, start, stop);

    let graph = build_voice(event.voice, event.duration as f32, device.sample_rate());
    let voice = device.play(graph, envelope, start, stop);

    Ok(registry.add(ActiveSource {
        voice,
        envelope_gain: peak,
        kind,
        scheduled_stop_time: stop,
    }))
}

/// Exponential release from `peak` to `floor`, or a linear release to
/// silence when either level rules out an exponential curve.
pub fn release_envelope(peak: f32, floor: f32, start: f64, stop: f64) -> GainEnvelope {
    match GainEnvelope::exponential(peak, floor, start, stop) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, "Using linear release");
            GainEnvelope::linear(peak, start, stop)
        }
    }
}
