//! Audio device session.
//!
//! Owns the platform output stream and the [`Mixer`] acting as master bus.
//! The device is opened lazily, starts suspended, and can be closed and
//! transparently reopened by the next `acquire()`.

use super::envelope::GainEnvelope;
use super::mixer::{lock_mixer, Mixer, MixerSource, SharedMixer, VoiceId};
use super::synth::VoiceGraph;
use crate::error::{EngineError, NodeError};
use rodio::OutputStream;
use std::any::Any;
use std::sync::{Arc, Mutex};

/// Sample rate requested from the platform output.
pub const SAMPLE_RATE: u32 = 44100;

/// Keeps a platform stream alive for as long as the device is open.
pub struct OutputGuard(#[allow(dead_code)] Option<Box<dyn Any>>);

impl OutputGuard {
    /// A guard for backends without a platform stream.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<T: Any>(stream: T) -> Self {
        Self(Some(Box::new(stream)))
    }
}

/// Platform audio output.
pub trait OutputBackend {
    /// Sample rate the mixer should render at.
    fn sample_rate(&self) -> u32;

    /// Starts pulling audio from `mixer`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DeviceUnavailable`] if there is no usable
    /// output.
    fn connect(&mut self, mixer: SharedMixer) -> Result<OutputGuard, EngineError>;
}

/// The system's default output device, via rodio.
#[derive(Debug, Default)]
pub struct RodioBackend;

impl OutputBackend for RodioBackend {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn connect(&mut self, mixer: SharedMixer) -> Result<OutputGuard, EngineError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;
        handle
            .play_raw(MixerSource::new(mixer))
            .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;
        Ok(OutputGuard::new((stream, handle)))
    }
}

/// A device with no platform stream.
///
/// The clock only advances when the host renders through
/// [`DeviceHandle::render`]. Used for file rendering and headless hosts.
#[derive(Debug, Clone)]
pub struct OfflineBackend {
    sample_rate: u32,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl OutputBackend for OfflineBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn connect(&mut self, _mixer: SharedMixer) -> Result<OutputGuard, EngineError> {
        Ok(OutputGuard::none())
    }
}

/// Cloneable access to an open device's master bus and clock.
#[derive(Clone)]
pub struct DeviceHandle {
    mixer: SharedMixer,
}

impl DeviceHandle {
    fn new(mixer: SharedMixer) -> Self {
        Self { mixer }
    }

    /// Monotonic device clock in seconds.
    pub fn current_time(&self) -> f64 {
        lock_mixer(&self.mixer).current_time()
    }

    pub fn sample_rate(&self) -> u32 {
        lock_mixer(&self.mixer).sample_rate()
    }

    pub fn is_suspended(&self) -> bool {
        lock_mixer(&self.mixer).is_suspended()
    }

    /// True once the owning session has closed this device.
    pub fn is_closed(&self) -> bool {
        lock_mixer(&self.mixer).is_closed()
    }

    /// Returns true if both handles refer to the same open device.
    pub fn same_device(&self, other: &DeviceHandle) -> bool {
        Arc::ptr_eq(&self.mixer, &other.mixer)
    }

    /// Number of voices connected to the master bus.
    pub fn voice_count(&self) -> usize {
        lock_mixer(&self.mixer).voice_count()
    }

    pub fn voice_envelope(&self, id: VoiceId) -> Option<GainEnvelope> {
        lock_mixer(&self.mixer).voice_envelope(id)
    }

    /// Wires a voice through its envelope into the master bus and schedules
    /// it between `start` and `stop`.
    pub fn play(&self, graph: VoiceGraph, envelope: GainEnvelope, start: f64, stop: f64) -> VoiceId {
        lock_mixer(&self.mixer).add_voice(graph, envelope, start, stop)
    }

    /// Stops a voice at `when` (or now, if earlier).
    pub fn stop(&self, id: VoiceId, when: f64) -> Result<(), NodeError> {
        lock_mixer(&self.mixer).stop_voice(id, when)
    }

    pub fn disconnect(&self, id: VoiceId) -> Result<(), NodeError> {
        lock_mixer(&self.mixer).disconnect(id)
    }

    /// Renders interleaved frames directly, advancing the clock.
    ///
    /// Only meaningful on an offline device; a platform stream renders on
    /// its own.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        lock_mixer(&self.mixer).render(out, channels);
    }

    /// Renders and discards `seconds` of audio.
    pub fn advance(&self, seconds: f64) {
        const CHUNK: usize = 1024;
        let mut mixer = lock_mixer(&self.mixer);
        let mut remaining = (seconds.max(0.0) * mixer.sample_rate() as f64).round() as usize;
        let mut scratch = [0.0f32; CHUNK];
        while remaining > 0 {
            let n = remaining.min(CHUNK);
            mixer.render(&mut scratch[..n], 1);
            remaining -= n;
        }
    }

    fn resume(&self) {
        lock_mixer(&self.mixer).resume();
    }

    fn suspend(&self) {
        lock_mixer(&self.mixer).suspend();
    }

    fn close(&self) {
        lock_mixer(&self.mixer).close();
    }
}

struct OpenDevice {
    handle: DeviceHandle,
    _guard: OutputGuard,
}

/// Lifecycle owner of the output device.
pub struct DeviceSession {
    backend: Box<dyn OutputBackend>,
    master_gain: f32,
    open: Option<OpenDevice>,
}

impl DeviceSession {
    pub fn new(backend: Box<dyn OutputBackend>, master_gain: f32) -> Self {
        Self {
            backend,
            master_gain,
            open: None,
        }
    }

    /// Returns the open device, opening (or reopening) it if needed.
    pub fn acquire(&mut self) -> Result<DeviceHandle, EngineError> {
        if let Some(open) = &self.open {
            if !open.handle.is_closed() {
                return Ok(open.handle.clone());
            }
        }

        let mixer: SharedMixer = Arc::new(Mutex::new(Mixer::new(
            self.backend.sample_rate(),
            self.master_gain,
        )));
        let guard = self.backend.connect(Arc::clone(&mixer))?;
        let handle = DeviceHandle::new(mixer);
        tracing::info!(
            sample_rate = handle.sample_rate(),
            "Opened audio device"
        );
        self.open = Some(OpenDevice {
            handle: handle.clone(),
            _guard: guard,
        });
        Ok(handle)
    }

    /// The open device, if any, without opening one.
    pub fn handle(&self) -> Option<&DeviceHandle> {
        self.open.as_ref().map(|open| &open.handle)
    }

    /// Device clock, or zero if no device is open.
    pub fn current_time(&self) -> f64 {
        self.handle().map_or(0.0, DeviceHandle::current_time)
    }

    /// Opens the device if needed and starts its output.
    pub fn resume_if_suspended(&mut self) -> Result<DeviceHandle, EngineError> {
        let handle = self.acquire()?;
        if handle.is_suspended() {
            handle.resume();
            tracing::debug!("Resumed audio device");
        }
        Ok(handle)
    }

    /// Pauses output; the device clock stops with it.
    pub fn suspend(&mut self) {
        if let Some(handle) = self.handle() {
            handle.suspend();
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle().is_some_and(|h| !h.is_closed())
    }

    /// Closes the device. Outstanding handles become invalid.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.handle.close();
            tracing::info!("Closed audio device");
        }
    }
}
