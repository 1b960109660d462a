//! Host-facing playback engine.
//!
//! An [`Engine`] owns the device session, the source registry and the loop
//! transport. The host keeps exactly one and drives it from its event loop:
//!
//! ```no_run
//! use loopsynth::{Engine, EngineConfig, Pattern, TempoMeter};
//! use std::time::Instant;
//!
//! # fn main() -> Result<(), loopsynth::EngineError> {
//! let mut engine = Engine::new(EngineConfig::default())?;
//! engine.initialize_device()?;
//! engine.start(Pattern::new(), TempoMeter::default(), None)?;
//! while engine.is_playing() {
//!     engine.poll(Instant::now())?;
//!     if let Some(deadline) = engine.next_deadline() {
//!         std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
//!     }
//! #   break;
//! }
//! engine.stop();
//! # Ok(())
//! # }
//! ```

use crate::audio::{DeviceHandle, DeviceSession, OfflineBackend, OutputBackend, RodioBackend};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pattern::{Pattern, TempoMeter, TrackKind};
use crate::playback::{deadline_after, ActiveSource, IterationReport, Registry, Transport};
use std::time::Instant;

/// The playback engine.
pub struct Engine {
    config: EngineConfig,
    device: DeviceSession,
    registry: Registry,
    transport: Transport,
    /// When the reaper next runs, while playing.
    next_reap: Option<Instant>,
}

impl Engine {
    /// Creates an engine that plays through the default output device.
    ///
    /// The device is not opened until [`initialize_device`](Self::initialize_device)
    /// or the first [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` is out of range.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_backend(config, Box::new(RodioBackend))
    }

    /// Creates an engine with no platform output, rendering at
    /// `config.offline_sample_rate`. Its clock only moves when the host
    /// renders through the device handle.
    pub fn offline(config: EngineConfig) -> Result<Self, EngineError> {
        let backend = OfflineBackend::new(config.offline_sample_rate);
        Self::with_backend(config, Box::new(backend))
    }

    /// Creates an engine over an arbitrary output backend.
    pub fn with_backend(
        config: EngineConfig,
        backend: Box<dyn OutputBackend>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let device = DeviceSession::new(backend, config.master_gain);
        Ok(Self {
            config,
            device,
            registry: Registry::new(),
            transport: Transport::new(),
            next_reap: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens and resumes the output device.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DeviceUnavailable`] if there is no usable
    /// output. The engine stays usable; a later call may succeed.
    pub fn initialize_device(&mut self) -> Result<(), EngineError> {
        self.device.resume_if_suspended()?;
        Ok(())
    }

    /// Starts looping `pattern`, replacing any current playback.
    ///
    /// With a `track` filter only that track is played.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidLoopDuration`] for unusable tempo or meter and
    /// [`EngineError::DeviceUnavailable`] without an output. The engine is
    /// idle and silent after either.
    pub fn start(
        &mut self,
        pattern: Pattern,
        tempo_meter: TempoMeter,
        track: Option<TrackKind>,
    ) -> Result<(), EngineError> {
        self.start_at(pattern, tempo_meter, track, Instant::now())?;
        Ok(())
    }

    /// Like [`start`](Self::start), with an explicit host time for the loop
    /// timer. Returns the report of the first iteration.
    pub fn start_at(
        &mut self,
        pattern: Pattern,
        tempo_meter: TempoMeter,
        track: Option<TrackKind>,
        now: Instant,
    ) -> Result<IterationReport, EngineError> {
        self.next_reap = None;
        let report = self.transport.start(
            pattern,
            tempo_meter,
            track,
            &mut self.device,
            &mut self.registry,
            &self.config,
            now,
        )?;
        self.next_reap = Some(self.reap_after(now));
        Ok(report)
    }

    /// Stops playback and silences everything. Always safe to call.
    pub fn stop(&mut self) {
        self.transport.stop(&self.device, &mut self.registry);
        self.next_reap = None;
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Runs whatever is due at host time `now`: the loop timer and the
    /// reaper.
    ///
    /// Returns the report of a newly scheduled iteration, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DeviceUnavailable`] if the device was closed
    /// and could not be reopened. Playback is stopped in that case.
    pub fn poll(&mut self, now: Instant) -> Result<Option<IterationReport>, EngineError> {
        if self.next_reap.is_some_and(|at| at <= now) {
            if let Some(handle) = self.device.handle() {
                self.registry.reap(handle);
            }
            self.next_reap = Some(self.reap_after(now));
        }

        match self
            .transport
            .poll(now, &mut self.device, &mut self.registry, &self.config)
        {
            Ok(report) => Ok(report),
            Err(e) => {
                self.next_reap = None;
                Err(e)
            }
        }
    }

    /// Earliest host time at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let timer = self.timer_deadline();
        match (timer, self.next_reap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Deadline of the pending loop timer.
    pub fn timer_deadline(&self) -> Option<Instant> {
        self.transport.pending_timer().map(|t| t.deadline)
    }

    /// The open device, if any.
    pub fn device(&self) -> Option<DeviceHandle> {
        self.device.handle().cloned()
    }

    /// Closes the output device. Playback continues on a fresh device at
    /// the next loop iteration.
    pub fn close_device(&mut self) {
        self.device.close();
    }

    /// Pauses device output. The device clock stops until the next
    /// iteration resumes it.
    pub fn suspend_device(&mut self) {
        self.device.suspend();
    }

    pub fn active_source_count(&self) -> usize {
        self.registry.len()
    }

    pub fn active_sources(&self) -> impl Iterator<Item = &ActiveSource> {
        self.registry.iter().map(|(_, source)| source)
    }

    pub fn loop_iteration(&self) -> u64 {
        self.transport.loop_iteration()
    }

    pub fn session_start_time(&self) -> f64 {
        self.transport.session_start_time()
    }

    pub fn loop_duration(&self) -> Option<f64> {
        self.transport.loop_duration()
    }

    /// Report of the most recently scheduled iteration.
    pub fn last_iteration(&self) -> Option<IterationReport> {
        self.transport.last_report()
    }

    fn reap_after(&self, now: Instant) -> Instant {
        deadline_after(now, self.config.reap_interval_secs)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{OutputGuard, SharedMixer};
    use crate::pattern::{ChordEvent, DrumHit, NoteEvent};
    use crate::playback::VoiceKind;
    use std::time::Duration;

    fn engine(sample_rate: u32) -> Engine {
        let config = EngineConfig {
            offline_sample_rate: sample_rate,
            ..EngineConfig::default()
        };
        Engine::offline(config).unwrap()
    }

    fn groove() -> Pattern {
        let mut pattern = Pattern::new();
        pattern.chords.push(ChordEvent::new(vec![60, 64, 67], 0.0, 4.0));
        pattern.drums.add_hit("kick", DrumHit::new(0.0, 0.5));
        pattern.drums.add_hit("kick", DrumHit::new(2.0, 0.5));
        pattern
    }

    /// Moves the offline device clock to `seconds` since it opened.
    fn advance_to(engine: &Engine, seconds: f64) {
        let handle = engine.device().unwrap();
        handle.advance(seconds - handle.current_time());
    }

    struct NoOutput;

    impl OutputBackend for NoOutput {
        fn sample_rate(&self) -> u32 {
            44100
        }

        fn connect(&mut self, _mixer: SharedMixer) -> Result<OutputGuard, EngineError> {
            Err(EngineError::DeviceUnavailable("no output device".into()))
        }
    }

    #[test]
    fn test_chord_schedules_one_voice_per_pitch() {
        let mut engine = engine(2000);
        let mut pattern = Pattern::new();
        pattern.chords.push(ChordEvent::new(vec![60, 64, 67], 0.0, 1.0));

        let report = engine
            .start_at(pattern, TempoMeter::new(120.0, 1, 4.0), None, Instant::now())
            .unwrap();
        assert_eq!(report.scheduled, 3);
        assert_eq!(report.start_time, engine.session_start_time());

        let start = engine.session_start_time();
        assert_eq!(engine.active_source_count(), 3);
        for source in engine.active_sources() {
            assert_eq!(source.kind, VoiceKind::Tonal);
            assert!((source.scheduled_stop_time - (start + 0.5)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_one_bad_hit_among_nine() {
        let mut engine = engine(2000);
        let mut pattern = Pattern::new();
        for i in 0..9 {
            pattern.drums.add_hit("snare", DrumHit::new(i as f64 * 0.25, 0.25));
        }
        pattern.drums.add_hit("snare", DrumHit::new(3.0, f64::NAN));

        let report = engine
            .start_at(pattern, TempoMeter::default(), None, Instant::now())
            .unwrap();
        assert_eq!(report.scheduled, 9);
        assert_eq!(report.skipped, 1);
        assert_eq!(engine.active_source_count(), 9);
        assert!(engine.is_playing());
    }

    #[test]
    fn test_unknown_drum_still_plays() {
        let mut engine = engine(2000);
        let mut pattern = Pattern::new();
        pattern.drums.add_hit("tabla", DrumHit::new(0.0, 1.0));

        let report = engine
            .start_at(pattern, TempoMeter::default(), None, Instant::now())
            .unwrap();
        assert_eq!(report.scheduled, 1);
        let source = engine.active_sources().next().unwrap();
        assert_eq!(source.kind, VoiceKind::Drum);
    }

    #[test]
    fn test_track_filter() {
        let mut engine = engine(2000);
        engine
            .start_at(groove(), TempoMeter::default(), Some(TrackKind::Drums), Instant::now())
            .unwrap();
        assert_eq!(engine.active_source_count(), 2);
        assert!(engine.active_sources().all(|s| s.kind == VoiceKind::Drum));
    }

    #[test]
    fn test_stop_twice() {
        let mut engine = engine(2000);
        engine.stop();
        engine.start(groove(), TempoMeter::default(), None).unwrap();
        engine.stop();
        engine.stop();
        assert!(!engine.is_playing());
        assert_eq!(engine.active_source_count(), 0);
        assert_eq!(engine.loop_iteration(), 0);
        assert_eq!(engine.session_start_time(), 0.0);
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn test_restart_leaves_one_session() {
        let mut engine = engine(2000);
        let now = Instant::now();
        engine.start_at(groove(), TempoMeter::default(), None, now).unwrap();
        advance_to(&engine, 0.5);
        engine
            .start_at(groove(), TempoMeter::default(), None, now + Duration::from_millis(500))
            .unwrap();

        assert!(engine.is_playing());
        assert_eq!(engine.active_source_count(), 5);
        assert_eq!(engine.device().unwrap().voice_count(), 5);
        assert!((engine.session_start_time() - 0.5).abs() < 1e-9);
        assert_eq!(engine.loop_iteration(), 0);
    }

    #[test]
    fn test_failed_start_is_silent_and_idle() {
        let mut engine = engine(2000);
        engine.start(groove(), TempoMeter::default(), None).unwrap();

        let err = engine
            .start(groove(), TempoMeter::new(120.0, 0, 4.0), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidLoopDuration { .. }));
        assert!(!engine.is_playing());
        assert_eq!(engine.active_source_count(), 0);
        assert_eq!(engine.device().unwrap().voice_count(), 0);
        assert!(engine.timer_deadline().is_none());
    }

    #[test]
    fn test_slowest_tempo_and_reap_interval_keep_deadlines_finite() {
        let config = EngineConfig {
            offline_sample_rate: 2000,
            reap_interval_secs: 3600.0,
            ..EngineConfig::default()
        };
        let mut engine = Engine::offline(config).unwrap();
        let now = Instant::now();

        let err = engine
            .start_at(groove(), TempoMeter::new(1e-18, 1, 4.0), None, now)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidLoopDuration { .. }));
        assert!(engine.next_deadline().is_none());

        engine.start_at(groove(), TempoMeter::new(0.01, 1, 4.0), None, now).unwrap();
        let deadline = engine.next_deadline().unwrap();
        assert!(deadline <= now + Duration::from_secs(3600));
        assert!(engine.poll(now + Duration::from_secs(3600)).unwrap().is_none());
        engine.stop();
    }

    #[test]
    fn test_device_unavailable() {
        let mut engine =
            Engine::with_backend(EngineConfig::default(), Box::new(NoOutput)).unwrap();
        assert!(matches!(
            engine.initialize_device(),
            Err(EngineError::DeviceUnavailable(_))
        ));
        assert!(matches!(
            engine.start(groove(), TempoMeter::default(), None),
            Err(EngineError::DeviceUnavailable(_))
        ));
        assert!(!engine.is_playing());
        assert!(engine.device().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            tonal_gain: f32::NAN,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::offline(config),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_iteration_starts_do_not_drift_with_late_timers() {
        let mut engine = engine(4000);
        let mut pattern = Pattern::new();
        pattern.drums.add_hit("kick", DrumHit::new(0.0, 0.25));
        pattern.bassline.push(NoteEvent::new(36, 2.0, 0.5));

        let t0 = Instant::now();
        engine.start_at(pattern, TempoMeter::default(), None, t0).unwrap();
        let session_start = engine.session_start_time();
        let loop_duration = engine.loop_duration().unwrap();
        let tick = engine.config().min_timer_delay_secs;
        let late = Duration::from_millis(5);

        for k in 1..=100u64 {
            let fired_at = engine.timer_deadline().unwrap() + late;
            advance_to(&engine, (fired_at - t0).as_secs_f64());

            let report = engine.poll(fired_at).unwrap().unwrap();
            assert_eq!(report.iteration, k);
            let ideal = session_start + k as f64 * loop_duration;
            assert!((report.start_time - ideal).abs() <= tick);
            assert_eq!(report.stale, 0);
            assert_eq!(report.scheduled, 2);
        }
        // Finished sources were reaped along the way
        assert!(engine.active_source_count() <= 4);
    }

    #[test]
    fn test_reaper_runs_from_poll() {
        let mut engine = engine(2000);
        let mut pattern = Pattern::new();
        pattern.drums.add_hit("kick", DrumHit::new(0.0, 0.5));
        pattern.chords.push(ChordEvent::new(vec![48], 0.0, 4.0));

        let now = Instant::now();
        engine.start_at(pattern, TempoMeter::default(), None, now).unwrap();
        assert_eq!(engine.active_source_count(), 2);

        advance_to(&engine, 1.2);
        assert!(engine.poll(now + Duration::from_millis(1200)).unwrap().is_none());
        assert_eq!(engine.active_source_count(), 1);
        assert_eq!(engine.device().unwrap().voice_count(), 1);
    }

    #[test]
    fn test_closed_device_is_reopened_next_iteration() {
        let mut engine = engine(2000);
        let now = Instant::now();
        engine.start_at(groove(), TempoMeter::default(), None, now).unwrap();
        let old = engine.device().unwrap();
        advance_to(&engine, 1.0);

        engine.close_device();
        assert!(old.is_closed());
        assert!(engine.is_playing());

        let fired_at = engine.timer_deadline().unwrap();
        let report = engine.poll(fired_at).unwrap().unwrap();
        assert_eq!(report.iteration, 1);
        assert_eq!(report.stale, 0);

        let new = engine.device().unwrap();
        assert!(!new.same_device(&old));
        assert_eq!(engine.active_source_count(), 5);
        assert_eq!(new.voice_count(), 5);
        assert!((report.start_time - new.current_time()).abs() < 1e-9);
    }

    #[test]
    fn test_suspended_device_is_resumed_by_next_iteration() {
        let mut engine = engine(2000);
        let now = Instant::now();
        engine.start_at(groove(), TempoMeter::default(), None, now).unwrap();
        engine.suspend_device();
        assert!(engine.device().unwrap().is_suspended());

        let fired_at = engine.timer_deadline().unwrap();
        engine.poll(fired_at).unwrap();
        assert!(!engine.device().unwrap().is_suspended());
    }

    #[test]
    fn test_drop_while_playing() {
        let mut engine = engine(2000);
        engine.start(groove(), TempoMeter::default(), None).unwrap();
        let device = engine.device().unwrap();
        drop(engine);
        assert_eq!(device.voice_count(), 0);
    }
}
