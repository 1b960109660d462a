//! Loop transport: repeated, lookahead-scheduled playback of a pattern.
//!
//! The transport is driven by a host event loop. Each iteration's events are
//! submitted to the device with absolute timestamps, then a single timer is
//! armed to submit the next iteration shortly before it begins. Iteration
//! start times are always derived from the session start, never from when
//! the timer actually fired, so late timers do not accumulate drift.

use super::registry::Registry;
use super::scheduler::schedule_event;
use super::translator::translate;
use crate::audio::{DeviceHandle, DeviceSession};
use crate::config::EngineConfig;
use crate::error::{EngineError, ScheduleError};
use crate::pattern::{Pattern, TempoMeter, TrackKind, MAX_LOOP_SECONDS};
use std::time::{Duration, Instant};

/// Identifies one arming of the loop timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// The one pending loop timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: TimerId,
    pub deadline: Instant,
}

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Playing,
}

/// Outcome of scheduling one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IterationReport {
    pub iteration: u64,
    /// Absolute device time the iteration starts at.
    pub start_time: f64,
    pub scheduled: usize,
    pub skipped: usize,
    pub stale: usize,
}

/// State of the live session.
struct PlaybackSession {
    pattern: Pattern,
    tempo_meter: TempoMeter,
    filter: Option<TrackKind>,
    loop_duration: f64,
    loop_iteration: u64,
    session_start_time: f64,
    device: DeviceHandle,
}

/// Owner of the playback session and its timer.
#[derive(Default)]
pub struct Transport {
    session: Option<PlaybackSession>,
    timer: Option<PendingTimer>,
    next_timer_id: u64,
    last_report: Option<IterationReport>,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransportState {
        if self.session.is_some() {
            TransportState::Playing
        } else {
            TransportState::Idle
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    /// Current iteration, zero when idle.
    pub fn loop_iteration(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.loop_iteration)
    }

    /// Device time of iteration zero, zero when idle.
    pub fn session_start_time(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.session_start_time)
    }

    /// Loop length of the live session.
    pub fn loop_duration(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.loop_duration)
    }

    pub fn tempo_meter(&self) -> Option<TempoMeter> {
        self.session.as_ref().map(|s| s.tempo_meter)
    }

    pub fn pending_timer(&self) -> Option<PendingTimer> {
        self.timer
    }

    /// Report of the most recently scheduled iteration.
    pub fn last_report(&self) -> Option<IterationReport> {
        self.last_report
    }

    /// Starts looping `pattern`, replacing any live session.
    ///
    /// On error nothing from this call keeps playing and the transport is
    /// idle.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        pattern: Pattern,
        tempo_meter: TempoMeter,
        filter: Option<TrackKind>,
        device: &mut DeviceSession,
        registry: &mut Registry,
        config: &EngineConfig,
        now: Instant,
    ) -> Result<IterationReport, EngineError> {
        self.stop(device, registry);

        let loop_duration = tempo_meter.validated_loop_duration()?;
        let handle = device.resume_if_suspended()?;

        if pattern.is_empty() {
            tracing::warn!("Starting playback of an empty pattern");
        }
        tracing::info!(
            tempo = tempo_meter.tempo_bpm,
            bars = tempo_meter.bars,
            beats_per_bar = tempo_meter.beats_per_bar,
            loop_duration,
            track = ?filter,
            "Starting playback"
        );

        self.session = Some(PlaybackSession {
            pattern,
            tempo_meter,
            filter,
            loop_duration,
            loop_iteration: 0,
            session_start_time: handle.current_time(),
            device: handle,
        });

        match self.schedule_loop_iteration(device, registry, config, now) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.stop(device, registry);
                Err(e)
            }
        }
    }

    /// Fires the loop timer if it is due, scheduling the next iteration.
    ///
    /// Returns the iteration report if the timer fired. An error (the device
    /// could not be reopened) stops playback.
    pub fn poll(
        &mut self,
        now: Instant,
        device: &mut DeviceSession,
        registry: &mut Registry,
        config: &EngineConfig,
    ) -> Result<Option<IterationReport>, EngineError> {
        let due = self.timer.is_some_and(|t| t.deadline <= now);
        if !due {
            return Ok(None);
        }
        self.timer = None;

        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        session.loop_iteration += 1;

        match self.schedule_loop_iteration(device, registry, config, now) {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                tracing::error!("Playback stopped: {}", e);
                self.stop(device, registry);
                Err(e)
            }
        }
    }

    /// Returns to idle: cancels the timer and silences every source.
    ///
    /// Safe to call at any time, any number of times.
    pub fn stop(&mut self, device: &DeviceSession, registry: &mut Registry) {
        if let Some(timer) = self.timer.take() {
            tracing::debug!(timer = timer.id.0, "Cancelled loop timer");
        }
        let was_playing = self.session.take().is_some();
        let stopped = registry.stop_all(device.handle());
        if was_playing {
            tracing::info!(stopped, "Stopped playback");
        }
    }

    /// Schedules the current iteration and arms the timer for the next.
    fn schedule_loop_iteration(
        &mut self,
        device: &mut DeviceSession,
        registry: &mut Registry,
        config: &EngineConfig,
        now: Instant,
    ) -> Result<IterationReport, EngineError> {
        let handle = device.resume_if_suspended()?;
        let Some(session) = self.session.as_mut() else {
            return Ok(IterationReport::default());
        };

        if !handle.same_device(&session.device) {
            // Reopened device: sources on the old one are gone and the clock
            // restarted, so rebase the session onto the new clock.
            registry.stop_all(None);
            session.session_start_time =
                handle.current_time() - session.loop_iteration as f64 * session.loop_duration;
            session.device = handle.clone();
            tracing::warn!(
                iteration = session.loop_iteration,
                "Audio device was reopened, rebasing session clock"
            );
        }

        let iteration = session.loop_iteration;
        let iteration_start = session.session_start_time + iteration as f64 * session.loop_duration;
        let translation = translate(
            &session.pattern,
            session.tempo_meter.tempo_bpm,
            iteration_start,
            session.filter,
        );

        let mut report = IterationReport {
            iteration,
            start_time: iteration_start,
            skipped: translation.skipped,
            ..Default::default()
        };
        for event in &translation.events {
            match schedule_event(event, &handle, registry, config) {
                Ok(_) => report.scheduled += 1,
                Err(ScheduleError::Stale { start, now }) => {
                    tracing::debug!(start, now, "Dropped stale event");
                    report.stale += 1;
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.skipped += 1;
                }
            }
        }

        let next_start =
            session.session_start_time + (iteration + 1) as f64 * session.loop_duration;
        let delay = (next_start - handle.current_time() - config.schedule_ahead_secs)
            .max(config.min_timer_delay_secs);

        tracing::debug!(
            iteration,
            scheduled = report.scheduled,
            skipped = report.skipped,
            stale = report.stale,
            next_in = delay,
            "Scheduled loop iteration"
        );

        self.arm_timer(now, delay);
        self.last_report = Some(report);
        Ok(report)
    }

    /// Arms the loop timer, replacing any pending one.
    fn arm_timer(&mut self, now: Instant, delay_secs: f64) {
        self.next_timer_id += 1;
        let timer = PendingTimer {
            id: TimerId(self.next_timer_id),
            deadline: deadline_after(now, delay_secs),
        };
        if let Some(old) = self.timer.replace(timer) {
            tracing::debug!(timer = old.id.0, "Replaced pending loop timer");
        }
    }
}

/// `now + delay_secs`, with the delay clamped to one loop at most.
pub(crate) fn deadline_after(now: Instant, delay_secs: f64) -> Instant {
    let max = Duration::from_secs_f64(MAX_LOOP_SECONDS);
    let delay = match Duration::try_from_secs_f64(delay_secs) {
        Ok(delay) => delay.min(max),
        Err(_) if delay_secs > 0.0 => max,
        Err(_) => Duration::ZERO,
    };
    now.checked_add(delay).unwrap_or(now)
}
