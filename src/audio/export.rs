//! Offline rendering.
//!
//! Loops a pattern a fixed number of times through an offline engine and
//! writes the mixed output to a WAV file.

use super::mixer::CHANNELS;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::pattern::{Pattern, TempoMeter, TrackKind};
use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use std::time::{Duration, Instant};

/// Buffer size for rendering chunks.
const RENDER_BUFFER_SIZE: usize = 4096;

/// Silence kept after the last loop so release tails are not cut off.
const TAIL_SECONDS: f64 = 1.0;

/// Renders `loops` iterations of a pattern to a 16-bit stereo WAV file.
///
/// The pattern is played by the same scheduling code as real-time playback,
/// on a device whose clock is driven by the render loop, at
/// `config.offline_sample_rate`.
///
/// # Arguments
///
/// * `pattern` - The pattern to render
/// * `tempo_meter` - Tempo and loop length
/// * `track` - Optional single track to render
/// * `loops` - Number of loop iterations
/// * `output_path` - Path for the output WAV file
/// * `config` - Engine settings
/// * `progress_callback` - Optional callback for progress updates (0.0 to 1.0)
///
/// # Errors
///
/// Returns error if:
/// - `loops` is zero or the tempo/meter gives no usable loop length
/// - Output file cannot be created or written
#[allow(clippy::too_many_arguments)]
pub fn render_to_wav<P, F>(
    pattern: &Pattern,
    tempo_meter: TempoMeter,
    track: Option<TrackKind>,
    loops: u32,
    output_path: P,
    config: &EngineConfig,
    mut progress_callback: Option<F>,
) -> Result<()>
where
    P: AsRef<Path>,
    F: FnMut(f32),
{
    if loops == 0 {
        bail!("Nothing to render: loop count is zero");
    }
    let loop_duration = tempo_meter.validated_loop_duration()?;

    let mut engine = Engine::offline(config.clone()).context("Failed to create offline engine")?;
    let t0 = Instant::now();
    engine
        .start_at(pattern.clone(), tempo_meter, track, t0)
        .context("Failed to start offline playback")?;
    let device = engine
        .device()
        .context("Offline device was not opened")?;

    let sample_rate = device.sample_rate();
    let duration_seconds = loops as f64 * loop_duration + TAIL_SECONDS;
    let total_frames = (duration_seconds * sample_rate as f64).round() as usize;

    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output_path.as_ref(), spec).with_context(|| {
        format!(
            "Failed to create output WAV file: {}",
            output_path.as_ref().display()
        )
    })?;

    let channels = CHANNELS as usize;
    let mut buf = vec![0.0f32; RENDER_BUFFER_SIZE * channels];
    let mut current_frame = 0usize;

    let host_time = |seconds: f64| t0 + Duration::from_secs_f64(seconds);

    while current_frame < total_frames {
        // Stop re-arming once the last requested iteration is scheduled
        let looping = engine.loop_iteration() + 1 < loops as u64;

        let mut frames = (total_frames - current_frame).min(RENDER_BUFFER_SIZE);
        if let Some(deadline) = engine.timer_deadline().filter(|_| looping) {
            // End the block exactly when the loop timer is due
            let due = deadline.saturating_duration_since(host_time(device.current_time()));
            let due_frames = (due.as_secs_f64() * sample_rate as f64).ceil() as usize;
            frames = frames.min(due_frames.max(1));
        }

        let block = &mut buf[..frames * channels];
        device.render(block, channels);

        for &sample in block.iter() {
            let sample = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(sample)?;
        }
        current_frame += frames;

        if looping {
            engine
                .poll(host_time(device.current_time()))
                .context("Offline playback failed")?;
        }

        if let Some(ref mut callback) = progress_callback {
            callback(current_frame as f32 / total_frames as f32);
        }
    }

    engine.stop();
    writer.finalize().context("Failed to finalize WAV file")?;

    tracing::info!(
        path = %output_path.as_ref().display(),
        loops,
        seconds = duration_seconds,
        "Rendered pattern to WAV"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{ChordEvent, DrumHit};
    use std::path::PathBuf;

    const SR: u32 = 8000;

    fn temp_wav(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("loopsynth_{}_{}.wav", name, std::process::id()))
    }

    fn config() -> EngineConfig {
        EngineConfig {
            offline_sample_rate: SR,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_render_two_loops() {
        let mut pattern = Pattern::new();
        pattern.drums.add_hit("kick", DrumHit::new(0.0, 0.5));
        pattern.chords.push(ChordEvent::new(vec![60, 64, 67], 2.0, 1.0));

        let path = temp_wav("two_loops");
        let mut last_progress = 0.0;
        render_to_wav(
            &pattern,
            TempoMeter::default(),
            None,
            2,
            &path,
            &config(),
            Some(|p: f32| last_progress = p),
        )
        .unwrap();
        assert_eq!(last_progress, 1.0);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, SR);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        // Two 2-second loops plus the tail
        assert_eq!(samples.len(), 5 * SR as usize * 2);

        // The second loop's kick lands at 2.0s
        let second_kick = 2 * SR as usize * 2;
        assert!(samples[second_kick..second_kick + 400].iter().any(|s| *s != 0));
        // Nothing plays in the tail
        let tail = 4 * SR as usize * 2 + 200;
        assert!(samples[tail..].iter().all(|s| *s == 0));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_render_rejects_zero_loops() {
        let path = temp_wav("zero_loops");
        let result = render_to_wav(
            &Pattern::new(),
            TempoMeter::default(),
            None,
            0,
            &path,
            &config(),
            None::<fn(f32)>,
        );
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_render_rejects_bad_tempo() {
        let path = temp_wav("bad_tempo");
        let result = render_to_wav(
            &Pattern::new(),
            TempoMeter::new(0.0, 1, 4.0),
            None,
            1,
            &path,
            &config(),
            None::<fn(f32)>,
        );
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
