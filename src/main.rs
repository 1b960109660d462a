//! loopsynth - Loop a symbolic music pattern through synthesized voices.
//!
//! Plays a pattern file (chords, bassline, melody and drum lanes in beats)
//! on the default audio output, or renders a number of loops to a WAV file.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- groove.json                      # Loop until interrupted
//! cargo run -- groove.json --tempo 95 --seconds 30
//! cargo run -- groove.json --wav out.wav --loops 4
//! ```
//!
//! Set `RUST_LOG=loopsynth=debug` to see scheduling decisions.

use anyhow::{bail, Context, Result};
use loopsynth::{render_to_wav, Engine, EngineConfig, PatternFile, TempoMeter, TrackKind};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Longest the player sleeps between polls.
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Command-line options for the player.
struct CliOptions {
    /// Pattern JSON file.
    pattern: PathBuf,
    /// Tempo override in BPM.
    tempo: Option<f64>,
    /// Bar count override.
    bars: Option<u32>,
    /// Beats-per-bar override.
    beats_per_bar: Option<f64>,
    /// Play only this track.
    track: Option<TrackKind>,
    /// Stop after this long.
    seconds: Option<Duration>,
    /// Engine config JSON file.
    config: Option<PathBuf>,
    /// Render to this WAV file instead of playing.
    wav: Option<PathBuf>,
    /// Loops to render with `--wav`.
    loops: u32,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `<pattern.json>`: the pattern to play (required)
    /// - `--tempo`, `--bars`, `--beats-per-bar`: override the file's tempo settings
    /// - `--track <name>`: play a single track
    /// - `--seconds <s>`: stop after a fixed time
    /// - `--config <path>`: engine settings
    /// - `--wav <path>` and `--loops <n>`: render offline instead of playing
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut pattern: Option<PathBuf> = None;
        let mut options = Self {
            pattern: PathBuf::new(),
            tempo: None,
            bars: None,
            beats_per_bar: None,
            track: None,
            seconds: None,
            config: None,
            wav: None,
            loops: 1,
        };
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--tempo" | "-t" => options.tempo = Some(value(&args, &mut i)?),
                "--bars" | "-b" => options.bars = Some(value(&args, &mut i)?),
                "--beats-per-bar" => options.beats_per_bar = Some(value(&args, &mut i)?),
                "--track" => {
                    let name: String = value(&args, &mut i)?;
                    let track = name.parse::<TrackKind>().map_err(anyhow::Error::msg)?;
                    options.track = Some(track);
                }
                "--seconds" | "-s" => {
                    let seconds: f64 = value(&args, &mut i)?;
                    if seconds.is_nan() || seconds <= 0.0 {
                        bail!("--seconds must be positive, got {}", seconds);
                    }
                    // Too long to represent means no limit
                    options.seconds = Duration::try_from_secs_f64(seconds).ok();
                }
                "--config" | "-c" => options.config = Some(value(&args, &mut i)?),
                "--wav" | "-o" => options.wav = Some(value(&args, &mut i)?),
                "--loops" | "-l" => options.loops = value(&args, &mut i)?,
                "--help" | "-h" => {
                    print_help(args.first().map_or("loopsynth", String::as_str));
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => {
                    if pattern.is_some() {
                        bail!("Only one pattern file may be given (extra: {})", other);
                    }
                    pattern = Some(PathBuf::from(other));
                }
            }
            i += 1;
        }

        options.pattern = match pattern {
            Some(path) => path,
            None => {
                print_help(args.first().map_or("loopsynth", String::as_str));
                std::process::exit(1);
            }
        };
        Ok(options)
    }

    /// Tempo settings: file values (or defaults) with CLI overrides applied.
    fn tempo_meter(&self, from_file: Option<TempoMeter>) -> TempoMeter {
        let mut tm = from_file.unwrap_or_default();
        if let Some(tempo) = self.tempo {
            tm.tempo_bpm = tempo;
        }
        if let Some(bars) = self.bars {
            tm.bars = bars;
        }
        if let Some(beats) = self.beats_per_bar {
            tm.beats_per_bar = beats;
        }
        tm
    }
}

/// Reads the value following a flag.
fn value<T>(args: &[String], i: &mut usize) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let flag = &args[*i];
    *i += 1;
    let Some(raw) = args.get(*i) else {
        bail!("{} requires a value", flag);
    };
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", flag, raw, e))
}

fn print_help(program: &str) {
    eprintln!("loopsynth - Loop a symbolic music pattern");
    eprintln!();
    eprintln!("Usage: {} <pattern.json> [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -t, --tempo BPM          Override tempo");
    eprintln!("  -b, --bars N             Override bars per loop");
    eprintln!("      --beats-per-bar N    Override beats per bar");
    eprintln!("      --track NAME         Play one track: chords, bassline, melody or drums");
    eprintln!("  -s, --seconds S          Stop after S seconds (default: play until interrupted)");
    eprintln!("  -c, --config PATH        Engine config JSON");
    eprintln!("  -o, --wav PATH           Render to a WAV file instead of playing");
    eprintln!("  -l, --loops N            Loops to render with --wav (default 1)");
    eprintln!("  -h, --help               Print this help message");
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let file = PatternFile::load(&cli.pattern)
        .with_context(|| format!("Failed to load pattern: {}", cli.pattern.display()))?;
    let tempo_meter = cli.tempo_meter(file.tempo_meter);

    if let Some(wav) = &cli.wav {
        render_to_wav(
            &file.pattern,
            tempo_meter,
            cli.track,
            cli.loops,
            wav,
            &config,
            None::<fn(f32)>,
        )
        .with_context(|| format!("Failed to render {}", wav.display()))?;
        eprintln!("Wrote {} loop(s) to {}", cli.loops, wav.display());
        return Ok(());
    }

    play(file, tempo_meter, &cli, config)
}

/// Plays through the default output until `--seconds` elapses (or forever).
fn play(
    file: PatternFile,
    tempo_meter: TempoMeter,
    cli: &CliOptions,
    config: EngineConfig,
) -> Result<()> {
    let mut engine = Engine::new(config).context("Failed to initialize engine")?;
    engine
        .initialize_device()
        .context("Failed to open audio output")?;
    engine
        .start(file.pattern, tempo_meter, cli.track)
        .context("Failed to start playback")?;

    let stop_at = cli.seconds.and_then(|d| Instant::now().checked_add(d));

    while engine.is_playing() {
        let now = Instant::now();
        if stop_at.is_some_and(|at| now >= at) {
            break;
        }

        if let Some(report) = engine.poll(now)? {
            tracing::info!(
                iteration = report.iteration,
                scheduled = report.scheduled,
                skipped = report.skipped,
                stale = report.stale,
                "Loop"
            );
        }

        let mut wake = now + MAX_POLL_INTERVAL;
        if let Some(deadline) = engine.next_deadline() {
            wake = wake.min(deadline);
        }
        if let Some(at) = stop_at {
            wake = wake.min(at);
        }
        std::thread::sleep(wake.saturating_duration_since(Instant::now()));
    }

    engine.stop();
    Ok(())
}
