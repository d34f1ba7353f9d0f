use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::Sender;

use timegrapher::audio::{DeviceSource, SampleSource, WavFileSource};
use timegrapher::config::{BeatRate, TimegrapherConfig};
use timegrapher::output::{OutputFormat, create_formatter};
use timegrapher::wav::WavRecorder;
use timegrapher::{SessionCommand, SessionEnd, SessionOptions, TimegrapherProcessor, run_session};

#[derive(Parser, Debug)]
#[command(name = "timegrapher")]
#[command(about = "Measure a mechanical watch from the sound of its escapement", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Analyze a WAV recording instead of the default input device
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Expected beat rate (e.g., "28800", "21600bph", "3hz")
    #[arg(short = 'b', long)]
    bph: Option<BeatRate>,

    /// Lift angle in degrees
    #[arg(short = 'l', long)]
    lift_angle: Option<f64>,

    /// Initial posture index
    #[arg(short = 'p', long)]
    posture: Option<usize>,

    /// Output format: text, json, csv
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Record the raw input to a WAV file
    #[arg(long)]
    dump_audio: Option<PathBuf>,
}

/// Passes samples through while writing them to a WAV file
struct RecordingSource<S> {
    inner: S,
    recorder: Option<WavRecorder>,
}

impl<S: SampleSource> RecordingSource<S> {
    fn new(inner: S, recorder: Option<WavRecorder>) -> Self {
        Self { inner, recorder }
    }

    fn finish(self) -> anyhow::Result<()> {
        if let Some(recorder) = self.recorder {
            recorder.finalize().context("Failed to finalize audio dump")?;
        }
        Ok(())
    }
}

impl<S: SampleSource> SampleSource for RecordingSource<S> {
    fn read(&mut self) -> timegrapher::Result<Option<Vec<f32>>> {
        let samples = self.inner.read()?;
        if let (Some(recorder), Some(samples)) = (self.recorder.as_mut(), samples.as_ref())
            && let Err(e) = recorder.write(samples)
        {
            log::error!("Audio dump failed, recording stopped: {}", e);
            self.recorder = None;
        }
        Ok(samples)
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = match &args.config {
        Some(path) => TimegrapherConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TimegrapherConfig::default(),
    };
    if let Some(rate) = args.bph {
        config.movement.expected_beats_per_hour = rate.as_bph();
    }
    if let Some(lift_angle) = args.lift_angle {
        config.movement.lift_angle = lift_angle;
    }
    if let Some(posture) = args.posture {
        config.posture.initial = posture;
    }

    match &args.input {
        Some(path) => {
            let source = WavFileSource::new(path, config.audio.buffer_size)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            config.audio.sample_rate = source.sample_rate();
            run(source, config, &args, None)
        }
        None => {
            config.validate()?;
            let source = DeviceSource::new(&config.audio).context("Failed to start audio capture")?;
            let cadence = Duration::from_secs_f32(config.audio.processing_interval_ms / 1000.0);
            run(source, config, &args, Some(cadence))
        }
    }
}

fn run<S: SampleSource>(
    source: S,
    config: TimegrapherConfig,
    args: &Args,
    cadence: Option<Duration>,
) -> anyhow::Result<()> {
    let mut processor = TimegrapherProcessor::new(&config)?;

    eprintln!("=== Timegrapher ===");
    eprintln!("Sample rate: {} Hz", config.audio.sample_rate);
    eprintln!(
        "Expected rate: {} bph, lift angle: {}°",
        config.movement.expected_beats_per_hour, config.movement.lift_angle
    );
    eprintln!("Posture: {}", processor.posture().current_label());
    if cadence.is_some() {
        eprintln!("Commands: posture N | lift DEG | bph RATE | quit");
    }
    eprintln!();

    let recorder = match &args.dump_audio {
        Some(path) => Some(
            WavRecorder::create(path, config.audio.sample_rate)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => None,
    };
    let mut source = RecordingSource::new(source, recorder);

    let commands = if cadence.is_some() {
        let (tx, rx) = crossbeam_channel::unbounded();
        spawn_command_reader(tx);
        Some(rx)
    } else {
        None
    };

    let formatter = create_formatter(args.format, args.verbose > 0);
    if let Some(header) = formatter.header() {
        println!("{}", header);
    }

    let end = run_session(
        &mut source,
        &mut processor,
        SessionOptions {
            commands: commands.as_ref(),
            cadence,
        },
        |snapshot| println!("{}", formatter.format(snapshot)),
    )?;

    match end {
        SessionEnd::SourceExhausted => log::info!("Input exhausted"),
        SessionEnd::Stopped => log::info!("Stopped"),
    }

    source.finish()
}

fn spawn_command_reader(tx: Sender<SessionCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<SessionCommand>() {
                Ok(command) => {
                    let stop = command == SessionCommand::Stop;
                    if tx.send(command).is_err() || stop {
                        break;
                    }
                }
                Err(e) => eprintln!("{}", e),
            }
        }
    });
}
