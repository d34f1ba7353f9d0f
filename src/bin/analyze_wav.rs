use clap::Parser;
use rolling_stats::Stats;
use serde::Serialize;
use std::path::{Path, PathBuf};

use timegrapher::audio::{SampleSource, WavFileSource};
use timegrapher::config::{BeatRate, TimegrapherConfig};
use timegrapher::timing::Estimate;
use timegrapher::{SessionOptions, TimegrapherProcessor, run_session};

#[derive(Parser, Debug)]
#[command(name = "analyze_wav")]
#[command(about = "Analyze recorded watch ticking and summarize rate, beat error and amplitude", long_about = None)]
struct Args {
    /// WAV files to analyze
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format: text, csv, json
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Expected beat rate (e.g., "28800", "21600bph", "3hz")
    #[arg(short = 'b', long)]
    bph: Option<BeatRate>,

    /// Lift angle in degrees
    #[arg(short = 'l', long)]
    lift_angle: Option<f64>,

    /// Include snapshots taken while settling or without a fresh estimate
    #[arg(long)]
    all_snapshots: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Csv,
    Json,
}

#[derive(Debug, Clone, Serialize)]
struct StatsSummary {
    count: usize,
    mean: f64,
    std_dev: f64,
    min: f64,
    max: f64,
}

impl StatsSummary {
    fn from_stats(stats: &Stats<f64>) -> Option<Self> {
        if stats.count == 0 {
            return None;
        }
        Some(Self {
            count: stats.count,
            mean: stats.mean,
            std_dev: stats.std_dev,
            min: stats.min,
            max: stats.max,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct FileAnalysis {
    filename: String,
    sample_rate: u32,
    duration_secs: f64,
    beats: usize,
    cycles: usize,
    snapshots: usize,
    rate: Option<StatsSummary>,
    beat_error: Option<StatsSummary>,
    amplitude: Option<StatsSummary>,
    snr_db: Option<StatsSummary>,
    max_dropouts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_estimate: Option<Estimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FileAnalysis {
    fn failed(filename: String, error: String) -> Self {
        Self {
            filename,
            sample_rate: 0,
            duration_secs: 0.0,
            beats: 0,
            cycles: 0,
            snapshots: 0,
            rate: None,
            beat_error: None,
            amplitude: None,
            snr_db: None,
            max_dropouts: 0,
            final_estimate: None,
            error: Some(error),
        }
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
        Some(path) => TimegrapherConfig::load(path)?,
        None => TimegrapherConfig::default(),
    };
    if let Some(rate) = args.bph {
        config.movement.expected_beats_per_hour = rate.as_bph();
    }
    if let Some(lift_angle) = args.lift_angle {
        config.movement.lift_angle = lift_angle;
    }
    config.validate()?;

    let results: Vec<FileAnalysis> = args
        .files
        .iter()
        .map(|path| analyze_file(path, &config, args.all_snapshots))
        .collect();

    match args.format {
        OutputFormat::Text => print_text(&results, &config),
        OutputFormat::Csv => print_csv(&results),
        OutputFormat::Json => print_json(&results)?,
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn analyze_file(path: &Path, config: &TimegrapherConfig, all_snapshots: bool) -> FileAnalysis {
    match analyze_file_impl(path, config, all_snapshots) {
        Ok(analysis) => analysis,
        Err(e) => FileAnalysis::failed(display_name(path), format!("{:#}", e)),
    }
}

fn analyze_file_impl(
    path: &Path,
    config: &TimegrapherConfig,
    all_snapshots: bool,
) -> anyhow::Result<FileAnalysis> {
    let mut source = WavFileSource::new(path, config.audio.buffer_size)?;

    let mut config = config.clone();
    if source.sample_rate() != config.audio.sample_rate {
        log::info!(
            "{}: using file sample rate {} Hz",
            display_name(path),
            source.sample_rate()
        );
        config.audio.sample_rate = source.sample_rate();
    }
    let sample_count = source.len();
    let mut processor = TimegrapherProcessor::new(&config)?;

    let mut rate_stats: Stats<f64> = Stats::new();
    let mut beat_error_stats: Stats<f64> = Stats::new();
    let mut amplitude_stats: Stats<f64> = Stats::new();
    let mut snr_stats: Stats<f64> = Stats::new();
    let mut snapshots = 0;
    let mut max_dropouts = 0;

    run_session(
        &mut source,
        &mut processor,
        SessionOptions::default(),
        |snapshot| {
            snapshots += 1;
            max_dropouts = max_dropouts.max(snapshot.dropouts);
            if !(all_snapshots || snapshot.valid) {
                return;
            }
            if let Some(rate) = snapshot.rate_seconds_per_day {
                rate_stats.update(rate);
            }
            if let Some(beat_error) = snapshot.beat_error_ms {
                beat_error_stats.update(beat_error);
            }
            if let Some(amplitude) = snapshot.amplitude_deg {
                amplitude_stats.update(amplitude);
            }
            if let Some(snr) = snapshot.snr_db {
                snr_stats.update(snr);
            }
        },
    )?;

    let final_estimate = match processor.estimate() {
        Ok(estimate) => Some(estimate),
        Err(e) => {
            log::warn!("{}: {}", display_name(path), e);
            None
        }
    };

    Ok(FileAnalysis {
        filename: display_name(path),
        sample_rate: config.audio.sample_rate,
        duration_secs: sample_count as f64 / config.audio.sample_rate as f64,
        beats: processor.events().count(),
        cycles: processor.cycles().len(),
        snapshots,
        rate: StatsSummary::from_stats(&rate_stats),
        beat_error: StatsSummary::from_stats(&beat_error_stats),
        amplitude: StatsSummary::from_stats(&amplitude_stats),
        snr_db: StatsSummary::from_stats(&snr_stats),
        max_dropouts,
        final_estimate,
        error: None,
    })
}

fn mean_or_dash(summary: &Option<StatsSummary>, precision: usize) -> String {
    summary
        .as_ref()
        .map(|s| format!("{:.*}", precision, s.mean))
        .unwrap_or_else(|| "-".to_string())
}

fn print_text(results: &[FileAnalysis], config: &TimegrapherConfig) {
    eprintln!(
        "Expected rate: {} bph, lift angle: {}°",
        config.movement.expected_beats_per_hour, config.movement.lift_angle
    );
    eprintln!();

    println!(
        "{:<48} {:>10} {:>8} {:>10} {:>10} {:>8} {:>8}",
        "File", "Rate s/d", "Std", "BeatErr ms", "Amplitude", "SNR dB", "Cycles"
    );
    println!("{}", "-".repeat(108));

    for result in results {
        if let Some(ref err) = result.error {
            println!("{:<48} ERROR: {}", result.filename, err);
            continue;
        }

        let rate_std = result
            .rate
            .as_ref()
            .map(|s| format!("{:.2}", s.std_dev))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<48} {:>10} {:>8} {:>10} {:>10} {:>8} {:>8}",
            result.filename,
            mean_or_dash(&result.rate, 1),
            rate_std,
            mean_or_dash(&result.beat_error, 2),
            mean_or_dash(&result.amplitude, 0),
            mean_or_dash(&result.snr_db, 1),
            result.cycles
        );
    }

    for result in results {
        if result.error.is_some() {
            continue;
        }

        eprintln!();
        eprintln!("Details for {}:", result.filename);
        eprintln!(
            "  {:.1} s at {} Hz, {} beats, {} snapshots",
            result.duration_secs, result.sample_rate, result.beats, result.snapshots
        );
        if let Some(ref rate) = result.rate {
            eprintln!(
                "  Rate: {:+.1} s/d (min {:+.1}, max {:+.1})",
                rate.mean, rate.min, rate.max
            );
        }
        if result.max_dropouts > 0 {
            eprintln!("  Dropouts: up to {} at once", result.max_dropouts);
        }
        match result.final_estimate {
            Some(ref est) => eprintln!(
                "  Final: {:+.1} s/d, {:.2} ms, {} bph observed over {} cycles",
                est.rate_seconds_per_day,
                est.beat_error_ms,
                est.observed_beats_per_hour.round(),
                est.cycles_used
            ),
            None => eprintln!("  Final: insufficient data"),
        }
    }
}

fn print_csv(results: &[FileAnalysis]) {
    println!(
        "filename,duration_secs,beats,cycles,rate_mean,rate_std,beat_error_mean,amplitude_mean,snr_db_mean,max_dropouts,error"
    );
    for result in results {
        let mean = |summary: &Option<StatsSummary>, precision: usize| {
            summary
                .as_ref()
                .map(|s| format!("{:.*}", precision, s.mean))
                .unwrap_or_default()
        };
        let rate_std = result
            .rate
            .as_ref()
            .map(|s| format!("{:.3}", s.std_dev))
            .unwrap_or_default();
        let error = result.error.as_deref().unwrap_or("");

        println!(
            "{},{:.3},{},{},{},{},{},{},{},{},{}",
            result.filename,
            result.duration_secs,
            result.beats,
            result.cycles,
            mean(&result.rate, 3),
            rate_std,
            mean(&result.beat_error, 3),
            mean(&result.amplitude, 1),
            mean(&result.snr_db, 1),
            result.max_dropouts,
            error
        );
    }
}

fn print_json(results: &[FileAnalysis]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    println!("{}", json);
    Ok(())
}
