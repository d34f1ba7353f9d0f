use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use timegrapher::config::BeatRate;
use timegrapher::save_wav;
use timegrapher::simulation::{NoiseConfig, WatchSignalConfig, generate_noisy_watch_signal};

#[derive(Parser, Debug)]
#[command(name = "generate_wav")]
#[command(about = "Generate synthetic watch recordings with configurable noise for timegrapher testing")]
struct Args {
    /// TOML file with [signal] and [noise] sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "data/synthetic")]
    output_dir: PathBuf,

    /// Rate errors in s/d: comma-separated (e.g., "-10,0,25") or range (e.g., "-60-60:30")
    #[arg(short, long, default_value = "0")]
    rates: String,

    /// Number of trials per rate
    #[arg(short, long, default_value_t = 1)]
    trials: u32,

    /// Base seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Signal duration in seconds (CLI override)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Sample rate in Hz (CLI override)
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Nominal beat rate (CLI override, e.g., "21600" or "3hz")
    #[arg(short, long)]
    bph: Option<BeatRate>,

    /// Beat error in ms (CLI override)
    #[arg(long)]
    beat_error: Option<f64>,

    /// White noise RMS (CLI override)
    #[arg(long)]
    noise_rms: Option<f32>,

    /// Output filename prefix
    #[arg(long, default_value = "watch")]
    prefix: String,

    /// Generate manifest.json
    #[arg(long)]
    manifest: bool,
}

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    signal: WatchSignalConfig,
    #[serde(default)]
    noise: NoiseConfig,
}

#[derive(Debug, serde::Serialize)]
struct ManifestEntry {
    file: String,
    rate_seconds_per_day: f64,
    trial: u32,
    seed: u64,
}

#[derive(Debug, serde::Serialize)]
struct Manifest {
    sample_rate: u32,
    beats_per_hour: f64,
    beat_error_ms: f64,
    duration: f64,
    files: Vec<ManifestEntry>,
}

fn parse_rates(s: &str) -> Result<Vec<f64>> {
    if let Some((range, step)) = s.split_once(':') {
        let step: f64 = step.parse().context("Invalid step value")?;
        if step <= 0.0 {
            anyhow::bail!("Step must be positive");
        }
        // The separator is the first '-' that is not a leading sign
        let split = range
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(i, _)| i)
            .ok_or_else(|| anyhow::anyhow!("Invalid range format. Use 'start-end:step'"))?;
        let start: f64 = range[..split].parse().context("Invalid start value")?;
        let end: f64 = range[split + 1..].parse().context("Invalid end value")?;

        let mut rates = Vec::new();
        let mut k = 0;
        loop {
            let r = start + k as f64 * step;
            if r > end + step * 1e-9 {
                break;
            }
            rates.push(r);
            k += 1;
        }
        Ok(rates)
    } else {
        s.split(',')
            .map(|p| p.trim().parse::<f64>().context("Invalid rate value"))
            .collect()
    }
}

fn load_toml_config(path: &PathBuf) -> Result<TomlConfig> {
    let content = fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&content).context("Failed to parse config file")
}

fn apply_overrides(signal: &mut WatchSignalConfig, noise: &mut NoiseConfig, args: &Args) {
    if let Some(duration) = args.duration {
        signal.duration_secs = duration;
    }
    if let Some(sample_rate) = args.sample_rate {
        signal.sample_rate = sample_rate;
    }
    if let Some(rate) = args.bph {
        signal.beats_per_hour = rate.as_bph();
    }
    if let Some(beat_error) = args.beat_error {
        signal.beat_error_ms = beat_error;
    }
    if let Some(rms) = args.noise_rms {
        *noise = noise.clone().with_white_noise(rms);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    fs::create_dir_all(&args.output_dir).context("Failed to create output directory")?;

    let toml_config = if let Some(ref config_path) = args.config {
        load_toml_config(config_path)?
    } else {
        TomlConfig::default()
    };

    let mut signal = toml_config.signal;
    let mut noise = toml_config.noise;
    apply_overrides(&mut signal, &mut noise, &args);

    let rates = parse_rates(&args.rates)?;
    let base_seed = args.seed.or(noise.seed).unwrap_or(0);

    let mut manifest_entries = Vec::new();
    let total_files = rates.len() * args.trials as usize;
    let mut file_count = 0;

    for (rate_index, &rate) in rates.iter().enumerate() {
        for trial in 0..args.trials {
            let seed = base_seed + trial as u64 * 1000 + rate_index as u64;
            let watch = WatchSignalConfig {
                rate_seconds_per_day: rate,
                ..signal.clone()
            };
            let samples = generate_noisy_watch_signal(&watch, &noise.clone().with_seed(seed));

            let filename = format!("{}_r{:+06.1}_t{:02}.wav", args.prefix, rate, trial);
            let filepath = args.output_dir.join(&filename);

            save_wav(&filepath, &samples, watch.sample_rate)
                .with_context(|| format!("Failed to write {}", filepath.display()))?;

            manifest_entries.push(ManifestEntry {
                file: filename,
                rate_seconds_per_day: rate,
                trial,
                seed,
            });

            file_count += 1;
            eprint!("\rGenerating: {}/{}", file_count, total_files);
        }
    }
    eprintln!();

    if args.manifest {
        let manifest = Manifest {
            sample_rate: signal.sample_rate,
            beats_per_hour: signal.beats_per_hour,
            beat_error_ms: signal.beat_error_ms,
            duration: signal.duration_secs,
            files: manifest_entries,
        };
        let manifest_path = args.output_dir.join("manifest.json");
        let manifest_json =
            serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
        fs::write(&manifest_path, manifest_json).context("Failed to write manifest")?;
        eprintln!("Manifest written to: {}", manifest_path.display());
    }

    eprintln!(
        "Generated {} files in {}",
        total_files,
        args.output_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rates_comma_separated() {
        let rates = parse_rates("-10, 0,25").unwrap();
        assert_eq!(rates, vec![-10.0, 0.0, 25.0]);
    }

    #[test]
    fn test_parse_rates_range() {
        let rates = parse_rates("0-90:30").unwrap();
        assert_eq!(rates, vec![0.0, 30.0, 60.0, 90.0]);
    }

    #[test]
    fn test_parse_rates_negative_range() {
        let rates = parse_rates("-60-60:60").unwrap();
        assert_eq!(rates, vec![-60.0, 0.0, 60.0]);
    }

    #[test]
    fn test_parse_rates_rejects_bad_step() {
        assert!(parse_rates("0-10:0").is_err());
        assert!(parse_rates("5:1").is_err());
    }

    #[test]
    fn test_toml_sections() {
        let config: TomlConfig = toml::from_str(
            "[signal]\nbeats_per_hour = 21600.0\n\n[noise]\nseed = 3\n\n[noise.additive]\nrms = 0.01\n",
        )
        .unwrap();
        assert_eq!(config.signal.beats_per_hour, 21600.0);
        assert_eq!(config.noise.seed, Some(3));
        assert!(config.noise.additive.is_some());
    }
}
