use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;

use rusty_dfos::dsp::stft::WindowKind;
use rusty_dfos::dsp::wavelet::ThresholdMode;
use rusty_dfos::jobs;
use rusty_dfos::process::filter::FilterMode;
use rusty_dfos::{Capabilities, DenoiseMethod, ProcessingConfig, TaskRunner, WaveformFormat};

/// Denoising, compression and unit conversion for fiber-optic sensing
/// records. `RUST_LOG` sets verbosity.
#[derive(Parser)]
#[command(name = "rusty-dfos", version)]
struct Cli {
    /// JSON processing config; command options override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output directory prefix (`<prefix>_<task>_outputs`).
    #[arg(long, global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a waveform file to another format.
    Format {
        input: PathBuf,
        #[arg(long)]
        to: WaveformFormat,
        /// Header file with timing and station metadata.
        #[arg(long)]
        header: Option<PathBuf>,
    },
    /// Butterworth filtering.
    Filter {
        input: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Zero-phase bandpass between two corner frequencies.
    Bandpass {
        input: PathBuf,
        #[arg(long)]
        freq_low: f64,
        #[arg(long)]
        freq_high: f64,
    },
    /// Denoise with one of the built-in methods.
    Denoise {
        input: PathBuf,
        #[arg(long, default_value = "wavelet")]
        method: DenoiseMethod,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        wavelet: WaveletArgs,
        #[command(flatten)]
        correlation: CorrelationArgs,
        #[command(flatten)]
        spectral: SpectralArgs,
    },
    /// Strain rate to particle velocity.
    Velocity {
        input: PathBuf,
        /// Apparent velocity in m/s.
        #[arg(long)]
        velocity: Option<f64>,
        #[arg(long)]
        divisor: Option<f64>,
    },
    /// Wavelet-compress a trace matrix.
    Compress {
        input: PathBuf,
        #[arg(long)]
        basis: Option<String>,
    },
    /// Rebuild a matrix from a compressed payload.
    Decompress {
        input: PathBuf,
        /// Output file name inside the task directory.
        #[arg(long)]
        out: Option<String>,
    },
    /// List the formats, wavelets and windows this build supports.
    Capabilities,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    mode: Option<FilterMode>,
    #[arg(long)]
    freq_low: Option<f64>,
    #[arg(long)]
    freq_high: Option<f64>,
    #[arg(long)]
    order: Option<usize>,
    #[arg(long)]
    zero_phase: Option<bool>,
}

#[derive(Args)]
struct WaveletArgs {
    #[arg(long)]
    basis: Option<String>,
    #[arg(long)]
    level: Option<usize>,
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    threshold_mode: Option<ThresholdMode>,
}

#[derive(Args)]
struct CorrelationArgs {
    #[arg(long)]
    window_size: Option<usize>,
    #[arg(long)]
    step_size: Option<usize>,
    #[arg(long)]
    corr_threshold: Option<f64>,
}

#[derive(Args)]
struct SpectralArgs {
    #[arg(long)]
    frame_length: Option<usize>,
    #[arg(long)]
    hop_length: Option<usize>,
    #[arg(long)]
    window: Option<WindowKind>,
    #[arg(long)]
    noise_frames: Option<usize>,
    #[arg(long)]
    alpha: Option<f64>,
    #[arg(long)]
    beta: Option<f64>,
}

// ---------------------------------------------------------------------------
// Config overrides
// ---------------------------------------------------------------------------

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl FilterArgs {
    fn apply(&self, config: &mut ProcessingConfig) {
        let f = &mut config.filter;
        set(&mut f.mode, self.mode);
        if self.freq_low.is_some() {
            f.freq_low = self.freq_low;
        }
        if self.freq_high.is_some() {
            f.freq_high = self.freq_high;
        }
        set(&mut f.order, self.order);
        set(&mut f.zero_phase, self.zero_phase);
    }
}

impl WaveletArgs {
    fn apply(&self, config: &mut ProcessingConfig) {
        let w = &mut config.wavelet;
        set(&mut w.basis, self.basis.clone());
        if self.level.is_some() {
            w.level = self.level;
        }
        if self.threshold.is_some() {
            w.threshold = self.threshold;
        }
        set(&mut w.mode, self.threshold_mode);
    }
}

impl CorrelationArgs {
    fn apply(&self, config: &mut ProcessingConfig) {
        let c = &mut config.correlation;
        set(&mut c.window_size, self.window_size);
        set(&mut c.step_size, self.step_size);
        set(&mut c.corr_threshold, self.corr_threshold);
    }
}

impl SpectralArgs {
    fn apply(&self, config: &mut ProcessingConfig) {
        let s = &mut config.spectral;
        set(&mut s.frame_length, self.frame_length);
        set(&mut s.hop_length, self.hop_length);
        set(&mut s.window, self.window);
        set(&mut s.noise_frames, self.noise_frames);
        set(&mut s.alpha, self.alpha);
        set(&mut s.beta, self.beta);
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Format { .. } => "format",
            Self::Filter { .. } => "filter",
            Self::Bandpass { .. } => "bandpass",
            Self::Denoise { .. } => "denoise",
            Self::Velocity { .. } => "velocity",
            Self::Compress { .. } => "compress",
            Self::Decompress { .. } => "decompress",
            Self::Capabilities => "capabilities",
        }
    }

    /// Fold the command's processing options into the config.
    fn apply(&self, config: &mut ProcessingConfig) {
        match self {
            Self::Filter { filter, .. } => filter.apply(config),
            Self::Bandpass {
                freq_low,
                freq_high,
                ..
            } => {
                config.filter.freq_low = Some(*freq_low);
                config.filter.freq_high = Some(*freq_high);
            }
            Self::Denoise {
                filter,
                wavelet,
                correlation,
                spectral,
                ..
            } => {
                filter.apply(config);
                wavelet.apply(config);
                correlation.apply(config);
                spectral.apply(config);
            }
            Self::Velocity {
                velocity, divisor, ..
            } => {
                set(&mut config.velocity.apparent_velocity, *velocity);
                set(&mut config.velocity.normalize_divisor, *divisor);
            }
            Self::Compress { basis, .. } => set(&mut config.compress.basis, basis.clone()),
            Self::Format { .. } | Self::Decompress { .. } | Self::Capabilities => {}
        }
    }
}

/// Run one command to completion and describe what it produced.
fn execute(cmd: &Commands, config: &ProcessingConfig) -> Result<String> {
    let runner = TaskRunner::from_config(config);
    let written = match cmd {
        Commands::Format { input, to, header } => {
            runner.convert_format(input, *to, header.as_deref())?
        }
        Commands::Filter { input, .. } => runner.filter_file(input, &config.filter)?,
        Commands::Bandpass {
            input,
            freq_low,
            freq_high,
        } => runner.bandpass_file(input, *freq_low, *freq_high)?,
        Commands::Denoise { input, method, .. } => runner.denoise_file(input, *method, config)?,
        Commands::Velocity { input, .. } => {
            runner.strain_to_velocity_file(input, &config.velocity)?
        }
        Commands::Compress { input, .. } => {
            let (path, ratio) = runner.compress_file(input, &config.compress)?;
            return Ok(format!("{}\ncompression ratio: {ratio:.2}%", path.display()));
        }
        Commands::Decompress { input, out } => runner.decompress_file(input, out.as_deref())?,
        Commands::Capabilities => return Ok(Capabilities::get().to_string()),
    };
    Ok(written.display().to_string())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ProcessingConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ProcessingConfig::default(),
    };
    if let Some(prefix) = &cli.prefix {
        config.output_prefix = prefix.clone();
    }
    cli.cmd.apply(&mut config);
    debug!("effective config: {config:?}");

    let name = cli.cmd.name();
    let cmd = cli.cmd;
    let job = jobs::spawn(name, move || execute(&cmd, &config))?;
    let report = job.wait().with_context(|| format!("{name} failed"))?;
    println!("{report}");
    Ok(())
}
