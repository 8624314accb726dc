//! File-level operations: load an input, run one operation, write the
//! result under the task's output directory and return its path.
//!
//! Inputs are fully processed before anything is written, so a failed run
//! never leaves a partial output file behind.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;

use crate::capability::Capabilities;
use crate::config::ProcessingConfig;
use crate::data::loader::{load_matrix, save_matrix};
use crate::data::model::Waveform;
use crate::data::store::{FileStore, WaveformFormat, WaveformStore};
use crate::error::{invalid, Error, Result};
use crate::output::{format_number, output_file, OutputLocator, Task};
use crate::process::codec::{self, CompressParams, CompressedPayload};
use crate::process::convert::{strain_to_velocity, VelocityParams};
use crate::process::correlation::{self, CorrelationParams};
use crate::process::filter::{self, FilterParams};
use crate::process::spectral::{self, SpectralParams};
use crate::process::wavelet_denoise::{self, WaveletDenoiseParams};

/// Extension used when the input file has none.
const DEFAULT_EXT: &str = ".json";

// ---------------------------------------------------------------------------
// Denoise method
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenoiseMethod {
    Filter,
    Wavelet,
    Correlation,
    Spectral,
}

impl FromStr for DenoiseMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filter" => Ok(Self::Filter),
            "wavelet" => Ok(Self::Wavelet),
            "correlation" => Ok(Self::Correlation),
            "spectral" => Ok(Self::Spectral),
            other => Err(invalid(format!(
                "denoise method '{other}' (expected filter|wavelet|correlation|spectral)"
            ))),
        }
    }
}

impl fmt::Display for DenoiseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Filter => "filter",
            Self::Wavelet => "wavelet",
            Self::Correlation => "correlation",
            Self::Spectral => "spectral",
        })
    }
}

// ---------------------------------------------------------------------------
// Output name suffixes
// ---------------------------------------------------------------------------

pub fn filter_suffix(params: &FilterParams) -> String {
    let low = format_number(params.freq_low.unwrap_or_default());
    let band = match (params.mode.is_band(), params.freq_high) {
        (true, Some(high)) => format!("{low}-{}Hz", format_number(high)),
        _ => format!("{low}Hz"),
    };
    format!("_{}_o{}_{band}", params.mode, params.order)
}

pub fn wavelet_suffix(params: &WaveletDenoiseParams) -> String {
    match params.level {
        Some(level) if level > 0 => format!("_wd_{}_L{level}", params.basis),
        _ => format!("_wd_{}", params.basis),
    }
}

pub fn correlation_suffix(params: &CorrelationParams) -> String {
    format!(
        "_corr_w{}_s{}_t{:.2}",
        params.window_size, params.step_size, params.corr_threshold
    )
}

pub fn spectral_suffix(params: &SpectralParams) -> String {
    format!(
        "_specsub_n{}_a{}_b{}_w{}_fl{}_hl{}",
        params.noise_frames,
        format_number(params.alpha),
        format_number(params.beta),
        params.window,
        params.frame_length,
        params.hop_length
    )
}

/// Format an operation writes its output in: the input's, or JSON when the
/// input has no extension.
fn output_format(input: &Path) -> Result<WaveformFormat> {
    match input.extension() {
        Some(_) => WaveformFormat::from_path(input),
        None => Ok(WaveformFormat::Json),
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs operations against files through a [`WaveformStore`].
#[derive(Debug, Clone, Default)]
pub struct TaskRunner<S = FileStore> {
    store: S,
    locator: OutputLocator,
}

impl TaskRunner<FileStore> {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(FileStore, config.locator())
    }
}

impl<S: WaveformStore> TaskRunner<S> {
    pub fn new(store: S, locator: OutputLocator) -> Self {
        Self { store, locator }
    }

    /// Load, transform, and write the result in the input's own format
    /// under the task's output directory.
    fn run<F>(&self, input: &Path, task: Task, suffix: &str, op: F) -> Result<PathBuf>
    where
        F: FnOnce(&Waveform) -> Result<Waveform>,
    {
        let format = output_format(input)?;
        Capabilities::get().require_format(format)?;
        let waveform = self.store.load(input)?;
        let processed = op(&waveform)?;

        let dir = self.locator.resolve(input, task)?;
        let out = output_file(&dir, input, suffix, DEFAULT_EXT);
        self.store.save(&processed, &out, format)?;
        info!("{task}: wrote {}", out.display());
        Ok(out)
    }

    /// Convert between store formats. Plain `txt` matrices need a header
    /// file to supply timing and station metadata.
    pub fn convert_format(
        &self,
        input: &Path,
        format: WaveformFormat,
        header: Option<&Path>,
    ) -> Result<PathBuf> {
        Capabilities::get().require_format(format)?;
        let is_txt = input
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("txt"));

        let waveform = if is_txt {
            if format == WaveformFormat::Txt {
                return Err(invalid(format!("{} is already txt", input.display())));
            }
            let header = header.ok_or_else(|| {
                invalid("converting a txt matrix needs a header file for timing metadata")
            })?;
            self.store.load_with_header(input, header)?
        } else {
            self.store.load(input)?
        };

        let dir = self.locator.resolve(input, Task::Format)?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stream".into());
        let out = dir.join(format!("{stem}.{}", format.extension()));
        self.store.save(&waveform, &out, format)?;
        info!("{}: wrote {}", Task::Format, out.display());
        Ok(out)
    }

    pub fn filter_file(&self, input: &Path, params: &FilterParams) -> Result<PathBuf> {
        params.validate()?;
        self.run(input, Task::Denoise, &filter_suffix(params), |w| {
            filter::filter(w, params)
        })
    }

    /// Zero-phase order-4 bandpass, written as `<name>_Bandpass<ext>`.
    pub fn bandpass_file(&self, input: &Path, freq_low: f64, freq_high: f64) -> Result<PathBuf> {
        FilterParams::bandpass(freq_low, freq_high).validate()?;
        self.run(input, Task::Denoise, "_Bandpass", |w| {
            filter::bandpass(w, freq_low, freq_high)
        })
    }

    pub fn wavelet_denoise_file(&self, input: &Path, params: &WaveletDenoiseParams) -> Result<PathBuf> {
        Capabilities::get().wavelet(&params.basis)?;
        self.run(input, Task::Denoise, &wavelet_suffix(params), |w| {
            wavelet_denoise::denoise(w, params)
        })
    }

    pub fn correlation_denoise_file(&self, input: &Path, params: &CorrelationParams) -> Result<PathBuf> {
        self.run(input, Task::Denoise, &correlation_suffix(params), |w| {
            correlation::denoise(w, params)
        })
    }

    pub fn spectral_denoise_file(&self, input: &Path, params: &SpectralParams) -> Result<PathBuf> {
        self.run(input, Task::Denoise, &spectral_suffix(params), |w| {
            spectral::denoise(w, params)
        })
    }

    /// Dispatch to one of the denoisers with the settings from `config`.
    pub fn denoise_file(
        &self,
        input: &Path,
        method: DenoiseMethod,
        config: &ProcessingConfig,
    ) -> Result<PathBuf> {
        match method {
            DenoiseMethod::Filter => self.filter_file(input, &config.filter),
            DenoiseMethod::Wavelet => self.wavelet_denoise_file(input, &config.wavelet),
            DenoiseMethod::Correlation => self.correlation_denoise_file(input, &config.correlation),
            DenoiseMethod::Spectral => self.spectral_denoise_file(input, &config.spectral),
        }
    }

    pub fn strain_to_velocity_file(&self, input: &Path, params: &VelocityParams) -> Result<PathBuf> {
        self.run(input, Task::Paraconv, "_velocity", |w| strain_to_velocity(w, params))
    }

    /// Compress a sample matrix file into `<name>-coefficients.bin`.
    ///
    /// The ratio compares the payload with the size of the source file.
    pub fn compress_file(&self, input: &Path, params: &CompressParams) -> Result<(PathBuf, f64)> {
        if !input.is_file() {
            return Err(Error::NotFound(format!("matrix file {}", input.display())));
        }
        let source_size = std::fs::metadata(input)?.len();
        if source_size == 0 {
            return Err(invalid(format!("{} is empty", input.display())));
        }
        let matrix = load_matrix(input)?;
        let (payload, _) = codec::compress(&matrix, params)?;

        let dir = self.locator.resolve(input, Task::Compress)?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "matrix".into());
        let out = dir.join(format!("{stem}-coefficients.bin"));
        let written = payload.write(&out)?;
        let ratio = codec::ratio_percent(written, source_size)?;
        info!("{}: wrote {} ({ratio:.1}% of source)", Task::Compress, out.display());
        Ok((out, ratio))
    }

    /// Rebuild the matrix stored in a payload and write it as text
    /// (`<name>-reconstructed.txt` unless `out_name` is given).
    pub fn decompress_file(&self, input: &Path, out_name: Option<&str>) -> Result<PathBuf> {
        let payload = CompressedPayload::read(input)?;
        let matrix = codec::decompress(&payload)?;

        let dir = self.locator.resolve(input, Task::Decompress)?;
        let name = match out_name {
            Some(name) => name.to_string(),
            None => {
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "payload".into());
                format!("{stem}-reconstructed.txt")
            }
        };
        let out = dir.join(name);
        save_matrix(&matrix, &out)?;
        info!("{}: wrote {}", Task::Decompress, out.display());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::stft::WindowKind;
    use crate::process::filter::FilterMode;

    #[test]
    fn suffixes_encode_parameters() {
        let mut f = FilterParams::bandpass(0.5, 20.0);
        assert_eq!(filter_suffix(&f), "_bandpass_o4_0.5-20Hz");
        f.mode = FilterMode::Highpass;
        f.order = 2;
        assert_eq!(filter_suffix(&f), "_highpass_o2_0.5Hz");

        let mut wd = WaveletDenoiseParams::default();
        assert_eq!(wavelet_suffix(&wd), "_wd_db4");
        wd.level = Some(3);
        assert_eq!(wavelet_suffix(&wd), "_wd_db4_L3");

        assert_eq!(correlation_suffix(&CorrelationParams::default()), "_corr_w1024_s512_t0.50");

        let sp = SpectralParams {
            window: WindowKind::Hamming,
            ..SpectralParams::default()
        };
        assert_eq!(spectral_suffix(&sp), "_specsub_n10_a1_b0.02_whamming_fl1024_hl512");
    }

    #[test]
    fn methods_parse() {
        assert_eq!("Spectral".parse::<DenoiseMethod>().unwrap(), DenoiseMethod::Spectral);
        assert!(matches!(
            "kmeans".parse::<DenoiseMethod>(),
            Err(Error::InvalidArgument(_))
        ));
    }
}
