use log::{debug, info};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::capability::Capabilities;
use crate::data::model::Waveform;
use crate::dsp::stft::{Spectrogram, Stft, WindowKind};
use crate::dsp::wavelet::fit_length;
use crate::error::{invalid, Error, Result};

/// Spectral-subtraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralParams {
    pub frame_length: usize,
    pub hop_length: usize,
    pub window: WindowKind,
    /// Leading frames averaged into the noise estimate; `0` uses the
    /// per-bin minimum over all frames instead.
    pub noise_frames: usize,
    /// Over-subtraction factor.
    pub alpha: f64,
    /// Spectral floor as a fraction of the noise magnitude.
    pub beta: f64,
}

impl Default for SpectralParams {
    fn default() -> Self {
        Self {
            frame_length: 1024,
            hop_length: 512,
            window: WindowKind::Hann,
            noise_frames: 10,
            alpha: 1.0,
            beta: 0.02,
        }
    }
}

impl SpectralParams {
    fn validate(&self) -> Result<()> {
        if self.frame_length == 0 || self.hop_length == 0 {
            return Err(invalid("frame_length and hop_length must be positive"));
        }
        if self.alpha.is_nan() || self.alpha < 0.0 {
            return Err(invalid(format!("alpha must be non-negative, got {}", self.alpha)));
        }
        if self.beta.is_nan() || self.beta < 0.0 {
            return Err(invalid(format!("beta must be non-negative, got {}", self.beta)));
        }
        if !Capabilities::get().windows().contains(&self.window) {
            return Err(Error::MissingCapability(format!("STFT window '{}'", self.window)));
        }
        Ok(())
    }

    /// Segment length and overlap for a trace of `n` samples.
    fn segment(&self, n: usize) -> (usize, usize) {
        let nperseg = self.frame_length.min(n).max(2);
        let noverlap = nperseg.saturating_sub(self.hop_length).min(nperseg - 1);
        (nperseg, noverlap)
    }
}

/// Noise magnitude per frequency bin.
fn noise_estimate(mags: &[Vec<f64>], noise_frames: usize) -> Vec<f64> {
    let bins = mags.first().map_or(0, Vec::len);
    if noise_frames > 0 {
        let lead = &mags[..noise_frames.min(mags.len())];
        (0..bins)
            .map(|k| lead.iter().map(|f| f[k]).sum::<f64>() / lead.len() as f64)
            .collect()
    } else {
        (0..bins)
            .map(|k| mags.iter().map(|f| f[k]).fold(f64::INFINITY, f64::min))
            .collect()
    }
}

/// Subtract the noise floor from every bin, keeping phase.
pub fn subtract(spectra: &Spectrogram, noise_frames: usize, alpha: f64, beta: f64) -> Spectrogram {
    if spectra.is_empty() {
        return Vec::new();
    }
    let mags: Vec<Vec<f64>> = spectra
        .iter()
        .map(|frame| frame.iter().map(|c| c.norm()).collect())
        .collect();
    let noise = noise_estimate(&mags, noise_frames);

    spectra
        .iter()
        .zip(&mags)
        .map(|(frame, mag)| {
            frame
                .iter()
                .zip(mag)
                .zip(&noise)
                .map(|((c, &m), &nm)| {
                    let cleaned = (m - alpha * nm).max(beta * nm);
                    Complex::from_polar(cleaned, c.arg())
                })
                .collect()
        })
        .collect()
}

/// STFT-domain noise-floor subtraction, trace by trace.
pub fn denoise(waveform: &Waveform, params: &SpectralParams) -> Result<Waveform> {
    params.validate()?;
    let out = waveform.map_traces(|tr| {
        if tr.is_empty() {
            return Ok(Vec::new());
        }
        let n = tr.len();
        let (nperseg, noverlap) = params.segment(n);
        let stft = Stft::new(nperseg, noverlap, params.window)?;
        let spectra = stft.forward(&tr.data);
        debug!(
            "{}: {} frames of {} bins (nperseg {nperseg}, noverlap {noverlap})",
            tr.stats.channel,
            spectra.len(),
            stft.bins()
        );
        let cleaned = subtract(&spectra, params.noise_frames, params.alpha, params.beta);
        Ok(fit_length(stft.inverse(&cleaned), n))
    })?;
    info!(
        "spectral subtraction (alpha {}, beta {}, {} window) applied to {} traces",
        params.alpha,
        params.beta,
        params.window,
        out.len()
    );
    Ok(out)
}
