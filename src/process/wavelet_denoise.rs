use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::capability::Capabilities;
use crate::data::model::Waveform;
use crate::dsp::stats::median_abs_deviation;
use crate::dsp::wavelet::{fit_length, max_level, threshold, wavedec, waverec, ThresholdMode, Wavelet};
use crate::error::{invalid, Result};

/// Scale factor turning a median absolute deviation into a Gaussian sigma.
const MAD_TO_SIGMA: f64 = 0.6745;

/// Wavelet-threshold denoising settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveletDenoiseParams {
    pub basis: String,
    /// Decomposition depth; `None` or `0` means the deepest feasible level.
    /// Deeper requests are clamped to that level.
    pub level: Option<usize>,
    /// Fixed threshold; `None` selects the universal threshold per trace.
    pub threshold: Option<f64>,
    pub mode: ThresholdMode,
}

impl Default for WaveletDenoiseParams {
    fn default() -> Self {
        Self {
            basis: "db4".into(),
            level: None,
            threshold: None,
            mode: ThresholdMode::Soft,
        }
    }
}

/// Universal (VisuShrink) threshold `sigma * sqrt(2 ln n)`.
pub fn universal_threshold(sigma: f64, n: usize) -> f64 {
    if n < 2 {
        return 0.0;
    }
    sigma * (2.0 * (n as f64).ln()).sqrt()
}

/// Robust noise scale from the finest detail band.
pub fn noise_sigma(finest_detail: &[f64]) -> f64 {
    median_abs_deviation(finest_detail).map_or(0.0, |mad| mad / MAD_TO_SIGMA)
}

/// Denoise every trace independently by thresholding its detail bands.
pub fn denoise(waveform: &Waveform, params: &WaveletDenoiseParams) -> Result<Waveform> {
    let wavelet = Capabilities::get().wavelet(&params.basis)?;
    if let Some(t) = params.threshold {
        if t.is_nan() || t < 0.0 {
            return Err(invalid(format!("threshold must be non-negative, got {t}")));
        }
    }

    let out = waveform.map_traces(|tr| denoise_samples(&tr.data, &wavelet, params))?;
    info!(
        "wavelet denoise ({}, {}) applied to {} traces",
        wavelet,
        params.mode,
        out.len()
    );
    Ok(out)
}

fn denoise_samples(x: &[f64], wavelet: &Wavelet, params: &WaveletDenoiseParams) -> Result<Vec<f64>> {
    let n = x.len();
    let feasible = max_level(n, wavelet.filter_len());
    let level = match params.level {
        Some(l) if l > 0 => {
            if l > feasible {
                warn!(
                    "level {l} exceeds the feasible {feasible} for {n} samples of {wavelet}; \
                     using {feasible}"
                );
            }
            l.min(feasible)
        }
        _ => feasible,
    };
    if n == 0 || level == 0 {
        return Ok(x.to_vec());
    }

    let mut coeffs = wavedec(x, wavelet, level);
    let sigma = coeffs.last().map_or(0.0, |d| noise_sigma(d));
    let thr = params
        .threshold
        .unwrap_or_else(|| universal_threshold(sigma, n));
    debug!("level {level}, sigma {sigma:.4e}, threshold {thr:.4e}");

    for band in coeffs.iter_mut().skip(1) {
        *band = threshold(band, thr, params.mode);
    }
    Ok(fit_length(waverec(&coeffs, wavelet)?, n))
}
