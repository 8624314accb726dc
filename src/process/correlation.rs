//! Multichannel denoising driven by inter-channel correlation.
//!
//! Inside each sliding window, channels that correlate well with the rest
//! form a signal model (their sample-wise mean); every channel is then
//! pulled towards that model in proportion to how poorly it correlates with
//! it: `x - (1 - |c|) * (x - model)`.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::data::model::Waveform;
use crate::dsp::stats::{detrend_linear, pearson};
use crate::error::{invalid, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationParams {
    /// Window length in samples.
    pub window_size: usize,
    /// Hop between window starts in samples.
    pub step_size: usize,
    /// Minimum mean absolute correlation for a channel to join the model.
    pub corr_threshold: f64,
}

impl Default for CorrelationParams {
    fn default() -> Self {
        Self {
            window_size: 1024,
            step_size: 512,
            corr_threshold: 0.5,
        }
    }
}

/// Start offsets of every window over `n` samples.
///
/// The last window is moved back to end exactly at `n` when the regular hop
/// would leave a tail uncovered.
pub fn window_starts(n: usize, window: usize, step: usize) -> Vec<usize> {
    if window == 0 || step == 0 || window > n {
        return Vec::new();
    }
    let mut starts: Vec<usize> = (0..=n - window).step_by(step).collect();
    if starts.last().is_some_and(|&s| s + window < n) {
        starts.push(n - window);
    }
    starts
}

fn validate(waveform: &Waveform, params: &CorrelationParams) -> Result<usize> {
    if waveform.len() < 2 {
        return Err(invalid(format!(
            "correlation denoising needs at least 2 traces, got {}",
            waveform.len()
        )));
    }
    let first = &waveform.traces[0];
    let n = first.len();
    let fs = first.stats.known_sampling_rate();
    for tr in waveform.iter().skip(1) {
        if tr.len() != n {
            return Err(invalid(format!(
                "all traces must have the same length ({} has {}, expected {n})",
                tr.stats.channel,
                tr.len()
            )));
        }
        if let (Some(a), Some(b)) = (fs, tr.stats.known_sampling_rate()) {
            if (a - b).abs() > 1e-9 * a.abs().max(b.abs()) {
                return Err(invalid(format!(
                    "all traces must share a sampling rate ({a} Hz vs {b} Hz)"
                )));
            }
        }
    }
    if params.window_size == 0 || params.step_size == 0 {
        return Err(invalid("window_size and step_size must be positive"));
    }
    if params.window_size > n {
        return Err(invalid(format!(
            "window_size {} exceeds the record length {n}",
            params.window_size
        )));
    }
    if !(0.0..=1.0).contains(&params.corr_threshold) {
        return Err(invalid(format!(
            "corr_threshold must lie in [0, 1], got {}",
            params.corr_threshold
        )));
    }
    Ok(n)
}

/// Mean absolute correlation of each channel with all the others.
fn mean_abs_correlation(channels: &[&[f64]]) -> Vec<f64> {
    let m = channels.len();
    let mut sums = vec![0.0; m];
    for i in 0..m {
        for j in i + 1..m {
            let c = pearson(channels[i], channels[j]).unwrap_or(0.0).abs();
            sums[i] += c;
            sums[j] += c;
        }
    }
    sums.into_iter().map(|s| s / (m - 1) as f64).collect()
}

/// Suppress weakly correlated content across channels.
///
/// Traces are linearly detrended first; the output carries the detrended,
/// suppressed samples. Later windows overwrite the overlap they share with
/// earlier ones.
pub fn denoise(waveform: &Waveform, params: &CorrelationParams) -> Result<Waveform> {
    let n = validate(waveform, params)?;
    let detrended: Vec<Vec<f64>> = waveform.iter().map(|tr| detrend_linear(&tr.data)).collect();
    let mut out = detrended.clone();

    let starts = window_starts(n, params.window_size, params.step_size);
    let mut passed = 0usize;
    for &start in &starts {
        let end = start + params.window_size;
        let window: Vec<&[f64]> = detrended.iter().map(|ch| &ch[start..end]).collect();

        let scores = mean_abs_correlation(&window);
        let signal: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| **s >= params.corr_threshold)
            .map(|(i, _)| i)
            .collect();

        if params.window_size < 2 || signal.is_empty() {
            for (dst, src) in out.iter_mut().zip(&window) {
                dst[start..end].copy_from_slice(src);
            }
            passed += 1;
            continue;
        }

        let model: Vec<f64> = (0..params.window_size)
            .map(|k| signal.iter().map(|&i| window[i][k]).sum::<f64>() / signal.len() as f64)
            .collect();
        debug!(
            "window {start}..{end}: {} of {} channels in the signal model",
            signal.len(),
            window.len()
        );

        for (dst, src) in out.iter_mut().zip(&window) {
            let c = pearson(src, &model).unwrap_or(0.0);
            let keep = 1.0 - c.abs();
            for ((d, &x), &m) in dst[start..end].iter_mut().zip(src.iter()).zip(&model) {
                *d = x - keep * (x - m);
            }
        }
    }

    if passed > 0 {
        warn!(
            "{passed} of {} windows had no channel above {:.2} and were left unmodified",
            starts.len(),
            params.corr_threshold
        );
    }
    info!(
        "correlation denoise (window {}, step {}) applied to {} traces",
        params.window_size,
        params.step_size,
        waveform.len()
    );

    let mut columns = out.into_iter();
    waveform.map_traces(|_| Ok(columns.next().unwrap_or_default()))
}
