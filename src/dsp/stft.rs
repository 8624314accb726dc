//! Short-time Fourier transform and its overlap-add inverse.
//!
//! Frames are padded with `nperseg / 2` zeros at both ends and the tail is
//! zero-extended so the hop tiles the signal exactly. Spectra are one-sided
//! and scaled by `1 / sum(window)`; [`Stft::inverse`] undoes the scaling.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::{invalid, Error, Result};

/// Analysis window shapes (periodic form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    Blackman,
    Boxcar,
}

impl WindowKind {
    pub const ALL: [WindowKind; 4] = [Self::Hann, Self::Hamming, Self::Blackman, Self::Boxcar];

    /// Periodic window of length `n`.
    pub fn coefficients(self, n: usize) -> Vec<f64> {
        let nf = n as f64;
        (0..n)
            .map(|i| {
                let phase = 2.0 * PI * i as f64 / nf;
                match self {
                    WindowKind::Hann => 0.5 - 0.5 * phase.cos(),
                    WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                    WindowKind::Blackman => 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos(),
                    WindowKind::Boxcar => 1.0,
                }
            })
            .collect()
    }
}

impl FromStr for WindowKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hann" | "hanning" => Ok(Self::Hann),
            "hamming" => Ok(Self::Hamming),
            "blackman" => Ok(Self::Blackman),
            "boxcar" | "rect" | "rectangular" => Ok(Self::Boxcar),
            other => Err(invalid(format!("unknown window '{other}'"))),
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hann => "hann",
            Self::Hamming => "hamming",
            Self::Blackman => "blackman",
            Self::Boxcar => "boxcar",
        })
    }
}

/// One-sided spectra, one `Vec` of `nperseg / 2 + 1` bins per frame.
pub type Spectrogram = Vec<Vec<Complex<f64>>>;

pub struct Stft {
    nperseg: usize,
    nstep: usize,
    window: Vec<f64>,
    win_sum: f64,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Stft {
    pub fn new(nperseg: usize, noverlap: usize, kind: WindowKind) -> Result<Self> {
        if nperseg < 2 {
            return Err(invalid(format!("segment length must be >= 2, got {nperseg}")));
        }
        if noverlap >= nperseg {
            return Err(invalid(format!(
                "overlap {noverlap} must be smaller than segment length {nperseg}"
            )));
        }
        let window = kind.coefficients(nperseg);
        let win_sum: f64 = window.iter().sum();
        let mut planner = FftPlanner::new();
        Ok(Self {
            nperseg,
            nstep: nperseg - noverlap,
            window,
            win_sum,
            forward: planner.plan_fft_forward(nperseg),
            inverse: planner.plan_fft_inverse(nperseg),
        })
    }

    pub fn bins(&self) -> usize {
        self.nperseg / 2 + 1
    }

    fn pad(&self) -> usize {
        self.nperseg / 2
    }

    pub fn forward(&self, x: &[f64]) -> Spectrogram {
        let pad = self.pad();
        let mut padded = vec![0.0; pad];
        padded.extend_from_slice(x);
        padded.resize(padded.len() + pad, 0.0);
        let excess = (padded.len() - self.nperseg) % self.nstep;
        if excess != 0 {
            padded.resize(padded.len() + self.nstep - excess, 0.0);
        }

        let n_frames = (padded.len() - self.nperseg) / self.nstep + 1;
        let scale = 1.0 / self.win_sum;
        let mut buffer = vec![Complex::new(0.0, 0.0); self.nperseg];
        (0..n_frames)
            .map(|i| {
                let frame = &padded[i * self.nstep..i * self.nstep + self.nperseg];
                for ((slot, &v), &w) in buffer.iter_mut().zip(frame).zip(&self.window) {
                    *slot = Complex::new(v * w, 0.0);
                }
                self.forward.process(&mut buffer);
                buffer[..self.bins()].iter().map(|&c| c * scale).collect()
            })
            .collect()
    }

    /// Overlap-add inverse; the result has the boundary padding removed but
    /// may carry extra tail samples from end padding.
    pub fn inverse(&self, spectra: &Spectrogram) -> Vec<f64> {
        if spectra.is_empty() {
            return Vec::new();
        }
        let n = self.nperseg;
        let out_len = n + (spectra.len() - 1) * self.nstep;
        let mut out = vec![0.0; out_len];
        let mut norm = vec![0.0; out_len];
        let mut buffer = vec![Complex::new(0.0, 0.0); n];

        for (i, frame) in spectra.iter().enumerate() {
            for (k, slot) in buffer.iter_mut().enumerate() {
                *slot = if k < frame.len() {
                    frame[k]
                } else {
                    frame.get(n - k).map_or(Complex::new(0.0, 0.0), |c| c.conj())
                };
            }
            self.inverse.process(&mut buffer);
            let start = i * self.nstep;
            let gain = self.win_sum / n as f64;
            for (j, &w) in self.window.iter().enumerate() {
                out[start + j] += buffer[j].re * gain * w;
                norm[start + j] += w * w;
            }
        }

        let pad = self.pad();
        out.iter()
            .zip(&norm)
            .take(out_len - pad)
            .skip(pad)
            .map(|(&v, &nv)| if nv > 1e-10 { v / nv } else { v })
            .collect()
    }
}
