//! Discrete wavelet transform with orthogonal filter banks.
//!
//! Conventions follow the usual multilevel DWT layout:
//! * single-level [`dwt`] extends the input half-sample symmetrically and
//!   yields `floor((N + F - 1) / 2)` coefficients per band;
//! * [`idwt`] yields `2n - F + 2` samples;
//! * [`wavedec`] returns `[cA_L, cD_L, ..., cD_1]` (coarsest first);
//! * [`waverec`] trims an approximation that is one sample longer than the
//!   detail band it is combined with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Error, Result};

/// Names of the built-in bases.
pub const WAVELET_NAMES: &[&str] = &[
    "haar", "db1", "db2", "db3", "db4", "db6", "db8", "sym4", "coif1",
];

// Reconstruction low-pass filters (scaling coefficients).
const HAAR: &[f64] = &[0.7071067811865476, 0.7071067811865476];

const DB2: &[f64] = &[
    0.48296291314469025,
    0.836516303737469,
    0.22414386804185735,
    -0.12940952255092145,
];

const DB3: &[f64] = &[
    0.3326705529509569,
    0.8068915093133388,
    0.4598775021193313,
    -0.13501102001039084,
    -0.08544127388224149,
    0.035226291882100656,
];

const DB4: &[f64] = &[
    0.23037781330885523,
    0.7148465705525415,
    0.6308807679295904,
    -0.02798376941698385,
    -0.18703481171888114,
    0.030841381835986965,
    0.032883011666982945,
    -0.010597401784997278,
];

const DB6: &[f64] = &[
    0.11154074335008017,
    0.4946238903983854,
    0.7511339080215775,
    0.3152503517092432,
    -0.22626469396516913,
    -0.12976686756709563,
    0.09750160558707936,
    0.02752286553001629,
    -0.031582039318031156,
    0.0005538422009938016,
    0.004777257511010651,
    -0.00107730108499558,
];

const DB8: &[f64] = &[
    0.05441584224308161,
    0.3128715909144659,
    0.6756307362980128,
    0.5853546836548691,
    -0.015829105256023893,
    -0.2840155429624281,
    0.00047248457399797254,
    0.128747426620186,
    -0.01736930100202211,
    -0.04408825393106472,
    0.013981027917015516,
    0.008746094047015655,
    -0.00487035299301066,
    -0.0003917403729959771,
    0.0006754494059985568,
    -0.00011747678400228192,
];

const SYM4: &[f64] = &[
    0.0322231006040427,
    -0.012603967262037833,
    -0.09921954357684722,
    0.29785779560527736,
    0.8037387518059161,
    0.49761866763201545,
    -0.02963552764599851,
    -0.07576571478927333,
];

const COIF1: &[f64] = &[
    -0.01565572813546454,
    -0.0727326195128539,
    0.38486484686420286,
    0.8525720202122554,
    0.3378976624578092,
    -0.0727326195128539,
];

// ---------------------------------------------------------------------------
// Wavelet – a four-filter bank
// ---------------------------------------------------------------------------

/// Decomposition and reconstruction filters of an orthogonal wavelet.
#[derive(Debug, Clone, PartialEq)]
pub struct Wavelet {
    name: &'static str,
    dec_lo: Vec<f64>,
    dec_hi: Vec<f64>,
    rec_lo: Vec<f64>,
    rec_hi: Vec<f64>,
}

impl Wavelet {
    /// Look up a built-in basis (case-insensitive).
    pub fn by_name(name: &str) -> Option<Self> {
        let key = name.trim().to_ascii_lowercase();
        let (name, rec_lo) = match key.as_str() {
            "haar" => ("haar", HAAR),
            "db1" => ("db1", HAAR),
            "db2" => ("db2", DB2),
            "db3" => ("db3", DB3),
            "db4" => ("db4", DB4),
            "db6" => ("db6", DB6),
            "db8" => ("db8", DB8),
            "sym4" => ("sym4", SYM4),
            "coif1" => ("coif1", COIF1),
            _ => return None,
        };
        Some(Self::orthogonal(name, rec_lo))
    }

    fn orthogonal(name: &'static str, rec_lo: &[f64]) -> Self {
        let f = rec_lo.len();
        // Quadrature mirror: reverse, then negate odd taps.
        let rec_hi: Vec<f64> = (0..f)
            .map(|k| {
                let v = rec_lo[f - 1 - k];
                if k % 2 == 1 {
                    -v
                } else {
                    v
                }
            })
            .collect();
        let dec_lo: Vec<f64> = rec_lo.iter().rev().copied().collect();
        let dec_hi: Vec<f64> = rec_hi.iter().rev().copied().collect();
        Self {
            name,
            dec_lo,
            dec_hi,
            rec_lo: rec_lo.to_vec(),
            rec_hi,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn filter_len(&self) -> usize {
        self.rec_lo.len()
    }
}

impl fmt::Display for Wavelet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// Thresholding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Shrink towards zero by the threshold.
    #[default]
    Soft,
    /// Zero coefficients below the threshold, keep the rest.
    Hard,
}

impl FromStr for ThresholdMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Ok(Self::Soft),
            "hard" => Ok(Self::Hard),
            other => Err(invalid(format!("threshold mode '{other}' (expected soft|hard)"))),
        }
    }
}

impl fmt::Display for ThresholdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Soft => "soft",
            Self::Hard => "hard",
        })
    }
}

/// Apply a threshold to every coefficient.
pub fn threshold(values: &[f64], t: f64, mode: ThresholdMode) -> Vec<f64> {
    match mode {
        ThresholdMode::Soft => values
            .iter()
            .map(|&x| x.signum() * (x.abs() - t).max(0.0))
            .collect(),
        ThresholdMode::Hard => values
            .iter()
            .map(|&x| if x.abs() < t { 0.0 } else { x })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// Deepest useful decomposition level for a signal of `data_len` samples.
pub fn max_level(data_len: usize, filter_len: usize) -> usize {
    if filter_len < 2 || data_len < filter_len - 1 {
        return 0;
    }
    let ratio = data_len as f64 / (filter_len - 1) as f64;
    ratio.log2().floor() as usize
}

/// Half-sample symmetric index into a signal of length `n`.
fn reflect(idx: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let i = idx.rem_euclid(period) as usize;
    if i < n {
        i
    } else {
        2 * n - 1 - i
    }
}

fn downsample_convolve(signal: &[f64], filter: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let f = filter.len();
    let out_len = (n + f - 1) / 2;
    (0..out_len)
        .map(|k| {
            let i = 2 * k + 1;
            filter
                .iter()
                .enumerate()
                .map(|(j, &h)| h * signal[reflect(i as isize - j as isize, n)])
                .sum()
        })
        .collect()
}

/// Single-level decomposition into (approximation, detail).
pub fn dwt(signal: &[f64], wavelet: &Wavelet) -> (Vec<f64>, Vec<f64>) {
    if signal.is_empty() {
        return (Vec::new(), Vec::new());
    }
    (
        downsample_convolve(signal, &wavelet.dec_lo),
        downsample_convolve(signal, &wavelet.dec_hi),
    )
}

/// Single-level reconstruction. Bands must have equal length.
pub fn idwt(approx: &[f64], detail: &[f64], wavelet: &Wavelet) -> Result<Vec<f64>> {
    if approx.len() != detail.len() {
        return Err(Error::CorruptPayload(format!(
            "approximation has {} coefficients but detail has {}",
            approx.len(),
            detail.len()
        )));
    }
    let n = approx.len();
    let f = wavelet.filter_len();
    let Some(out_len) = (2 * n + 2).checked_sub(f) else {
        return Err(Error::CorruptPayload(format!(
            "{n} coefficients are too few for {wavelet}"
        )));
    };

    let mut out = vec![0.0; out_len];
    for (m, slot) in out.iter_mut().enumerate() {
        // Full-convolution index of this output sample.
        let pos = m + f - 2;
        let k_min = (pos + 1).saturating_sub(f).div_ceil(2);
        let k_max = (pos / 2).min(n - 1);
        let mut acc = 0.0;
        for k in k_min..=k_max {
            let tap = pos - 2 * k;
            acc += approx[k] * wavelet.rec_lo[tap] + detail[k] * wavelet.rec_hi[tap];
        }
        *slot = acc;
    }
    Ok(out)
}

/// Multilevel decomposition: `[cA_L, cD_L, ..., cD_1]`.
///
/// Stops early once another level would no longer shorten the
/// approximation band, so `L` may be less than `level`.
pub fn wavedec(signal: &[f64], wavelet: &Wavelet, level: usize) -> Vec<Vec<f64>> {
    let f = wavelet.filter_len();
    let mut details = Vec::new();
    let mut approx = signal.to_vec();
    for _ in 0..level {
        if approx.is_empty() || (approx.len() + f - 1) / 2 >= approx.len() {
            break;
        }
        let (a, d) = dwt(&approx, wavelet);
        details.push(d);
        approx = a;
    }
    let mut coeffs = Vec::with_capacity(details.len() + 1);
    coeffs.push(approx);
    coeffs.extend(details.into_iter().rev());
    coeffs
}

/// Inverse of [`wavedec`].
pub fn waverec(coeffs: &[Vec<f64>], wavelet: &Wavelet) -> Result<Vec<f64>> {
    let (first, details) = coeffs
        .split_first()
        .ok_or_else(|| Error::CorruptPayload("empty coefficient list".into()))?;
    let mut approx = first.clone();
    for detail in details {
        if approx.len() == detail.len() + 1 {
            approx.pop();
        }
        approx = idwt(&approx, detail, wavelet)?;
    }
    Ok(approx)
}

/// Truncate or zero-pad `values` to exactly `len` samples.
pub fn fit_length(mut values: Vec<f64>, len: usize) -> Vec<f64> {
    values.resize(len, 0.0);
    values
}
