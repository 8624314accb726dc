use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::data::model::Waveform;
use crate::dsp::iir::{butterworth, sosfilt, sosfilt_zero_phase, Band};
use crate::error::{invalid, Error, Result};

// ---------------------------------------------------------------------------
// Filter mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Bandpass,
    Bandstop,
    Lowpass,
    Highpass,
}

impl FilterMode {
    /// Whether the mode needs both a low and a high corner.
    pub fn is_band(self) -> bool {
        matches!(self, Self::Bandpass | Self::Bandstop)
    }
}

impl FromStr for FilterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bandpass" => Ok(Self::Bandpass),
            "bandstop" => Ok(Self::Bandstop),
            "lowpass" => Ok(Self::Lowpass),
            "highpass" => Ok(Self::Highpass),
            other => Err(invalid(format!(
                "filter mode '{other}' (expected bandpass|bandstop|lowpass|highpass)"
            ))),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bandpass => "bandpass",
            Self::Bandstop => "bandstop",
            Self::Lowpass => "lowpass",
            Self::Highpass => "highpass",
        })
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Butterworth filter settings. Frequencies are in Hz.
///
/// For `lowpass`/`highpass` only `freq_low` is used, as the cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub mode: FilterMode,
    pub freq_low: Option<f64>,
    pub freq_high: Option<f64>,
    pub order: usize,
    pub zero_phase: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            mode: FilterMode::Bandpass,
            freq_low: None,
            freq_high: None,
            order: 4,
            zero_phase: true,
        }
    }
}

impl FilterParams {
    /// Bandpass with the fixed order used by [`bandpass`].
    pub fn bandpass(freq_low: f64, freq_high: f64) -> Self {
        Self {
            freq_low: Some(freq_low),
            freq_high: Some(freq_high),
            ..Self::default()
        }
    }

    /// Checks that do not depend on the sampling rate.
    pub fn validate(&self) -> Result<()> {
        if self.order == 0 {
            return Err(invalid("filter order must be at least 1"));
        }
        let low = self
            .freq_low
            .ok_or_else(|| invalid(format!("{} needs a low frequency", self.mode)))?;
        if low.is_nan() || low <= 0.0 {
            return Err(invalid(format!("frequency must be positive, got {low}")));
        }
        if self.mode.is_band() {
            let high = self
                .freq_high
                .ok_or_else(|| invalid(format!("{} needs a high frequency", self.mode)))?;
            if high.is_nan() || high <= low {
                return Err(invalid(format!(
                    "{} needs 0 < freq_low < freq_high, got {low} and {high}",
                    self.mode
                )));
            }
        }
        Ok(())
    }

    /// Cutoffs normalised to the Nyquist frequency of `sampling_rate`.
    fn band(&self, sampling_rate: f64) -> Result<Band> {
        self.validate()?;
        let nyquist = sampling_rate / 2.0;
        let norm = |f: f64| {
            if f >= nyquist {
                Err(invalid(format!(
                    "{f} Hz is at or above the Nyquist frequency {nyquist} Hz"
                )))
            } else {
                Ok(f / nyquist)
            }
        };
        let low = norm(self.freq_low.unwrap_or_default())?;
        Ok(match self.mode {
            FilterMode::Lowpass => Band::Lowpass(low),
            FilterMode::Highpass => Band::Highpass(low),
            FilterMode::Bandpass => Band::Bandpass(low, norm(self.freq_high.unwrap_or_default())?),
            FilterMode::Bandstop => Band::Bandstop(low, norm(self.freq_high.unwrap_or_default())?),
        })
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Apply a Butterworth filter to every trace independently.
///
/// Every trace's cutoffs are checked against its own Nyquist frequency
/// before any trace is filtered.
pub fn filter(waveform: &Waveform, params: &FilterParams) -> Result<Waveform> {
    params.validate()?;
    let designs = waveform
        .iter()
        .map(|tr| butterworth(params.order, params.band(tr.stats.sampling_rate())?))
        .collect::<Result<Vec<_>>>()?;

    let mut designs = designs.into_iter();
    let out = waveform.map_traces(|tr| {
        let sections = designs.next().unwrap_or_default();
        debug!("{}: {} sections", tr.stats.channel, sections.len());
        Ok(if params.zero_phase {
            sosfilt_zero_phase(&sections, &tr.data)
        } else {
            sosfilt(&sections, &tr.data)
        })
    })?;

    info!(
        "{} filter (order {}, zero phase: {}) applied to {} traces",
        params.mode,
        params.order,
        params.zero_phase,
        out.len()
    );
    Ok(out)
}

/// Zero-phase order-4 bandpass.
pub fn bandpass(waveform: &Waveform, freq_low: f64, freq_high: f64) -> Result<Waveform> {
    filter(waveform, &FilterParams::bandpass(freq_low, freq_high))
}
