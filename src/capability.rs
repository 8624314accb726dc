//! Process-wide registry of the numerical and storage capabilities compiled
//! into this build.
//!
//! Components ask the registry before doing any work and fail fast with
//! [`Error::MissingCapability`] / [`Error::UnsupportedFormat`] instead of
//! discovering a gap halfway through a job.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use log::debug;

use crate::data::store::WaveformFormat;
use crate::dsp::stft::WindowKind;
use crate::dsp::wavelet::{Wavelet, WAVELET_NAMES};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Capabilities {
    wavelets: BTreeSet<&'static str>,
    windows: Vec<WindowKind>,
    formats: BTreeSet<WaveformFormat>,
}

static REGISTRY: OnceLock<Capabilities> = OnceLock::new();

impl Capabilities {
    /// The registry, resolved on first use.
    pub fn get() -> &'static Capabilities {
        REGISTRY.get_or_init(|| {
            let caps = Capabilities {
                wavelets: WAVELET_NAMES.iter().copied().collect(),
                windows: WindowKind::ALL.to_vec(),
                formats: [WaveformFormat::Txt, WaveformFormat::Json]
                    .into_iter()
                    .collect(),
            };
            debug!("capabilities: {caps}");
            caps
        })
    }

    pub fn has_wavelet(&self, name: &str) -> bool {
        self.wavelets.contains(name.trim().to_ascii_lowercase().as_str())
    }

    /// Filter bank for a wavelet basis name.
    pub fn wavelet(&self, name: &str) -> Result<Wavelet> {
        if !self.has_wavelet(name) {
            return Err(Error::MissingCapability(format!(
                "wavelet basis '{name}' (available: {})",
                self.wavelet_names().join(", ")
            )));
        }
        Wavelet::by_name(name)
            .ok_or_else(|| Error::MissingCapability(format!("wavelet basis '{name}'")))
    }

    pub fn wavelet_names(&self) -> Vec<&'static str> {
        self.wavelets.iter().copied().collect()
    }

    pub fn windows(&self) -> &[WindowKind] {
        &self.windows
    }

    pub fn has_format(&self, format: WaveformFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn require_format(&self, format: WaveformFormat) -> Result<()> {
        if self.has_format(format) {
            Ok(())
        } else {
            Err(Error::UnsupportedFormat(format!(
                "{format} is not available in this build"
            )))
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let windows: Vec<String> = self.windows.iter().map(ToString::to_string).collect();
        writeln!(f, "wavelets: {}", self.wavelet_names().join(", "))?;
        writeln!(f, "windows:  {}", windows.join(", "))?;
        write!(f, "formats: ")?;
        for format in WaveformFormat::ALL {
            let mark = if self.has_format(format) { "yes" } else { "no" };
            write!(f, " {format}={mark}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_wavelets_resolve() {
        let caps = Capabilities::get();
        assert!(caps.has_wavelet("haar"));
        assert!(caps.has_wavelet("DB4"));
        assert_eq!(caps.wavelet("db4").unwrap().filter_len(), 8);
    }

    #[test]
    fn unknown_wavelet_is_missing_capability() {
        let err = Capabilities::get().wavelet("bior3.5").unwrap_err();
        assert!(matches!(err, Error::MissingCapability(_)));
    }

    #[test]
    fn seismic_formats_are_not_built_in() {
        let caps = Capabilities::get();
        assert!(caps.has_format(WaveformFormat::Json));
        assert!(matches!(
            caps.require_format(WaveformFormat::Mseed),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
