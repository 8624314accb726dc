use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::output::{OutputLocator, DEFAULT_PREFIX};
use crate::process::codec::CompressParams;
use crate::process::convert::VelocityParams;
use crate::process::correlation::CorrelationParams;
use crate::process::filter::FilterParams;
use crate::process::spectral::SpectralParams;
use crate::process::wavelet_denoise::WaveletDenoiseParams;

/// Defaults for every operation, optionally read from a JSON file.
///
/// Any field missing from the file keeps its default, so a config can be as
/// small as `{"spectral": {"beta": 0.05}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Output directory prefix (`<prefix>_<task>_outputs`).
    pub output_prefix: String,
    pub filter: FilterParams,
    pub wavelet: WaveletDenoiseParams,
    pub correlation: CorrelationParams,
    pub spectral: SpectralParams,
    pub compress: CompressParams,
    pub velocity: VelocityParams,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            output_prefix: DEFAULT_PREFIX.into(),
            filter: FilterParams::default(),
            wavelet: WaveletDenoiseParams::default(),
            correlation: CorrelationParams::default(),
            spectral: SpectralParams::default(),
            compress: CompressParams::default(),
            velocity: VelocityParams::default(),
        }
    }
}

impl ProcessingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound(format!("config file {}", path.display())));
        }
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidFormat(format!("{}: {e}", path.display())))?;
        info!("loaded processing config from {}", path.display());
        Ok(config)
    }

    pub fn locator(&self) -> OutputLocator {
        OutputLocator::new(self.output_prefix.clone())
    }
}
