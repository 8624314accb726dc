use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};

use super::loader::{load_header, load_matrix, save_matrix};
use super::model::{HeaderMap, Waveform};
use crate::capability::Capabilities;
use crate::error::{invalid, Error, Result};

// ---------------------------------------------------------------------------
// WaveformFormat
// ---------------------------------------------------------------------------

/// On-disk waveform formats a store may be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformFormat {
    Sac,
    Mseed,
    Txt,
    Json,
}

impl WaveformFormat {
    pub const ALL: [WaveformFormat; 4] = [Self::Sac, Self::Mseed, Self::Txt, Self::Json];

    /// Lowercase file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Sac => "sac",
            Self::Mseed => "mseed",
            Self::Txt => "txt",
            Self::Json => "json",
        }
    }

    /// Guess from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| invalid(format!("{} has no extension", path.display())))?;
        ext.parse()
    }
}

impl FromStr for WaveformFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sac" => Ok(Self::Sac),
            "mseed" | "miniseed" => Ok(Self::Mseed),
            "txt" => Ok(Self::Txt),
            "json" => Ok(Self::Json),
            other => Err(Error::UnsupportedFormat(format!("waveform format '{other}'"))),
        }
    }
}

impl fmt::Display for WaveformFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// WaveformStore
// ---------------------------------------------------------------------------

/// Loads and persists waveforms.
pub trait WaveformStore {
    fn load(&self, path: &Path) -> Result<Waveform>;

    fn save(&self, waveform: &Waveform, path: &Path, format: WaveformFormat) -> Result<()>;

    /// Load a plain sample matrix and attach metadata from a header file.
    fn load_with_header(&self, path: &Path, header_path: &Path) -> Result<Waveform> {
        let header = load_header(header_path)?;
        let matrix = load_matrix(path)?;
        Waveform::from_matrix(&matrix, &header)
    }
}

/// Filesystem store for the built-in formats.
///
/// * `json` keeps every trace with its metadata.
/// * `txt` writes the traces as matrix columns (aligned to the shortest
///   trace); metadata is dropped, and defaults on load unless a header file
///   is supplied through [`WaveformStore::load_with_header`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore;

impl WaveformStore for FileStore {
    fn load(&self, path: &Path) -> Result<Waveform> {
        if !path.is_file() {
            return Err(Error::NotFound(format!("waveform file {}", path.display())));
        }
        let format = WaveformFormat::from_path(path)
            .map_err(|_| Error::UnsupportedFormat(format!("cannot read {}", path.display())))?;
        Capabilities::get().require_format(format)?;

        match format {
            WaveformFormat::Json => {
                let text = std::fs::read_to_string(path)?;
                let waveform: Waveform = serde_json::from_str(&text).map_err(|e| {
                    Error::UnsupportedFormat(format!("{} is not a waveform: {e}", path.display()))
                })?;
                waveform.validate()?;
                Ok(waveform)
            }
            WaveformFormat::Txt => {
                let matrix = load_matrix(path)?;
                Waveform::from_matrix(&matrix, &HeaderMap::new())
            }
            WaveformFormat::Sac | WaveformFormat::Mseed => Err(Error::UnsupportedFormat(
                format!("{format} reading is not built in"),
            )),
        }
    }

    fn save(&self, waveform: &Waveform, path: &Path, format: WaveformFormat) -> Result<()> {
        Capabilities::get().require_format(format)?;
        match format {
            WaveformFormat::Json => {
                let text = serde_json::to_string(waveform).map_err(|e| {
                    Error::UnsupportedFormat(format!("serialising waveform: {e}"))
                })?;
                std::fs::write(path, text)?;
            }
            WaveformFormat::Txt => save_matrix(&waveform.to_matrix(), path)?,
            WaveformFormat::Sac | WaveformFormat::Mseed => {
                return Err(Error::UnsupportedFormat(format!(
                    "{format} writing is not built in"
                )))
            }
        }
        info!(
            "saved {} traces as {format} to {}",
            waveform.len(),
            path.display()
        );
        Ok(())
    }
}
