//! Conditioning and compression engine for distributed fibre-optic sensing
//! (DFOS) waveform records.
//!
//! * [`data`] holds the in-memory model ([`Matrix`], [`Waveform`]) and file I/O.
//! * [`dsp`] holds slice-level kernels (wavelets, Butterworth IIR, STFT).
//! * [`process`] maps those kernels over waveforms: filtering, wavelet,
//!   correlation and spectral-subtraction denoising, compression and unit
//!   conversion.
//! * [`tasks`] wires operations to files and output directories.

pub mod capability;
pub mod config;
pub mod data;
pub mod dsp;
pub mod error;
pub mod jobs;
pub mod output;
pub mod process;
pub mod tasks;

pub use capability::Capabilities;
pub use config::ProcessingConfig;
pub use data::model::{HeaderMap, Matrix, Trace, TraceStats, Waveform};
pub use data::store::{FileStore, WaveformFormat, WaveformStore};
pub use error::{Error, Result};
pub use output::{OutputLocator, Task};
pub use tasks::{DenoiseMethod, TaskRunner};
