//! Numerical kernels: wavelet transforms, IIR design, STFT and statistics.
//!
//! Everything here works on plain `&[f64]` slices and knows nothing about
//! traces or files; the `process` layer maps these over waveforms.

pub mod iir;
pub mod stats;
pub mod stft;
pub mod wavelet;
