//! Waveform-level operations. Each takes its input by reference and returns
//! a new [`Waveform`](crate::data::model::Waveform) or
//! [`Matrix`](crate::data::model::Matrix).

pub mod codec;
pub mod convert;
pub mod correlation;
pub mod filter;
pub mod spectral;
pub mod wavelet_denoise;
