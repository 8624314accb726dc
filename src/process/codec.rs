//! Wavelet-coefficient compression of a sample matrix.
//!
//! Each trace (matrix column) is decomposed to the deepest feasible level
//! and the coefficients are stored verbatim in a `bincode` payload together
//! with the basis name and the original shape. Decompression reconstructs
//! every trace and truncates or zero-pads it back to the recorded row count.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::capability::Capabilities;
use crate::data::model::Matrix;
use crate::dsp::wavelet::{fit_length, max_level, wavedec, waverec};
use crate::error::{invalid, Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressParams {
    pub basis: String,
}

impl Default for CompressParams {
    fn default() -> Self {
        Self {
            basis: "haar".into(),
        }
    }
}

/// Persisted coefficient set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedPayload {
    pub wavelet: String,
    /// `[samples, traces]` of the source matrix.
    pub shape: Vec<usize>,
    /// Per-trace `[cA_L, cD_L, ..., cD_1]`, keyed by trace index.
    pub coeffs: BTreeMap<usize, Vec<Vec<f64>>>,
}

impl CompressedPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| Error::CorruptPayload(format!("encoding coefficients: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::CorruptPayload(format!("decoding coefficients: {e}")))
    }

    pub fn write(&self, path: &Path) -> Result<u64> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound(format!("payload {}", path.display())));
        }
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// `(samples, traces)`; the shape must have exactly two axes.
    pub fn dims(&self) -> Result<(usize, usize)> {
        match self.shape.as_slice() {
            [rows, traces] => Ok((*rows, *traces)),
            [] => Err(invalid("payload has no recorded shape")),
            other => Err(invalid(format!(
                "payload shape must be 2-dimensional, got {other:?}"
            ))),
        }
    }
}

/// `compressed / original * 100`.
pub fn ratio_percent(compressed_bytes: u64, original_bytes: u64) -> Result<f64> {
    if original_bytes == 0 {
        return Err(invalid("cannot compute a compression ratio for an empty source"));
    }
    Ok(compressed_bytes as f64 / original_bytes as f64 * 100.0)
}

/// Decompose every trace; the ratio is measured against the in-memory
/// `f64` size of the matrix.
pub fn compress(matrix: &Matrix, params: &CompressParams) -> Result<(CompressedPayload, f64)> {
    let wavelet = Capabilities::get().wavelet(&params.basis)?;
    if matrix.is_empty() {
        return Err(invalid("cannot compress an empty matrix"));
    }
    let (rows, traces) = matrix.shape();
    let level = max_level(rows, wavelet.filter_len());
    debug!("decomposing {traces} traces of {rows} samples to level {level}");

    let coeffs = matrix
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (i, wavedec(col, &wavelet, level)))
        .collect();
    let payload = CompressedPayload {
        wavelet: wavelet.name().to_string(),
        shape: vec![rows, traces],
        coeffs,
    };

    let encoded = payload.to_bytes()?.len() as u64;
    let ratio = ratio_percent(encoded, (rows * traces * std::mem::size_of::<f64>()) as u64)?;
    info!("compressed {rows}x{traces} matrix with {wavelet}: {ratio:.1}%");
    Ok((payload, ratio))
}

/// Rebuild the matrix recorded in `payload`.
pub fn decompress(payload: &CompressedPayload) -> Result<Matrix> {
    let (rows, traces) = payload.dims()?;
    if traces == 0 {
        return Err(invalid("payload records zero traces"));
    }
    if let Some(stray) = payload.coeffs.keys().find(|&&k| k >= traces) {
        return Err(Error::CorruptPayload(format!(
            "coefficients for trace {stray} lie outside the recorded {traces} traces"
        )));
    }
    if payload.coeffs.len() != traces {
        return Err(Error::CorruptPayload(format!(
            "payload carries {} coefficient sets for {traces} traces",
            payload.coeffs.len()
        )));
    }
    let wavelet = Capabilities::get().wavelet(&payload.wavelet)?;

    let columns = (0..traces)
        .map(|i| {
            let coeffs = payload.coeffs.get(&i).ok_or_else(|| {
                Error::CorruptPayload(format!("coefficients for trace {i} are missing"))
            })?;
            Ok(fit_length(waverec(coeffs, &wavelet)?, rows))
        })
        .collect::<Result<Vec<_>>>()?;

    info!("reconstructed {rows}x{traces} matrix with {wavelet}");
    Matrix::from_columns(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn matrix(rows: usize, traces: usize) -> Matrix {
        let columns = (0..traces)
            .map(|t| {
                (0..rows)
                    .map(|i| {
                        let x = i as f64;
                        (0.03 * x * (t + 1) as f64).sin() * 100.0 + 0.5 * x + t as f64 + 1.0
                    })
                    .collect()
            })
            .collect();
        Matrix::from_columns(columns).unwrap()
    }

    #[test]
    fn haar_round_trip_reproduces_the_matrix() {
        for (rows, traces) in [(100, 1), (1000, 8), (7, 3)] {
            let m = matrix(rows, traces);
            let (payload, ratio) = compress(&m, &CompressParams::default()).unwrap();
            assert!(ratio > 0.0);
            let bytes = payload.to_bytes().unwrap();
            let back = decompress(&CompressedPayload::from_bytes(&bytes).unwrap()).unwrap();
            assert_eq!(back.shape(), (rows, traces));
            for t in 0..traces {
                for (a, b) in m.column(t).iter().zip(back.column(t)) {
                    assert_relative_eq!(a, b, max_relative = 1e-3, epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn longer_bases_round_trip() {
        let m = matrix(333, 2);
        for basis in ["db4", "sym4", "coif1", "db8"] {
            let params = CompressParams { basis: basis.into() };
            let (payload, _) = compress(&m, &params).unwrap();
            assert_eq!(payload.wavelet, basis);
            let back = decompress(&payload).unwrap();
            for (a, b) in m.column(1).iter().zip(back.column(1)) {
                assert_relative_eq!(a, b, max_relative = 1e-6, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn unknown_basis_is_missing_capability() {
        let params = CompressParams { basis: "morl".into() };
        assert!(matches!(
            compress(&matrix(10, 1), &params),
            Err(Error::MissingCapability(_))
        ));
        let (mut payload, _) = compress(&matrix(10, 1), &CompressParams::default()).unwrap();
        payload.wavelet = "morl".into();
        assert!(matches!(decompress(&payload), Err(Error::MissingCapability(_))));
    }

    #[test]
    fn inconsistent_payloads_are_reported() {
        let (payload, _) = compress(&matrix(64, 2), &CompressParams::default()).unwrap();

        let mut missing = payload.clone();
        missing.coeffs.remove(&1);
        assert!(matches!(decompress(&missing), Err(Error::CorruptPayload(_))));

        let mut flat = payload.clone();
        flat.shape = vec![128];
        assert!(matches!(decompress(&flat), Err(Error::InvalidArgument(_))));

        let mut shapeless = payload;
        shapeless.shape.clear();
        assert!(matches!(decompress(&shapeless), Err(Error::InvalidArgument(_))));

        assert!(matches!(
            CompressedPayload::from_bytes(b"not a payload"),
            Err(Error::CorruptPayload(_))
        ));
    }

    #[test]
    fn trace_count_must_match_the_shape() {
        let (payload, _) = compress(&matrix(16, 3), &CompressParams::default()).unwrap();

        let mut fewer = payload.clone();
        fewer.shape = vec![16, 2];
        assert!(matches!(decompress(&fewer), Err(Error::CorruptPayload(_))));

        let mut stray = payload.clone();
        let last = stray.coeffs.remove(&2).unwrap();
        stray.coeffs.insert(7, last);
        assert!(matches!(decompress(&stray), Err(Error::CorruptPayload(_))));

        let mut none = payload;
        none.shape = vec![16, 0];
        assert!(matches!(decompress(&none), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn short_recorded_length_truncates() {
        let (mut payload, _) = compress(&matrix(50, 1), &CompressParams::default()).unwrap();
        payload.shape = vec![20, 1];
        assert_eq!(decompress(&payload).unwrap().rows(), 20);
        payload.shape = vec![80, 1];
        let padded = decompress(&payload).unwrap();
        assert!(padded.column(0)[50..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn empty_source_has_no_ratio() {
        assert!(ratio_percent(10, 0).is_err());
        assert_relative_eq!(ratio_percent(50, 200).unwrap(), 25.0);
    }
}
