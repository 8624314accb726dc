use log::info;
use serde::{Deserialize, Serialize};

use crate::data::model::Waveform;
use crate::error::{invalid, Result};

/// Strain to particle velocity: `v = x / normalize_divisor * apparent_velocity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityParams {
    /// Apparent propagation speed along the fibre, m/s. Must be set.
    pub apparent_velocity: f64,
    /// Engineering-unit to strain divisor.
    pub normalize_divisor: f64,
}

impl Default for VelocityParams {
    fn default() -> Self {
        Self {
            apparent_velocity: 0.0,
            normalize_divisor: 5000.0,
        }
    }
}

impl VelocityParams {
    pub fn new(apparent_velocity: f64) -> Self {
        Self {
            apparent_velocity,
            ..Self::default()
        }
    }

    /// Combined per-sample factor.
    pub fn scale(&self) -> f64 {
        self.apparent_velocity / self.normalize_divisor
    }
}

pub fn strain_to_velocity(waveform: &Waveform, params: &VelocityParams) -> Result<Waveform> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(params.apparent_velocity) {
        return Err(invalid(format!(
            "apparent_velocity must be positive (m/s), got {}",
            params.apparent_velocity
        )));
    }
    if !positive(params.normalize_divisor) {
        return Err(invalid(format!(
            "normalize_divisor must be positive, got {}",
            params.normalize_divisor
        )));
    }

    let out = waveform.map_traces(|tr| {
        Ok(tr
            .data
            .iter()
            .map(|x| x / params.normalize_divisor * params.apparent_velocity)
            .collect())
    })?;
    info!(
        "converted {} traces to velocity ({} m/s, divisor {})",
        out.len(),
        params.apparent_velocity,
        params.normalize_divisor
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Trace, TraceStats};
    use crate::error::Error;

    fn waveform() -> Waveform {
        let stats = TraceStats {
            delta: Some(0.001),
            channel: "07".into(),
            ..TraceStats::default()
        };
        Waveform::new(vec![
            Trace::new(vec![1.0, -2.5, 1e-3, 0.0], stats.clone()),
            Trace::new(vec![5000.0, 12345.678], stats),
        ])
    }

    #[test]
    fn scaling_is_undone_by_the_factor() {
        let w = waveform();
        let params = VelocityParams::new(1500.0);
        let v = strain_to_velocity(&w, &params).unwrap();
        for (out, orig) in v.iter().zip(&w) {
            assert_eq!(out.stats, orig.stats);
            for (a, b) in out.data.iter().zip(&orig.data) {
                approx::assert_relative_eq!(a / params.scale(), *b, max_relative = 1e-12);
            }
        }
        assert_eq!(v.traces[1].data[0], 1500.0);
    }

    #[test]
    fn non_positive_parameters_fail() {
        let w = waveform();
        for params in [
            VelocityParams::new(0.0),
            VelocityParams::new(-3.0),
            VelocityParams {
                apparent_velocity: 100.0,
                normalize_divisor: 0.0,
            },
        ] {
            assert!(matches!(
                strain_to_velocity(&w, &params),
                Err(Error::InvalidArgument(_))
            ));
        }
    }
}
