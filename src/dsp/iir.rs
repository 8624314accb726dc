//! Digital Butterworth design and second-order-section filtering.
//!
//! Design path: analog prototype → pre-warped band transform → bilinear
//! transform (zeros/poles/gain) → cascaded biquads.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use crate::error::{invalid, Result};

type C64 = Complex<f64>;

/// Band shape with cutoffs normalised to Nyquist (`0 < w < 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Band {
    Lowpass(f64),
    Highpass(f64),
    Bandpass(f64, f64),
    Bandstop(f64, f64),
}

impl Band {
    fn check(&self) -> Result<()> {
        let ok = |w: f64| w > 0.0 && w < 1.0;
        match *self {
            Band::Lowpass(w) | Band::Highpass(w) if ok(w) => Ok(()),
            Band::Bandpass(lo, hi) | Band::Bandstop(lo, hi) if ok(lo) && ok(hi) && lo < hi => {
                Ok(())
            }
            other => Err(invalid(format!(
                "normalised cutoffs must satisfy 0 < low < high < 1, got {other:?}"
            ))),
        }
    }
}

/// One biquad: `(b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    pub b: [f64; 3],
    pub a: [f64; 2],
}

/// Design an order-`order` Butterworth filter as second-order sections.
///
/// Band filters come out with `2 * order` poles.
pub fn butterworth(order: usize, band: Band) -> Result<Vec<Section>> {
    if order == 0 {
        return Err(invalid("filter order must be at least 1"));
    }
    band.check()?;

    let n = order as i32;
    let proto: Vec<C64> = (0..order)
        .map(|i| {
            let m = (-n + 1 + 2 * i as i32) as f64;
            -C64::from_polar(1.0, PI * m / (2.0 * n as f64))
        })
        .collect();
    let proto_gain = 1.0 / product(proto.iter().map(|p| -*p)).re;

    // Pre-warp for the bilinear transform at fs = 2.
    let warp = |w: f64| 4.0 * (PI * w / 2.0).tan();

    let (zeros, poles, gain): (Vec<C64>, Vec<C64>, f64) = match band {
        Band::Lowpass(w) => {
            let wo = warp(w);
            (Vec::new(), proto.iter().map(|p| *p * wo).collect(), wo.powi(n))
        }
        Band::Highpass(w) => {
            let wo = warp(w);
            let poles = proto.iter().map(|p| C64::new(wo, 0.0) / *p).collect();
            (vec![C64::new(0.0, 0.0); order], poles, proto_gain)
        }
        Band::Bandpass(lo, hi) => {
            let (w1, w2) = (warp(lo), warp(hi));
            let (bw, wo) = (w2 - w1, (w1 * w2).sqrt());
            let scaled: Vec<C64> = proto.iter().map(|p| *p * (bw / 2.0)).collect();
            (vec![C64::new(0.0, 0.0); order], split_band(&scaled, wo), bw.powi(n))
        }
        Band::Bandstop(lo, hi) => {
            let (w1, w2) = (warp(lo), warp(hi));
            let (bw, wo) = (w2 - w1, (w1 * w2).sqrt());
            let scaled: Vec<C64> = proto.iter().map(|p| C64::new(bw / 2.0, 0.0) / *p).collect();
            let mut zeros = vec![C64::new(0.0, wo); order];
            zeros.extend(vec![C64::new(0.0, -wo); order]);
            (zeros, split_band(&scaled, wo), proto_gain)
        }
    };

    let (zeros, poles, gain) = bilinear(zeros, poles, gain);
    Ok(to_sections(&zeros, &poles, gain))
}

/// Each scaled prototype pole `s` becomes the two roots of `x^2 - 2sx + wo^2`.
fn split_band(scaled: &[C64], wo: f64) -> Vec<C64> {
    let root = |s: C64| (s * s - wo * wo).sqrt();
    scaled
        .iter()
        .map(|&s| s + root(s))
        .chain(scaled.iter().map(|&s| s - root(s)))
        .collect()
}

fn product(values: impl Iterator<Item = C64>) -> C64 {
    values.fold(C64::new(1.0, 0.0), |acc, v| acc * v)
}

fn bilinear(zeros: Vec<C64>, poles: Vec<C64>, gain: f64) -> (Vec<C64>, Vec<C64>, f64) {
    let fs2 = C64::new(4.0, 0.0);
    let gain = gain
        * (product(zeros.iter().map(|&z| fs2 - z)) / product(poles.iter().map(|&p| fs2 - p))).re;
    let mut zd: Vec<C64> = zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    zd.resize(poles.len(), C64::new(-1.0, 0.0));
    let pd = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    (zd, pd, gain)
}

/// Collapse roots into real polynomial factors `[1, c1, c2]`, one per
/// conjugate pair or pair of real roots, plus at most one linear factor.
fn real_factors(roots: &[C64]) -> Vec<[f64; 2]> {
    let tol = |r: &C64| 1e-10 * r.norm().max(1.0);
    let mut factors = Vec::new();
    let mut reals: Vec<f64> = Vec::new();
    for r in roots {
        if r.im.abs() <= tol(r) {
            reals.push(r.re);
        } else if r.im > 0.0 {
            factors.push([-2.0 * r.re, r.norm_sqr()]);
        }
    }
    reals.sort_by(f64::total_cmp);
    // Pair smallest with largest.
    while reals.len() >= 2 {
        let lo = reals.remove(0);
        let hi = reals.pop().unwrap_or(lo);
        factors.push([-(lo + hi), lo * hi]);
    }
    if let Some(&r) = reals.first() {
        factors.push([-r, 0.0]);
    }
    factors
}

fn to_sections(zeros: &[C64], poles: &[C64], gain: f64) -> Vec<Section> {
    let num = real_factors(zeros);
    let den = real_factors(poles);
    let mut sections: Vec<Section> = den
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let b = num.get(i).copied().unwrap_or([0.0, 0.0]);
            Section {
                b: [1.0, b[0], b[1]],
                a: *a,
            }
        })
        .collect();
    if let Some(first) = sections.first_mut() {
        for c in &mut first.b {
            *c *= gain;
        }
    }
    sections
}

/// Run the cascade over `x` (direct form II transposed, zero initial state).
pub fn sosfilt(sections: &[Section], x: &[f64]) -> Vec<f64> {
    let mut y = x.to_vec();
    for s in sections {
        let (mut z1, mut z2) = (0.0, 0.0);
        for v in y.iter_mut() {
            let input = *v;
            let out = s.b[0] * input + z1;
            z1 = s.b[1] * input - s.a[0] * out + z2;
            z2 = s.b[2] * input - s.a[1] * out;
            *v = out;
        }
    }
    y
}

/// Forward pass, then a pass over the reversed output: zero net phase.
pub fn sosfilt_zero_phase(sections: &[Section], x: &[f64]) -> Vec<f64> {
    let mut forward = sosfilt(sections, x);
    forward.reverse();
    let mut backward = sosfilt(sections, &forward);
    backward.reverse();
    backward
}

/// Magnitude response at normalised frequency `w` (1 = Nyquist).
pub fn magnitude(sections: &[Section], w: f64) -> f64 {
    let z1 = C64::from_polar(1.0, -PI * w);
    let z2 = z1 * z1;
    sections
        .iter()
        .map(|s| {
            let num = s.b[0] + z1 * s.b[1] + z2 * s.b[2];
            let den = 1.0 + z1 * s.a[0] + z2 * s.a[1];
            (num / den).norm()
        })
        .product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn lowpass_has_unit_dc_gain_and_half_power_cutoff() {
        for order in 1..=6 {
            let sos = butterworth(order, Band::Lowpass(0.2)).unwrap();
            assert_eq!(sos.len(), order.div_ceil(2));
            assert_abs_diff_eq!(magnitude(&sos, 0.0), 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(magnitude(&sos, 0.2), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
        }
    }

    #[test]
    fn highpass_blocks_dc() {
        let sos = butterworth(4, Band::Highpass(0.2)).unwrap();
        assert!(magnitude(&sos, 0.001) < 1e-6);
        assert_abs_diff_eq!(magnitude(&sos, 0.999), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn bandpass_edges_are_half_power() {
        let sos = butterworth(4, Band::Bandpass(0.1, 0.3)).unwrap();
        assert_eq!(sos.len(), 4);
        assert_abs_diff_eq!(magnitude(&sos, 0.1), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
        assert_abs_diff_eq!(magnitude(&sos, 0.3), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
        assert!(magnitude(&sos, 0.01) < 1e-4);
    }

    #[test]
    fn bandstop_notches_the_centre() {
        let sos = butterworth(3, Band::Bandstop(0.1, 0.3)).unwrap();
        let centre = 2.0 / PI * ((PI * 0.05).tan() * (PI * 0.15).tan()).sqrt().atan();
        assert!(magnitude(&sos, centre) < 1e-6);
        assert_abs_diff_eq!(magnitude(&sos, 0.0), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_bad_cutoffs() {
        assert!(butterworth(4, Band::Bandpass(0.3, 0.1)).is_err());
        assert!(butterworth(4, Band::Lowpass(1.2)).is_err());
        assert!(butterworth(0, Band::Lowpass(0.2)).is_err());
    }

    #[test]
    fn zero_phase_keeps_a_passband_tone_aligned() {
        let sos = butterworth(4, Band::Lowpass(0.2)).unwrap();
        let x: Vec<f64> = (0..2000).map(|i| (2.0 * PI * 0.01 * i as f64).sin()).collect();
        let y = sosfilt_zero_phase(&sos, &x);
        for i in 500..1500 {
            assert_abs_diff_eq!(x[i], y[i], epsilon = 1e-3);
        }
    }
}
