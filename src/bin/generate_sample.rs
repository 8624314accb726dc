use std::f64::consts::PI;
use std::path::Path;

use anyhow::{Context, Result};
use rusty_dfos::data::loader::{save_matrix, save_parquet};
use rusty_dfos::Matrix;

const N_SAMPLES: usize = 2000;
const N_TRACES: usize = 16;
const SAMPLE_RATE: f64 = 500.0;
/// Channel spacing along the fibre, m.
const CHANNEL_SPACING: f64 = 10.0;
/// Apparent velocity of the synthetic arrival, m/s.
const ARRIVAL_VELOCITY: f64 = 1200.0;

/// Ricker wavelet with peak frequency `f` centred at `t0`.
fn ricker(t: f64, t0: f64, f: f64, amplitude: f64) -> f64 {
    let a = (PI * f * (t - t0)).powi(2);
    amplitude * (1.0 - 2.0 * a) * (-a).exp()
}

fn generate_trace(channel: usize, noise_level: f64, rng: &mut SimpleRng) -> Vec<f64> {
    let arrival = 0.8 + channel as f64 * CHANNEL_SPACING / ARRIVAL_VELOCITY;
    (0..N_SAMPLES)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            let signal = ricker(t, arrival, 15.0, 1.0) + 0.3 * ricker(t, arrival + 0.6, 25.0, 1.0);
            signal + rng.gauss(0.0, noise_level)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mean + std_dev * z
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    // A few channels are much noisier, as on a poorly coupled fibre section.
    let columns: Vec<Vec<f64>> = (0..N_TRACES)
        .map(|ch| {
            let noise = if ch % 5 == 3 { 0.8 } else { 0.1 };
            generate_trace(ch, noise, &mut rng)
        })
        .collect();
    let matrix = Matrix::from_columns(columns).context("assembling sample matrix")?;

    let txt = Path::new("sample_dfos.txt");
    save_matrix(&matrix, txt).with_context(|| format!("writing {}", txt.display()))?;

    let header = Path::new("sample_dfos_head.txt");
    let header_text = format!(
        "# synthetic DFOS record\nstarttime: 2024-01-01T00:00:00.000\ndelta: {}\nnetwork: FO\nstation: SYN\n",
        1.0 / SAMPLE_RATE
    );
    std::fs::write(header, header_text).with_context(|| format!("writing {}", header.display()))?;

    let parquet = Path::new("sample_dfos.parquet");
    save_parquet(&matrix, parquet).with_context(|| format!("writing {}", parquet.display()))?;

    println!(
        "Wrote {N_TRACES} traces ({N_SAMPLES} samples at {SAMPLE_RATE} Hz) to {}, {} and {}",
        txt.display(),
        header.display(),
        parquet.display()
    );
    Ok(())
}
