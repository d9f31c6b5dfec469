//! Narrow-band spectral power without a full transform.
//!
//! A generalized Goertzel recursion evaluates the DFT at an arbitrary
//! (non-bin) frequency in O(N). Sweeping it over the cardiac band builds a
//! pseudo-spectrum whose cost is linear in the number of frequency points.

use num_complex::Complex64;
use std::f64::consts::PI;

/// Power of `signal` at `freq_hz`, normalized so a sine of amplitude `A`
/// yields roughly `A² / 4`. Always non-negative.
pub fn goertzel_power(signal: &[f32], sample_rate: f32, freq_hz: f32) -> f32 {
    let n = signal.len();
    if n == 0 || sample_rate <= 0.0 || !freq_hz.is_finite() {
        return 0.0;
    }

    let w = 2.0 * PI * freq_hz as f64 / sample_rate as f64;
    let coeff = 2.0 * w.cos();

    let mut s1 = 0.0f64;
    let mut s2 = 0.0f64;
    for &x in signal {
        let s0 = x as f64 + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }

    let bin = Complex64::new(s1, 0.0) - Complex64::from_polar(s2, -w);
    let power = bin.norm_sqr() / (n as f64 * n as f64);
    if power.is_finite() {
        power.max(0.0) as f32
    } else {
        0.0
    }
}

/// Pseudo-spectrum over an evenly spaced frequency grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSweep {
    pub freqs: Vec<f32>,
    pub powers: Vec<f32>,
}

impl PowerSweep {
    /// Sweep `points` frequencies across `[min_hz, max_hz]` inclusive.
    pub fn compute(
        signal: &[f32],
        sample_rate: f32,
        min_hz: f32,
        max_hz: f32,
        points: usize,
    ) -> Self {
        let points = points.max(2);
        let step = (max_hz - min_hz) / (points - 1) as f32;

        let freqs: Vec<f32> = (0..points).map(|i| min_hz + step * i as f32).collect();
        let powers = freqs
            .iter()
            .map(|&f| goertzel_power(signal, sample_rate, f))
            .collect();

        Self { freqs, powers }
    }

    /// Frequency and power of the strongest point.
    pub fn peak(&self) -> Option<(f32, f32)> {
        self.freqs
            .iter()
            .zip(self.powers.iter())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(&f, &p)| (f, p))
    }

    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }
}
