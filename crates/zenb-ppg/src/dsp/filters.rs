//! Band-pass filtering for PPG conditioning.
//!
//! Second-order (biquad) band-pass with constant 0 dB peak gain, designed from
//! center frequency and -3 dB bandwidth. Runs in Direct Form II Transposed with
//! f64 state so the narrow cardiac band stays stable at camera frame rates.

use ndarray::Array1;
use std::f64::consts::PI;

/// Band-pass filter configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandpassConfig {
    /// Sample rate in Hz
    pub sample_rate: f32,
    /// Center frequency in Hz
    pub center_hz: f32,
    /// -3 dB bandwidth in Hz
    pub bandwidth_hz: f32,
}

impl Default for BandpassConfig {
    fn default() -> Self {
        Self {
            sample_rate: 30.0,
            center_hz: 1.6,  // ~96 BPM
            bandwidth_hz: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BandpassFilter {
    config: BandpassConfig,
    /// Numerator [b0, b1, b2]
    b: [f64; 3],
    /// Denominator [a1, a2], a0 normalized to 1
    a: [f64; 2],
    state: [f64; 2],
}

impl BandpassFilter {
    pub fn new() -> Self {
        Self::with_config(BandpassConfig::default())
    }

    pub fn with_config(config: BandpassConfig) -> Self {
        let fs = (config.sample_rate as f64).max(1e-3);
        let nyquist = fs / 2.0;
        // Keep the design away from DC and Nyquist where the biquad degenerates.
        let f0 = (config.center_hz as f64).clamp(1e-3, nyquist * 0.95);
        let bw = (config.bandwidth_hz as f64).max(1e-3);
        let q = (f0 / bw).max(0.1);

        let w0 = 2.0 * PI * f0 / fs;
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            config,
            b: [alpha / a0, 0.0, -alpha / a0],
            a: [-2.0 * w0.cos() / a0, (1.0 - alpha) / a0],
            state: [0.0; 2],
        }
    }

    pub fn config(&self) -> &BandpassConfig {
        &self.config
    }

    /// Clear internal state so the next buffer starts fresh.
    pub fn reset(&mut self) {
        self.state = [0.0; 2];
    }

    pub fn process_sample(&mut self, input: f32) -> f32 {
        let x = input as f64;
        let y = self.b[0] * x + self.state[0];
        self.state[0] = self.b[1] * x - self.a[0] * y + self.state[1];
        self.state[1] = self.b[2] * x - self.a[1] * y;
        y as f32
    }

    /// Filter a whole buffer. State is reset first, so calls never leak into each other.
    pub fn filter(&mut self, signal: &Array1<f32>) -> Array1<f32> {
        self.reset();
        signal.mapv(|x| self.process_sample(x))
    }

    /// Magnitude response at `freq_hz`.
    #[cfg(test)]
    fn magnitude_at(&self, freq_hz: f32) -> f32 {
        let w = 2.0 * PI * freq_hz as f64 / self.config.sample_rate as f64;
        let (c1, s1) = (w.cos(), -w.sin());
        let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        let num_re = self.b[0] + self.b[1] * c1 + self.b[2] * c2;
        let num_im = self.b[1] * s1 + self.b[2] * s2;
        let den_re = 1.0 + self.a[0] * c1 + self.a[1] * c2;
        let den_im = self.a[0] * s1 + self.a[1] * s2;
        let num = (num_re * num_re + num_im * num_im).sqrt();
        let den = (den_re * den_re + den_im * den_im).sqrt().max(1e-12);
        (num / den) as f32
    }
}

impl Default for BandpassFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn sine(n: usize, fs: f32, hz: f32) -> Array1<f32> {
        (0..n).map(|i| (2.0 * PI * hz * i as f32 / fs).sin()).collect()
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn test_unity_gain_at_center() {
        let filter = BandpassFilter::with_config(BandpassConfig {
            sample_rate: 32.0,
            center_hz: 1.6,
            bandwidth_hz: 1.0,
        });
        assert_relative_eq!(filter.magnitude_at(1.6), 1.0, epsilon = 1e-3);
        assert!(filter.magnitude_at(0.1) < 0.2);
        assert!(filter.magnitude_at(10.0) < 0.2);
    }

    #[test]
    fn test_passes_cardiac_band_rejects_drift() {
        let mut filter = BandpassFilter::with_config(BandpassConfig {
            sample_rate: 30.0,
            center_hz: 1.6,
            bandwidth_hz: 1.0,
        });
        let n = 300;

        let pulse = filter.filter(&sine(n, 30.0, 1.5));
        let drift = filter.filter(&sine(n, 30.0, 0.05));

        // Skip the start-up transient
        let pulse_rms = rms(&pulse.as_slice().unwrap()[60..]);
        let drift_rms = rms(&drift.as_slice().unwrap()[60..]);
        assert!(pulse_rms > 0.6, "pulse rms {}", pulse_rms);
        assert!(drift_rms < 0.1, "drift rms {}", drift_rms);
    }

    #[test]
    fn test_filter_resets_between_buffers() {
        let mut filter = BandpassFilter::new();
        let signal = sine(128, 30.0, 1.2);
        let first = filter.filter(&signal);
        let second = filter.filter(&signal);
        assert_eq!(first, second);
    }

    #[test]
    fn test_stable_across_supported_rates() {
        for &fs in &[16.0f32, 30.0, 64.0] {
            for &f0 in &[0.7f32, 1.6, 3.0] {
                let mut filter = BandpassFilter::with_config(BandpassConfig {
                    sample_rate: fs,
                    center_hz: f0,
                    bandwidth_hz: 0.8,
                });
                let mut impulse = Array1::zeros(2048);
                impulse[0] = 1.0;
                let out = filter.filter(&impulse);
                let tail = out
                    .slice(ndarray::s![1900..])
                    .iter()
                    .fold(0.0f32, |m, v| m.max(v.abs()));
                assert!(out.iter().all(|v| v.is_finite()));
                assert!(tail < 1e-3, "fs={} f0={} tail={}", fs, f0, tail);
            }
        }
    }
}
