//! Savitzky-Golay smoothing.
//!
//! Fits a quadratic to each sliding window of `2m + 1` samples. Keeps pulse
//! peaks sharper than a moving average of the same length.
//!
//! Reference: Savitzky & Golay, Analytical Chemistry 36(8), 1964.

use ndarray::Array1;

/// Quadratic smoothing coefficients for a window of `2m + 1` points.
///
/// Closed form: `c_i = (3(3m² + 3m - 1) - 15 i²) / ((4m² - 1)(2m + 3))`.
pub fn sg_quadratic_coefficients(half_width: usize) -> Vec<f32> {
    let m = half_width.max(1) as f64;
    let norm = (4.0 * m * m - 1.0) * (2.0 * m + 3.0);
    let base = 3.0 * (3.0 * m * m + 3.0 * m - 1.0);

    let m = m as i64;
    (-m..=m)
        .map(|i| ((base - 15.0 * (i * i) as f64) / norm) as f32)
        .collect()
}

#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    window: usize,
    coeffs: Vec<f32>,
}

impl SavitzkyGolay {
    /// `window` is rounded up to the next odd length and to at least 5.
    pub fn new(window: usize) -> Self {
        let window = window.max(5) | 1;
        Self {
            window,
            coeffs: sg_quadratic_coefficients(window / 2),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Smooth with mirrored edges. Signals shorter than the window pass through.
    pub fn smooth(&self, signal: &Array1<f32>) -> Array1<f32> {
        let n = signal.len();
        if n < self.window {
            return signal.clone();
        }

        let m = (self.window / 2) as isize;
        let last = n as isize - 1;
        let mut out = Array1::zeros(n);

        for i in 0..n as isize {
            let mut acc = 0.0f32;
            for (k, &c) in self.coeffs.iter().enumerate() {
                let mut j = i + k as isize - m;
                if j < 0 {
                    j = -j;
                } else if j > last {
                    j = 2 * last - j;
                }
                acc += c * signal[j as usize];
            }
            out[i as usize] = acc;
        }

        out
    }
}

impl Default for SavitzkyGolay {
    fn default() -> Self {
        Self::new(7)
    }
}
