//! Rolling sample window with uniform resampling.

use ndarray::Array1;
use std::collections::VecDeque;

use crate::types::Sample;

/// Uniformly resampled view of the buffer.
#[derive(Debug, Clone)]
pub struct UniformSignal {
    pub values: Array1<f32>,
    /// Effective sample rate of the grid (Hz)
    pub sample_rate: f32,
    /// Time covered by the grid (seconds)
    pub span_sec: f32,
}

/// Time-windowed sample buffer.
///
/// Timestamps are strictly increasing, trimming only removes from the front,
/// and the length never exceeds `capacity`.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    window_sec: f64,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(window_sec: f32, capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            window_sec: window_sec.max(0.0) as f64,
            capacity,
        }
    }

    /// Append a sample and trim to the window. Returns `false` when the sample
    /// is dropped (non-finite value or a timestamp that does not advance).
    pub fn push(&mut self, value: f32, timestamp_ms: f64) -> bool {
        if !value.is_finite() || !timestamp_ms.is_finite() {
            return false;
        }
        let time = timestamp_ms / 1000.0;
        if let Some(last) = self.samples.back() {
            if time <= last.time {
                return false;
            }
        }

        self.samples.push_back(Sample { time, value });
        self.trim(time);
        true
    }

    fn trim(&mut self, latest: f64) {
        let cutoff = latest - self.window_sec;
        while let Some(front) = self.samples.front() {
            if front.time < cutoff || self.samples.len() > self.capacity {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn latest_time(&self) -> Option<f64> {
        self.samples.back().map(|s| s.time)
    }

    /// Seconds between the oldest and newest sample.
    pub fn span_sec(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(a), Some(b)) => b.time - a.time,
            _ => 0.0,
        }
    }

    /// Linear interpolation onto `len` evenly spaced points spanning the buffer.
    ///
    /// Single forward pass: the bracketing pair only ever moves forward.
    pub fn resample_uniform(&self, len: usize) -> Option<UniformSignal> {
        let n = self.samples.len();
        let span = self.span_sec();
        if n < 2 || len < 2 || span <= 0.0 {
            return None;
        }

        let t0 = self.samples[0].time;
        let dt = span / (len - 1) as f64;
        let mut values = Array1::zeros(len);
        let mut j = 0usize;

        for k in 0..len {
            let t = if k == len - 1 { t0 + span } else { t0 + dt * k as f64 };
            while j + 2 < n && self.samples[j + 1].time < t {
                j += 1;
            }
            let a = self.samples[j];
            let b = self.samples[j + 1];
            let frac = ((t - a.time) / (b.time - a.time)).clamp(0.0, 1.0) as f32;
            values[k] = a.value + (b.value - a.value) * frac;
        }

        Some(UniformSignal {
            values,
            sample_rate: ((len - 1) as f64 / span) as f32,
            span_sec: span as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trims_to_window() {
        let mut buf = SampleBuffer::new(1.0, 1000);
        for i in 0..100 {
            buf.push(i as f32, i as f64 * 100.0);
        }
        // 9.9 s latest; keep [8.9, 9.9]
        assert_eq!(buf.len(), 11);
        assert_relative_eq!(buf.span_sec(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_capacity_bound() {
        let mut buf = SampleBuffer::new(100.0, 10);
        for i in 0..50 {
            buf.push(1.0, i as f64);
        }
        assert_eq!(buf.len(), 10);
        // Oldest samples were dropped, never the newest
        assert_relative_eq!(buf.latest_time().unwrap(), 0.049, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_non_monotonic_and_non_finite() {
        let mut buf = SampleBuffer::new(8.0, 100);
        assert!(buf.push(1.0, 100.0));
        assert!(!buf.push(2.0, 100.0));
        assert!(!buf.push(2.0, 50.0));
        assert!(!buf.push(f32::NAN, 200.0));
        assert!(!buf.push(1.0, f64::INFINITY));
        assert!(buf.push(2.0, 133.0));
        assert_eq!(buf.len(), 2);

        let times: Vec<f64> = buf.iter().map(|s| s.time).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_resample_linear_ramp() {
        let mut buf = SampleBuffer::new(10.0, 1000);
        // Irregular timestamps on a linear ramp value = 2 * t
        let times = [0.0, 0.03, 0.07, 0.1, 0.16, 0.2, 0.24, 0.3];
        for &t in &times {
            buf.push(2.0 * t as f32, t * 1000.0);
        }
        let u = buf.resample_uniform(16).unwrap();
        assert_eq!(u.values.len(), 16);
        assert_relative_eq!(u.span_sec, 0.3, epsilon = 1e-6);
        assert_relative_eq!(u.sample_rate, 50.0, epsilon = 1e-3);
        for (k, v) in u.values.iter().enumerate() {
            let t = 0.3 * k as f32 / 15.0;
            assert_relative_eq!(*v, 2.0 * t, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_resample_needs_two_samples() {
        let mut buf = SampleBuffer::new(8.0, 100);
        assert!(buf.resample_uniform(256).is_none());
        buf.push(1.0, 0.0);
        assert!(buf.resample_uniform(256).is_none());
    }
}
