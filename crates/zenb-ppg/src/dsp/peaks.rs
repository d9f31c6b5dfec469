//! Time-domain heartbeat detection.
//!
//! Local maxima above an adaptive threshold (local mean + k * local std),
//! separated by a refractory distance derived from the fastest plausible
//! heart rate. Inter-beat gaps longer than the slowest plausible rhythm are
//! treated as dropouts and produce no RR interval.

#[derive(Debug, Clone)]
pub struct PeakDetectorConfig {
    /// Sample rate in Hz
    pub sample_rate: f32,
    /// Threshold sensitivity (mean + k * std)
    pub threshold_k: f32,
    /// Width of the local statistics window in seconds
    pub window_sec: f32,
    /// Fastest plausible rhythm (sets the refractory distance)
    pub max_bpm: f32,
    /// Slowest plausible rhythm (longer gaps are rejected)
    pub min_bpm: f32,
}

impl Default for PeakDetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 30.0,
            threshold_k: 0.5,
            window_sec: 2.0,
            max_bpm: 190.0, // ~0.32 s refractory
            min_bpm: 40.0,  // 1.5 s longest gap
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakDetection {
    /// Peak positions in (fractional) samples
    pub peaks: Vec<f32>,
    /// Accepted inter-beat intervals in milliseconds
    pub rr_intervals_ms: Vec<f32>,
}

impl PeakDetection {
    /// BPM from the median RR interval.
    pub fn bpm(&self) -> Option<f32> {
        let rr = median(&self.rr_intervals_ms)?;
        if rr > 0.0 {
            Some(60_000.0 / rr)
        } else {
            None
        }
    }

    /// Coefficient of variation of the RR intervals.
    pub fn rr_cv(&self) -> Option<f32> {
        let n = self.rr_intervals_ms.len();
        if n < 2 {
            return None;
        }
        let mean = self.rr_intervals_ms.iter().sum::<f32>() / n as f32;
        let var = self.rr_intervals_ms.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n as f32;
        Some(var.sqrt() / mean.max(1e-6))
    }
}

pub struct PeakDetector {
    cfg: PeakDetectorConfig,
}

impl PeakDetector {
    pub fn new() -> Self {
        Self::with_config(PeakDetectorConfig::default())
    }

    pub fn with_config(cfg: PeakDetectorConfig) -> Self {
        Self { cfg }
    }

    pub fn detect(&self, signal: &[f32]) -> PeakDetection {
        let n = signal.len();
        let fs = self.cfg.sample_rate.max(1e-3);
        if n < 3 {
            return PeakDetection::default();
        }

        let threshold = self.local_threshold(signal);
        let min_dist = 60.0 / self.cfg.max_bpm.max(1.0) * fs;
        let max_gap_ms = 60_000.0 / self.cfg.min_bpm.max(1.0);

        let mut peaks: Vec<f32> = Vec::new();
        let mut heights: Vec<f32> = Vec::new();

        for i in 1..n - 1 {
            let y = signal[i];
            if !(y > threshold[i] && y > signal[i - 1] && y >= signal[i + 1]) {
                continue;
            }
            let pos = i as f32 + parabolic_offset(signal[i - 1], y, signal[i + 1]);

            match (peaks.last_mut(), heights.last_mut()) {
                (Some(last_pos), Some(last_h)) if pos - *last_pos < min_dist => {
                    // Inside the refractory window: keep the taller one
                    if y > *last_h {
                        *last_pos = pos;
                        *last_h = y;
                    }
                }
                _ => {
                    peaks.push(pos);
                    heights.push(y);
                }
            }
        }

        let rr_intervals_ms = peaks
            .windows(2)
            .map(|w| (w[1] - w[0]) / fs * 1000.0)
            .filter(|&rr| rr <= max_gap_ms)
            .collect();

        PeakDetection { peaks, rr_intervals_ms }
    }

    /// mean + k * std over a centered window, via prefix sums.
    fn local_threshold(&self, signal: &[f32]) -> Vec<f32> {
        let n = signal.len();
        let half = ((self.cfg.window_sec * self.cfg.sample_rate) / 2.0).round().max(1.0) as usize;

        let mut sum = vec![0.0f64; n + 1];
        let mut sum_sq = vec![0.0f64; n + 1];
        for (i, &x) in signal.iter().enumerate() {
            sum[i + 1] = sum[i] + x as f64;
            sum_sq[i + 1] = sum_sq[i] + (x as f64) * (x as f64);
        }

        (0..n)
            .map(|i| {
                let lo = i.saturating_sub(half);
                let hi = (i + half + 1).min(n);
                let count = (hi - lo) as f64;
                let mean = (sum[hi] - sum[lo]) / count;
                let var = ((sum_sq[hi] - sum_sq[lo]) / count - mean * mean).max(0.0);
                (mean + self.cfg.threshold_k as f64 * var.sqrt()) as f32
            })
            .collect()
    }
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Sub-sample vertex offset of the parabola through three points, in [-0.5, 0.5].
fn parabolic_offset(y_m1: f32, y_0: f32, y_p1: f32) -> f32 {
    let denom = y_m1 - 2.0 * y_0 + y_p1;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    let delta = 0.5 * (y_m1 - y_p1) / denom;
    if delta.is_finite() {
        delta.clamp(-0.5, 0.5)
    } else {
        0.0
    }
}

/// Median of a slice; `None` when empty. NaNs sort last.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
