//! Single-channel PPG analysis.
//!
//! Each call runs the whole pipeline over the current window:
//!
//! 1. Resample the irregular buffer onto a uniform grid
//! 2. Z-score, band-pass around the cardiac band, Savitzky-Golay smooth
//! 3. Goertzel sweep for the spectral rate, peak detection for the temporal rate
//! 4. Composite quality (EMA smoothed) and a two-threshold detection gate
//!    debounced by [`DetectionState`]
//!
//! # Usage
//!
//! ```ignore
//! let mut channel = ChannelAnalyzer::new(0, 1.0, ChannelConfig::default());
//! channel.push_sample(brightness, timestamp_ms);
//! let result = channel.analyze();
//! if result.is_finger_detected {
//!     println!("{:?} BPM (quality {:.0})", result.bpm, result.quality);
//! }
//! ```

use std::collections::VecDeque;

use crate::config::{ChannelConfig, DetectionThresholds};
use crate::dsp::{
    ac_dc_snr_db, median, spectral_snr_db, BandpassConfig, BandpassFilter, PeakDetector,
    PeakDetectorConfig, PowerSweep, SavitzkyGolay, NOISE_FLOOR_FRACTION,
};
use crate::hysteresis::DetectionState;
use crate::types::ChannelResult;

use super::buffer::SampleBuffer;

/// RR-history coefficient of variation at which the consistency factor reaches zero.
const RR_HISTORY_CV_CEILING: f32 = 0.25;

/// Per-call measurements the gate and the quality score work from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMetrics {
    /// Mean of the raw (uncalibrated) samples
    pub brightness: f32,
    /// Variance of the gain-calibrated signal
    pub variance: f32,
    /// Half peak-to-peak of the gain-calibrated signal
    pub ac_amplitude: f32,
    pub snr_db: f32,
    pub peak_power: f32,
    pub spectral_bpm: Option<f32>,
    pub temporal_bpm: Option<f32>,
    pub rr_count: usize,
    pub rr_cv: Option<f32>,
    /// Buffered span over the configured window, in [0, 1]
    pub window_fill: f32,
}

impl ChannelMetrics {
    /// Raw (un-debounced) detection verdict against one threshold set.
    pub fn passes(&self, t: &DetectionThresholds) -> bool {
        if !(t.min_brightness..=t.max_brightness).contains(&self.brightness) {
            return false;
        }
        if self.window_fill < t.min_window_fill
            || self.variance < t.min_variance
            || self.snr_db < t.min_snr_db
            || self.ac_amplitude < t.min_ac_amplitude
            || self.peak_power < t.min_peak_power
        {
            return false;
        }

        let in_range = |bpm: f32| (t.min_bpm..=t.max_bpm).contains(&bpm);
        let (spectral, temporal) = match (self.spectral_bpm, self.temporal_bpm) {
            (Some(s), Some(r)) if in_range(s) && in_range(r) => (s, r),
            _ => return false,
        };
        if (spectral - temporal).abs() > t.max_bpm_disagreement {
            return false;
        }

        self.rr_count >= t.min_rr_count && self.rr_cv.map_or(false, |cv| cv <= t.max_rr_cv)
    }
}

pub struct ChannelAnalyzer {
    channel_id: usize,
    config: ChannelConfig,
    gain: f32,
    buffer: SampleBuffer,
    smoother: SavitzkyGolay,
    /// Median RR (ms) of recent calls
    rr_history: VecDeque<f32>,
    quality_ema: Option<f32>,
    detection: DetectionState,
    dropped_samples: u64,
}

impl ChannelAnalyzer {
    pub fn new(channel_id: usize, initial_gain: f32, config: ChannelConfig) -> Self {
        let buffer = SampleBuffer::new(config.window_sec, config.buffer_capacity());
        let smoother = SavitzkyGolay::new(config.smoothing_window);
        let gain = if initial_gain.is_finite() {
            initial_gain.clamp(config.min_gain, config.max_gain)
        } else {
            1.0
        };

        Self {
            channel_id,
            gain,
            buffer,
            smoother,
            rr_history: VecDeque::with_capacity(config.rr_history_len),
            quality_ema: None,
            detection: DetectionState::new(),
            dropped_samples: 0,
            config,
        }
    }

    pub fn channel_id(&self) -> usize {
        self.channel_id
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set the absolute gain, clamped to the configured bounds.
    pub fn set_gain(&mut self, gain: f32) {
        if gain.is_finite() {
            self.gain = gain.clamp(self.config.min_gain, self.config.max_gain);
        }
    }

    /// Multiply the gain by `1 + delta`, clamped to the configured bounds.
    pub fn adjust_gain_rel(&mut self, delta: f32) {
        if delta.is_finite() {
            self.set_gain(self.gain * (1.0 + delta));
        }
    }

    pub fn is_detected(&self) -> bool {
        self.detection.is_detected
    }

    pub fn detection(&self) -> &DetectionState {
        &self.detection
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Samples rejected since construction (non-finite or out of order).
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Append one brightness sample. Returns `false` if it was dropped.
    pub fn push_sample(&mut self, value: f32, timestamp_ms: f64) -> bool {
        let accepted = self.buffer.push(value, timestamp_ms);
        if !accepted {
            self.dropped_samples += 1;
            log::debug!(
                "channel {}: dropped sample value={} t={}ms",
                self.channel_id,
                value,
                timestamp_ms
            );
        }
        accepted
    }

    /// Clear all accumulated state. Gain returns to unity.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.rr_history.clear();
        self.quality_ema = None;
        self.detection.reset();
        self.gain = 1.0_f32.clamp(self.config.min_gain, self.config.max_gain);
    }

    /// Analyze the current window.
    pub fn analyze(&mut self) -> ChannelResult {
        let now_ms = self.buffer.latest_time().map_or(0.0, |t| t * 1000.0);

        if self.buffer.len() < self.config.min_samples {
            return self.no_data(now_ms);
        }
        let uniform = match self.buffer.resample_uniform(self.config.resample_len) {
            Some(u) => u,
            None => return self.no_data(now_ms),
        };
        let fs = uniform.sample_rate;
        let raw = &uniform.values;

        // Amplitude statistics on raw values; calibrated ones scale with the gain.
        let n = raw.len() as f32;
        let brightness = raw.sum() / n;
        let raw_var = raw.iter().map(|x| (x - brightness).powi(2)).sum::<f32>() / n;
        let (lo, hi) = raw
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        let variance = raw_var * self.gain * self.gain;
        let ac_amplitude = (hi - lo) / 2.0 * self.gain;
        let ac_dc_snr = ac_dc_snr_db(&raw.to_vec());

        let std = raw_var.sqrt();
        let normalized = if std > 1e-6 {
            raw.mapv(|x| (x - brightness) / std)
        } else {
            raw.mapv(|x| x - brightness)
        };

        let mut bandpass = BandpassFilter::with_config(BandpassConfig {
            sample_rate: fs,
            center_hz: self.config.bandpass_center_hz,
            bandwidth_hz: self.config.bandpass_width_hz,
        });
        let filtered = bandpass.filter(&normalized);
        let conditioned = self.smoother.smooth(&filtered).to_vec();

        let sweep = PowerSweep::compute(
            &conditioned,
            fs,
            self.config.sweep_min_hz,
            self.config.sweep_max_hz,
            self.config.sweep_points,
        );
        let (peak_hz, peak_power) = sweep.peak().unwrap_or((0.0, 0.0));
        let spectral_bpm = if peak_power >= self.config.min_bpm_power {
            Some((peak_hz * 60.0).round())
        } else {
            None
        };
        let snr_db = spectral_snr_db(&sweep.powers, NOISE_FLOOR_FRACTION);

        let peaks = PeakDetector::with_config(PeakDetectorConfig {
            sample_rate: fs,
            threshold_k: self.config.peak_threshold_k,
            window_sec: self.config.peak_window_sec,
            max_bpm: self.config.max_peak_bpm,
            min_bpm: self.config.min_peak_bpm,
        })
        .detect(&conditioned);

        if let Some(rr) = median(&peaks.rr_intervals_ms) {
            if self.rr_history.len() >= self.config.rr_history_len.max(1) {
                self.rr_history.pop_front();
            }
            self.rr_history.push_back(rr);
        }

        let metrics = ChannelMetrics {
            brightness,
            variance,
            ac_amplitude,
            snr_db,
            peak_power,
            spectral_bpm,
            temporal_bpm: peaks.bpm(),
            rr_count: peaks.rr_intervals_ms.len(),
            rr_cv: peaks.rr_cv(),
            window_fill: (uniform.span_sec / self.config.window_sec.max(1e-3)).min(1.0),
        };

        let raw_quality = self.composite_quality(&metrics);
        let alpha = self.config.quality_ema_alpha;
        let quality = match self.quality_ema {
            Some(prev) => prev + alpha * (raw_quality - prev),
            None => raw_quality,
        };
        self.quality_ema = Some(quality);

        let was_detected = self.detection.is_detected;
        let thresholds = if was_detected {
            &self.config.maintain
        } else {
            &self.config.acquire
        };
        let qualifies = metrics.passes(thresholds);
        let detected = self
            .detection
            .update(qualifies, now_ms, &self.config.hysteresis);

        if detected != was_detected {
            log::info!(
                "channel {}: finger {} (quality {:.1}, bpm {:?})",
                self.channel_id,
                if detected { "acquired" } else { "lost" },
                quality,
                spectral_bpm
            );
        }
        log::trace!(
            "channel {}: fs={:.2} snr={:.1}dB ac/dc={:.1}dB power={:.3} var={:.3} \
             bpm={:?}/{:?} q={:.1}",
            self.channel_id,
            fs,
            snr_db,
            ac_dc_snr,
            peak_power,
            variance,
            metrics.spectral_bpm,
            metrics.temporal_bpm,
            quality
        );

        let plausible = |bpm: &f32| {
            (self.config.maintain.min_bpm..=self.config.maintain.max_bpm).contains(bpm)
        };
        let bpm = metrics
            .spectral_bpm
            .filter(plausible)
            .or_else(|| metrics.temporal_bpm.filter(plausible));

        ChannelResult {
            channel_id: self.channel_id,
            calibrated_signal: conditioned,
            bpm,
            rr_intervals: peaks.rr_intervals_ms,
            snr: snr_db,
            quality,
            is_finger_detected: detected,
            gain: self.gain,
            spectral_bpm: metrics.spectral_bpm,
            temporal_bpm: metrics.temporal_bpm,
            peak_power,
            rr_cv: metrics.rr_cv,
            ac_dc_snr,
        }
    }

    fn no_data(&mut self, now_ms: f64) -> ChannelResult {
        if self.detection.is_detected {
            log::info!("channel {}: finger lost (buffer drained)", self.channel_id);
        }
        self.detection.force_undetected(now_ms);
        ChannelResult::empty(self.channel_id, self.gain)
    }

    /// Weighted sum of saturating ramps, clamped to [0, 100].
    fn composite_quality(&self, m: &ChannelMetrics) -> f32 {
        let w = &self.config.quality;

        let snr_term = ramp(m.snr_db, w.snr_db_floor, w.snr_db_full);
        let variance_term = if m.variance > 0.0 {
            let decades = (m.variance / self.config.acquire.min_variance.max(1e-9)).log10();
            ramp(decades, 0.0, w.variance_decades_full)
        } else {
            0.0
        };
        let stability_term =
            0.5 * m.window_fill.clamp(0.0, 1.0) + 0.5 * self.rr_consistency(m.rr_cv);
        let power_term = ramp(m.peak_power, 0.0, w.peak_power_ref);

        let score = w.snr * snr_term
            + w.variance * variance_term
            + w.stability * stability_term
            + w.peak_power * power_term;
        if score.is_finite() {
            score.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// 1 for a steady rhythm across calls, 0 when none is measurable.
    fn rr_consistency(&self, current_cv: Option<f32>) -> f32 {
        let cv = if self.rr_history.len() >= 2 {
            let n = self.rr_history.len() as f32;
            let mean = self.rr_history.iter().sum::<f32>() / n;
            let var = self.rr_history.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
            Some(var.sqrt() / mean.max(1e-6))
        } else {
            current_cv
        };
        match cv {
            Some(cv) => 1.0 - ramp(cv, 0.0, RR_HISTORY_CV_CEILING),
            None => 0.0,
        }
    }
}

/// Linear 0..1 ramp between `lo` and `hi`.
fn ramp(x: f32, lo: f32, hi: f32) -> f32 {
    if !x.is_finite() || hi <= lo {
        return 0.0;
    }
    ((x - lo) / (hi - lo)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FS: f64 = 30.0;

    fn pulse_value(i: usize, hz: f64) -> f32 {
        let t = i as f64 / FS;
        (128.0 + 3.0 * (2.0 * PI * hz * t).sin()) as f32
    }

    fn feed_pulse(channel: &mut ChannelAnalyzer, frames: usize, hz: f64) -> ChannelResult {
        let mut last = ChannelResult::empty(channel.channel_id(), channel.gain());
        for i in 0..frames {
            channel.push_sample(pulse_value(i, hz), i as f64 * 1000.0 / FS);
            last = channel.analyze();
        }
        last
    }

    fn good_metrics() -> ChannelMetrics {
        ChannelMetrics {
            brightness: 128.0,
            variance: 4.0,
            ac_amplitude: 3.0,
            snr_db: 15.0,
            peak_power: 0.25,
            spectral_bpm: Some(72.0),
            temporal_bpm: Some(71.0),
            rr_count: 8,
            rr_cv: Some(0.02),
            window_fill: 1.0,
        }
    }

    #[test]
    fn test_insufficient_data_yields_empty_result() {
        let mut channel = ChannelAnalyzer::new(3, 1.2, ChannelConfig::default());
        for i in 0..49 {
            channel.push_sample(pulse_value(i, 1.2), i as f64 * 33.3);
        }
        let result = channel.analyze();
        assert_eq!(result.channel_id, 3);
        assert_eq!(result.bpm, None);
        assert_eq!(result.quality, 0.0);
        assert!(!result.is_finger_detected);
        assert!(result.calibrated_signal.is_empty());
    }

    #[test]
    fn test_clean_pulse_is_detected() {
        let mut channel = ChannelAnalyzer::new(0, 1.0, ChannelConfig::default());
        let result = feed_pulse(&mut channel, 300, 1.2);

        let bpm = result.bpm.expect("bpm");
        assert!((bpm - 72.0).abs() <= 3.0, "bpm {}", bpm);
        assert!(result.quality > 50.0, "quality {}", result.quality);
        assert!(result.is_finger_detected);
        assert!(result.snr > 6.0);
        assert_eq!(result.calibrated_signal.len(), 256);
        assert!(!result.rr_intervals.is_empty());
    }

    #[test]
    fn test_quality_stays_in_range() {
        let mut channel = ChannelAnalyzer::new(0, 1.0, ChannelConfig::default());
        for i in 0..200 {
            channel.push_sample(pulse_value(i, 1.5), i as f64 * 1000.0 / FS);
            let r = channel.analyze();
            assert!((0.0..=100.0).contains(&r.quality), "quality {}", r.quality);
        }
    }

    #[test]
    fn test_flat_signal_never_detected() {
        let mut channel = ChannelAnalyzer::new(0, 1.0, ChannelConfig::default());
        for i in 0..300 {
            channel.push_sample(128.0, i as f64 * 1000.0 / FS);
            let r = channel.analyze();
            assert!(!r.is_finger_detected);
            assert_eq!(r.bpm, None);
        }
    }

    #[test]
    fn test_dark_frame_fails_brightness_gate() {
        let mut m = good_metrics();
        assert!(m.passes(&DetectionThresholds::acquire()));
        m.brightness = 5.0;
        assert!(!m.passes(&DetectionThresholds::acquire()));
        m.brightness = 254.0;
        assert!(!m.passes(&DetectionThresholds::maintain()));
    }

    #[test]
    fn test_maintain_is_looser_than_acquire() {
        let mut m = good_metrics();
        m.snr_db = 5.0;
        m.peak_power = 0.03;
        m.variance = 0.03;
        m.spectral_bpm = Some(80.0);
        m.temporal_bpm = Some(65.0);
        m.window_fill = 0.6;
        assert!(!m.passes(&DetectionThresholds::acquire()));
        assert!(m.passes(&DetectionThresholds::maintain()));
    }

    #[test]
    fn test_gate_requires_rhythm() {
        let mut m = good_metrics();
        m.temporal_bpm = None;
        assert!(!m.passes(&DetectionThresholds::acquire()));

        let mut m = good_metrics();
        m.rr_cv = Some(0.5);
        assert!(!m.passes(&DetectionThresholds::acquire()));

        let mut m = good_metrics();
        m.rr_count = 1;
        assert!(!m.passes(&DetectionThresholds::maintain()));
    }

    #[test]
    fn test_gain_is_clamped() {
        let mut channel = ChannelAnalyzer::new(0, 1.0, ChannelConfig::default());
        for _ in 0..200 {
            channel.adjust_gain_rel(0.5);
        }
        assert_eq!(channel.gain(), 10.0);
        channel.adjust_gain_rel(-5.0);
        assert_eq!(channel.gain(), 0.1);
        channel.adjust_gain_rel(f32::NAN);
        assert_eq!(channel.gain(), 0.1);
        channel.set_gain(2.0);
        assert_eq!(channel.gain(), 2.0);
    }

    #[test]
    fn test_gain_scales_calibrated_amplitude_only() {
        let config = ChannelConfig::default();
        let mut low = ChannelAnalyzer::new(0, 0.5, config.clone());
        let mut high = ChannelAnalyzer::new(1, 2.0, config);
        let a = feed_pulse(&mut low, 240, 1.2);
        let b = feed_pulse(&mut high, 240, 1.2);
        // Frequency content is gain-invariant
        assert_eq!(a.spectral_bpm, b.spectral_bpm);
        assert_eq!(a.gain, 0.5);
        assert_eq!(b.gain, 2.0);
    }

    #[test]
    fn test_drops_out_of_order_samples() {
        let mut channel = ChannelAnalyzer::new(0, 1.0, ChannelConfig::default());
        assert!(channel.push_sample(100.0, 10.0));
        assert!(!channel.push_sample(100.0, 5.0));
        assert!(!channel.push_sample(f32::NAN, 20.0));
        assert_eq!(channel.dropped_samples(), 2);
        assert_eq!(channel.buffer_len(), 1);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut channel = ChannelAnalyzer::new(0, 1.4, ChannelConfig::default());
        feed_pulse(&mut channel, 300, 1.2);
        assert!(channel.is_detected());

        channel.reset();
        assert_eq!(channel.buffer_len(), 0);
        assert!(!channel.is_detected());
        assert_eq!(channel.gain(), 1.0);
        let r = channel.analyze();
        assert_eq!(r.quality, 0.0);
        assert_eq!(r.bpm, None);
    }

    #[test]
    fn test_reports_ac_dc_snr() {
        let mut channel = ChannelAnalyzer::new(0, 1.0, ChannelConfig::default());
        let result = feed_pulse(&mut channel, 240, 1.2);
        // AC ~3 over DC 128
        assert!(
            (-33.5..=-32.0).contains(&result.ac_dc_snr),
            "ac/dc {}",
            result.ac_dc_snr
        );
        assert_eq!(ChannelResult::empty(0, 1.0).ac_dc_snr, 0.0);
    }

    #[test]
    fn test_buffer_spans_full_window_at_60fps() {
        let config = ChannelConfig::default();
        let window = config.window_sec;
        let mut channel = ChannelAnalyzer::new(0, 1.0, config);
        for i in 0..720 {
            channel.push_sample(128.0, i as f64 * 1000.0 / 60.0);
        }
        // Trimmed by time, not by the capacity cap
        let expected = (window * 60.0) as usize;
        assert!(
            (expected..=expected + 1).contains(&channel.buffer_len()),
            "len {}",
            channel.buffer_len()
        );
    }

    #[test]
    fn test_ramp() {
        assert_eq!(ramp(5.0, 0.0, 10.0), 0.5);
        assert_eq!(ramp(-1.0, 0.0, 10.0), 0.0);
        assert_eq!(ramp(20.0, 0.0, 10.0), 1.0);
        assert_eq!(ramp(f32::NAN, 0.0, 10.0), 0.0);
    }
}
