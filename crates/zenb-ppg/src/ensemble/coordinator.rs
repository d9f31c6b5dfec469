//! Channel ensemble coordinator.
//!
//! Owns N channel analyzers fed with identical samples but seeded with a
//! spread of gains, and turns their per-channel verdicts into one debounced
//! finger-presence flag, one BPM and one quality score per frame.
//!
//! # Usage
//!
//! ```ignore
//! let mut ensemble = ChannelEnsemble::new();
//! for frame in frames {
//!     let result = ensemble.process_frame(frame);
//!     if result.finger_detected {
//!         let quality = result.aggregated_quality;
//!         println!("HR: {:?} BPM (quality {:.0})", result.aggregated_bpm, quality);
//!     }
//! }
//! ```

use crate::channel::ChannelAnalyzer;
use crate::config::{EnsembleConfig, PpgConfig};
use crate::hysteresis::DetectionState;
use crate::types::{ChannelResult, Frame, MultiChannelResult};

use super::aggregation::{aggregate_bpm, BpmCandidate};

pub struct ChannelEnsemble {
    config: EnsembleConfig,
    channels: Vec<ChannelAnalyzer>,
    detection: DetectionState,
    smoothed_coverage: Option<f32>,
    smoothed_motion: Option<f32>,
    /// Consecutive frames where the raw verdict disagrees with the debounced state
    flap_frames: u32,
    last_timestamp_ms: f64,
}

impl Default for ChannelEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelEnsemble {
    pub fn new() -> Self {
        Self::with_config(PpgConfig::default())
    }

    pub fn with_config(config: PpgConfig) -> Self {
        let n = config.ensemble.channel_count.max(1);
        let spread = config.ensemble.initial_gain_spread;
        let channels = (0..n)
            .map(|i| {
                let gain = if n == 1 {
                    1.0
                } else {
                    1.0 + spread * (2.0 * i as f32 / (n - 1) as f32 - 1.0)
                };
                ChannelAnalyzer::new(i, gain, config.channel.clone())
            })
            .collect();

        Self {
            config: config.ensemble,
            channels,
            detection: DetectionState::new(),
            smoothed_coverage: None,
            smoothed_motion: None,
            flap_frames: 0,
            last_timestamp_ms: 0.0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[ChannelAnalyzer] {
        &self.channels
    }

    pub fn detection(&self) -> &DetectionState {
        &self.detection
    }

    pub fn is_detected(&self) -> bool {
        self.detection.is_detected
    }

    /// Fan one sample out to every channel.
    pub fn push_sample(&mut self, value: f32, timestamp_ms: f64) {
        let mut accepted = false;
        for channel in &mut self.channels {
            accepted |= channel.push_sample(value, timestamp_ms);
        }
        if accepted {
            self.last_timestamp_ms = timestamp_ms;
        }
    }

    /// Push and analyze one frame.
    pub fn process_frame(&mut self, frame: Frame) -> MultiChannelResult {
        self.push_sample(frame.value, frame.timestamp_ms);
        self.analyze_all(frame.coverage, frame.motion)
    }

    /// Per-frame entry point.
    pub fn analyze_all(&mut self, coverage_ratio: f32, motion_metric: f32) -> MultiChannelResult {
        let coverage = smooth(
            &mut self.smoothed_coverage,
            coverage_ratio.clamp(0.0, 1.0),
            self.config.coverage_ema_alpha,
        );
        // f32::max would turn NaN into 0; let smooth() see it instead
        let motion_metric = if motion_metric.is_nan() {
            motion_metric
        } else {
            motion_metric.max(0.0)
        };
        let motion = smooth(
            &mut self.smoothed_motion,
            motion_metric,
            self.config.motion_ema_alpha,
        );

        let results: Vec<ChannelResult> =
            self.channels.iter_mut().map(|c| c.analyze()).collect();

        let n = results.len();
        let detected: Vec<&ChannelResult> =
            results.iter().filter(|r| r.is_finger_detected).collect();
        let detected_count = detected.len();
        let detected_quality = if detected_count > 0 {
            detected.iter().map(|r| r.quality).sum::<f32>() / detected_count as f32
        } else {
            0.0
        };

        let in_range = |bpm: f32| (self.config.min_bpm..=self.config.max_bpm).contains(&bpm);
        let plausible: Vec<f32> = results
            .iter()
            .filter_map(|r| r.bpm)
            .filter(|&b| in_range(b))
            .collect();
        let candidates: Vec<BpmCandidate> = results
            .iter()
            .filter(|r| r.quality >= self.config.min_candidate_quality)
            .filter_map(|r| {
                r.bpm
                    .filter(|&b| in_range(b))
                    .map(|bpm| BpmCandidate { bpm, quality: r.quality })
            })
            .collect();

        let position_ok = coverage >= self.config.min_coverage && motion <= self.config.max_motion;
        let strong = position_ok
            && detected_count >= self.config.consensus_count()
            && detected_quality >= self.config.min_detected_quality;
        let pre_detection = coverage >= self.config.pre_detection_coverage
            && motion <= self.config.pre_detection_max_motion;
        let qualifies = strong || pre_detection;

        let was_detected = self.detection.is_detected;
        let finger_detected = self
            .detection
            .update(qualifies, self.last_timestamp_ms, &self.config.hysteresis);

        if finger_detected != was_detected {
            log::info!(
                "ensemble: finger {} ({}/{} channels, coverage {:.2}, motion {:.2})",
                if finger_detected { "acquired" } else { "lost" },
                detected_count,
                n,
                coverage,
                motion
            );
        }

        if qualifies == finger_detected {
            self.flap_frames = 0;
        } else {
            self.flap_frames = self.flap_frames.saturating_add(1);
        }

        self.apply_gain_feedback(&results);

        let aggregated_bpm = aggregate_bpm(&candidates, &plausible);
        let aggregated_quality = self.aggregate_quality(&results, detected_count);

        MultiChannelResult {
            timestamp: self.last_timestamp_ms,
            channels: results,
            aggregated_bpm,
            aggregated_quality,
            finger_detected,
            detected_channels: detected_count,
            smoothed_coverage: coverage,
            smoothed_motion: motion,
            phase: self.detection.phase(),
        }
    }

    /// Bounded proportional gain controller, one step per frame.
    fn apply_gain_feedback(&mut self, results: &[ChannelResult]) {
        let g = &self.config.gain;
        for (channel, result) in self.channels.iter_mut().zip(results) {
            let gain = channel.gain();
            let delta = if result.is_finger_detected {
                if result.quality < g.low_quality {
                    g.boost
                } else if result.quality > g.high_quality {
                    g.cut
                } else {
                    continue;
                }
            } else if gain > g.high_gain {
                g.pull_down
            } else if gain < g.low_gain && result.quality >= g.min_signal_quality {
                g.push_up
            } else {
                continue;
            };

            channel.adjust_gain_rel(delta);
            log::debug!(
                "channel {}: gain {:.3} -> {:.3} (quality {:.1}, detected {})",
                channel.channel_id(),
                gain,
                channel.gain(),
                result.quality,
                result.is_finger_detected
            );
        }
    }

    fn aggregate_quality(&self, results: &[ChannelResult], detected_count: usize) -> f32 {
        if results.is_empty() {
            return 0.0;
        }
        let n = results.len() as f32;
        let mean = results.iter().map(|r| r.quality).sum::<f32>() / n;
        let agreement = self.config.agreement_bonus_max * detected_count as f32 / n;
        let stable = self.detection.is_detected
            && self.detection.consecutive_true_frames >= self.config.hysteresis.frames_to_confirm;
        let stability = if stable { self.config.stability_bonus } else { 0.0 };
        let penalty = (self.flap_frames as f32 * self.config.flap_penalty_per_frame)
            .min(self.config.flap_penalty_max);

        let score = mean + agreement + stability - penalty;
        if score.is_finite() {
            score.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// Passthrough to one channel; out-of-range ids are ignored.
    pub fn adjust_channel_gain(&mut self, channel_id: usize, delta: f32) {
        match self.channels.get_mut(channel_id) {
            Some(channel) => channel.adjust_gain_rel(delta),
            None => log::debug!("adjust_channel_gain: no channel {}", channel_id),
        }
    }

    /// Restart detection from scratch. Every gain returns to 1.0.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.detection.reset();
        self.smoothed_coverage = None;
        self.smoothed_motion = None;
        self.flap_frames = 0;
        self.last_timestamp_ms = 0.0;
    }
}

/// EMA step seeded with the first finite value. Non-finite inputs keep the previous value.
fn smooth(state: &mut Option<f32>, value: f32, alpha: f32) -> f32 {
    let next = match (*state, value.is_finite()) {
        (Some(prev), true) => prev + alpha * (value - prev),
        (Some(prev), false) => prev,
        (None, true) => value,
        (None, false) => 0.0,
    };
    *state = Some(next);
    next
}
