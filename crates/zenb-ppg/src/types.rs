//! Value types exchanged across the core boundary.

use serde::{Deserialize, Serialize};

use crate::hysteresis::DetectionPhase;

/// One brightness sample. `time` is in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: f32,
}

/// One captured frame as delivered by the video-capture collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Scalar brightness derived from the ROI's red/green means
    pub value: f32,
    /// Monotonic capture timestamp in milliseconds
    pub timestamp_ms: f64,
    /// Fraction of the ROI judged to be skin-bright, in [0, 1]
    pub coverage: f32,
    /// Frame-difference magnitude, in raw brightness units
    pub motion: f32,
}

/// Per-channel analysis output. Recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelResult {
    pub channel_id: usize,
    /// Conditioned (filtered + smoothed) waveform on the resampling grid
    pub calibrated_signal: Vec<f32>,
    pub bpm: Option<f32>,
    pub rr_intervals: Vec<f32>,
    /// Pseudo-spectrum SNR in dB
    pub snr: f32,
    /// Smoothed quality score in [0, 100]
    pub quality: f32,
    pub is_finger_detected: bool,
    pub gain: f32,

    // Diagnostics
    pub spectral_bpm: Option<f32>,
    pub temporal_bpm: Option<f32>,
    pub peak_power: f32,
    pub rr_cv: Option<f32>,
    /// AC over DC amplitude of the raw window, in dB
    pub ac_dc_snr: f32,
}

impl ChannelResult {
    /// The "no usable data" result.
    pub fn empty(channel_id: usize, gain: f32) -> Self {
        Self {
            channel_id,
            calibrated_signal: Vec::new(),
            bpm: None,
            rr_intervals: Vec::new(),
            snr: 0.0,
            quality: 0.0,
            is_finger_detected: false,
            gain,
            spectral_bpm: None,
            temporal_bpm: None,
            peak_power: 0.0,
            rr_cv: None,
            ac_dc_snr: 0.0,
        }
    }
}

/// The core's sole output, produced once per ensemble analysis call.
///
/// `aggregated_bpm == None` together with `finger_detected == false` means
/// "no usable signal yet", never a heart rate of zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiChannelResult {
    /// Timestamp (ms) of the latest sample seen by the ensemble
    pub timestamp: f64,
    pub channels: Vec<ChannelResult>,
    pub aggregated_bpm: Option<f32>,
    pub aggregated_quality: f32,
    pub finger_detected: bool,

    // Diagnostics
    pub detected_channels: usize,
    pub smoothed_coverage: f32,
    pub smoothed_motion: f32,
    pub phase: DetectionPhase,
}
