//! Configuration for the PPG analysis core.
//!
//! All thresholds are fixed at construction. A host may load them from TOML
//! (optionally with `ZENB_PPG_*` environment overrides) or use the defaults,
//! which are tuned for 20-60 fps fingertip capture.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PpgConfig {
    pub channel: ChannelConfig,
    pub ensemble: EnsembleConfig,
}

/// Debounce parameters for a boolean detection decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HysteresisConfig {
    /// Consecutive qualifying frames before flipping to detected
    pub frames_to_confirm: u32,
    /// Consecutive disqualifying frames before flipping to not detected
    pub frames_to_lose: u32,
    /// Minimum time since the last toggle before detection may be lost (ms)
    pub min_hold_ms: f64,
}

/// Gate thresholds for one channel's detection decision.
///
/// Two instances exist: `acquire` (strict, used while not detected) and
/// `maintain` (loose, used while detected).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionThresholds {
    /// Raw brightness mean must lie in [min, max]
    pub min_brightness: f32,
    pub max_brightness: f32,
    /// Variance floor of the gain-calibrated signal
    pub min_variance: f32,
    /// Pseudo-spectrum SNR floor (dB)
    pub min_snr_db: f32,
    /// Half peak-to-peak floor of the gain-calibrated signal
    pub min_ac_amplitude: f32,
    /// Goertzel power floor at the spectral peak
    pub min_peak_power: f32,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Largest tolerated |spectral - temporal| BPM difference
    pub max_bpm_disagreement: f32,
    /// RR coefficient-of-variation ceiling
    pub max_rr_cv: f32,
    /// RR intervals required before the rhythm checks apply
    pub min_rr_count: usize,
    /// Buffered span as a fraction of the window
    pub min_window_fill: f32,
}

/// Weights of the composite channel quality score.
///
/// The weights sum to the maximum score (100 by default). Every term is a
/// saturating ramp in [0, 1] so the score is monotone in each factor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityWeights {
    pub snr: f32,
    pub variance: f32,
    pub stability: f32,
    pub peak_power: f32,
    /// SNR (dB) where the SNR term starts rising
    pub snr_db_floor: f32,
    /// SNR (dB) where the SNR term saturates
    pub snr_db_full: f32,
    /// Decades of variance above the acquire floor for a full variance term
    pub variance_decades_full: f32,
    /// Peak power for a full peak-power term
    pub peak_power_ref: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Sliding window length (seconds)
    pub window_sec: f32,
    /// Highest supported capture rate (Hz), only used to bound buffer memory
    pub max_sample_rate: f32,
    /// Buffer capacity as a multiple of the window's expected sample count
    pub buffer_headroom: f32,
    /// Minimum buffered samples before analysis runs
    pub min_samples: usize,
    /// Length of the uniform resampling grid
    pub resample_len: usize,
    pub bandpass_center_hz: f32,
    pub bandpass_width_hz: f32,
    /// Savitzky-Golay window (odd, >= 5)
    pub smoothing_window: usize,
    pub sweep_min_hz: f32,
    pub sweep_max_hz: f32,
    pub sweep_points: usize,
    /// Power floor below which no spectral BPM is reported
    pub min_bpm_power: f32,
    /// Peak threshold = local mean + k * local std
    pub peak_threshold_k: f32,
    /// Width of the local window for the peak threshold (seconds)
    pub peak_window_sec: f32,
    /// Fastest plausible rhythm; sets the refractory distance
    pub max_peak_bpm: f32,
    /// Slowest plausible rhythm; longer RR gaps are discarded
    pub min_peak_bpm: f32,
    /// Number of per-call median RR values kept across calls
    pub rr_history_len: usize,
    pub quality_ema_alpha: f32,
    pub acquire: DetectionThresholds,
    pub maintain: DetectionThresholds,
    pub hysteresis: HysteresisConfig,
    pub quality: QualityWeights,
    pub min_gain: f32,
    pub max_gain: f32,
}

/// Per-channel proportional gain controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GainFeedbackConfig {
    /// Detected channels below this quality get boosted
    pub low_quality: f32,
    /// Detected channels above this quality get cut (saturation risk)
    pub high_quality: f32,
    pub boost: f32,
    pub cut: f32,
    /// Undetected channels above this gain are pulled down
    pub high_gain: f32,
    pub pull_down: f32,
    /// Undetected channels below this gain that show some signal are pushed up
    pub low_gain: f32,
    pub push_up: f32,
    /// Quality that counts as "some signal" for an undetected channel
    pub min_signal_quality: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub channel_count: usize,
    /// Initial gains are spread over [1 - spread, 1 + spread]
    pub initial_gain_spread: f32,
    pub coverage_ema_alpha: f32,
    pub motion_ema_alpha: f32,
    pub min_coverage: f32,
    pub max_motion: f32,
    /// Fraction of channels that must be detected for consensus
    pub consensus_fraction: f32,
    /// Mean quality floor over detected channels
    pub min_detected_quality: f32,
    /// Coverage/motion bounds for the looser pre-detection condition
    pub pre_detection_coverage: f32,
    pub pre_detection_max_motion: f32,
    pub hysteresis: HysteresisConfig,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Per-channel quality floor for a BPM candidate
    pub min_candidate_quality: f32,
    pub gain: GainFeedbackConfig,
    pub agreement_bonus_max: f32,
    pub stability_bonus: f32,
    pub flap_penalty_per_frame: f32,
    pub flap_penalty_max: f32,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            frames_to_confirm: 3,
            frames_to_lose: 6,
            min_hold_ms: 500.0,
        }
    }
}

impl DetectionThresholds {
    pub fn acquire() -> Self {
        Self {
            min_brightness: 20.0,
            max_brightness: 250.0,
            min_variance: 0.05,
            min_snr_db: 6.0,
            min_ac_amplitude: 0.25,
            min_peak_power: 0.05,
            min_bpm: 45.0,
            max_bpm: 180.0,
            max_bpm_disagreement: 10.0,
            max_rr_cv: 0.25,
            min_rr_count: 4,
            min_window_fill: 0.95,
        }
    }

    pub fn maintain() -> Self {
        Self {
            min_brightness: 15.0,
            max_brightness: 253.0,
            min_variance: 0.025,
            min_snr_db: 4.0,
            min_ac_amplitude: 0.15,
            min_peak_power: 0.025,
            min_bpm: 45.0,
            max_bpm: 180.0,
            max_bpm_disagreement: 20.0,
            max_rr_cv: 0.35,
            min_rr_count: 2,
            min_window_fill: 0.5,
        }
    }

    /// True when `self` is at least as strict as `other` on every threshold.
    pub fn is_stricter_than(&self, other: &Self) -> bool {
        self.min_brightness >= other.min_brightness
            && self.max_brightness <= other.max_brightness
            && self.min_variance >= other.min_variance
            && self.min_snr_db >= other.min_snr_db
            && self.min_ac_amplitude >= other.min_ac_amplitude
            && self.min_peak_power >= other.min_peak_power
            && self.min_bpm >= other.min_bpm
            && self.max_bpm <= other.max_bpm
            && self.max_bpm_disagreement <= other.max_bpm_disagreement
            && self.max_rr_cv <= other.max_rr_cv
            && self.min_rr_count >= other.min_rr_count
            && self.min_window_fill >= other.min_window_fill
    }
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            snr: 35.0,
            variance: 20.0,
            stability: 25.0,
            peak_power: 20.0,
            snr_db_floor: 3.0,
            snr_db_full: 15.0,
            variance_decades_full: 2.0,
            peak_power_ref: 0.2,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            window_sec: 8.0,
            max_sample_rate: 60.0,
            buffer_headroom: 1.5,
            min_samples: 50,
            resample_len: 256,
            bandpass_center_hz: 1.6,
            bandpass_width_hz: 1.0,
            smoothing_window: 7,
            sweep_min_hz: 0.8,
            sweep_max_hz: 4.0,
            sweep_points: 161,
            min_bpm_power: 0.02,
            peak_threshold_k: 0.5,
            peak_window_sec: 2.0,
            max_peak_bpm: 190.0,
            min_peak_bpm: 40.0,
            rr_history_len: 10,
            quality_ema_alpha: 0.25,
            acquire: DetectionThresholds::acquire(),
            maintain: DetectionThresholds::maintain(),
            hysteresis: HysteresisConfig::default(),
            quality: QualityWeights::default(),
            min_gain: 0.1,
            max_gain: 10.0,
        }
    }
}

impl Default for GainFeedbackConfig {
    fn default() -> Self {
        Self {
            low_quality: 40.0,
            high_quality: 90.0,
            boost: 0.05,
            cut: -0.02,
            high_gain: 2.0,
            pull_down: -0.03,
            low_gain: 0.5,
            push_up: 0.05,
            min_signal_quality: 10.0,
        }
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            channel_count: 6,
            initial_gain_spread: 0.4,
            coverage_ema_alpha: 0.15,
            motion_ema_alpha: 0.15,
            min_coverage: 0.5,
            max_motion: 8.0,
            consensus_fraction: 0.32,
            min_detected_quality: 35.0,
            pre_detection_coverage: 0.8,
            pre_detection_max_motion: 3.0,
            hysteresis: HysteresisConfig {
                frames_to_confirm: 6,
                frames_to_lose: 25,
                min_hold_ms: 1000.0,
            },
            min_bpm: 45.0,
            max_bpm: 180.0,
            min_candidate_quality: 30.0,
            gain: GainFeedbackConfig::default(),
            agreement_bonus_max: 20.0,
            stability_bonus: 10.0,
            flap_penalty_per_frame: 0.5,
            flap_penalty_max: 15.0,
        }
    }
}

impl ChannelConfig {
    /// Upper bound on buffered samples.
    pub fn buffer_capacity(&self) -> usize {
        let most = self.window_sec * self.max_sample_rate;
        ((most * self.buffer_headroom).ceil() as usize).max(self.min_samples)
    }
}

impl EnsembleConfig {
    /// Detected channels required for consensus: ceil(n * fraction), at least 1.
    pub fn consensus_count(&self) -> usize {
        let n = self.channel_count as f32;
        ((n * self.consensus_fraction).ceil() as usize).max(1)
    }
}

impl PpgConfig {
    /// Defaults with the two knobs hosts usually set.
    pub fn with_channels(channel_count: usize, window_sec: f32) -> Self {
        let mut config = Self::default();
        config.ensemble.channel_count = channel_count;
        config.channel.window_sec = window_sec;
        config
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: PpgConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    /// Variables are prefixed with ZENB_PPG_, e.g. ZENB_PPG_CHANNEL_COUNT=8
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        use std::env;

        fn parse<T: std::str::FromStr>(name: &str, val: String) -> Result<T, ConfigError> {
            val.trim()
                .parse()
                .map_err(|_| ConfigError::Validation(format!("Invalid {}", name)))
        }

        if let Ok(val) = env::var("ZENB_PPG_CHANNEL_COUNT") {
            self.ensemble.channel_count = parse("ZENB_PPG_CHANNEL_COUNT", val)?;
        }
        if let Ok(val) = env::var("ZENB_PPG_WINDOW_SEC") {
            self.channel.window_sec = parse("ZENB_PPG_WINDOW_SEC", val)?;
        }
        if let Ok(val) = env::var("ZENB_PPG_MAX_SAMPLE_RATE") {
            self.channel.max_sample_rate = parse("ZENB_PPG_MAX_SAMPLE_RATE", val)?;
        }
        if let Ok(val) = env::var("ZENB_PPG_FRAMES_TO_CONFIRM") {
            self.ensemble.hysteresis.frames_to_confirm = parse("ZENB_PPG_FRAMES_TO_CONFIRM", val)?;
        }
        if let Ok(val) = env::var("ZENB_PPG_FRAMES_TO_LOSE") {
            self.ensemble.hysteresis.frames_to_lose = parse("ZENB_PPG_FRAMES_TO_LOSE", val)?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.channel;
        let e = &self.ensemble;

        if c.window_sec <= 0.0 {
            return Err(ConfigError::Validation(
                "channel.window_sec must be positive".to_string(),
            ));
        }
        if c.max_sample_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "channel.max_sample_rate must be positive".to_string(),
            ));
        }
        if c.buffer_headroom < 1.0 {
            return Err(ConfigError::Validation(
                "channel.buffer_headroom must be >= 1.0".to_string(),
            ));
        }
        if c.min_samples < 8 || c.resample_len < c.min_samples {
            return Err(ConfigError::Validation(
                "channel.min_samples must be >= 8 and <= resample_len".to_string(),
            ));
        }
        if c.smoothing_window < 5 || c.smoothing_window % 2 == 0 {
            return Err(ConfigError::Validation(
                "channel.smoothing_window must be odd and >= 5".to_string(),
            ));
        }
        let nyquist = c.max_sample_rate / 2.0;
        if c.sweep_min_hz <= 0.0 || c.sweep_min_hz >= c.sweep_max_hz || c.sweep_max_hz >= nyquist {
            return Err(ConfigError::Validation(
                "channel sweep range must satisfy 0 < min < max < Nyquist".to_string(),
            ));
        }
        if c.sweep_points < 2 {
            return Err(ConfigError::Validation(
                "channel.sweep_points must be >= 2".to_string(),
            ));
        }
        if c.bandpass_center_hz <= 0.0
            || c.bandpass_width_hz <= 0.0
            || c.bandpass_center_hz >= nyquist
        {
            return Err(ConfigError::Validation(
                "channel band-pass center/width must be positive and below Nyquist".to_string(),
            ));
        }
        if c.max_peak_bpm <= c.min_peak_bpm || c.min_peak_bpm <= 0.0 {
            return Err(ConfigError::Validation(
                "channel.max_peak_bpm must be > min_peak_bpm > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&c.quality_ema_alpha) || c.quality_ema_alpha == 0.0 {
            return Err(ConfigError::Validation(
                "channel.quality_ema_alpha must be in (0, 1]".to_string(),
            ));
        }
        if !c.acquire.is_stricter_than(&c.maintain) {
            return Err(ConfigError::Validation(
                "channel.acquire thresholds must be at least as strict as channel.maintain"
                    .to_string(),
            ));
        }
        let w = &c.quality;
        if [w.snr, w.variance, w.stability, w.peak_power].iter().any(|&x| x < 0.0) {
            return Err(ConfigError::Validation(
                "channel.quality weights must be non-negative".to_string(),
            ));
        }
        if w.snr_db_full <= w.snr_db_floor
            || w.variance_decades_full <= 0.0
            || w.peak_power_ref <= 0.0
        {
            return Err(ConfigError::Validation(
                "channel.quality ramps must have positive width".to_string(),
            ));
        }
        if c.min_gain <= 0.0 || c.min_gain >= c.max_gain {
            return Err(ConfigError::Validation(
                "channel gain bounds must satisfy 0 < min_gain < max_gain".to_string(),
            ));
        }

        if e.channel_count == 0 {
            return Err(ConfigError::Validation(
                "ensemble.channel_count must be >= 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&e.initial_gain_spread) {
            return Err(ConfigError::Validation(
                "ensemble.initial_gain_spread must be in [0, 1)".to_string(),
            ));
        }
        for (name, alpha) in [
            ("coverage_ema_alpha", e.coverage_ema_alpha),
            ("motion_ema_alpha", e.motion_ema_alpha),
        ] {
            if alpha <= 0.0 || alpha > 1.0 {
                return Err(ConfigError::Validation(format!(
                    "ensemble.{} must be in (0, 1]",
                    name
                )));
            }
        }
        if !(0.0..=1.0).contains(&e.consensus_fraction) {
            return Err(ConfigError::Validation(
                "ensemble.consensus_fraction must be in [0, 1]".to_string(),
            ));
        }
        if e.pre_detection_coverage < e.min_coverage || e.pre_detection_max_motion > e.max_motion {
            return Err(ConfigError::Validation(
                "ensemble pre-detection bounds must be stricter than the strong gate".to_string(),
            ));
        }
        if e.hysteresis.frames_to_confirm == 0 || e.hysteresis.frames_to_lose == 0 {
            return Err(ConfigError::Validation(
                "ensemble hysteresis frame counts must be > 0".to_string(),
            ));
        }
        if e.min_bpm >= e.max_bpm {
            return Err(ConfigError::Validation(
                "ensemble.min_bpm must be < max_bpm".to_string(),
            ));
        }

        Ok(())
    }

    /// Export configuration to TOML string
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self
            .to_toml_string()
            .map_err(|e| ConfigError::Validation(format!("TOML serialization error: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        PpgConfig::default().validate().unwrap();
    }

    #[test]
    fn test_consensus_count() {
        let mut e = EnsembleConfig::default();
        assert_eq!(e.consensus_count(), 2); // ceil(6 * 0.32)
        e.channel_count = 1;
        assert_eq!(e.consensus_count(), 1);
        e.channel_count = 10;
        assert_eq!(e.consensus_count(), 4);
    }

    #[test]
    fn test_buffer_capacity() {
        let c = ChannelConfig::default();
        // 8 s at 60 fps with 1.5x headroom
        assert_eq!(c.buffer_capacity(), 720);
    }

    #[test]
    fn test_rejects_even_smoothing_window() {
        let mut config = PpgConfig::default();
        config.channel.smoothing_window = 6;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_loose_acquire_thresholds() {
        let mut config = PpgConfig::default();
        config.channel.acquire.min_snr_db = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_channels() {
        let config = PpgConfig::with_channels(0, 8.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let mut config = PpgConfig::with_channels(4, 6.0);
        config.ensemble.hysteresis.frames_to_lose = 30;

        let file = NamedTempFile::new().unwrap();
        config.save_to_file(file.path()).unwrap();

        let loaded = PpgConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.ensemble.channel_count, 4);
        assert_eq!(loaded.channel.window_sec, 6.0);
        assert_eq!(loaded.ensemble.hysteresis.frames_to_lose, 30);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PpgConfig = toml::from_str("[ensemble]\nchannel_count = 3\n").unwrap();
        assert_eq!(config.ensemble.channel_count, 3);
        assert_eq!(config.channel.resample_len, 256);
        config.validate().unwrap();
    }
}
