//! # zenb-ppg
//!
//! Contact (fingertip-on-camera) photoplethysmography for ZenB.
//!
//! This crate provides:
//! - **Channel analysis**: band-pass + Savitzky-Golay conditioning, Goertzel
//!   spectral sweep and peak-based RR extraction over a sliding window
//! - **Ensemble consensus**: N gain-diverse channels combined into one
//!   debounced finger-presence flag, an outlier-robust BPM and a quality score
//! - **Configuration**: TOML with `ZENB_PPG_*` environment overrides
//!
//! The analysis path is synchronous and infallible: degenerate input yields
//! "no BPM, not detected", never an error.
//!
//! ## Example
//!
//! ```ignore
//! use zenb_ppg::{ChannelEnsemble, Frame};
//!
//! let mut ensemble = ChannelEnsemble::new();
//!
//! for frame in camera_frames {
//!     let result = ensemble.process_frame(Frame {
//!         value: frame.brightness,
//!         timestamp_ms: frame.timestamp_ms,
//!         coverage: frame.coverage,
//!         motion: frame.motion,
//!     });
//!     if let (true, Some(bpm)) = (result.finger_detected, result.aggregated_bpm) {
//!         println!("Heart rate: {:.0} BPM (quality {:.0})", bpm, result.aggregated_quality);
//!     }
//! }
//! ```

pub mod channel;
pub mod config;
pub mod dsp;
pub mod ensemble;
pub mod hysteresis;
pub mod types;

pub use channel::ChannelAnalyzer;
pub use config::{ChannelConfig, ConfigError, EnsembleConfig, PpgConfig};
pub use ensemble::ChannelEnsemble;
pub use hysteresis::{DetectionPhase, DetectionState};
pub use types::{ChannelResult, Frame, MultiChannelResult, Sample};
