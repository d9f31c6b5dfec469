//! DSP module
//!
//! Signal-conditioning and estimation primitives used by the channel analyzer.
//!
//! - `BandpassFilter` - biquad band-pass around the cardiac band
//! - `SavitzkyGolay` - peak-preserving quadratic smoothing
//! - `PowerSweep` / `goertzel_power` - narrow-band pseudo-spectrum
//! - `PeakDetector` - adaptive-threshold beat detection with RR extraction
//! - `spectral_snr_db` - robust peak-over-floor SNR
//! - `ac_dc_snr_db` - AC over DC amplitude ratio of the raw window

mod filters;
mod peaks;
mod signal_quality;
mod smoothing;
mod spectral;

pub use filters::{BandpassConfig, BandpassFilter};
pub use peaks::{median, PeakDetection, PeakDetector, PeakDetectorConfig};
pub use signal_quality::{ac_dc_snr_db, spectral_snr_db, EPSILON, NOISE_FLOOR_FRACTION};
pub use smoothing::{sg_quadratic_coefficients, SavitzkyGolay};
pub use spectral::{goertzel_power, PowerSweep};
