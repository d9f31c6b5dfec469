//! Signal-to-noise estimators.

use super::peaks::median;

/// Smallest denominator used in any ratio.
pub const EPSILON: f32 = 1e-9;

/// Share of the lowest pseudo-spectrum values treated as the noise floor.
pub const NOISE_FLOOR_FRACTION: f32 = 0.7;

/// Pseudo-spectrum SNR in dB.
///
/// Signal is the largest power; noise is the median of the lowest
/// `noise_fraction` of values (robust to a single deep notch, unlike the raw
/// minimum). Returns 0 when there is nothing to measure.
pub fn spectral_snr_db(powers: &[f32], noise_fraction: f32) -> f32 {
    let finite: Vec<f32> = powers.iter().copied().filter(|p| p.is_finite()).collect();
    if finite.len() < 2 {
        return 0.0;
    }

    let mut sorted = finite;
    sorted.sort_by(|a, b| a.total_cmp(b));

    let signal = *sorted.last().unwrap_or(&0.0);
    let keep = ((sorted.len() as f32 * noise_fraction.clamp(0.05, 1.0)).round() as usize)
        .clamp(1, sorted.len());
    let noise = median(&sorted[..keep]).unwrap_or(0.0);

    if signal <= 0.0 {
        return 0.0;
    }
    10.0 * (signal.max(EPSILON) / noise.max(EPSILON)).log10()
}

/// Amplitude SNR (dB) from an AC/DC decomposition of one channel:
/// AC is the half peak-to-peak amplitude, DC the mean level. This is the
/// classic perfusion-style ratio reported next to the spectral SNR.
pub fn ac_dc_snr_db(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    let (min, max, sum) = signal
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY, 0.0f32), |(lo, hi, s), &x| {
            (lo.min(x), hi.max(x), s + x)
        });
    let ac = (max - min) / 2.0;
    let dc = (sum / signal.len() as f32).abs();
    if ac <= 0.0 || !ac.is_finite() {
        return 0.0;
    }
    20.0 * (ac / dc.max(EPSILON)).log10()
}
