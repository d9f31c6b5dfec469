//! Robust BPM aggregation across channels.

use serde::Serialize;

use crate::dsp::median;

/// One channel's BPM estimate with its quality weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BpmCandidate {
    pub bpm: f32,
    pub quality: f32,
}

/// Quartile by linear interpolation on sorted data.
fn quartile(sorted: &[f32], q: f32) -> f32 {
    let pos = q * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f32)
}

/// Combine per-channel BPM estimates.
///
/// * `qualified` - candidates that passed the quality and range filters
/// * `fallback` - every plausible BPM, regardless of quality
///
/// With no qualified candidate the plain mean of `fallback` is returned.
/// Otherwise values outside `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]` are dropped and
/// the survivors are averaged with quality weights. If nothing survives the
/// fence the median of the qualified values is used.
pub fn aggregate_bpm(qualified: &[BpmCandidate], fallback: &[f32]) -> Option<f32> {
    let qualified: Vec<BpmCandidate> = qualified
        .iter()
        .copied()
        .filter(|c| c.bpm.is_finite() && c.quality.is_finite())
        .collect();

    if qualified.is_empty() {
        let plausible: Vec<f32> = fallback.iter().copied().filter(|b| b.is_finite()).collect();
        if plausible.is_empty() {
            return None;
        }
        return Some(plausible.iter().sum::<f32>() / plausible.len() as f32);
    }

    let mut sorted: Vec<f32> = qualified.iter().map(|c| c.bpm).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q1 = quartile(&sorted, 0.25);
    let q3 = quartile(&sorted, 0.75);
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

    let (survivors, outliers): (Vec<BpmCandidate>, Vec<BpmCandidate>) = qualified
        .iter()
        .partition(|c| c.bpm >= lo && c.bpm <= hi);
    if !outliers.is_empty() {
        log::debug!(
            "rejected {} BPM outlier(s) outside [{:.1}, {:.1}]: {:?}",
            outliers.len(),
            lo,
            hi,
            outliers.iter().map(|c| c.bpm).collect::<Vec<_>>()
        );
    }

    if survivors.is_empty() {
        return median(&sorted);
    }

    let total_weight: f32 = survivors.iter().map(|c| c.quality.max(0.0)).sum();
    if total_weight <= 0.0 {
        return Some(survivors.iter().map(|c| c.bpm).sum::<f32>() / survivors.len() as f32);
    }
    Some(
        survivors
            .iter()
            .map(|c| c.bpm * c.quality.max(0.0))
            .sum::<f32>()
            / total_weight,
    )
}
