//! Per-channel analysis: a rolling sample window and the analyzer that turns
//! it into a heart-rate estimate, a quality score and a debounced detection flag.

mod analyzer;
mod buffer;

pub use analyzer::{ChannelAnalyzer, ChannelMetrics};
pub use buffer::{SampleBuffer, UniformSignal};
