//! Multi-channel consensus: ensemble detection, gain feedback and BPM aggregation.

mod aggregation;
mod coordinator;

pub use aggregation::{aggregate_bpm, BpmCandidate};
pub use coordinator::ChannelEnsemble;
