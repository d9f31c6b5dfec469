//! Debounced detection state machine.
//!
//! Used both per channel and at ensemble level, with different frame counts.
//!
//! ```text
//!   Unconfirmed --qualifying--> Acquiring --frames_to_confirm--> Confirmed
//!        ^                                                          |
//!        |                                                   disqualifying
//!        +---- frames_to_lose AND min_hold_ms elapsed ---- Losing <-+
//! ```
//!
//! Time is injected by the caller (sample timestamps), never read from a clock.

use serde::Serialize;

use crate::config::HysteresisConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectionPhase {
    /// Not detected, no pending evidence
    Unconfirmed,
    /// Not detected, accumulating qualifying frames
    Acquiring,
    /// Detected and the latest frame qualified
    Confirmed,
    /// Detected, accumulating disqualifying frames
    Losing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionState {
    pub is_detected: bool,
    pub consecutive_true_frames: u32,
    pub consecutive_false_frames: u32,
    /// Time (ms) of the last flip, `None` until the first one
    pub last_toggle_ms: Option<f64>,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionState {
    pub fn new() -> Self {
        Self {
            is_detected: false,
            consecutive_true_frames: 0,
            consecutive_false_frames: 0,
            last_toggle_ms: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn phase(&self) -> DetectionPhase {
        match (self.is_detected, self.consecutive_true_frames, self.consecutive_false_frames) {
            (false, 0, _) => DetectionPhase::Unconfirmed,
            (false, _, _) => DetectionPhase::Acquiring,
            (true, _, 0) => DetectionPhase::Confirmed,
            (true, _, _) => DetectionPhase::Losing,
        }
    }

    /// Feed one frame's raw verdict. Returns the debounced detection flag.
    pub fn update(&mut self, qualifies: bool, now_ms: f64, cfg: &HysteresisConfig) -> bool {
        if qualifies {
            self.consecutive_true_frames = self.consecutive_true_frames.saturating_add(1);
            self.consecutive_false_frames = 0;
        } else {
            self.consecutive_false_frames = self.consecutive_false_frames.saturating_add(1);
            self.consecutive_true_frames = 0;
        }

        if !self.is_detected {
            if self.consecutive_true_frames >= cfg.frames_to_confirm.max(1) {
                self.is_detected = true;
                self.last_toggle_ms = Some(now_ms);
            }
        } else if self.consecutive_false_frames >= cfg.frames_to_lose.max(1)
            && self.held_long_enough(now_ms, cfg.min_hold_ms)
        {
            self.is_detected = false;
            self.last_toggle_ms = Some(now_ms);
        }

        self.is_detected
    }

    /// Force the not-detected state (e.g. when the buffer ran dry).
    pub fn force_undetected(&mut self, now_ms: f64) {
        if self.is_detected {
            self.last_toggle_ms = Some(now_ms);
        }
        self.is_detected = false;
        self.consecutive_true_frames = 0;
    }

    fn held_long_enough(&self, now_ms: f64, min_hold_ms: f64) -> bool {
        match self.last_toggle_ms {
            Some(t) => now_ms - t >= min_hold_ms,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> HysteresisConfig {
        HysteresisConfig {
            frames_to_confirm: 3,
            frames_to_lose: 5,
            min_hold_ms: 200.0,
        }
    }

    #[test]
    fn test_confirms_after_consecutive_frames() {
        let mut s = DetectionState::new();
        assert!(!s.update(true, 0.0, &cfg()));
        assert_eq!(s.phase(), DetectionPhase::Acquiring);
        assert!(!s.update(true, 33.0, &cfg()));
        assert!(s.update(true, 66.0, &cfg()));
        assert_eq!(s.phase(), DetectionPhase::Confirmed);
        assert_eq!(s.last_toggle_ms, Some(66.0));
    }

    #[test]
    fn test_interrupted_acquisition_restarts() {
        let mut s = DetectionState::new();
        s.update(true, 0.0, &cfg());
        s.update(true, 33.0, &cfg());
        s.update(false, 66.0, &cfg());
        assert_eq!(s.phase(), DetectionPhase::Unconfirmed);
        s.update(true, 100.0, &cfg());
        s.update(true, 133.0, &cfg());
        assert!(!s.is_detected);
        assert!(s.update(true, 166.0, &cfg()));
    }

    #[test]
    fn test_loss_requires_full_count() {
        let mut s = DetectionState::new();
        for i in 0..3 {
            s.update(true, i as f64 * 33.0, &cfg());
        }
        let mut t = 10_000.0;
        for _ in 0..4 {
            assert!(s.update(false, t, &cfg()));
            t += 33.0;
        }
        assert_eq!(s.phase(), DetectionPhase::Losing);
        assert!(!s.update(false, t, &cfg()));
        assert_eq!(s.phase(), DetectionPhase::Unconfirmed);
    }

    #[test]
    fn test_hold_time_delays_loss() {
        let mut s = DetectionState::new();
        for i in 0..3 {
            s.update(true, i as f64, &cfg());
        }
        // Toggle happened at t=2ms; the next 5 false frames land before the hold expires.
        for i in 0..5 {
            assert!(s.update(false, 10.0 + i as f64, &cfg()));
        }
        // Still disqualifying, now past the hold.
        assert!(!s.update(false, 250.0, &cfg()));
    }

    #[test]
    fn test_single_good_frame_resets_loss_count() {
        let mut s = DetectionState::new();
        for i in 0..3 {
            s.update(true, i as f64, &cfg());
        }
        for i in 0..4 {
            s.update(false, 1000.0 + i as f64, &cfg());
        }
        s.update(true, 1010.0, &cfg());
        for i in 0..4 {
            assert!(s.update(false, 1020.0 + i as f64, &cfg()));
        }
    }

    #[test]
    fn test_force_undetected() {
        let mut s = DetectionState::new();
        for i in 0..3 {
            s.update(true, i as f64, &cfg());
        }
        s.force_undetected(500.0);
        assert!(!s.is_detected);
        assert_eq!(s.last_toggle_ms, Some(500.0));
        assert_eq!(s.phase(), DetectionPhase::Unconfirmed);
    }
}
