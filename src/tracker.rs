use tracing::{debug, trace};

/// Label the classifier uses for sadness
pub const SAD_LABEL: &str = "sad";

/// Where the tracker is within a sadness episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    /// Accumulator is zero
    Idle,
    /// Sad for a while, not yet at the threshold
    Accumulating,
    /// Threshold crossed; suppressed until the next reset
    Triggered,
}

/// Accumulates time spent with "sad" as the dominant emotion.
///
/// Edge-triggered: `observe` returns `true` once per sustained run, on the
/// sample where the accumulator first reaches the threshold.
#[derive(Debug, Clone)]
pub struct SadnessTracker {
    accumulated_seconds: f64,
    threshold_seconds: f64,
    phase: TrackerPhase,
}

impl SadnessTracker {
    pub fn new(threshold_seconds: f64) -> Self {
        Self {
            accumulated_seconds: 0.0,
            threshold_seconds: threshold_seconds.max(0.0),
            phase: TrackerPhase::Idle,
        }
    }

    /// Feed one dominant-label observation taken `sample_interval_seconds`
    /// after the previous one. Returns `true` only on the threshold crossing.
    pub fn observe(&mut self, dominant_label: &str, sample_interval_seconds: f64) -> bool {
        if dominant_label != SAD_LABEL {
            if self.phase != TrackerPhase::Idle {
                debug!(
                    "Sadness run interrupted by '{}' after {:.2}s",
                    dominant_label, self.accumulated_seconds
                );
            }
            self.reset();
            return false;
        }

        self.accumulated_seconds += sample_interval_seconds.max(0.0);
        trace!(
            "Sad for {:.2}s (threshold {:.2}s)",
            self.accumulated_seconds,
            self.threshold_seconds
        );

        match self.phase {
            TrackerPhase::Triggered => false,
            _ if self.accumulated_seconds >= self.threshold_seconds => {
                self.phase = TrackerPhase::Triggered;
                debug!(
                    "Sadness threshold reached after {:.2}s",
                    self.accumulated_seconds
                );
                true
            }
            _ => {
                self.phase = if self.accumulated_seconds > 0.0 {
                    TrackerPhase::Accumulating
                } else {
                    TrackerPhase::Idle
                };
                false
            }
        }
    }

    /// Zero the accumulator and re-arm the trigger
    pub fn reset(&mut self) {
        self.accumulated_seconds = 0.0;
        self.phase = TrackerPhase::Idle;
    }

    pub fn accumulated_seconds(&self) -> f64 {
        self.accumulated_seconds
    }

    pub fn threshold_seconds(&self) -> f64 {
        self.threshold_seconds
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }
}
