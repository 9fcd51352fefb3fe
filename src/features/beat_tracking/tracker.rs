//! Phase-locked beat tracking
//!
//! A minimal phase-locked loop over the onset stream: the tempo side
//! supplies a slew-limited beat period, the onset side nudges a phase
//! origin so that beats fall at `origin + k * period`. The correction
//! uses the median wrapped phase error of the most recent onsets,
//! which keeps a single spurious onset from yanking the grid.

/// Beat period bounds in seconds (40..240 BPM)
const PERIOD_RANGE: (f64, f64) = (0.25, 1.5);

/// Maximum onsets considered per phase correction
const PHASE_ONSETS: usize = 5;

/// Proportional gain of the phase correction
const PHASE_GAIN: f64 = 0.35;

/// Phase-locked beat state
pub struct BeatTracker {
    period_sec: Option<f64>,
    phase_origin_sec: f64,
    has_phase: bool,
}

impl BeatTracker {
    /// Tracker with no period and no phase yet.
    pub fn new() -> Self {
        Self {
            period_sec: None,
            phase_origin_sec: 0.0,
            has_phase: false,
        }
    }

    /// Fold a new tempo into the beat period, rate-limited so the grid
    /// never jumps.
    pub fn update_bpm(&mut self, bpm: f64) {
        if bpm <= 0.0 {
            return;
        }
        let new_period = 60.0 / bpm;
        let period = match self.period_sec {
            None => new_period,
            Some(current) => {
                let step = (0.06 * current).max(0.02);
                new_period.clamp(current - step, current + step)
            }
        };
        self.period_sec = Some(period.clamp(PERIOD_RANGE.0, PERIOD_RANGE.1));
    }

    /// Nudge the phase origin toward the observed onsets.
    ///
    /// The first onsets seen establish the phase outright; afterwards
    /// the median wrapped error of the last few onsets is applied with
    /// proportional gain.
    pub fn on_onsets(&mut self, onset_times_sec: &[f64]) {
        let Some(&latest) = onset_times_sec.last() else {
            return;
        };

        if !self.has_phase {
            self.phase_origin_sec = latest;
            self.has_phase = true;
            return;
        }

        let Some(period) = self.period_sec else {
            return;
        };

        let start = onset_times_sec.len().saturating_sub(PHASE_ONSETS);
        let mut errors: Vec<f64> = onset_times_sec[start..]
            .iter()
            .map(|&t| {
                let phase = (t - self.phase_origin_sec).rem_euclid(period);
                // Wrap to [-T/2, T/2]
                if phase > period * 0.5 {
                    phase - period
                } else {
                    phase
                }
            })
            .collect();

        errors.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = errors[errors.len() / 2];
        self.phase_origin_sec += PHASE_GAIN * median;
    }

    /// Next beat instant at or after `now_sec`, once phase-locked.
    pub fn next_beat(&self, now_sec: f64) -> Option<f64> {
        if !self.has_phase {
            return None;
        }
        let period = self.period_sec?;
        let k = ((now_sec - self.phase_origin_sec) / period).ceil();
        Some(self.phase_origin_sec + k * period)
    }

    /// Current beat period in seconds, once a tempo has been applied.
    pub fn period(&self) -> Option<f64> {
        self.period_sec
    }

    /// True once the phase origin is established.
    pub fn has_phase(&self) -> bool {
        self.has_phase
    }
}

impl Default for BeatTracker {
    fn default() -> Self {
        Self::new()
    }
}
