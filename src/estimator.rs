use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    config::{TempoConfig, MAX_HISTORY_LIMIT},
    error::Result,
};

/// Monotonic clock reading supplied by the caller for each tap.
pub type Timestamp = Instant;

/// Smoothed tempo estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Estimate {
    #[default]
    Unset,
    Value(f64),
}

impl Estimate {
    pub fn value(self) -> Option<f64> {
        match self {
            Estimate::Unset => None,
            Estimate::Value(bpm) => Some(bpm),
        }
    }

    /// Fold a new sample in with weight `alpha`. An unset estimate takes the sample as is.
    fn smooth(self, sample: f64, alpha: f64) -> Self {
        match self {
            Estimate::Unset => Estimate::Value(sample),
            Estimate::Value(previous) => {
                Estimate::Value(alpha * sample + (1.0 - alpha) * previous)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Tracking,
}

/// Result of a single [`TempoEstimator::tap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapOutcome {
    /// Rounded tempo after the tap, if one is available.
    pub bpm: Option<u32>,
    /// The gap since the previous tap exceeded the inactivity threshold, so the
    /// old sequence was discarded and this tap started a new one.
    pub restarted: bool,
}

/// Tap-based tempo estimator.
///
/// Keeps the most recent taps, rejects intervals far from the median, smooths
/// the result with an exponential moving average and forgets everything after
/// a period of inactivity.
///
/// The estimator never reads the clock itself. The inactivity timeout is an
/// owned deadline: whoever drives the estimator sleeps until [`deadline`] and
/// then calls [`expire`].
///
/// ```
/// use std::time::{Duration, Instant};
/// use taptique::TempoEstimator;
///
/// let mut tapper = TempoEstimator::default();
/// let start = Instant::now();
/// for beat in 0..4 {
///     tapper.tap(start + Duration::from_millis(500 * beat));
/// }
/// assert_eq!(tapper.current_bpm(), Some(120));
/// ```
///
/// [`deadline`]: TempoEstimator::deadline
/// [`expire`]: TempoEstimator::expire
#[derive(Debug, Clone)]
pub struct TempoEstimator {
    config: TempoConfig,
    timeout: Duration,
    taps: VecDeque<Timestamp>,
    estimate: Estimate,
    deadline: Option<Timestamp>,
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::from_valid_config(TempoConfig::default())
    }
}

impl TempoEstimator {
    /// Create an estimator after checking `config` for consistency.
    pub fn new(config: TempoConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: TempoConfig) -> Self {
        let capacity = config
            .max_history_size
            .min(MAX_HISTORY_LIMIT)
            .saturating_add(2);
        Self {
            timeout: config.tap_timeout(),
            config,
            taps: VecDeque::with_capacity(capacity),
            estimate: Estimate::Unset,
            deadline: None,
        }
    }

    /// Register a tap at `now`.
    pub fn tap(&mut self, now: Timestamp) -> TapOutcome {
        self.deadline = None;

        let mut restarted = false;
        if let Some(&last) = self.taps.back() {
            if now < last {
                warn!("tap timestamp went backwards, clamping interval");
            }
            let gap = now.saturating_duration_since(last);
            if gap > self.timeout {
                info!(gap_secs = gap.as_secs_f64(), "tap gap exceeded threshold, restarting");
                self.reset();
                restarted = true;
            }
        }

        self.taps.push_back(now);
        if self.taps.len() > self.config.max_history_size + 1 {
            self.taps.pop_front();
        }

        if self.taps.len() >= self.config.min_taps_for_bpm {
            self.recompute();
        }

        self.deadline = now.checked_add(self.timeout);

        let bpm = self.current_bpm();
        debug!(taps = self.taps.len(), ?bpm, "tap registered");
        TapOutcome { bpm, restarted }
    }

    /// Forget all taps and the current estimate. Calling this on an idle
    /// estimator does nothing.
    pub fn reset(&mut self) {
        if self.state() == TrackingState::Tracking {
            debug!(taps = self.taps.len(), "resetting tap history");
        }
        self.taps.clear();
        self.estimate = Estimate::Unset;
        self.deadline = None;
    }

    /// Fire the inactivity timeout if it is due at `now`.
    ///
    /// Returns `true` when the estimator was reset.
    pub fn expire(&mut self, now: Timestamp) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                info!("no tap within {:.2}s, resetting", self.config.max_tap_interval);
                self.reset();
                true
            }
            _ => false,
        }
    }

    /// Smoothed tempo rounded half away from zero.
    pub fn current_bpm(&self) -> Option<u32> {
        self.estimate.value().map(|bpm| bpm.round() as u32)
    }

    pub fn smoothed_bpm(&self) -> Option<f64> {
        self.estimate.value()
    }

    pub fn estimate(&self) -> Estimate {
        self.estimate
    }

    /// When the pending inactivity timeout is due, if one is armed.
    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    pub fn state(&self) -> TrackingState {
        if self.taps.is_empty() {
            TrackingState::Idle
        } else {
            TrackingState::Tracking
        }
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    /// Intervals between consecutive taps in seconds, floored at `min_interval`.
    pub fn intervals(&self) -> Vec<f64> {
        self.taps
            .iter()
            .zip(self.taps.iter().skip(1))
            .map(|(&prev, &next)| {
                next.saturating_duration_since(prev)
                    .as_secs_f64()
                    .max(self.config.min_interval)
            })
            .collect()
    }

    pub fn config(&self) -> &TempoConfig {
        &self.config
    }

    fn recompute(&mut self) {
        let intervals = self.intervals();
        if intervals.is_empty() {
            return;
        }

        let raw = raw_bpm(&intervals, &self.config);
        self.estimate = self.estimate.smooth(raw, self.config.smoothing_factor);
        debug!(raw_bpm = raw, smoothed = ?self.estimate.value(), "tempo recomputed");
    }
}

/// Clamped tempo for a non-empty set of intervals, ignoring intervals far from the median.
fn raw_bpm(intervals: &[f64], config: &TempoConfig) -> f64 {
    let median = median(intervals);
    let filtered: Vec<f64> = intervals
        .iter()
        .copied()
        .filter(|interval| {
            let ratio = interval / median;
            ratio > config.outlier_low && ratio < config.outlier_high
        })
        .collect();

    let chosen = if filtered.len() >= 2 {
        filtered.as_slice()
    } else {
        intervals
    };

    let avg_interval = chosen.iter().sum::<f64>() / chosen.len() as f64;
    (60.0 / avg_interval).clamp(config.min_bpm, config.max_bpm)
}

/// Element at index `len / 2` of the sorted intervals. For even counts this is
/// not the interpolated median, and the difference shows up in the output.
fn median(intervals: &[f64]) -> f64 {
    let mut sorted = intervals.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted[sorted.len() / 2]
}
