//! Frequency synchronizer: robust mains drift estimation.
//!
//! Errors are collected in batches of `N_freq`. Each batch yields one slope
//! (ticks of error growth per captured crossing) from Siegel's
//! repeated-median regression. After `K_freq` batches the median slope is
//! committed as a correction of the baseline half-cycle period.
//!
//! The repeated median tolerates just under half the batch being garbage,
//! which matters here: interrupt latency is heavy-tailed and a single badly
//! delayed crossing would drag an endpoint or least-squares slope anywhere.

use log::debug;

use crate::config::MAX_FREQ_BATCH_SIZE;
use crate::ticks::wrap_ticks;
use crate::window::{median_in_place, ErrorWindow};

/// Siegel repeated-median slope of `errors` against their insertion index.
///
/// For each index `i` take the median over `j != i` of
/// `wrap(errors[j] - errors[i]) / (j - i)`, then return the median of those
/// per-index medians. `O(n^2)` in the window length, no heap allocation.
///
/// Returns `None` with fewer than two samples or more than
/// `MAX_FREQ_BATCH_SIZE`.
pub fn repeated_median_slope(errors: &[i64], timer_max_ticks: u32) -> Option<f64> {
    let n = errors.len();
    if !(2..=MAX_FREQ_BATCH_SIZE).contains(&n) {
        return None;
    }

    let mut per_index = [0.0_f64; MAX_FREQ_BATCH_SIZE];
    let mut pair_slopes = [0.0_f64; MAX_FREQ_BATCH_SIZE];
    for i in 0..n {
        let mut count = 0;
        for j in 0..n {
            if j == i {
                continue;
            }
            let rise = wrap_ticks(errors[j] - errors[i], timer_max_ticks) as f64;
            let run = j as f64 - i as f64;
            pair_slopes[count] = rise / run;
            count += 1;
        }
        per_index[i] = median_in_place(&mut pair_slopes[..count])?;
    }

    median_in_place(&mut per_index[..n])
}

/// Outcome of feeding one error into the frequency synchronizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FreqStep {
    /// Batch not complete yet.
    Collecting,
    /// A batch completed and produced a slope; more batches are needed.
    BatchSlope(f64),
    /// All batches are in. `correction_ticks` is to be added to the baseline.
    Commit { median_slope: f64, correction_ticks: i64 },
}

#[derive(Debug)]
pub struct FrequencySynchronizer {
    window: ErrorWindow,
    slope_history: Vec<f64>,
    batch_count: usize,
    timer_max_ticks: u32,
    last_slope: Option<f64>,
}

impl FrequencySynchronizer {
    pub fn new(batch_size: usize, batch_count: usize, timer_max_ticks: u32) -> Self {
        FrequencySynchronizer {
            window: ErrorWindow::new(batch_size),
            slope_history: Vec::with_capacity(batch_count),
            batch_count,
            timer_max_ticks,
            last_slope: None,
        }
    }

    pub fn push(&mut self, error: i64) -> FreqStep {
        if !self.window.push(error) {
            return FreqStep::Collecting;
        }

        // A full window always holds at least two samples (validated batch size)
        let slope = match repeated_median_slope(self.window.as_slice(), self.timer_max_ticks) {
            Some(s) => s,
            None => {
                self.window.clear();
                return FreqStep::Collecting;
            }
        };
        self.window.clear();
        self.last_slope = Some(slope);
        self.slope_history.push(slope);

        debug!(
            "[Freq] batch {}/{} slope={:+.2}ticks/crossing",
            self.slope_history.len(),
            self.batch_count,
            slope
        );

        if self.slope_history.len() < self.batch_count {
            return FreqStep::BatchSlope(slope);
        }

        let median_slope = median_in_place(&mut self.slope_history).unwrap_or(0.0);
        self.slope_history.clear();

        // One call spans a full AC cycle, the timer period is a half cycle
        let correction_ticks = (median_slope / 2.0).round() as i64;
        FreqStep::Commit {
            median_slope,
            correction_ticks,
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.slope_history.clear();
        self.last_slope = None;
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn batches_collected(&self) -> usize {
        self.slope_history.len()
    }

    pub fn last_slope(&self) -> Option<f64> {
        self.last_slope
    }
}
