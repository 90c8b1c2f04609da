//! Dimmer Sync Controller - keeps the dimmer timer locked to mains zero crossings
//!
//! The controller alternates between two modes:
//! 1. **Frequency sync**: rare and expensive. Estimates mains drift with a
//!    repeated-median slope and corrects the baseline half-cycle period.
//! 2. **Phase sync**: frequent and cheap. A median-filtered PI loop nudges the
//!    programmed period around the baseline to cancel the residual offset.
//!
//! Running them in separate bursts keeps the two loops from fighting: while
//! drift is measured the period is held still, and while phase is corrected
//! the baseline does not move.
//!
//! Missing crossings just mean no call. If crossings stop entirely the
//! controller stays in whatever mode it is in and the caller keeps the last
//! period it was given.

use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::freq_sync::{FreqStep, FrequencySynchronizer};
use crate::phase_sync::{PhaseCorrection, PhaseSynchronizer};
use crate::ticks::compute_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    FrequencySync,
    PhaseSync,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::FrequencySync => "FREQ",
            SyncMode::PhaseSync => "PHASE",
        }
    }
}

/// Counters since construction (or the last `reset`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub crossings: u64,
    pub frequency_syncs: u64,
    pub phase_rounds: u64,
    pub entered_phase_sync: u64,
    pub entered_frequency_sync: u64,
}

/// Owns all controller state. One instance per dimmer channel; never shared.
#[derive(Debug)]
pub struct DimmerSyncController {
    config: SyncConfig,
    mode: SyncMode,

    /// Synchronized half-cycle length; only frequency sync moves it.
    baseline_period_ticks: u32,
    /// Period handed back to the caller for the next half cycle.
    current_period_ticks: u32,

    freq: FrequencySynchronizer,
    phase: PhaseSynchronizer,
    phase_round_count: usize,

    last_error: i64,
    last_correction: Option<PhaseCorrection>,
    stats: SyncStats,
}

impl DimmerSyncController {
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;

        info!("=== Dimmer Sync Controller ===");
        info!(
            "Timer: max={}ticks period={}ticks",
            config.timer_max_ticks, config.initial_period_ticks
        );
        info!(
            "Freq sync: {}x{} crossings, phase sync: {}x{} crossings",
            config.freq_batch_count,
            config.freq_batch_size,
            config.phase_rounds_per_freq_sync,
            config.phase_batch_size
        );

        Ok(DimmerSyncController {
            mode: SyncMode::FrequencySync,
            baseline_period_ticks: config.initial_period_ticks,
            current_period_ticks: config.initial_period_ticks,
            freq: FrequencySynchronizer::new(
                config.freq_batch_size,
                config.freq_batch_count,
                config.timer_max_ticks,
            ),
            phase: PhaseSynchronizer::new(config.phase_batch_size, config.timer_max_ticks),
            phase_round_count: 0,
            last_error: 0,
            last_correction: None,
            stats: SyncStats::default(),
            config,
        })
    }

    /// Re-enter acquisition: frequency sync with empty history and the
    /// configured initial period.
    pub fn reset(&mut self) {
        self.mode = SyncMode::FrequencySync;
        self.baseline_period_ticks = self.config.initial_period_ticks;
        self.current_period_ticks = self.config.initial_period_ticks;
        self.freq.reset();
        self.phase.reset();
        self.phase_round_count = 0;
        self.last_error = 0;
        self.last_correction = None;
        self.stats = SyncStats::default();
        info!("[Sync] Reset, re-acquiring frequency");
    }

    // ========================================================================
    // PER-CROSSING ENTRY POINT
    // ========================================================================

    /// Handle one captured zero crossing and return the period to program.
    ///
    /// `captured_ticks` is the timer count latched by the crossing interrupt,
    /// `current_period_ticks` the period currently programmed. The return is
    /// either that period unchanged or a new one; the caller writes it to the
    /// timer before the next half cycle starts.
    pub fn on_zero_crossing(&mut self, captured_ticks: u32, current_period_ticks: u32) -> u32 {
        let timer_max = self.config.timer_max_ticks;
        debug_assert!(
            captured_ticks < timer_max,
            "capture {} outside timer range {}",
            captured_ticks,
            timer_max
        );
        debug_assert!(current_period_ticks > 0, "programmed period must be non-zero");

        if current_period_ticks > 0 {
            self.current_period_ticks = current_period_ticks;
        }

        let error = compute_error(captured_ticks % timer_max, timer_max);
        self.last_error = error;
        self.stats.crossings += 1;

        match self.mode {
            SyncMode::FrequencySync => self.frequency_step(error),
            SyncMode::PhaseSync => self.phase_step(error),
        }

        self.current_period_ticks
    }

    fn frequency_step(&mut self, error: i64) {
        let (median_slope, correction_ticks) = match self.freq.push(error) {
            FreqStep::Collecting | FreqStep::BatchSlope(_) => return,
            FreqStep::Commit {
                median_slope,
                correction_ticks,
            } => (median_slope, correction_ticks),
        };

        let previous = self.baseline_period_ticks;
        self.baseline_period_ticks = offset_period(previous, correction_ticks);
        self.current_period_ticks = self.baseline_period_ticks;
        self.stats.frequency_syncs += 1;

        info!(
            "[Sync] Freq locked: slope={:+.1}ticks baseline {} -> {}ticks",
            median_slope, previous, self.baseline_period_ticks
        );

        self.enter_phase_sync();
    }

    fn phase_step(&mut self, error: i64) {
        let correction = match self.phase.sample(error) {
            Some(c) => c,
            None => return,
        };

        self.current_period_ticks = offset_period(self.baseline_period_ticks, correction.delta);
        self.last_correction = Some(correction);
        self.stats.phase_rounds += 1;
        self.phase_round_count += 1;

        debug!(
            "[Sync] round {}/{} ticks={}",
            self.phase_round_count, self.config.phase_rounds_per_freq_sync, self.current_period_ticks
        );

        if self.phase_round_count >= self.config.phase_rounds_per_freq_sync {
            self.enter_frequency_sync();
        }
    }

    fn enter_phase_sync(&mut self) {
        self.mode = SyncMode::PhaseSync;
        self.phase.reset();
        self.phase_round_count = 0;
        self.stats.entered_phase_sync += 1;
        info!("[Sync] === PHASE === period={}ticks", self.current_period_ticks);
    }

    fn enter_frequency_sync(&mut self) {
        self.mode = SyncMode::FrequencySync;
        self.phase.reset();
        self.freq.reset();
        self.phase_round_count = 0;
        self.stats.entered_frequency_sync += 1;
        info!(
            "[Sync] === FREQ === re-estimating drift, holding {}ticks",
            self.current_period_ticks
        );
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn baseline_period_ticks(&self) -> u32 {
        self.baseline_period_ticks
    }

    pub fn current_period_ticks(&self) -> u32 {
        self.current_period_ticks
    }

    pub fn last_error(&self) -> i64 {
        self.last_error
    }

    pub fn last_slope(&self) -> Option<f64> {
        self.freq.last_slope()
    }

    pub fn last_correction(&self) -> Option<PhaseCorrection> {
        self.last_correction
    }

    pub fn integral(&self) -> i64 {
        self.phase.integral()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

/// Period plus a signed tick offset, never reaching zero.
fn offset_period(period: u32, delta: i64) -> u32 {
    (i64::from(period) + delta).clamp(1, i64::from(u32::MAX)) as u32
}

// ============================================================================
// TESTS
// ============================================================================
