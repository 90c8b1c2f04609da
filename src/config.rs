use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest frequency batch the repeated median is allowed to chew on.
/// The estimator is quadratic in the batch and runs in interrupt context.
pub const MAX_FREQ_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub sync: SyncConfig,
    pub sim: SimConfig,
}

/// Controller parameters, fixed for the life of a controller instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timer range in ticks (4 ticks/us on the reference hardware).
    pub timer_max_ticks: u32,
    /// Errors per repeated-median batch ("N_freq").
    pub freq_batch_size: usize,
    /// Batches per committed frequency correction ("K_freq").
    pub freq_batch_count: usize,
    /// Crossings per phase correction round ("N_phase").
    pub phase_batch_size: usize,
    /// Phase rounds before drift is re-estimated ("M_start").
    pub phase_rounds_per_freq_sync: usize,
    /// Baseline half-cycle period at start-up.
    pub initial_period_ticks: u32,
}

/// Grid and interrupt model for the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// True grid half-cycle length.
    pub half_cycle_us: f64,
    /// Probability that a crossing interrupt never fires.
    pub missing_chance: f64,
    /// Probability that a crossing interrupt is delayed.
    pub delay_chance: f64,
    /// Pareto shape of the interrupt delay; lower means heavier tail.
    pub delay_pareto_alpha: f64,
    pub delay_pareto_multiplier_us: f64,
    /// Delay cap.
    pub delay_max_us: f64,
    /// Constant offset of all crossings relative to the timer start.
    pub phase_offset_us: f64,
    pub duration_secs: f64,
    pub ticks_per_us: u32,
    pub seed: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig::for_half_cycle_us(10_000, 4)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            half_cycle_us: 10_080.0,
            missing_chance: 0.1,
            delay_chance: 1.0,
            delay_pareto_alpha: 2.0,
            delay_pareto_multiplier_us: 100.0,
            delay_max_us: 5_000.0,
            phase_offset_us: 0.0,
            duration_secs: 10.0,
            ticks_per_us: 4,
            seed: None,
        }
    }
}

impl SyncConfig {
    /// Reference batch sizes for a timer whose nominal range is one half cycle.
    pub fn for_half_cycle_us(half_cycle_us: u32, ticks_per_us: u32) -> Self {
        let timer_max_ticks = half_cycle_us.saturating_mul(ticks_per_us);
        SyncConfig {
            timer_max_ticks,
            freq_batch_size: 10,
            freq_batch_count: 5,
            phase_batch_size: 9,
            phase_rounds_per_freq_sync: 100,
            initial_period_ticks: timer_max_ticks,
        }
    }

    /// Crossings spent in one frequency sync, with no interrupts missed.
    pub fn crossings_per_freq_sync(&self) -> usize {
        self.freq_batch_size * self.freq_batch_count
    }

    /// Crossings spent in one stretch of phase sync, with no interrupts missed.
    pub fn crossings_per_phase_sync(&self) -> usize {
        self.phase_batch_size * self.phase_rounds_per_freq_sync
    }

    pub fn validate(&self) -> Result<()> {
        if self.timer_max_ticks == 0 {
            bail!("timer_max_ticks must be non-zero");
        }
        if self.freq_batch_size < 2 || self.freq_batch_size > MAX_FREQ_BATCH_SIZE {
            bail!(
                "freq_batch_size {} outside 2..={}",
                self.freq_batch_size,
                MAX_FREQ_BATCH_SIZE
            );
        }
        if self.freq_batch_count == 0 {
            bail!("freq_batch_count must be non-zero");
        }
        if self.phase_batch_size == 0 {
            bail!("phase_batch_size must be non-zero");
        }
        if self.phase_rounds_per_freq_sync == 0 {
            bail!("phase_rounds_per_freq_sync must be non-zero");
        }
        if self.initial_period_ticks == 0 {
            bail!("initial_period_ticks must be non-zero");
        }
        Ok(())
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.half_cycle_us > 0.0) {
            bail!("half_cycle_us must be positive");
        }
        for (name, p) in [
            ("missing_chance", self.missing_chance),
            ("delay_chance", self.delay_chance),
        ] {
            if !(0.0..=1.0).contains(&p) {
                bail!("{} {} outside 0..=1", name, p);
            }
        }
        if !(self.delay_pareto_alpha > 0.0) {
            bail!("delay_pareto_alpha must be positive");
        }
        if self.delay_max_us < 0.0 || self.delay_pareto_multiplier_us < 0.0 {
            bail!("delay bounds must be non-negative");
        }
        if self.ticks_per_us == 0 {
            bail!("ticks_per_us must be non-zero");
        }
        Ok(())
    }
}

impl SystemConfig {
    /// Load a JSON config. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: SystemConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate().context("invalid sync config")?;
        self.sim.validate().context("invalid sim config")?;
        Ok(())
    }
}
