//! Mains grid and dimmer timer simulation.
//!
//! Qualifying (single-polarity) crossings arrive every two grid half cycles.
//! Each may be skipped outright or delayed by a heavy-tailed interrupt
//! latency. The dimmer timer free-runs with whatever period was last
//! programmed; a capture is the tick count since its most recent restart.
//!
//! The grid and the timer share one model, so `SimGrid` and `SimTimer` are
//! two handles on the same `Rc<RefCell<GridModel>>` and plug into
//! `DimmerDriver` exactly like hardware would.

use anyhow::Result;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, RwLock};

use crate::config::{SimConfig, SystemConfig};
use crate::controller::SyncStats;
use crate::driver::{CrossingOutcome, DimmerDriver};
use crate::status::SyncStatus;
use crate::traits::{DimmerTimer, ZeroCrossingCapture};
use crate::window::median;

#[derive(Debug)]
struct GridModel {
    config: SimConfig,
    rng: StdRng,
    timer_max_ticks: u32,

    /// Undelayed time of the next qualifying crossing (us)
    next_crossing_us: f64,
    end_us: f64,

    timer_start_us: f64,
    period_ticks: u32,

    delivered: u64,
    skipped: u64,
}

impl GridModel {
    fn new(config: SimConfig, seed: u64, timer_max_ticks: u32, period_ticks: u32) -> Self {
        GridModel {
            rng: StdRng::seed_from_u64(seed),
            next_crossing_us: config.phase_offset_us,
            end_us: config.duration_secs * 1_000_000.0,
            timer_start_us: 0.0,
            period_ticks,
            timer_max_ticks,
            delivered: 0,
            skipped: 0,
            config,
        }
    }

    fn finished(&self) -> bool {
        self.next_crossing_us >= self.end_us
    }

    /// Interrupt latency: `(pareto(alpha) - 1) * multiplier`, capped.
    fn interrupt_delay_us(&mut self) -> f64 {
        if self.rng.random::<f64>() >= self.config.delay_chance {
            return 0.0;
        }
        // 1 - [0, 1) keeps the base strictly positive
        let u = 1.0 - self.rng.random::<f64>();
        let pareto = u.powf(-1.0 / self.config.delay_pareto_alpha);
        ((pareto - 1.0) * self.config.delay_pareto_multiplier_us).min(self.config.delay_max_us)
    }

    fn next_capture(&mut self) -> Option<u32> {
        if self.finished() {
            return None;
        }

        let nominal_us = self.next_crossing_us;
        self.next_crossing_us += 2.0 * self.config.half_cycle_us;

        if self.rng.random::<f64>() < self.config.missing_chance {
            self.skipped += 1;
            return None;
        }
        let interrupt_us = nominal_us + self.interrupt_delay_us();

        // Period is at least one tick, so this terminates
        let ticks_per_us = f64::from(self.config.ticks_per_us);
        let period_us = f64::from(self.period_ticks) / ticks_per_us;
        while self.timer_start_us + period_us <= interrupt_us {
            self.timer_start_us += period_us;
        }

        let elapsed_ticks = ((interrupt_us - self.timer_start_us) * ticks_per_us).round() as i64;
        self.delivered += 1;
        Some(elapsed_ticks.rem_euclid(i64::from(self.timer_max_ticks)) as u32)
    }
}

/// Capture side of the simulated grid.
#[derive(Clone)]
pub struct SimGrid(Rc<RefCell<GridModel>>);

/// Timer side of the simulated grid.
#[derive(Clone)]
pub struct SimTimer(Rc<RefCell<GridModel>>);

impl SimGrid {
    pub fn new(config: &SystemConfig, seed: u64) -> (SimGrid, SimTimer) {
        let model = GridModel::new(
            config.sim.clone(),
            seed,
            config.sync.timer_max_ticks,
            config.sync.initial_period_ticks,
        );
        let shared = Rc::new(RefCell::new(model));
        (SimGrid(shared.clone()), SimTimer(shared))
    }

    pub fn finished(&self) -> bool {
        self.0.borrow().finished()
    }

    pub fn delivered(&self) -> u64 {
        self.0.borrow().delivered
    }

    pub fn skipped(&self) -> u64 {
        self.0.borrow().skipped
    }
}

impl ZeroCrossingCapture for SimGrid {
    fn next_capture(&mut self) -> Result<Option<u32>> {
        Ok(self.0.borrow_mut().next_capture())
    }
}

impl DimmerTimer for SimTimer {
    fn period_ticks(&self) -> u32 {
        self.0.borrow().period_ticks
    }

    fn set_period_ticks(&mut self, ticks: u32) -> Result<()> {
        self.0.borrow_mut().period_ticks = ticks.max(1);
        Ok(())
    }
}

/// Summary of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimReport {
    pub seed: u64,
    pub crossings_delivered: u64,
    pub crossings_skipped: u64,
    pub final_period_ticks: u32,
    pub final_baseline_ticks: u32,
    pub final_error_ticks: i64,
    /// Over the second half of delivered crossings, after acquisition.
    pub max_abs_error_ticks: i64,
    pub median_abs_error_ticks: f64,
    pub stats: SyncStats,
    pub status: SyncStatus,
}

/// Run the configured scenario to completion, calling `on_crossing` for each
/// serviced crossing.
pub fn run_simulation<F>(config: &SystemConfig, mut on_crossing: F) -> Result<SimReport>
where
    F: FnMut(&CrossingOutcome),
{
    config.validate()?;
    let seed = config.sim.seed.unwrap_or_else(rand::random);
    info!(
        "[Sim] grid half cycle {:.1}us, {:.0}s, seed {}",
        config.sim.half_cycle_us, config.sim.duration_secs, seed
    );

    let (grid, timer) = SimGrid::new(config, seed);
    let status_shared = Arc::new(RwLock::new(SyncStatus::default()));
    let mut driver = DimmerDriver::new(grid.clone(), timer, config.sync.clone(), status_shared)?;

    let mut errors = Vec::new();
    while !grid.finished() {
        if let Some(outcome) = driver.process_loop_iteration()? {
            errors.push(outcome.error_ticks);
            on_crossing(&outcome);
        }
    }

    let settled: Vec<f64> = errors[errors.len() / 2..]
        .iter()
        .map(|e| e.abs() as f64)
        .collect();
    let controller = driver.controller();
    let status = driver
        .get_status_shared()
        .read()
        .map(|s| s.clone())
        .unwrap_or_default();

    let report = SimReport {
        seed,
        crossings_delivered: grid.delivered(),
        crossings_skipped: grid.skipped(),
        final_period_ticks: controller.current_period_ticks(),
        final_baseline_ticks: controller.baseline_period_ticks(),
        final_error_ticks: controller.last_error(),
        max_abs_error_ticks: settled.iter().fold(0.0_f64, |m, &e| m.max(e)) as i64,
        median_abs_error_ticks: median(&settled).unwrap_or(0.0),
        stats: controller.stats(),
        status,
    };

    info!(
        "[Sim] {} crossings ({} skipped), baseline {}ticks, settled |err| max {} median {:.0}",
        report.crossings_delivered,
        report.crossings_skipped,
        report.final_baseline_ticks,
        report.max_abs_error_ticks,
        report.median_abs_error_ticks
    );

    Ok(report)
}
