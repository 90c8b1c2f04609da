use anyhow::Result;
use log::{debug, warn};
use std::sync::{Arc, RwLock};

use crate::config::SyncConfig;
use crate::controller::{DimmerSyncController, SyncMode};
use crate::status::SyncStatus;
use crate::traits::{DimmerTimer, ZeroCrossingCapture};

/// What happened on one serviced crossing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingOutcome {
    pub captured_ticks: u32,
    pub error_ticks: i64,
    pub period_ticks: u32,
    pub mode: SyncMode,
}

/// Glue between the capture hardware, the controller and the dimmer timer.
pub struct DimmerDriver<S, T>
where
    S: ZeroCrossingCapture,
    T: DimmerTimer,
{
    source: S,
    timer: T,
    controller: DimmerSyncController,
    status_shared: Arc<RwLock<SyncStatus>>,
    timer_write_failures: u64,
}

impl<S, T> DimmerDriver<S, T>
where
    S: ZeroCrossingCapture,
    T: DimmerTimer,
{
    pub fn new(
        source: S,
        timer: T,
        config: SyncConfig,
        status_shared: Arc<RwLock<SyncStatus>>,
    ) -> Result<Self> {
        let controller = DimmerSyncController::new(config)?;
        let driver = DimmerDriver {
            source,
            timer,
            controller,
            status_shared,
            timer_write_failures: 0,
        };
        driver.update_shared_status();
        Ok(driver)
    }

    pub fn get_status_shared(&self) -> Arc<RwLock<SyncStatus>> {
        self.status_shared.clone()
    }

    pub fn controller(&self) -> &DimmerSyncController {
        &self.controller
    }

    pub fn timer_write_failures(&self) -> u64 {
        self.timer_write_failures
    }

    /// Service at most one crossing. Ok(None) if the source had nothing.
    pub fn process_loop_iteration(&mut self) -> Result<Option<CrossingOutcome>> {
        let captured_ticks = match self.source.next_capture()? {
            Some(c) => c,
            None => return Ok(None),
        };

        let programmed = self.timer.period_ticks();
        let period_ticks = self.controller.on_zero_crossing(captured_ticks, programmed);

        if period_ticks != programmed {
            debug!("[Timer] period {} -> {}ticks", programmed, period_ticks);
            if let Err(e) = self.timer.set_period_ticks(period_ticks) {
                // Next capture will reflect the stale period; the loop absorbs it
                self.timer_write_failures += 1;
                warn!("Timer update failed: {}", e);
            }
        }

        self.update_shared_status();

        Ok(Some(CrossingOutcome {
            captured_ticks,
            error_ticks: self.controller.last_error(),
            period_ticks,
            mode: self.controller.mode(),
        }))
    }

    fn update_shared_status(&self) {
        if let Ok(mut status) = self.status_shared.write() {
            status.update_from(&self.controller);
        }
    }
}
