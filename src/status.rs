use serde::{Deserialize, Serialize};

use crate::controller::DimmerSyncController;

/// Snapshot of one dimmer channel's synchronization state
///
/// Published by the driver after every crossing so a monitor (or the CLI
/// summary) can show what the loop is doing without touching the controller.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SyncStatus {
    /// "FREQ" while drift is being measured, "PHASE" while correcting offset
    pub mode: String,

    /// Synchronized half-cycle length (ticks)
    pub baseline_period_ticks: u32,

    /// Period programmed for the next half cycle (ticks)
    pub current_period_ticks: u32,

    /// Offset of the latest crossing from the ideal instant (ticks)
    pub last_error_ticks: i64,

    /// Latest repeated-median slope (ticks per captured crossing)
    pub last_slope_ticks: Option<f64>,

    /// Phase integral accumulator (ticks)
    pub integral_ticks: i64,

    pub crossings: u64,
    pub frequency_syncs: u64,
    pub phase_rounds: u64,

    /// Unix timestamp of last status update
    pub updated_ts: u64,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            mode: "FREQ".to_string(),
            baseline_period_ticks: 0,
            current_period_ticks: 0,
            last_error_ticks: 0,
            last_slope_ticks: None,
            integral_ticks: 0,
            crossings: 0,
            frequency_syncs: 0,
            phase_rounds: 0,
            updated_ts: 0,
        }
    }
}

impl SyncStatus {
    /// Copy the controller's current state into this snapshot.
    pub fn update_from(&mut self, controller: &DimmerSyncController) {
        let stats = controller.stats();
        self.mode = controller.mode().as_str().to_string();
        self.baseline_period_ticks = controller.baseline_period_ticks();
        self.current_period_ticks = controller.current_period_ticks();
        self.last_error_ticks = controller.last_error();
        self.last_slope_ticks = controller.last_slope();
        self.integral_ticks = controller.integral();
        self.crossings = stats.crossings;
        self.frequency_syncs = stats.frequency_syncs;
        self.phase_rounds = stats.phase_rounds;
        self.updated_ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    #[test]
    fn test_sync_status_default() {
        let status = SyncStatus::default();
        assert_eq!(status.mode, "FREQ");
        assert_eq!(status.crossings, 0);
        assert!(status.last_slope_ticks.is_none());
    }

    #[test]
    fn test_update_from_controller() {
        let mut controller = DimmerSyncController::new(SyncConfig::default()).unwrap();
        let mut period = controller.current_period_ticks();
        for _ in 0..52 {
            period = controller.on_zero_crossing(120, period);
        }

        let mut status = SyncStatus::default();
        status.update_from(&controller);
        assert_eq!(status.mode, "PHASE");
        assert_eq!(status.baseline_period_ticks, 40_000);
        assert_eq!(status.last_error_ticks, 120);
        assert_eq!(status.integral_ticks, 240);
        assert_eq!(status.crossings, 52);
        assert_eq!(status.frequency_syncs, 1);
        assert!(status.updated_ts > 0);
    }

    #[test]
    fn test_sync_status_serde_roundtrip() {
        let mut status = SyncStatus::default();
        status.mode = "PHASE".to_string();
        status.current_period_ticks = 40_013;
        status.last_slope_ticks = Some(-2.5);
        status.integral_ticks = -4_500;

        let json = serde_json::to_string(&status).expect("serialize failed");
        let restored: SyncStatus = serde_json::from_str(&json).expect("deserialize failed");

        assert_eq!(restored.mode, "PHASE");
        assert_eq!(restored.current_period_ticks, 40_013);
        assert_eq!(restored.last_slope_ticks, Some(-2.5));
        assert_eq!(restored.integral_ticks, -4_500);
    }
}
