use log::debug;

use crate::window::ErrorWindow;

/// Divisor applied to `timer_max_ticks` to get the per-round step limit.
const STEP_LIMIT_DIVISOR: f64 = 120.0;
/// Integral clamp in units of `timer_max_ticks`.
const INTEGRAL_LIMIT_FACTOR: i64 = 1000;
/// Proportional gain: ticks of correction per full timer range of error.
const P_GAIN: f64 = 1000.0;
/// Integral gain, applied to the per-round mean of the accumulator.
const I_GAIN: f64 = 2.0;

/// Correction produced at the end of one phase round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseCorrection {
    pub median_error: f64,
    pub delta_p: i64,
    pub delta_i: i64,
    /// `delta_p + delta_i`, clamped to the step limit.
    pub delta: i64,
}

/// Median-filtered PI controller on the crossing error.
///
/// Two independent clamps: the integral is bounded so a long outage cannot
/// store a huge latent correction, and the applied step is bounded so the
/// light level never jumps within one round.
#[derive(Debug)]
pub struct PhaseSynchronizer {
    window: ErrorWindow,
    batch_size: usize,
    timer_max_ticks: u32,
    integral: i64,
    max_integral: i64,
    max_step: i64,
    crossing_count: usize,
}

impl PhaseSynchronizer {
    pub fn new(batch_size: usize, timer_max_ticks: u32) -> Self {
        PhaseSynchronizer {
            window: ErrorWindow::new(batch_size),
            batch_size,
            timer_max_ticks,
            integral: 0,
            max_integral: i64::from(timer_max_ticks) * INTEGRAL_LIMIT_FACTOR,
            max_step: (f64::from(timer_max_ticks) / STEP_LIMIT_DIVISOR).round() as i64,
            crossing_count: 0,
        }
    }

    /// Clear the window, the crossing counter and the integral.
    pub fn reset(&mut self) {
        self.window.clear();
        self.crossing_count = 0;
        self.integral = 0;
    }

    /// Feed one crossing error. Returns a correction once per `N_phase` crossings.
    pub fn sample(&mut self, error: i64) -> Option<PhaseCorrection> {
        self.window.push(error);
        self.integral = (self.integral + error).clamp(-self.max_integral, self.max_integral);

        self.crossing_count += 1;
        if self.crossing_count < self.batch_size {
            return None;
        }
        self.crossing_count = 0;

        let median_error = self.window.median().unwrap_or(0.0);
        self.window.clear();

        let range = f64::from(self.timer_max_ticks);
        let delta_p = (median_error * P_GAIN / range).round() as i64;
        let delta_i =
            (self.integral as f64 * I_GAIN / (self.batch_size as f64 * range)).round() as i64;
        let delta = (delta_p + delta_i).clamp(-self.max_step, self.max_step);

        debug!(
            "[Phase] medErr={} errInt={} P={} I={} delta={}",
            median_error, self.integral, delta_p, delta_i, delta
        );

        Some(PhaseCorrection {
            median_error,
            delta_p,
            delta_i,
            delta,
        })
    }

    pub fn integral(&self) -> i64 {
        self.integral
    }

    pub fn max_integral(&self) -> i64 {
        self.max_integral
    }

    pub fn max_step(&self) -> i64 {
        self.max_step
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const T: u32 = 40_000;

    fn run_round(sync: &mut PhaseSynchronizer, error: i64) -> PhaseCorrection {
        for _ in 0..8 {
            assert!(sync.sample(error).is_none());
        }
        sync.sample(error).expect("round should complete on 9th crossing")
    }

    #[test]
    fn test_limits_from_timer_range() {
        let sync = PhaseSynchronizer::new(9, T);
        assert_eq!(sync.max_step(), 333);
        assert_eq!(sync.max_integral(), 40_000_000);
    }

    #[test]
    fn test_zero_error_no_correction() {
        let mut sync = PhaseSynchronizer::new(9, T);
        let c = run_round(&mut sync, 0);
        assert_eq!(c.delta, 0);
        assert_eq!(sync.integral(), 0);
    }

    #[test]
    fn test_first_round_is_proportional_only() {
        let mut sync = PhaseSynchronizer::new(9, T);
        let c = run_round(&mut sync, 500);

        // 500 / 40000 * 1000 = 12.5 -> 13; integral 4500 / 9 / 40000 * 2 rounds to 0
        assert_eq!(c.median_error, 500.0);
        assert_eq!(c.delta_p, 13);
        assert_eq!(c.delta_i, 0);
        assert_eq!(c.delta, 13);
        assert_eq!(sync.integral(), 4_500);
        assert_eq!(sync.window_len(), 0);
    }

    #[test]
    fn test_negative_error_pulls_period_shorter() {
        let mut sync = PhaseSynchronizer::new(9, T);
        let c = run_round(&mut sync, -2_000);
        assert_eq!(c.delta_p, -50);
        assert!(c.delta < 0);
    }

    #[test]
    fn test_median_ignores_single_outlier() {
        let mut sync = PhaseSynchronizer::new(9, T);
        for _ in 0..8 {
            sync.sample(400);
        }
        let c = sync.sample(19_000).unwrap();
        assert_eq!(c.median_error, 400.0);
        assert_eq!(c.delta_p, 10);
    }

    #[test]
    fn test_step_clamped() {
        let mut sync = PhaseSynchronizer::new(9, T);
        let c = run_round(&mut sync, 19_999);
        assert_eq!(c.delta_p, 500);
        assert_eq!(c.delta, 333);

        let mut sync = PhaseSynchronizer::new(9, T);
        let c = run_round(&mut sync, -19_999);
        assert_eq!(c.delta, -333);
    }

    #[test]
    fn test_integral_accumulates_over_rounds() {
        let mut sync = PhaseSynchronizer::new(9, T);
        let mut last = None;
        for _ in 0..30 {
            last = Some(run_round(&mut sync, 5_000));
        }
        // 30 rounds * 9 * 5000 = 1_350_000; / 9 / 40000 * 2 = 7.5 -> 8
        assert_eq!(sync.integral(), 1_350_000);
        assert_eq!(last.unwrap().delta_i, 8);
    }

    #[test]
    fn test_integral_clamped() {
        let mut sync = PhaseSynchronizer::new(9, 100);
        for _ in 0..10_000 {
            sync.sample(50);
        }
        assert_eq!(sync.integral(), 100_000);

        for _ in 0..20_000 {
            sync.sample(-49);
        }
        assert_eq!(sync.integral(), -100_000);
    }

    #[test]
    fn test_reset_clears_integral() {
        let mut sync = PhaseSynchronizer::new(9, T);
        run_round(&mut sync, 1_000);
        sync.sample(1_000);
        sync.reset();
        assert_eq!(sync.integral(), 0);
        assert_eq!(sync.window_len(), 0);

        // Counter restarted: a full round is needed again
        let c = run_round(&mut sync, 0);
        assert_eq!(c.delta, 0);
    }

    #[test]
    fn test_clamps_hold_for_random_input() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut sync = PhaseSynchronizer::new(9, T);
        for _ in 0..50_000 {
            let err = rng.random_range(-19_999..=20_000);
            if let Some(c) = sync.sample(err) {
                assert!(c.delta.abs() <= sync.max_step());
            }
            assert!(sync.integral().abs() <= sync.max_integral());
        }
    }
}
