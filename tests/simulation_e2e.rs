use dimmersync::config::SystemConfig;
use dimmersync::controller::SyncMode;
use dimmersync::driver::CrossingOutcome;
use dimmersync::sim::{run_simulation, SimReport};

// --- Scenario helpers ---

fn noiseless(half_cycle_us: f64, duration_secs: f64) -> SystemConfig {
    let mut config = SystemConfig::default();
    config.sim.half_cycle_us = half_cycle_us;
    config.sim.missing_chance = 0.0;
    config.sim.delay_chance = 0.0;
    config.sim.duration_secs = duration_secs;
    config.sim.seed = Some(1);
    config
}

fn run(config: &SystemConfig) -> (SimReport, Vec<CrossingOutcome>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut trace = Vec::new();
    let report = run_simulation(config, |o| trace.push(*o)).unwrap();
    (report, trace)
}

// --- The Tests ---

#[test]
fn test_steady_state_without_drift_or_offset() {
    let config = noiseless(10_000.0, 20.0);
    let (report, trace) = run(&config);

    let crossings = config.sync.crossings_per_freq_sync() + config.sync.crossings_per_phase_sync();
    assert!(trace.len() >= crossings);
    for o in &trace[..crossings] {
        assert!((o.period_ticks as i64 - 40_000).abs() <= 1, "period moved: {:?}", o);
        assert_eq!(o.error_ticks, 0);
    }
    assert_eq!(report.final_baseline_ticks, 40_000);
}

#[test]
fn test_acquires_slow_grid() {
    // Grid half cycle 80us longer than nominal: 640 ticks of drift per call
    let (report, trace) = run(&noiseless(10_080.0, 40.0));

    println!("Slow grid: baseline {} settled max {}", report.final_baseline_ticks, report.max_abs_error_ticks);
    assert_eq!(report.final_baseline_ticks, 40_320);
    assert!(report.max_abs_error_ticks < 400, "settled error {}", report.max_abs_error_ticks);

    // First commit happens on exactly the 50th crossing
    assert_eq!(trace[48].mode, SyncMode::FrequencySync);
    assert_eq!(trace[49].mode, SyncMode::PhaseSync);
    assert_eq!(trace[49].period_ticks, 40_320);
    assert!(report.stats.entered_frequency_sync >= 1);
}

#[test]
fn test_acquires_fast_grid() {
    let (report, _) = run(&noiseless(9_950.0, 12.0));
    assert_eq!(report.final_baseline_ticks, 39_800);
    assert!(report.max_abs_error_ticks < 400);
}

#[test]
fn test_phase_offset_cancelled() {
    for offset_us in [125.0, 1_250.0, -750.0] {
        let mut config = noiseless(10_000.0, 40.0);
        config.sim.phase_offset_us = offset_us;
        let (report, trace) = run(&config);

        println!("Offset {}us: settled max {} ticks", offset_us, report.max_abs_error_ticks);
        let initial = (offset_us * 4.0) as i64;
        assert_eq!(trace[0].error_ticks, initial);
        assert_eq!(report.final_baseline_ticks, 40_000);
        assert!(
            report.max_abs_error_ticks < 100,
            "offset {}us not cancelled: {}",
            offset_us,
            report.max_abs_error_ticks
        );
    }
}

#[test]
fn test_first_phase_round_is_proportional() {
    let mut config = noiseless(10_000.0, 2.0);
    config.sim.phase_offset_us = 125.0;
    let (_, trace) = run(&config);

    // Baseline unchanged by a pure offset; first round moves by round(500/40) ticks
    assert_eq!(trace[49].period_ticks, 40_000);
    assert_eq!(trace[57].period_ticks, 40_000);
    assert_eq!(trace[58].period_ticks, 40_013);
}

#[test]
fn test_missing_crossings_do_not_bias_drift() {
    let mut config = noiseless(10_080.0, 30.0);
    config.sim.missing_chance = 0.1;
    config.sim.seed = Some(99);
    let (report, _) = run(&config);

    println!("Missing 10%: baseline {} skipped {}", report.final_baseline_ticks, report.crossings_skipped);
    assert!(report.crossings_skipped > 0);
    // A skipped call doubles one step; the period itself must still land on the grid
    assert!((report.final_period_ticks as i64 - 40_320).abs() <= 20);
    assert!((report.final_baseline_ticks as i64 - 40_320).abs() <= 150);
    assert!(report.median_abs_error_ticks < 5_000.0);
}

#[test]
fn test_heavy_tailed_latency() {
    // Reference noise: 10% missing, Pareto(2) latency up to 5ms
    for seed in [3, 17, 2024] {
        let mut config = SystemConfig::default();
        config.sim.duration_secs = 60.0;
        config.sim.seed = Some(seed);
        let (report, _) = run(&config);

        println!(
            "Seed {}: baseline {} period {} settled median {:.0}",
            seed, report.final_baseline_ticks, report.final_period_ticks, report.median_abs_error_ticks
        );
        assert!((report.final_baseline_ticks as i64 - 40_320).abs() <= 200);
        assert!((report.final_period_ticks as i64 - 40_320).abs() <= 100);
        assert!(report.median_abs_error_ticks < 8_000.0);
        assert!(report.stats.entered_phase_sync >= 2);
    }
}

#[test]
fn test_no_crossings_holds_period() {
    let mut config = noiseless(10_080.0, 5.0);
    config.sim.missing_chance = 1.0;
    let (report, trace) = run(&config);

    assert!(trace.is_empty());
    assert_eq!(report.stats.crossings, 0);
    assert_eq!(report.final_period_ticks, 40_000);
    assert_eq!(report.status.mode, "FREQ");
}
