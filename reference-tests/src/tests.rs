//! Reference test integration tests
//!
//! These tests run the full reference test suite via cargo test.

use cola_orchestrator::SimulationConfig;

use crate::analytical::PlaneWave;
use crate::suite::{
    linear_growth_test, non_gaussian_growth_test, project_path, zeldovich_pancake_test,
};
use crate::{execute, pancake_errors, PancakeErrors, Scenario};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .try_init();
}

#[test]
fn test_zeldovich_pancake() {
    init_logging();
    let test = zeldovich_pancake_test();
    let result = test.run().expect("Test execution failed");
    result.print_summary();
    assert!(result.passed, "Zel'dovich pancake test failed");
}

#[test]
fn test_linear_growth() {
    init_logging();
    let test = linear_growth_test();
    let result = test.run().expect("Test execution failed");
    result.print_summary();
    assert!(result.passed, "Linear growth test failed");
}

#[test]
fn test_non_gaussian_growth() {
    init_logging();
    let test = non_gaussian_growth_test();
    let result = test.run().expect("Test execution failed");
    result.print_summary();
    assert!(result.passed, "Non-Gaussian growth test failed");
}

fn pancake_run(config: &SimulationConfig) -> PancakeErrors {
    let scenario = Scenario::PlaneWave {
        crossing_fraction: 0.5,
    };
    let output = execute(config, &scenario).expect("pancake run failed");
    let wave = PlaneWave::with_crossing_fraction(config.box_size, 0.5);
    let errors = pancake_errors(&output, config, &wave);
    tracing::info!(
        "nmesh={} nsteps={}: position error {:.2}%, momentum error {:.2}%",
        config.nmesh,
        config.nsteps,
        errors.position * 100.0,
        errors.momentum * 100.0
    );
    errors
}

#[test]
fn test_pancake_error_shrinks_with_steps() {
    init_logging();
    let base = SimulationConfig::load(&project_path("configs/pancake.json")).unwrap();
    let mut coarse = base.clone();
    coarse.nsteps = 5;
    let mut fine = base;
    fine.nsteps = 20;

    let (coarse, fine) = (pancake_run(&coarse), pancake_run(&fine));
    assert!(fine.position < coarse.position, "{:?} vs {:?}", fine, coarse);
    assert!(fine.momentum < coarse.momentum, "{:?} vs {:?}", fine, coarse);
    assert!(fine.position < 0.04 && fine.momentum < 0.04, "{:?}", fine);
}

#[test]
fn test_pancake_error_shrinks_with_mesh() {
    init_logging();
    let base = SimulationConfig::load(&project_path("configs/pancake.json")).unwrap();
    let mut refined = base.clone();
    refined.nmesh = 2 * base.nmesh;

    let (coarse, fine) = (pancake_run(&base), pancake_run(&refined));
    assert!(fine.position < coarse.position, "{:?} vs {:?}", fine, coarse);
    assert!(fine.momentum < coarse.momentum, "{:?} vs {:?}", fine, coarse);
}
