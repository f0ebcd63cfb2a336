//! Reference test definitions shared by the binary and `cargo test`.

use std::path::Path;

use crate::{
    ConservationCheck, ExpectedResult, LinearGrowthCheck, PancakeCheck, ReferenceTest, Scenario,
    TaskInvarianceCheck,
};

/// Resolve a path relative to the workspace root (one level up from this crate)
pub fn project_path(relative: &str) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let root = Path::new(manifest_dir).parent().unwrap_or(Path::new(manifest_dir));
    root.join(relative).to_string_lossy().to_string()
}

/// Zel'dovich pancake
///
/// A single plane wave in Einstein-de Sitter, evolved with full PM forces to
/// half of shell crossing. The 1D Zel'dovich solution is exact here, so the
/// only errors are the mesh force resolution and the time stepping.
///
/// The 16^3 lattice sits on a 64^3 mesh with the finite-difference kernel
/// and one cell of Gaussian smoothing. On a mesh no finer than the lattice,
/// every particle starts on a mesh node and the one-sided CIC footprint
/// leaves an error of order `k h / 2` that no step count removes.
pub fn zeldovich_pancake_test() -> ReferenceTest {
    ReferenceTest {
        name: "Zel'dovich Pancake".to_string(),
        config_path: project_path("configs/pancake.json"),
        scenario: Scenario::PlaneWave {
            crossing_fraction: 0.5,
        },
        expected: ExpectedResult {
            conservation: Some(ConservationCheck {
                expected_particles: 16 * 16 * 16,
            }),
            pancake: Some(PancakeCheck {
                max_position_error: 0.05,
                max_momentum_error: 0.05,
                max_transverse_drift: 1e-3,
            }),
            linear_growth: None,
            task_invariance: None,
        },
    }
}

/// Linear growth
///
/// 2LPT initial conditions in a large box, evolved from z = 49 to z = 9.
/// The fundamental modes must follow linear theory, and a single-task run
/// must reproduce the three-task run. Mesh and kernel as for the pancake:
/// with the continuum kernel on a mesh twice the lattice the fundamental
/// grows about 14% too fast.
pub fn linear_growth_test() -> ReferenceTest {
    ReferenceTest {
        name: "Linear Growth".to_string(),
        config_path: project_path("configs/linear_growth.json"),
        scenario: Scenario::Generated,
        expected: ExpectedResult {
            conservation: Some(ConservationCheck {
                expected_particles: 16 * 16 * 16,
            }),
            pancake: None,
            linear_growth: Some(LinearGrowthCheck { tolerance: 0.03 }),
            task_invariance: Some(TaskInvarianceCheck {
                tasks: 1,
                tolerance: 1e-5,
            }),
        },
    }
}

/// Local non-Gaussianity
///
/// Same growth criterion for initial conditions with f_NL = 100.
pub fn non_gaussian_growth_test() -> ReferenceTest {
    ReferenceTest {
        name: "Non-Gaussian Growth".to_string(),
        config_path: project_path("configs/fnl_box.json"),
        scenario: Scenario::Generated,
        expected: ExpectedResult {
            conservation: Some(ConservationCheck {
                expected_particles: 16 * 16 * 16,
            }),
            linear_growth: Some(LinearGrowthCheck { tolerance: 0.03 }),
            ..ExpectedResult::default()
        },
    }
}

/// Get all reference tests
pub fn all_tests() -> Vec<ReferenceTest> {
    vec![
        zeldovich_pancake_test(),
        linear_growth_test(),
        non_gaussian_growth_test(),
    ]
}
