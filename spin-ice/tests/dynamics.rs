use approx::assert_relative_eq;
use spin_ice::{
    Budget, ExternalField, Geometry, GeometryKind, KernelReduction, ParamValues, ParamsConfig,
    Pattern, Sampling, SimConfig, SimError, Simulation, StepOutcome, UpdateScheme, K_B,
};

const MU: f64 = 1e-16;
const A: f64 = 1e-7;

/// Two out-of-plane magnets side by side: `J = −1e-7·μ²/a³ < 0`, so they
/// prefer to anti-align. The temperature is chosen so that `2|J| / kT = 1`.
fn dimer(scheme: UpdateScheme, sampling: Sampling, seed: u64) -> Simulation {
    let geometry = GeometryKind::OopSquare
        .build(A, (2, 1), 0.0, false)
        .unwrap();
    let j = 1e-7 * MU * MU / (A * A * A);
    let params = ParamsConfig {
        moment: MU.into(),
        temperature: ParamValues::Uniform(2.0 * j / K_B),
        ..Default::default()
    };
    let config = SimConfig {
        scheme,
        sampling,
        seed,
        ..Default::default()
    };
    Simulation::new(geometry, params, config).unwrap()
}

fn anti_aligned_fraction(sim: &mut Simulation, steps: usize) -> f64 {
    let mut anti = 0;
    for _ in 0..steps {
        sim.step().unwrap();
        if sim.spins()[0] != sim.spins()[1] {
            anti += 1;
        }
    }
    anti as f64 / steps as f64
}

/// An 8x8 out-of-plane grid 1 mm apart, so couplings are negligible and
/// every cell switches at `ν0·exp(−20)`.
fn isolated(sampling: Sampling) -> (Simulation, f64) {
    let kt = K_B * 300.0;
    let params = ParamsConfig {
        e_barrier: ParamValues::Uniform(20.0 * kt),
        temperature: ParamValues::Uniform(300.0),
        ..Default::default()
    };
    let config = SimConfig {
        sampling,
        seed: 31,
        reduction: KernelReduction::Truncated { radius: 1 },
        ..Default::default()
    };
    let geometry = GeometryKind::OopSquare
        .build(1e-3, 8, 0.0, false)
        .unwrap();
    let rate = config.attempt_frequency * (-20f64).exp();
    (Simulation::new(geometry, params, config).unwrap(), rate)
}

/// Switches per cell per simulated second, relative to `rate`.
fn relative_switching_rate(sim: &mut Simulation, rate: f64, steps: usize) -> f64 {
    let summary = sim.steps(steps).unwrap();
    assert_eq!(summary.steps, steps);
    summary.flips as f64 / (sim.n_cells() as f64 * sim.time() * rate)
}

fn lattice(scheme: UpdateScheme, sampling: Sampling, seed: u64) -> Simulation {
    let config = SimConfig {
        scheme,
        sampling,
        seed,
        reduction: KernelReduction::Truncated { radius: 2 },
        ..Default::default()
    };
    Simulation::create(GeometryKind::IpKagome, 1e-6, (16, 11), config).unwrap()
}

#[test]
fn test_dimer_coupling_is_antiferromagnetic() {
    let sim = dimer(UpdateScheme::Metropolis, Sampling::Single, 0);
    assert_relative_eq!(
        sim.coupling(0, 1).unwrap(),
        -1e-7 * MU * MU / (A * A * A),
        max_relative = 1e-12
    );
}

#[test]
fn test_metropolis_detailed_balance() {
    let mut sim = dimer(UpdateScheme::Metropolis, Sampling::Single, 1);
    let expected = 1f64.exp() / (1f64.exp() + 1.0);
    let observed = anti_aligned_fraction(&mut sim, 200_000);
    assert!(
        (observed - expected).abs() < 0.01,
        "observed {observed}, expected {expected}"
    );
}

#[test]
fn test_metropolis_sublattice_detailed_balance() {
    let mut sim = dimer(UpdateScheme::Metropolis, Sampling::Sublattice, 5);
    let expected = 1f64.exp() / (1f64.exp() + 1.0);
    let observed = anti_aligned_fraction(&mut sim, 200_000);
    assert!(
        (observed - expected).abs() < 0.01,
        "observed {observed}, expected {expected}"
    );
}

#[test]
fn test_wolff_detailed_balance() {
    let mut sim = dimer(UpdateScheme::Wolff, Sampling::Single, 2);
    let expected = 1f64.exp() / (1f64.exp() + 1.0);
    let observed = anti_aligned_fraction(&mut sim, 200_000);
    assert!(
        (observed - expected).abs() < 0.01,
        "observed {observed}, expected {expected}"
    );
}

#[test]
fn test_neel_zero_temperature_is_frozen() {
    for sampling in [Sampling::Single, Sampling::Sublattice] {
        let mut sim = lattice(UpdateScheme::Neel, sampling, 3);
        sim.set_temperature(0.0).unwrap();
        let spins = sim.spins().to_vec();
        assert_eq!(sim.step().unwrap(), StepOutcome::Frozen);
        assert_eq!(sim.spins(), &spins[..]);
        assert_eq!(sim.time(), 0.0);

        let summary = sim.steps(10).unwrap();
        assert!(summary.frozen);
        assert_eq!(summary.steps, 0);
    }
}

#[test]
fn test_wolff_zero_temperature_is_frozen() {
    let mut sim = lattice(UpdateScheme::Wolff, Sampling::Single, 3);
    sim.set_temperature(0.0).unwrap();
    assert_eq!(sim.step().unwrap(), StepOutcome::Frozen);
}

#[test]
fn test_neel_batch_advances_clock() {
    let mut sim = lattice(UpdateScheme::Neel, Sampling::Sublattice, 4);
    let mut last = sim.time();
    for _ in 0..50 {
        assert!(matches!(sim.step().unwrap(), StepOutcome::Switched { .. }));
        assert!(sim.time() > last);
        last = sim.time();
    }
}

#[test]
fn test_neel_waiting_time_matches_rate() {
    let (mut sim, rate) = isolated(Sampling::Single);
    let steps = 20_000;
    let ratio = relative_switching_rate(&mut sim, rate, steps);
    assert!((ratio - 1.0).abs() < 0.05, "ratio {ratio}");
    // mean waiting time between switches is 1 / (n·ν)
    let mean_wait = sim.time() / steps as f64;
    assert_relative_eq!(
        mean_wait,
        1.0 / (sim.n_cells() as f64 * rate),
        max_relative = 0.05
    );
}

#[test]
fn test_neel_batch_matches_single_rate() {
    let (mut single, rate) = isolated(Sampling::Single);
    let (mut batch, _) = isolated(Sampling::Sublattice);
    let single = relative_switching_rate(&mut single, rate, 20_000);
    let batch = relative_switching_rate(&mut batch, rate, 5_000);
    assert!((batch - 1.0).abs() < 0.05, "batch ratio {batch}");
    assert!((batch - single).abs() < 0.07, "single {single}, batch {batch}");
}

#[test]
fn test_same_seed_same_trajectory() {
    for scheme in [UpdateScheme::Neel, UpdateScheme::Metropolis, UpdateScheme::Wolff] {
        let mut a = lattice(scheme, Sampling::Single, 9);
        let mut b = lattice(scheme, Sampling::Single, 9);
        for _ in 0..300 {
            assert_eq!(a.step().unwrap(), b.step().unwrap());
        }
        assert_eq!(a.spins(), b.spins());
        assert_eq!(a.time().to_bits(), b.time().to_bits());
    }
}

#[test]
fn test_thread_count_does_not_change_results() {
    let run = |sequential: bool| {
        let config = SimConfig {
            sequential,
            seed: 21,
            ..Default::default()
        };
        let mut sim = Simulation::create(GeometryKind::IpSquare, 1e-6, 10, config).unwrap();
        sim.steps(200).unwrap();
        (sim.spins().to_vec(), sim.time().to_bits())
    };
    assert_eq!(run(true), run(false));
}

#[test]
fn test_spins_stay_binary() {
    for scheme in [UpdateScheme::Neel, UpdateScheme::Metropolis, UpdateScheme::Wolff] {
        let mut sim = lattice(scheme, Sampling::Single, 13);
        let n = sim.n_cells();
        sim.set_field(ExternalField::uniform(5e-3, 1.0)).unwrap();
        sim.steps(500).unwrap();
        assert_eq!(sim.spins().len(), n);
        assert!(sim.spins().iter().all(|&s| s == 1 || s == -1));
    }
}

#[test]
fn test_minimize_descends_strictly() {
    let mut sim = lattice(UpdateScheme::Neel, Sampling::Single, 17);
    let mut energies = vec![sim.total_energy().unwrap()];
    let report = sim
        .minimize_with(Budget::default(), |p| energies.push(p.energy))
        .unwrap();
    assert_eq!(report.flips, energies.len() - 1);
    assert!(energies.windows(2).all(|w| w[1] < w[0]));
    assert_relative_eq!(
        report.energy,
        sim.total_energy().unwrap(),
        max_relative = 1e-9
    );
    for i in 0..sim.n_cells() {
        let delta = 2.0 * sim.spins()[i] as f64 * sim.local_field(i).unwrap();
        assert!(delta >= -1e-9 * report.energy.abs());
    }

    // already minimal: nothing to do
    let again = sim.minimize().unwrap();
    assert_eq!(again.flips, 0);
}

#[test]
fn test_relax_without_tolerance_is_monotone() {
    let config = SimConfig {
        relax_tolerance: 0.0,
        reduction: KernelReduction::Truncated { radius: 2 },
        seed: 8,
        ..Default::default()
    };
    let mut sim = Simulation::create(GeometryKind::IpSquare, 1e-6, 12, config).unwrap();
    let mut energies = vec![sim.total_energy().unwrap()];
    let report = sim
        .relax_with(Budget::default(), |p| energies.push(p.energy))
        .unwrap();
    assert_eq!(report.iterations, energies.len() - 1);
    assert!(energies.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(sim.minimize().unwrap().flips, 0);
}

#[test]
fn test_budget_exhaustion_keeps_best_state() {
    let mut sim = lattice(UpdateScheme::Neel, Sampling::Single, 23);
    let start = sim.total_energy().unwrap();
    match sim.minimize_with(Budget::iterations(3), |_| {}) {
        Err(SimError::NotConverged(w)) => {
            assert_eq!(w.procedure, "minimize");
            assert_eq!(w.iterations, 3);
            assert_eq!(w.best_state, sim.spins());
            assert!(w.best_energy < start);
        }
        other => panic!("expected a convergence warning, got {other:?}"),
    }

    // the cached fields follow the restored state
    let report = sim.minimize().unwrap();
    assert_relative_eq!(
        report.energy,
        sim.total_energy().unwrap(),
        max_relative = 1e-9
    );
    for i in 0..sim.n_cells() {
        let delta = 2.0 * sim.spins()[i] as f64 * sim.local_field(i).unwrap();
        assert!(delta >= -1e-9 * report.energy.abs());
    }
}

#[test]
fn test_custom_geometry() {
    let geometry = Geometry::from_cells(
        4,
        4,
        5e-7,
        5e-7,
        true,
        false,
        vec![(0, 0, 0.0), (1, 0, 0.0), (3, 2, 1.2), (2, 3, -0.4)],
    )
    .unwrap();
    let config = SimConfig {
        pattern: Pattern::Afm,
        scheme: UpdateScheme::Metropolis,
        ..Default::default()
    };
    let mut sim = Simulation::new(geometry, ParamsConfig::default(), config).unwrap();
    assert_eq!(sim.n_cells(), 4);
    sim.steps(100).unwrap();
    assert_eq!(sim.sweeps(), 25.0);
}
