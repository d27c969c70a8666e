use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use spin_ice::{Budget, RelaxReport, SimError, SimResult, Simulation, StepOutcome};
use tracing::{debug, info, warn};

use crate::job::{DescentResult, JobResult, JobSpec};
use crate::stats::Recorder;

fn progress_bar(len: u64, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{msg} [{bar:40}] {pos}/{len} [{elapsed_precise} < {eta_precise}, {per_sec}]",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

fn descent(procedure: &'static str, result: SimResult<RelaxReport>) -> Result<DescentResult> {
    match result {
        Ok(report) => Ok(DescentResult {
            procedure,
            converged: true,
            iterations: report.iterations,
            energy: report.energy,
            report: Some(report),
        }),
        Err(SimError::NotConverged(w)) => {
            warn!(procedure, iterations = w.iterations, "continuing from best state");
            Ok(DescentResult {
                procedure,
                converged: false,
                iterations: w.iterations,
                energy: w.best_energy,
                report: None,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Build the simulation described by `job`, step it, optionally relax it,
/// and summarise the result.
pub fn execute(job: &JobSpec, show_progress: bool) -> Result<JobResult> {
    let mut sim = Simulation::new(
        job.kind.build(job.a, job.extent, job.config.angle, job.config.periodic)?,
        job.params.clone(),
        job.config.clone(),
    )?;
    sim.set_field(job.field.clone())?;

    let mut recorder = Recorder::new();
    let (mut steps, mut flips, mut frozen) = (0, 0, false);

    let pb = progress_bar(job.steps as u64, show_progress);
    pb.set_message("steps");
    for step in 0..job.steps {
        match sim.step()? {
            StepOutcome::Frozen => {
                frozen = true;
                break;
            }
            outcome => flips += outcome.flips(),
        }
        steps += 1;
        pb.inc(1);
        if (step + 1) % job.record_every == 0 {
            let m = sim.magnetization();
            let magnitude = (m.x * m.x + m.y * m.y + m.z * m.z).sqrt();
            recorder.record(sim.total_energy()?, magnitude);
        }
    }
    pb.finish_and_clear();
    if frozen {
        warn!(steps, "stopped early: no cell can switch");
    }

    let mut descents = Vec::new();
    if job.relax {
        let result = sim.relax_with(Budget::default(), |p| {
            debug!(round = p.iteration, flips = p.flips, energy = p.energy, "relax");
        });
        descents.push(descent("relax", result)?);
    }
    if job.minimize {
        let result = sim.minimize();
        descents.push(descent("minimize", result)?);
    }

    let snapshot = sim.snapshot()?;
    info!(
        steps,
        flips,
        time = snapshot.time,
        energy = snapshot.energy.total,
        "run finished"
    );
    Ok(JobResult {
        n_cells: sim.n_cells(),
        steps,
        flips,
        frozen,
        time: snapshot.time,
        sweeps: snapshot.sweeps,
        energy: snapshot.energy,
        magnetization: snapshot.magnetization,
        observables: recorder.summary(),
        descent: descents,
        spins: snapshot.spins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spin_ice::{
        Extent, ExternalField, GeometryKind, KernelReduction, ParamsConfig, SimConfig,
        UpdateScheme,
    };

    fn job(scheme: UpdateScheme) -> JobSpec {
        JobSpec {
            kind: GeometryKind::IpSquare,
            a: 1e-6,
            extent: Extent::Square(6),
            config: SimConfig {
                scheme,
                reduction: KernelReduction::Truncated { radius: 2 },
                relax_tolerance: 0.0,
                ..Default::default()
            },
            params: ParamsConfig::default(),
            field: ExternalField::default(),
            steps: 40,
            record_every: 4,
            relax: true,
            minimize: true,
        }
    }

    #[test]
    fn test_execute_records_and_relaxes() {
        let result = execute(&job(UpdateScheme::Metropolis), false).unwrap();
        assert_eq!(result.steps, 40);
        assert_eq!(result.observables.samples, 10);
        assert_eq!(result.descent.len(), 2);
        assert!(result.descent.iter().all(|d| d.converged));
        assert_eq!(result.spins.len(), result.n_cells);
    }

    #[test]
    fn test_frozen_run_stops_early() {
        let mut spec = job(UpdateScheme::Neel);
        spec.params.temperature = 0.0.into();
        spec.relax = false;
        spec.minimize = false;
        let result = execute(&spec, false).unwrap();
        assert!(result.frozen);
        assert_eq!(result.steps, 0);
        assert_eq!(result.time, 0.0);
    }
}
