use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use spin_ice::{
    Extent, ExternalField, GeometryKind, KernelReduction, ParamValues, ParamsConfig, Pattern,
    Sampling, SimConfig, UpdateScheme,
};

use crate::job::JobSpec;

/// Thermally driven artificial spin-ice simulator
#[derive(Parser, Debug)]
#[command(name = "asi-sim")]
#[command(author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Compute backend for this process (cpu or accelerator). Falls back to
    /// the ASI_BACKEND environment variable, then cpu.
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one simulation and print a JSON summary
    Run(RunArgs),

    /// Run one worker process per temperature and collect a summary
    Sweep(SweepArgs),

    /// Execute a single job file (spawned by `sweep`)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Lattice, physics and algorithm settings shared by `run` and `sweep`.
#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    /// Lattice kind: oop_square, ip_ising, ip_square, ip_pinwheel, ip_kagome, ip_triangle
    #[arg(long, default_value = "ip_square")]
    pub geometry: String,

    /// Characteristic length a [m]
    #[arg(long, default_value_t = 1e-6)]
    pub a: f64,

    /// Grid size along x (and y, unless --ny is given)
    #[arg(long, default_value_t = 20)]
    pub size: usize,

    #[arg(long)]
    pub ny: Option<usize>,

    #[arg(long)]
    pub periodic: bool,

    /// Update scheme: neel, metropolis or wolff
    #[arg(long, default_value = "neel")]
    pub scheme: String,

    /// Kernel reduction: full, truncatedN or threshold:X
    #[arg(long, default_value = "full")]
    pub reduction: String,

    /// Sampling: single, sublattice or gridN
    #[arg(long, default_value = "single")]
    pub sampling: String,

    /// Initial pattern: uniform, random or afm
    #[arg(long, default_value = "random")]
    pub pattern: String,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Temperature [K]
    #[arg(long, default_value_t = 300.0)]
    pub temperature: f64,

    /// Intrinsic switching barrier [J]
    #[arg(long, default_value_t = 5e-22)]
    pub barrier: f64,

    /// Magnetic moment [A·m²]
    #[arg(long, default_value_t = 1.6e-16)]
    pub moment: f64,

    /// Uniaxial anisotropy [J]
    #[arg(long, default_value_t = 0.0)]
    pub anisotropy: f64,

    /// External field magnitude [T]
    #[arg(long, default_value_t = 0.0)]
    pub field: f64,

    /// External field angle [rad]
    #[arg(long, default_value_t = 0.0)]
    pub field_angle: f64,

    /// Nearest-neighbour exchange [J], positive favours alignment
    #[arg(long, default_value_t = 0.0)]
    pub exchange: f64,

    /// Néel attempt frequency [Hz]
    #[arg(long, default_value_t = 1e10)]
    pub attempt_frequency: f64,

    /// Evaluate per-cell work on one thread
    #[arg(long)]
    pub sequential: bool,
}

impl SimArgs {
    /// Turn the command-line settings into a job at `temperature`.
    pub fn to_job(&self, run: &RunOptions, temperature: f64, seed: u64) -> Result<JobSpec> {
        let kind = GeometryKind::try_from(self.geometry.as_str()).map_err(|e| anyhow!(e))?;
        let config = SimConfig {
            scheme: UpdateScheme::try_from(self.scheme.as_str()).map_err(|e| anyhow!(e))?,
            reduction: KernelReduction::try_from(self.reduction.as_str())
                .map_err(|e| anyhow!(e))?,
            sampling: Sampling::try_from(self.sampling.as_str()).map_err(|e| anyhow!(e))?,
            pattern: Pattern::try_from(self.pattern.as_str()).map_err(|e| anyhow!(e))?,
            seed,
            periodic: self.periodic,
            attempt_frequency: self.attempt_frequency,
            exchange: self.exchange,
            sequential: self.sequential,
            ..Default::default()
        };
        let extent = match self.ny {
            Some(ny) => Extent::Rect { nx: self.size, ny },
            None => Extent::Square(self.size),
        };
        Ok(JobSpec {
            kind,
            a: self.a,
            extent,
            config,
            params: ParamsConfig {
                moment: ParamValues::Uniform(self.moment),
                e_barrier: ParamValues::Uniform(self.barrier),
                temperature: ParamValues::Uniform(temperature),
                anisotropy: ParamValues::Uniform(self.anisotropy),
            },
            field: ExternalField::uniform(self.field, self.field_angle),
            steps: run.steps,
            record_every: run.record_every.max(1),
            relax: run.relax,
            minimize: run.minimize,
        })
    }
}

/// What to do with a constructed simulation.
#[derive(Args, Debug, Clone)]
pub struct RunOptions {
    /// Update steps to perform
    #[arg(long, default_value_t = 10_000)]
    pub steps: usize,

    /// Record observables every N steps
    #[arg(long, default_value_t = 10)]
    pub record_every: usize,

    /// Relax to a local minimum after stepping
    #[arg(long)]
    pub relax: bool,

    /// Run strict sequential descent after stepping
    #[arg(long)]
    pub minimize: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub sim: SimArgs,

    #[command(flatten)]
    pub run: RunOptions,

    /// Write the JSON summary here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    #[command(flatten)]
    pub sim: SimArgs,

    #[command(flatten)]
    pub run: RunOptions,

    /// Temperatures [K], comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub temperatures: Vec<f64>,

    /// Worker processes running at once
    #[arg(long, short, default_value_t = 4)]
    pub jobs: usize,

    /// Directory for job, result and log files
    #[arg(long, default_value = "sweep")]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[arg(long)]
    pub job: PathBuf,

    #[arg(long)]
    pub result: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_job_from_args() {
        let cli = Cli::parse_from([
            "asi-sim",
            "--backend",
            "cpu",
            "run",
            "--geometry",
            "ip_kagome",
            "--size",
            "24",
            "--scheme",
            "wolff",
            "--reduction",
            "truncated3",
            "--exchange",
            "2e-21",
            "--steps",
            "50",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(cli.backend.as_deref(), Some("cpu"));
        let job = args.sim.to_job(&args.run, 150.0, 7).unwrap();
        assert_eq!(job.kind, GeometryKind::IpKagome);
        assert_eq!(job.config.scheme, UpdateScheme::Wolff);
        assert_eq!(job.config.reduction, KernelReduction::Truncated { radius: 3 });
        assert_eq!(job.config.seed, 7);
        assert_eq!(job.config.exchange, 2e-21);
        assert_eq!(job.params.temperature, ParamValues::Uniform(150.0));
        assert_eq!(job.steps, 50);
    }

    #[test]
    fn test_bad_identifiers_rejected() {
        let cli = Cli::parse_from(["asi-sim", "run", "--sampling", "stripes"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.sim.to_job(&args.run, 300.0, 1).is_err());
    }

    #[test]
    fn test_sweep_temperature_list() {
        let cli = Cli::parse_from(["asi-sim", "sweep", "--temperatures", "100,200,300", "-j", "2"]);
        let Command::Sweep(args) = cli.command else {
            panic!("expected sweep");
        };
        assert_eq!(args.temperatures, vec![100.0, 200.0, 300.0]);
        assert_eq!(args.jobs, 2);
    }
}
