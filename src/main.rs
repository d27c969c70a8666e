//! `asi-sim`: command-line front-end for the `spin-ice` engine.
//!
//! ```bash
//! # relax a kagome lattice after 5000 Néel steps
//! asi-sim run --geometry ip_kagome --size 40 --steps 5000 --relax
//!
//! # Metropolis temperature sweep, four workers at a time
//! asi-sim sweep --scheme metropolis --temperatures 50,100,200,400 --jobs 4
//! ```

mod args;
mod job;
mod run;
mod stats;
mod sweep;

use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use args::{Cli, Command};
use job::JobSpec;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Command::Run(args) => {
            spin_ice::backend::resolve(cli.backend.as_deref())?;
            let job = args.sim.to_job(&args.run, args.sim.temperature, args.sim.seed)?;
            let result = run::execute(&job, true)?;
            let text = serde_json::to_string_pretty(&result)?;
            match args.output {
                Some(path) => {
                    fs::write(&path, text)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(output = %path.display(), "summary written");
                }
                None => println!("{text}"),
            }
        }
        Command::Sweep(args) => {
            // validate the directive here so a typo fails before any worker starts
            spin_ice::backend::resolve(cli.backend.as_deref())?;
            let summary = sweep::launch(&args, cli.backend.as_deref(), &cli.log_level)?;
            println!("{}", summary.display());
        }
        Command::Worker(args) => {
            spin_ice::backend::resolve(cli.backend.as_deref())?;
            let job = JobSpec::load(&args.job)?;
            let result = run::execute(&job, false)?;
            result.save(&args.result)?;
        }
    }

    Ok(())
}
