//! `serca-fit` command line: fit, simulate, or print the default configuration.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use serca_fit::calibration::calibrate;
use serca_fit::config::FitConfig;
use serca_fit::report::{CsvSink, FanoutSink, LogSink, ProgressSink};

#[derive(Parser)]
#[command(name = "serca-fit")]
#[command(about = "Kinetic Monte Carlo calibration of SERCA rate constants", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the free rate constants with a particle swarm, then re-run the best
    Fit {
        /// Fit configuration JSON (defaults to the published SERCA calcium fit)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for CSV output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the swarm seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the number of particles
        #[arg(long)]
        particles: Option<usize>,

        /// Override the number of update iterations
        #[arg(long)]
        iterations: Option<usize>,

        /// Override the number of molecules per titration point
        #[arg(long)]
        molecules: Option<usize>,
    },
    /// Simulate every assay once with the configured rates, no search
    Simulate {
        /// Fit configuration JSON (defaults to the published SERCA calcium fit)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for CSV output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Simulation seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Print the default fit configuration as JSON
    DefaultConfig {
        /// Add the phosphate/phosphoenzyme assay
        #[arg(long, action = ArgAction::SetTrue)]
        with_phosphorylation: bool,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<FitConfig> {
    match path {
        Some(path) => FitConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(FitConfig::serca_default()),
    }
}

fn make_sink(output: Option<&PathBuf>) -> Result<FanoutSink> {
    let mut sink = FanoutSink::new().with(LogSink);
    if let Some(dir) = output {
        sink = sink.with(CsvSink::new(dir)?);
    }
    Ok(sink)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Fit {
            config,
            output,
            seed,
            particles,
            iterations,
            molecules,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(seed) = seed {
                config.pso.seed = seed;
            }
            if let Some(n) = particles {
                config.pso.n_particles = n;
            }
            if let Some(n) = iterations {
                config.pso.n_iterations = n;
            }
            if let Some(n) = molecules {
                config.simulation.n_molecules = n;
            }

            let problem = config.build_problem()?;
            let mut sink = make_sink(output.as_ref())?;
            let start = Instant::now();
            let outcome = calibrate(
                &problem,
                config.pso.clone(),
                config.final_run.record_time_course,
                &mut sink,
            )?;

            println!("best residual: {}", outcome.optimization.best_fitness);
            for (name, value) in outcome.optimization.best_rates() {
                let nominal = config
                    .rates
                    .get(&name)
                    .map(|v| format!(" (configured {:e})", v))
                    .unwrap_or_default();
                println!("  {} = {:e}{}", name, value, nominal);
            }
            let final_run = outcome
                .final_run
                .as_ref()
                .map_err(|e| anyhow!("final run failed: {}", e))?;
            println!("final-run residual: {}", final_run.residual);
            println!("total runtime: {:.1}s", start.elapsed().as_secs_f64());
        }
        Command::Simulate {
            config,
            output,
            seed,
        } => {
            let config = load_config(config.as_ref())?;
            let problem = config.build_problem()?;
            let mut sink = make_sink(output.as_ref())?;
            let run = problem.final_run(
                &config.rates,
                seed,
                config.final_run.record_time_course,
                &mut sink,
            )?;
            sink.finish();

            for curve in &run.curves {
                println!("{} (residual {}):", curve.assay, curve.residual);
                for p in &curve.points {
                    println!(
                        "  {:e}\t{:.4}\t{:.4}",
                        p.titrated_concentration, p.simulated_normalized, p.experimental_normalized
                    );
                }
            }
        }
        Command::DefaultConfig {
            with_phosphorylation,
            output,
        } => {
            let mut config = FitConfig::serca_default();
            if with_phosphorylation {
                config.assays.push(FitConfig::phosphorylation_assay());
            }
            let json = config.to_json()?;
            match output {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", json),
            }
        }
    }

    Ok(())
}
