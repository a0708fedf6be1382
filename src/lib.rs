//! Kinetic Monte Carlo calibration of pump-cycle rate constants.
//!
//! A molecule walks a discrete state network in fixed time steps; a large
//! ensemble swept over ligand concentrations gives a steady-state
//! dose-response curve; a particle swarm searches the free rate constants
//! that best reproduce experimental curves.
//!
//! - `network`: reaction networks, the transition engine, SERCA presets
//! - `simulation`: parallel ensembles, histograms, titration sweeps
//! - `residual`: observables and the root-sum-of-squares cost
//! - `pso`: particle swarm optimizer
//! - `calibration`: fitness oracle and final run
//! - `report`: progress sinks (log, CSV, in-memory)
//! - `config`: JSON fit configuration

pub mod error;
pub mod cancel;
pub mod network;
pub mod simulation;
pub mod residual;
pub mod pso;
pub mod calibration;
pub mod report;
pub mod config;

#[cfg(feature = "python")]
mod python;

pub use error::{KineticsError, Result};
pub use cancel::CancellationToken;
pub use network::{
    RateVector, ReactionNetwork, SpeciesConcentrations, StateId, TopologySpec, TransitionSpec,
};
pub use simulation::{run_sweep, OccupancyHistogram, SimulationConfig, SweepResult, TitrationAxis};
pub use residual::{score, ExperimentalCurve, LinearObservable, OccupancyObservable, SweepPoint};
pub use pso::{BoundHandling, FitnessOracle, OptimizationResult, ParticleSwarm, PsoConfig};
pub use calibration::{calibrate, Assay, CalibrationOutcome, CalibrationProblem, FinalRun};
pub use report::{CsvSink, HistorySink, LogSink, ProgressSink};
pub use config::FitConfig;
