//! Ensemble Monte Carlo over titration sweeps.

pub mod histogram;
pub mod ensemble;

pub use histogram::OccupancyHistogram;
pub use ensemble::{
    run_sweep, simulate_point, simulate_time_course, stream_seed, SimulationConfig,
    SweepResult, TimeCourse, TitrationAxis,
};
