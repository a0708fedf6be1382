//! Particle swarm optimization over named rate constants.
//!
//! - `space`: free parameters and their initialization bounds
//! - `particle`: position/velocity state and the inertia-weighted update
//! - `optimizer`: the swarm loop and the `FitnessOracle` seam

pub mod space;
pub mod particle;
pub mod optimizer;

pub use space::{ParameterBounds, ParameterSpace};
pub use particle::{Particle, ParticlePhase, UpdateCoefficients};
pub use optimizer::{
    BoundHandling, FitnessOracle, OptimizationResult, ParticleSwarm, PsoConfig, SwarmState,
};
