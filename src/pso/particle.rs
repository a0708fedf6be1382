//! Swarm particle and its per-iteration lifecycle.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::space::ParameterSpace;

/// Where a particle is in the evaluate/update cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticlePhase {
    Initialized,
    Evaluated,
    Updated,
    Exhausted,
}

/// Inertia and acceleration coefficients for one update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateCoefficients {
    pub inertia: f64,
    pub cognitive: f64,
    pub social: f64,
}

#[derive(Clone, Debug)]
pub struct Particle {
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    /// Fitness of the current position; `+inf` until evaluated or when degenerate.
    pub fitness: f64,
    pub personal_best_position: Vec<f64>,
    pub personal_best_fitness: f64,
    pub phase: ParticlePhase,
}

impl Particle {
    /// Random position and velocity inside `space`.
    pub fn initialize<R: Rng + ?Sized>(space: &ParameterSpace, rng: &mut R) -> Self {
        let position = space.sample_position(rng);
        let velocity = space.sample_velocity(rng);
        Self {
            personal_best_position: position.clone(),
            position,
            velocity,
            fitness: f64::INFINITY,
            personal_best_fitness: f64::INFINITY,
            phase: ParticlePhase::Initialized,
        }
    }

    /// Store the fitness of the current position.
    ///
    /// The personal best moves on ties as well as improvements. A non-finite
    /// fitness never becomes a personal best. Returns whether it moved.
    pub fn record_fitness(&mut self, fitness: f64) -> bool {
        self.fitness = fitness;
        self.phase = ParticlePhase::Evaluated;
        if fitness.is_finite() && fitness <= self.personal_best_fitness {
            self.personal_best_fitness = fitness;
            self.personal_best_position.clone_from(&self.position);
            true
        } else {
            false
        }
    }

    /// Inertia-weighted velocity update followed by `position += velocity`.
    ///
    /// Each dimension draws its own cognitive and social factors. Without a
    /// global best the social term is dropped.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        global_best: Option<&[f64]>,
        coefficients: UpdateCoefficients,
        rng: &mut R,
    ) {
        for d in 0..self.position.len() {
            let x = self.position[d];
            let cognitive =
                coefficients.cognitive * rng.gen::<f64>() * (self.personal_best_position[d] - x);
            let social_pull = global_best.map_or(0.0, |g| g[d] - x);
            let social = coefficients.social * rng.gen::<f64>() * social_pull;

            self.velocity[d] = coefficients.inertia * self.velocity[d] + cognitive + social;
            self.position[d] = x + self.velocity[d];
        }
        self.phase = ParticlePhase::Updated;
    }
}
