//! Particle swarm optimizer.
//!
//! Every iteration is a two-phase round:
//! 1. update every particle against the bests synchronized last round;
//! 2. evaluate every particle in parallel, then synchronize personal and
//!    global bests.
//!
//! So each evaluation in round `k` sees the global best of round `k - 1`.
//! The swarm RNG is only used on the sequential update path and each
//! evaluation gets a seed derived from `(round, particle)`, so a run is
//! reproducible from its seed regardless of thread count.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::particle::{Particle, ParticlePhase, UpdateCoefficients};
use super::space::ParameterSpace;
use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{KineticsError, Result};
use crate::network::RateVector;
use crate::report::{IterationRecord, ParticleRecord, ProgressSink};
use crate::simulation::stream_seed;

/// Objective minimized by the swarm.
pub trait FitnessOracle: Sync {
    /// Fitness of `position`, a point in the swarm's [`ParameterSpace`].
    ///
    /// `seed` is unique per (round, particle). `NumericDegeneracy` marks the
    /// point as worst-possible; any other error aborts the run.
    fn evaluate(&self, position: &[f64], seed: u64) -> Result<f64>;
}

impl<F> FitnessOracle for F
where
    F: Fn(&[f64], u64) -> Result<f64> + Sync,
{
    fn evaluate(&self, position: &[f64], seed: u64) -> Result<f64> {
        self(position, seed)
    }
}

/// What happens to positions that leave their initialization bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundHandling {
    /// Positions move freely; rates may turn negative or diverge.
    #[default]
    Free,
    /// Positions are clipped to `[lower, upper]` after every update.
    Clamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PsoConfig {
    pub n_particles: usize,
    /// Update rounds after the initial evaluation.
    pub n_iterations: usize,
    pub w_max: f64,
    pub w_min: f64,
    /// Cognitive (personal best) acceleration.
    pub c1: f64,
    /// Social (global best) acceleration.
    pub c2: f64,
    #[serde(default)]
    pub bound_handling: BoundHandling,
    #[serde(default)]
    pub seed: u64,
}

impl Default for PsoConfig {
    fn default() -> Self {
        Self {
            n_particles: 100,
            n_iterations: 100,
            w_max: 1.0,
            w_min: 0.3,
            c1: 1.05,
            c2: 1.05,
            bound_handling: BoundHandling::Free,
            seed: 0,
        }
    }
}

impl PsoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_particles == 0 {
            return Err(KineticsError::config("n_particles must be positive"));
        }
        let coefficients = [self.w_max, self.w_min, self.c1, self.c2];
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(KineticsError::config("PSO coefficients must be finite"));
        }
        if self.w_min > self.w_max {
            return Err(KineticsError::config(format!(
                "w_min {} exceeds w_max {}",
                self.w_min, self.w_max
            )));
        }
        Ok(())
    }

    /// Inertia for update round `k` (0-based): linear from `w_max` down to `w_min`.
    pub fn inertia(&self, k: usize) -> f64 {
        let span = self.n_iterations.saturating_sub(1).max(1) as f64;
        self.w_max - (self.w_max - self.w_min) * (k as f64 / span)
    }
}

/// Particles plus the synchronized global best.
#[derive(Clone, Debug)]
pub struct SwarmState {
    pub particles: Vec<Particle>,
    /// `None` while every evaluation so far has been degenerate.
    pub global_best_position: Option<Vec<f64>>,
    pub global_best_fitness: f64,
    pub iteration: usize,
}

impl SwarmState {
    fn new(particles: Vec<Particle>) -> Self {
        Self {
            particles,
            global_best_position: None,
            global_best_fitness: f64::INFINITY,
            iteration: 0,
        }
    }

    /// Move personal bests, then the global best to the lowest-index minimum
    /// of this round if it ties or beats the previous one.
    fn synchronize(&mut self, fitness: &[f64]) {
        let mut round_best: Option<(usize, f64)> = None;
        for (i, (particle, &f)) in self.particles.iter_mut().zip(fitness).enumerate() {
            particle.record_fitness(f);
            if f.is_finite() && round_best.map_or(true, |(_, best)| f < best) {
                round_best = Some((i, f));
            }
        }

        if let Some((i, f)) = round_best {
            if f <= self.global_best_fitness {
                self.global_best_fitness = f;
                self.global_best_position = Some(self.particles[i].position.clone());
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct OptimizationResult {
    pub parameter_names: Vec<String>,
    pub best_position: Vec<f64>,
    pub best_fitness: f64,
    /// Global best after each round; entry 0 is the initial swarm.
    pub history: Vec<f64>,
    pub evaluations: usize,
    pub degenerate_evaluations: usize,
    pub swarm: SwarmState,
}

impl OptimizationResult {
    pub fn best_rates(&self) -> RateVector {
        self.parameter_names
            .iter()
            .cloned()
            .zip(self.best_position.iter().copied())
            .collect()
    }
}

pub struct ParticleSwarm<'a, O: FitnessOracle> {
    space: ParameterSpace,
    config: PsoConfig,
    oracle: &'a O,
}

impl<'a, O: FitnessOracle> ParticleSwarm<'a, O> {
    pub fn new(space: ParameterSpace, config: PsoConfig, oracle: &'a O) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            space,
            config,
            oracle,
        })
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn config(&self) -> &PsoConfig {
        &self.config
    }

    /// Initialize, evaluate, then run `n_iterations` update rounds.
    ///
    /// Cancellation is polled before every round. Fails with
    /// `NumericDegeneracy` only if no evaluation in the whole run was usable.
    pub fn run(
        &self,
        sink: &mut dyn ProgressSink,
        cancel: Option<&CancellationToken>,
    ) -> Result<OptimizationResult> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let particles = (0..self.config.n_particles)
            .map(|_| Particle::initialize(&self.space, &mut rng))
            .collect();
        let mut swarm = SwarmState::new(particles);
        let mut history = Vec::with_capacity(self.config.n_iterations + 1);
        let mut degenerate = 0;

        checkpoint(cancel)?;
        degenerate += self.evaluate_round(&mut swarm, sink)?;
        history.push(swarm.global_best_fitness);
        sink.on_iteration(&IterationRecord {
            iteration: 0,
            inertia: None,
            global_best_residual: swarm.global_best_fitness,
        });

        for k in 0..self.config.n_iterations {
            checkpoint(cancel)?;
            let inertia = self.config.inertia(k);
            let coefficients = UpdateCoefficients {
                inertia,
                cognitive: self.config.c1,
                social: self.config.c2,
            };
            let global_best = swarm.global_best_position.clone();
            for particle in swarm.particles.iter_mut() {
                particle.update(global_best.as_deref(), coefficients, &mut rng);
                if self.config.bound_handling == BoundHandling::Clamp {
                    self.space.clamp(&mut particle.position);
                }
            }

            swarm.iteration = k + 1;
            degenerate += self.evaluate_round(&mut swarm, sink)?;
            history.push(swarm.global_best_fitness);
            sink.on_iteration(&IterationRecord {
                iteration: swarm.iteration,
                inertia: Some(inertia),
                global_best_residual: swarm.global_best_fitness,
            });
        }

        for particle in swarm.particles.iter_mut() {
            particle.phase = ParticlePhase::Exhausted;
        }

        let best_position = swarm.global_best_position.clone().ok_or_else(|| {
            KineticsError::degenerate("every fitness evaluation was degenerate")
        })?;
        let evaluations = self.config.n_particles * (self.config.n_iterations + 1);
        log::info!(
            "swarm finished: best residual {} after {} evaluations ({} degenerate)",
            swarm.global_best_fitness,
            evaluations,
            degenerate
        );

        Ok(OptimizationResult {
            parameter_names: self.space.names().to_vec(),
            best_position,
            best_fitness: swarm.global_best_fitness,
            history,
            evaluations,
            degenerate_evaluations: degenerate,
            swarm,
        })
    }

    /// Evaluate all particles in parallel, then synchronize bests.
    /// Returns the number of degenerate evaluations.
    fn evaluate_round(&self, swarm: &mut SwarmState, sink: &mut dyn ProgressSink) -> Result<usize> {
        let round = swarm.iteration as u64;
        let seed = self.config.seed;
        let outcomes: Vec<Result<f64>> = swarm
            .particles
            .par_iter()
            .enumerate()
            .map(|(i, particle)| {
                self.oracle
                    .evaluate(&particle.position, stream_seed(seed, &[round, i as u64]))
            })
            .collect();

        let mut fitness = Vec::with_capacity(outcomes.len());
        let mut degenerate = 0;
        for (i, outcome) in outcomes.into_iter().enumerate() {
            let f = match outcome {
                Ok(f) if f.is_finite() => f,
                Ok(f) => {
                    log::warn!("round {} particle {}: non-finite fitness {}", round, i, f);
                    degenerate += 1;
                    f64::INFINITY
                }
                Err(e) if e.is_degenerate() => {
                    log::warn!("round {} particle {}: {}", round, i, e);
                    degenerate += 1;
                    f64::INFINITY
                }
                Err(e) => return Err(e),
            };
            sink.on_particle(&ParticleRecord {
                iteration: swarm.iteration,
                particle: i,
                parameters: self.space.to_rates(&swarm.particles[i].position),
                residual: f,
            });
            fitness.push(f);
        }

        swarm.synchronize(&fitness);
        Ok(degenerate)
    }
}
