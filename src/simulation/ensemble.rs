//! Ensemble simulator: many independent molecules across a titration sweep.
//!
//! Trajectories run in parallel with Rayon. Each one owns a `StdRng` seeded
//! from the point seed and the molecule index, and each worker folds into its
//! own partial histogram; the partials are summed at the end. Results depend
//! only on the configuration and seed, never on thread scheduling.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::histogram::OccupancyHistogram;
use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{KineticsError, Result};
use crate::network::{RateVector, ReactionNetwork, SpeciesConcentrations, StateId, StepTable};

/// Derive an independent stream seed from a base seed and a path of indices.
///
/// SplitMix64 finalizer applied per index, so neighbouring indices give
/// unrelated seeds.
pub fn stream_seed(base: u64, indices: &[u64]) -> u64 {
    indices.iter().fold(splitmix64(base), |acc, &i| {
        splitmix64(acc ^ splitmix64(i.wrapping_add(0x9E37_79B9_7F4A_7C15)))
    })
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Monte Carlo run size and sampling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Independent molecules per titration point.
    pub n_molecules: usize,
    /// Fixed-length time steps per trajectory.
    pub n_steps: usize,
    /// Step length in seconds.
    pub dt: f64,
    /// Steps per histogram bucket.
    pub sample_interval: usize,
    /// Number of trailing buckets averaged into the steady state.
    pub tail_window: usize,
    /// Base seed for every trajectory stream.
    #[serde(default)]
    pub seed: u64,
    /// Starting state of every molecule.
    #[serde(default)]
    pub initial_state: StateId,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_molecules: 10_000,
            n_steps: 100_001,
            dt: 1e-7,
            sample_interval: 1000,
            tail_window: 10,
            seed: 0,
            initial_state: 0,
        }
    }
}

impl SimulationConfig {
    /// Histogram buckets produced per trajectory.
    pub fn n_buckets(&self) -> usize {
        if self.sample_interval == 0 {
            0
        } else {
            self.n_steps / self.sample_interval
        }
    }

    /// Fail-fast checks that do not need a network.
    pub fn validate(&self) -> Result<()> {
        if self.n_molecules == 0 {
            return Err(KineticsError::config("n_molecules must be positive"));
        }
        if self.n_steps == 0 {
            return Err(KineticsError::config("n_steps must be positive"));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(KineticsError::config(format!(
                "dt must be positive and finite, got {}",
                self.dt
            )));
        }
        if self.sample_interval == 0 || self.sample_interval > self.n_steps {
            return Err(KineticsError::config(format!(
                "sample_interval {} must be in 1..={}",
                self.sample_interval, self.n_steps
            )));
        }
        if self.tail_window == 0 || self.tail_window >= self.n_buckets() {
            return Err(KineticsError::config(format!(
                "tail_window {} must be in 1..{} (buckets from {} steps sampled every {})",
                self.tail_window,
                self.n_buckets(),
                self.n_steps,
                self.sample_interval
            )));
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus checks against a concrete network.
    pub fn validate_for(&self, network: &ReactionNetwork) -> Result<()> {
        self.validate()?;
        if self.initial_state >= network.n_states() {
            return Err(KineticsError::config(format!(
                "initial state {} outside 0..{}",
                self.initial_state,
                network.n_states()
            )));
        }
        Ok(())
    }

    pub fn with_seed(&self, seed: u64) -> Self {
        Self {
            seed,
            ..self.clone()
        }
    }
}

/// The titrated ligand and its concentrations, in sweep order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TitrationAxis {
    pub species: String,
    pub values: Vec<f64>,
}

impl TitrationAxis {
    pub fn new(species: &str, values: Vec<f64>) -> Self {
        Self {
            species: species.to_string(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn validate_for(&self, network: &ReactionNetwork) -> Result<()> {
        if self.values.is_empty() {
            return Err(KineticsError::config(format!(
                "titration of '{}' has no points",
                self.species
            )));
        }
        if network.species_id(&self.species).is_none() {
            return Err(KineticsError::config(format!(
                "titrated species '{}' does not appear in the network",
                self.species
            )));
        }
        if let Some(bad) = self.values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(KineticsError::config(format!(
                "titration of '{}' has invalid concentration {}",
                self.species, bad
            )));
        }
        Ok(())
    }
}

/// Steady-state occupancy per titration point.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepResult {
    pub titration: Vec<f64>,
    /// `steady_states[point][state]`, fractions of the ensemble.
    pub steady_states: Vec<Vec<f64>>,
}

/// Occupancy time course at one fixed condition.
#[derive(Clone, Debug)]
pub struct TimeCourse {
    /// End time of each bucket in seconds.
    pub times: Vec<f64>,
    /// Fractional occupancy `[bucket, state]`.
    pub fractions: Array2<f64>,
    pub steady_state: Vec<f64>,
}

fn run_trajectory(
    table: &StepTable,
    config: &SimulationConfig,
    rng: &mut StdRng,
    histogram: &mut OccupancyHistogram,
) {
    let mut state = config.initial_state;
    let mut next_sample = config.sample_interval;
    let mut bucket = 0;
    for n in 1..=config.n_steps {
        state = table.step(state, rng);
        if n == next_sample {
            histogram.record(bucket, state);
            bucket += 1;
            next_sample += config.sample_interval;
        }
    }
}

/// Simulate `config.n_molecules` trajectories at one condition.
///
/// # Arguments
/// * `network` - Reaction network
/// * `rates` - Dense rate vector from [`ReactionNetwork::resolve_rates`]
/// * `concentrations` - Dense species vector from [`ReactionNetwork::resolve_species`]
/// * `config` - Validated run size; `config.seed` seeds this point
///
/// # Returns
/// * Merged histogram of all trajectories
pub fn simulate_point(
    network: &ReactionNetwork,
    rates: &[f64],
    concentrations: &[f64],
    config: &SimulationConfig,
) -> OccupancyHistogram {
    let table = StepTable::new(network, rates, concentrations, config.dt);
    let saturated = table.saturated_states();
    if !saturated.is_empty() {
        log::debug!(
            "outgoing step probability >= 1 in states {:?}; later edges are unreachable",
            saturated
        );
    }

    let n_buckets = config.n_buckets();
    let n_states = network.n_states();
    let seed = config.seed;

    (0..config.n_molecules)
        .into_par_iter()
        .fold(
            || OccupancyHistogram::new(n_buckets, n_states),
            |mut histogram, molecule| {
                let mut rng = StdRng::seed_from_u64(stream_seed(seed, &[molecule as u64]));
                run_trajectory(&table, config, &mut rng, &mut histogram);
                histogram
            },
        )
        .reduce(
            || OccupancyHistogram::new(n_buckets, n_states),
            |mut a, b| {
                a.merge(&b);
                a
            },
        )
}

/// Run a full titration sweep and reduce each point to steady-state occupancy.
///
/// All other species stay at `species_fixed`; the titrated species takes each
/// value of `titration` in turn. Points run concurrently, each with a seed
/// derived from `config.seed` and its index. The cancellation token is polled
/// before each point starts.
pub fn run_sweep(
    network: &ReactionNetwork,
    rates: &RateVector,
    species_fixed: &SpeciesConcentrations,
    titration: &TitrationAxis,
    config: &SimulationConfig,
    cancel: Option<&CancellationToken>,
) -> Result<SweepResult> {
    config.validate_for(network)?;
    titration.validate_for(network)?;
    let dense_rates = network.resolve_rates(rates)?;

    let steady_states = titration
        .values
        .par_iter()
        .enumerate()
        .map(|(point, &value)| {
            checkpoint(cancel)?;
            let mut species = species_fixed.clone();
            species.insert(titration.species.clone(), value);
            let concentrations = network.resolve_species(&species)?;
            let point_config = config.with_seed(stream_seed(config.seed, &[point as u64]));
            let histogram = simulate_point(network, &dense_rates, &concentrations, &point_config);
            histogram.steady_state(config.tail_window, config.n_molecules)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SweepResult {
        titration: titration.values.clone(),
        steady_states,
    })
}

/// Simulate one condition and keep the whole occupancy time course.
pub fn simulate_time_course(
    network: &ReactionNetwork,
    rates: &RateVector,
    species: &SpeciesConcentrations,
    config: &SimulationConfig,
) -> Result<TimeCourse> {
    config.validate_for(network)?;
    let dense_rates = network.resolve_rates(rates)?;
    let concentrations = network.resolve_species(species)?;

    let histogram = simulate_point(network, &dense_rates, &concentrations, config);
    let bucket_span = config.sample_interval as f64 * config.dt;
    let times = (1..=histogram.n_buckets())
        .map(|b| b as f64 * bucket_span)
        .collect();

    Ok(TimeCourse {
        times,
        fractions: histogram.fractions(config.n_molecules),
        steady_state: histogram.steady_state(config.tail_window, config.n_molecules)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::presets;

    fn two_state_rates(k01: f64, k10: f64) -> RateVector {
        let mut rates = RateVector::new();
        rates.insert("k01".to_string(), k01);
        rates.insert("k10".to_string(), k10);
        rates
    }

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            n_molecules: 2000,
            n_steps: 2000,
            dt: 0.01,
            sample_interval: 1,
            tail_window: 1000,
            seed: 42,
            initial_state: 0,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(small_config().validate().is_ok());
        assert!(SimulationConfig::default().validate().is_ok());

        let mut config = small_config();
        config.tail_window = 2000;
        assert!(matches!(config.validate(), Err(KineticsError::Config(_))));

        let mut config = small_config();
        config.n_molecules = 0;
        assert!(config.validate().is_err());

        let mut config = small_config();
        config.dt = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = small_config();
        config.sample_interval = 0;
        assert!(config.validate().is_err());

        let network = ReactionNetwork::from_spec(&presets::two_state()).unwrap();
        let mut config = small_config();
        config.initial_state = 2;
        assert!(config.validate_for(&network).is_err());
    }

    #[test]
    fn test_default_sampling_layout() {
        // 100001 steps sampled every 1000 gives 100 buckets
        assert_eq!(SimulationConfig::default().n_buckets(), 100);
    }

    #[test]
    fn test_stream_seed_is_stable_and_distinct() {
        assert_eq!(stream_seed(7, &[1, 2]), stream_seed(7, &[1, 2]));
        assert_ne!(stream_seed(7, &[1, 2]), stream_seed(7, &[2, 1]));
        assert_ne!(stream_seed(7, &[0]), stream_seed(8, &[0]));
        assert_ne!(stream_seed(7, &[0]), stream_seed(7, &[1]));
    }

    #[test]
    fn test_histogram_conservation() {
        let network = ReactionNetwork::from_spec(&presets::two_state()).unwrap();
        let config = SimulationConfig {
            n_molecules: 300,
            n_steps: 500,
            sample_interval: 10,
            tail_window: 20,
            ..small_config()
        };
        let histogram = simulate_point(&network, &[3.0, 1.0], &[], &config);
        assert_eq!(histogram.n_buckets(), 50);
        for bucket in 0..histogram.n_buckets() {
            assert_eq!(histogram.bucket_total(bucket), 300);
        }
        let ss = histogram
            .steady_state(config.tail_window, config.n_molecules)
            .unwrap();
        assert!((ss.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let network = ReactionNetwork::from_spec(&presets::two_state()).unwrap();
        let config = SimulationConfig {
            n_molecules: 200,
            n_steps: 300,
            tail_window: 100,
            ..small_config()
        };
        let a = simulate_point(&network, &[1.0, 1.0], &[], &config);
        let b = simulate_point(&network, &[1.0, 1.0], &[], &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_two_state_equal_rates() {
        let network = ReactionNetwork::from_spec(&presets::two_state()).unwrap();
        let histogram = simulate_point(&network, &[1.0, 1.0], &[], &small_config());
        let ss = histogram.steady_state(1000, 2000).unwrap();
        assert!((ss[0] - 0.5).abs() < 0.02, "{:?}", ss);
        assert!((ss[1] - 0.5).abs() < 0.02, "{:?}", ss);
    }

    #[test]
    fn test_two_state_biased_rates() {
        let network = ReactionNetwork::from_spec(&presets::two_state()).unwrap();
        let histogram = simulate_point(&network, &[2.0, 1.0], &[], &small_config());
        let ss = histogram.steady_state(1000, 2000).unwrap();
        assert!((ss[1] - 2.0 / 3.0).abs() < 0.02, "{:?}", ss);
        assert!((ss[0] - 1.0 / 3.0).abs() < 0.02, "{:?}", ss);
    }

    #[test]
    fn test_sweep_over_ligand() {
        // 0 -> 1 driven by ligand L, 1 -> 0 constant
        let spec = crate::network::TopologySpec {
            n_states: 2,
            state_labels: vec![],
            transitions: vec![
                crate::network::TransitionSpec::with_species(0, 1, "k_on", "L"),
                crate::network::TransitionSpec::new(1, 0, "k_off"),
            ],
        };
        let network = ReactionNetwork::from_spec(&spec).unwrap();
        let mut rates = RateVector::new();
        rates.insert("k_on".to_string(), 1.0);
        rates.insert("k_off".to_string(), 1.0);
        let titration = TitrationAxis::new("L", vec![0.0, 1.0, 3.0]);
        let config = SimulationConfig {
            n_molecules: 1000,
            n_steps: 1500,
            tail_window: 500,
            ..small_config()
        };

        let sweep = run_sweep(
            &network,
            &rates,
            &SpeciesConcentrations::new(),
            &titration,
            &config,
            None,
        )
        .unwrap();
        assert_eq!(sweep.steady_states.len(), 3);
        assert_eq!(sweep.steady_states[0][1], 0.0);
        assert!((sweep.steady_states[1][1] - 0.5).abs() < 0.03);
        assert!((sweep.steady_states[2][1] - 0.75).abs() < 0.03);
    }

    #[test]
    fn test_sweep_rejects_unknown_species_and_cancel() {
        let network = ReactionNetwork::from_spec(&presets::two_state()).unwrap();
        let rates = two_state_rates(1.0, 1.0);
        let titration = TitrationAxis::new("Ca", vec![1.0]);
        let result = run_sweep(
            &network,
            &rates,
            &SpeciesConcentrations::new(),
            &titration,
            &small_config(),
            None,
        );
        assert!(matches!(result, Err(KineticsError::Config(_))));

        let spec = crate::network::TopologySpec {
            n_states: 2,
            state_labels: vec![],
            transitions: vec![crate::network::TransitionSpec::with_species(0, 1, "k01", "Ca")],
        };
        let network = ReactionNetwork::from_spec(&spec).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = run_sweep(
            &network,
            &rates,
            &SpeciesConcentrations::new(),
            &titration,
            &small_config(),
            Some(&token),
        );
        assert_eq!(result, Err(KineticsError::Cancelled));
    }

    #[test]
    fn test_time_course() {
        let network = ReactionNetwork::from_spec(&presets::two_state()).unwrap();
        let config = SimulationConfig {
            n_molecules: 500,
            n_steps: 400,
            sample_interval: 20,
            tail_window: 5,
            ..small_config()
        };
        let course = simulate_time_course(
            &network,
            &two_state_rates(1.0, 1.0),
            &SpeciesConcentrations::new(),
            &config,
        )
        .unwrap();
        assert_eq!(course.times.len(), 20);
        assert!((course.times[0] - 0.2).abs() < 1e-12);
        assert_eq!(course.fractions.dim(), (20, 2));
        for row in course.fractions.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }
}
