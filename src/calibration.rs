//! Calibration problem: wires the ensemble simulator and residual evaluator
//! into a fitness oracle, and re-runs the best parameters for the final report.

use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::{KineticsError, Result};
use crate::network::{RateVector, ReactionNetwork, SpeciesConcentrations};
use crate::pso::{FitnessOracle, OptimizationResult, ParameterSpace, ParticleSwarm, PsoConfig};
use crate::report::{CalibratedCurve, CurvePoint, ProgressSink};
use crate::residual::{self, ExperimentalCurve, LinearObservable};
use crate::simulation::{
    run_sweep, simulate_time_course, stream_seed, SimulationConfig, SweepResult, TimeCourse,
    TitrationAxis,
};

fn default_weight() -> f64 {
    1.0
}

/// One titration experiment the model is fitted against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assay {
    pub name: String,
    pub titrated_species: String,
    pub observable: LinearObservable,
    pub curve: ExperimentalCurve,
    /// Weight of this assay's residual in the total fitness.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Species held at a different level than the shared conditions.
    #[serde(default)]
    pub species_overrides: SpeciesConcentrations,
}

impl Assay {
    pub fn titration_axis(&self) -> TitrationAxis {
        self.curve.titration_axis(&self.titrated_species)
    }

    /// Shared conditions with this assay's overrides applied.
    pub fn species(&self, shared: &SpeciesConcentrations) -> SpeciesConcentrations {
        let mut species = shared.clone();
        species.extend(
            self.species_overrides
                .iter()
                .map(|(k, v)| (k.clone(), *v)),
        );
        species
    }

    pub fn validate_for(&self, network: &ReactionNetwork) -> Result<()> {
        if !(self.weight.is_finite() && self.weight >= 0.0) {
            return Err(KineticsError::config(format!(
                "assay '{}' has invalid weight {}",
                self.name, self.weight
            )));
        }
        self.curve.validate()?;
        self.observable.validate_for(network.n_states())?;
        self.titration_axis().validate_for(network)
    }
}

/// Everything needed to score a candidate rate vector.
#[derive(Clone, Debug)]
pub struct CalibrationProblem {
    network: ReactionNetwork,
    base_rates: RateVector,
    species: SpeciesConcentrations,
    assays: Vec<Assay>,
    simulation: SimulationConfig,
    space: ParameterSpace,
    cancel: Option<CancellationToken>,
}

impl CalibrationProblem {
    /// Validate the whole problem up front so that the search itself can
    /// only fail through numeric degeneracy or cancellation.
    pub fn new(
        network: ReactionNetwork,
        base_rates: RateVector,
        species: SpeciesConcentrations,
        assays: Vec<Assay>,
        simulation: SimulationConfig,
        space: ParameterSpace,
    ) -> Result<Self> {
        simulation.validate_for(&network)?;
        if assays.is_empty() {
            return Err(KineticsError::config("calibration needs at least one assay"));
        }
        for assay in &assays {
            assay.validate_for(&network)?;
            let mut conditions = assay.species(&species);
            conditions.insert(assay.titrated_species.clone(), 0.0);
            network.resolve_species(&conditions)?;
        }
        for name in space.names() {
            if network.rate_id(name).is_none() {
                return Err(KineticsError::config(format!(
                    "free parameter '{}' is not a rate of the network",
                    name
                )));
            }
        }

        let problem = Self {
            network,
            base_rates,
            species,
            assays,
            simulation,
            space,
            cancel: None,
        };
        let probe: Vec<f64> = problem.space.bounds().iter().map(|b| b.lower).collect();
        problem.network.resolve_rates(&problem.rates_for(&probe))?;
        Ok(problem)
    }

    /// Poll `token` between titration points of every sweep.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn network(&self) -> &ReactionNetwork {
        &self.network
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn assays(&self) -> &[Assay] {
        &self.assays
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    pub fn species(&self) -> &SpeciesConcentrations {
        &self.species
    }

    /// Check that the shared conditions name every species of the network,
    /// as the final-run time course simulates exactly those conditions.
    pub fn validate_time_course(&self) -> Result<()> {
        self.network.resolve_species(&self.species).map_err(|e| {
            KineticsError::config(format!("time course conditions incomplete: {}", e))
        })?;
        Ok(())
    }

    /// Seed for assay `index` under evaluation seed `seed`, mixed with the
    /// configured simulation seed.
    fn assay_seed(&self, seed: u64, index: u64) -> u64 {
        stream_seed(seed, &[self.simulation.seed, index])
    }

    /// Base rates with a swarm position overlaid on the free parameters.
    pub fn rates_for(&self, position: &[f64]) -> RateVector {
        let mut rates = self.base_rates.clone();
        rates.extend(self.space.to_rates(position));
        rates
    }

    fn sweep(&self, assay: &Assay, rates: &RateVector, seed: u64) -> Result<SweepResult> {
        run_sweep(
            &self.network,
            rates,
            &assay.species(&self.species),
            &assay.titration_axis(),
            &self.simulation.with_seed(seed),
            self.cancel.as_ref(),
        )
    }

    /// Weighted sum of per-assay root-sum-of-squares residuals.
    pub fn total_residual(&self, rates: &RateVector, seed: u64) -> Result<f64> {
        let mut total = 0.0;
        for (i, assay) in self.assays.iter().enumerate() {
            let sweep = self.sweep(assay, rates, self.assay_seed(seed, i as u64))?;
            let r = residual::score(&sweep.steady_states, &assay.observable, &assay.curve)?;
            total += assay.weight * r;
        }
        Ok(total)
    }

    /// Run the swarm over this problem.
    pub fn optimize(
        &self,
        config: PsoConfig,
        sink: &mut dyn ProgressSink,
    ) -> Result<OptimizationResult> {
        log::info!(
            "optimizing {} rates over {} assays: {} particles x {} iterations",
            self.space.dimensions(),
            self.assays.len(),
            config.n_particles,
            config.n_iterations
        );
        let swarm = ParticleSwarm::new(self.space.clone(), config, self)?;
        swarm.run(sink, self.cancel.as_ref())
    }

    /// Re-simulate every assay with `rates` and emit the calibrated curves.
    ///
    /// With `record_time_course`, also simulates the shared conditions once
    /// and emits the occupancy time course and steady state.
    pub fn final_run(
        &self,
        rates: &RateVector,
        seed: u64,
        record_time_course: bool,
        sink: &mut dyn ProgressSink,
    ) -> Result<FinalRun> {
        if record_time_course {
            self.validate_time_course()?;
        }
        let mut curves = Vec::with_capacity(self.assays.len());
        let mut total = 0.0;
        for (i, assay) in self.assays.iter().enumerate() {
            let sweep = self.sweep(assay, rates, self.assay_seed(seed, i as u64))?;
            let simulated = residual::simulated_curve(&sweep.steady_states, &assay.observable)?;
            let r = residual::score(&sweep.steady_states, &assay.observable, &assay.curve)?;
            total += assay.weight * r;

            let points = assay
                .curve
                .points
                .iter()
                .zip(&simulated)
                .map(|(p, &s)| CurvePoint {
                    titrated_concentration: p.titrated_concentration,
                    simulated_normalized: s,
                    experimental_normalized: p.experimental_normalized_value,
                })
                .collect();
            let curve = CalibratedCurve {
                assay: assay.name.clone(),
                titrated_species: assay.titrated_species.clone(),
                points,
                residual: r,
            };
            sink.on_calibrated_curve(&curve);
            curves.push(curve);
        }

        let time_course = if record_time_course {
            let course = simulate_time_course(
                &self.network,
                rates,
                &self.species,
                &self.simulation.with_seed(self.assay_seed(seed, u64::MAX)),
            )?;
            sink.on_time_course(self.network.state_labels(), &course);
            Some(course)
        } else {
            None
        };

        Ok(FinalRun {
            rates: rates.clone(),
            residual: total,
            curves,
            time_course,
        })
    }
}

impl FitnessOracle for CalibrationProblem {
    fn evaluate(&self, position: &[f64], seed: u64) -> Result<f64> {
        self.total_residual(&self.rates_for(position), seed)
    }
}

/// Result of re-simulating the best parameters.
#[derive(Clone, Debug)]
pub struct FinalRun {
    pub rates: RateVector,
    /// Weighted total residual of this run.
    pub residual: f64,
    pub curves: Vec<CalibratedCurve>,
    pub time_course: Option<TimeCourse>,
}

/// Search result plus the final run at the global best.
#[derive(Clone, Debug)]
pub struct CalibrationOutcome {
    pub optimization: OptimizationResult,
    /// A failed final run does not discard the search result.
    pub final_run: Result<FinalRun>,
}

/// Optimize, then re-run the best parameters.
///
/// Every configuration check, including the time-course conditions when
/// `record_time_course` is set, runs before the first evaluation.
pub fn calibrate(
    problem: &CalibrationProblem,
    pso: PsoConfig,
    record_time_course: bool,
    sink: &mut dyn ProgressSink,
) -> Result<CalibrationOutcome> {
    pso.validate()?;
    if record_time_course {
        problem.validate_time_course()?;
    }
    let final_seed = stream_seed(pso.seed, &[u64::MAX]);
    let optimization = problem.optimize(pso, sink)?;
    let best = problem.rates_for(&optimization.best_position);
    let final_run = problem.final_run(&best, final_seed, record_time_course, sink);
    if let Err(e) = &final_run {
        log::warn!("final run at the best position failed: {}", e);
    }
    sink.finish();
    Ok(CalibrationOutcome {
        optimization,
        final_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{presets, TopologySpec, TransitionSpec};
    use crate::pso::ParameterBounds;
    use crate::report::HistorySink;
    use std::collections::BTreeMap;

    /// 0 <-> 1 with ligand-driven binding: bound fraction = L / (L + Kd), Kd = k_off / k_on.
    fn binding_network() -> ReactionNetwork {
        ReactionNetwork::from_spec(&TopologySpec {
            n_states: 2,
            state_labels: vec!["free".to_string(), "bound".to_string()],
            transitions: vec![
                TransitionSpec::with_species(0, 1, "k_on", "L"),
                TransitionSpec::new(1, 0, "k_off"),
            ],
        })
        .unwrap()
    }

    fn binding_assay() -> Assay {
        // Kd = 1: bound fraction L / (L + 1), normalized by the value at L = 4
        let ligand = [0.25, 0.5, 1.0, 2.0, 4.0];
        let top = 4.0 / 5.0;
        let values: Vec<f64> = ligand.iter().map(|l| l / (l + 1.0) / top).collect();
        Assay {
            name: "binding".to_string(),
            titrated_species: "L".to_string(),
            observable: LinearObservable::new(vec![(1, 1.0)]),
            curve: ExperimentalCurve::from_pairs(&ligand, &values),
            weight: 1.0,
            species_overrides: SpeciesConcentrations::new(),
        }
    }

    fn small_simulation() -> SimulationConfig {
        SimulationConfig {
            n_molecules: 300,
            n_steps: 900,
            dt: 0.02,
            sample_interval: 1,
            tail_window: 300,
            seed: 1,
            initial_state: 0,
        }
    }

    fn problem_with_seed(simulation_seed: u64) -> CalibrationProblem {
        let mut rates = RateVector::new();
        rates.insert("k_off".to_string(), 1.0);
        let mut bounds = BTreeMap::new();
        bounds.insert("k_on".to_string(), ParameterBounds::new(0.1, 10.0));
        CalibrationProblem::new(
            binding_network(),
            rates,
            SpeciesConcentrations::new(),
            vec![binding_assay()],
            small_simulation().with_seed(simulation_seed),
            ParameterSpace::from_bounds(&bounds).unwrap(),
        )
        .unwrap()
    }

    fn problem() -> CalibrationProblem {
        problem_with_seed(1)
    }

    #[test]
    fn test_true_rate_scores_better() {
        let problem = problem();
        let good = problem.evaluate(&[1.0], 3).unwrap();
        let bad = problem.evaluate(&[8.0], 3).unwrap();
        assert!(good < bad, "good {} bad {}", good, bad);
        assert!(good < 0.1, "good {}", good);
    }

    #[test]
    fn test_rates_for_overlays_free_parameters() {
        let problem = problem();
        let rates = problem.rates_for(&[2.5]);
        assert_eq!(rates["k_on"], 2.5);
        assert_eq!(rates["k_off"], 1.0);
    }

    #[test]
    fn test_negative_rate_is_degenerate_not_fatal() {
        // With k_on < 0 nothing ever binds, the curve maximum is zero
        let problem = problem();
        let err = problem.evaluate(&[-3.0], 0).unwrap_err();
        assert!(err.is_degenerate());
    }

    #[test]
    fn test_construction_failures() {
        let mut bounds = BTreeMap::new();
        bounds.insert("k_missing".to_string(), ParameterBounds::new(0.1, 10.0));
        let result = CalibrationProblem::new(
            binding_network(),
            RateVector::new(),
            SpeciesConcentrations::new(),
            vec![binding_assay()],
            small_simulation(),
            ParameterSpace::from_bounds(&bounds).unwrap(),
        );
        assert!(matches!(result, Err(KineticsError::Config(_))));

        // k_off is neither free nor fixed
        let mut bounds = BTreeMap::new();
        bounds.insert("k_on".to_string(), ParameterBounds::new(0.1, 10.0));
        let result = CalibrationProblem::new(
            binding_network(),
            RateVector::new(),
            SpeciesConcentrations::new(),
            vec![binding_assay()],
            small_simulation(),
            ParameterSpace::from_bounds(&bounds).unwrap(),
        );
        assert!(matches!(result, Err(KineticsError::Config(_))));

        let mut assay = binding_assay();
        assay.observable = LinearObservable::new(vec![(5, 1.0)]);
        let mut rates = RateVector::new();
        rates.insert("k_off".to_string(), 1.0);
        let result = CalibrationProblem::new(
            binding_network(),
            rates,
            SpeciesConcentrations::new(),
            vec![assay],
            small_simulation(),
            ParameterSpace::from_bounds(&bounds).unwrap(),
        );
        assert!(matches!(result, Err(KineticsError::Config(_))));
    }

    #[test]
    fn test_calibrate_recovers_binding_rate() {
        let problem = problem();
        let pso = PsoConfig {
            n_particles: 8,
            n_iterations: 6,
            seed: 21,
            ..PsoConfig::default()
        };
        let mut sink = HistorySink::default();
        let outcome = calibrate(&problem, pso, false, &mut sink).unwrap();

        let k_on = outcome.optimization.best_rates()["k_on"];
        assert!(k_on > 0.4 && k_on < 2.5, "k_on = {}", k_on);
        let final_run = outcome.final_run.unwrap();
        assert_eq!(final_run.curves.len(), 1);
        assert_eq!(final_run.curves[0].points.len(), 5);
        assert_eq!(sink.curves.len(), 1);
        assert_eq!(sink.time_courses, 0);
        assert!(final_run.time_course.is_none());
    }

    #[test]
    fn test_incomplete_time_course_conditions_fail_before_search() {
        // The shared conditions leave out L, which only the assay titrates
        let problem = problem();
        assert!(matches!(
            problem.validate_time_course(),
            Err(KineticsError::Config(_))
        ));

        let pso = PsoConfig {
            n_particles: 4,
            n_iterations: 2,
            ..PsoConfig::default()
        };
        let mut sink = HistorySink::default();
        let result = calibrate(&problem, pso.clone(), true, &mut sink);
        assert!(matches!(result, Err(KineticsError::Config(_))));
        assert!(sink.particles.is_empty());
        assert!(sink.iterations.is_empty());

        let mut sink = HistorySink::default();
        let result = problem.final_run(&problem.rates_for(&[1.0]), 0, true, &mut sink);
        assert!(matches!(result, Err(KineticsError::Config(_))));
        assert!(sink.curves.is_empty());

        // Without the time course the same problem runs to completion
        let outcome = calibrate(&problem, pso, false, &mut HistorySink::default()).unwrap();
        assert!(outcome.final_run.is_ok());
    }

    #[test]
    fn test_failed_final_run_keeps_search_result() {
        let problem = problem();
        let token = CancellationToken::new();
        let cancelling = problem.clone().with_cancellation(token.clone());

        // Cancel once the search is done, so only the final run sees it
        struct CancelAfterSearch {
            token: CancellationToken,
            rounds: usize,
        }
        impl ProgressSink for CancelAfterSearch {
            fn on_iteration(&mut self, record: &crate::report::IterationRecord) {
                if record.iteration == self.rounds {
                    self.token.cancel();
                }
            }
        }

        let pso = PsoConfig {
            n_particles: 4,
            n_iterations: 2,
            ..PsoConfig::default()
        };
        let mut sink = CancelAfterSearch { token, rounds: 2 };
        let outcome = calibrate(&cancelling, pso, false, &mut sink).unwrap();
        assert_eq!(outcome.optimization.history.len(), 3);
        assert!(outcome.optimization.best_fitness.is_finite());
        assert_eq!(outcome.final_run.unwrap_err(), KineticsError::Cancelled);
    }

    #[test]
    fn test_simulation_seed_changes_evaluations() {
        let a = problem_with_seed(1).evaluate(&[1.5], 7).unwrap();
        let again = problem_with_seed(1).evaluate(&[1.5], 7).unwrap();
        let b = problem_with_seed(2).evaluate(&[1.5], 7).unwrap();
        assert_eq!(a, again);
        assert_ne!(a, b);
    }

    #[test]
    fn test_final_run_with_time_course() {
        let mut species = SpeciesConcentrations::new();
        species.insert("L".to_string(), 1.0);
        let mut rates = RateVector::new();
        rates.insert("k_off".to_string(), 1.0);
        let mut bounds = BTreeMap::new();
        bounds.insert("k_on".to_string(), ParameterBounds::new(0.1, 10.0));
        let problem = CalibrationProblem::new(
            binding_network(),
            rates,
            species,
            vec![binding_assay()],
            small_simulation(),
            ParameterSpace::from_bounds(&bounds).unwrap(),
        )
        .unwrap();

        let mut sink = HistorySink::default();
        let run = problem
            .final_run(&problem.rates_for(&[1.0]), 5, true, &mut sink)
            .unwrap();
        let course = run.time_course.unwrap();
        assert!((course.steady_state[1] - 0.5).abs() < 0.05);
        assert_eq!(sink.time_courses, 1);
    }

    #[test]
    fn test_serca_problem_builds() {
        let network = ReactionNetwork::from_spec(&presets::serca_inesi()).unwrap();
        let bounds: BTreeMap<String, ParameterBounds> = presets::inesi_free_rate_bounds()
            .into_iter()
            .map(|(name, lo, hi)| (name.to_string(), ParameterBounds::new(lo, hi)))
            .collect();
        let assay = Assay {
            name: "calcium".to_string(),
            titrated_species: presets::CA_CYT.to_string(),
            observable: presets::bound_calcium(),
            curve: presets::calcium_binding_curve(),
            weight: 1.0,
            species_overrides: SpeciesConcentrations::new(),
        };
        let problem = CalibrationProblem::new(
            network,
            presets::inesi_rates(),
            presets::inesi_species(),
            vec![assay],
            SimulationConfig::default(),
            ParameterSpace::from_bounds(&bounds).unwrap(),
        )
        .unwrap();
        assert_eq!(problem.space().dimensions(), 4);
        assert_eq!(problem.rates_for(&[1.0, 2.0, 3.0, 4.0])["k_S0_S1"], 1.0);
    }
}
