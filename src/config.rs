//! Fit configuration loaded from JSON.
//!
//! Topologies and observables can be given inline or by preset name.
//! [`FitConfig::build_problem`] performs every fail-fast check before any
//! simulation work starts.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::{Assay, CalibrationProblem};
use crate::error::{KineticsError, Result};
use crate::network::{presets, RateVector, ReactionNetwork, SpeciesConcentrations, TopologySpec};
use crate::pso::{ParameterBounds, ParameterSpace, PsoConfig};
use crate::residual::{ExperimentalCurve, LinearObservable};
use crate::simulation::SimulationConfig;

/// Topology by preset name or inline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopologyChoice {
    Preset(String),
    Inline(TopologySpec),
}

impl TopologyChoice {
    pub fn resolve(&self) -> Result<TopologySpec> {
        match self {
            TopologyChoice::Preset(name) => presets::topology(name).ok_or_else(|| {
                KineticsError::config(format!(
                    "unknown topology preset '{}' (expected one of {:?})",
                    name,
                    presets::PRESET_NAMES
                ))
            }),
            TopologyChoice::Inline(spec) => Ok(spec.clone()),
        }
    }
}

/// Observable by preset name or inline weighted terms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservableChoice {
    Preset(String),
    Inline(LinearObservable),
}

impl ObservableChoice {
    pub fn resolve(&self) -> Result<LinearObservable> {
        match self {
            ObservableChoice::Preset(name) => presets::observable(name).ok_or_else(|| {
                KineticsError::config(format!("unknown observable preset '{}'", name))
            }),
            ObservableChoice::Inline(observable) => Ok(observable.clone()),
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssayConfig {
    pub name: String,
    pub titrated_species: String,
    pub observable: ObservableChoice,
    pub curve: ExperimentalCurve,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub species_overrides: SpeciesConcentrations,
}

impl AssayConfig {
    pub fn resolve(&self) -> Result<Assay> {
        Ok(Assay {
            name: self.name.clone(),
            titrated_species: self.titrated_species.clone(),
            observable: self.observable.resolve()?,
            curve: self.curve.clone(),
            weight: self.weight,
            species_overrides: self.species_overrides.clone(),
        })
    }
}

/// Final run after the search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalRunConfig {
    /// Also record the occupancy time course at the shared conditions.
    #[serde(default = "default_true")]
    pub record_time_course: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FinalRunConfig {
    fn default() -> Self {
        Self {
            record_time_course: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub topology: TopologyChoice,
    /// Fixed rate constants; free parameters override these.
    pub rates: RateVector,
    /// Shared ligand concentrations; each assay titrates one of them.
    pub species: SpeciesConcentrations,
    pub free_parameters: BTreeMap<String, ParameterBounds>,
    pub assays: Vec<AssayConfig>,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub pso: PsoConfig,
    #[serde(default)]
    pub final_run: FinalRunConfig,
}

impl FitConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| KineticsError::config(format!("invalid fit configuration: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KineticsError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&contents)?;
        log::info!("loaded fit configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| KineticsError::config(format!("cannot serialize configuration: {}", e)))
    }

    /// The published SERCA calcium-binding fit: 13-state Inesi cycle, four
    /// free rates, 100 particles for 100 iterations.
    pub fn serca_default() -> Self {
        Self {
            topology: TopologyChoice::Preset("serca_inesi".to_string()),
            rates: presets::inesi_rates(),
            species: presets::inesi_species(),
            free_parameters: presets::inesi_free_rate_bounds()
                .into_iter()
                .map(|(name, lo, hi)| (name.to_string(), ParameterBounds::new(lo, hi)))
                .collect(),
            assays: vec![Self::calcium_assay()],
            simulation: SimulationConfig::default(),
            pso: PsoConfig::default(),
            final_run: FinalRunConfig::default(),
        }
    }

    /// Bound calcium against cytosolic calcium.
    pub fn calcium_assay() -> AssayConfig {
        AssayConfig {
            name: "calcium_binding".to_string(),
            titrated_species: presets::CA_CYT.to_string(),
            observable: ObservableChoice::Preset("bound_calcium".to_string()),
            curve: presets::calcium_binding_curve(),
            weight: 1.0,
            species_overrides: SpeciesConcentrations::new(),
        }
    }

    /// Phosphoenzyme against inorganic phosphate.
    pub fn phosphorylation_assay() -> AssayConfig {
        AssayConfig {
            name: "phosphorylation".to_string(),
            titrated_species: presets::PI.to_string(),
            observable: ObservableChoice::Preset("phosphorylated".to_string()),
            curve: presets::phosphorylation_curve(),
            weight: 1.0,
            species_overrides: SpeciesConcentrations::new(),
        }
    }

    pub fn network(&self) -> Result<ReactionNetwork> {
        ReactionNetwork::from_spec(&self.topology.resolve()?)
    }

    /// Checks that need no network.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        self.pso.validate()?;
        if let Some((name, v)) = self.rates.iter().find(|(_, v)| !v.is_finite()) {
            return Err(KineticsError::config(format!("rate '{}' is {}", name, v)));
        }
        if let Some((name, v)) = self
            .species
            .iter()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(KineticsError::config(format!(
                "species '{}' has invalid concentration {}",
                name, v
            )));
        }
        Ok(())
    }

    /// Validate everything and assemble the calibration problem.
    pub fn build_problem(&self) -> Result<CalibrationProblem> {
        self.validate()?;
        let network = self.network()?;
        let assays = self
            .assays
            .iter()
            .map(AssayConfig::resolve)
            .collect::<Result<Vec<_>>>()?;
        let problem = CalibrationProblem::new(
            network,
            self.rates.clone(),
            self.species.clone(),
            assays,
            self.simulation.clone(),
            ParameterSpace::from_bounds(&self.free_parameters)?,
        )?;
        if self.final_run.record_time_course {
            problem.validate_time_course()?;
        }
        Ok(problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serca_default_builds() {
        let config = FitConfig::serca_default();
        let problem = config.build_problem().unwrap();
        assert_eq!(problem.network().n_states(), 13);
        assert_eq!(
            problem.space().names(),
            &["k_S0_S1", "k_S2_S3", "k_S7_S8", "k_S9_S10"]
        );
        assert_eq!(config.pso.n_particles, 100);
        assert_eq!(config.simulation.n_steps, 100_001);
    }

    #[test]
    fn test_json_round_trip_keeps_presets() {
        let mut config = FitConfig::serca_default();
        config.assays.push(FitConfig::phosphorylation_assay());
        let json = config.to_json().unwrap();
        assert!(json.contains("\"topology\": \"serca_inesi\""));
        let parsed = FitConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.build_problem().unwrap().assays().len(), 2);
    }

    fn inline_config() -> FitConfig {
        let json = r#"{
            "topology": {
                "n_states": 2,
                "transitions": [
                    {"from": 0, "to": 1, "rate": "k_on", "species": "L"},
                    {"from": 1, "to": 0, "rate": "k_off"}
                ]
            },
            "rates": {"k_off": 1.0},
            "species": {},
            "free_parameters": {"k_on": {"lower": 0.1, "upper": 10.0}},
            "assays": [{
                "name": "binding",
                "titrated_species": "L",
                "observable": {"terms": [[1, 1.0]]},
                "curve": {"points": [
                    {"titrated_concentration": 1.0, "experimental_normalized_value": 0.5},
                    {"titrated_concentration": 4.0, "experimental_normalized_value": 1.0}
                ]}
            }],
            "simulation": {
                "n_molecules": 100, "n_steps": 100, "dt": 0.01,
                "sample_interval": 1, "tail_window": 50
            },
            "pso": {
                "n_particles": 4, "n_iterations": 2,
                "w_max": 1.0, "w_min": 0.3, "c1": 1.05, "c2": 1.05,
                "bound_handling": "clamp"
            }
        }"#;
        FitConfig::from_json(json).unwrap()
    }

    #[test]
    fn test_inline_topology_and_defaults() {
        let mut config = inline_config();
        assert!(config.final_run.record_time_course);
        assert_eq!(config.assays[0].weight, 1.0);
        assert_eq!(config.pso.bound_handling, crate::pso::BoundHandling::Clamp);
        config.species.insert("L".to_string(), 1.0);
        let problem = config.build_problem().unwrap();
        assert_eq!(problem.network().n_states(), 2);
    }

    #[test]
    fn test_time_course_conditions_checked_up_front() {
        // L is only set by the titration, so the time course has no value for it
        let mut config = inline_config();
        assert!(matches!(config.build_problem(), Err(KineticsError::Config(_))));

        config.final_run.record_time_course = false;
        assert!(config.build_problem().is_ok());

        config.final_run.record_time_course = true;
        config.species.insert("L".to_string(), 0.5);
        assert!(config.build_problem().is_ok());
    }

    #[test]
    fn test_fail_fast() {
        let mut config = FitConfig::serca_default();
        config.topology = TopologyChoice::Preset("twelve_state".to_string());
        assert!(matches!(config.build_problem(), Err(KineticsError::Config(_))));

        let mut config = FitConfig::serca_default();
        config.simulation.tail_window = 100;
        assert!(matches!(config.build_problem(), Err(KineticsError::Config(_))));

        let mut config = FitConfig::serca_default();
        config.assays[0].observable = ObservableChoice::Preset("unknown".to_string());
        assert!(config.build_problem().is_err());

        let mut config = FitConfig::serca_default();
        config.rates.remove("k_S1_S0");
        assert!(config.build_problem().is_err());

        assert!(FitConfig::from_json("{ not json").is_err());
    }
}
