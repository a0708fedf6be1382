//! Reaction network: discrete conformational states joined by rate-labelled edges.
//!
//! A network is built once from a [`TopologySpec`] and then shared read-only by
//! every simulated molecule. Rate constants and ligand species are referred to
//! by name in the topology and interned to dense indices here, so the hot loop only
//! ever touches slices.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{KineticsError, Result};

/// Positional state index `0..n_states`.
pub type StateId = usize;
/// Dense index of a rate constant within one network.
pub type RateId = usize;
/// Dense index of a ligand species within one network.
pub type SpeciesId = usize;

/// Named rate constants, the quantity being optimized.
pub type RateVector = BTreeMap<String, f64>;
/// Named ligand concentrations for one titration point.
pub type SpeciesConcentrations = BTreeMap<String, f64>;

/// One directed edge of the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
    pub rate: RateId,
    /// Species whose concentration multiplies the rate (pseudo-first-order edge).
    pub species: Option<SpeciesId>,
}

/// Serializable edge description with names instead of indices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub from: StateId,
    pub to: StateId,
    pub rate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
}

impl TransitionSpec {
    pub fn new(from: StateId, to: StateId, rate: &str) -> Self {
        Self {
            from,
            to,
            rate: rate.to_string(),
            species: None,
        }
    }

    /// Edge whose rate is scaled by the concentration of `species`.
    pub fn with_species(from: StateId, to: StateId, rate: &str, species: &str) -> Self {
        Self {
            from,
            to,
            rate: rate.to_string(),
            species: Some(species.to_string()),
        }
    }
}

/// Topology description: state count, optional labels and an ordered edge list.
///
/// Edge order matters. Outgoing edges of a state are tested in the order they
/// appear here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    pub n_states: usize,
    #[serde(default)]
    pub state_labels: Vec<String>,
    pub transitions: Vec<TransitionSpec>,
}

/// Immutable, validated reaction network.
#[derive(Clone, Debug)]
pub struct ReactionNetwork {
    outgoing: Vec<Vec<Transition>>,
    state_labels: Vec<String>,
    rate_names: Vec<String>,
    species_names: Vec<String>,
    rate_index: HashMap<String, RateId>,
    species_index: HashMap<String, SpeciesId>,
}

impl ReactionNetwork {
    /// Build a network, failing on an empty state set, dangling state
    /// references or a label list of the wrong length.
    pub fn from_spec(spec: &TopologySpec) -> Result<Self> {
        if spec.n_states == 0 {
            return Err(KineticsError::config("topology has no states"));
        }

        let state_labels = if spec.state_labels.is_empty() {
            (0..spec.n_states).map(|i| format!("S{}", i)).collect()
        } else if spec.state_labels.len() == spec.n_states {
            spec.state_labels.clone()
        } else {
            return Err(KineticsError::config(format!(
                "topology declares {} states but {} labels",
                spec.n_states,
                spec.state_labels.len()
            )));
        };

        let mut outgoing: Vec<Vec<Transition>> = vec![Vec::new(); spec.n_states];
        let mut rate_names = Vec::new();
        let mut species_names = Vec::new();
        let mut rate_index: HashMap<String, RateId> = HashMap::new();
        let mut species_index: HashMap<String, SpeciesId> = HashMap::new();

        for (i, edge) in spec.transitions.iter().enumerate() {
            if edge.from >= spec.n_states || edge.to >= spec.n_states {
                return Err(KineticsError::config(format!(
                    "transition {} ({} -> {}, rate {}) references a state outside 0..{}",
                    i, edge.from, edge.to, edge.rate, spec.n_states
                )));
            }
            if edge.rate.is_empty() {
                return Err(KineticsError::config(format!(
                    "transition {} ({} -> {}) has an empty rate name",
                    i, edge.from, edge.to
                )));
            }

            let rate = intern(&edge.rate, &mut rate_names, &mut rate_index);
            let species = edge
                .species
                .as_ref()
                .map(|name| intern(name, &mut species_names, &mut species_index));

            outgoing[edge.from].push(Transition {
                from: edge.from,
                to: edge.to,
                rate,
                species,
            });
        }

        Ok(Self {
            outgoing,
            state_labels,
            rate_names,
            species_names,
            rate_index,
            species_index,
        })
    }

    pub fn n_states(&self) -> usize {
        self.outgoing.len()
    }

    /// Ordered outgoing edges of `state` (empty for absorbing states).
    pub fn outgoing(&self, state: StateId) -> &[Transition] {
        &self.outgoing[state]
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.outgoing.iter().flatten()
    }

    pub fn state_labels(&self) -> &[String] {
        &self.state_labels
    }

    pub fn state_index(&self, label: &str) -> Option<StateId> {
        self.state_labels.iter().position(|l| l == label)
    }

    /// Rate names in first-use order.
    pub fn rate_names(&self) -> &[String] {
        &self.rate_names
    }

    /// Species names in first-use order.
    pub fn species_names(&self) -> &[String] {
        &self.species_names
    }

    pub fn rate_id(&self, name: &str) -> Option<RateId> {
        self.rate_index.get(name).copied()
    }

    pub fn species_id(&self, name: &str) -> Option<SpeciesId> {
        self.species_index.get(name).copied()
    }

    /// Resolve named rates into a dense vector indexed by [`RateId`].
    ///
    /// A rate the network uses but `rates` lacks is a configuration error.
    /// A non-finite value is a numeric degeneracy. Extra names are ignored.
    pub fn resolve_rates(&self, rates: &RateVector) -> Result<Vec<f64>> {
        resolve(&self.rate_names, rates, "rate constant")
    }

    /// Resolve named concentrations into a dense vector indexed by [`SpeciesId`].
    pub fn resolve_species(&self, concentrations: &SpeciesConcentrations) -> Result<Vec<f64>> {
        resolve(&self.species_names, concentrations, "species concentration")
    }
}

fn intern(name: &str, names: &mut Vec<String>, index: &mut HashMap<String, usize>) -> usize {
    if let Some(&id) = index.get(name) {
        return id;
    }
    let id = names.len();
    names.push(name.to_string());
    index.insert(name.to_string(), id);
    id
}

fn resolve(names: &[String], values: &BTreeMap<String, f64>, what: &str) -> Result<Vec<f64>> {
    names
        .iter()
        .map(|name| match values.get(name) {
            None => Err(KineticsError::config(format!("missing {} '{}'", what, name))),
            Some(v) if !v.is_finite() => Err(KineticsError::degenerate(format!(
                "{} '{}' is {}",
                what, name, v
            ))),
            Some(&v) => Ok(v),
        })
        .collect()
}
