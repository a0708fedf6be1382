//! Fixed time-step transition engine.
//!
//! Each outgoing edge of the current state contributes a single-precision
//! probability `rate * (concentration or 1) * dt`. One uniform draw is tested
//! against the running cumulative sum in edge order:
//! - the first edge with `u < cumulative` fires;
//! - if `u` clears every threshold the molecule stays put;
//! - probabilities are never renormalized, so mass beyond 1 is unreachable.
//!
//! A negative probability lowers the running sum below the previous
//! threshold, so its edge can never fire.

use rand::Rng;

use super::model::{ReactionNetwork, StateId, Transition};

/// Single-precision step probability of one edge.
#[inline]
pub fn edge_probability(
    transition: &Transition,
    rates: &[f64],
    concentrations: &[f64],
    dt: f64,
) -> f32 {
    let multiplier = transition.species.map_or(1.0, |s| concentrations[s]);
    (rates[transition.rate] * multiplier * dt) as f32
}

/// Pick a destination for draw `u` from `(destination, probability)` pairs.
///
/// Returns `current` when the list is empty or `u` exceeds the final
/// cumulative probability.
#[inline]
pub fn select_transition<I>(u: f32, edges: I, current: StateId) -> StateId
where
    I: IntoIterator<Item = (StateId, f32)>,
{
    let mut cumulative = 0.0f32;
    for (to, p) in edges {
        cumulative += p;
        if u < cumulative {
            return to;
        }
    }
    current
}

/// Advance one molecule by one time step.
///
/// `rates` and `concentrations` are the dense vectors returned by
/// [`ReactionNetwork::resolve_rates`] and [`ReactionNetwork::resolve_species`].
/// Absorbing states return immediately without consuming a draw.
pub fn step<R: Rng + ?Sized>(
    network: &ReactionNetwork,
    current: StateId,
    rates: &[f64],
    concentrations: &[f64],
    dt: f64,
    rng: &mut R,
) -> StateId {
    let edges = network.outgoing(current);
    if edges.is_empty() {
        return current;
    }
    let u: f32 = rng.gen();
    select_transition(
        u,
        edges
            .iter()
            .map(|t| (t.to, edge_probability(t, rates, concentrations, dt))),
        current,
    )
}

/// Per-state edge probabilities precomputed for one (rates, concentrations, dt).
///
/// Used by the ensemble loop so the probabilities are evaluated once per
/// titration point instead of once per molecule step. Stepping through a table
/// is draw-for-draw identical to [`step`].
#[derive(Clone, Debug)]
pub struct StepTable {
    edges: Vec<Vec<(StateId, f32)>>,
}

impl StepTable {
    pub fn new(network: &ReactionNetwork, rates: &[f64], concentrations: &[f64], dt: f64) -> Self {
        let edges = (0..network.n_states())
            .map(|state| {
                network
                    .outgoing(state)
                    .iter()
                    .map(|t| (t.to, edge_probability(t, rates, concentrations, dt)))
                    .collect()
            })
            .collect();
        Self { edges }
    }

    pub fn n_states(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn step<R: Rng + ?Sized>(&self, current: StateId, rng: &mut R) -> StateId {
        let edges = &self.edges[current];
        if edges.is_empty() {
            return current;
        }
        let u: f32 = rng.gen();
        select_transition(u, edges.iter().copied(), current)
    }

    /// Total outgoing probability per state.
    pub fn outflow(&self) -> Vec<f32> {
        self.edges
            .iter()
            .map(|edges| edges.iter().map(|&(_, p)| p).sum())
            .collect()
    }

    /// States whose outgoing probabilities sum to 1 or more, i.e. where some
    /// edges are partly or wholly unreachable.
    pub fn saturated_states(&self) -> Vec<StateId> {
        self.outflow()
            .into_iter()
            .enumerate()
            .filter(|&(_, total)| total >= 1.0)
            .map(|(state, _)| state)
            .collect()
    }
}
