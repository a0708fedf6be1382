//! Residual evaluator: steady-state occupancy to one scalar cost.
//!
//! Per titration point an observable collapses the state occupancy to one
//! value (for example bound calcium). The resulting curve is normalized by its
//! own maximum and compared with the experimental curve as a root sum of
//! squares. It is not a mean, so the cost grows with the number of points.

use serde::{Deserialize, Serialize};

use crate::error::{KineticsError, Result};
use crate::network::StateId;
use crate::simulation::TitrationAxis;

/// Collapses one steady-state occupancy vector to a scalar.
pub trait OccupancyObservable: Send + Sync {
    fn evaluate(&self, occupancy: &[f64]) -> f64;
}

impl<F> OccupancyObservable for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn evaluate(&self, occupancy: &[f64]) -> f64 {
        self(occupancy)
    }
}

/// Weighted sum over selected states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearObservable {
    pub terms: Vec<(StateId, f64)>,
}

impl LinearObservable {
    pub fn new(terms: Vec<(StateId, f64)>) -> Self {
        Self { terms }
    }

    pub fn value(&self, occupancy: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(state, weight)| weight * occupancy[state])
            .sum()
    }

    pub fn validate_for(&self, n_states: usize) -> Result<()> {
        if self.terms.is_empty() {
            return Err(KineticsError::config("observable has no terms"));
        }
        if let Some(&(state, _)) = self.terms.iter().find(|(s, _)| *s >= n_states) {
            return Err(KineticsError::config(format!(
                "observable references state {} outside 0..{}",
                state, n_states
            )));
        }
        if let Some(&(_, w)) = self.terms.iter().find(|(_, w)| !w.is_finite()) {
            return Err(KineticsError::config(format!("observable weight {} is not finite", w)));
        }
        Ok(())
    }
}

impl OccupancyObservable for LinearObservable {
    fn evaluate(&self, occupancy: &[f64]) -> f64 {
        self.value(occupancy)
    }
}

/// One point of a reference curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub titrated_concentration: f64,
    pub experimental_normalized_value: f64,
}

/// Experimental reference curve in titration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalCurve {
    pub points: Vec<SweepPoint>,
}

impl ExperimentalCurve {
    pub fn new(points: Vec<SweepPoint>) -> Self {
        Self { points }
    }

    /// Zip concentrations with normalized measurements; extra entries of the
    /// longer slice are dropped.
    pub fn from_pairs(concentrations: &[f64], values: &[f64]) -> Self {
        Self {
            points: concentrations
                .iter()
                .zip(values)
                .map(|(&c, &v)| SweepPoint {
                    titrated_concentration: c,
                    experimental_normalized_value: v,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn concentrations(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.titrated_concentration).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points
            .iter()
            .map(|p| p.experimental_normalized_value)
            .collect()
    }

    /// Titration axis that visits this curve's concentrations.
    pub fn titration_axis(&self, species: &str) -> TitrationAxis {
        TitrationAxis::new(species, self.concentrations())
    }

    pub fn validate(&self) -> Result<()> {
        if self.points.is_empty() {
            return Err(KineticsError::config("experimental curve is empty"));
        }
        let finite = self.points.iter().all(|p| {
            p.titrated_concentration.is_finite() && p.experimental_normalized_value.is_finite()
        });
        if !finite {
            return Err(KineticsError::config(
                "experimental curve contains non-finite values",
            ));
        }
        Ok(())
    }
}

/// Divide a curve by its maximum.
///
/// A non-positive or non-finite maximum cannot be normalized and is reported
/// as a numeric degeneracy.
pub fn normalize_by_max(values: &[f64]) -> Result<Vec<f64>> {
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(KineticsError::degenerate(format!(
            "observable value {} is not finite",
            bad
        )));
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= 0.0 || !max.is_finite() {
        return Err(KineticsError::degenerate(format!(
            "cannot normalize curve with maximum {}",
            max
        )));
    }
    Ok(values.iter().map(|v| v / max).collect())
}

/// `sqrt(sum((a_i - b_i)^2))` over paired entries.
pub fn root_sum_squares(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Observable per titration point, normalized by the curve maximum.
pub fn simulated_curve(
    occupancy_by_point: &[Vec<f64>],
    observable: &dyn OccupancyObservable,
) -> Result<Vec<f64>> {
    let raw: Vec<f64> = occupancy_by_point
        .iter()
        .map(|occupancy| observable.evaluate(occupancy))
        .collect();
    normalize_by_max(&raw)
}

/// Root-sum-of-squares residual between simulation and experiment.
///
/// # Arguments
/// * `occupancy_by_point` - Steady-state occupancy per titration point
/// * `observable` - Reduction of one occupancy vector to a scalar
/// * `curve` - Experimental reference, one point per titration point
///
/// # Returns
/// * The residual, or `NumericDegeneracy` if the simulated curve cannot be
///   normalized or the residual is not finite
pub fn score(
    occupancy_by_point: &[Vec<f64>],
    observable: &dyn OccupancyObservable,
    curve: &ExperimentalCurve,
) -> Result<f64> {
    if occupancy_by_point.len() != curve.len() {
        return Err(KineticsError::config(format!(
            "{} simulated points for a {}-point experimental curve",
            occupancy_by_point.len(),
            curve.len()
        )));
    }
    let simulated = simulated_curve(occupancy_by_point, observable)?;
    let residual = root_sum_squares(&curve.values(), &simulated);
    if !residual.is_finite() {
        return Err(KineticsError::degenerate(format!("residual is {}", residual)));
    }
    Ok(residual)
}
