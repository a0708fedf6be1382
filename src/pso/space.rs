//! Search space of the free rate constants.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{KineticsError, Result};
use crate::network::RateVector;

/// Initialization range of one free parameter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub lower: f64,
    pub upper: f64,
}

impl ParameterBounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Named dimensions with their bounds, in a fixed order.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSpace {
    names: Vec<String>,
    bounds: Vec<ParameterBounds>,
}

impl ParameterSpace {
    /// Build from named bounds; dimensions are ordered by name.
    pub fn from_bounds(bounds: &BTreeMap<String, ParameterBounds>) -> Result<Self> {
        if bounds.is_empty() {
            return Err(KineticsError::config("no free parameters to optimize"));
        }
        for (name, b) in bounds {
            if !(b.lower.is_finite() && b.upper.is_finite()) || b.lower > b.upper {
                return Err(KineticsError::config(format!(
                    "invalid bounds for '{}': [{}, {}]",
                    name, b.lower, b.upper
                )));
            }
        }
        Ok(Self {
            names: bounds.keys().cloned().collect(),
            bounds: bounds.values().copied().collect(),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn bounds(&self) -> &[ParameterBounds] {
        &self.bounds
    }

    /// Uniform draw in `[lower, upper]` per dimension.
    pub fn sample_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|b| b.lower + b.width() * rng.gen::<f64>())
            .collect()
    }

    /// Uniform draw in `[0, 0.25 * (upper - lower)]` per dimension.
    pub fn sample_velocity<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|b| 0.25 * b.width() * rng.gen::<f64>())
            .collect()
    }

    pub fn clamp(&self, position: &mut [f64]) {
        for (x, b) in position.iter_mut().zip(&self.bounds) {
            *x = x.clamp(b.lower, b.upper);
        }
    }

    /// Pair a position with the dimension names.
    pub fn to_rates(&self, position: &[f64]) -> RateVector {
        self.names
            .iter()
            .cloned()
            .zip(position.iter().copied())
            .collect()
    }
}
