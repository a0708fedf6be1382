//! Per-bucket state occupancy counts for one titration point.

use ndarray::{s, Array1, Array2, Axis};

use crate::error::{KineticsError, Result};
use crate::network::StateId;

/// Occupancy counts indexed by `[bucket, state]`.
///
/// Each simulated molecule adds exactly one count per bucket, so every row
/// sums to the number of molecules merged in.
#[derive(Clone, Debug, PartialEq)]
pub struct OccupancyHistogram {
    counts: Array2<u64>,
}

impl OccupancyHistogram {
    pub fn new(n_buckets: usize, n_states: usize) -> Self {
        Self {
            counts: Array2::zeros((n_buckets, n_states)),
        }
    }

    pub fn n_buckets(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_states(&self) -> usize {
        self.counts.ncols()
    }

    #[inline]
    pub fn record(&mut self, bucket: usize, state: StateId) {
        self.counts[[bucket, state]] += 1;
    }

    /// Add another partial histogram of the same shape.
    pub fn merge(&mut self, other: &OccupancyHistogram) {
        self.counts += &other.counts;
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    /// Molecules counted in `bucket`.
    pub fn bucket_total(&self, bucket: usize) -> u64 {
        self.counts.row(bucket).sum()
    }

    /// Fractional occupancy per bucket and state.
    pub fn fractions(&self, n_molecules: usize) -> Array2<f64> {
        let n = n_molecules.max(1) as f64;
        self.counts.mapv(|c| c as f64 / n)
    }

    /// Mean fractional occupancy of each state over the last `tail_window` buckets.
    pub fn steady_state(&self, tail_window: usize, n_molecules: usize) -> Result<Vec<f64>> {
        if tail_window == 0 || tail_window > self.n_buckets() {
            return Err(KineticsError::config(format!(
                "tail window {} out of range for {} buckets",
                tail_window,
                self.n_buckets()
            )));
        }
        if n_molecules == 0 {
            return Err(KineticsError::config("steady state of zero molecules"));
        }

        let start = self.n_buckets() - tail_window;
        let tail = self.counts.slice(s![start.., ..]).mapv(|c| c as f64);
        let mean: Array1<f64> = tail.sum_axis(Axis(0)) / tail_window as f64;
        Ok((mean / n_molecules as f64).to_vec())
    }
}
