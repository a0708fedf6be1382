//! Python bindings (enabled with the `python` feature).

use std::collections::BTreeMap;

use ndarray::Array2;
use numpy::{PyArray1, PyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use pyo3::wrap_pyfunction;

use crate::calibration::calibrate;
use crate::config::{FitConfig, TopologyChoice};
use crate::error::KineticsError;
use crate::network::ReactionNetwork;
use crate::report::LogSink;
use crate::simulation::{run_sweep, SimulationConfig, TitrationAxis};

fn to_py_err(e: KineticsError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn dict_to_map(dict: &PyDict) -> PyResult<BTreeMap<String, f64>> {
    dict.iter()
        .map(|(k, v)| Ok((k.extract::<String>()?, v.extract::<f64>()?)))
        .collect()
}

/// Steady-state occupancy over a titration sweep.
///
/// # Arguments
/// * `topology` - Preset name or a JSON topology description
/// * `rates` - Rate constants by name
/// * `species` - Fixed ligand concentrations by name
/// * `titrated_species` - Ligand varied across the sweep
/// * `values` - Concentrations of the titrated ligand
///
/// # Returns
/// * (n_points, n_states) array of fractional occupancies
#[pyfunction]
#[pyo3(signature = (
    topology, rates, species, titrated_species, values,
    n_molecules=10000, n_steps=100001, dt=1e-7, sample_interval=1000, tail_window=10, seed=0
))]
#[allow(clippy::too_many_arguments)]
fn simulate_sweep<'py>(
    py: Python<'py>,
    topology: &str,
    rates: &PyDict,
    species: &PyDict,
    titrated_species: String,
    values: Vec<f64>,
    n_molecules: usize,
    n_steps: usize,
    dt: f64,
    sample_interval: usize,
    tail_window: usize,
    seed: u64,
) -> PyResult<&'py PyArray2<f64>> {
    let choice: TopologyChoice = if topology.trim_start().starts_with('{') {
        let spec = serde_json::from_str(topology)
            .map_err(|e| PyValueError::new_err(format!("invalid topology JSON: {}", e)))?;
        TopologyChoice::Inline(spec)
    } else {
        TopologyChoice::Preset(topology.to_string())
    };
    let network = ReactionNetwork::from_spec(&choice.resolve().map_err(to_py_err)?)
        .map_err(to_py_err)?;
    let rates = dict_to_map(rates)?;
    let species = dict_to_map(species)?;
    let titration = TitrationAxis::new(&titrated_species, values);
    let config = SimulationConfig {
        n_molecules,
        n_steps,
        dt,
        sample_interval,
        tail_window,
        seed,
        initial_state: 0,
    };

    let sweep = py
        .allow_threads(|| run_sweep(&network, &rates, &species, &titration, &config, None))
        .map_err(to_py_err)?;

    let n_states = network.n_states();
    let occupancy = Array2::from_shape_fn((sweep.steady_states.len(), n_states), |(i, j)| {
        sweep.steady_states[i][j]
    });
    Ok(PyArray2::from_owned_array(py, occupancy))
}

/// Run a full calibration from a JSON configuration file.
///
/// # Returns
/// * Dict with `best_rates`, `best_residual`, `history` and per-assay
///   `curves` arrays of (concentration, simulated, experimental)
#[pyfunction]
fn fit_config<'py>(py: Python<'py>, path: String) -> PyResult<&'py PyDict> {
    let config = FitConfig::from_file(&path).map_err(to_py_err)?;
    let problem = config.build_problem().map_err(to_py_err)?;
    let pso = config.pso.clone();
    let record = config.final_run.record_time_course;

    let outcome = py
        .allow_threads(|| calibrate(&problem, pso, record, &mut LogSink))
        .map_err(to_py_err)?;

    let final_run = outcome
        .final_run
        .as_ref()
        .map_err(|e| to_py_err(e.clone()))?;

    let result = PyDict::new(py);
    let best = PyDict::new(py);
    for (name, value) in outcome.optimization.best_rates() {
        best.set_item(name, value)?;
    }
    result.set_item("best_rates", best)?;
    result.set_item("best_residual", outcome.optimization.best_fitness)?;
    result.set_item(
        "history",
        PyArray1::from_vec(py, outcome.optimization.history.clone()),
    )?;

    let curves = PyDict::new(py);
    for curve in &final_run.curves {
        let table = Array2::from_shape_fn((curve.points.len(), 3), |(i, j)| {
            let p = &curve.points[i];
            match j {
                0 => p.titrated_concentration,
                1 => p.simulated_normalized,
                _ => p.experimental_normalized,
            }
        });
        curves.set_item(&curve.assay, PyArray2::from_owned_array(py, table))?;
    }
    result.set_item("curves", curves)?;
    Ok(result)
}

/// Python module definition
#[pymodule]
fn serca_fit(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(simulate_sweep, m)?)?;
    m.add_function(wrap_pyfunction!(fit_config, m)?)?;
    Ok(())
}
