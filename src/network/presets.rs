//! Built-in topologies, published rate constants and reference assays.
//!
//! The SERCA cycle follows Inesi (1988). States are labelled after the
//! conformations of the cycle (S0 = E, S1 = E.Ca, ..., S11 = *E-Pi); S6a is the
//! ADP-sensitive phosphoenzyme branch. Rate names are `k_<from>_<to>` and every
//! edge points at the state its rate name says.

use super::model::{RateVector, SpeciesConcentrations, StateId, TopologySpec, TransitionSpec};
use crate::residual::{ExperimentalCurve, LinearObservable};

pub const CA_CYT: &str = "Ca_cyt";
pub const CA_SR: &str = "Ca_sr";
pub const MG_ATP: &str = "MgATP";
pub const MG_ADP: &str = "MgADP";
pub const PI: &str = "Pi";

/// Names accepted by [`topology`].
pub const PRESET_NAMES: [&str; 3] = ["serca_inesi", "serca_atp_branch", "two_state"];

const INESI_LABELS: [&str; 13] = [
    "S0", "S1", "S2", "S3", "S4", "S5", "S6a", "S7", "S6", "S8", "S9", "S10", "S11",
];

// Positional indices of the Inesi cycle.
const S0: StateId = 0;
const S1: StateId = 1;
const S2: StateId = 2;
const S3: StateId = 3;
const S4: StateId = 4;
const S5: StateId = 5;
const S6A: StateId = 6;
const S7: StateId = 7;
const S6: StateId = 8;
const S8: StateId = 9;
const S9: StateId = 10;
const S10: StateId = 11;
const S11: StateId = 12;
const S1A: StateId = 13;
const S2A: StateId = 14;
const S3A: StateId = 15;

fn edge(from: StateId, to: StateId, rate: &str) -> TransitionSpec {
    TransitionSpec::new(from, to, rate)
}

fn ligand(from: StateId, to: StateId, rate: &str, species: &str) -> TransitionSpec {
    TransitionSpec::with_species(from, to, rate, species)
}

/// Look up a preset topology by name.
pub fn topology(name: &str) -> Option<TopologySpec> {
    match name {
        "serca_inesi" => Some(serca_inesi()),
        "serca_atp_branch" => Some(serca_atp_branch()),
        "two_state" => Some(two_state()),
        _ => None,
    }
}

/// 13-state SERCA cycle used for calibration.
pub fn serca_inesi() -> TopologySpec {
    TopologySpec {
        n_states: 13,
        state_labels: INESI_LABELS.iter().map(|s| s.to_string()).collect(),
        transitions: vec![
            ligand(S0, S1, "k_S0_S1", CA_CYT),
            ligand(S0, S11, "k_S0_S11", PI),
            edge(S1, S2, "k_S1_S2"),
            edge(S1, S0, "k_S1_S0"),
            ligand(S2, S3, "k_S2_S3", CA_CYT),
            edge(S2, S1, "k_S2_S1"),
            ligand(S3, S4, "k_S3_S4", MG_ATP),
            edge(S3, S2, "k_S3_S2"),
            edge(S4, S5, "k_S4_S5"),
            edge(S4, S3, "k_S4_S3"),
            edge(S5, S6A, "k_S5_S6a"),
            edge(S5, S4, "k_S5_S4"),
            edge(S5, S6, "k_S5_S6"),
            edge(S6A, S7, "k_S6a_S7"),
            edge(S6A, S5, "k_S6a_S5"),
            edge(S7, S8, "k_S7_S8"),
            ligand(S7, S6A, "k_S7_S6a", MG_ADP),
            edge(S7, S6, "k_S7_S6"),
            edge(S6, S7, "k_S6_S7"),
            ligand(S6, S5, "k_S6_S5", MG_ADP),
            edge(S8, S9, "k_S8_S9"),
            ligand(S8, S7, "k_S8_S7", CA_SR),
            edge(S9, S10, "k_S9_S10"),
            edge(S9, S8, "k_S9_S8"),
            edge(S10, S11, "k_S10_S11"),
            ligand(S10, S9, "k_S10_S9", CA_SR),
            edge(S11, S0, "k_S11_S0"),
            edge(S11, S10, "k_S11_S10"),
        ],
    }
}

/// 16-state variant where MgATP may bind before calcium (S1a, S2a, S3a).
///
/// The branch rates have no published defaults; a rate vector for this
/// topology has to name them explicitly.
pub fn serca_atp_branch() -> TopologySpec {
    let mut labels: Vec<String> = INESI_LABELS.iter().map(|s| s.to_string()).collect();
    labels.extend(["S1a", "S2a", "S3a"].iter().map(|s| s.to_string()));

    TopologySpec {
        n_states: 16,
        state_labels: labels,
        transitions: vec![
            ligand(S0, S1, "k_S0_S1", CA_CYT),
            ligand(S0, S11, "k_S0_S11", PI),
            ligand(S0, S1A, "k_S0_S1a", MG_ATP),
            edge(S1, S2, "k_S1_S2"),
            ligand(S1, S0, "k_S1_S0", PI),
            ligand(S1, S2A, "k_S1_S2a", MG_ATP),
            ligand(S2, S3, "k_S2_S3", CA_CYT),
            edge(S2, S1, "k_S2_S1"),
            ligand(S2, S3A, "k_S2_S3a", MG_ATP),
            ligand(S3, S4, "k_S3_S4", MG_ATP),
            edge(S3, S2, "k_S3_S2"),
            ligand(S4, S5, "k_S4_S5", MG_ATP),
            edge(S4, S3, "k_S4_S3"),
            edge(S4, S3A, "k_S4_S3a"),
            edge(S5, S6A, "k_S5_S6a"),
            edge(S5, S4, "k_S5_S4"),
            edge(S5, S6, "k_S5_S6"),
            edge(S6A, S7, "k_S6a_S7"),
            edge(S6A, S5, "k_S6a_S5"),
            edge(S7, S8, "k_S7_S8"),
            ligand(S7, S6A, "k_S7_S6a", MG_ADP),
            edge(S7, S6, "k_S7_S6"),
            edge(S6, S7, "k_S6_S7"),
            edge(S6, S5, "k_S6_S5"),
            ligand(S8, S9, "k_S8_S9", MG_ATP),
            edge(S8, S7, "k_S8_S7"),
            edge(S9, S10, "k_S9_S10"),
            ligand(S9, S8, "k_S9_S8", CA_SR),
            edge(S10, S11, "k_S10_S11"),
            ligand(S10, S9, "k_S10_S9", CA_SR),
            edge(S11, S0, "k_S11_S0"),
            edge(S11, S10, "k_S11_S10"),
            ligand(S1A, S2A, "k_S1a_S2a", CA_CYT),
            edge(S1A, S0, "k_S1a_S0"),
            edge(S2A, S3A, "k_S2a_S3a"),
            edge(S2A, S1A, "k_S2a_S1a"),
            edge(S2A, S1, "k_S2a_S1"),
            ligand(S3A, S4, "k_S3a_S4", CA_CYT),
            edge(S3A, S2A, "k_S3a_S2a"),
            edge(S3A, S2, "k_S3a_S2"),
        ],
    }
}

/// Reversible two-state network `0 <-> 1` with rates `k01` and `k10`.
pub fn two_state() -> TopologySpec {
    TopologySpec {
        n_states: 2,
        state_labels: vec!["S0".to_string(), "S1".to_string()],
        transitions: vec![edge(0, 1, "k01"), edge(1, 0, "k10")],
    }
}

fn named(pairs: &[(&str, f64)]) -> RateVector {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Published Inesi rate constants for every edge of [`serca_inesi`],
/// including nominal values for the four rates the default fit frees.
pub fn inesi_rates() -> RateVector {
    named(&[
        ("k_S0_S1", 4e7),
        ("k_S1_S0", 450.0),
        ("k_S1_S2", 120.0),
        ("k_S2_S1", 25.0),
        ("k_S2_S3", 1e8),
        ("k_S3_S2", 16.0),
        ("k_S3_S4", 6e7),
        ("k_S4_S3", 30.0),
        ("k_S4_S5", 200.0),
        ("k_S5_S4", 350.0),
        ("k_S5_S6a", 800.0),
        ("k_S6a_S5", 200.0),
        ("k_S6a_S7", 500.0),
        ("k_S7_S6a", 4e6),
        ("k_S5_S6", 6.0),
        ("k_S6_S5", 1.25e3),
        ("k_S6_S7", 1.0),
        ("k_S7_S6", 10.0),
        ("k_S7_S8", 500.0),
        ("k_S8_S7", 5e5),
        ("k_S8_S9", 20.0),
        ("k_S9_S8", 20.0),
        ("k_S9_S10", 600.0),
        ("k_S10_S9", 6e4),
        ("k_S10_S11", 60.0),
        ("k_S11_S10", 60.0),
        ("k_S11_S0", 6e2),
        ("k_S0_S11", 1.5e4),
    ])
}

/// Search bounds of the default fit: one decade either side of the nominal value.
pub fn inesi_free_rate_bounds() -> Vec<(&'static str, f64, f64)> {
    vec![
        ("k_S0_S1", 4e6, 4e8),
        ("k_S2_S3", 1e7, 1e9),
        ("k_S7_S8", 50.0, 5000.0),
        ("k_S9_S10", 60.0, 6000.0),
    ]
}

/// Fixed assay conditions. `Ca_cyt` is the reference level used when
/// calcium is not the titrated species.
pub fn inesi_species() -> SpeciesConcentrations {
    named(&[
        (CA_CYT, 1e-6),
        (CA_SR, 1.3e-3),
        (MG_ATP, 5e-3),
        (MG_ADP, 36e-6),
        (PI, 1e-3),
    ])
}

/// Bound calcium per pump: singly-bound states count once, doubly-bound twice.
pub fn bound_calcium() -> LinearObservable {
    let mut terms = vec![(S1, 1.0), (S2, 1.0), (S9, 1.0)];
    terms.extend((S3..=S8).map(|s| (s, 2.0)));
    LinearObservable::new(terms)
}

/// Bound calcium for [`serca_atp_branch`]: adds the singly-bound branch states.
pub fn bound_calcium_atp_branch() -> LinearObservable {
    let mut observable = bound_calcium();
    observable.terms.push((S2A, 1.0));
    observable.terms.push((S3A, 1.0));
    observable
}

/// Total phosphoenzyme (S5 through S11).
pub fn phosphorylated() -> LinearObservable {
    LinearObservable::new((S5..=S11).map(|s| (s, 1.0)).collect())
}

/// Preset observable by name.
pub fn observable(name: &str) -> Option<LinearObservable> {
    match name {
        "bound_calcium" => Some(bound_calcium()),
        "bound_calcium_atp_branch" => Some(bound_calcium_atp_branch()),
        "phosphorylated" => Some(phosphorylated()),
        _ => None,
    }
}

/// Cytosolic calcium titration against normalized bound-calcium measurements.
pub fn calcium_binding_curve() -> ExperimentalCurve {
    let ca = [
        1.13465021562703e-07,
        1.48013728928924e-07,
        1.87545047401295e-07,
        2.37746427649773e-07,
        2.86177839072689e-07,
        3.34581558654772e-07,
        3.82579504194903e-07,
        4.40880103529033e-07,
        5.15498018194447e-07,
        6.0268752205741e-07,
        7.04360511231999e-07,
        8.41433890215616e-07,
        9.8310521528177e-07,
        1.209326027507e-06,
        1.46539261994034e-06,
        1.92506766806173e-06,
    ];
    let bound = [
        0.056698042688369,
        0.100474048769127,
        0.159057553309407,
        0.23871761522272,
        0.30582603399111,
        0.385634231598201,
        0.459159901847406,
        0.551640962566692,
        0.63566454650982,
        0.715472730890509,
        0.778419740266281,
        0.835003303161443,
        0.885304272566714,
        0.935510990636819,
        0.970991050011721,
        1.0,
    ];
    ExperimentalCurve::from_pairs(&ca, &bound)
}

/// Inorganic phosphate titration against normalized phosphoenzyme levels.
pub fn phosphorylation_curve() -> ExperimentalCurve {
    let pi = [
        1.03376779868233e-6,
        2.05352502645715e-6,
        3.37944980307518e-6,
        6.35162720217447e-6,
        1.06867586159251e-5,
        1.44096688378901e-5,
        2.34526541941682e-5,
        3.94597200689256e-5,
        8.37677788439386e-5,
        0.0001778279,
        0.0004079219,
        0.0006493816,
        0.0009357374,
    ];
    let phospho = [
        0.08470588, 0.17735294, 0.26794118, 0.40382353, 0.54382353, 0.60764706, 0.72294118,
        0.82176471, 0.90617647, 0.95970588, 0.98029412, 0.99264706, 1.0,
    ];
    ExperimentalCurve::from_pairs(&pi, &phospho)
}
