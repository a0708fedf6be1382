//! Reaction networks and the fixed time-step transition engine.
//!
//! - `model`: topology description and the immutable `ReactionNetwork`
//! - `engine`: one-step competing-probabilities update
//! - `presets`: SERCA topologies, published rates and reference assays

pub mod model;
pub mod engine;
pub mod presets;

pub use model::{
    RateId, RateVector, ReactionNetwork, SpeciesConcentrations, SpeciesId, StateId, TopologySpec,
    Transition, TransitionSpec,
};
pub use engine::{edge_probability, select_transition, step, StepTable};
