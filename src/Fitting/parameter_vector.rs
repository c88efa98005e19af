//! # Parameter Vector
//!
//! Flat encoding of all per-reaction kinetic parameters as one numeric array of length
//! `4M` (`M` = reaction count), laid out as four contiguous blocks:
//!
//! ```text
//! [logA_0..M-1, Ea_0..M-1, model_index_0..M-1, contribution_0..M-1]
//! ```
//!
//! This is the only persisted artifact of the engine. Serialization is transparent
//! (a plain JSON array) and MUST preserve ordering exactly — no type tags distinguish
//! the blocks, so any reordering silently breaks every consumer.
//!
//! The `model_index` block stays continuous during optimization; it is rounded to the
//! nearest valid integer before every objective evaluation so the optimizer always
//! measures the error of an actually realizable discrete model choice.

use crate::Kinetics::reaction_scheme::ResolvedNetwork;
use serde::{Deserialize, Serialize};

/// Number of parameter blocks per reaction.
pub const BLOCKS: usize = 4;

/// Per-reaction parameter tuple, the unflattened view of one reaction's slice of the
/// vector. `model_index` is kept as `f64` because it is continuous mid-optimization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactionParameters {
    pub log_a: f64,
    pub ea: f64,
    pub model_index: f64,
    pub contribution: f64,
}

/// Flat `4M` parameter vector. See the module docs for the block layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterVector(Vec<f64>);

impl ParameterVector {
    /// Wraps a raw vector; the length must be a positive multiple of 4.
    pub fn new(values: Vec<f64>) -> Result<Self, String> {
        if values.is_empty() || values.len() % BLOCKS != 0 {
            return Err(format!(
                "parameter vector length {} is not a positive multiple of {}",
                values.len(),
                BLOCKS
            ));
        }
        Ok(Self(values))
    }

    /// Encodes per-reaction tuples into the flat block layout.
    pub fn encode(reactions: &[ReactionParameters]) -> Result<Self, String> {
        if reactions.is_empty() {
            return Err("cannot encode an empty reaction list".to_string());
        }
        let m = reactions.len();
        let mut values = vec![0.0; BLOCKS * m];
        for (i, r) in reactions.iter().enumerate() {
            values[i] = r.log_a;
            values[m + i] = r.ea;
            values[2 * m + i] = r.model_index;
            values[3 * m + i] = r.contribution;
        }
        Ok(Self(values))
    }

    /// Decodes the flat layout back into per-reaction tuples.
    pub fn decode(&self) -> Vec<ReactionParameters> {
        (0..self.num_reactions())
            .map(|i| ReactionParameters {
                log_a: self.log_a(i),
                ea: self.ea(i),
                model_index: self.model_raw(i),
                contribution: self.contribution(i),
            })
            .collect()
    }

    pub fn num_reactions(&self) -> usize {
        self.0.len() / BLOCKS
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn log_a(&self, reaction: usize) -> f64 {
        self.0[reaction]
    }

    pub fn ea(&self, reaction: usize) -> f64 {
        self.0[self.num_reactions() + reaction]
    }

    /// Unrounded model-index value, as the optimizer sees it.
    pub fn model_raw(&self, reaction: usize) -> f64 {
        self.0[2 * self.num_reactions() + reaction]
    }

    pub fn contribution(&self, reaction: usize) -> f64 {
        self.0[3 * self.num_reactions() + reaction]
    }

    /// The whole unrounded model-index block (for per-reaction-indexed UIs).
    pub fn model_block(&self) -> &[f64] {
        let m = self.num_reactions();
        &self.0[2 * m..3 * m]
    }

    /// Copy with the model-index block rounded to nearest integers. Evaluating the
    /// rounded copy and the original must give identical results downstream.
    pub fn rounded_models(&self) -> Self {
        let m = self.num_reactions();
        let mut values = self.0.clone();
        for v in &mut values[2 * m..3 * m] {
            *v = v.round();
        }
        Self(values)
    }
}

/// Flattens per-reaction bounds into optimizer bounds over the `4M` layout.
///
/// The model-index blocks get `[0, n_allowed - 1]` so a rounded optimizer value is an
/// index into the reaction's allowed-model set.
pub fn flatten_bounds(network: &ResolvedNetwork) -> Vec<(f64, f64)> {
    let m = network.num_reactions();
    let mut bounds = Vec::with_capacity(BLOCKS * m);
    for b in &network.bounds {
        bounds.push(b.log_a);
    }
    for b in &network.bounds {
        bounds.push(b.ea);
    }
    for models in &network.allowed_models {
        bounds.push((0.0, (models.len() - 1) as f64));
    }
    for b in &network.bounds {
        bounds.push(b.contribution);
    }
    bounds
}
