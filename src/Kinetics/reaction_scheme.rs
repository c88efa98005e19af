//! # Reaction Scheme
//!
//! Static description of a multi-step solid-state reaction network: an ordered species
//! list, ordered reactions (source species, target species, allowed kinetic models,
//! per-reaction parameter bounds), and the derived artifacts the fitting engine needs:
//!
//! - [`ResolvedNetwork`]: species names resolved to indices once per run, so the ODE
//!   right-hand-side never performs a name lookup in the hot loop
//! - chain extraction: every start→end path through the reaction DAG, used to build the
//!   "contributions sum to 1 per chain" equality constraints
//!
//! The scheme is immutable for the duration of one optimization run; a GUI mutates it
//! only between runs. All configuration problems (unknown species, empty model sets,
//! inverted bounds, no extractable chain) are surfaced as [`SchemeError`] before any
//! optimization starts, never mid-run.

use crate::Kinetics::kinetic_models::KineticModelId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors of a reaction scheme. All of these are detected during
/// resolution, before a single objective evaluation.
#[derive(Debug, Error, PartialEq)]
pub enum SchemeError {
    #[error("reaction scheme has no components")]
    NoComponents,
    #[error("reaction scheme has no reactions")]
    NoReactions,
    #[error("reaction {index} references unknown species '{species}'")]
    UnknownSpecies { index: usize, species: String },
    #[error("reaction {index} has an empty allowed-model set")]
    NoAllowedModels { index: usize },
    #[error("reaction {index}: {what} lower bound {lower} exceeds upper bound {upper}")]
    InvalidBounds {
        index: usize,
        what: &'static str,
        lower: f64,
        upper: f64,
    },
    #[error("no chain from a start species to an end species (scheme is disconnected or cyclic)")]
    NoChains,
}

/// A chemical species. Its position in the component list is its slot in the
/// concentration part of the integration state vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: String,
}

impl Species {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

/// Per-reaction parameter bounds: `log10` of the pre-exponential factor, activation
/// energy in kJ/mol, and the mass-loss contribution share.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactionBounds {
    pub log_a: (f64, f64),
    pub ea: (f64, f64),
    pub contribution: (f64, f64),
}

impl Default for ReactionBounds {
    /// The single authoritative default bound set used everywhere.
    fn default() -> Self {
        Self {
            log_a: (0.0, 20.0),
            ea: (10.0, 350.0),
            contribution: (0.01, 1.0),
        }
    }
}

impl ReactionBounds {
    fn validate(&self, index: usize) -> Result<(), SchemeError> {
        for (what, (lower, upper)) in [
            ("log_a", self.log_a),
            ("ea", self.ea),
            ("contribution", self.contribution),
        ] {
            if !(lower <= upper) {
                return Err(SchemeError::InvalidBounds {
                    index,
                    what,
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }
}

/// One reaction step `from -> to` with the set of kinetic models the optimizer is
/// allowed to choose from. Reaction order in the scheme determines where the reaction's
/// parameters live in the flat parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub from: String,
    pub to: String,
    pub allowed_models: Vec<KineticModelId>,
    pub bounds: ReactionBounds,
}

impl Reaction {
    pub fn new(from: &str, to: &str, allowed_models: Vec<KineticModelId>) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            allowed_models,
            bounds: ReactionBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: ReactionBounds) -> Self {
        self.bounds = bounds;
        self
    }
}

/// The user-facing reaction scheme: ordered species plus ordered reactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionScheme {
    pub components: Vec<Species>,
    pub reactions: Vec<Reaction>,
}

impl ReactionScheme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_component(&mut self, id: &str) -> &mut Self {
        self.components.push(Species::new(id));
        self
    }

    pub fn add_reaction(&mut self, reaction: Reaction) -> &mut Self {
        self.reactions.push(reaction);
        self
    }

    pub fn species_index(&self, id: &str) -> Option<usize> {
        self.components.iter().position(|s| s.id == id)
    }

    /// Resolves species names to indices and validates the whole configuration.
    /// Called once per optimization run.
    pub fn resolve(&self) -> Result<ResolvedNetwork, SchemeError> {
        if self.components.is_empty() {
            return Err(SchemeError::NoComponents);
        }
        if self.reactions.is_empty() {
            return Err(SchemeError::NoReactions);
        }
        let mut source_index = Vec::with_capacity(self.reactions.len());
        let mut target_index = Vec::with_capacity(self.reactions.len());
        let mut allowed_models = Vec::with_capacity(self.reactions.len());
        let mut bounds = Vec::with_capacity(self.reactions.len());
        for (index, reaction) in self.reactions.iter().enumerate() {
            let src = self.species_index(&reaction.from).ok_or_else(|| {
                SchemeError::UnknownSpecies {
                    index,
                    species: reaction.from.clone(),
                }
            })?;
            let tgt = self.species_index(&reaction.to).ok_or_else(|| {
                SchemeError::UnknownSpecies {
                    index,
                    species: reaction.to.clone(),
                }
            })?;
            if reaction.allowed_models.is_empty() {
                return Err(SchemeError::NoAllowedModels { index });
            }
            reaction.bounds.validate(index)?;
            source_index.push(src);
            target_index.push(tgt);
            allowed_models.push(reaction.allowed_models.clone());
            bounds.push(reaction.bounds);
        }
        Ok(ResolvedNetwork {
            num_species: self.components.len(),
            source_index,
            target_index,
            allowed_models,
            bounds,
        })
    }

    /// Extracts every start→end reaction chain from the scheme.
    ///
    /// A start species has no incoming reactions, an end species has no outgoing ones.
    /// A depth-first search from every start node records the ordered reaction indices
    /// of each path that reaches an end node. A species already on the current path is
    /// never re-entered, so a malformed cyclic scheme terminates instead of looping.
    /// Zero chains is a configuration error.
    pub fn extract_chains(&self) -> Result<Vec<Vec<usize>>, SchemeError> {
        let network = self.resolve()?;
        let n = network.num_species;
        // forward adjacency: species -> [(reaction index, target species)]
        let mut outgoing: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];
        for i in 0..network.num_reactions() {
            outgoing[network.source_index[i]].push((i, network.target_index[i]));
            in_degree[network.target_index[i]] += 1;
        }

        let mut chains = Vec::new();
        let mut path: Vec<usize> = Vec::new();
        let mut on_path = vec![false; n];
        for start in 0..n {
            if in_degree[start] != 0 || outgoing[start].is_empty() {
                continue;
            }
            dfs_chains(start, &outgoing, &mut on_path, &mut path, &mut chains);
        }
        if chains.is_empty() {
            return Err(SchemeError::NoChains);
        }
        Ok(chains)
    }
}

fn dfs_chains(
    node: usize,
    outgoing: &[Vec<(usize, usize)>],
    on_path: &mut [bool],
    path: &mut Vec<usize>,
    chains: &mut Vec<Vec<usize>>,
) {
    if outgoing[node].is_empty() {
        chains.push(path.clone());
        return;
    }
    on_path[node] = true;
    for &(reaction, next) in &outgoing[node] {
        if on_path[next] {
            continue;
        }
        path.push(reaction);
        dfs_chains(next, outgoing, on_path, path, chains);
        path.pop();
    }
    on_path[node] = false;
}

/// Index-resolved view of a [`ReactionScheme`], built once per optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNetwork {
    pub num_species: usize,
    pub source_index: Vec<usize>,
    pub target_index: Vec<usize>,
    pub allowed_models: Vec<Vec<KineticModelId>>,
    pub bounds: Vec<ReactionBounds>,
}

impl ResolvedNetwork {
    pub fn num_reactions(&self) -> usize {
        self.source_index.len()
    }

    /// Length of the integration state vector: one concentration slot per species plus
    /// one running-extent slot per reaction.
    pub fn state_len(&self) -> usize {
        self.num_species + self.num_reactions()
    }

    /// Maps the continuous model parameter of reaction `i` to a global model index.
    ///
    /// The raw value is rounded to the nearest integer position inside the reaction's
    /// allowed-model set. A rounded value outside the set yields `-1`, which the model
    /// library dispatches to the identity fallback — a corrupted index must degrade the
    /// fit, not abort the run.
    pub fn global_model_index(&self, reaction: usize, raw: f64) -> i64 {
        if !raw.is_finite() {
            return -1;
        }
        let local = raw.round() as i64;
        if local < 0 {
            return -1;
        }
        match self.allowed_models[reaction].get(local as usize) {
            Some(model) => model.as_index() as i64,
            None => -1,
        }
    }
}

/////////////////////////////////////////TESTS/////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod resolve_tests {
    use super::*;

    fn two_step_scheme() -> ReactionScheme {
        let mut scheme = ReactionScheme::new();
        scheme
            .add_component("A")
            .add_component("B")
            .add_component("C");
        scheme.add_reaction(Reaction::new("A", "B", vec![KineticModelId::F1]));
        scheme.add_reaction(Reaction::new("B", "C", vec![KineticModelId::F2]));
        scheme
    }

    #[test]
    fn test_resolve_indices() {
        let network = two_step_scheme().resolve().unwrap();
        assert_eq!(network.num_species, 3);
        assert_eq!(network.num_reactions(), 2);
        assert_eq!(network.source_index, vec![0, 1]);
        assert_eq!(network.target_index, vec![1, 2]);
        assert_eq!(network.state_len(), 5);
    }

    #[test]
    fn test_empty_scheme_rejected() {
        let scheme = ReactionScheme::new();
        assert_eq!(scheme.resolve().unwrap_err(), SchemeError::NoComponents);

        let mut no_reactions = ReactionScheme::new();
        no_reactions.add_component("A");
        assert_eq!(no_reactions.resolve().unwrap_err(), SchemeError::NoReactions);
    }

    #[test]
    fn test_unknown_species_rejected() {
        let mut scheme = two_step_scheme();
        scheme.add_reaction(Reaction::new("C", "X", vec![KineticModelId::F1]));
        match scheme.resolve() {
            Err(SchemeError::UnknownSpecies { index, species }) => {
                assert_eq!(index, 2);
                assert_eq!(species, "X");
            }
            other => panic!("expected UnknownSpecies, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_model_set_rejected() {
        let mut scheme = ReactionScheme::new();
        scheme.add_component("A").add_component("B");
        scheme.add_reaction(Reaction::new("A", "B", vec![]));
        assert_eq!(
            scheme.resolve().unwrap_err(),
            SchemeError::NoAllowedModels { index: 0 }
        );
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut scheme = ReactionScheme::new();
        scheme.add_component("A").add_component("B");
        let bad = ReactionBounds {
            ea: (300.0, 100.0),
            ..ReactionBounds::default()
        };
        scheme.add_reaction(Reaction::new("A", "B", vec![KineticModelId::F1]).with_bounds(bad));
        match scheme.resolve() {
            Err(SchemeError::InvalidBounds { what, .. }) => assert_eq!(what, "ea"),
            other => panic!("expected InvalidBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_global_model_index_mapping() {
        let mut scheme = ReactionScheme::new();
        scheme.add_component("A").add_component("B");
        scheme.add_reaction(Reaction::new(
            "A",
            "B",
            vec![KineticModelId::F1, KineticModelId::F2, KineticModelId::A2],
        ));
        let network = scheme.resolve().unwrap();
        assert_eq!(network.global_model_index(0, 0.0), 7); // F1
        assert_eq!(network.global_model_index(0, 1.2), 8); // rounds to F2
        assert_eq!(network.global_model_index(0, 1.5), 0); // .5 rounds away from zero -> A2
        assert_eq!(network.global_model_index(0, 2.49), 0); // A2
        assert_eq!(network.global_model_index(0, 3.0), -1); // out of set
        assert_eq!(network.global_model_index(0, -0.6), -1);
        assert_eq!(network.global_model_index(0, f64::NAN), -1);
    }

    #[test]
    fn test_scheme_serde_round_trip() {
        let scheme = two_step_scheme();
        let json = serde_json::to_string(&scheme).unwrap();
        let back: ReactionScheme = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scheme);
    }
}

#[cfg(test)]
mod chain_tests {
    use super::*;

    fn models() -> Vec<KineticModelId> {
        vec![KineticModelId::F1]
    }

    #[test]
    fn test_sequential_scheme_single_chain() {
        let mut scheme = ReactionScheme::new();
        scheme
            .add_component("A")
            .add_component("B")
            .add_component("C");
        scheme.add_reaction(Reaction::new("A", "B", models()));
        scheme.add_reaction(Reaction::new("B", "C", models()));
        assert_eq!(scheme.extract_chains().unwrap(), vec![vec![0, 1]]);
    }

    #[test]
    fn test_divergent_scheme_two_chains() {
        let mut scheme = ReactionScheme::new();
        scheme
            .add_component("A")
            .add_component("B")
            .add_component("C");
        scheme.add_reaction(Reaction::new("A", "B", models()));
        scheme.add_reaction(Reaction::new("A", "C", models()));
        assert_eq!(scheme.extract_chains().unwrap(), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_convergent_scheme_two_chains() {
        let mut scheme = ReactionScheme::new();
        scheme
            .add_component("A")
            .add_component("B")
            .add_component("C");
        scheme.add_reaction(Reaction::new("A", "C", models()));
        scheme.add_reaction(Reaction::new("B", "C", models()));
        assert_eq!(scheme.extract_chains().unwrap(), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_diamond_scheme() {
        let mut scheme = ReactionScheme::new();
        scheme
            .add_component("A")
            .add_component("B")
            .add_component("C")
            .add_component("D");
        scheme.add_reaction(Reaction::new("A", "B", models()));
        scheme.add_reaction(Reaction::new("A", "C", models()));
        scheme.add_reaction(Reaction::new("B", "D", models()));
        scheme.add_reaction(Reaction::new("C", "D", models()));
        assert_eq!(
            scheme.extract_chains().unwrap(),
            vec![vec![0, 2], vec![1, 3]]
        );
    }

    #[test]
    fn test_cyclic_scheme_is_configuration_error() {
        let mut scheme = ReactionScheme::new();
        scheme.add_component("A").add_component("B");
        scheme.add_reaction(Reaction::new("A", "B", models()));
        scheme.add_reaction(Reaction::new("B", "A", models()));
        // every node has an incoming edge, so there is no start node and no chain
        assert_eq!(scheme.extract_chains().unwrap_err(), SchemeError::NoChains);
    }

    #[test]
    fn test_cycle_behind_start_terminates() {
        // A -> B -> C -> B: the DFS must not revisit B within one path
        let mut scheme = ReactionScheme::new();
        scheme
            .add_component("A")
            .add_component("B")
            .add_component("C");
        scheme.add_reaction(Reaction::new("A", "B", models()));
        scheme.add_reaction(Reaction::new("B", "C", models()));
        scheme.add_reaction(Reaction::new("C", "B", models()));
        // no end node is reachable: C's only edge re-enters the path
        assert_eq!(scheme.extract_chains().unwrap_err(), SchemeError::NoChains);
    }
}
