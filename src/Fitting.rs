/// Flat `4M`-block parameter vector: encoding, decoding, block accessors, rounding of
/// the model-index block, and optimizer bounds flattening.
pub mod parameter_vector;

/// The multi-heating-rate mean-squared-error objective and the experimental dataset
/// types, plus the chain equality residuals and a synthetic-experiment generator.
pub mod objective;

/// Differential evolution (best/1/bin, dithered mutation, rayon-parallel population
/// scoring) — the primary global search backend.
pub mod diff_evolution;

/// Trial-based simulated-annealing search — the lightweight second backend.
pub mod annealing;

/// The optimization driver: state machine, cooperative cancellation, shared
/// best-result cell, improvement callbacks and background spawning.
pub mod driver;
