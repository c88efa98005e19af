/// Numeric library of solid-state kinetic models: differential `f(e)` and integral
/// `g(e)` forms behind one stable integer index, with the clamping and fallback rules
/// that keep rate evaluation total.
pub mod kinetic_models;

/// Reaction scheme description (species, reactions, allowed models, bounds), its
/// index-resolved view, and the chain extraction used to derive the per-chain
/// contribution constraints.
pub mod reaction_scheme;

/// Right-hand-side of the whole-network ODE system: Arrhenius rate constants with
/// overflow clamps, rate capping, and the species/extent bookkeeping.
pub mod ode_kernel;

/// Deadline-bounded wrapper around the peroxide ODE steppers, sampling exactly at the
/// experimental temperature grid and reporting failures as sentinel values.
pub mod deadline_integrator;
