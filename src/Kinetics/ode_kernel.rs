//! # Reaction-Network ODE Kernel
//!
//! Builds the right-hand-side `dY/dT` for a whole reaction network from a decoded
//! parameter set, the current temperature and the heating rate.
//!
//! ## State Vector
//!
//! `Y` has length `num_species + num_reactions`: the first block holds per-species
//! residual concentrations `e` (unitless, conceptually `1 - a`), the second block holds
//! the running extent of each reaction. The extent slot carries the *instantaneous*
//! rate, which the solver integrates into cumulative extent over temperature.
//!
//! ## Rate Law
//!
//! For reaction `i` with source concentration `e`:
//!
//! ```text
//! k_i(T) = 10^logA_i * exp(clamp(-Ea_i*1000/(R*max(T,1)), -700, 700)) / max(beta/60, 1e-3)
//! rate_i = min(k_i * f(model_i, e), 1e10)        (non-finite -> 0)
//! dY[source_i] -= rate_i;  dY[target_i] += rate_i;  dY[S+i] = rate_i
//! ```
//!
//! The temperature floor avoids division blow-up, the exponent clamp avoids overflow,
//! and the heating-rate floor avoids a divide-by-zero at `beta ~ 0`. `beta` comes in as
//! degC/min (numerically K/min) and is converted to K/s once, outside the hot loop.
//!
//! All species/reaction index resolution happens once per run in
//! [`ResolvedNetwork`](crate::Kinetics::reaction_scheme::ResolvedNetwork) — the RHS
//! performs no name lookups.

use crate::Fitting::parameter_vector::ParameterVector;
use crate::Kinetics::kinetic_models::f_e;
use crate::Kinetics::reaction_scheme::ResolvedNetwork;

/// Universal gas constant in J/(mol*K)
pub const R_G: f64 = 8.314;
/// Cap on a single reaction rate; anything above this is numerically pathological.
pub const MAX_RATE: f64 = 1e10;
/// Symmetric clamp on the Arrhenius exponent, just inside `exp` overflow territory.
pub const EXP_CLAMP: f64 = 700.0;
/// Floor on the heating rate after conversion to K/s.
pub const MIN_BETA_K_PER_S: f64 = 1e-3;

/// Converts a heating rate in degC/min (numerically K/min) to the floored K/s value
/// used by the kernel.
pub fn beta_k_per_s(beta: f64) -> f64 {
    (beta / 60.0).max(MIN_BETA_K_PER_S)
}

/// Arrhenius rate constant per Kelvin of temperature ramp. `ea` in kJ/mol.
pub fn rate_constant(log_a: f64, ea: f64, temperature: f64, beta_k_per_s: f64) -> f64 {
    let t = temperature.max(1.0);
    let exponent = (-ea * 1000.0 / (R_G * t)).clamp(-EXP_CLAMP, EXP_CLAMP);
    10f64.powf(log_a) * exponent.exp() / beta_k_per_s
}

/// Per-reaction parameters decoded from a flat [`ParameterVector`], with the continuous
/// model-index block already rounded and resolved to global model indices. Built once
/// per objective evaluation, shared by all heating rates.
#[derive(Debug, Clone)]
pub struct RateParameters {
    pub log_a: Vec<f64>,
    pub ea: Vec<f64>,
    /// Global kinetic model index per reaction; `-1` dispatches to the identity model.
    pub model: Vec<i64>,
    pub contribution: Vec<f64>,
}

impl RateParameters {
    pub fn from_vector(network: &ResolvedNetwork, params: &ParameterVector) -> Self {
        let m = network.num_reactions();
        Self {
            log_a: (0..m).map(|i| params.log_a(i)).collect(),
            ea: (0..m).map(|i| params.ea(i)).collect(),
            model: (0..m)
                .map(|i| network.global_model_index(i, params.model_raw(i)))
                .collect(),
            contribution: (0..m).map(|i| params.contribution(i)).collect(),
        }
    }
}

/// Evaluates `dY/dT` for the whole network into `dy`.
pub fn rhs_into(
    network: &ResolvedNetwork,
    rates: &RateParameters,
    beta_k_per_s: f64,
    temperature: f64,
    y: &[f64],
    dy: &mut [f64],
) {
    dy.fill(0.0);
    for i in 0..network.num_reactions() {
        let e = y[network.source_index[i]].clamp(0.0, 1.0);
        let k = rate_constant(rates.log_a[i], rates.ea[i], temperature, beta_k_per_s);
        let mut rate = k * f_e(rates.model[i], e);
        if !rate.is_finite() {
            rate = 0.0;
        } else if rate > MAX_RATE {
            rate = MAX_RATE;
        }
        dy[network.source_index[i]] -= rate;
        dy[network.target_index[i]] += rate;
        dy[network.num_species + i] = rate;
    }
}
