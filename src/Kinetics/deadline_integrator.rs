//! # Deadline-Bounded Integrator
//!
//! Wraps the `peroxide` ODE steppers with a hard wall-clock deadline and exact sampling
//! on the experimental temperature grid.
//!
//! ## Why a deadline
//!
//! Global optimization evaluates thousands of candidate parameter vectors; a small
//! fraction of them are numerically pathological and would hang a single solver call
//! for seconds, stalling an entire optimization generation. A deadline timestamp is
//! recorded before the call and checked on **every** RHS evaluation; once exceeded, the
//! RHS returns an error that aborts the step loop, and the wrapper reports the
//! [`IntegrationFailure::DeadlineExceeded`] sentinel. Failures are values, never
//! panics — one bad trajectory must not abort a population-wide optimization step.
//!
//! ## Grid alignment
//!
//! Integration runs segment-by-segment between adjacent grid temperatures with a fixed
//! number of sub-steps per segment, so the returned trajectory aligns 1:1 with the
//! experimental samples and no interpolation is needed downstream.
//!
//! ## Solver choice
//!
//! Large activation-energy spreads routinely produce stiff systems. The implicit
//! Gauss-Legendre stepper (`GL4`) is the stiff option; the explicit `RK5`/`RK4`
//! steppers are cheaper fallbacks whose occasional failed trajectories are absorbed by
//! the objective's penalty. `RK5` is the authoritative default.

use crate::Kinetics::ode_kernel::{RateParameters, beta_k_per_s, rhs_into};
use crate::Kinetics::reaction_scheme::ResolvedNetwork;
use nalgebra::DVector;
use peroxide::fuga::{BasicODESolver, GL4, ImplicitSolver, ODEProblem, ODESolver, RK4, RK5};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// ODE stepper selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OdeMethod {
    Rk4,
    Rk5,
    /// Implicit Gauss-Legendre, for stiff parameter regions.
    Gl4,
}

/// Solver configuration shared by every integration of one optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub method: OdeMethod,
    /// Fixed sub-steps per temperature-grid interval.
    pub substeps: usize,
    /// Iteration tolerance of the implicit stepper.
    pub implicit_tol: f64,
    /// Iteration cap of the implicit stepper.
    pub implicit_max_iter: usize,
    /// Hard wall-clock budget of one `integrate` call.
    pub deadline_ms: u64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            method: OdeMethod::Rk5,
            substeps: 4,
            implicit_tol: 1e-6,
            implicit_max_iter: 100,
            deadline_ms: 150,
        }
    }
}

/// Sentinel outcome of a failed integration. The objective maps any of these to a
/// fixed penalty for the affected heating rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationFailure {
    DeadlineExceeded,
    SolverError,
    NonFinite,
}

/// Solution sampled exactly at the experimental temperature grid.
#[derive(Debug, Clone)]
pub struct Trajectory {
    num_species: usize,
    num_reactions: usize,
    /// One state row per grid temperature.
    states: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Residual concentration of one species over the grid.
    pub fn concentration(&self, species: usize) -> DVector<f64> {
        DVector::from_iterator(self.len(), self.states.iter().map(|row| row[species]))
    }

    /// Cumulative (unweighted) extent of one reaction over the grid.
    pub fn extent(&self, reaction: usize) -> DVector<f64> {
        DVector::from_iterator(
            self.len(),
            self.states
                .iter()
                .map(|row| row[self.num_species + reaction]),
        )
    }

    /// Contribution-weighted cumulative conversion, clamped to `[0, 1]`.
    pub fn conversion(&self, contributions: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.len(),
            self.states.iter().map(|row| {
                let mut total = 0.0;
                for (i, c) in contributions.iter().enumerate().take(self.num_reactions) {
                    total += c * row[self.num_species + i];
                }
                total.clamp(0.0, 1.0)
            }),
        )
    }
}

/// The network RHS as a peroxide problem, with the deadline check folded into every
/// derivative evaluation.
struct NetworkOde<'a> {
    network: &'a ResolvedNetwork,
    rates: &'a RateParameters,
    beta_k_per_s: f64,
    deadline: Instant,
}

impl ODEProblem for NetworkOde<'_> {
    fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), anyhow::Error> {
        if Instant::now() >= self.deadline {
            anyhow::bail!("integration deadline exceeded");
        }
        rhs_into(self.network, self.rates, self.beta_k_per_s, t, y, dy);
        Ok(())
    }
}

/// Fresh initial state: the reference species fully unreacted, everything else zero.
pub fn initial_state(network: &ResolvedNetwork) -> Vec<f64> {
    let mut y = vec![0.0; network.state_len()];
    y[0] = 1.0;
    y
}

/// Integrates the network over `t_grid` (temperatures in K) at heating rate `beta`
/// (degC/min), sampling exactly at the grid points.
pub fn integrate(
    network: &ResolvedNetwork,
    rates: &RateParameters,
    beta: f64,
    t_grid: &[f64],
    settings: &SolverSettings,
) -> Result<Trajectory, IntegrationFailure> {
    if t_grid.len() < 2 {
        return Err(IntegrationFailure::SolverError);
    }
    let deadline = Instant::now() + Duration::from_millis(settings.deadline_ms);
    let problem = NetworkOde {
        network,
        rates,
        beta_k_per_s: beta_k_per_s(beta),
        deadline,
    };
    let substeps = settings.substeps.max(1);

    let mut state = initial_state(network);
    let mut states = Vec::with_capacity(t_grid.len());
    states.push(state.clone());
    for window in t_grid.windows(2) {
        let (t0, t1) = (window[0], window[1]);
        if !(t1 > t0) {
            return Err(IntegrationFailure::SolverError);
        }
        if Instant::now() >= deadline {
            return Err(IntegrationFailure::DeadlineExceeded);
        }
        let dt = (t1 - t0) / substeps as f64;
        let solved = match settings.method {
            OdeMethod::Rk4 => BasicODESolver::new(RK4).solve(&problem, (t0, t1), dt, &state),
            OdeMethod::Rk5 => {
                BasicODESolver::new(RK5::default()).solve(&problem, (t0, t1), dt, &state)
            }
            OdeMethod::Gl4 => BasicODESolver::new(GL4::new(
                ImplicitSolver::FixedPoint,
                settings.implicit_tol,
                settings.implicit_max_iter,
            ))
            .solve(&problem, (t0, t1), dt, &state),
        };
        let (_, y_out) = match solved {
            Ok(result) => result,
            Err(_) => {
                return Err(if Instant::now() >= deadline {
                    IntegrationFailure::DeadlineExceeded
                } else {
                    IntegrationFailure::SolverError
                });
            }
        };
        let last = match y_out.last() {
            Some(row) => row,
            None => return Err(IntegrationFailure::SolverError),
        };
        if last.iter().any(|v| !v.is_finite()) {
            return Err(IntegrationFailure::NonFinite);
        }
        state.copy_from_slice(last);
        states.push(state.clone());
    }

    Ok(Trajectory {
        num_species: network.num_species,
        num_reactions: network.num_reactions(),
        states,
    })
}
