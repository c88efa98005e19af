//! # Multi-Heating-Rate Objective
//!
//! Total mean-squared-error of one candidate parameter vector across all heating-rate
//! experiments. This is the function a global optimizer calls, potentially millions of
//! times, so the struct is plain data — resolved indices, experiment arrays, solver
//! settings — `Clone + Send + Sync`, cheap to duplicate into parallel workers, with no
//! open handles and no GUI references.
//!
//! Per heating rate:
//! 1. integrate the network with the deadline-bounded integrator; any failure adds the
//!    fixed penalty for that rate only,
//! 2. weight the cumulative-extent rows by their contributions, clamp the summed
//!    conversion to `[0, 1]`,
//! 3. reconstruct model mass `M(T) = M0 - (M0 - Mfin) * conversion`, clamp to
//!    `[Mfin, M0]` — an out-of-range conversion would otherwise predict physically
//!    impossible mass, which a smooth optimizer happily exploits as a false zero-error
//!    region,
//! 4. add the mean squared deviation from the measured curve.
//!
//! The model-index block is rounded before every evaluation, and the chain equality
//! constraints (`sum of contributions over a chain = 1`) are exposed as residuals
//! expected to be zero.

use crate::Fitting::parameter_vector::{ParameterVector, flatten_bounds};
use crate::Kinetics::deadline_integrator::{SolverSettings, integrate};
use crate::Kinetics::ode_kernel::RateParameters;
use crate::Kinetics::reaction_scheme::{ReactionScheme, ResolvedNetwork, SchemeError};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Fixed penalty added for every heating rate whose integration fails.
pub const INTEGRATION_PENALTY: f64 = 1e4;

/// Experimental data errors, detected at construction.
#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("temperature grid must contain at least two samples")]
    GridTooShort,
    #[error("temperature grid must be strictly increasing at sample {0}")]
    GridNotIncreasing(usize),
    #[error("experiment set contains no heating-rate curves")]
    NoCurves,
    #[error("mass curve for beta={beta} has {got} samples, expected {expected}")]
    CurveLengthMismatch { beta: f64, got: usize, expected: usize },
}

/// One measured mass-fraction curve at heating rate `beta` (degC/min).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatingRateCurve {
    pub beta: f64,
    pub mass: Vec<f64>,
}

impl HeatingRateCurve {
    pub fn new(beta: f64, mass: Vec<f64>) -> Self {
        Self { beta, mass }
    }

    /// Initial mass: the first sample of the curve.
    pub fn m0(&self) -> f64 {
        self.mass[0]
    }

    /// Final mass: the last sample of the curve.
    pub fn mfin(&self) -> f64 {
        self.mass[self.mass.len() - 1]
    }
}

/// One temperature axis (K) shared across heating rates, one mass curve per rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSet {
    pub temperature: Vec<f64>,
    pub curves: Vec<HeatingRateCurve>,
}

impl ExperimentSet {
    pub fn new(temperature: Vec<f64>, curves: Vec<HeatingRateCurve>) -> Result<Self, DataError> {
        if temperature.len() < 2 {
            return Err(DataError::GridTooShort);
        }
        for i in 1..temperature.len() {
            if !(temperature[i] > temperature[i - 1]) {
                return Err(DataError::GridNotIncreasing(i));
            }
        }
        if curves.is_empty() {
            return Err(DataError::NoCurves);
        }
        for curve in &curves {
            if curve.mass.len() != temperature.len() {
                return Err(DataError::CurveLengthMismatch {
                    beta: curve.beta,
                    got: curve.mass.len(),
                    expected: temperature.len(),
                });
            }
        }
        Ok(Self { temperature, curves })
    }
}

/// Errors raised while assembling the fitting problem. All configuration-class:
/// surfaced before optimization starts, never mid-run.
#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error(transparent)]
    Scheme(#[from] SchemeError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("invalid optimizer bound at parameter {index}: lower {lower} exceeds upper {upper}")]
    InvalidBound { index: usize, lower: f64, upper: f64 },
    #[error("parameter vector malformed: {0}")]
    BadParameters(String),
}

/// The objective function over one immutable fitting problem.
#[derive(Clone)]
pub struct MultiRateObjective {
    network: ResolvedNetwork,
    experiments: ExperimentSet,
    solver: SolverSettings,
    chains: Vec<Vec<usize>>,
    penalty: f64,
    cancel: Option<Arc<AtomicBool>>,
}

impl MultiRateObjective {
    /// Resolves and validates the scheme, extracts the chains, checks the experiments.
    /// Fails fast on any configuration error.
    pub fn new(
        scheme: &ReactionScheme,
        experiments: ExperimentSet,
        solver: SolverSettings,
    ) -> Result<Self, FitError> {
        let network = scheme.resolve()?;
        let chains = scheme.extract_chains()?;
        Ok(Self {
            network,
            experiments,
            solver,
            chains,
            penalty: INTEGRATION_PENALTY,
            cancel: None,
        })
    }

    /// Installs the cooperative cancellation flag checked inside the per-heating-rate
    /// loop. A cancelled evaluation returns infinity, which can never become a best.
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn network(&self) -> &ResolvedNetwork {
        &self.network
    }

    pub fn chains(&self) -> &[Vec<usize>] {
        &self.chains
    }

    pub fn num_parameters(&self) -> usize {
        4 * self.network.num_reactions()
    }

    /// Optimizer bounds over the flat `4M` layout.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        flatten_bounds(&self.network)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Total MSE across all heating rates for one candidate vector.
    pub fn evaluate(&self, params: &ParameterVector) -> f64 {
        let rates = RateParameters::from_vector(&self.network, params);
        let mut total = 0.0;
        for curve in &self.experiments.curves {
            if self.is_cancelled() {
                return f64::INFINITY;
            }
            match integrate(
                &self.network,
                &rates,
                curve.beta,
                &self.experiments.temperature,
                &self.solver,
            ) {
                Ok(trajectory) => {
                    let conversion = trajectory.conversion(&rates.contribution);
                    total += mass_curve_mse(&conversion, curve);
                }
                Err(failure) => {
                    log::debug!(
                        "integration failed for beta={} ({:?}); penalized",
                        curve.beta,
                        failure
                    );
                    total += self.penalty;
                }
            }
        }
        total
    }

    /// Chain equality residuals `sum of contributions over chain - 1`, one per chain,
    /// all expected to be zero at a feasible point.
    pub fn chain_residuals(&self, params: &ParameterVector) -> Vec<f64> {
        self.chains
            .iter()
            .map(|chain| {
                chain
                    .iter()
                    .map(|&reaction| params.contribution(reaction))
                    .sum::<f64>()
                    - 1.0
            })
            .collect()
    }

    /// Quadratic constraint violation, zero at any feasible point.
    pub fn constraint_penalty(&self, params: &ParameterVector) -> f64 {
        self.chain_residuals(params).iter().map(|r| r * r).sum()
    }
}

fn mass_curve_mse(conversion: &DVector<f64>, curve: &HeatingRateCurve) -> f64 {
    let m0 = curve.m0();
    let mfin = curve.mfin();
    let lo = m0.min(mfin);
    let hi = m0.max(mfin);
    let model = conversion.map(|c| (m0 - (m0 - mfin) * c).clamp(lo, hi));
    let measured = DVector::from_column_slice(&curve.mass);
    (model - measured).norm_squared() / curve.mass.len() as f64
}

/// Forward-simulates a scheme at known "true" parameters into a synthetic experiment
/// set. Used by tests and handy for previewing a scheme before fitting real data.
pub fn synthetic_experiments(
    scheme: &ReactionScheme,
    truth: &ParameterVector,
    temperature: Vec<f64>,
    betas: &[f64],
    m0: f64,
    mfin: f64,
    solver: &SolverSettings,
) -> Result<ExperimentSet, FitError> {
    let network = scheme.resolve()?;
    let rates = RateParameters::from_vector(&network, truth);
    let mut curves = Vec::with_capacity(betas.len());
    for &beta in betas {
        let trajectory = integrate(&network, &rates, beta, &temperature, solver)
            .map_err(|f| FitError::BadParameters(format!("synthetic run failed: {:?}", f)))?;
        let conversion = trajectory.conversion(&rates.contribution);
        let mass = conversion.iter().map(|c| m0 - (m0 - mfin) * c).collect();
        curves.push(HeatingRateCurve::new(beta, mass));
    }
    Ok(ExperimentSet::new(temperature, curves)?)
}

/////////////////////////////////////////TESTS/////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod data_tests {
    use super::*;

    #[test]
    fn test_experiment_validation() {
        assert_eq!(
            ExperimentSet::new(vec![500.0], vec![]).unwrap_err(),
            DataError::GridTooShort
        );
        assert_eq!(
            ExperimentSet::new(vec![500.0, 500.0], vec![]).unwrap_err(),
            DataError::GridNotIncreasing(1)
        );
        assert_eq!(
            ExperimentSet::new(vec![500.0, 510.0], vec![]).unwrap_err(),
            DataError::NoCurves
        );
        let bad_curve = HeatingRateCurve::new(5.0, vec![100.0]);
        assert!(matches!(
            ExperimentSet::new(vec![500.0, 510.0], vec![bad_curve]).unwrap_err(),
            DataError::CurveLengthMismatch { .. }
        ));
        let curve = HeatingRateCurve::new(5.0, vec![100.0, 90.0]);
        assert!(ExperimentSet::new(vec![500.0, 510.0], vec![curve]).is_ok());
    }

    #[test]
    fn test_curve_endpoints() {
        let curve = HeatingRateCurve::new(5.0, vec![100.0, 95.0, 72.0]);
        assert_eq!(curve.m0(), 100.0);
        assert_eq!(curve.mfin(), 72.0);
    }
}

#[cfg(test)]
mod objective_tests {
    use super::*;
    use crate::Kinetics::kinetic_models::KineticModelId;
    use crate::Kinetics::reaction_scheme::{Reaction, ReactionScheme};

    fn grid(from: f64, to: f64, n: usize) -> Vec<f64> {
        let dt = (to - from) / (n - 1) as f64;
        (0..n).map(|i| from + dt * i as f64).collect()
    }

    /// Single reaction A -> B with allowed models [F1, F2, F3], truth = F2.
    fn truth_problem() -> (ReactionScheme, ParameterVector, ExperimentSet, SolverSettings) {
        let mut scheme = ReactionScheme::new();
        scheme.add_component("A").add_component("B");
        scheme.add_reaction(Reaction::new(
            "A",
            "B",
            vec![KineticModelId::F1, KineticModelId::F2, KineticModelId::F3],
        ));
        // [logA, Ea, model_index (1 -> F2), contribution]
        let truth = ParameterVector::new(vec![8.0, 120.0, 1.0, 1.0]).unwrap();
        let solver = SolverSettings {
            deadline_ms: 2000,
            ..SolverSettings::default()
        };
        let experiments = synthetic_experiments(
            &scheme,
            &truth,
            grid(500.0, 800.0, 101),
            &[5.0],
            100.0,
            60.0,
            &solver,
        )
        .unwrap();
        (scheme, truth, experiments, solver)
    }

    #[test]
    fn test_true_parameters_give_zero_mse() {
        let (scheme, truth, experiments, solver) = truth_problem();
        let objective = MultiRateObjective::new(&scheme, experiments, solver).unwrap();
        let mse = objective.evaluate(&truth);
        assert!(mse < 1e-6, "MSE at truth should be ~0, got {}", mse);
    }

    #[test]
    fn test_wrong_parameters_give_positive_mse() {
        let (scheme, _, experiments, solver) = truth_problem();
        let objective = MultiRateObjective::new(&scheme, experiments, solver).unwrap();
        let wrong = ParameterVector::new(vec![8.0, 150.0, 1.0, 1.0]).unwrap();
        assert!(objective.evaluate(&wrong) > 1e-4);
    }

    #[test]
    fn test_model_index_rounding_invariance() {
        let (scheme, _, experiments, solver) = truth_problem();
        let objective = MultiRateObjective::new(&scheme, experiments, solver).unwrap();
        let at_exact = ParameterVector::new(vec![8.0, 120.0, 2.0, 1.0]).unwrap();
        let at_fractional = ParameterVector::new(vec![8.0, 120.0, 2.49, 1.0]).unwrap();
        // both round to model 2 (F3) and must score identically
        assert_eq!(
            objective.evaluate(&at_exact),
            objective.evaluate(&at_fractional)
        );
    }

    #[test]
    fn test_violated_contribution_constraint_has_residual() {
        let (scheme, truth, experiments, solver) = truth_problem();
        let objective = MultiRateObjective::new(&scheme, experiments, solver).unwrap();
        assert_eq!(objective.chain_residuals(&truth), vec![0.0]);
        let violated = ParameterVector::new(vec![8.0, 120.0, 1.0, 0.3]).unwrap();
        let residuals = objective.chain_residuals(&violated);
        assert!((residuals[0] + 0.7).abs() < 1e-12);
        assert!(objective.constraint_penalty(&violated) > 0.0);
    }

    #[test]
    fn test_pathological_parameters_stay_finite() {
        let (scheme, _, experiments, solver) = truth_problem();
        let objective = MultiRateObjective::new(&scheme, experiments, solver).unwrap();
        // absurd Arrhenius combination: extreme rates from the first step
        let absurd = ParameterVector::new(vec![20.0, 10.0, 1.0, 1.0]).unwrap();
        let mse = objective.evaluate(&absurd);
        assert!(mse.is_finite());
    }

    #[test]
    fn test_deadline_failures_become_fixed_penalty() {
        let (scheme, truth, experiments, _) = truth_problem();
        // impossible budget: every heating rate must be penalized, not propagated
        let strangled = SolverSettings {
            substeps: 2_000_000,
            deadline_ms: 10,
            ..SolverSettings::default()
        };
        let objective = MultiRateObjective::new(&scheme, experiments, strangled).unwrap();
        assert_eq!(objective.evaluate(&truth), INTEGRATION_PENALTY);
    }

    #[test]
    fn test_cancelled_evaluation_is_infinite() {
        let (scheme, truth, experiments, solver) = truth_problem();
        let flag = Arc::new(AtomicBool::new(true));
        let objective = MultiRateObjective::new(&scheme, experiments, solver)
            .unwrap()
            .with_cancellation(flag);
        assert!(objective.evaluate(&truth).is_infinite());
    }

    #[test]
    fn test_objective_is_cheaply_cloneable() {
        let (scheme, truth, experiments, solver) = truth_problem();
        let objective = MultiRateObjective::new(&scheme, experiments, solver).unwrap();
        let clone = objective.clone();
        assert_eq!(objective.evaluate(&truth), clone.evaluate(&truth));
    }
}
