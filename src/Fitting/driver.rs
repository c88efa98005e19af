//! # Optimization Driver
//!
//! Orchestrates one fitting run: `Idle -> Running -> {Converged, Cancelled, Failed}`.
//!
//! ## Responsibilities
//!
//! - **Preconditions**: every flattened bound pair is checked (`lower <= upper`) before
//!   a single evaluation; a violation is the `Failed` terminal state, surfaced as a
//!   structured error — configuration problems are never discovered mid-run.
//! - **Best tracking**: a shared best-result cell behind one writer lock. Improvement
//!   callbacks are delivered only for strictly decreasing objective values, so every
//!   consumer observes a monotonically non-increasing best sequence.
//! - **Cancellation**: a shared flag, settable from any thread, checked at the top of
//!   every optimizer iteration and inside the objective's per-heating-rate loop.
//!   In-flight evaluations finish; no further generations start; the terminal state is
//!   `Cancelled`, not `Converged`.
//! - **Constraints**: chain equality residuals enter the search energy as a quadratic
//!   penalty; the raw residual function stays available on the objective.
//!
//! `run()` is synchronous. [`OptimizationDriver::spawn`] moves the run onto a
//! background thread and hands back the join handle together with the shared
//! cancellation token and best cell — every piece is `Send`, the caller keeps full
//! control without polling.

use crate::Fitting::annealing::{SaSettings, anneal};
use crate::Fitting::diff_evolution::{DeSettings, SearchOutcome, evolve};
use crate::Fitting::objective::{FitError, MultiRateObjective};
use crate::Fitting::parameter_vector::ParameterVector;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Search backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Algorithm {
    DifferentialEvolution(DeSettings),
    AnnealingTrials(SaSettings),
}

/// Driver lifecycle states. `Converged`, `Cancelled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Idle,
    Running,
    Converged,
    Cancelled,
    Failed,
}

/// Best-so-far record delivered to the improvement callback.
#[derive(Debug, Clone)]
pub struct BestSnapshot {
    /// Penalized objective value; equals the plain MSE sum wherever the chain
    /// constraints are satisfied.
    pub mse: f64,
    pub params: ParameterVector,
    /// Unrounded model-index block, for per-reaction-indexed UIs.
    pub model_raw: Vec<f64>,
}

/// Cooperative cancellation flag shared between the caller and the workers.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

/// Shared best-value slot with a single writer lock. Never a global: every worker gets
/// a handle to this explicit cell.
#[derive(Clone, Default)]
pub struct BestResultCell(Arc<Mutex<Option<BestSnapshot>>>);

impl BestResultCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the candidate if it strictly improves on the stored best; returns the
    /// new snapshot on improvement. Non-finite values are never recorded.
    pub fn try_improve(&self, mse: f64, params: &ParameterVector) -> Option<BestSnapshot> {
        if !mse.is_finite() {
            return None;
        }
        let mut slot = self.0.lock().expect("best-result lock poisoned");
        let improves = slot.as_ref().map(|best| mse < best.mse).unwrap_or(true);
        if !improves {
            return None;
        }
        let snapshot = BestSnapshot {
            mse,
            params: params.clone(),
            model_raw: params.model_block().to_vec(),
        };
        *slot = Some(snapshot.clone());
        Some(snapshot)
    }

    pub fn snapshot(&self) -> Option<BestSnapshot> {
        self.0.lock().expect("best-result lock poisoned").clone()
    }
}

/// Terminal result of one run.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub status: FitStatus,
    pub best_mse: f64,
    pub best_params: Option<ParameterVector>,
    pub iterations: usize,
    pub evaluations: usize,
}

type ProgressCallback = Box<dyn Fn(&BestSnapshot) + Send + Sync>;

/// One-shot optimization run over a [`MultiRateObjective`].
pub struct OptimizationDriver {
    objective: MultiRateObjective,
    algorithm: Algorithm,
    constraint_weight: f64,
    token: CancellationToken,
    best: BestResultCell,
    callback: Option<ProgressCallback>,
    state: Arc<Mutex<FitStatus>>,
}

impl OptimizationDriver {
    pub fn new(objective: MultiRateObjective, algorithm: Algorithm) -> Self {
        let token = CancellationToken::new();
        Self {
            objective: objective.with_cancellation(token.flag()),
            algorithm,
            constraint_weight: 1e3,
            token,
            best: BestResultCell::new(),
            callback: None,
            state: Arc::new(Mutex::new(FitStatus::Idle)),
        }
    }

    /// Weight of the quadratic chain-constraint penalty in the search energy.
    pub fn with_constraint_weight(mut self, weight: f64) -> Self {
        self.constraint_weight = weight;
        self
    }

    /// Installs the improvement callback.
    pub fn on_improvement(mut self, callback: impl Fn(&BestSnapshot) + Send + Sync + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Shared cancellation handle; settable from any thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Shared best-result cell; readable from any thread while the run progresses.
    pub fn best_cell(&self) -> BestResultCell {
        self.best.clone()
    }

    pub fn state(&self) -> FitStatus {
        *self.state.lock().expect("driver state lock poisoned")
    }

    fn set_state(&self, status: FitStatus) {
        *self.state.lock().expect("driver state lock poisoned") = status;
    }

    /// Fast precondition pass over the flattened optimizer bounds.
    fn check_bounds(&self) -> Result<Vec<(f64, f64)>, FitError> {
        let bounds = self.objective.bounds();
        for (index, &(lower, upper)) in bounds.iter().enumerate() {
            if !(lower <= upper) {
                return Err(FitError::InvalidBound { index, lower, upper });
            }
        }
        Ok(bounds)
    }

    /// Runs the search to a terminal state. Configuration errors fail before the first
    /// evaluation and leave the driver in `Failed`.
    pub fn run(&self) -> Result<FitOutcome, FitError> {
        self.set_state(FitStatus::Running);
        let bounds = match self.check_bounds() {
            Ok(bounds) => bounds,
            Err(error) => {
                log::error!("optimization rejected before start: {}", error);
                self.set_state(FitStatus::Failed);
                return Err(error);
            }
        };
        log::info!(
            "starting optimization: {} parameters, {} chains, {:?}",
            bounds.len(),
            self.objective.chains().len(),
            self.algorithm
        );

        let objective = &self.objective;
        let weight = self.constraint_weight;
        let energy = move |x: &[f64]| match ParameterVector::new(x.to_vec()) {
            Ok(params) => {
                objective.evaluate(&params) + weight * objective.constraint_penalty(&params)
            }
            Err(_) => f64::INFINITY,
        };

        let best = &self.best;
        let callback = &self.callback;
        let on_improvement = |mse: f64, x: &[f64]| {
            let Ok(params) = ParameterVector::new(x.to_vec()) else {
                return;
            };
            if let Some(snapshot) = best.try_improve(mse, &params) {
                log::info!("new best objective {:.6e}", snapshot.mse);
                if let Some(cb) = callback {
                    cb(&snapshot);
                }
            }
        };

        let outcome = match &self.algorithm {
            Algorithm::DifferentialEvolution(settings) => {
                evolve(energy, &bounds, settings, &self.token.flag(), on_improvement)
            }
            Algorithm::AnnealingTrials(settings) => {
                anneal(energy, &bounds, settings, &self.token.flag(), on_improvement)
            }
        };

        Ok(self.finish(outcome))
    }

    fn finish(&self, outcome: SearchOutcome) -> FitOutcome {
        let status = if self.token.is_cancelled() {
            FitStatus::Cancelled
        } else {
            FitStatus::Converged
        };
        self.set_state(status);
        log::info!(
            "optimization finished: {:?} after {} iterations / {} evaluations, best {:.6e}",
            status,
            outcome.iterations,
            outcome.evaluations,
            outcome.best_energy
        );
        let best_params = self.best.snapshot().map(|s| s.params);
        FitOutcome {
            status,
            best_mse: outcome.best_energy,
            best_params,
            iterations: outcome.iterations,
            evaluations: outcome.evaluations,
        }
    }

    /// Moves the run onto a background worker thread. Returns the join handle together
    /// with the cancellation token and best cell the caller keeps.
    pub fn spawn(self) -> (JoinHandle<Result<FitOutcome, FitError>>, CancellationToken, BestResultCell) {
        let token = self.token.clone();
        let cell = self.best.clone();
        let handle = std::thread::spawn(move || self.run());
        (handle, token, cell)
    }
}
