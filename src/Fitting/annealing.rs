//! # Annealing Trial Search
//!
//! Trial-based alternative to differential evolution: a simulated-annealing walk over
//! the bounded parameter box. Each trial perturbs one coordinate of the incumbent,
//! accepts by the Metropolis criterion, and cools geometrically. Much cheaper per
//! iteration than a population generation, useful for quick interactive refinement
//! around an already decent vector.
//!
//! Shares the [`SearchOutcome`](crate::Fitting::diff_evolution::SearchOutcome) report
//! and the cooperative-cancellation contract with the evolution backend: the flag is
//! checked on every trial.

use crate::Fitting::diff_evolution::SearchOutcome;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Annealing settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaSettings {
    pub trials: usize,
    pub initial_temp: f64,
    /// Perturbation scale as a fraction of each coordinate's bound range.
    pub perturbation: f64,
    pub seed: u64,
}

impl Default for SaSettings {
    fn default() -> Self {
        Self {
            trials: 5000,
            initial_temp: 1.0,
            perturbation: 0.1,
            seed: 42,
        }
    }
}

/// Runs the annealing walk. `on_improvement` fires on every strict improvement of the
/// best-so-far energy.
pub fn anneal<F>(
    energy: F,
    bounds: &[(f64, f64)],
    settings: &SaSettings,
    cancel: &Arc<AtomicBool>,
    mut on_improvement: impl FnMut(f64, &[f64]),
) -> SearchOutcome
where
    F: Fn(&[f64]) -> f64,
{
    let dim = bounds.len();
    let mut rng = StdRng::seed_from_u64(settings.seed);

    let mut current: Vec<f64> = bounds.iter().map(|&(lo, hi)| 0.5 * (lo + hi)).collect();
    let mut current_energy = energy(&current);
    let mut evaluations = 1;

    let mut best = current.clone();
    let mut best_energy = current_energy;
    if best_energy.is_finite() {
        on_improvement(best_energy, &best);
    }

    let mut temperature = settings.initial_temp;
    let cooling = (settings.initial_temp / 0.01).powf(1.0 / settings.trials.max(1) as f64);

    let mut iterations = 0;
    let mut cancelled = false;
    for trial in 0..settings.trials {
        if cancel.load(Ordering::Relaxed) {
            log::info!("annealing search cancelled at trial {}", trial);
            cancelled = true;
            break;
        }
        iterations = trial + 1;

        let j = rng.gen_range(0..dim);
        let (lo, hi) = bounds[j];
        let old = current[j];
        let step = settings.perturbation * (hi - lo);
        current[j] = (old + rng.gen_range(-1.0..1.0) * step).clamp(lo, hi);

        let trial_energy = energy(&current);
        evaluations += 1;
        let delta = trial_energy - current_energy;
        if delta < 0.0 || rng.gen_range(0.0..1.0) < (-delta / temperature).exp() {
            current_energy = trial_energy;
            if current_energy < best_energy && current_energy.is_finite() {
                best_energy = current_energy;
                best = current.clone();
                on_improvement(best_energy, &best);
            }
        } else {
            current[j] = old;
        }
        temperature /= cooling;
    }

    SearchOutcome {
        best,
        best_energy,
        iterations,
        evaluations,
        converged: !cancelled,
    }
}
