//! # Differential Evolution
//!
//! Population-based global optimizer (best/1/bin) used as the primary search backend.
//! Mutation factor is dithered per generation, crossover is binomial, and the whole
//! trial population of a generation is scored in parallel with rayon — the energy
//! function is only required to be `Sync`.
//!
//! Convergence follows the usual population-statistics criterion
//! `std(energies) <= atol + tol * |mean(energies)|`; the cooperative cancellation flag
//! is checked at the top of every generation, so a cancel request stops the search
//! within one generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Differential evolution settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeSettings {
    /// Population size = `population_multiplier * dimension`, floored at 5 members.
    pub population_multiplier: usize,
    pub max_generations: usize,
    /// Mutation factor dither range, sampled once per generation.
    pub mutation: (f64, f64),
    /// Binomial crossover probability.
    pub recombination: f64,
    /// Relative part of the convergence criterion.
    pub tol: f64,
    /// Absolute part of the convergence criterion.
    pub atol: f64,
    pub seed: u64,
}

impl Default for DeSettings {
    fn default() -> Self {
        Self {
            population_multiplier: 15,
            max_generations: 1000,
            mutation: (0.5, 1.0),
            recombination: 0.7,
            tol: 0.01,
            atol: 0.0,
            seed: 42,
        }
    }
}

/// Terminal report of one optimizer run.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: Vec<f64>,
    pub best_energy: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// True when the optimizer's own stopping criterion fired (as opposed to a cancel).
    pub converged: bool,
}

fn sample_within(bounds: &[(f64, f64)], rng: &mut StdRng) -> Vec<f64> {
    bounds
        .iter()
        .map(|&(lo, hi)| lo + rng.gen_range(0.0..1.0) * (hi - lo))
        .collect()
}

fn population_stats(energies: &[f64]) -> (f64, f64) {
    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let var = energies.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Runs best/1/bin differential evolution over `bounds`.
///
/// `on_improvement` fires from the sequential selection loop every time the global
/// best strictly improves, with the new energy and the improving vector.
pub fn evolve<F>(
    energy: F,
    bounds: &[(f64, f64)],
    settings: &DeSettings,
    cancel: &Arc<AtomicBool>,
    mut on_improvement: impl FnMut(f64, &[f64]),
) -> SearchOutcome
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let dim = bounds.len();
    let np = (settings.population_multiplier * dim).max(5);
    let mut rng = StdRng::seed_from_u64(settings.seed);

    let mut population: Vec<Vec<f64>> = (0..np).map(|_| sample_within(bounds, &mut rng)).collect();
    let mut energies: Vec<f64> = population.par_iter().map(|x| energy(x)).collect();
    let mut evaluations = np;

    let mut best_index = argmin(&energies);
    let mut best_energy = energies[best_index];
    let mut best = population[best_index].clone();
    if best_energy.is_finite() {
        on_improvement(best_energy, &best);
    }

    let mut iterations = 0;
    let mut converged = false;
    for generation in 0..settings.max_generations {
        if cancel.load(Ordering::Relaxed) {
            log::info!("differential evolution cancelled at generation {}", generation);
            break;
        }
        iterations = generation + 1;
        let f = if settings.mutation.1 > settings.mutation.0 {
            rng.gen_range(settings.mutation.0..settings.mutation.1)
        } else {
            settings.mutation.0
        };

        let trials: Vec<Vec<f64>> = (0..np)
            .map(|i| {
                let r1 = pick_other(np, &[i, best_index], &mut rng);
                let r2 = pick_other(np, &[i, best_index, r1], &mut rng);
                let j_rand = rng.gen_range(0..dim);
                (0..dim)
                    .map(|j| {
                        let crossed = rng.gen_range(0.0..1.0) < settings.recombination;
                        let value = if crossed || j == j_rand {
                            best[j] + f * (population[r1][j] - population[r2][j])
                        } else {
                            population[i][j]
                        };
                        value.clamp(bounds[j].0, bounds[j].1)
                    })
                    .collect()
            })
            .collect();

        let trial_energies: Vec<f64> = trials.par_iter().map(|x| energy(x)).collect();
        evaluations += np;

        for i in 0..np {
            if trial_energies[i] <= energies[i] {
                population[i] = trials[i].clone();
                energies[i] = trial_energies[i];
                if energies[i] < best_energy && energies[i].is_finite() {
                    best_energy = energies[i];
                    best = population[i].clone();
                    best_index = i;
                    on_improvement(best_energy, &best);
                }
            }
        }

        let (mean, std) = population_stats(&energies);
        if std <= settings.atol + settings.tol * mean.abs() {
            log::info!(
                "differential evolution converged after {} generations, best energy {:.6e}",
                iterations,
                best_energy
            );
            converged = true;
            break;
        }
    }

    SearchOutcome {
        best,
        best_energy,
        iterations,
        evaluations,
        converged,
    }
}

fn argmin(values: &[f64]) -> usize {
    let mut index = 0;
    for (i, v) in values.iter().enumerate() {
        if *v < values[index] {
            index = i;
        }
    }
    index
}

fn pick_other(np: usize, taken: &[usize], rng: &mut StdRng) -> usize {
    loop {
        let candidate = rng.gen_range(0..np);
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
}
