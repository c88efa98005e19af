//! # Solid-State Kinetic Model Library
//!
//! Numeric library of solid-state kinetic model functions used by the reaction-network
//! ODE kernel and by diagnostic/plotting consumers. Every model is expressed in terms of
//! the residual concentration `e = 1 - a` (where `a` is the degree of conversion), because
//! the network state vector tracks per-species concentrations directly.
//!
//! ## Purpose
//!
//! The module is designed for:
//! - **Rate evaluation**: differential form `f(e)` consumed by the ODE right-hand-side
//! - **Diagnostics**: integral form `g(e)` for master-plot style comparison of models
//! - **Model selection**: a stable integer index per model, so a continuous optimizer
//!   can treat the model choice as one more (rounded) parameter
//!
//! ## Available Kinetic Models
//! - **Nucleation & Growth**: A2, A3, A4 (Avrami-Erofeev)
//! - **Diffusion**: D1, D2, D3, D4 (1D, 2D, 3D Jander, Ginstling-Brounshtein)
//! - **Reaction Order**: F1, F2, F3 (first, second, third order)
//! - **Contracting Geometry**: R2, R3 (contracting area/volume)
//! - **Power Law**: P2, P3, P2_3
//!
//! ## Index Contract
//!
//! The discriminant of [`KineticModelId`] is the single source of truth for model
//! dispatch: `0=A2 .. 14=P2_3`. The same enumeration backs both `f_e` and `g_e`, so the
//! differential and integral tables cannot drift apart. An index outside the table falls
//! back to the identity model (`f(e)=e`, `g(e)=1-e`) instead of failing: rounded optimizer
//! values may momentarily leave the valid range and must never abort a run.
//!
//! ## Numerical Contract
//!
//! - `e` is clamped to `[1e-10, 1-1e-10]` before powers/roots and to the looser
//!   `[1e-6, 1-1e-6]` before any `ln` (the logarithm is far more sensitive near 0)
//! - every result that comes out non-finite or negative is replaced by `0.0`:
//!   kinetic rates cannot be negative and a single NaN derivative would silently
//!   poison the whole trajectory
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use KiFit::Kinetics::kinetic_models::{KineticModelId, f_e};
//!
//! let rate_factor = f_e(KineticModelId::F2.as_index() as i64, 0.7); // 0.49
//! KineticModelId::pretty_print();
//! ```

use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// Clamp applied to `e` before powers and roots.
pub const EPS_POW: f64 = 1e-10;
/// Looser clamp applied to `e` before any logarithm.
pub const EPS_LN: f64 = 1e-6;

fn clamp_unit(e: f64, eps: f64) -> f64 {
    e.clamp(eps, 1.0 - eps)
}

/// `-ln(e)` with the logarithm clamp; positive for e in (0,1).
fn neg_ln(e: f64) -> f64 {
    -clamp_unit(e, EPS_LN).ln()
}

/// 2*e*(-ln(e))^(1/2)
pub fn a2(e: f64) -> f64 {
    2.0 * e * neg_ln(e).powf(0.5)
}
/// 3*e*(-ln(e))^(2/3)
pub fn a3(e: f64) -> f64 {
    3.0 * e * neg_ln(e).powf(2.0 / 3.0)
}
/// 4*e*(-ln(e))^(3/4)
pub fn a4(e: f64) -> f64 {
    4.0 * e * neg_ln(e).powf(3.0 / 4.0)
}
/// 1/(2*(1-e))
pub fn d1(e: f64) -> f64 {
    0.5 / (1.0 - e)
}
/// (-ln(e))^(-1)
pub fn d2(e: f64) -> f64 {
    1.0 / neg_ln(e)
}
/// (3/2)*e^(2/3)*(1-e^(1/3))^(-1)
pub fn d3(e: f64) -> f64 {
    1.5 * e.powf(2.0 / 3.0) / (1.0 - e.powf(1.0 / 3.0))
}
/// (3/2)*(e^(-1/3)-1)^(-1)
pub fn d4(e: f64) -> f64 {
    1.5 / (e.powf(-1.0 / 3.0) - 1.0)
}
/// e
pub fn f1(e: f64) -> f64 {
    e
}
/// e^2
pub fn f2(e: f64) -> f64 {
    e * e
}
/// e^3
pub fn f3(e: f64) -> f64 {
    e * e * e
}
/// 2*e^(1/2)
pub fn r2(e: f64) -> f64 {
    2.0 * e.powf(0.5)
}
/// 3*e^(2/3)
pub fn r3(e: f64) -> f64 {
    3.0 * e.powf(2.0 / 3.0)
}
/// 2*(1-e)^(1/2)
pub fn p2(e: f64) -> f64 {
    2.0 * (1.0 - e).powf(0.5)
}
/// 3*(1-e)^(2/3)
pub fn p3(e: f64) -> f64 {
    3.0 * (1.0 - e).powf(2.0 / 3.0)
}
/// (2/3)*(1-e)^(-1/2)
pub fn p2_3(e: f64) -> f64 {
    (2.0 / 3.0) * (1.0 - e).powf(-0.5)
}

/// Enumeration of the supported solid-state kinetic models.
///
/// The discriminant is the stable model index used everywhere a model choice is
/// represented numerically (parameter vectors, dispatch tables, serialized schemes).
/// Do not reorder variants; append new models at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum KineticModelId {
    A2 = 0,
    A3 = 1,
    A4 = 2,
    D1 = 3,
    D2 = 4,
    D3 = 5,
    D4 = 6,
    F1 = 7,
    F2 = 8,
    F3 = 9,
    R2 = 10,
    R3 = 11,
    P2 = 12,
    P3 = 13,
    P2_3 = 14,
}

/// Number of models in the table.
pub const MODEL_COUNT: usize = 15;

impl KineticModelId {
    pub fn as_index(&self) -> usize {
        *self as usize
    }

    /// Reverse of [`as_index`](Self::as_index); `None` for anything outside the table.
    pub fn from_index(index: i64) -> Option<Self> {
        if index < 0 {
            return None;
        }
        KineticModelId::iter().find(|m| m.as_index() as i64 == index)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KineticModelId::A2 => "A2",
            KineticModelId::A3 => "A3",
            KineticModelId::A4 => "A4",
            KineticModelId::D1 => "D1",
            KineticModelId::D2 => "D2",
            KineticModelId::D3 => "D3",
            KineticModelId::D4 => "D4",
            KineticModelId::F1 => "F1",
            KineticModelId::F2 => "F2",
            KineticModelId::F3 => "F3",
            KineticModelId::R2 => "R2",
            KineticModelId::R3 => "R3",
            KineticModelId::P2 => "P2",
            KineticModelId::P3 => "P3",
            KineticModelId::P2_3 => "P2_3",
        }
    }

    pub fn from_str(name: &str) -> Option<Self> {
        KineticModelId::iter().find(|m| m.as_str() == name)
    }

    /// Differential form `f(e)` before the non-negativity/finiteness post-condition.
    pub fn f(&self, e: f64) -> f64 {
        let e = clamp_unit(e, EPS_POW);
        match self {
            KineticModelId::A2 => a2(e),
            KineticModelId::A3 => a3(e),
            KineticModelId::A4 => a4(e),
            KineticModelId::D1 => d1(e),
            KineticModelId::D2 => d2(e),
            KineticModelId::D3 => d3(e),
            KineticModelId::D4 => d4(e),
            KineticModelId::F1 => f1(e),
            KineticModelId::F2 => f2(e),
            KineticModelId::F3 => f3(e),
            KineticModelId::R2 => r2(e),
            KineticModelId::R3 => r3(e),
            KineticModelId::P2 => p2(e),
            KineticModelId::P3 => p3(e),
            KineticModelId::P2_3 => p2_3(e),
        }
    }

    /// Integral form `g(e)` of the same model, `g' = 1/f` with respect to conversion.
    pub fn g(&self, e: f64) -> f64 {
        let e = clamp_unit(e, EPS_POW);
        match self {
            KineticModelId::A2 => neg_ln(e).powf(0.5),
            KineticModelId::A3 => neg_ln(e).powf(1.0 / 3.0),
            KineticModelId::A4 => neg_ln(e).powf(0.25),
            KineticModelId::D1 => (1.0 - e) * (1.0 - e),
            KineticModelId::D2 => (1.0 - e) - e * neg_ln(e),
            KineticModelId::D3 => {
                let t = 1.0 - e.powf(1.0 / 3.0);
                t * t
            }
            KineticModelId::D4 => 1.0 - 2.0 * (1.0 - e) / 3.0 - e.powf(2.0 / 3.0),
            KineticModelId::F1 => neg_ln(e),
            KineticModelId::F2 => 1.0 / e - 1.0,
            KineticModelId::F3 => (e.powf(-2.0) - 1.0) / 2.0,
            KineticModelId::R2 => 1.0 - e.powf(0.5),
            KineticModelId::R3 => 1.0 - e.powf(1.0 / 3.0),
            KineticModelId::P2 => (1.0 - e).powf(0.5),
            KineticModelId::P3 => (1.0 - e).powf(1.0 / 3.0),
            KineticModelId::P2_3 => (1.0 - e).powf(1.5),
        }
    }

    pub fn formula(&self) -> String {
        match self {
            KineticModelId::A2 => "2*e*(-ln(e))^(1/2)".to_string(),
            KineticModelId::A3 => "3*e*(-ln(e))^(2/3)".to_string(),
            KineticModelId::A4 => "4*e*(-ln(e))^(3/4)".to_string(),
            KineticModelId::D1 => "1/(2*(1-e))".to_string(),
            KineticModelId::D2 => "(-ln(e))^(-1)".to_string(),
            KineticModelId::D3 => "1.5*e^(2/3)*(1-e^(1/3))^(-1)".to_string(),
            KineticModelId::D4 => "1.5*(e^(-1/3)-1)^(-1)".to_string(),
            KineticModelId::F1 => "e".to_string(),
            KineticModelId::F2 => "e^2".to_string(),
            KineticModelId::F3 => "e^3".to_string(),
            KineticModelId::R2 => "2*e^(1/2)".to_string(),
            KineticModelId::R3 => "3*e^(2/3)".to_string(),
            KineticModelId::P2 => "2*(1-e)^(1/2)".to_string(),
            KineticModelId::P3 => "3*(1-e)^(2/3)".to_string(),
            KineticModelId::P2_3 => "(2/3)*(1-e)^(-1/2)".to_string(),
        }
    }

    pub fn integral_formula(&self) -> String {
        match self {
            KineticModelId::A2 => "(-ln(e))^(1/2)".to_string(),
            KineticModelId::A3 => "(-ln(e))^(1/3)".to_string(),
            KineticModelId::A4 => "(-ln(e))^(1/4)".to_string(),
            KineticModelId::D1 => "(1-e)^2".to_string(),
            KineticModelId::D2 => "(1-e)+e*ln(e)".to_string(),
            KineticModelId::D3 => "(1-e^(1/3))^2".to_string(),
            KineticModelId::D4 => "1-(2/3)*(1-e)-e^(2/3)".to_string(),
            KineticModelId::F1 => "-ln(e)".to_string(),
            KineticModelId::F2 => "1/e-1".to_string(),
            KineticModelId::F3 => "(e^(-2)-1)/2".to_string(),
            KineticModelId::R2 => "1-e^(1/2)".to_string(),
            KineticModelId::R3 => "1-e^(1/3)".to_string(),
            KineticModelId::P2 => "(1-e)^(1/2)".to_string(),
            KineticModelId::P3 => "(1-e)^(1/3)".to_string(),
            KineticModelId::P2_3 => "(1-e)^(3/2)".to_string(),
        }
    }

    /// Prints the model catalogue (index, code, f and g formulas) as a table.
    pub fn pretty_print() {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("index"),
            Cell::new("code"),
            Cell::new("f(e)"),
            Cell::new("g(e)"),
        ]));
        for model in KineticModelId::iter() {
            table.add_row(Row::new(vec![
                Cell::new(&model.as_index().to_string()),
                Cell::new(model.as_str()),
                Cell::new(&model.formula()),
                Cell::new(&model.integral_formula()),
            ]));
        }
        table.printstd();
    }
}

/// Differential model dispatch by integer index. Total: any index outside the table is
/// evaluated with the identity model, and every non-finite or negative result is
/// replaced by `0.0`.
pub fn f_e(model_index: i64, e: f64) -> f64 {
    let value = match KineticModelId::from_index(model_index) {
        Some(model) => model.f(e),
        None => clamp_unit(e, EPS_POW),
    };
    if !value.is_finite() || value < 0.0 {
        0.0
    } else {
        value
    }
}

/// Integral model dispatch by integer index, with the same fallback and post-condition
/// as [`f_e`]. The identity fallback is the conversion itself, `g(e) = 1 - e`.
pub fn g_e(model_index: i64, e: f64) -> f64 {
    let value = match KineticModelId::from_index(model_index) {
        Some(model) => model.g(e),
        None => 1.0 - clamp_unit(e, EPS_POW),
    };
    if !value.is_finite() || value < 0.0 {
        0.0
    } else {
        value
    }
}

/////////////////////////////////////////TESTS/////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_every_model_is_total_on_unit_interval() {
        let grid: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();
        for model in KineticModelId::iter() {
            let index = model.as_index() as i64;
            for &e in &grid {
                let f = f_e(index, e);
                assert!(f.is_finite(), "f non-finite for {:?} at e={}", model, e);
                assert!(f >= 0.0, "f negative for {:?} at e={}", model, e);
                let g = g_e(index, e);
                assert!(g.is_finite(), "g non-finite for {:?} at e={}", model, e);
                assert!(g >= 0.0, "g negative for {:?} at e={}", model, e);
            }
        }
    }

    #[test]
    fn test_invalid_index_falls_back_to_identity() {
        for bad in [-1i64, 15, 99, 1000] {
            assert_relative_eq!(f_e(bad, 0.5), 0.5);
            assert_relative_eq!(g_e(bad, 0.5), 0.5);
        }
        // identity fallback still honors the clamp at the edges
        assert!(f_e(-1, 0.0) > 0.0);
        assert!(f_e(99, 1.5) < 1.0);
    }

    #[test]
    fn test_known_values() {
        assert_relative_eq!(f_e(KineticModelId::F1.as_index() as i64, 0.5), 0.5);
        assert_relative_eq!(f_e(KineticModelId::F2.as_index() as i64, 0.5), 0.25);
        assert_relative_eq!(f_e(KineticModelId::F3.as_index() as i64, 0.5), 0.125);
        // A2 at e = exp(-1): 2*exp(-1)*1
        let e = (-1.0f64).exp();
        assert_relative_eq!(
            f_e(KineticModelId::A2.as_index() as i64, e),
            2.0 * e,
            epsilon = 1e-9
        );
        // R2 at e = 0.25: 2*0.5
        assert_relative_eq!(f_e(KineticModelId::R2.as_index() as i64, 0.25), 1.0);
    }

    #[test]
    fn test_integral_forms() {
        assert_relative_eq!(
            g_e(KineticModelId::F1.as_index() as i64, (-2.0f64).exp()),
            2.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(g_e(KineticModelId::F2.as_index() as i64, 0.5), 1.0);
        assert_relative_eq!(g_e(KineticModelId::D1.as_index() as i64, 0.4), 0.36);
        assert_relative_eq!(g_e(KineticModelId::R2.as_index() as i64, 0.25), 0.5);
        // unreacted material: conversion-like g must start near zero (the ln clamp
        // leaves the Avrami forms at ~(1e-6)^(1/4) at the boundary)
        for model in KineticModelId::iter() {
            let g0 = g_e(model.as_index() as i64, 1.0);
            assert!(g0 < 0.05, "g at e=1 should be ~0 for {:?}, got {}", model, g0);
        }
    }

    #[test]
    fn test_index_round_trip_and_names() {
        for model in KineticModelId::iter() {
            let index = model.as_index() as i64;
            assert_eq!(KineticModelId::from_index(index), Some(model));
            assert_eq!(KineticModelId::from_str(model.as_str()), Some(model));
            assert!(!model.formula().is_empty());
            assert!(!model.integral_formula().is_empty());
        }
        assert_eq!(KineticModelId::from_index(-3), None);
        assert_eq!(KineticModelId::from_index(MODEL_COUNT as i64), None);
        assert_eq!(KineticModelId::from_str("XX"), None);
    }

    #[test]
    fn test_rate_never_negative_even_where_formula_dips() {
        // P2_3 diverges as e -> 1 and D4 denominator vanishes; the clamps plus the
        // post-condition must keep the dispatched result finite and non-negative.
        assert!(f_e(KineticModelId::P2_3.as_index() as i64, 1.0).is_finite());
        assert!(f_e(KineticModelId::D4.as_index() as i64, 1.0).is_finite());
        assert!(f_e(KineticModelId::D2.as_index() as i64, 1.0) >= 0.0);
    }

    #[test]
    fn test_pretty_print_does_not_panic() {
        KineticModelId::pretty_print();
    }
}

#[cfg(test)]
mod serde_tests {
    use super::*;

    #[test]
    fn test_model_id_serializes_as_name() {
        let json = serde_json::to_string(&KineticModelId::F2).unwrap();
        assert_eq!(json, "\"F2\"");
        let back: KineticModelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, KineticModelId::F2);
    }
}
