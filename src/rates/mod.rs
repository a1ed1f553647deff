//! Voltage dependent opening and closing rates for gating variables.
//!
//! Every rate in the built-in models is one of a handful of shapes, so the
//! rates are data ([`RateLaw`]) rather than closures. This keeps the model
//! catalog a plain `'static` table and lets the singular shapes be evaluated
//! with an explicit case split near their removable singularity.

use crate::error::RateEvaluationError;


/// Half width (in units of `u = (V - V0) / k`) of the neighborhood around a
/// linoid singularity where the series expansion replaces the closed form
pub const LINOID_SERIES_EPSILON: f64 = 1e-6;

/// A rate function of membrane potential (mV) returning a rate (1/ms)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLaw {
    /// `a * exp(slope * (V - v0))`
    Exponential { a: f64, slope: f64, v0: f64 },
    /// `a / (1 + exp(slope * (V - v0)))`
    Sigmoid { a: f64, slope: f64, v0: f64 },
    /// `a * (V - v0) / (1 - exp(-(V - v0) / k))`, removable singularity at
    /// `V = v0` with limit `a * k`, a negative `k` gives the
    /// `x / (exp(x / k') - 1)` shape
    Linoid { a: f64, v0: f64, k: f64 },
    /// Sum of the listed rate laws
    Sum(&'static [RateLaw]),
}

impl RateLaw {
    /// Evaluates the rate at voltage `v`, no finiteness checks are applied
    pub fn evaluate(&self, v: f64) -> f64 {
        match self {
            RateLaw::Exponential { a, slope, v0 } => a * (slope * (v - v0)).exp(),
            RateLaw::Sigmoid { a, slope, v0 } => a / (1. + (slope * (v - v0)).exp()),
            RateLaw::Linoid { a, v0, k } => linoid(*a, v - v0, *k),
            RateLaw::Sum(terms) => terms.iter().map(|term| term.evaluate(v)).sum(),
        }
    }

    /// Voltage of the removable singularity, if the law has one
    pub fn singular_voltage(&self) -> Option<f64> {
        match self {
            RateLaw::Linoid { v0, .. } => Some(*v0),
            _ => None,
        }
    }

    /// Value of the law at its singular voltage
    pub fn singular_limit(&self) -> Option<f64> {
        match self {
            RateLaw::Linoid { a, k, .. } => Some(a * k),
            _ => None,
        }
    }
}

// x / (1 - exp(-x / k)) = k * u / (1 - exp(-u)) with u = x / k,
// and u / (1 - exp(-u)) = 1 + u / 2 + u^2 / 12 - O(u^4)
fn linoid(a: f64, x: f64, k: f64) -> f64 {
    let u = x / k;

    if u.abs() < LINOID_SERIES_EPSILON {
        a * k * (1. + u / 2. + u * u / 12.)
    } else {
        a * x / -(-u).exp_m1()
    }
}

/// A gating variable with its opening (alpha) and closing (beta) rates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatingVariable {
    /// Name used in trajectories and errors
    pub name: &'static str,
    /// Opening rate
    pub alpha: RateLaw,
    /// Closing rate
    pub beta: RateLaw,
}

impl GatingVariable {
    /// Returns `(alpha, beta)` at voltage `v`, failing if `v` or either rate
    /// is not finite
    pub fn rates(&self, v: f64) -> Result<(f64, f64), RateEvaluationError> {
        let err = RateEvaluationError { gate: self.name, voltage: v };

        if !v.is_finite() {
            return Err(err);
        }

        let alpha = self.alpha.evaluate(v);
        let beta = self.beta.evaluate(v);

        if alpha.is_finite() && beta.is_finite() {
            Ok((alpha, beta))
        } else {
            Err(err)
        }
    }

    /// Gating derivative `alpha * (1 - g) - beta * g`
    pub fn derivative(&self, v: f64, g: f64) -> Result<f64, RateEvaluationError> {
        let (alpha, beta) = self.rates(v)?;

        Ok(alpha * (1. - g) - beta * g)
    }

    /// Steady state value `alpha / (alpha + beta)` at voltage `v`
    pub fn steady_state(&self, v: f64) -> Result<f64, RateEvaluationError> {
        let (alpha, beta) = self.rates(v)?;

        Ok(alpha / (alpha + beta))
    }

    /// Time constant `1 / (alpha + beta)` at voltage `v` (ms)
    pub fn time_constant(&self, v: f64) -> Result<f64, RateEvaluationError> {
        let (alpha, beta) = self.rates(v)?;

        Ok(1. / (alpha + beta))
    }
}
