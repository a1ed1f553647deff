//! Adaptive ODE integration with dense output at requested sample times.
//!
//! Three methods are available:
//!
//! - [`Method::ExponentialMidpoint`], the default, a second order exponential
//!   (Rush-Larsen type) Runge-Kutta scheme for systems written as
//!   `y' = a(y) - b(y) * y` with `b >= 0`. Every update is a convex combination
//!   of the old value and the local fixed point `a / b`, so it is stable for
//!   arbitrarily stiff gate kinetics and keeps gating variables inside [0, 1].
//!
//! - [`Method::DormandPrince`], the explicit 5(4) pair with a fourth order
//!   continuous extension, accurate for non-stiff runs.
//!
//! - [`Method::Auto`], Dormand-Prince with a stiffness detector that hands the
//!   rest of the run to the exponential scheme once the dominant eigenvalue
//!   leaves the explicit stability region.
//!
//! The explicit steps have no built-in bound on the state, so a step whose end
//! point or any dense output sample fails [`OdeSystem::is_admissible`] is
//! rejected and retried with a smaller step, never clamped.

use std::{
    str::FromStr,
    sync::{atomic::{AtomicBool, Ordering}, Arc},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use crate::{
    error::{FailureReason, IntegrationFailure, InvalidParameterError, MembraneSimulationError},
    trajectory::Trajectory,
};


/// Right hand side of `dy/dt = f(t, y)`
pub trait OdeSystem {
    /// Number of state variables
    fn dimension(&self) -> usize;

    /// Writes `f(t, y)` into `dydt`, both of length `dimension()`
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), MembraneSimulationError>;

    /// Whether `y` lies in the region the exact solution never leaves, steps
    /// and dense output samples outside it are rejected
    fn is_admissible(&self, _y: &[f64]) -> bool {
        true
    }
}

/// A system whose components each satisfy `y_i' = a_i(y) - b_i(y) * y_i` with `b_i >= 0`
pub trait QuasiLinearSystem: OdeSystem {
    /// Writes the source terms `a` and decay rates `b` at `(t, y)`
    fn split(&self, t: f64, y: &[f64], a: &mut [f64], b: &mut [f64]) -> Result<(), MembraneSimulationError>;
}

/// Integration scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    ExponentialMidpoint,
    DormandPrince,
    Auto,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exponential_midpoint" => Ok(Method::ExponentialMidpoint),
            "dormand_prince" => Ok(Method::DormandPrince),
            "auto" => Ok(Method::Auto),
            _ => Err(format!("unknown integration method {:?}", s)),
        }
    }
}

/// Tolerances and step limits for the adaptive solvers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub method: Method,
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
    /// First step size (ms), `0` picks one from the initial derivative
    pub initial_step: f64,
    /// Smallest step size allowed before giving up (ms)
    pub min_step: f64,
    /// Largest step size (ms)
    pub max_step: f64,
    /// Maximum number of attempted steps, accepted and rejected
    pub max_steps: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            method: Method::default(),
            rtol: 1e-6,
            atol: 1e-8,
            initial_step: 0.,
            min_step: 1e-12,
            max_step: f64::INFINITY,
            max_steps: 500_000,
        }
    }
}

impl SolverOptions {
    /// Checks that the options describe a usable solver
    pub fn validate(&self) -> Result<(), InvalidParameterError> {
        if !self.rtol.is_finite() || self.rtol <= 0. {
            return Err(InvalidParameterError::SolverOption("rtol must be finite and positive"));
        }
        if !self.atol.is_finite() || self.atol <= 0. {
            return Err(InvalidParameterError::SolverOption("atol must be finite and positive"));
        }
        if !self.initial_step.is_finite() || self.initial_step < 0. {
            return Err(InvalidParameterError::SolverOption("initial_step must be finite and non-negative"));
        }
        if !(self.min_step > 0.) || !(self.min_step <= self.max_step) {
            return Err(InvalidParameterError::SolverOption("min_step must be positive and at most max_step"));
        }
        if self.max_steps == 0 {
            return Err(InvalidParameterError::SolverOption("max_steps must be positive"));
        }

        Ok(())
    }
}

/// Counters describing a finished integration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SolverStats {
    pub accepted: usize,
    pub rejected: usize,
    pub rhs_evaluations: usize,
    /// Whether `Method::Auto` switched to the exponential scheme
    pub switched_to_stiff: bool,
}

/// Shared flag checked between integrator steps, set it to abandon a run
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.;

// Dormand-Prince 5(4) tableau
const C2: f64 = 1. / 5.;
const C3: f64 = 3. / 10.;
const C4: f64 = 4. / 5.;
const C5: f64 = 8. / 9.;
const A21: f64 = 1. / 5.;
const A31: f64 = 3. / 40.;
const A32: f64 = 9. / 40.;
const A41: f64 = 44. / 45.;
const A42: f64 = -56. / 15.;
const A43: f64 = 32. / 9.;
const A51: f64 = 19372. / 6561.;
const A52: f64 = -25360. / 2187.;
const A53: f64 = 64448. / 6561.;
const A54: f64 = -212. / 729.;
const A61: f64 = 9017. / 3168.;
const A62: f64 = -355. / 33.;
const A63: f64 = 46732. / 5247.;
const A64: f64 = 49. / 176.;
const A65: f64 = -5103. / 18656.;
const A71: f64 = 35. / 384.;
const A73: f64 = 500. / 1113.;
const A74: f64 = 125. / 192.;
const A75: f64 = -2187. / 6784.;
const A76: f64 = 11. / 84.;
// fifth minus embedded fourth order weights
const E1: f64 = 71. / 57600.;
const E3: f64 = -71. / 16695.;
const E4: f64 = 71. / 1920.;
const E5: f64 = -17253. / 339200.;
const E6: f64 = 22. / 525.;
const E7: f64 = -1. / 40.;
// continuous extension
const D1: f64 = -12715105075. / 11282082432.;
const D3: f64 = 87487479700. / 32700410799.;
const D4: f64 = -10690763975. / 1880347072.;
const D5: f64 = 701980252875. / 199316789632.;
const D6: f64 = -1453857185. / 822651844.;
const D7: f64 = 69997945. / 29380423.;

// h * |lambda| bound of the Dormand-Prince stability region along the negative axis
const STIFFNESS_BOUND: f64 = 3.25;
const STIFF_STEPS_TO_SWITCH: usize = 15;
const NON_STIFF_STEPS_TO_RESET: usize = 6;

// rate errors at trial stages reject the step instead of failing the run,
// only an error at an accepted state is reported
fn trial_rhs<S: OdeSystem>(sys: &S, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<bool, MembraneSimulationError> {
    match sys.rhs(t, y, dydt) {
        Ok(()) => Ok(true),
        Err(MembraneSimulationError::RateEvaluation(err)) => {
            trace!(gate = err.gate, voltage = err.voltage, "rate evaluation failed at trial stage");
            Ok(false)
        },
        Err(err) => Err(err),
    }
}

fn error_norm(y: &[f64], y_new: &[f64], err: &[f64], options: &SolverOptions) -> f64 {
    let sum: f64 = (0..y.len())
        .map(|i| {
            let scale = options.atol + options.rtol * y[i].abs().max(y_new[i].abs());
            (err[i] / scale).powi(2)
        })
        .sum();

    (sum / y.len().max(1) as f64).sqrt()
}

/// Exponential Euler update of `y' = a - b * y` over `h` with frozen `a` and `b`
pub fn exponential_euler(y: f64, a: f64, b: f64, h: f64) -> f64 {
    let z = b * h;

    if z > 1e-12 {
        let fixed_point = a / b;
        let decayed = (-z).exp();
        let relaxed = -(-z).exp_m1();

        // exact solution lies between y and the fixed point, clip rounding
        (relaxed * fixed_point + decayed * y)
            .max(y.min(fixed_point))
            .min(y.max(fixed_point))
    } else {
        y + h * (a - b * y)
    }
}

#[derive(Debug)]
struct DormandPrinceStepper {
    k: [Vec<f64>; 7],
    y_stage: Vec<f64>,
    y_stiff: Vec<f64>,
    // whether k[0] holds f at the current state
    fsal: bool,
    dense: [Vec<f64>; 5],
    stiff_steps: usize,
    non_stiff_steps: usize,
}

impl DormandPrinceStepper {
    fn new(n: usize) -> Self {
        DormandPrinceStepper {
            k: std::array::from_fn(|_| vec![0.; n]),
            y_stage: vec![0.; n],
            y_stiff: vec![0.; n],
            fsal: false,
            dense: std::array::from_fn(|_| vec![0.; n]),
            stiff_steps: 0,
            non_stiff_steps: 0,
        }
    }

    fn stage<S: OdeSystem>(
        &mut self,
        sys: &S,
        t: f64,
        y: &[f64],
        h: f64,
        weights: &[(usize, f64)],
        target: usize,
    ) -> Result<bool, MembraneSimulationError> {
        for i in 0..y.len() {
            self.y_stage[i] = y[i] + h * weights.iter()
                .map(|(stage, weight)| weight * self.k[*stage][i])
                .sum::<f64>();
        }

        trial_rhs(sys, t, &self.y_stage, &mut self.k[target])
    }

    fn attempt<S: OdeSystem>(
        &mut self,
        sys: &S,
        t: f64,
        y: &[f64],
        h: f64,
        y_new: &mut [f64],
        options: &SolverOptions,
        stats: &mut SolverStats,
    ) -> Result<f64, MembraneSimulationError> {
        let n = y.len();

        if !self.fsal {
            sys.rhs(t, y, &mut self.k[0])?;
            stats.rhs_evaluations += 1;
            self.fsal = true;
        }

        let stages: [(f64, &[(usize, f64)]); 5] = [
            (C2, &[(0, A21)]),
            (C3, &[(0, A31), (1, A32)]),
            (C4, &[(0, A41), (1, A42), (2, A43)]),
            (C5, &[(0, A51), (1, A52), (2, A53), (3, A54)]),
            (1., &[(0, A61), (1, A62), (2, A63), (3, A64), (4, A65)]),
        ];

        for (n_stage, (c, weights)) in stages.iter().enumerate() {
            stats.rhs_evaluations += 1;
            if !self.stage(sys, t + c * h, y, h, weights, n_stage + 1)? {
                return Ok(f64::INFINITY);
            }
        }
        self.y_stiff.copy_from_slice(&self.y_stage);

        for i in 0..n {
            y_new[i] = y[i] + h * (
                A71 * self.k[0][i] + A73 * self.k[2][i] + A74 * self.k[3][i]
                + A75 * self.k[4][i] + A76 * self.k[5][i]
            );
        }
        stats.rhs_evaluations += 1;
        if !trial_rhs(sys, t + h, y_new, &mut self.k[6])? {
            return Ok(f64::INFINITY);
        }

        let err: Vec<f64> = (0..n)
            .map(|i| h * (
                E1 * self.k[0][i] + E3 * self.k[2][i] + E4 * self.k[3][i]
                + E5 * self.k[4][i] + E6 * self.k[5][i] + E7 * self.k[6][i]
            ))
            .collect();

        Ok(error_norm(y, y_new, &err, options))
    }

    // dense output coefficients over the step just attempted
    fn prepare_dense(&mut self, y: &[f64], y_new: &[f64], h: f64) {
        for i in 0..y.len() {
            let y_diff = y_new[i] - y[i];
            let b_spline = h * self.k[0][i] - y_diff;

            self.dense[0][i] = y[i];
            self.dense[1][i] = y_diff;
            self.dense[2][i] = b_spline;
            self.dense[3][i] = y_diff - h * self.k[6][i] - b_spline;
            self.dense[4][i] = h * (
                D1 * self.k[0][i] + D3 * self.k[2][i] + D4 * self.k[3][i]
                + D5 * self.k[4][i] + D6 * self.k[5][i] + D7 * self.k[6][i]
            );
        }
    }

    // returns whether the accepted step looked stiff enough to switch methods
    fn accept(&mut self, y_new: &[f64], h: f64) -> bool {
        let n = y_new.len();
        let numerator: f64 = (0..n).map(|i| (self.k[6][i] - self.k[5][i]).powi(2)).sum();
        let denominator: f64 = (0..n).map(|i| (y_new[i] - self.y_stiff[i]).powi(2)).sum();

        // first same as last
        self.k.swap(0, 6);

        if denominator > 0. && h * (numerator / denominator).sqrt() > STIFFNESS_BOUND {
            self.non_stiff_steps = 0;
            self.stiff_steps += 1;
        } else {
            self.non_stiff_steps += 1;
            if self.non_stiff_steps == NON_STIFF_STEPS_TO_RESET {
                self.stiff_steps = 0;
            }
        }

        self.stiff_steps >= STIFF_STEPS_TO_SWITCH
    }

    fn interpolate(&self, theta: f64, out: &mut [f64]) {
        let theta_1 = 1. - theta;

        for (i, value) in out.iter_mut().enumerate() {
            *value = self.dense[0][i] + theta * (
                self.dense[1][i] + theta_1 * (
                    self.dense[2][i] + theta * (self.dense[3][i] + theta_1 * self.dense[4][i])
                )
            );
        }
    }
}

#[derive(Debug)]
struct ExponentialStepper {
    a: Vec<f64>,
    b: Vec<f64>,
    y_half: Vec<f64>,
    y_low: Vec<f64>,
    // state and midpoint rates of the last accepted step
    y_start: Vec<f64>,
    step: f64,
}

impl ExponentialStepper {
    fn new(n: usize) -> Self {
        ExponentialStepper {
            a: vec![0.; n],
            b: vec![0.; n],
            y_half: vec![0.; n],
            y_low: vec![0.; n],
            y_start: vec![0.; n],
            step: 0.,
        }
    }

    fn attempt<S: QuasiLinearSystem>(
        &mut self,
        sys: &S,
        t: f64,
        y: &[f64],
        h: f64,
        y_new: &mut [f64],
        options: &SolverOptions,
        stats: &mut SolverStats,
    ) -> Result<f64, MembraneSimulationError> {
        let n = y.len();

        stats.rhs_evaluations += 1;
        sys.split(t, y, &mut self.a, &mut self.b)?;
        for i in 0..n {
            self.y_half[i] = exponential_euler(y[i], self.a[i], self.b[i], 0.5 * h);
            self.y_low[i] = exponential_euler(y[i], self.a[i], self.b[i], h);
        }

        stats.rhs_evaluations += 1;
        match sys.split(t + 0.5 * h, &self.y_half, &mut self.a, &mut self.b) {
            Ok(()) => {},
            Err(MembraneSimulationError::RateEvaluation(_)) => return Ok(f64::INFINITY),
            Err(err) => return Err(err),
        }
        for i in 0..n {
            y_new[i] = exponential_euler(y[i], self.a[i], self.b[i], h);
        }

        let err: Vec<f64> = (0..n).map(|i| y_new[i] - self.y_low[i]).collect();

        Ok(error_norm(y, y_new, &err, options))
    }

    fn accept(&mut self, y: &[f64], h: f64) {
        self.y_start.copy_from_slice(y);
        self.step = h;
    }

    fn interpolate(&self, theta: f64, out: &mut [f64]) {
        for (i, value) in out.iter_mut().enumerate() {
            *value = exponential_euler(self.y_start[i], self.a[i], self.b[i], theta * self.step);
        }
    }
}

#[derive(Debug)]
enum Stepper {
    DormandPrince(DormandPrinceStepper),
    Exponential(ExponentialStepper),
}

impl Stepper {
    // exponent of the step size controller, one over the order of the error estimate
    fn error_exponent(&self) -> f64 {
        match self {
            Stepper::DormandPrince(_) => 1. / 5.,
            Stepper::Exponential(_) => 1. / 2.,
        }
    }
}

/// Adaptive integrator producing a [`Trajectory`] at requested sample times
#[derive(Debug, Clone, Copy, Default)]
pub struct Integrator {
    pub options: SolverOptions,
}

impl Integrator {
    pub fn new(options: SolverOptions) -> Self {
        Integrator { options }
    }

    fn initial_step<S: OdeSystem>(
        &self,
        sys: &S,
        t: f64,
        y: &[f64],
        span: f64,
        stats: &mut SolverStats,
    ) -> Result<f64, MembraneSimulationError> {
        let options = &self.options;
        if options.initial_step > 0. {
            return Ok(options.initial_step.min(span).min(options.max_step));
        }

        let mut f0 = vec![0.; y.len()];
        sys.rhs(t, y, &mut f0)?;
        stats.rhs_evaluations += 1;

        let d0 = error_norm(y, y, y, options);
        let d1 = error_norm(y, y, &f0, options);

        let h = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };

        Ok(h.min(span).min(options.max_step).max(options.min_step))
    }

    /// Integrates `sys` from `y0` at `times[0]` and samples the solution at
    /// every entry of `times`, which must be strictly increasing
    pub fn integrate<S: QuasiLinearSystem>(
        &self,
        sys: &S,
        y0: &[f64],
        times: &[f64],
        cancel: Option<&CancelFlag>,
    ) -> Result<(Trajectory, SolverStats), MembraneSimulationError> {
        self.options.validate()?;

        let n = sys.dimension();
        if y0.len() != n {
            return Err(InvalidParameterError::StateDimensionMismatch { expected: n, found: y0.len() }.into());
        }
        let (t_start, t_end) = match (times.first(), times.last()) {
            (Some(first), Some(last)) if times.len() >= 2 => (*first, *last),
            _ => return Err(InvalidParameterError::TooFewSamples(times.len()).into()),
        };
        if !(t_end > t_start) || times.windows(2).any(|pair| !(pair[1] > pair[0])) {
            return Err(InvalidParameterError::NonPositiveTimeSpan(t_end - t_start).into());
        }

        let options = &self.options;
        let mut stats = SolverStats::default();

        let mut out_times = Vec::with_capacity(times.len());
        let mut out_states = Vec::with_capacity(times.len() * n);
        out_times.push(t_start);
        out_states.extend_from_slice(y0);
        let mut next_sample = 1;

        let mut stepper = match options.method {
            Method::ExponentialMidpoint => Stepper::Exponential(ExponentialStepper::new(n)),
            Method::DormandPrince | Method::Auto => Stepper::DormandPrince(DormandPrinceStepper::new(n)),
        };

        let mut t = t_start;
        let mut y = y0.to_vec();
        let mut y_new = vec![0.; n];
        let mut sample = vec![0.; n];
        let mut pending = Vec::with_capacity(n);
        let mut h = self.initial_step(sys, t, &y, t_end - t_start, &mut stats)?;

        let failure = |reason, time, state: &[f64], out_times: Vec<f64>, out_states: Vec<f64>| {
            MembraneSimulationError::from(IntegrationFailure {
                reason,
                time,
                last_state: state.to_vec(),
                partial: Trajectory::from_samples(n, out_times, out_states),
            })
        };

        while next_sample < times.len() {
            if cancel.is_some_and(|flag| flag.is_cancelled()) {
                return Err(MembraneSimulationError::Cancelled { time: t });
            }
            if stats.accepted + stats.rejected >= options.max_steps {
                return Err(failure(FailureReason::StepBudgetExhausted, t, &y, out_times, out_states));
            }

            let remaining = t_end - t;
            h = h.min(options.max_step).min(remaining);
            if h < options.min_step && remaining > options.min_step {
                return Err(failure(FailureReason::StepSizeUnderflow, t, &y, out_times, out_states));
            }

            let err = match &mut stepper {
                Stepper::DormandPrince(dp) => dp.attempt(sys, t, &y, h, &mut y_new, options, &mut stats)?,
                Stepper::Exponential(exp) => exp.attempt(sys, t, &y, h, &mut y_new, options, &mut stats)?,
            };
            let exponent = stepper.error_exponent();
            let err = if err <= 1. && !sys.is_admissible(&y_new) { f64::INFINITY } else { err };

            if !(err <= 1.) {
                stats.rejected += 1;
                trace!(t, h, err, "step rejected");

                let factor = if err.is_finite() {
                    (SAFETY * err.powf(-exponent)).max(MIN_FACTOR)
                } else {
                    MIN_FACTOR
                };
                h *= factor;
                continue;
            }

            if y_new.iter().any(|value| !value.is_finite()) {
                return Err(failure(FailureReason::NonFiniteState, t, &y, out_times, out_states));
            }

            let t_new = if h >= remaining { t_end } else { t + h };
            match &mut stepper {
                Stepper::DormandPrince(dp) => dp.prepare_dense(&y, &y_new, h),
                Stepper::Exponential(exp) => exp.accept(&y, h),
            }

            pending.clear();
            let mut pending_samples = 0;
            let mut samples_admissible = true;
            while next_sample + pending_samples < times.len() && times[next_sample + pending_samples] <= t_new {
                let time = times[next_sample + pending_samples];
                if time >= t_new {
                    sample.copy_from_slice(&y_new);
                } else {
                    let theta = ((time - t) / h).clamp(0., 1.);
                    match &stepper {
                        Stepper::DormandPrince(dp) => dp.interpolate(theta, &mut sample),
                        Stepper::Exponential(exp) => exp.interpolate(theta, &mut sample),
                    }
                }

                samples_admissible &= sys.is_admissible(&sample);
                pending.extend_from_slice(&sample);
                pending_samples += 1;
            }

            if !samples_admissible {
                stats.rejected += 1;
                trace!(t, h, "dense output left the admissible region");
                h *= MIN_FACTOR;
                continue;
            }

            out_times.extend_from_slice(&times[next_sample..next_sample + pending_samples]);
            out_states.extend_from_slice(&pending);
            next_sample += pending_samples;

            let go_stiff = match &mut stepper {
                Stepper::DormandPrince(dp) => dp.accept(&y_new, h),
                Stepper::Exponential(_) => false,
            };

            stats.accepted += 1;
            t = t_new;
            y.copy_from_slice(&y_new);

            if go_stiff && options.method == Method::Auto {
                debug!(t, accepted = stats.accepted, "stiffness detected, switching to exponential midpoint");
                stepper = Stepper::Exponential(ExponentialStepper::new(n));
                stats.switched_to_stiff = true;
            }

            let factor = if err == 0. { MAX_FACTOR } else { SAFETY * err.powf(-exponent) };
            h *= factor.clamp(MIN_FACTOR, MAX_FACTOR);
        }

        debug!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            rhs_evaluations = stats.rhs_evaluations,
            switched_to_stiff = stats.switched_to_stiff,
            "integration finished"
        );

        Ok((Trajectory::from_samples(n, out_times, out_states), stats))
    }
}
