//! Error types for every stage of a simulation, from parameter validation
//! through rate evaluation to integration.

use thiserror::Error;
use crate::registry::Channel;
use crate::trajectory::Trajectory;


/// Error set for rejected simulation parameters, raised before any computation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidParameterError {
    /// Conductances must be non-negative
    #[error("conductance for {channel} must be non-negative, got {value}")]
    NegativeConductance { channel: Channel, value: f64 },
    /// A value that must be a finite number is NaN or infinite
    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
    /// Conductance was supplied for a channel the variant does not model
    #[error("variant {variant} has no {channel} channel")]
    ChannelNotInVariant { variant: &'static str, channel: Channel },
    /// Simulated time span must be strictly positive
    #[error("time span must be positive, got {0} ms")]
    NonPositiveTimeSpan(f64),
    /// At least a start and an end sample are required
    #[error("sample count must be at least 2, got {0}")]
    TooFewSamples(usize),
    /// Initial state does not have one entry for voltage plus one per gate
    #[error("initial state has {found} entries, variant expects {expected}")]
    StateDimensionMismatch { expected: usize, found: usize },
    /// Initial gating value lies outside [0, 1]
    #[error("initial value of gate {gate} must lie in [0, 1], got {value}")]
    GateOutOfRange { gate: &'static str, value: f64 },
    /// Solver options cannot be used
    #[error("invalid solver option: {0}")]
    SolverOption(&'static str),
}

/// Variant identifier is not in the registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model variant: {identifier:?}")]
pub struct UnknownVariantError {
    pub identifier: String,
}

/// A rate function produced (or was asked to evaluate) a non-finite value
#[derive(Debug, Clone, PartialEq, Error)]
#[error("rate function of gate {gate} is not finite at V = {voltage} mV")]
pub struct RateEvaluationError {
    /// Name of the gating variable whose rate failed
    pub gate: &'static str,
    /// Membrane potential the rate was evaluated at (mV)
    pub voltage: f64,
}

/// Why the integrator gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Maximum number of attempted steps was reached
    StepBudgetExhausted,
    /// Error control asked for a step smaller than the minimum step size
    StepSizeUnderflow,
    /// An accepted state contained NaN or infinity
    NonFiniteState,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let msg = match self {
            FailureReason::StepBudgetExhausted => "step budget exhausted",
            FailureReason::StepSizeUnderflow => "step size fell below the minimum",
            FailureReason::NonFiniteState => "state became non-finite",
        };

        write!(f, "{}", msg)
    }
}

/// Integration could not reach the end of the requested span,
/// carries everything computed up to the failure
#[derive(Debug, Clone, PartialEq, Error)]
#[error("integration failed at t = {time} ms: {reason}")]
pub struct IntegrationFailure {
    pub reason: FailureReason,
    /// Time of the last accepted step (ms)
    pub time: f64,
    /// Last accepted state
    pub last_state: Vec<f64>,
    /// Samples produced before the failure
    pub partial: Trajectory,
}

/// Errors raised while turning configuration text into a `ModelConfig`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// Required table is missing
    #[error("missing [{0}] table")]
    MissingTable(&'static str),
    /// Required key is missing
    #[error("missing required key {0}")]
    MissingKey(&'static str),
    /// Conductance table names a channel that does not exist
    #[error("unknown channel {0:?} in conductances")]
    UnknownChannel(String),
    /// A key holds the wrong kind of value
    #[error("cannot parse {key} as {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// A set of errors that may occur when using the library
#[derive(Debug, Error)]
pub enum MembraneSimulationError {
    /// Configuration rejected before computation
    #[error(transparent)]
    InvalidParameter(#[from] InvalidParameterError),
    /// Variant lookup failed
    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariantError),
    /// Kinetics produced a non-finite rate
    #[error(transparent)]
    RateEvaluation(#[from] RateEvaluationError),
    /// Solver could not finish the span
    #[error(transparent)]
    Integration(Box<IntegrationFailure>),
    /// Caller cancelled the run
    #[error("simulation cancelled at t = {time} ms")]
    Cancelled { time: f64 },
    /// Configuration text could not be read
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<IntegrationFailure> for MembraneSimulationError {
    fn from(err: IntegrationFailure) -> MembraneSimulationError {
        MembraneSimulationError::Integration(Box::new(err))
    }
}
